//! Indexed, random-access LDIF reading.
//!
//! ## Algorithm Overview
//!
//! 1. [`LdifReader::build_index`] scans the stream once, block by block,
//!    recording the byte offset at which each DN's record starts
//! 2. The stream is rewound; the index is immutable from then on
//! 3. [`LdifReader::get`] / [`LdifReader::get_by_ordinal`] seek to a recorded
//!    offset and parse exactly one block into a [`DirectoryObject`]
//!
//! Every operation moves the single underlying stream, so a reader must
//! never be used from two places at once; `&mut self` on every read makes
//! that a compile-time property.

mod block;

use crate::error::{Error, Result};
use crate::object::DirectoryObject;
use std::collections::HashMap;
use std::io::{BufRead, Seek};
use tracing::{debug, trace};

pub use block::{BlockReader, RawBlock, Record};

/// DN -> record offset, in file order.
///
/// A DN seen twice keeps its first position but points at the offset of the
/// last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetIndex {
    dns: Vec<String>,
    offsets: HashMap<String, u64>,
}

impl OffsetIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `dn` at `offset`, returning the offset it replaced
    pub fn insert(&mut self, dn: String, offset: u64) -> Option<u64> {
        if let Some(previous) = self.offsets.get_mut(&dn) {
            return Some(std::mem::replace(previous, offset));
        }
        self.dns.push(dn.clone());
        self.offsets.insert(dn, offset);
        None
    }

    /// Offset of the record for `dn` (exact, case-sensitive match)
    pub fn offset(&self, dn: &str) -> Option<u64> {
        self.offsets.get(dn).copied()
    }

    /// The DN at position `ordinal` in file order
    pub fn dn_at(&self, ordinal: usize) -> Option<&str> {
        self.dns.get(ordinal).map(String::as_str)
    }

    /// Number of distinct DNs
    pub fn len(&self) -> usize {
        self.dns.len()
    }

    /// Returns true if no record was indexed
    pub fn is_empty(&self) -> bool {
        self.dns.is_empty()
    }

    /// Iterates `(dn, offset)` pairs in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.dns
            .iter()
            .map(move |dn| (dn.as_str(), self.offsets[dn]))
    }
}

/// Random-access LDIF reader over a seekable stream
#[derive(Debug)]
pub struct LdifReader<R> {
    blocks: BlockReader<R>,
    index: Option<OffsetIndex>,
}

impl<R: BufRead + Seek> LdifReader<R> {
    /// Wraps a stream positioned at its start
    pub fn new(inner: R) -> Self {
        Self {
            blocks: BlockReader::new(inner),
            index: None,
        }
    }

    /// Scan the whole stream once and build the offset index.
    ///
    /// Fails with [`Error::ReuseViolation`] if the index already exists or
    /// any record has been read, and with [`Error::CorruptRecord`] on the
    /// first block that does not start with a DN.
    pub fn build_index(&mut self) -> Result<&OffsetIndex> {
        if self.index.is_some() || self.blocks.blocks_read() > 0 || self.blocks.position() > 0 {
            return Err(Error::ReuseViolation);
        }

        debug!("Building LDIF offset index");

        let mut index = OffsetIndex::new();
        let mut records = 0usize;
        while let Some(block) = self.blocks.next_block()? {
            let dn = block.dn()?;
            if let Some(previous) = index.insert(dn, block.offset) {
                debug!(
                    "Duplicate DN at offset {} replaces record at offset {}",
                    block.offset, previous
                );
            }
            records += 1;
        }

        self.blocks.seek(0)?;

        debug!(
            "Indexed {} records ({} distinct DNs)",
            records,
            index.len()
        );
        Ok(&*self.index.insert(index))
    }

    /// The offset index, if built
    pub fn index(&self) -> Option<&OffsetIndex> {
        self.index.as_ref()
    }

    /// Number of indexed records; fails with [`Error::NotIndexed`] before
    /// [`build_index`](Self::build_index)
    pub fn len(&self) -> Result<usize> {
        self.index().map(OffsetIndex::len).ok_or(Error::NotIndexed)
    }

    /// Fetch the record for `dn` by seeking to its indexed offset
    pub fn get(&mut self, dn: &str) -> Result<DirectoryObject> {
        let index = self.index.as_ref().ok_or(Error::NotIndexed)?;
        let offset = index.offset(dn).ok_or_else(|| Error::dn_not_found(dn))?;
        self.read_at(offset)
    }

    /// Fetch the `ordinal`-th record in file order
    pub fn get_by_ordinal(&mut self, ordinal: usize) -> Result<DirectoryObject> {
        let index = self.index.as_ref().ok_or(Error::NotIndexed)?;
        let dn = index
            .dn_at(ordinal)
            .ok_or_else(|| Error::out_of_range(ordinal, index.len()))?;
        let offset = index.offset(dn).ok_or_else(|| Error::dn_not_found(dn))?;
        self.read_at(offset)
    }

    fn read_at(&mut self, offset: u64) -> Result<DirectoryObject> {
        trace!("Reading record at offset {}", offset);
        self.blocks.seek(offset)?;
        let block = self
            .blocks
            .next_block()?
            .ok_or_else(|| Error::corrupt_record(offset, "no record at indexed offset"))?;
        DirectoryObject::from_record(block.parse()?)
    }

    /// Parse the next record sequentially, without using the index
    pub fn next_object(&mut self) -> Result<Option<DirectoryObject>> {
        match self.blocks.next_block()? {
            Some(block) => Ok(Some(DirectoryObject::from_record(block.parse()?)?)),
            None => Ok(None),
        }
    }
}
