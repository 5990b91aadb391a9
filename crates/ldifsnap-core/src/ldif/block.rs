//! LDIF block splitting and record parsing.
//!
//! A block is the run of logical lines between blank lines. Physical lines
//! that start with a single space continue the previous line and are joined
//! before anything else looks at them; lines starting with `#` are comments.
//!
//! The first logical line of a block must be the record's DN:
//!
//! ```text
//! dn: CN=Administrator,CN=Users,DC=example,DC=com
//! dn:: Q049QWRtaW5pc3RyYXRvcixDTj1Vc2VycyxEQz1leGFtcGxlLERDPWNvbQ==
//! ```
//!
//! Every following line is `name: value` or `name:: base64-value`.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::{BufRead, Seek, SeekFrom};
use tracing::trace;

/// Attribute name a leading `version:` file header uses
const VERSION_ATTR: &str = "version";

/// Attribute name of the record's distinguished name
const DN_ATTR: &str = "dn";

/// One block of unfolded, non-comment lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Byte offset of the block's first line in the stream
    pub offset: u64,
    /// Logical lines with separators stripped and continuations joined
    pub lines: Vec<Vec<u8>>,
}

/// A parsed LDIF entry: its DN and attribute lines in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte offset of the block the record was parsed from
    pub offset: u64,
    /// The record's distinguished name
    pub dn: String,
    /// `(name, value)` pairs; base64 values are already decoded
    pub attributes: Vec<(String, Vec<u8>)>,
}

impl RawBlock {
    /// Parse the block's first line as a DN.
    ///
    /// Fails with [`Error::CorruptRecord`] carrying the block offset if that
    /// line is not a `dn:` line.
    pub fn dn(&self) -> Result<String> {
        let first = self
            .lines
            .first()
            .ok_or_else(|| Error::corrupt_record(self.offset, "empty block"))?;

        let (name, value) = parse_line(self.offset, first)?;
        if !name.eq_ignore_ascii_case(DN_ATTR) {
            return Err(Error::corrupt_record(
                self.offset,
                format!(
                    "expected 'dn:' line, found {:?}",
                    String::from_utf8_lossy(first)
                ),
            ));
        }

        String::from_utf8(value)
            .map_err(|_| Error::corrupt_record(self.offset, "DN is not valid UTF-8"))
    }

    /// Parse the whole block into a [`Record`]
    pub fn parse(&self) -> Result<Record> {
        let dn = self.dn()?;
        let attributes = self.lines[1..]
            .iter()
            .map(|line| parse_line(self.offset, line))
            .collect::<Result<Vec<_>>>()?;

        Ok(Record {
            offset: self.offset,
            dn,
            attributes,
        })
    }
}

/// Split one logical line into its attribute name and decoded value
fn parse_line(offset: u64, line: &[u8]) -> Result<(String, Vec<u8>)> {
    let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
        Error::corrupt_record(
            offset,
            format!("missing ':' in line {:?}", String::from_utf8_lossy(line)),
        )
    })?;

    let name = std::str::from_utf8(&line[..colon])
        .map_err(|_| Error::corrupt_record(offset, "attribute name is not valid UTF-8"))?
        .trim();
    if name.is_empty() {
        return Err(Error::corrupt_record(offset, "empty attribute name"));
    }

    let rest = &line[colon + 1..];
    let value = match rest.strip_prefix(b":") {
        Some(encoded) => STANDARD.decode(trim_spaces(encoded)).map_err(|e| {
            Error::corrupt_record(offset, format!("invalid base64 value for '{}': {}", name, e))
        })?,
        None => trim_leading_spaces(rest).to_vec(),
    };

    Ok((name.to_string(), value))
}

fn trim_leading_spaces(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

fn trim_spaces(bytes: &[u8]) -> &[u8] {
    let bytes = trim_leading_spaces(bytes);
    let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Splits a seekable byte stream into [`RawBlock`]s while tracking the byte
/// position of every line.
#[derive(Debug)]
pub struct BlockReader<R> {
    inner: R,
    /// Byte offset of the next unread byte
    position: u64,
    /// Logical lines handed out so far
    lines_read: u64,
    /// Blocks handed out so far
    blocks_read: usize,
}

impl<R: BufRead + Seek> BlockReader<R> {
    /// Wraps a stream positioned at its start
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            lines_read: 0,
            blocks_read: 0,
        }
    }

    /// Byte offset of the next unread byte
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of blocks returned by [`next_block`](Self::next_block)
    pub fn blocks_read(&self) -> usize {
        self.blocks_read
    }

    /// Move the stream to an absolute byte offset
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Read one physical line without its `\n` or `\r\n` terminator
    fn read_physical_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut line = Vec::new();
        let n = self.inner.read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.position += n as u64;

        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    fn next_is_continuation(&mut self) -> Result<bool> {
        Ok(self.inner.fill_buf()?.first() == Some(&b' '))
    }

    /// Read the next logical line and the offset it started at, skipping
    /// comments
    fn read_unfolded_line(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        loop {
            let start = self.position;
            let Some(mut line) = self.read_physical_line()? else {
                return Ok(None);
            };

            while self.next_is_continuation()? {
                let Some(continuation) = self.read_physical_line()? else {
                    break;
                };
                line.extend_from_slice(&continuation[1..]);
            }

            if line.first() == Some(&b'#') {
                continue;
            }
            return Ok(Some((start, line)));
        }
    }

    /// Read the next block, or `None` at end of stream.
    ///
    /// Blank lines before a block are skipped. A `version:` line is only
    /// accepted as the very first line of the stream and is dropped.
    pub fn next_block(&mut self) -> Result<Option<RawBlock>> {
        let mut lines = Vec::new();
        let mut offset = self.position;

        while let Some((start, line)) = self.read_unfolded_line()? {
            if line.is_empty() {
                if lines.is_empty() {
                    continue;
                }
                break;
            }

            let is_header = self.lines_read == 0 && is_version_line(&line);
            self.lines_read += 1;
            if is_header {
                trace!("Skipping LDIF version header");
                continue;
            }

            if lines.is_empty() {
                offset = start;
            }
            lines.push(line);
        }

        if lines.is_empty() {
            return Ok(None);
        }

        self.blocks_read += 1;
        trace!("Read block at offset {} ({} lines)", offset, lines.len());
        Ok(Some(RawBlock { offset, lines }))
    }
}

fn is_version_line(line: &[u8]) -> bool {
    line.len() > VERSION_ATTR.len()
        && line[..VERSION_ATTR.len()].eq_ignore_ascii_case(VERSION_ATTR.as_bytes())
        && line[VERSION_ATTR.len()] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn reader(data: &str) -> BlockReader<Cursor<Vec<u8>>> {
        BlockReader::new(Cursor::new(data.as_bytes().to_vec()))
    }

    fn blocks(data: &str) -> Vec<RawBlock> {
        let mut reader = reader(data);
        let mut out = Vec::new();
        while let Some(block) = reader.next_block().unwrap() {
            out.push(block);
        }
        out
    }

    #[test]
    fn test_splits_on_blank_lines_with_offsets() {
        let data = "dn: CN=a\ncn: a\n\ndn: CN=b\ncn: b\n";
        let blocks = blocks(data);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].offset, 0);
        assert_eq!(blocks[1].offset, data.find("dn: CN=b").unwrap() as u64);
        assert_eq!(blocks[1].lines, vec![b"dn: CN=b".to_vec(), b"cn: b".to_vec()]);
    }

    #[test]
    fn test_extra_blank_lines_and_missing_trailing_newline() {
        let data = "\n\ndn: CN=a\n\n\n\ndn: CN=b";
        let blocks = blocks(data);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].offset, 2);
        assert_eq!(blocks[1].lines, vec![b"dn: CN=b".to_vec()]);
    }

    #[test]
    fn test_continuation_lines_are_joined() {
        // Exactly one leading space is dropped per continuation line
        let data = "dn: CN=a\ndescription: hello\n  world\n wide\n";
        let record = blocks(data)[0].parse().unwrap();

        assert_eq!(
            record.attributes,
            vec![("description".to_string(), b"hello worldwide".to_vec())]
        );
    }

    #[test]
    fn test_crlf_and_comments() {
        let data = "# exported\r\ndn: CN=a\r\n# note\r\ncn: a\r\n\r\ndn: CN=b\r\n";
        let blocks = blocks(data);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].offset, "# exported\r\n".len() as u64);
        assert_eq!(blocks[0].lines, vec![b"dn: CN=a".to_vec(), b"cn: a".to_vec()]);
    }

    #[test]
    fn test_version_header_is_skipped_only_at_start() {
        let blocks_with_header = blocks("version: 1\n\ndn: CN=a\n");
        assert_eq!(blocks_with_header.len(), 1);
        assert_eq!(blocks_with_header[0].dn().unwrap(), "CN=a");

        let inline = blocks("version: 1\ndn: CN=a\n");
        assert_eq!(inline[0].offset, "version: 1\n".len() as u64);

        let late = blocks("dn: CN=a\n\nversion: 1\n");
        assert!(late[1].dn().is_err());
    }

    #[test]
    fn test_base64_dn_and_values() {
        // "CN=Jürgen,DC=example" and the bytes 00 ff
        let data = "dn:: Q049SsO8cmdlbixEQz1leGFtcGxl\nobjectSid:: AP8=\n";
        let record = blocks(data)[0].parse().unwrap();

        assert_eq!(record.dn, "CN=Jürgen,DC=example");
        assert_eq!(
            record.attributes,
            vec![("objectSid".to_string(), vec![0x00, 0xff])]
        );
    }

    #[test]
    fn test_repeated_attributes_stay_in_order() {
        let data = "dn: CN=g\nmember: CN=a\nmember: CN=b\n";
        let record = blocks(data)[0].parse().unwrap();

        let members: Vec<_> = record.attributes.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(members, vec![b"CN=a".to_vec(), b"CN=b".to_vec()]);
    }

    #[test]
    fn test_non_dn_first_line_is_corrupt() {
        let data = "dn: CN=a\n\ncn: orphan\n";
        let blocks = blocks(data);
        let err = blocks[1].dn().unwrap_err();

        match err {
            Error::CorruptRecord { offset, .. } => {
                assert_eq!(offset, data.find("cn: orphan").unwrap() as u64)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bad_base64_is_corrupt() {
        let err = blocks("dn:: !!!\n")[0].dn().unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { offset: 0, .. }));
    }

    #[test]
    fn test_line_without_colon_is_corrupt() {
        let err = blocks("dn: CN=a\ngarbage\n")[0].parse().unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { .. }));
    }

    #[test]
    fn test_seek_rereads_block() {
        let data = "dn: CN=a\n\ndn: CN=b\ncn: b\n";
        let mut reader = reader(data);
        let first = reader.next_block().unwrap().unwrap();
        let second = reader.next_block().unwrap().unwrap();
        assert!(reader.next_block().unwrap().is_none());

        reader.seek(second.offset).unwrap();
        assert_eq!(reader.next_block().unwrap().unwrap(), second);
        reader.seek(first.offset).unwrap();
        assert_eq!(reader.next_block().unwrap().unwrap(), first);
        assert_eq!(reader.blocks_read(), 4);
    }
}
