//! LDIF-backed directory snapshots.
//!
//! A [`Snapshot`] owns the open LDIF file and walks consumers through the
//! same lifecycle a binary directory snapshot would offer:
//!
//! 1. [`Snapshot::parse_header`] builds the offset index and synthesizes a
//!    [`Header`] (LDIF carries none)
//! 2. [`Snapshot::parse_classes`] makes one pass over every object and
//!    collects `classSchema` entries into the [`ClassRegistry`] and
//!    `attributeSchema` entries into the [`PropertyRegistry`]
//! 3. [`Snapshot::object`] / [`Snapshot::objects`] fetch objects on demand,
//!    each one re-read from the file
//!
//! ## Example
//!
//! ```no_run
//! use ldifsnap_core::Snapshot;
//!
//! let mut snapshot = Snapshot::open("dump.ldif")?;
//! let header = snapshot.parse_header()?;
//! println!("{} objects", header.num_objects);
//!
//! snapshot.parse_classes()?;
//! for obj in snapshot.objects() {
//!     let obj = obj?;
//!     println!("{} ({:?})", obj.dn(), obj.category());
//! }
//! # Ok::<(), ldifsnap_core::Error>(())
//! ```

mod source;

use crate::error::{Error, Result};
use crate::ldif::{LdifReader, OffsetIndex};
use crate::object::{CaseInsensitiveMap, DirectoryObject, SharedClasses};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub use source::{ObjectSource, SnapshotSource};

/// Object class marking class schema entries
const CLASS_SCHEMA: &str = "classSchema";

/// Object class marking attribute schema entries
const ATTRIBUTE_SCHEMA: &str = "attributeSchema";

/// Synthesized snapshot metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Modification time of the LDIF file, in seconds since the epoch
    pub filetime_unix: i64,
    /// Placeholder server name
    pub server: String,
    /// Always 0; LDIF has no object mapping table
    pub mapping_offset: u64,
    /// Number of indexed objects
    pub num_objects: usize,
    /// Always empty
    pub filetime: String,
}

/// Configuration for opening a snapshot
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Server name reported in the header
    pub server_name: String,
    /// Capacity of the read buffer over the file
    pub buffer_capacity: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            server_name: "ldifdump".to_string(),
            buffer_capacity: 64 * 1024,
        }
    }
}

impl SnapshotConfig {
    /// Creates a new snapshot config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server name reported in the header
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Sets the read buffer capacity
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}

/// The keys a schema entry is registered under: its `cn`, its DN, and the
/// value of the DN's first RDN.
fn schema_keys(obj: &DirectoryObject) -> Vec<String> {
    let dn = obj.distinguished_name();
    let mut keys = Vec::with_capacity(3);
    if let Some(cn) = obj.first_str("cn") {
        keys.push(cn.to_string());
    }
    keys.push(dn.to_string());
    if let Some(rdn) = rdn_value(dn) {
        keys.push(rdn.to_string());
    }
    keys
}

/// `CN=Person,CN=Schema,...` -> `Person`
fn rdn_value(dn: &str) -> Option<&str> {
    let first = dn.split(',').next()?;
    first.split_once('=').map(|(_, value)| value)
}

/// Class schema entries, looked up case-insensitively by cn, DN or RDN value
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: CaseInsensitiveMap<Arc<DirectoryObject>>,
}

/// Registry handed out before any pass has completed
fn empty_classes() -> &'static ClassRegistry {
    static EMPTY: OnceLock<ClassRegistry> = OnceLock::new();
    EMPTY.get_or_init(ClassRegistry::default)
}

impl ClassRegistry {
    pub(crate) fn register(&mut self, obj: DirectoryObject) {
        let obj = Arc::new(obj);
        for key in schema_keys(&obj) {
            self.classes.insert(key, Arc::clone(&obj));
        }
    }

    /// Looks up a class by any of its keys
    pub fn get(&self, key: &str) -> Option<&DirectoryObject> {
        self.classes.get(key).map(Arc::as_ref)
    }

    /// Number of registered keys (up to three per class)
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if no class is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Resolve `obj`'s `objectCategory` to the lowercased `cn` of the class
    /// it names
    pub fn category_of(&self, obj: &DirectoryObject) -> Option<String> {
        let category_dn = obj.first_str("objectCategory")?;
        let class = self.get(category_dn)?;
        class.first_str("cn").map(str::to_lowercase)
    }
}

/// Attribute schema entries in discovery order, with a case-insensitive
/// name -> ordinal lookup
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    properties: Vec<DirectoryObject>,
    ordinals: CaseInsensitiveMap<usize>,
}

impl PropertyRegistry {
    fn register(&mut self, obj: DirectoryObject) {
        let ordinal = self.properties.len();
        for key in schema_keys(&obj) {
            self.ordinals.insert(key, ordinal);
        }
        self.properties.push(obj);
    }

    /// Ordinal of the property registered under `key`
    pub fn ordinal(&self, key: &str) -> Option<usize> {
        self.ordinals.get(key).copied()
    }

    /// Looks up a property by any of its keys
    pub fn get(&self, key: &str) -> Option<&DirectoryObject> {
        self.ordinal(key).and_then(|i| self.properties.get(i))
    }

    /// The property at `ordinal`
    pub fn by_ordinal(&self, ordinal: usize) -> Option<&DirectoryObject> {
        self.properties.get(ordinal)
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if no property is registered
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterates properties in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryObject> {
        self.properties.iter()
    }
}

/// A directory snapshot read from an LDIF file
#[derive(Debug)]
pub struct Snapshot {
    path: PathBuf,
    config: SnapshotConfig,
    reader: LdifReader<BufReader<File>>,
    modified: i64,
    header: Option<Header>,
    classes: SharedClasses,
    properties: PropertyRegistry,
}

impl Snapshot {
    /// Opens an LDIF file with the default configuration
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, SnapshotConfig::default())
    }

    /// Opens an LDIF file with a custom configuration
    pub fn open_with_config(path: impl AsRef<Path>, config: SnapshotConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let modified = file
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| Error::file_read(path, e))?;
        let modified = DateTime::<Utc>::from(modified).timestamp();

        debug!("Opened snapshot {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            reader: LdifReader::new(BufReader::with_capacity(config.buffer_capacity, file)),
            config,
            modified,
            header: None,
            classes: Arc::default(),
            properties: PropertyRegistry::default(),
        })
    }

    /// Path of the underlying LDIF file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build the offset index and synthesize the header.
    ///
    /// Fails with [`Error::ReuseViolation`] when called a second time.
    pub fn parse_header(&mut self) -> Result<&Header> {
        let num_objects = self.reader.build_index()?.len();
        debug!("Snapshot {} holds {} objects", self.path.display(), num_objects);

        Ok(&*self.header.insert(Header {
            filetime_unix: self.modified,
            server: self.config.server_name.clone(),
            mapping_offset: 0,
            num_objects,
            filetime: String::new(),
        }))
    }

    /// The DN offset index, once [`parse_header`](Self::parse_header) has run
    pub fn index(&self) -> Option<&OffsetIndex> {
        self.reader.index()
    }

    /// The header, once [`parse_header`](Self::parse_header) has run
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Number of objects; 0 before the header is parsed
    pub fn len(&self) -> usize {
        self.header.as_ref().map_or(0, |h| h.num_objects)
    }

    /// Returns true if the snapshot holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify every object into the class and property registries in a
    /// single pass.
    ///
    /// Every object the pass registers is linked to the registry being
    /// built, which becomes readable once the pass completes. Objects the
    /// class registry owns hold a weak link so the registry does not keep
    /// itself alive.
    ///
    /// Requires [`parse_header`](Self::parse_header); fails with
    /// [`Error::NotIndexed`] otherwise. Running it again rebuilds both
    /// registries.
    pub fn parse_classes(&mut self) -> Result<()> {
        let len = self.reader.len()?;
        let shared = SharedClasses::default();
        let mut classes = ClassRegistry::default();
        let mut properties = PropertyRegistry::default();

        for i in 0..len {
            let obj = self.reader.get_by_ordinal(i)?;
            let is_class = obj.has_class(CLASS_SCHEMA);
            let is_property = obj.has_class(ATTRIBUTE_SCHEMA);

            let (class, property) = match (is_class, is_property) {
                (true, true) => (Some(obj.clone()), Some(obj)),
                (true, false) => (Some(obj), None),
                (false, true) => (None, Some(obj)),
                (false, false) => continue,
            };

            if let Some(mut class) = class {
                class.link_classes(&shared);
                classes.register(class);
            }
            if let Some(mut property) = property {
                property.attach_classes(&shared);
                properties.register(property);
            }
        }

        debug!(
            "Registered {} class keys and {} properties",
            classes.len(),
            properties.len()
        );

        shared.get_or_init(|| classes);
        self.classes = shared;
        self.properties = properties;
        Ok(())
    }

    /// Fetch the object at `index` in file order
    pub fn object(&mut self, index: usize) -> Result<DirectoryObject> {
        let mut obj = self.reader.get_by_ordinal(index)?;
        obj.attach_classes(&self.classes);
        Ok(obj)
    }

    /// Fetch the object with distinguished name `dn`
    pub fn object_by_dn(&mut self, dn: &str) -> Result<DirectoryObject> {
        let mut obj = self.reader.get(dn)?;
        obj.attach_classes(&self.classes);
        Ok(obj)
    }

    /// Lazily fetch every object in file order
    pub fn objects(&mut self) -> Objects<'_> {
        let len = self.len();
        Objects {
            snapshot: self,
            next: 0,
            len,
        }
    }

    /// The class registry; empty until [`parse_classes`](Self::parse_classes)
    pub fn classes(&self) -> &ClassRegistry {
        self.classes.get().unwrap_or_else(|| empty_classes())
    }

    /// The property registry; empty until
    /// [`parse_classes`](Self::parse_classes)
    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }
}

/// Iterator over a snapshot's objects, see [`Snapshot::objects`]
#[derive(Debug)]
pub struct Objects<'a> {
    snapshot: &'a mut Snapshot,
    next: usize,
    len: usize,
}

impl Iterator for Objects<'_> {
    type Item = Result<DirectoryObject>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.snapshot.object(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Objects<'_> {}

impl SnapshotSource for Snapshot {
    type Object = DirectoryObject;

    fn parse_header(&mut self) -> Result<&Header> {
        Snapshot::parse_header(self)
    }

    fn parse_classes(&mut self) -> Result<()> {
        Snapshot::parse_classes(self)
    }

    fn header(&self) -> Option<&Header> {
        Snapshot::header(self)
    }

    fn object(&mut self, index: usize) -> Result<DirectoryObject> {
        Snapshot::object(self, index)
    }

    fn classes(&self) -> &ClassRegistry {
        Snapshot::classes(self)
    }

    fn properties(&self) -> &PropertyRegistry {
        Snapshot::properties(self)
    }

    fn objects<'a>(&'a mut self) -> Box<dyn Iterator<Item = Result<DirectoryObject>> + 'a> {
        Box::new(Snapshot::objects(self))
    }
}
