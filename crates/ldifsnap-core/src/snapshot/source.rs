//! Interface expected by snapshot consumers.
//!
//! A consumer that turns directory objects into graph output drives a
//! snapshot through [`SnapshotSource`] and reads objects through
//! [`ObjectSource`]. [`Snapshot`](super::Snapshot) and
//! [`DirectoryObject`] are the LDIF-backed implementations.

use super::{ClassRegistry, Header, PropertyRegistry};
use crate::error::Result;
use crate::object::{AttributeMap, DirectoryObject, Value};

/// Read access to one directory object
pub trait ObjectSource {
    /// The object's distinguished name
    fn dn(&self) -> &str;

    /// All values of an attribute; empty if absent
    fn get(&self, name: &str) -> &[Value];

    /// Lowercased name of the object's schema category, if resolvable
    fn category(&self) -> Option<String>;

    /// Keyed access to the full attribute map (`attributes` or
    /// `raw_attributes`)
    fn access(&self, key: &str) -> Result<&AttributeMap>;
}

/// A snapshot of a directory, consumed in header/classes/objects order
pub trait SnapshotSource {
    /// Object type handed to the consumer
    type Object: ObjectSource;

    /// Prepare the snapshot and return its header
    fn parse_header(&mut self) -> Result<&Header>;

    /// Populate the class and property registries
    fn parse_classes(&mut self) -> Result<()>;

    /// The header, once parsed
    fn header(&self) -> Option<&Header>;

    /// Fetch the object at `index`
    fn object(&mut self, index: usize) -> Result<Self::Object>;

    /// Class schema entries, keyed by cn, DN and RDN value
    fn classes(&self) -> &ClassRegistry;

    /// Attribute schema entries, keyed by cn, DN and RDN value
    fn properties(&self) -> &PropertyRegistry;

    /// Lazily fetch every object in order.
    ///
    /// Calling this again starts over from the first object.
    fn objects<'a>(&'a mut self) -> Box<dyn Iterator<Item = Result<Self::Object>> + 'a> {
        let len = self.header().map_or(0, |h| h.num_objects);
        Box::new((0..len).map(move |i| self.object(i)))
    }
}

impl ObjectSource for DirectoryObject {
    fn dn(&self) -> &str {
        DirectoryObject::dn(self)
    }

    fn get(&self, name: &str) -> &[Value] {
        DirectoryObject::get(self, name)
    }

    fn category(&self) -> Option<String> {
        DirectoryObject::category(self)
    }

    fn access(&self, key: &str) -> Result<&AttributeMap> {
        DirectoryObject::access(self, key)
    }
}
