//! Typed directory objects.
//!
//! A [`DirectoryObject`] wraps the attributes of one LDIF record. Everything
//! in LDIF is text or base64, so the attributes the consumer expects in a
//! typed form are converted once, when the object is built:
//!
//! | attribute            | stored as                     |
//! |----------------------|-------------------------------|
//! | `userAccountControl`, `sAMAccountType`, `systemFlags`, `adminCount` | integer |
//! | `whenCreated`        | epoch seconds                 |
//! | `objectSid`          | `S-1-5-...` string            |
//! | `objectGUID`         | 32 character hex string       |
//!
//! Lookups ignore case and go through a small alias table, so `classes`
//! reads `objectClass` and `schemaIDGUID` reads `objectGUID`. Missing
//! attributes read as an empty slice.

mod map;

use crate::decode::{decode_guid, decode_sid, decode_timestamp};
use crate::error::{Error, Result};
use crate::ldif::Record;
use crate::snapshot::ClassRegistry;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

pub use map::CaseInsensitiveMap;

/// Class registry slot shared by every object of one aggregation pass.
///
/// Created empty before the pass and filled once the pass completes.
pub(crate) type SharedClasses = Arc<OnceLock<ClassRegistry>>;

/// Attribute map of a directory object
pub type AttributeMap = CaseInsensitiveMap<Vec<Value>>;

/// Requested name -> stored attribute
const ALIASES: &[(&str, &str)] = &[("classes", "objectClass"), ("schemaIDGUID", "objectGUID")];

/// Attributes converted from their raw LDIF form at construction
const COERCIONS: &[(&str, Coercion)] = &[
    ("userAccountControl", Coercion::Integer),
    ("sAMAccountType", Coercion::Integer),
    ("systemFlags", Coercion::Integer),
    ("adminCount", Coercion::Integer),
    ("whenCreated", Coercion::Timestamp),
    ("objectSid", Coercion::Sid),
    ("objectGUID", Coercion::Guid),
];

/// Keys accepted by [`DirectoryObject::access`]
const ACCESS_KEYS: &[&str] = &["attributes", "raw_attributes"];

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// UTF-8 text
    Text(String),
    /// Bytes that are not valid UTF-8
    Binary(Vec<u8>),
    /// A coerced integer
    Integer(i64),
}

impl Value {
    /// Classify raw bytes as text when they are valid UTF-8
    pub fn from_raw(raw: Vec<u8>) -> Self {
        match String::from_utf8(raw) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Binary(e.into_bytes()),
        }
    }

    /// Returns the text, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the underlying bytes of a text or binary value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Text(s) => Some(s.as_bytes()),
            Value::Binary(b) => Some(b),
            Value::Integer(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Binary(b) => f.write_str(&hex::encode(b)),
            Value::Integer(n) => write!(f, "{}", n),
        }
    }
}

/// Conversion applied to every value of a known attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coercion {
    Integer,
    Timestamp,
    Sid,
    Guid,
}

impl Coercion {
    fn apply(self, attribute: &str, value: Value) -> Result<Value> {
        let converted = match (self, value) {
            (Coercion::Integer, Value::Integer(n)) => Ok(Value::Integer(n)),
            (Coercion::Integer, Value::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| Error::decode(attribute, s.as_bytes(), e.to_string())),
            (Coercion::Timestamp, Value::Text(s)) => decode_timestamp(&s).map(Value::Integer),
            (Coercion::Sid, Value::Text(s)) => decode_sid(s.as_bytes()).map(Value::Text),
            (Coercion::Sid, Value::Binary(b)) => decode_sid(&b).map(Value::Text),
            (Coercion::Guid, Value::Text(s)) => decode_guid(s.as_bytes()).map(Value::Text),
            (Coercion::Guid, Value::Binary(b)) => decode_guid(&b).map(Value::Text),
            (coercion, other) => Err(Error::decode(
                attribute,
                other.to_string().as_bytes(),
                format!("cannot apply {:?} conversion to this value", coercion),
            )),
        };
        converted.map_err(|e| e.with_attribute(attribute))
    }
}

fn resolve_alias(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map_or(name, |&(_, target)| target)
}

/// How an object reaches its class registry
#[derive(Clone, Default)]
enum ClassLink {
    #[default]
    Detached,
    Shared(SharedClasses),
    /// Held by objects stored inside the registry itself
    Weak(Weak<OnceLock<ClassRegistry>>),
}

/// One directory entry with case-insensitive, multi-valued attributes
#[derive(Clone)]
pub struct DirectoryObject {
    dn: String,
    attributes: AttributeMap,
    /// Class registry used to resolve [`category`](Self::category)
    classes: ClassLink,
}

impl DirectoryObject {
    /// Build an object from a parsed record, converting known attributes.
    ///
    /// Fails with [`Error::Decode`] if a known attribute holds a value of
    /// the wrong shape.
    pub fn from_record(record: Record) -> Result<Self> {
        let mut attributes = AttributeMap::new();
        for (name, raw) in record.attributes {
            attributes
                .get_or_insert_with(&name, Vec::new)
                .push(Value::from_raw(raw));
        }

        for &(name, coercion) in COERCIONS {
            if let Some(values) = attributes.get_mut(name) {
                *values = std::mem::take(values)
                    .into_iter()
                    .map(|v| coercion.apply(name, v))
                    .collect::<Result<_>>()?;
            }
        }

        Ok(Self {
            dn: record.dn,
            attributes,
            classes: ClassLink::Detached,
        })
    }

    /// The record's distinguished name, as written in the `dn:` line
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// All values of an attribute; empty if absent
    pub fn get(&self, name: &str) -> &[Value] {
        self.attributes
            .get(resolve_alias(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The first value of an attribute
    pub fn first(&self, name: &str) -> Option<&Value> {
        self.get(name).first()
    }

    /// The first value of an attribute, if it is text
    pub fn first_str(&self, name: &str) -> Option<&str> {
        self.first(name).and_then(Value::as_str)
    }

    /// Returns true if `objectClass` lists `class` (ignoring case)
    pub fn has_class(&self, class: &str) -> bool {
        self.get("classes")
            .iter()
            .filter_map(Value::as_str)
            .any(|c| c.eq_ignore_ascii_case(class))
    }

    /// The `distinguishedName` attribute, falling back to the record DN
    pub fn distinguished_name(&self) -> &str {
        self.first_str("distinguishedName").unwrap_or(&self.dn)
    }

    /// The full attribute map
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Keyed access to the attribute map.
    ///
    /// Only `attributes` and `raw_attributes` are accepted; both return the
    /// same map.
    pub fn access(&self, key: &str) -> Result<&AttributeMap> {
        if ACCESS_KEYS.contains(&key) {
            Ok(&self.attributes)
        } else {
            Err(Error::unsupported_access(key))
        }
    }

    /// The lowercased `cn` of the class schema entry `objectCategory`
    /// points to.
    ///
    /// `None` if the attribute is absent or the class is unknown. Also
    /// `None` while no class registry is attached or the pass that attached
    /// it has not finished.
    pub fn category(&self) -> Option<String> {
        match &self.classes {
            ClassLink::Detached => None,
            ClassLink::Shared(classes) => classes.get()?.category_of(self),
            ClassLink::Weak(classes) => classes.upgrade()?.get()?.category_of(self),
        }
    }

    pub(crate) fn attach_classes(&mut self, classes: &SharedClasses) {
        self.classes = ClassLink::Shared(Arc::clone(classes));
    }

    /// Like [`attach_classes`](Self::attach_classes) without keeping the
    /// registry alive. Used for objects the registry itself owns.
    pub(crate) fn link_classes(&mut self, classes: &SharedClasses) {
        self.classes = ClassLink::Weak(Arc::downgrade(classes));
    }
}

impl PartialEq for DirectoryObject {
    fn eq(&self, other: &Self) -> bool {
        self.dn == other.dn && self.attributes == other.attributes
    }
}

impl fmt::Debug for DirectoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryObject")
            .field("dn", &self.dn)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}
