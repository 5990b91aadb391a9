//! # ldifsnap-core
//!
//! A library for reading LDIF directory dumps as typed, randomly
//! addressable Active Directory snapshots.
//!
//! This crate provides the core functionality for:
//! - Indexing an LDIF file once and re-reading single records by offset
//! - Exposing each record as a case-insensitive, multi-valued object
//! - Decoding binary attributes (SIDs, GUIDs, timestamps) into canonical form
//! - Collecting the schema's classes and attributes into lookup registries
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`ldif`]: Block splitting, the offset index and random-access reads
//! - [`object`]: Directory objects, attribute values and type coercion
//! - [`decode`]: SID, GUID and timestamp decoders
//! - [`snapshot`]: The snapshot lifecycle and schema registries
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use ldifsnap_core::Snapshot;
//!
//! let mut snapshot = Snapshot::open("./ad-dump.ldif")?;
//! snapshot.parse_header()?;
//! snapshot.parse_classes()?;
//!
//! let admin = snapshot.object_by_dn("CN=Administrator,CN=Users,DC=example,DC=com")?;
//! for sid in admin.get("objectSid") {
//!     println!("{}", sid);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! Consumers are written against two traits rather than concrete types:
//!
//! - [`SnapshotSource`]: header, registries and the object sequence
//! - [`ObjectSource`]: attribute access on a single object
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decode;
pub mod error;
pub mod ldif;
pub mod object;
pub mod snapshot;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use ldif::{LdifReader, OffsetIndex};
pub use object::{AttributeMap, DirectoryObject, Value};
pub use snapshot::{
    ClassRegistry, Header, ObjectSource, PropertyRegistry, Snapshot, SnapshotConfig,
    SnapshotSource,
};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
