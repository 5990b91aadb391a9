//! Error types for the ldifsnap-core library.
//!
//! All failures are fatal to the operation that triggered them: a corrupt
//! record aborts the whole index build or the single fetch that touched it,
//! and no variant is ever retried.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ldifsnap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all ldifsnap operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to open or stat the input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Positional read or seek on an already open stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block does not start with a valid `dn:` line, or one of its lines
    /// cannot be parsed
    #[error("corrupt LDIF record at offset {offset}: {details}")]
    CorruptRecord {
        /// Byte offset where the block began
        offset: u64,
        /// Description of what was wrong
        details: String,
    },

    /// The index was built a second time, or after records were consumed
    #[error("index can only be built once, before any record has been read")]
    ReuseViolation,

    /// Random access was attempted before the index was built
    #[error("index has not been built yet")]
    NotIndexed,

    /// Ordinal access beyond the number of indexed records
    #[error("object ordinal {index} out of range (snapshot holds {len} objects)")]
    OutOfRange {
        /// The requested ordinal
        index: usize,
        /// Number of indexed objects
        len: usize,
    },

    /// Random access by a DN that is not in the index
    #[error("distinguished name not found in index: '{dn}'")]
    DnNotFound {
        /// The requested DN
        dn: String,
    },

    /// A typed attribute's raw value could not be decoded
    #[error("failed to decode attribute '{attribute}' value {value:?}: {details}")]
    Decode {
        /// Name of the attribute being decoded
        attribute: String,
        /// Raw value, rendered for diagnostics
        value: String,
        /// Why decoding failed
        details: String,
    },

    /// Keyed object access used a key other than `attributes`/`raw_attributes`
    #[error("unsupported keyed access '{key}': expected 'attributes' or 'raw_attributes'")]
    UnsupportedAccess {
        /// The rejected key
        key: String,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new corrupt record error
    pub fn corrupt_record(offset: u64, details: impl Into<String>) -> Self {
        Self::CorruptRecord {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new out-of-range error
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::OutOfRange { index, len }
    }

    /// Creates a new missing-DN error
    pub fn dn_not_found(dn: impl Into<String>) -> Self {
        Self::DnNotFound { dn: dn.into() }
    }

    /// Creates a new decode error.
    ///
    /// Binary values are rendered as lowercase hex so the message stays
    /// printable.
    pub fn decode(attribute: impl Into<String>, raw: &[u8], details: impl Into<String>) -> Self {
        let value = match std::str::from_utf8(raw) {
            Ok(text) => text.to_string(),
            Err(_) => hex::encode(raw),
        };
        Self::Decode {
            attribute: attribute.into(),
            value,
            details: details.into(),
        }
    }

    /// Names the attribute a decode error belongs to; other errors pass
    /// through unchanged.
    pub fn with_attribute(self, name: impl Into<String>) -> Self {
        match self {
            Self::Decode { value, details, .. } => Self::Decode {
                attribute: name.into(),
                value,
                details,
            },
            other => other,
        }
    }

    /// Creates a new unsupported access error
    pub fn unsupported_access(key: impl Into<String>) -> Self {
        Self::UnsupportedAccess { key: key.into() }
    }

    /// Returns true if the caller may skip the failing item and continue.
    ///
    /// Nothing in this crate is: a snapshot has no partial-success mode.
    pub fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corrupt_record(42, "expected 'dn:' line");
        assert!(err.to_string().contains("offset 42"));
        assert!(err.to_string().contains("dn:"));
    }

    #[test]
    fn test_decode_error_names_attribute_and_value() {
        let err = Error::decode("whenCreated", b"2007", "expected 14 digits");
        let msg = err.to_string();
        assert!(msg.contains("whenCreated"));
        assert!(msg.contains("\"2007\""));
    }

    #[test]
    fn test_decode_error_renders_binary_as_hex() {
        let err = Error::decode("objectGUID", &[0xff, 0x00, 0xfe], "bad length");
        assert!(err.to_string().contains("ff00fe"));
    }

    #[test]
    fn test_with_attribute_relabels_decode_errors_only() {
        let err = Error::decode("sid", b"x", "too short").with_attribute("objectSid");
        assert!(matches!(err, Error::Decode { ref attribute, .. } if attribute == "objectSid"));

        let err = Error::NotIndexed.with_attribute("objectSid");
        assert!(matches!(err, Error::NotIndexed));
    }

    #[test]
    fn test_nothing_is_recoverable() {
        assert!(!Error::NotIndexed.is_recoverable());
        assert!(!Error::ReuseViolation.is_recoverable());
        assert!(!Error::out_of_range(3, 2).is_recoverable());
    }
}
