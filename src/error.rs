//! Core error kinds.
//!
//! The verification APIs never use these for logical mismatches: a chain
//! that fails to verify produces a structured result, not an error. The
//! kinds below cover genuine faults: missing data, malformed encodings,
//! refused writes, and backend failures.

use std::fmt;

use crate::crypto::GroupHash;
use crate::storage::BackendError;

/// Error type raised by the core store and codecs.
#[derive(Debug)]
pub enum Error {
    /// No block is stored under the given hash.
    BlockNotFound(GroupHash),
    /// No extension record is stored for the given child hash.
    ExtensionNotFound(GroupHash),
    /// An inbound or stored edge violates the homomorphic equality, or a
    /// write would conflict with an existing edge.
    InvalidExtension(String),
    /// Malformed hex, bad JSON, or a wrong protocol version string.
    InvalidEncoding(String),
    /// Stored state contradicts itself (index entry without its record,
    /// diverging bytes under one hash).
    CorruptIndex(String),
    /// The backend returned a non-retryable error; surfaced verbatim.
    TransactionFailed(BackendError),
    /// Similarity kernel parameters out of range.
    InvalidParameters(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BlockNotFound(h) => write!(f, "block not found: {h}"),
            Error::ExtensionNotFound(h) => write!(f, "extension not found: {h}"),
            Error::InvalidExtension(msg) => write!(f, "invalid extension: {msg}"),
            Error::InvalidEncoding(msg) => write!(f, "invalid encoding: {msg}"),
            Error::CorruptIndex(msg) => write!(f, "corrupt index: {msg}"),
            Error::TransactionFailed(e) => write!(f, "transaction failed: {e}"),
            Error::InvalidParameters(msg) => write!(f, "invalid parameters: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::TransactionFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for Error {
    fn from(e: BackendError) -> Self {
        Error::TransactionFailed(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidEncoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_element;
    use std::error::Error as StdError;

    #[test]
    fn display_names_the_missing_hash() {
        let h = hash_element(b"gone");
        let err = Error::BlockNotFound(h);
        assert!(err.to_string().contains(&h.to_hex()));
    }

    #[test]
    fn display_distinguishes_block_and_extension_not_found() {
        let h = hash_element(b"x");
        assert!(Error::BlockNotFound(h).to_string().starts_with("block not found"));
        assert!(
            Error::ExtensionNotFound(h)
                .to_string()
                .starts_with("extension not found")
        );
    }

    #[test]
    fn transaction_failed_exposes_its_source() {
        let err: Error = BackendError::Poisoned("storage lock").into();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("storage lock"));
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_is_error<E: StdError>() {}
        assert_is_error::<Error>();
    }
}
