//! Error types for shmstore.

use thiserror::Error;

/// Result type alias using shmstore's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for store and protocol operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The request fails an internal consistency check, or a decoded
    /// message carries an unexpected tag.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Lookup or delete miss on the object/external registries.
    #[error("object not exists: {0}")]
    ObjectNotExists(String),

    /// Allocator or arena exhaustion. Not retried automatically; the caller
    /// may retry after freeing objects.
    #[error("not enough memory: {0}")]
    NotEnoughMemory(String),

    /// Malformed request, e.g. mismatched offsets/sizes lengths.
    #[error("invalid user input: {0}")]
    UserInputError(String),

    /// The command is valid but handled by a layer outside this store.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),

    /// Wire message is not valid JSON.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl Error {
    /// Stable wire code for this error kind, carried in error replies.
    pub fn code(&self) -> u32 {
        match self {
            Error::Invalid(_) => 1,
            Error::ObjectNotExists(_) => 2,
            Error::NotEnoughMemory(_) => 3,
            Error::UserInputError(_) => 4,
            Error::NotImplemented(_) => 5,
            Error::Io(_) => 6,
            Error::System(_) => 7,
            Error::Codec(_) => 8,
        }
    }

    /// Reconstruct an error from a decoded `{code, message}` reply.
    ///
    /// Codes that cannot carry their original cause across the wire
    /// (I/O, syscall, codec) collapse into [`Error::Invalid`].
    pub fn from_wire(code: u32, message: String) -> Error {
        match code {
            2 => Error::ObjectNotExists(message),
            3 => Error::NotEnoughMemory(message),
            4 => Error::UserInputError(message),
            5 => Error::NotImplemented(message),
            _ => Error::Invalid(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_round_trip() {
        let err = Error::ObjectNotExists("id = o1234".into());
        let back = Error::from_wire(err.code(), "id = o1234".into());
        assert!(matches!(back, Error::ObjectNotExists(_)));

        let err = Error::NotEnoughMemory("size = 64".into());
        assert!(matches!(
            Error::from_wire(err.code(), String::new()),
            Error::NotEnoughMemory(_)
        ));

        let err = Error::UserInputError("offsets/sizes mismatch".into());
        assert!(matches!(
            Error::from_wire(err.code(), String::new()),
            Error::UserInputError(_)
        ));
    }

    #[test]
    fn test_unknown_code_is_invalid() {
        assert!(matches!(
            Error::from_wire(42, "who knows".into()),
            Error::Invalid(_)
        ));
    }
}
