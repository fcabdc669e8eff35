use thiserror::Error;

/// Errors surfaced while parsing, mutating or re-serializing a resource
/// container. Parse-side variants carry the byte offset of the offending
/// chunk and, where it is known, its 16-bit type code.
#[derive(Error, Debug)]
pub enum ChunkError {
    /// Input ended in the middle of a declared structure
    #[error("input truncated at offset {offset:#x} while reading {what}")]
    Truncated { offset: usize, what: &'static str },

    /// A chunk violates the format in a way the parser does not recover from
    #[error("chunk {type_code:#06x} at offset {offset:#x} is malformed: {reason}")]
    Malformed {
        offset: usize,
        type_code: u16,
        reason: String,
    },

    /// Declared chunk size runs past the end of its container
    #[error(
        "chunk {type_code:#06x} at offset {offset:#x} declares size {declared} but only {available} bytes remain in its container"
    )]
    Overrun {
        offset: usize,
        type_code: u16,
        declared: u32,
        available: usize,
    },

    /// A known chunk kind appeared inside a container that does not admit it
    #[error("chunk {type_code:#06x} at offset {offset:#x} is not a valid child of a {container}")]
    UnexpectedChild {
        offset: usize,
        type_code: u16,
        container: &'static str,
    },

    /// Resource value type byte outside the enumerated set
    #[error("resource value at offset {offset:#x} has unsupported type tag {tag:#04x}")]
    UnsupportedValueType { offset: usize, tag: u8 },

    /// A mutation or emit step would break a structural invariant
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChunkError {
    #[inline]
    pub(crate) fn truncated(offset: usize, what: &'static str) -> ChunkError {
        ChunkError::Truncated { offset, what }
    }

    #[inline]
    pub(crate) fn malformed(offset: usize, type_code: u16, reason: impl Into<String>) -> ChunkError {
        ChunkError::Malformed {
            offset,
            type_code,
            reason: reason.into(),
        }
    }

    #[inline]
    pub(crate) fn invariant(reason: impl Into<String>) -> ChunkError {
        ChunkError::InvariantViolation(reason.into())
    }
}
