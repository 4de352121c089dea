//! Error types for message buffer operations.

use std::fmt;

/// Result type for message buffer operations.
pub type MsgResult<T> = Result<T, MsgError>;

/// Errors that can occur while writing a message buffer.
///
/// Reads never error; see [`MessageReader`](crate::MessageReader) for the
/// sentinel-based truncation contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgError {
    /// A write would exceed the buffer capacity and overflow is not allowed.
    Overflow {
        /// Total bytes the buffer would need to hold.
        needed: usize,
        /// Fixed capacity of the buffer.
        capacity: usize,
    },

    /// A single write is larger than the whole buffer, which cannot succeed
    /// even after clearing an overflow-allowed buffer.
    OversizedWrite {
        /// Length of the offending write.
        len: usize,
        /// Fixed capacity of the buffer.
        capacity: usize,
    },
}

impl fmt::Display for MsgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow { needed, capacity } => {
                write!(
                    f,
                    "message buffer overflow: {needed} bytes needed but capacity is {capacity}"
                )
            }
            Self::OversizedWrite { len, capacity } => {
                write!(
                    f,
                    "single write of {len} bytes exceeds full buffer capacity {capacity}"
                )
            }
        }
    }
}

impl std::error::Error for MsgError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_overflow() {
        let err = MsgError::Overflow {
            needed: 20,
            capacity: 16,
        };
        let text = err.to_string();
        assert!(text.contains("20"));
        assert!(text.contains("16"));
    }

    #[test]
    fn display_oversized() {
        let err = MsgError::OversizedWrite {
            len: 64,
            capacity: 16,
        };
        let text = err.to_string();
        assert!(text.contains("64"));
        assert!(text.contains("16"));
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<MsgError>();
    }
}
