//! Error types for channel operations.

use std::fmt;

use msg::MsgError;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that end a channel.
///
/// A channel never recovers from these on its own; the owning session must
/// observe the failure and force a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The accumulating reliable stream overflowed its buffer.
    ReliableOverflow,

    /// A datagram could not be assembled within the size limit.
    Encode(MsgError),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReliableOverflow => {
                write!(f, "outgoing reliable message overflow")
            }
            Self::Encode(err) => write!(f, "datagram assembly failed: {err}"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReliableOverflow => None,
            Self::Encode(err) => Some(err),
        }
    }
}

impl From<MsgError> for ChannelError {
    fn from(err: MsgError) -> Self {
        Self::Encode(err)
    }
}
