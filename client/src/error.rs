//! Fatal protocol errors.

use std::fmt;

use netchan::ChannelError;

/// Errors that end the connection.
///
/// Every variant surfaces exactly once, at the boundary between parsing one
/// message and the next; the session's receive loop resets all connection
/// state and returns to disconnected idle. Recoverable conditions (expired
/// delta references, stale datagrams) never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A read ran past the end of the datagram mid-message.
    BadRead {
        /// Byte position the reader ended at.
        position: usize,
    },

    /// Unknown top-level message tag.
    UnknownMessage { tag: u8 },

    /// A frame sub-message arrived outside a frame.
    OutOfPlaceMessage { tag: u8 },

    /// Entity number outside the addressable range.
    BadEntityNumber { number: i32 },

    /// Configstring index outside the table.
    BadConfigString { index: i32 },

    /// The server speaks a different protocol version.
    BadProtocolVersion { version: i32 },

    /// A frame's playerinfo sub-message was missing or misplaced.
    ExpectedPlayerInfo { tag: i32 },

    /// A frame's packetentities sub-message was missing or misplaced.
    ExpectedPacketEntities { tag: i32 },

    /// Area visibility bitset longer than the protocol allows.
    AreaBitsTooLong { len: usize },

    /// Sound message referenced an impossible entity.
    BadSoundEntity { number: i32 },

    /// Unknown temporary-entity kind.
    BadTempEntity { kind: i32 },

    /// Direction byte outside the unit-vector table.
    BadDirection,

    /// The reliable channel died (write overflow).
    Channel(ChannelError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRead { position } => {
                write!(f, "message truncated at byte {position}")
            }
            Self::UnknownMessage { tag } => write!(f, "unknown server message {tag}"),
            Self::OutOfPlaceMessage { tag } => {
                write!(f, "frame sub-message {tag} outside a frame")
            }
            Self::BadEntityNumber { number } => write!(f, "bad entity number {number}"),
            Self::BadConfigString { index } => write!(f, "bad configstring index {index}"),
            Self::BadProtocolVersion { version } => {
                write!(f, "server is protocol version {version}")
            }
            Self::ExpectedPlayerInfo { tag } => {
                write!(f, "expected playerinfo in frame, got {tag}")
            }
            Self::ExpectedPacketEntities { tag } => {
                write!(f, "expected packetentities in frame, got {tag}")
            }
            Self::AreaBitsTooLong { len } => write!(f, "areabits length {len} too long"),
            Self::BadSoundEntity { number } => write!(f, "sound on bad entity {number}"),
            Self::BadTempEntity { kind } => write!(f, "bad temp entity kind {kind}"),
            Self::BadDirection => write!(f, "direction index outside the table"),
            Self::Channel(err) => write!(f, "channel failure: {err}"),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Channel(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChannelError> for ProtocolError {
    fn from(err: ChannelError) -> Self {
        Self::Channel(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_specific() {
        let err = ProtocolError::UnknownMessage { tag: 99 };
        assert!(err.to_string().contains("99"));

        let err = ProtocolError::BadEntityNumber { number: 4096 };
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn channel_error_converts() {
        let err: ProtocolError = ChannelError::ReliableOverflow.into();
        assert!(matches!(err, ProtocolError::Channel(_)));
    }
}
