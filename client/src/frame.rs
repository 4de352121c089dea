//! Server frame snapshots and their fixed-depth history.

use codec::PlayerState;

/// Depth of the frame history ring. Must be a power of two; deltas that
/// reach back further than this are unrecoverable by construction.
pub const UPDATE_BACKUP: usize = 16;
/// Slot mask for the frame ring.
pub const UPDATE_MASK: i32 = UPDATE_BACKUP as i32 - 1;

/// Capacity of the parsed-entity ring shared by all buffered frames.
pub const MAX_PARSE_ENTITIES: usize = 1024;

/// Milliseconds between server frames.
pub const SERVER_FRAME_MS: i32 = 100;

/// Bytes of area visibility data a frame can carry.
pub const MAX_AREA_BYTES: usize = 32;

/// One authoritative server snapshot.
///
/// Frames live in a ring indexed by `server_frame` modulo
/// [`UPDATE_BACKUP`]; old slots are silently overwritten. Entity states are
/// not stored inline: `parse_entities`/`num_entities` reference a span of
/// the session's shared entity ring.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    /// False when this frame referenced delta state we no longer hold; the
    /// frame was still parsed to stay in sync, but must not be rendered or
    /// predicted from.
    pub valid: bool,
    pub server_frame: i32,
    /// Tick this frame is delta compressed against; zero or negative means
    /// the frame is self-contained.
    pub delta_frame: i32,
    pub server_time: i32,
    /// Messages the server rate-suppressed before this frame.
    pub suppress_count: u8,
    /// Area visibility bitset, opaque to this core.
    pub areabits: [u8; MAX_AREA_BYTES],
    pub playerstate: PlayerState,
    /// Number of entities in this frame.
    pub num_entities: i32,
    /// Ring index of this frame's first entity (monotonic counter, wrapped
    /// modulo [`MAX_PARSE_ENTITIES`] on access).
    pub parse_entities: i32,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            valid: false,
            server_frame: 0,
            delta_frame: 0,
            server_time: 0,
            suppress_count: 0,
            areabits: [0; MAX_AREA_BYTES],
            playerstate: PlayerState::default(),
            num_entities: 0,
            parse_entities: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_sizes_are_powers_of_two() {
        assert!(UPDATE_BACKUP.is_power_of_two());
        assert!(MAX_PARSE_ENTITIES.is_power_of_two());
    }

    #[test]
    fn default_frame_is_invalid() {
        let frame = Frame::default();
        assert!(!frame.valid);
        assert_eq!(frame.num_entities, 0);
    }
}
