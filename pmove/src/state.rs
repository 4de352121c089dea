//! Movement state and input command types.
//!
//! Everything here is plain data that crosses the wire or the
//! server/client boundary, quantized so both simulations agree exactly.

/// Movement behavior class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PmType {
    /// Full gravity, acceleration, and clipping.
    #[default]
    Normal = 0,
    /// Free flight with no clipping.
    Spectator = 1,
    /// No acceleration or turning, body still clips.
    Dead = 2,
    /// Different bounding box, used for gibbed bodies.
    Gib = 3,
    /// No movement at all (demo playback, level transitions).
    Freeze = 4,
}

impl PmType {
    /// Decodes a wire byte, falling back to `Normal` for unknown values.
    #[must_use]
    pub const fn from_wire(value: u8) -> Self {
        match value {
            1 => Self::Spectator,
            2 => Self::Dead,
            3 => Self::Gib,
            4 => Self::Freeze,
            _ => Self::Normal,
        }
    }

    /// Encodes for the wire.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        self as u8
    }
}

/// Ducked below full standing height.
pub const PMF_DUCKED: u8 = 1;
/// Jump key is still held from the last jump.
pub const PMF_JUMP_HELD: u8 = 2;
/// Standing on ground this frame.
pub const PMF_ON_GROUND: u8 = 4;
/// Waterjump in progress; no control until it expires.
pub const PMF_TIME_WATERJUMP: u8 = 8;
/// Just landed; `pm_time` blocks another jump.
pub const PMF_TIME_LAND: u8 = 16;
/// Teleport pause; `pm_time` freezes movement in place.
pub const PMF_TIME_TELEPORT: u8 = 32;
/// Server disabled client prediction for this player.
pub const PMF_NO_PREDICTION: u8 = 64;

/// Networked movement state.
///
/// All positional data is 1/8-unit fixed point so the server and the
/// predicting client reproduce each other bit for bit. Angles are 1/65536
/// of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PmoveState {
    pub pm_type: PmType,
    /// Position in 1/8-unit counts.
    pub origin: [i16; 3],
    /// Velocity in 1/8-unit-per-second counts.
    pub velocity: [i16; 3],
    /// `PMF_*` bits.
    pub pm_flags: u8,
    /// Remaining duration of the active `PMF_TIME_*` condition, in 8 ms
    /// ticks.
    pub pm_time: u8,
    pub gravity: i16,
    /// Added to the command angles to produce the view direction. Changed
    /// by spawns, teleports, and rotating brush models.
    pub delta_angles: [i16; 3],
}

/// Attack button.
pub const BUTTON_ATTACK: u8 = 1;
/// Use/activate button.
pub const BUTTON_USE: u8 = 2;
/// Set when any button or key is down, for animation purposes.
pub const BUTTON_ANY: u8 = 128;

/// One tick of sampled player input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserCmd {
    /// Duration of this command in milliseconds. Zero marks an unsent slot
    /// and is skipped during replay.
    pub msec: u8,
    pub buttons: u8,
    /// View angles in 1/65536-turn counts.
    pub angles: [i16; 3],
    pub forward_move: i16,
    pub side_move: i16,
    pub up_move: i16,
    pub impulse: u8,
    pub light_level: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm_type_wire_roundtrip() {
        for ty in [
            PmType::Normal,
            PmType::Spectator,
            PmType::Dead,
            PmType::Gib,
            PmType::Freeze,
        ] {
            assert_eq!(PmType::from_wire(ty.to_wire()), ty);
        }
    }

    #[test]
    fn unknown_wire_type_is_normal() {
        assert_eq!(PmType::from_wire(200), PmType::Normal);
    }

    #[test]
    fn default_state_is_zeroed() {
        let state = PmoveState::default();
        assert_eq!(state.pm_type, PmType::Normal);
        assert_eq!(state.origin, [0; 3]);
        assert_eq!(state.velocity, [0; 3]);
        assert_eq!(state.pm_flags, 0);
    }
}
