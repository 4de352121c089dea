//! Player-state delta encoding/decoding.

use msg::{MessageReader, MessageWriter, MsgResult};
use pmove::{PmType, PmoveState};

/// Number of HUD stat slots.
pub const MAX_STATS: usize = 32;

/// Flag word bits for player-state deltas.
///
/// Unlike entities there is no baseline concept: the reference is always the
/// previous frame's player state, or a zeroed state on the first frame.
pub mod player_bits {
    pub const M_TYPE: u16 = 1 << 0;
    pub const M_ORIGIN: u16 = 1 << 1;
    pub const M_VELOCITY: u16 = 1 << 2;
    pub const M_TIME: u16 = 1 << 3;
    pub const M_FLAGS: u16 = 1 << 4;
    pub const M_GRAVITY: u16 = 1 << 5;
    pub const M_DELTA_ANGLES: u16 = 1 << 6;
    pub const VIEW_OFFSET: u16 = 1 << 7;
    pub const VIEW_ANGLES: u16 = 1 << 8;
    pub const KICK_ANGLES: u16 = 1 << 9;
    pub const BLEND: u16 = 1 << 10;
    pub const FOV: u16 = 1 << 11;
    pub const WEAPON_INDEX: u16 = 1 << 12;
    pub const WEAPON_FRAME: u16 = 1 << 13;
    pub const RD_FLAGS: u16 = 1 << 14;
}

use player_bits as p;

/// Everything the client needs to render and predict its own player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    /// The shared movement state, replayed by prediction.
    pub pmove: PmoveState,
    /// Authoritative view direction in degrees.
    pub view_angles: [f32; 3],
    /// Eye offset from the movement origin, quarter-unit precision.
    pub view_offset: [f32; 3],
    /// Transient weapon/damage kick, quarter-unit precision.
    pub kick_angles: [f32; 3],
    pub gun_index: u8,
    pub gun_frame: u8,
    pub gun_offset: [f32; 3],
    pub gun_angles: [f32; 3],
    /// Full-screen blend color, 0-1 per channel.
    pub blend: [f32; 4],
    pub fov: f32,
    /// Refresh flags (underwater warp and friends), opaque to this core.
    pub rd_flags: u8,
    /// HUD numbers.
    pub stats: [i16; MAX_STATS],
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            pmove: PmoveState::default(),
            view_angles: [0.0; 3],
            view_offset: [0.0; 3],
            kick_angles: [0.0; 3],
            gun_index: 0,
            gun_frame: 0,
            gun_offset: [0.0; 3],
            gun_angles: [0.0; 3],
            blend: [0.0; 4],
            fov: 0.0,
            rd_flags: 0,
            stats: [0; MAX_STATS],
        }
    }
}

fn write_scaled_i8(writer: &mut MessageWriter, value: f32) -> MsgResult<()> {
    writer.write_i8((value * 4.0) as i32 as i8)
}

fn read_scaled_i8(reader: &mut MessageReader<'_>) -> f32 {
    reader.read_i8() as f32 * 0.25
}

/// Writes the changed fields of `to` relative to `from`.
pub fn write_player_delta(
    from: &PlayerState,
    to: &PlayerState,
    writer: &mut MessageWriter,
) -> MsgResult<()> {
    let mut flags: u16 = 0;

    if to.pmove.pm_type != from.pmove.pm_type {
        flags |= p::M_TYPE;
    }
    if to.pmove.origin != from.pmove.origin {
        flags |= p::M_ORIGIN;
    }
    if to.pmove.velocity != from.pmove.velocity {
        flags |= p::M_VELOCITY;
    }
    if to.pmove.pm_time != from.pmove.pm_time {
        flags |= p::M_TIME;
    }
    if to.pmove.pm_flags != from.pmove.pm_flags {
        flags |= p::M_FLAGS;
    }
    if to.pmove.gravity != from.pmove.gravity {
        flags |= p::M_GRAVITY;
    }
    if to.pmove.delta_angles != from.pmove.delta_angles {
        flags |= p::M_DELTA_ANGLES;
    }
    if to.view_offset != from.view_offset {
        flags |= p::VIEW_OFFSET;
    }
    if to.view_angles != from.view_angles {
        flags |= p::VIEW_ANGLES;
    }
    if to.kick_angles != from.kick_angles {
        flags |= p::KICK_ANGLES;
    }
    if to.gun_index != from.gun_index {
        flags |= p::WEAPON_INDEX;
    }
    if to.gun_frame != from.gun_frame
        || to.gun_offset != from.gun_offset
        || to.gun_angles != from.gun_angles
    {
        flags |= p::WEAPON_FRAME;
    }
    if to.blend != from.blend {
        flags |= p::BLEND;
    }
    if to.fov != from.fov {
        flags |= p::FOV;
    }
    if to.rd_flags != from.rd_flags {
        flags |= p::RD_FLAGS;
    }

    writer.write_i16(flags as i16)?;

    if flags & p::M_TYPE != 0 {
        writer.write_u8(to.pmove.pm_type.to_wire())?;
    }
    if flags & p::M_ORIGIN != 0 {
        for c in to.pmove.origin {
            writer.write_i16(c)?;
        }
    }
    if flags & p::M_VELOCITY != 0 {
        for c in to.pmove.velocity {
            writer.write_i16(c)?;
        }
    }
    if flags & p::M_TIME != 0 {
        writer.write_u8(to.pmove.pm_time)?;
    }
    if flags & p::M_FLAGS != 0 {
        writer.write_u8(to.pmove.pm_flags)?;
    }
    if flags & p::M_GRAVITY != 0 {
        writer.write_i16(to.pmove.gravity)?;
    }
    if flags & p::M_DELTA_ANGLES != 0 {
        for c in to.pmove.delta_angles {
            writer.write_i16(c)?;
        }
    }

    if flags & p::VIEW_OFFSET != 0 {
        for c in to.view_offset {
            write_scaled_i8(writer, c)?;
        }
    }
    if flags & p::VIEW_ANGLES != 0 {
        for c in to.view_angles {
            writer.write_angle16(c)?;
        }
    }
    if flags & p::KICK_ANGLES != 0 {
        for c in to.kick_angles {
            write_scaled_i8(writer, c)?;
        }
    }
    if flags & p::WEAPON_INDEX != 0 {
        writer.write_u8(to.gun_index)?;
    }
    if flags & p::WEAPON_FRAME != 0 {
        writer.write_u8(to.gun_frame)?;
        for c in to.gun_offset {
            write_scaled_i8(writer, c)?;
        }
        for c in to.gun_angles {
            write_scaled_i8(writer, c)?;
        }
    }
    if flags & p::BLEND != 0 {
        for c in to.blend {
            writer.write_u8((c * 255.0) as i32 as u8)?;
        }
    }
    if flags & p::FOV != 0 {
        writer.write_u8(to.fov as u8)?;
    }
    if flags & p::RD_FLAGS != 0 {
        writer.write_u8(to.rd_flags)?;
    }

    let mut stat_bits: u32 = 0;
    for i in 0..MAX_STATS {
        if to.stats[i] != from.stats[i] {
            stat_bits |= 1 << i;
        }
    }
    writer.write_i32(stat_bits as i32)?;
    for i in 0..MAX_STATS {
        if stat_bits & (1 << i) != 0 {
            writer.write_i16(to.stats[i])?;
        }
    }

    Ok(())
}

/// Parses a player-state delta into `to`, starting from `from` (the previous
/// frame's state, or a zeroed state for an uncompressed frame).
///
/// `demo_playback` forces the freeze movement type, matching how recorded
/// streams are replayed.
pub fn parse_player_delta(
    from: &PlayerState,
    to: &mut PlayerState,
    reader: &mut MessageReader<'_>,
    demo_playback: bool,
) {
    *to = *from;

    let flags = reader.read_i16() as u16;

    if flags & p::M_TYPE != 0 {
        to.pmove.pm_type = PmType::from_wire(reader.read_u8() as u8);
    }
    if flags & p::M_ORIGIN != 0 {
        for i in 0..3 {
            to.pmove.origin[i] = reader.read_i16() as i16;
        }
    }
    if flags & p::M_VELOCITY != 0 {
        for i in 0..3 {
            to.pmove.velocity[i] = reader.read_i16() as i16;
        }
    }
    if flags & p::M_TIME != 0 {
        to.pmove.pm_time = reader.read_u8() as u8;
    }
    if flags & p::M_FLAGS != 0 {
        to.pmove.pm_flags = reader.read_u8() as u8;
    }
    if flags & p::M_GRAVITY != 0 {
        to.pmove.gravity = reader.read_i16() as i16;
    }
    if flags & p::M_DELTA_ANGLES != 0 {
        for i in 0..3 {
            to.pmove.delta_angles[i] = reader.read_i16() as i16;
        }
    }

    if demo_playback {
        to.pmove.pm_type = PmType::Freeze;
    }

    if flags & p::VIEW_OFFSET != 0 {
        for i in 0..3 {
            to.view_offset[i] = read_scaled_i8(reader);
        }
    }
    if flags & p::VIEW_ANGLES != 0 {
        for i in 0..3 {
            to.view_angles[i] = reader.read_angle16();
        }
    }
    if flags & p::KICK_ANGLES != 0 {
        for i in 0..3 {
            to.kick_angles[i] = read_scaled_i8(reader);
        }
    }
    if flags & p::WEAPON_INDEX != 0 {
        to.gun_index = reader.read_u8() as u8;
    }
    if flags & p::WEAPON_FRAME != 0 {
        to.gun_frame = reader.read_u8() as u8;
        for i in 0..3 {
            to.gun_offset[i] = read_scaled_i8(reader);
        }
        for i in 0..3 {
            to.gun_angles[i] = read_scaled_i8(reader);
        }
    }
    if flags & p::BLEND != 0 {
        for i in 0..4 {
            to.blend[i] = reader.read_u8() as f32 / 255.0;
        }
    }
    if flags & p::FOV != 0 {
        to.fov = reader.read_u8() as f32;
    }
    if flags & p::RD_FLAGS != 0 {
        to.rd_flags = reader.read_u8() as u8;
    }

    let stat_bits = reader.read_i32() as u32;
    for i in 0..MAX_STATS {
        if stat_bits & (1 << i) != 0 {
            to.stats[i] = reader.read_i16() as i16;
        }
    }
}
