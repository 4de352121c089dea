//! Input-command delta encoding, the client-to-server mirror of the entity
//! codec.

use msg::{MessageReader, MessageWriter, MsgResult};
use pmove::UserCmd;

/// Change-mask bits for input-command deltas.
pub mod cmd_bits {
    pub const ANGLE_X: u8 = 1 << 0;
    pub const ANGLE_Y: u8 = 1 << 1;
    pub const ANGLE_Z: u8 = 1 << 2;
    pub const FORWARD: u8 = 1 << 3;
    pub const SIDE: u8 = 1 << 4;
    pub const UP: u8 = 1 << 5;
    pub const BUTTONS: u8 = 1 << 6;
    pub const IMPULSE: u8 = 1 << 7;
}

use cmd_bits as c;

/// Writes `cmd` as a delta against the previously sent command.
///
/// `msec` and light level follow unconditionally; they change nearly every
/// tick and are not worth a mask bit.
pub fn write_user_cmd_delta(
    from: &UserCmd,
    cmd: &UserCmd,
    writer: &mut MessageWriter,
) -> MsgResult<()> {
    let mut bits: u8 = 0;

    if cmd.angles[0] != from.angles[0] {
        bits |= c::ANGLE_X;
    }
    if cmd.angles[1] != from.angles[1] {
        bits |= c::ANGLE_Y;
    }
    if cmd.angles[2] != from.angles[2] {
        bits |= c::ANGLE_Z;
    }
    if cmd.forward_move != from.forward_move {
        bits |= c::FORWARD;
    }
    if cmd.side_move != from.side_move {
        bits |= c::SIDE;
    }
    if cmd.up_move != from.up_move {
        bits |= c::UP;
    }
    if cmd.buttons != from.buttons {
        bits |= c::BUTTONS;
    }
    if cmd.impulse != from.impulse {
        bits |= c::IMPULSE;
    }

    writer.write_u8(bits)?;

    if bits & c::ANGLE_X != 0 {
        writer.write_i16(cmd.angles[0])?;
    }
    if bits & c::ANGLE_Y != 0 {
        writer.write_i16(cmd.angles[1])?;
    }
    if bits & c::ANGLE_Z != 0 {
        writer.write_i16(cmd.angles[2])?;
    }
    if bits & c::FORWARD != 0 {
        writer.write_i16(cmd.forward_move)?;
    }
    if bits & c::SIDE != 0 {
        writer.write_i16(cmd.side_move)?;
    }
    if bits & c::UP != 0 {
        writer.write_i16(cmd.up_move)?;
    }
    if bits & c::BUTTONS != 0 {
        writer.write_u8(cmd.buttons)?;
    }
    if bits & c::IMPULSE != 0 {
        writer.write_u8(cmd.impulse)?;
    }

    writer.write_u8(cmd.msec)?;
    writer.write_u8(cmd.light_level)?;

    Ok(())
}

/// Reads an input-command delta against the previously received command.
#[must_use]
pub fn read_user_cmd_delta(from: &UserCmd, reader: &mut MessageReader<'_>) -> UserCmd {
    let mut cmd = *from;
    let bits = reader.read_u8().max(0) as u8;

    if bits & c::ANGLE_X != 0 {
        cmd.angles[0] = reader.read_i16() as i16;
    }
    if bits & c::ANGLE_Y != 0 {
        cmd.angles[1] = reader.read_i16() as i16;
    }
    if bits & c::ANGLE_Z != 0 {
        cmd.angles[2] = reader.read_i16() as i16;
    }
    if bits & c::FORWARD != 0 {
        cmd.forward_move = reader.read_i16() as i16;
    }
    if bits & c::SIDE != 0 {
        cmd.side_move = reader.read_i16() as i16;
    }
    if bits & c::UP != 0 {
        cmd.up_move = reader.read_i16() as i16;
    }
    if bits & c::BUTTONS != 0 {
        cmd.buttons = reader.read_u8() as u8;
    }
    if bits & c::IMPULSE != 0 {
        cmd.impulse = reader.read_u8() as u8;
    }

    cmd.msec = reader.read_u8().max(0) as u8;
    cmd.light_level = reader.read_u8().max(0) as u8;

    cmd
}
