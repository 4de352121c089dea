//! Entity delta encoding/decoding.

use msg::{MessageReader, MessageWriter, MsgResult};

use crate::entity::{EntityState, RF_BEAM};

/// Change-mask bits for entity deltas.
///
/// The mask travels as one to four bytes; each `MORE_BITS*` flag says another
/// byte follows. Values are wire format and must not be rearranged.
pub mod entity_bits {
    pub const ORIGIN_X: u32 = 1 << 0;
    pub const ORIGIN_Y: u32 = 1 << 1;
    pub const ANGLE_Y: u32 = 1 << 2;
    pub const ANGLE_Z: u32 = 1 << 3;
    pub const FRAME8: u32 = 1 << 4;
    pub const EVENT: u32 = 1 << 5;
    /// The entity exists in the old frame but not in the new one.
    pub const REMOVE: u32 = 1 << 6;
    pub const MORE_BITS1: u32 = 1 << 7;

    pub const NUMBER16: u32 = 1 << 8;
    pub const ORIGIN_Z: u32 = 1 << 9;
    pub const ANGLE_X: u32 = 1 << 10;
    pub const MODEL: u32 = 1 << 11;
    pub const RENDER_FX8: u32 = 1 << 12;
    pub const EFFECTS8: u32 = 1 << 14;
    pub const MORE_BITS2: u32 = 1 << 15;

    pub const SKIN8: u32 = 1 << 16;
    pub const FRAME16: u32 = 1 << 17;
    pub const RENDER_FX16: u32 = 1 << 18;
    pub const EFFECTS16: u32 = 1 << 19;
    pub const MODEL2: u32 = 1 << 20;
    pub const MODEL3: u32 = 1 << 21;
    pub const MODEL4: u32 = 1 << 22;
    pub const MORE_BITS3: u32 = 1 << 23;

    pub const OLD_ORIGIN: u32 = 1 << 24;
    pub const SKIN16: u32 = 1 << 25;
    pub const SOUND: u32 = 1 << 26;
    pub const SOLID: u32 = 1 << 27;
}

use entity_bits as b;

/// Writes the changed fields of `to` relative to `from`.
///
/// `force` emits a header even when nothing changed (used for carried-forward
/// entities inside a full snapshot); `new_entity` additionally transmits
/// `old_origin` so the receiver does not interpolate the spawn.
pub fn write_entity_delta(
    from: &EntityState,
    to: &EntityState,
    writer: &mut MessageWriter,
    force: bool,
    new_entity: bool,
) -> MsgResult<()> {
    debug_assert!(to.number != 0, "unset entity number");
    debug_assert!((to.number as usize) < crate::MAX_ENTITIES);

    let mut bits: u32 = 0;

    if to.number >= 256 {
        bits |= b::NUMBER16;
    }

    if to.origin[0] != from.origin[0] {
        bits |= b::ORIGIN_X;
    }
    if to.origin[1] != from.origin[1] {
        bits |= b::ORIGIN_Y;
    }
    if to.origin[2] != from.origin[2] {
        bits |= b::ORIGIN_Z;
    }

    if to.angles[0] != from.angles[0] {
        bits |= b::ANGLE_X;
    }
    if to.angles[1] != from.angles[1] {
        bits |= b::ANGLE_Y;
    }
    if to.angles[2] != from.angles[2] {
        bits |= b::ANGLE_Z;
    }

    if to.skin != from.skin {
        if to.skin < 256 {
            bits |= b::SKIN8;
        } else if to.skin < 0x10000 {
            bits |= b::SKIN16;
        } else {
            bits |= b::SKIN8 | b::SKIN16;
        }
    }

    if to.frame != from.frame {
        if to.frame < 256 {
            bits |= b::FRAME8;
        } else {
            bits |= b::FRAME16;
        }
    }

    if to.effects != from.effects {
        if to.effects < 256 {
            bits |= b::EFFECTS8;
        } else if to.effects < 0x8000 {
            bits |= b::EFFECTS16;
        } else {
            bits |= b::EFFECTS8 | b::EFFECTS16;
        }
    }

    if to.render_fx != from.render_fx {
        if to.render_fx < 256 {
            bits |= b::RENDER_FX8;
        } else if to.render_fx < 0x8000 {
            bits |= b::RENDER_FX16;
        } else {
            bits |= b::RENDER_FX8 | b::RENDER_FX16;
        }
    }

    if to.solid != from.solid {
        bits |= b::SOLID;
    }

    // events are never delta compressed: present means fire it this frame
    if to.event != 0 {
        bits |= b::EVENT;
    }

    if to.model_index != from.model_index {
        bits |= b::MODEL;
    }
    if to.model_index2 != from.model_index2 {
        bits |= b::MODEL2;
    }
    if to.model_index3 != from.model_index3 {
        bits |= b::MODEL3;
    }
    if to.model_index4 != from.model_index4 {
        bits |= b::MODEL4;
    }

    if to.sound != from.sound {
        bits |= b::SOUND;
    }

    if new_entity || to.render_fx & RF_BEAM != 0 {
        bits |= b::OLD_ORIGIN;
    }

    if bits == 0 && !force {
        return Ok(()); // nothing to send
    }

    if bits & 0xFF00_0000 != 0 {
        bits |= b::MORE_BITS3 | b::MORE_BITS2 | b::MORE_BITS1;
    } else if bits & 0x00FF_0000 != 0 {
        bits |= b::MORE_BITS2 | b::MORE_BITS1;
    } else if bits & 0x0000_FF00 != 0 {
        bits |= b::MORE_BITS1;
    }

    writer.write_u8((bits & 255) as u8)?;
    if bits & 0xFF00_0000 != 0 {
        writer.write_u8(((bits >> 8) & 255) as u8)?;
        writer.write_u8(((bits >> 16) & 255) as u8)?;
        writer.write_u8(((bits >> 24) & 255) as u8)?;
    } else if bits & 0x00FF_0000 != 0 {
        writer.write_u8(((bits >> 8) & 255) as u8)?;
        writer.write_u8(((bits >> 16) & 255) as u8)?;
    } else if bits & 0x0000_FF00 != 0 {
        writer.write_u8(((bits >> 8) & 255) as u8)?;
    }

    if bits & b::NUMBER16 != 0 {
        writer.write_i16(to.number as i16)?;
    } else {
        writer.write_u8(to.number as u8)?;
    }

    if bits & b::MODEL != 0 {
        writer.write_u8(to.model_index)?;
    }
    if bits & b::MODEL2 != 0 {
        writer.write_u8(to.model_index2)?;
    }
    if bits & b::MODEL3 != 0 {
        writer.write_u8(to.model_index3)?;
    }
    if bits & b::MODEL4 != 0 {
        writer.write_u8(to.model_index4)?;
    }

    if bits & b::FRAME8 != 0 {
        writer.write_u8(to.frame as u8)?;
    }
    if bits & b::FRAME16 != 0 {
        writer.write_i16(to.frame as i16)?;
    }

    if bits & b::SKIN8 != 0 && bits & b::SKIN16 != 0 {
        writer.write_i32(to.skin as i32)?;
    } else if bits & b::SKIN8 != 0 {
        writer.write_u8(to.skin as u8)?;
    } else if bits & b::SKIN16 != 0 {
        writer.write_i16(to.skin as i16)?;
    }

    if bits & b::EFFECTS8 != 0 && bits & b::EFFECTS16 != 0 {
        writer.write_i32(to.effects as i32)?;
    } else if bits & b::EFFECTS8 != 0 {
        writer.write_u8(to.effects as u8)?;
    } else if bits & b::EFFECTS16 != 0 {
        writer.write_i16(to.effects as i16)?;
    }

    if bits & b::RENDER_FX8 != 0 && bits & b::RENDER_FX16 != 0 {
        writer.write_i32(to.render_fx as i32)?;
    } else if bits & b::RENDER_FX8 != 0 {
        writer.write_u8(to.render_fx as u8)?;
    } else if bits & b::RENDER_FX16 != 0 {
        writer.write_i16(to.render_fx as i16)?;
    }

    if bits & b::ORIGIN_X != 0 {
        writer.write_coord(to.origin[0])?;
    }
    if bits & b::ORIGIN_Y != 0 {
        writer.write_coord(to.origin[1])?;
    }
    if bits & b::ORIGIN_Z != 0 {
        writer.write_coord(to.origin[2])?;
    }

    if bits & b::ANGLE_X != 0 {
        writer.write_angle(to.angles[0])?;
    }
    if bits & b::ANGLE_Y != 0 {
        writer.write_angle(to.angles[1])?;
    }
    if bits & b::ANGLE_Z != 0 {
        writer.write_angle(to.angles[2])?;
    }

    if bits & b::OLD_ORIGIN != 0 {
        writer.write_pos(&to.old_origin)?;
    }

    if bits & b::SOUND != 0 {
        writer.write_u8(to.sound)?;
    }
    if bits & b::EVENT != 0 {
        writer.write_u8(to.event)?;
    }
    if bits & b::SOLID != 0 {
        writer.write_i16(to.solid as i16)?;
    }

    Ok(())
}

/// Reads an entity delta header: the change mask and the entity number.
///
/// Returns `(number, bits)`. A number of zero terminates the packet's entity
/// list; negative numbers only appear on reader overrun, which the caller's
/// top-level loop detects.
pub fn parse_entity_header(reader: &mut MessageReader<'_>) -> (i32, u32) {
    let mut total = reader.read_u8().max(0) as u32;
    if total & b::MORE_BITS1 != 0 {
        total |= (reader.read_u8().max(0) as u32) << 8;
    }
    if total & b::MORE_BITS2 != 0 {
        total |= (reader.read_u8().max(0) as u32) << 16;
    }
    if total & b::MORE_BITS3 != 0 {
        total |= (reader.read_u8().max(0) as u32) << 24;
    }

    let number = if total & b::NUMBER16 != 0 {
        reader.read_i16()
    } else {
        reader.read_u8()
    };

    (number, total)
}

/// Applies a parsed delta: copies `from`, then overwrites the fields named
/// by `bits`.
///
/// `old_origin` is seeded from the reference origin and `event` is cleared
/// when its bit is absent; a zero-bit delta therefore reproduces `from`
/// except for those two reassignments.
pub fn parse_entity_delta(
    from: &EntityState,
    to: &mut EntityState,
    number: u16,
    bits: u32,
    reader: &mut MessageReader<'_>,
) {
    *to = *from;
    to.old_origin = from.origin;
    to.number = number;

    if bits & b::MODEL != 0 {
        to.model_index = reader.read_u8() as u8;
    }
    if bits & b::MODEL2 != 0 {
        to.model_index2 = reader.read_u8() as u8;
    }
    if bits & b::MODEL3 != 0 {
        to.model_index3 = reader.read_u8() as u8;
    }
    if bits & b::MODEL4 != 0 {
        to.model_index4 = reader.read_u8() as u8;
    }

    if bits & b::FRAME8 != 0 {
        to.frame = reader.read_u8() as u16;
    }
    if bits & b::FRAME16 != 0 {
        to.frame = reader.read_i16() as u16;
    }

    if bits & b::SKIN8 != 0 && bits & b::SKIN16 != 0 {
        to.skin = reader.read_i32() as u32;
    } else if bits & b::SKIN8 != 0 {
        to.skin = reader.read_u8() as u32;
    } else if bits & b::SKIN16 != 0 {
        to.skin = reader.read_i16() as u16 as u32;
    }

    if bits & b::EFFECTS8 != 0 && bits & b::EFFECTS16 != 0 {
        to.effects = reader.read_i32() as u32;
    } else if bits & b::EFFECTS8 != 0 {
        to.effects = reader.read_u8() as u32;
    } else if bits & b::EFFECTS16 != 0 {
        to.effects = reader.read_i16() as u16 as u32;
    }

    if bits & b::RENDER_FX8 != 0 && bits & b::RENDER_FX16 != 0 {
        to.render_fx = reader.read_i32() as u32;
    } else if bits & b::RENDER_FX8 != 0 {
        to.render_fx = reader.read_u8() as u32;
    } else if bits & b::RENDER_FX16 != 0 {
        to.render_fx = reader.read_i16() as u16 as u32;
    }

    if bits & b::ORIGIN_X != 0 {
        to.origin[0] = reader.read_coord();
    }
    if bits & b::ORIGIN_Y != 0 {
        to.origin[1] = reader.read_coord();
    }
    if bits & b::ORIGIN_Z != 0 {
        to.origin[2] = reader.read_coord();
    }

    if bits & b::ANGLE_X != 0 {
        to.angles[0] = reader.read_angle();
    }
    if bits & b::ANGLE_Y != 0 {
        to.angles[1] = reader.read_angle();
    }
    if bits & b::ANGLE_Z != 0 {
        to.angles[2] = reader.read_angle();
    }

    if bits & b::OLD_ORIGIN != 0 {
        to.old_origin = reader.read_pos();
    }

    if bits & b::SOUND != 0 {
        to.sound = reader.read_u8() as u8;
    }

    if bits & b::EVENT != 0 {
        to.event = reader.read_u8() as u8;
    } else {
        to.event = 0;
    }

    if bits & b::SOLID != 0 {
        to.solid = reader.read_i16() as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msg::MessageReader;

    fn sample_entity(number: u16) -> EntityState {
        EntityState {
            number,
            model_index: 3,
            frame: 7,
            origin: [10.0, -24.5, 88.125],
            angles: [0.0, 90.0, 0.0],
            solid: 4129,
            ..EntityState::default()
        }
    }

    fn roundtrip(from: &EntityState, to: &EntityState, new_entity: bool) -> EntityState {
        let mut writer = MessageWriter::new(256);
        write_entity_delta(from, to, &mut writer, true, new_entity).unwrap();

        let mut reader = MessageReader::new(writer.as_slice());
        let (number, bits) = parse_entity_header(&mut reader);
        assert_eq!(number, i32::from(to.number));

        let mut out = EntityState::default();
        parse_entity_delta(from, &mut out, number as u16, bits, &mut reader);
        assert!(!reader.is_overrun());
        assert_eq!(reader.remaining(), 0);
        out
    }

    #[test]
    fn unchanged_entity_costs_two_bytes() {
        let ent = sample_entity(5);
        let mut writer = MessageWriter::new(256);
        write_entity_delta(&ent, &ent, &mut writer, true, false).unwrap();
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn unchanged_entity_without_force_writes_nothing() {
        let ent = sample_entity(5);
        let mut writer = MessageWriter::new(256);
        write_entity_delta(&ent, &ent, &mut writer, false, false).unwrap();
        assert!(writer.is_empty());
    }

    #[test]
    fn zero_bit_delta_reproduces_the_reference() {
        let ent = sample_entity(5);
        let out = roundtrip(&ent, &ent, false);

        let mut expect = ent;
        expect.old_origin = ent.origin;
        assert_eq!(out, expect);
    }

    #[test]
    fn origin_change_roundtrips_exactly() {
        let from = sample_entity(5);
        let mut to = from;
        to.origin = [11.25, -24.5, 90.0];

        let out = roundtrip(&from, &to, false);
        assert_eq!(out.origin, to.origin);
        assert_eq!(out.old_origin, from.origin);
    }

    #[test]
    fn high_entity_number_uses_the_wide_field() {
        let from = EntityState {
            number: 600,
            ..EntityState::default()
        };
        let to = from;
        let out = roundtrip(&from, &to, false);
        assert_eq!(out.number, 600);
    }

    #[test]
    fn wide_skin_selects_wider_encodings() {
        let from = sample_entity(5);

        for skin in [200u32, 0x1234, 0x0012_3456] {
            let mut to = from;
            to.skin = skin;
            let out = roundtrip(&from, &to, false);
            assert_eq!(out.skin, skin, "skin {skin:#x}");
        }
    }

    #[test]
    fn effects_and_render_fx_width_selection() {
        let from = sample_entity(5);
        for value in [1u32, 0x4000, 0x0001_0000] {
            let mut to = from;
            to.effects = value;
            to.render_fx = value;
            let out = roundtrip(&from, &to, false);
            assert_eq!(out.effects, value);
            assert_eq!(out.render_fx, value);
        }
    }

    #[test]
    fn event_is_not_carried_forward() {
        let mut from = sample_entity(5);
        from.event = 3;

        // reference had an event, new state does not: no EVENT bit, and the
        // parsed state must clear it
        let mut to = from;
        to.event = 0;
        let out = roundtrip(&from, &to, false);
        assert_eq!(out.event, 0);
    }

    #[test]
    fn new_entity_transmits_old_origin() {
        let from = EntityState::default();
        let mut to = sample_entity(9);
        to.old_origin = [1.0, 2.0, 3.0];

        let out = roundtrip(&from, &to, true);
        assert_eq!(out.old_origin, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn header_parses_all_four_mask_bytes() {
        let from = sample_entity(5);
        let mut to = from;
        to.sound = 9; // bit 26 forces the fourth mask byte

        let mut writer = MessageWriter::new(64);
        write_entity_delta(&from, &to, &mut writer, false, false).unwrap();

        let mut reader = MessageReader::new(writer.as_slice());
        let (number, bits) = parse_entity_header(&mut reader);
        assert_eq!(number, 5);
        assert!(bits & entity_bits::SOUND != 0);
        assert!(bits & entity_bits::MORE_BITS3 != 0);
    }

    #[test]
    fn truncated_header_returns_negative_number() {
        let mut reader = MessageReader::new(&[]);
        let (number, _) = parse_entity_header(&mut reader);
        assert!(number < 0);
        assert!(reader.is_overrun());
    }
}
