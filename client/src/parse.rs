//! Server message parsing: the top-level dispatch loop, frame assembly, and
//! the packet-entity merge.

use codec::{entity_bits, parse_entity_delta, parse_entity_header, parse_player_delta, EntityState, MAX_ENTITIES};
use glam::Vec3;
use msg::MessageReader;

use crate::error::ProtocolError;
use crate::events::{ClientEvents, SoundStart};
use crate::frame::{Frame, MAX_AREA_BYTES, MAX_PARSE_ENTITIES, SERVER_FRAME_MS, UPDATE_MASK};
use crate::session::{ClientSession, ConnState, ServerInfo};
use crate::tent::parse_temp_entity;
use crate::wire::{cs, ev, snd, svc, MAX_CONFIGSTRINGS, PROTOCOL_VERSION};
use crate::{prediction, COORD_TO_WORLD};

/// Sentinel old-entity number meaning "the old list is exhausted".
const OLD_LIST_DONE: i32 = 99_999;

/// What the caller should do after a successfully parsed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Keep going.
    Continue,
    /// The server told us to leave.
    Disconnect,
    /// The server is restarting; reconnect to the same address.
    Reconnect,
}

/// Parses one complete in-band server message.
///
/// All fatal errors surface here, between one message and the next, never
/// inside the nested delta helpers; the receive loop performs the single
/// disconnect cleanup.
pub fn parse_server_message(
    cl: &mut ClientSession,
    reader: &mut MessageReader<'_>,
    events: &mut dyn ClientEvents,
) -> Result<ParseOutcome, ProtocolError> {
    loop {
        if reader.is_overrun() {
            return Err(ProtocolError::BadRead {
                position: reader.position(),
            });
        }

        let cmd = reader.read_u8();
        if cmd == -1 {
            break; // end of message
        }

        match cmd as u8 {
            svc::NOP => {}

            svc::DISCONNECT => {
                events.on_server_dropped(false);
                return Ok(ParseOutcome::Disconnect);
            }

            svc::RECONNECT => {
                events.on_server_dropped(true);
                return Ok(ParseOutcome::Reconnect);
            }

            svc::PRINT => {
                let level = reader.read_u8().max(0) as u8;
                let text = reader.read_string();
                events.on_print(level, &text);
            }

            svc::STUFFTEXT => {
                let text = reader.read_string();
                events.on_stufftext(&text);
            }

            svc::SERVERDATA => parse_server_data(cl, reader, events)?,

            svc::CONFIGSTRING => parse_config_string(cl, reader, events)?,

            svc::SPAWNBASELINE => parse_baseline(cl, reader)?,

            svc::SOUND => {
                let sound = parse_sound(reader)?;
                events.on_sound(&sound);
            }

            svc::TEMP_ENTITY => {
                let event = parse_temp_entity(reader)?;
                events.on_temp_entity(&event);
            }

            svc::MUZZLE_FLASH => {
                let entity = read_entity_number(reader)?;
                let effect = reader.read_u8().max(0) as u8;
                events.on_muzzle_flash(entity, effect);
            }

            svc::MUZZLE_FLASH2 => {
                let entity = read_entity_number(reader)?;
                let effect = reader.read_u8().max(0) as u8;
                events.on_muzzle_flash2(entity, effect);
            }

            svc::FRAME => parse_frame(cl, reader, events)?,

            svc::PLAYERINFO | svc::PACKETENTITIES => {
                return Err(ProtocolError::OutOfPlaceMessage { tag: cmd as u8 });
            }

            tag => return Err(ProtocolError::UnknownMessage { tag }),
        }
    }

    Ok(ParseOutcome::Continue)
}

fn read_entity_number(reader: &mut MessageReader<'_>) -> Result<u16, ProtocolError> {
    let number = reader.read_i16();
    if number < 1 || number >= MAX_ENTITIES as i32 {
        return Err(ProtocolError::BadEntityNumber { number });
    }
    Ok(number as u16)
}

fn parse_server_data(
    cl: &mut ClientSession,
    reader: &mut MessageReader<'_>,
    events: &mut dyn ClientEvents,
) -> Result<(), ProtocolError> {
    // a new map is starting: all level-local state is stale
    clear_level_state(cl);

    let protocol = reader.read_i32();
    if protocol != PROTOCOL_VERSION {
        return Err(ProtocolError::BadProtocolVersion { version: protocol });
    }

    cl.server = ServerInfo {
        protocol,
        spawn_count: reader.read_i32(),
        demo_playback: reader.read_u8() != 0,
        game_dir: reader.read_string(),
        player_num: reader.read_i16() as i16,
        level_name: reader.read_string(),
    };
    log::info!("entering {}", cl.server.level_name);
    events.on_server_info(&cl.server);
    Ok(())
}

/// Drops all level-local state while keeping the connection itself.
fn clear_level_state(cl: &mut ClientSession) {
    for slot in &mut cl.configstrings {
        slot.clear();
    }
    for ent in &mut cl.entities {
        *ent = Default::default();
    }
    for state in &mut cl.parse_entities {
        *state = EntityState::default();
    }
    for frame in &mut cl.frames {
        *frame = Frame::default();
    }
    cl.frame = Frame::default();
    cl.parse_entity_count = 0;
    cl.time = 0;
    cl.prediction_error = Vec3::ZERO;
    cl.predicted_step = 0.0;
}

fn parse_config_string(
    cl: &mut ClientSession,
    reader: &mut MessageReader<'_>,
    events: &mut dyn ClientEvents,
) -> Result<(), ProtocolError> {
    let index = reader.read_i16();
    if index < 0 || index as usize >= MAX_CONFIGSTRINGS {
        return Err(ProtocolError::BadConfigString { index });
    }
    let index = index as usize;
    let value = reader.read_string();

    if index == cs::AIR_ACCEL {
        cl.move_constants.air_accelerate = value.trim().parse().unwrap_or(0.0);
    }

    cl.configstrings[index] = value;
    events.on_configstring(index, &cl.configstrings[index]);
    Ok(())
}

fn parse_baseline(
    cl: &mut ClientSession,
    reader: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    let (number, bits) = parse_entity_header(reader);
    if number <= 0 || number >= MAX_ENTITIES as i32 {
        return Err(ProtocolError::BadEntityNumber { number });
    }

    let null_state = EntityState::default();
    let mut baseline = EntityState::default();
    parse_entity_delta(&null_state, &mut baseline, number as u16, bits, reader);
    cl.entities[number as usize].baseline = baseline;
    Ok(())
}

fn parse_sound(reader: &mut MessageReader<'_>) -> Result<SoundStart, ProtocolError> {
    let flags = reader.read_u8().max(0) as u8;
    let sound = reader.read_u8().max(0) as u8;

    let volume = if flags & snd::VOLUME != 0 {
        reader.read_u8() as f32 / 255.0
    } else {
        1.0
    };
    let attenuation = if flags & snd::ATTENUATION != 0 {
        reader.read_u8() as f32 / 64.0
    } else {
        1.0
    };
    let time_offset = if flags & snd::OFFSET != 0 {
        reader.read_u8() as f32 * 0.001
    } else {
        0.0
    };

    let entity_channel = if flags & snd::ENT != 0 {
        let packed = reader.read_i16();
        let entity = packed >> 3;
        if entity < 0 || entity >= MAX_ENTITIES as i32 {
            return Err(ProtocolError::BadSoundEntity { number: entity });
        }
        Some((entity as u16, (packed & 7) as u8))
    } else {
        None
    };

    let position = if flags & snd::POS != 0 {
        Some(reader.read_pos())
    } else {
        None
    };

    Ok(SoundStart {
        sound,
        volume,
        attenuation,
        time_offset,
        entity_channel,
        position,
    })
}

fn parse_frame(
    cl: &mut ClientSession,
    reader: &mut MessageReader<'_>,
    events: &mut dyn ClientEvents,
) -> Result<(), ProtocolError> {
    cl.frame = Frame::default();
    cl.frame.server_frame = reader.read_i32();
    cl.frame.delta_frame = reader.read_i32();
    cl.frame.server_time = cl.frame.server_frame * SERVER_FRAME_MS;
    cl.frame.suppress_count = reader.read_u8().max(0) as u8;

    // Resolve the delta reference. When the reference is gone the frame is
    // still parsed to completion so the stream stays aligned, but it is
    // flagged invalid and ignored by rendering and prediction; the server's
    // next self-contained frame recovers naturally.
    let old: Option<Frame> = if cl.frame.delta_frame <= 0 {
        cl.frame.valid = true; // self-contained
        None
    } else {
        let stored = cl.frames[(cl.frame.delta_frame & UPDATE_MASK) as usize];
        if !stored.valid {
            log::warn!("delta from an invalid frame");
        }
        if stored.server_frame != cl.frame.delta_frame {
            log::warn!("delta frame too old");
        } else if cl.parse_entity_count - stored.parse_entities
            > MAX_PARSE_ENTITIES as i32 - 128
        {
            log::warn!("delta parse entities too old");
        } else {
            cl.frame.valid = true;
        }
        Some(stored)
    };

    // keep the local clock within one server tick of the stream
    if cl.time > cl.frame.server_time {
        cl.time = cl.frame.server_time;
    } else if cl.time < cl.frame.server_time - SERVER_FRAME_MS {
        cl.time = cl.frame.server_time - SERVER_FRAME_MS;
    }

    let area_len = reader.read_u8().max(0) as usize;
    if area_len > MAX_AREA_BYTES {
        return Err(ProtocolError::AreaBitsTooLong { len: area_len });
    }
    let area = reader.read_bytes(area_len);
    cl.frame.areabits[..area.len()].copy_from_slice(area);

    let tag = reader.read_u8();
    if tag != i32::from(svc::PLAYERINFO) {
        return Err(ProtocolError::ExpectedPlayerInfo { tag });
    }
    let from_ps = old.map(|f| f.playerstate).unwrap_or_default();
    let mut playerstate = cl.frame.playerstate;
    parse_player_delta(&from_ps, &mut playerstate, reader, cl.server.demo_playback);
    cl.frame.playerstate = playerstate;

    let tag = reader.read_u8();
    if tag != i32::from(svc::PACKETENTITIES) {
        return Err(ProtocolError::ExpectedPacketEntities { tag });
    }
    parse_packet_entities(cl, old.as_ref(), reader)?;

    // save off for later delta references
    let slot = (cl.frame.server_frame & UPDATE_MASK) as usize;
    cl.frames[slot] = cl.frame;

    if cl.frame.valid {
        // the first valid frame completes the connection
        if cl.state != ConnState::Active {
            cl.state = ConnState::Active;
            let origin = cl.frame.playerstate.pmove.origin;
            cl.predicted_origin = Vec3::new(
                f32::from(origin[0]),
                f32::from(origin[1]),
                f32::from(origin[2]),
            ) * COORD_TO_WORLD;
            cl.predicted_angles = cl.frame.playerstate.view_angles;
            events.on_loading_done();
        }

        fire_entity_events(cl, events);
        prediction::check_prediction_error(cl);
    }

    Ok(())
}

fn fire_entity_events(cl: &ClientSession, events: &mut dyn ClientEvents) {
    let frame = cl.frame;
    for index in 0..frame.num_entities {
        let state = *cl.frame_entity(&frame, index);
        if state.event != 0 {
            events.on_entity_event(state.number, state.event);
        }
    }
}

/// Returns the entity number and state at `index` in the old frame's list,
/// or the done sentinel past its end.
fn old_entity_at(cl: &ClientSession, old: Option<&Frame>, index: i32) -> (i32, EntityState) {
    match old {
        Some(frame) if index < frame.num_entities => {
            let state = *cl.frame_entity(frame, index);
            (i32::from(state.number), state)
        }
        _ => (OLD_LIST_DONE, EntityState::default()),
    }
}

/// Merges the server's explicit entity list with the old frame's list.
///
/// Both lists are in ascending entity-number order; the explicit list is
/// terminated by entity number zero. Entities only in the old list are
/// carried forward unchanged, removals must name their old entry, new
/// entities delta from their baseline.
fn parse_packet_entities(
    cl: &mut ClientSession,
    old: Option<&Frame>,
    reader: &mut MessageReader<'_>,
) -> Result<(), ProtocolError> {
    cl.frame.parse_entities = cl.parse_entity_count;
    cl.frame.num_entities = 0;

    let mut old_index = 0;
    let (mut old_num, mut old_state) = old_entity_at(cl, old, old_index);

    loop {
        let (new_num, bits) = parse_entity_header(reader);
        if reader.is_overrun() {
            return Err(ProtocolError::BadRead {
                position: reader.position(),
            });
        }
        if new_num < 0 || new_num >= MAX_ENTITIES as i32 {
            return Err(ProtocolError::BadEntityNumber { number: new_num });
        }
        if new_num == 0 {
            break;
        }

        while old_num < new_num {
            // old entity unchanged by this packet: carry it forward
            let carried = old_state;
            delta_entity(cl, old_num as u16, &carried, 0, reader);
            old_index += 1;
            (old_num, old_state) = old_entity_at(cl, old, old_index);
        }

        if bits & entity_bits::REMOVE != 0 {
            // present in the old frame, absent from the new one
            if old_num != new_num {
                log::debug!("remove of non-present entity {new_num}");
            }
            old_index += 1;
            (old_num, old_state) = old_entity_at(cl, old, old_index);
            continue;
        }

        if old_num == new_num {
            // delta from the previous frame's state
            let from = old_state;
            delta_entity(cl, new_num as u16, &from, bits, reader);
            old_index += 1;
            (old_num, old_state) = old_entity_at(cl, old, old_index);
            continue;
        }

        // old_num > new_num: the entity just entered; delta from baseline
        let baseline = cl.entities[new_num as usize].baseline;
        delta_entity(cl, new_num as u16, &baseline, bits, reader);
    }

    // everything remaining in the old frame is unchanged
    while old_num != OLD_LIST_DONE {
        let carried = old_state;
        delta_entity(cl, old_num as u16, &carried, 0, reader);
        old_index += 1;
        (old_num, old_state) = old_entity_at(cl, old, old_index);
    }

    Ok(())
}

/// Parses one entity delta into the ring and updates that entity's
/// interpolation state.
fn delta_entity(
    cl: &mut ClientSession,
    number: u16,
    old: &EntityState,
    bits: u32,
    reader: &mut MessageReader<'_>,
) {
    let ring_index = (cl.parse_entity_count & (MAX_PARSE_ENTITIES as i32 - 1)) as usize;
    cl.parse_entity_count += 1;
    cl.frame.num_entities += 1;

    parse_entity_delta(old, &mut cl.parse_entities[ring_index], number, bits, reader);
    let state = cl.parse_entities[ring_index];

    let frame_num = cl.frame.server_frame;
    let ent = &mut cl.entities[number as usize];

    // discontinuities force a snap instead of a lerp
    if state.model_index != ent.current.model_index
        || state.model_index2 != ent.current.model_index2
        || state.model_index3 != ent.current.model_index3
        || state.model_index4 != ent.current.model_index4
        || (state.origin[0] - ent.current.origin[0]).abs() > 512.0
        || (state.origin[1] - ent.current.origin[1]).abs() > 512.0
        || (state.origin[2] - ent.current.origin[2]).abs() > 512.0
        || state.event == ev::PLAYER_TELEPORT
        || state.event == ev::OTHER_TELEPORT
    {
        ent.server_frame = -99;
    }

    if ent.server_frame != frame_num - 1 {
        // wasn't in the last frame: seed the previous state so the first
        // lerp is a no-op
        ent.prev = state;
        if state.event == ev::PLAYER_TELEPORT || state.event == ev::OTHER_TELEPORT {
            ent.prev.origin = state.origin;
            ent.lerp_origin = state.origin;
        } else {
            ent.prev.origin = state.old_origin;
            ent.lerp_origin = state.old_origin;
        }
    } else {
        ent.prev = ent.current;
    }

    ent.server_frame = frame_num;
    ent.current = state;
}
