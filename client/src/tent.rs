//! Temporary-entity message parsing.
//!
//! Effects themselves belong to the excluded cosmetic layer; this module
//! only knows each kind's payload shape so the stream stays byte-aligned,
//! and hands the decoded event to the sink.

use msg::MessageReader;

use crate::error::ProtocolError;

/// Temporary-entity kinds, by wire value.
pub mod te {
    pub const GUNSHOT: u8 = 0;
    pub const BLOOD: u8 = 1;
    pub const BLASTER: u8 = 2;
    pub const RAILTRAIL: u8 = 3;
    pub const SHOTGUN: u8 = 4;
    pub const EXPLOSION1: u8 = 5;
    pub const EXPLOSION2: u8 = 6;
    pub const ROCKET_EXPLOSION: u8 = 7;
    pub const GRENADE_EXPLOSION: u8 = 8;
    pub const SPARKS: u8 = 9;
    pub const SPLASH: u8 = 10;
    pub const BUBBLETRAIL: u8 = 11;
    pub const SCREEN_SPARKS: u8 = 12;
    pub const SHIELD_SPARKS: u8 = 13;
    pub const BULLET_SPARKS: u8 = 14;
    pub const LASER_SPARKS: u8 = 15;
    pub const PARASITE_ATTACK: u8 = 16;
    pub const ROCKET_EXPLOSION_WATER: u8 = 17;
    pub const GRENADE_EXPLOSION_WATER: u8 = 18;
    pub const MEDIC_CABLE_ATTACK: u8 = 19;
    pub const BFG_EXPLOSION: u8 = 20;
    pub const BFG_BIGEXPLOSION: u8 = 21;
    pub const BOSS_TELEPORT: u8 = 22;
    pub const BFG_LASER: u8 = 23;
    pub const GRAPPLE_CABLE: u8 = 24;
    pub const WELDING_SPARKS: u8 = 25;
    pub const GREEN_BLOOD: u8 = 26;
    pub const BLUE_HYPERBLASTER: u8 = 27;
    pub const PLASMA_EXPLOSION: u8 = 28;
    pub const TUNNEL_SPARKS: u8 = 29;
}

/// A decoded temporary-entity event, grouped by payload shape.
#[derive(Debug, Clone, PartialEq)]
pub enum TempEntityEvent {
    /// Directed particle burst at a point.
    Particles {
        kind: u8,
        origin: [f32; 3],
        direction: [f32; 3],
    },
    /// Particle burst with an explicit count and palette color.
    ColoredParticles {
        kind: u8,
        count: u8,
        origin: [f32; 3],
        direction: [f32; 3],
        color: u8,
    },
    /// Point effect (explosions, teleport flashes).
    Explosion { kind: u8, origin: [f32; 3] },
    /// Line effect between two points.
    Line {
        kind: u8,
        start: [f32; 3],
        end: [f32; 3],
    },
    /// Beam attached to an entity.
    Beam {
        kind: u8,
        entity: u16,
        start: [f32; 3],
        end: [f32; 3],
    },
    /// Beam attached to an entity with an attachment offset.
    OffsetBeam {
        kind: u8,
        entity: u16,
        start: [f32; 3],
        end: [f32; 3],
        offset: [f32; 3],
    },
}

fn read_dir(reader: &mut MessageReader<'_>) -> Result<[f32; 3], ProtocolError> {
    reader.read_dir().ok_or(ProtocolError::BadDirection)
}

/// Parses one temporary-entity message body.
pub fn parse_temp_entity(
    reader: &mut MessageReader<'_>,
) -> Result<TempEntityEvent, ProtocolError> {
    let kind_raw = reader.read_u8();
    let kind = kind_raw as u8;

    let event = match kind {
        te::BLOOD
        | te::GUNSHOT
        | te::SPARKS
        | te::BULLET_SPARKS
        | te::SCREEN_SPARKS
        | te::SHIELD_SPARKS
        | te::SHOTGUN
        | te::BLASTER
        | te::GREEN_BLOOD => TempEntityEvent::Particles {
            kind,
            origin: reader.read_pos(),
            direction: read_dir(reader)?,
        },

        te::SPLASH | te::LASER_SPARKS | te::WELDING_SPARKS | te::TUNNEL_SPARKS => {
            let count = reader.read_u8().max(0) as u8;
            let origin = reader.read_pos();
            let direction = read_dir(reader)?;
            let color = reader.read_u8().max(0) as u8;
            TempEntityEvent::ColoredParticles {
                kind,
                count,
                origin,
                direction,
                color,
            }
        }

        te::EXPLOSION1
        | te::EXPLOSION2
        | te::ROCKET_EXPLOSION
        | te::GRENADE_EXPLOSION
        | te::ROCKET_EXPLOSION_WATER
        | te::GRENADE_EXPLOSION_WATER
        | te::PLASMA_EXPLOSION
        | te::BFG_EXPLOSION
        | te::BFG_BIGEXPLOSION
        | te::BOSS_TELEPORT => TempEntityEvent::Explosion {
            kind,
            origin: reader.read_pos(),
        },

        // the blue hyperblaster impact historically reads its direction as
        // a position; the shape is preserved so the stream stays aligned
        te::RAILTRAIL | te::BUBBLETRAIL | te::BFG_LASER | te::BLUE_HYPERBLASTER => {
            TempEntityEvent::Line {
                kind,
                start: reader.read_pos(),
                end: reader.read_pos(),
            }
        }

        te::PARASITE_ATTACK | te::MEDIC_CABLE_ATTACK => TempEntityEvent::Beam {
            kind,
            entity: reader.read_i16().max(0) as u16,
            start: reader.read_pos(),
            end: reader.read_pos(),
        },

        te::GRAPPLE_CABLE => TempEntityEvent::OffsetBeam {
            kind,
            entity: reader.read_i16().max(0) as u16,
            start: reader.read_pos(),
            end: reader.read_pos(),
            offset: reader.read_pos(),
        },

        _ => return Err(ProtocolError::BadTempEntity { kind: kind_raw }),
    };

    Ok(event)
}
