//! The client session: every piece of per-connection state, owned in one
//! place and passed explicitly into each subsystem.

use codec::{EntityState, MAX_ENTITIES};
use glam::Vec3;
use msg::MessageWriter;
use netchan::{ChanSide, Netchan};
use pmove::{MoveConstants, UserCmd};

use crate::events::{ModelRegistry, NetAddr};
use crate::frame::{Frame, MAX_PARSE_ENTITIES, UPDATE_BACKUP};
use crate::wire::{cs, MAX_CONFIGSTRINGS};

/// Capacity of the pending-command ring. Must be a power of two.
pub const CMD_BACKUP: usize = 128;

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    /// Idle, no peer.
    #[default]
    Disconnected,
    /// Requesting a challenge from the server.
    Challenging,
    /// Challenge in hand, asking to connect.
    Connecting,
    /// Channel established, waiting for the first valid frame.
    Connected,
    /// Receiving valid frames; fully in game.
    Active,
}

/// Handshake data the server sent in its `serverdata` message.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub protocol: i32,
    /// Server spawn count, echoed to detect map changes.
    pub spawn_count: i32,
    /// True when the stream is a demo replay rather than a live game.
    pub demo_playback: bool,
    pub game_dir: String,
    /// Our entity number minus one; negative while spectating a demo.
    pub player_num: i16,
    pub level_name: String,
}

/// Interpolation bookkeeping for one networked entity.
#[derive(Debug, Clone, Copy)]
pub struct ClientEntity {
    /// Spawn-time default state; delta reference for entities entering the
    /// frame.
    pub baseline: EntityState,
    /// State in the latest frame.
    pub current: EntityState,
    /// State in the previous frame this entity appeared in.
    pub prev: EntityState,
    /// Last server frame that included this entity; forced to a sentinel to
    /// suppress interpolation across discontinuities.
    pub server_frame: i32,
    /// Interpolation origin anchor for trail effects.
    pub lerp_origin: [f32; 3],
}

impl Default for ClientEntity {
    fn default() -> Self {
        Self {
            baseline: EntityState::default(),
            current: EntityState::default(),
            prev: EntityState::default(),
            server_frame: -1,
            lerp_origin: [0.0; 3],
        }
    }
}

/// All state for one connection to a server.
///
/// Replaces the original's global mutable singletons: the caller owns the
/// session and passes it by reference into every subsystem call, so there is
/// no ambient state anywhere in the core.
#[derive(Debug)]
pub struct ClientSession {
    pub state: ConnState,
    pub netchan: Netchan,

    /// Where we are connected (or connecting to).
    pub server_addr: Option<NetAddr>,
    /// Client-chosen channel disambiguator, survives NAT port remaps.
    pub qport: u16,
    /// Challenge token from the handshake.
    pub challenge: i32,
    /// Key/value string sent with the connect request.
    pub user_info: String,
    /// Clock of the last handshake packet, for resend pacing.
    pub resend_time: i64,

    pub server: ServerInfo,
    pub configstrings: Vec<String>,

    /// Per-entity interpolation state and baselines.
    pub entities: Vec<ClientEntity>,
    /// Shared ring of parsed entity states referenced by frames.
    pub parse_entities: Vec<EntityState>,
    /// Monotonic count of parsed entities; wraps modulo the ring on access.
    pub parse_entity_count: i32,

    /// Frame history ring.
    pub frames: Vec<Frame>,
    /// Frame currently being assembled / most recently received.
    pub frame: Frame,

    /// Pending local commands awaiting acknowledgement.
    pub cmds: [UserCmd; CMD_BACKUP],
    /// Clock each command was sent at, for ping measurement.
    pub cmd_times: [i64; CMD_BACKUP],
    /// Quantized origin predicted right after each command was sent.
    pub predicted_origins: [[i16; 3]; CMD_BACKUP],

    /// Wall clock in milliseconds, advanced by the caller every host frame.
    pub realtime: i64,
    /// Duration of the last host frame in milliseconds.
    pub frame_time_ms: i64,
    /// Simulation clock, clamped to the server tick window every frame.
    pub time: i32,
    /// Interpolation weight between the previous and current frame.
    pub lerp_frac: f32,

    /// Master prediction switch (the original's `cl_predict` toggle).
    pub prediction_enabled: bool,
    /// Movement tuning; `air_accelerate` tracks the server configstring.
    pub move_constants: MoveConstants,

    /// Result of replaying unacknowledged commands.
    pub predicted_origin: Vec3,
    pub predicted_angles: [f32; 3],
    /// Decaying correction blended into the view after a misprediction.
    pub prediction_error: Vec3,
    /// Stair-step height being smoothed out of the view.
    pub predicted_step: f32,
    pub predicted_step_time: i64,
}

impl ClientSession {
    /// Creates an idle session.
    ///
    /// The qport should vary between processes; the caller picks it (the
    /// original hashes the startup clock).
    #[must_use]
    pub fn new(qport: u16) -> Self {
        Self {
            state: ConnState::Disconnected,
            netchan: Netchan::new(ChanSide::Client { qport }, 0),
            server_addr: None,
            qport,
            challenge: 0,
            user_info: String::new(),
            resend_time: 0,
            server: ServerInfo::default(),
            configstrings: vec![String::new(); MAX_CONFIGSTRINGS],
            entities: vec![ClientEntity::default(); MAX_ENTITIES],
            parse_entities: vec![EntityState::default(); MAX_PARSE_ENTITIES],
            parse_entity_count: 0,
            frames: vec![Frame::default(); UPDATE_BACKUP],
            frame: Frame::default(),
            cmds: [UserCmd::default(); CMD_BACKUP],
            cmd_times: [0; CMD_BACKUP],
            predicted_origins: [[0; 3]; CMD_BACKUP],
            realtime: 0,
            frame_time_ms: 0,
            time: 0,
            lerp_frac: 0.0,
            prediction_enabled: true,
            move_constants: MoveConstants::default(),
            predicted_origin: Vec3::ZERO,
            predicted_angles: [0.0; 3],
            prediction_error: Vec3::ZERO,
            predicted_step: 0.0,
            predicted_step_time: 0,
        }
    }

    /// Returns `true` once the channel to the server exists.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnState::Connected | ConnState::Active)
    }

    /// Full atomic reset back to disconnected idle.
    ///
    /// This is the single cleanup point every fatal error unwinds to;
    /// nothing is partially rolled back. The qport, user info, and clocks
    /// survive so an immediate reconnect behaves sensibly.
    pub fn reset(&mut self) {
        let qport = self.qport;
        let user_info = std::mem::take(&mut self.user_info);
        let realtime = self.realtime;

        *self = Self::new(qport);
        self.user_info = user_info;
        self.realtime = realtime;
    }

    /// The entity state at `index` positions into the given frame's span of
    /// the parsed-entity ring.
    #[must_use]
    pub fn frame_entity(&self, frame: &Frame, index: i32) -> &EntityState {
        let slot = (frame.parse_entities + index) & (MAX_PARSE_ENTITIES as i32 - 1);
        &self.parse_entities[slot as usize]
    }

    /// Registers every model and sound path the server precached via
    /// configstrings, handing the paths to the excluded asset layer.
    ///
    /// Inline brush models (`*N` paths) belong to the collision module and
    /// sexed sounds (`*` prefix) are resolved per player model; both are
    /// skipped here.
    pub fn register_assets(&self, registry: &mut dyn ModelRegistry) {
        for index in cs::MODELS..cs::MODELS + cs::TABLE_LEN {
            let path = &self.configstrings[index];
            if !path.is_empty() && !path.starts_with('*') {
                registry.register_model(path);
            }
        }
        for index in cs::SOUNDS..cs::SOUNDS + cs::TABLE_LEN {
            let path = &self.configstrings[index];
            if !path.is_empty() && !path.starts_with('*') {
                registry.register_sound(path);
            }
        }
    }

    /// Queues a reliable console command for the server.
    pub fn send_string_cmd(&mut self, cmd: &str) {
        let mut buf = MessageWriter::new(cmd.len() + 2);
        let _ = buf.write_u8(crate::wire::clc::STRINGCMD);
        let _ = buf.write_string(cmd);
        let _ = self.netchan.message.write_bytes(buf.as_slice());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_idle() {
        let cl = ClientSession::new(7777);
        assert_eq!(cl.state, ConnState::Disconnected);
        assert!(!cl.is_connected());
        assert_eq!(cl.entities.len(), MAX_ENTITIES);
        assert_eq!(cl.parse_entities.len(), MAX_PARSE_ENTITIES);
        assert_eq!(cl.frames.len(), UPDATE_BACKUP);
    }

    #[test]
    fn cmd_ring_is_a_power_of_two() {
        assert!(CMD_BACKUP.is_power_of_two());
    }

    #[test]
    fn reset_keeps_identity_but_drops_connection() {
        let mut cl = ClientSession::new(1234);
        cl.user_info = "name\\player".to_owned();
        cl.realtime = 5000;
        cl.state = ConnState::Active;
        cl.time = 400;
        cl.parse_entity_count = 99;

        cl.reset();
        assert_eq!(cl.state, ConnState::Disconnected);
        assert_eq!(cl.qport, 1234);
        assert_eq!(cl.user_info, "name\\player");
        assert_eq!(cl.realtime, 5000);
        assert_eq!(cl.time, 0);
        assert_eq!(cl.parse_entity_count, 0);
    }

    #[test]
    fn frame_entity_wraps_the_ring() {
        let mut cl = ClientSession::new(1);
        let last = MAX_PARSE_ENTITIES - 1;
        cl.parse_entities[last].number = 321;
        cl.parse_entities[0].number = 654;

        let frame = Frame {
            parse_entities: last as i32,
            num_entities: 2,
            ..Frame::default()
        };
        assert_eq!(cl.frame_entity(&frame, 0).number, 321);
        assert_eq!(cl.frame_entity(&frame, 1).number, 654);
    }

    #[test]
    fn asset_registration_walks_the_precache_tables() {
        #[derive(Default)]
        struct Recorder {
            models: Vec<String>,
            sounds: Vec<String>,
        }
        impl crate::events::ModelRegistry for Recorder {
            fn register_model(&mut self, path: &str) -> Option<u32> {
                self.models.push(path.to_owned());
                Some(self.models.len() as u32)
            }
            fn register_sound(&mut self, path: &str) -> Option<u32> {
                self.sounds.push(path.to_owned());
                Some(self.sounds.len() as u32)
            }
        }

        let mut cl = ClientSession::new(1);
        cl.configstrings[cs::MODELS] = "models/objects/gibs/bone/tris.md2".to_owned();
        cl.configstrings[cs::MODELS + 1] = "*3".to_owned(); // inline brush model
        cl.configstrings[cs::SOUNDS] = "weapons/blastf1a.wav".to_owned();
        cl.configstrings[cs::SOUNDS + 1] = "*death1.wav".to_owned(); // sexed

        let mut recorder = Recorder::default();
        cl.register_assets(&mut recorder);
        assert_eq!(recorder.models, ["models/objects/gibs/bone/tris.md2"]);
        assert_eq!(recorder.sounds, ["weapons/blastf1a.wav"]);
    }

    #[test]
    fn string_cmd_lands_in_the_reliable_stream() {
        let mut cl = ClientSession::new(1);
        cl.send_string_cmd("new");
        let bytes = cl.netchan.message.as_slice();
        assert_eq!(bytes[0], crate::wire::clc::STRINGCMD);
        assert_eq!(&bytes[1..4], b"new");
        assert_eq!(bytes[4], 0);
    }
}
