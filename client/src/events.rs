//! Narrow interfaces to the subsystems this core deliberately excludes:
//! transport, console/UI, audio, and asset registration.

use crate::session::ServerInfo;
use crate::tent::TempEntityEvent;

/// An abstract peer address: a loopback tag or a real socket address,
/// resolved and compared by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddr(pub String);

impl NetAddr {
    /// The in-process loopback peer.
    #[must_use]
    pub fn loopback() -> Self {
        Self("loopback".to_owned())
    }
}

/// Non-blocking datagram transport.
///
/// `recv` must never block; the session drains it until empty once per
/// packet frame.
pub trait NetSocket {
    /// Queues one datagram to the peer.
    fn send(&mut self, to: &NetAddr, datagram: &[u8]);

    /// Returns the next pending datagram, if any.
    fn recv(&mut self) -> Option<(NetAddr, Vec<u8>)>;
}

/// A sound-start command decoded from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundStart {
    pub sound: u8,
    /// 0-1 scale.
    pub volume: f32,
    pub attenuation: f32,
    /// Seconds of delay before the sound begins.
    pub time_offset: f32,
    /// Emitting entity and its channel, when spatialized to an entity.
    pub entity_channel: Option<(u16, u8)>,
    /// Explicit position, when spatialized to a point.
    pub position: Option<[f32; 3]>,
}

/// Receiver for everything the protocol decodes but does not act on itself.
///
/// Default implementations ignore the event, so consumers and tests
/// implement only what they observe.
pub trait ClientEvents {
    /// Console print at the given level.
    fn on_print(&mut self, _level: u8, _text: &str) {}

    /// Command text the server pushed for local execution.
    fn on_stufftext(&mut self, _text: &str) {}

    /// A configstring slot changed.
    fn on_configstring(&mut self, _index: usize, _value: &str) {}

    /// Connection handshake finished and level data is known.
    fn on_server_info(&mut self, _info: &ServerInfo) {}

    /// A sound-start command arrived.
    fn on_sound(&mut self, _sound: &SoundStart) {}

    /// A temporary visual effect arrived.
    fn on_temp_entity(&mut self, _event: &TempEntityEvent) {}

    /// First-person muzzle flash for an entity.
    fn on_muzzle_flash(&mut self, _entity: u16, _effect: u8) {}

    /// Monster muzzle flash.
    fn on_muzzle_flash2(&mut self, _entity: u16, _effect: u8) {}

    /// A per-entity transient event (teleport, footstep) fired this frame.
    fn on_entity_event(&mut self, _entity: u16, _event: u8) {}

    /// The first valid frame arrived; loading UI can be dismissed.
    fn on_loading_done(&mut self) {}

    /// The server asked us to leave (disconnect or reconnect).
    fn on_server_dropped(&mut self, _reconnect: bool) {}
}

/// Sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl ClientEvents for NullEvents {}

/// Asset registration lookup, keyed by path string.
///
/// The renderer and sound system own the real tables; the protocol only
/// needs opaque handles for configstring-driven precaching.
pub trait ModelRegistry {
    /// Returns a handle for the model at `path`, loading it if needed.
    fn register_model(&mut self, path: &str) -> Option<u32>;

    /// Returns a handle for the sound at `path`, loading it if needed.
    fn register_sound(&mut self, path: &str) -> Option<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_addr_compares_equal() {
        assert_eq!(NetAddr::loopback(), NetAddr::loopback());
        assert_ne!(NetAddr::loopback(), NetAddr("192.0.2.1:27910".into()));
    }

    #[test]
    fn null_events_accepts_everything() {
        let mut sink = NullEvents;
        sink.on_print(2, "hello");
        sink.on_entity_event(5, 2);
        sink.on_loading_done();
    }
}
