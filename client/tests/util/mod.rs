//! Shared scaffolding for the session tests: an in-memory socket, a
//! recording event sink, and server-side message builders.

#![allow(dead_code)]

use std::collections::VecDeque;

use client::wire::svc;
use client::{ClientEvents, NetAddr, NetSocket, ServerInfo};
use codec::{entity_bits, write_entity_delta, write_player_delta, EntityState, PlayerState};
use msg::MessageWriter;

/// A loss-free datagram transport backed by queues.
#[derive(Debug, Default)]
pub struct MemSocket {
    pub sent: Vec<(NetAddr, Vec<u8>)>,
    pub incoming: VecDeque<(NetAddr, Vec<u8>)>,
}

impl MemSocket {
    pub fn push(&mut self, from: &NetAddr, datagram: Vec<u8>) {
        self.incoming.push_back((from.clone(), datagram));
    }
}

impl NetSocket for MemSocket {
    fn send(&mut self, to: &NetAddr, datagram: &[u8]) {
        self.sent.push((to.clone(), datagram.to_vec()));
    }

    fn recv(&mut self) -> Option<(NetAddr, Vec<u8>)> {
        self.incoming.pop_front()
    }
}

/// Event sink that records everything it sees.
#[derive(Debug, Default)]
pub struct Recording {
    pub prints: Vec<String>,
    pub configstrings: Vec<(usize, String)>,
    pub server_info: Option<ServerInfo>,
    pub entity_events: Vec<(u16, u8)>,
    pub loading_done: u32,
}

impl ClientEvents for Recording {
    fn on_print(&mut self, _level: u8, text: &str) {
        self.prints.push(text.to_owned());
    }

    fn on_configstring(&mut self, index: usize, value: &str) {
        self.configstrings.push((index, value.to_owned()));
    }

    fn on_server_info(&mut self, info: &ServerInfo) {
        self.server_info = Some(info.clone());
    }

    fn on_entity_event(&mut self, entity: u16, event: u8) {
        self.entity_events.push((entity, event));
    }

    fn on_loading_done(&mut self) {
        self.loading_done += 1;
    }
}

/// An entity on the 1/8-unit grid, shaped the way the parser stores it.
pub fn entity(number: u16, x: f32) -> EntityState {
    EntityState {
        number,
        model_index: 1,
        origin: [x, 0.0, 0.0],
        old_origin: [x, 0.0, 0.0],
        ..EntityState::default()
    }
}

/// One entry in a packetentities list, in ascending entity-number order.
pub enum Emit<'a> {
    /// Entity entering the frame; delta encoded against a zeroed baseline.
    New(&'a EntityState),
    /// Entity changing; delta encoded against its previous-frame state.
    Update {
        from: &'a EntityState,
        to: &'a EntityState,
    },
    /// Entity leaving the frame.
    Remove(u16),
}

fn write_remove(buf: &mut MessageWriter, number: u16) {
    if number < 256 {
        buf.write_u8(entity_bits::REMOVE as u8).unwrap();
        buf.write_u8(number as u8).unwrap();
    } else {
        buf.write_u8((entity_bits::REMOVE | entity_bits::MORE_BITS1) as u8)
            .unwrap();
        buf.write_u8((entity_bits::NUMBER16 >> 8) as u8).unwrap();
        buf.write_i16(number as i16).unwrap();
    }
}

/// Builds one complete `frame` message the way the server emits it.
pub fn frame_message(
    server_frame: i32,
    delta_frame: i32,
    from_ps: &PlayerState,
    to_ps: &PlayerState,
    entities: &[Emit<'_>],
) -> Vec<u8> {
    let mut buf = MessageWriter::new(2048);
    buf.write_u8(svc::FRAME).unwrap();
    buf.write_i32(server_frame).unwrap();
    buf.write_i32(delta_frame).unwrap();
    buf.write_u8(0).unwrap(); // suppress count
    buf.write_u8(0).unwrap(); // no area bits

    buf.write_u8(svc::PLAYERINFO).unwrap();
    write_player_delta(from_ps, to_ps, &mut buf).unwrap();

    buf.write_u8(svc::PACKETENTITIES).unwrap();
    for item in entities {
        match item {
            Emit::New(state) => {
                let baseline = EntityState::default();
                write_entity_delta(&baseline, state, &mut buf, true, true).unwrap();
            }
            Emit::Update { from, to } => {
                write_entity_delta(from, to, &mut buf, true, false).unwrap();
            }
            Emit::Remove(number) => write_remove(&mut buf, *number),
        }
    }
    // entity number zero ends the list
    buf.write_u8(0).unwrap();
    buf.write_u8(0).unwrap();

    buf.into_bytes()
}
