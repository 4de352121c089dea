//! Delta codecs for the slipgate client protocol.
//!
//! Three wire codecs share the same idea: a bitmask header says which fields
//! follow, everything else is inherited from a reference state.
//!
//! - **Entity deltas** ([`write_entity_delta`], [`parse_entity_delta`]): the
//!   reference is either the entity's spawn baseline or its state in the
//!   previous frame. The bitmask header is variable length (1-4 bytes, top
//!   bit chains to the next byte), so a fully unchanged entity costs two
//!   bytes.
//! - **Player-state deltas** ([`write_player_delta`], [`parse_player_delta`]):
//!   one fixed 16-bit flag word against the previous frame's player state,
//!   plus a 32-bit presence mask over the stats array.
//! - **Input-command deltas** ([`write_user_cmd_delta`],
//!   [`read_user_cmd_delta`]): the client-to-server mirror, one bitmask byte
//!   against the previously sent command.
//!
//! Parsers use the message reader's sentinel semantics and never fail
//! mid-field; the caller checks for overrun once per message.

mod delta;
mod entity;
mod player;
mod usercmd;

pub use delta::{entity_bits, parse_entity_delta, parse_entity_header, write_entity_delta};
pub use entity::{
    pack_solid, unpack_solid, EntityState, MAX_ENTITIES, RF_BEAM, RF_FRAMELERP, SOLID_BMODEL,
};
pub use player::{parse_player_delta, player_bits, write_player_delta, PlayerState, MAX_STATS};
pub use usercmd::{cmd_bits, read_user_cmd_delta, write_user_cmd_delta};
