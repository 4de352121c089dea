//! Client network protocol and prediction core.
//!
//! Turns a stream of lossy datagrams from a game server into a consistent,
//! interpolated, locally predicted simulation state:
//!
//! ```text
//! datagrams -> netchan -> parse -> frame/entity rings -> prediction -> view
//! ```
//!
//! - [`ClientSession`] owns every piece of per-connection state and is passed
//!   explicitly into each call; there is no ambient state anywhere.
//! - [`connect`] runs the out-of-band handshake, drains the socket once per
//!   packet frame, and transmits sampled input commands.
//! - [`parse`] decodes server messages into the frame and entity rings using
//!   the `codec` delta codecs, including the four-way packet-entity merge.
//! - [`prediction`] replays unacknowledged commands through `pmove` and turns
//!   mispredictions into a decaying view correction.
//! - [`view`] blends the last two authoritative frames (or the predicted
//!   state) into render-ready transforms.
//!
//! The subsystems this core deliberately excludes (transport, collision,
//! console, audio, asset registration) enter through the narrow traits in
//! [`events`] and `pmove`'s `CollisionEnv`.
//!
//! # Error handling
//!
//! Fatal protocol errors surface exactly once, at the boundary between one
//! server message and the next, and unwind through a single disconnect
//! handler that reinitializes the session wholesale. An expired delta
//! reference is not fatal: the frame is parsed to completion to stay aligned
//! with the stream, flagged invalid, and ignored until the server's next
//! self-contained frame.

pub mod connect;
pub mod error;
pub mod events;
pub mod frame;
pub mod parse;
pub mod prediction;
pub mod session;
pub mod tent;
pub mod view;
pub mod wire;

pub use connect::{begin_connect, check_for_resend, disconnect, read_packets, send_command};
pub use error::ProtocolError;
pub use events::{ClientEvents, ModelRegistry, NetAddr, NetSocket, NullEvents, SoundStart};
pub use frame::Frame;
pub use parse::{parse_server_message, ParseOutcome};
pub use prediction::{check_prediction_error, predict_movement};
pub use session::{ClientEntity, ClientSession, ConnState, ServerInfo};
pub use tent::TempEntityEvent;
pub use view::{calc_view, entity_transform, lerp_angle, update_lerp, RenderTransform, ViewState};

/// World units per 1/8-unit fixed-point count.
pub const COORD_TO_WORLD: f32 = 0.125;
