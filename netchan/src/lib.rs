//! Sequenced reliable/unreliable datagram channel.
//!
//! A [`Netchan`] wraps a lossy datagram link with sequencing, piggybacked
//! acknowledgements, and a single in-flight reliable payload. Every outgoing
//! datagram carries two header words:
//!
//! ```text
//! 31    30..0            31      30..0
//! [R] [sequence]       [R-ack] [ack sequence]     (+ 16-bit qport, client side)
//! ```
//!
//! The high bit of the first word marks a datagram that carries the staged
//! reliable payload; the high bit of the second echoes the receiver's
//! reliable toggle so the sender can tell delivered from dropped. The toggle
//! alternates per *logical* reliable message, not per packet, so a
//! retransmission is recognizable as the same message.
//!
//! There is no NAK and no content-level dedup: the resend predicate only
//! fires once the peer has acknowledged a datagram sent *after* the
//! reliable-carrying one while still echoing the stale toggle, which proves
//! the payload was lost. Unreliable payload is expendable and is silently
//! dropped when the datagram is full.
//!
//! Out-of-band packets (connection handshake text) bypass the channel: a
//! leading `-1` sequence word marks them.

mod channel;
mod error;

pub use channel::{ChanSide, Netchan, MAX_DATAGRAM, MAX_RELIABLE};
pub use error::{ChannelError, ChannelResult};

/// Sentinel first word of a connectionless (out-of-band) packet.
pub const OOB_SEQUENCE: i32 = -1;

/// Builds a connectionless text packet.
#[must_use]
pub fn out_of_band(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + text.len());
    out.extend_from_slice(&OOB_SEQUENCE.to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out
}

/// Returns `true` if the datagram is a connectionless packet.
#[must_use]
pub fn is_out_of_band(datagram: &[u8]) -> bool {
    datagram.len() >= 4 && datagram[0..4] == OOB_SEQUENCE.to_le_bytes()
}

/// Returns the text payload of a connectionless packet, if it is one.
#[must_use]
pub fn out_of_band_payload(datagram: &[u8]) -> Option<&[u8]> {
    if is_out_of_band(datagram) {
        Some(&datagram[4..])
    } else {
        None
    }
}
