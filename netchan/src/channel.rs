//! The per-connection channel state machine.

use msg::{MessageReader, MessageWriter};

use crate::error::{ChannelError, ChannelResult};

/// Maximum size of one assembled datagram.
pub const MAX_DATAGRAM: usize = 1400;

/// Maximum size of a staged reliable payload.
///
/// Leaves room for the header words and qport so a full reliable message
/// always fits in a datagram.
pub const MAX_RELIABLE: usize = MAX_DATAGRAM - 16;

const SEQUENCE_MASK: i32 = !(1 << 31);

/// Which end of the connection this channel is.
///
/// Clients append a qport disambiguator to every datagram because NAT
/// routers may silently remap the UDP source port mid-game; servers key
/// their connection lookup on it and strip it during [`Netchan::process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanSide {
    /// Client end; sends the given qport with every datagram.
    Client {
        /// Client-chosen port disambiguator.
        qport: u16,
    },
    /// Server end; expects and strips a qport on receive.
    Server,
}

/// A sequenced channel over an unreliable datagram link.
///
/// At most one reliable payload is in flight. New reliable data accumulates
/// in [`message`](Self::message) and is staged as the next logical reliable
/// message once the previous one is acknowledged.
#[derive(Debug)]
pub struct Netchan {
    side: ChanSide,

    /// Set when the accumulating buffer overflowed. Sticky; the owning
    /// session must disconnect.
    pub fatal_error: bool,

    /// Gap between the last two accepted incoming sequences. Diagnostic
    /// only; the protocol has no NAK or retransmission-on-loss.
    pub dropped: i32,

    /// Clock value of the last accepted incoming datagram. The caller uses
    /// this for timeout detection; the channel itself never does.
    pub last_received: i64,
    /// Clock value of the last transmitted datagram.
    pub last_sent: i64,

    /// Highest sequence accepted from the peer.
    pub incoming_sequence: i32,
    /// Latest of our sequences the peer reports having received.
    pub incoming_acknowledged: i32,
    /// Reliable toggle the peer last echoed back.
    pub incoming_reliable_acknowledged: i32,
    /// Our view of the peer's reliable toggle.
    pub incoming_reliable_sequence: i32,
    /// Sequence the next outgoing datagram will carry.
    pub outgoing_sequence: i32,
    /// Toggle of the currently staged logical reliable message.
    pub reliable_sequence: i32,
    /// Sequence counter recorded when the reliable payload last went out.
    pub last_reliable_sequence: i32,

    /// Accumulating buffer for the next logical reliable message.
    pub message: MessageWriter,
    reliable: Vec<u8>,
}

impl Netchan {
    /// Creates a channel for one end of a fresh connection.
    #[must_use]
    pub fn new(side: ChanSide, now_ms: i64) -> Self {
        Self {
            side,
            fatal_error: false,
            dropped: 0,
            last_received: now_ms,
            last_sent: now_ms,
            incoming_sequence: 0,
            incoming_acknowledged: 0,
            incoming_reliable_acknowledged: 0,
            incoming_reliable_sequence: 0,
            outgoing_sequence: 1,
            reliable_sequence: 0,
            last_reliable_sequence: 0,
            message: MessageWriter::overflow_allowed(MAX_RELIABLE),
            reliable: Vec::with_capacity(MAX_RELIABLE),
        }
    }

    /// Returns `true` if a reliable payload is staged and unacknowledged.
    #[must_use]
    pub fn reliable_pending(&self) -> bool {
        !self.reliable.is_empty()
    }

    fn need_reliable(&self) -> bool {
        // the peer acknowledged a datagram sent after the last
        // reliable-carrying one while still echoing the stale toggle:
        // the payload was lost, resend it
        if self.incoming_acknowledged > self.last_reliable_sequence
            && self.incoming_reliable_acknowledged != self.reliable_sequence
        {
            return true;
        }
        // the in-flight slot is free and new data is waiting to be staged
        self.reliable.is_empty() && !self.message.is_empty()
    }

    /// Assembles and returns exactly one outgoing datagram.
    ///
    /// Called every send tick even with an empty payload so acknowledgements
    /// keep flowing. The unreliable payload is appended only if it fits and
    /// is silently dropped otherwise.
    ///
    /// # Errors
    ///
    /// [`ChannelError::ReliableOverflow`] once the accumulating buffer has
    /// overflowed; the channel is dead and the caller must disconnect.
    pub fn transmit(&mut self, unreliable: &[u8], now_ms: i64) -> ChannelResult<Vec<u8>> {
        if self.message.overflowed() {
            self.fatal_error = true;
            log::warn!("netchan: outgoing reliable message overflow");
            return Err(ChannelError::ReliableOverflow);
        }

        let send_reliable = self.need_reliable();

        if self.reliable.is_empty() && !self.message.is_empty() {
            self.reliable.extend_from_slice(self.message.as_slice());
            self.message.clear();
            self.reliable_sequence ^= 1;
        }

        let mut out = MessageWriter::new(MAX_DATAGRAM);
        let w1 = (self.outgoing_sequence & SEQUENCE_MASK) | (i32::from(send_reliable) << 31);
        let w2 =
            (self.incoming_sequence & SEQUENCE_MASK) | (self.incoming_reliable_sequence << 31);

        self.outgoing_sequence += 1;
        self.last_sent = now_ms;

        out.write_i32(w1)?;
        out.write_i32(w2)?;
        if let ChanSide::Client { qport } = self.side {
            out.write_i16(qport as i16)?;
        }

        if send_reliable {
            out.write_bytes(&self.reliable)?;
            self.last_reliable_sequence = self.outgoing_sequence;
        }

        if out.remaining() >= unreliable.len() {
            out.write_bytes(unreliable)?;
        } else {
            log::debug!(
                "netchan: dumped unreliable payload ({} bytes, {} free)",
                unreliable.len(),
                out.remaining()
            );
        }

        Ok(out.into_bytes())
    }

    /// Validates an incoming datagram header and updates channel state.
    ///
    /// On `true` the reader is positioned at the start of the in-band
    /// payload. Returns `false` (with no state mutated) for duplicated,
    /// stale, or out-of-order datagrams.
    pub fn process(&mut self, reader: &mut MessageReader<'_>, now_ms: i64) -> bool {
        let first = reader.read_i32();
        let second = reader.read_i32();
        if matches!(self.side, ChanSide::Server) {
            let _qport = reader.read_i16();
        }

        let reliable_message = ((first as u32) >> 31) as i32;
        let reliable_ack = ((second as u32) >> 31) as i32;
        let sequence = first & SEQUENCE_MASK;
        let sequence_ack = second & SEQUENCE_MASK;

        if sequence <= self.incoming_sequence {
            log::debug!(
                "netchan: stale datagram {sequence} (at {})",
                self.incoming_sequence
            );
            return false;
        }

        self.dropped = sequence - (self.incoming_sequence + 1);
        if self.dropped > 0 {
            log::debug!("netchan: {} datagrams dropped before {sequence}", self.dropped);
        }

        // the peer echoed our current toggle: the in-flight reliable
        // message was delivered, free the slot
        if reliable_ack == self.reliable_sequence {
            self.reliable.clear();
        }

        self.incoming_sequence = sequence;
        self.incoming_acknowledged = sequence_ack;
        self.incoming_reliable_acknowledged = reliable_ack;
        if reliable_message != 0 {
            self.incoming_reliable_sequence ^= 1;
        }

        self.last_received = now_ms;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(now: i64) -> (Netchan, Netchan) {
        (
            Netchan::new(ChanSide::Client { qport: 0x1234 }, now),
            Netchan::new(ChanSide::Server, now),
        )
    }

    fn deliver(from: &mut Netchan, to: &mut Netchan, payload: &[u8], now: i64) -> Vec<u8> {
        let datagram = from.transmit(payload, now).unwrap();
        let mut reader = MessageReader::new(&datagram);
        assert!(to.process(&mut reader, now));
        reader.read_bytes(reader.remaining()).to_vec()
    }

    #[test]
    fn empty_transmit_still_produces_a_datagram() {
        let mut chan = Netchan::new(ChanSide::Server, 0);
        let datagram = chan.transmit(&[], 5).unwrap();
        assert_eq!(datagram.len(), 8);
        assert_eq!(chan.last_sent, 5);
        assert_eq!(chan.outgoing_sequence, 2);
    }

    #[test]
    fn client_datagram_carries_qport() {
        let mut chan = Netchan::new(ChanSide::Client { qport: 0xBEEF }, 0);
        let datagram = chan.transmit(&[], 0).unwrap();
        assert_eq!(datagram.len(), 10);
        assert_eq!(u16::from_le_bytes([datagram[8], datagram[9]]), 0xBEEF);
    }

    #[test]
    fn unreliable_payload_roundtrip() {
        let (mut client, mut server) = pair(0);
        let payload = deliver(&mut client, &mut server, b"move", 1);
        assert_eq!(payload, b"move");
        assert_eq!(server.incoming_sequence, 1);
        assert_eq!(server.last_received, 1);
    }

    #[test]
    fn stale_and_duplicate_datagrams_are_rejected() {
        let (mut client, mut server) = pair(0);
        let datagram = client.transmit(b"a", 0).unwrap();

        let mut reader = MessageReader::new(&datagram);
        assert!(server.process(&mut reader, 0));
        let before = server.incoming_sequence;

        // replay of the same datagram
        let mut reader = MessageReader::new(&datagram);
        assert!(!server.process(&mut reader, 99));
        assert_eq!(server.incoming_sequence, before);
        assert_eq!(server.last_received, 0);
    }

    #[test]
    fn dropped_count_tracks_sequence_gap() {
        let (mut client, mut server) = pair(0);
        let first = client.transmit(&[], 0).unwrap();
        let _lost = client.transmit(&[], 0).unwrap();
        let _lost = client.transmit(&[], 0).unwrap();
        let fourth = client.transmit(&[], 0).unwrap();

        let mut reader = MessageReader::new(&first);
        assert!(server.process(&mut reader, 0));
        assert_eq!(server.dropped, 0);

        let mut reader = MessageReader::new(&fourth);
        assert!(server.process(&mut reader, 0));
        assert_eq!(server.dropped, 2);
    }

    #[test]
    fn reliable_staged_from_message_buffer() {
        let (mut client, mut server) = pair(0);
        client.message.write_bytes(b"cmd").unwrap();

        let payload = deliver(&mut client, &mut server, &[], 0);
        assert_eq!(payload, b"cmd");
        assert!(client.reliable_pending());
        assert_eq!(client.reliable_sequence, 1);
        assert_eq!(server.incoming_reliable_sequence, 1);

        // the ack datagram carries the toggle back and frees the slot
        let datagram = server.transmit(&[], 0).unwrap();
        let mut reader = MessageReader::new(&datagram);
        assert!(client.process(&mut reader, 0));
        assert!(!client.reliable_pending());
    }

    #[test]
    fn reliable_not_resent_without_loss_evidence() {
        let (mut client, mut server) = pair(0);
        client.message.write_bytes(b"cmd").unwrap();
        let _ = deliver(&mut client, &mut server, &[], 0);

        // no server datagram processed yet; the next transmit must not
        // carry the reliable payload again
        let datagram = client.transmit(&[], 0).unwrap();
        assert_eq!(datagram.len(), 10);
        assert!(client.reliable_pending());
    }

    #[test]
    fn next_reliable_waits_for_ack() {
        let (mut client, mut server) = pair(0);
        client.message.write_bytes(b"first").unwrap();
        let payload = deliver(&mut client, &mut server, &[], 0);
        assert_eq!(payload, b"first");

        // second message accumulates while the first is unacknowledged
        client.message.write_bytes(b"second").unwrap();
        let datagram = client.transmit(&[], 0).unwrap();
        assert_eq!(&datagram[10..], b"");

        // ack arrives, freeing the slot; the next transmit stages it
        let ack = server.transmit(&[], 0).unwrap();
        let mut reader = MessageReader::new(&ack);
        assert!(client.process(&mut reader, 0));
        let payload = deliver(&mut client, &mut server, &[], 0);
        assert_eq!(payload, b"second");
    }

    #[test]
    fn overflowed_message_buffer_kills_the_channel() {
        let mut chan = Netchan::new(ChanSide::Server, 0);
        chan.message.write_bytes(&[0u8; MAX_RELIABLE]).unwrap();
        chan.message.write_u8(1).unwrap();
        assert!(chan.message.overflowed());

        let err = chan.transmit(&[], 0).unwrap_err();
        assert_eq!(err, ChannelError::ReliableOverflow);
        assert!(chan.fatal_error);
    }

    #[test]
    fn oversized_unreliable_is_dropped_not_fatal() {
        let mut chan = Netchan::new(ChanSide::Server, 0);
        let big = vec![0u8; MAX_DATAGRAM];
        let datagram = chan.transmit(&big, 0).unwrap();
        assert_eq!(datagram.len(), 8);
        assert!(!chan.fatal_error);
    }
}
