//! Capture introspection for the slipgate protocol.
//!
//! A capture is a flat binary file holding one direction of a connection:
//! each record is a little-endian `u32` byte count followed by the raw
//! datagram. The scanners here never need live session state because every
//! message body is self-describing (flag words and bitmask headers drive
//! all reads), so a capture can be walked offline byte for byte.

use std::fmt;

use codec::{parse_entity_delta, parse_entity_header, parse_player_delta, EntityState, PlayerState};
use msg::MessageReader;
use netchan::out_of_band_payload;
use pmove::UserCmd;
use serde::Serialize;

use client::tent::parse_temp_entity;
use client::wire::{clc, snd, svc};

/// Errors reading a capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureError {
    /// A record's length prefix ran past the end of the file.
    Truncated { offset: usize },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { offset } => {
                write!(f, "capture truncated inside the record at byte {offset}")
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// Splits a capture file into its datagrams.
pub fn read_capture(bytes: &[u8]) -> Result<Vec<Vec<u8>>, CaptureError> {
    let mut datagrams = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        if offset + 4 > bytes.len() {
            return Err(CaptureError::Truncated { offset });
        }
        let len = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        offset += 4;
        if offset + len > bytes.len() {
            return Err(CaptureError::Truncated { offset });
        }
        datagrams.push(bytes[offset..offset + len].to_vec());
        offset += len;
    }
    Ok(datagrams)
}

/// Appends one datagram to a capture buffer.
pub fn append_record(capture: &mut Vec<u8>, datagram: &[u8]) {
    capture.extend_from_slice(&(datagram.len() as u32).to_le_bytes());
    capture.extend_from_slice(datagram);
}

/// A decoded channel header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelHeader {
    pub sequence: i32,
    /// This datagram carries the staged reliable payload.
    pub reliable: bool,
    pub ack_sequence: i32,
    /// Reliable toggle echoed back to the peer.
    pub reliable_ack: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qport: Option<u16>,
    pub payload_len: usize,
}

/// What one capture record turned out to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatagramKind {
    /// Connectionless handshake text.
    OutOfBand { text: String },
    /// A sequenced channel datagram.
    InBand { header: ChannelHeader },
    /// Too short to carry a channel header.
    Runt { len: usize },
}

/// Classifies a datagram and decodes its channel header.
///
/// `to_server` selects the client-to-server header layout, which carries a
/// qport after the sequence words.
#[must_use]
pub fn classify(datagram: &[u8], to_server: bool) -> DatagramKind {
    if let Some(payload) = out_of_band_payload(datagram) {
        return DatagramKind::OutOfBand {
            text: String::from_utf8_lossy(payload).into_owned(),
        };
    }

    let header_len = if to_server { 10 } else { 8 };
    if datagram.len() < header_len {
        return DatagramKind::Runt {
            len: datagram.len(),
        };
    }

    let mut reader = MessageReader::new(datagram);
    let first = reader.read_i32();
    let second = reader.read_i32();
    let qport = if to_server {
        Some(reader.read_i16() as u16)
    } else {
        None
    };

    DatagramKind::InBand {
        header: ChannelHeader {
            sequence: first & !(1 << 31),
            reliable: (first as u32) >> 31 != 0,
            ack_sequence: second & !(1 << 31),
            reliable_ack: (second as u32) >> 31 != 0,
            qport,
            payload_len: reader.remaining(),
        },
    }
}

/// The message tags found in one in-band payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagScan {
    pub tags: Vec<String>,
    /// Why the scan stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TagScan {
    fn done(tags: Vec<String>) -> Self {
        Self { tags, error: None }
    }

    fn failed(tags: Vec<String>, error: String) -> Self {
        Self {
            tags,
            error: Some(error),
        }
    }
}

fn tag_name(tag: u8) -> String {
    let name = match tag {
        svc::NOP => "nop",
        svc::DISCONNECT => "disconnect",
        svc::RECONNECT => "reconnect",
        svc::PRINT => "print",
        svc::STUFFTEXT => "stufftext",
        svc::SERVERDATA => "serverdata",
        svc::CONFIGSTRING => "configstring",
        svc::SPAWNBASELINE => "spawnbaseline",
        svc::FRAME => "frame",
        svc::PLAYERINFO => "playerinfo",
        svc::PACKETENTITIES => "packetentities",
        svc::SOUND => "sound",
        svc::TEMP_ENTITY => "temp_entity",
        svc::MUZZLE_FLASH => "muzzleflash",
        svc::MUZZLE_FLASH2 => "muzzleflash2",
        _ => return format!("unknown({tag})"),
    };
    name.to_owned()
}

fn skip_sound(reader: &mut MessageReader<'_>) {
    let flags = reader.read_u8().max(0) as u8;
    let _sound = reader.read_u8();
    if flags & snd::VOLUME != 0 {
        let _ = reader.read_u8();
    }
    if flags & snd::ATTENUATION != 0 {
        let _ = reader.read_u8();
    }
    if flags & snd::OFFSET != 0 {
        let _ = reader.read_u8();
    }
    if flags & snd::ENT != 0 {
        let _ = reader.read_i16();
    }
    if flags & snd::POS != 0 {
        let _ = reader.read_pos();
    }
}

fn skip_packet_entities(reader: &mut MessageReader<'_>) -> Result<(), String> {
    loop {
        let (number, bits) = parse_entity_header(reader);
        if reader.is_overrun() {
            return Err("packetentities truncated".to_owned());
        }
        if number == 0 {
            return Ok(());
        }
        let mut scratch = EntityState::default();
        parse_entity_delta(
            &EntityState::default(),
            &mut scratch,
            number as u16,
            bits,
            reader,
        );
    }
}

/// Walks a server-to-client payload and lists its message tags.
///
/// Body reads are flag-driven, so the walk needs no session state; the
/// field values decoded against scratch references are meaningless and
/// discarded, but the byte consumption is exact.
#[must_use]
pub fn scan_server_tags(payload: &[u8]) -> TagScan {
    let mut reader = MessageReader::new(payload);
    let mut tags = Vec::new();

    loop {
        if reader.is_overrun() {
            return TagScan::failed(tags, format!("truncated at byte {}", reader.position()));
        }
        let tag = reader.read_u8();
        if tag == -1 {
            return TagScan::done(tags);
        }
        let tag = tag as u8;
        tags.push(tag_name(tag));

        match tag {
            svc::NOP | svc::DISCONNECT | svc::RECONNECT => {}
            svc::PRINT => {
                let _level = reader.read_u8();
                let _ = reader.read_string();
            }
            svc::STUFFTEXT => {
                let _ = reader.read_string();
            }
            svc::SERVERDATA => {
                let _protocol = reader.read_i32();
                let _spawn_count = reader.read_i32();
                let _demo = reader.read_u8();
                let _game_dir = reader.read_string();
                let _player_num = reader.read_i16();
                let _level_name = reader.read_string();
            }
            svc::CONFIGSTRING => {
                let _index = reader.read_i16();
                let _ = reader.read_string();
            }
            svc::SPAWNBASELINE => {
                let (number, bits) = parse_entity_header(&mut reader);
                let mut scratch = EntityState::default();
                parse_entity_delta(
                    &EntityState::default(),
                    &mut scratch,
                    number.max(0) as u16,
                    bits,
                    &mut reader,
                );
            }
            svc::SOUND => skip_sound(&mut reader),
            svc::TEMP_ENTITY => {
                if let Err(err) = parse_temp_entity(&mut reader) {
                    return TagScan::failed(tags, err.to_string());
                }
            }
            svc::MUZZLE_FLASH | svc::MUZZLE_FLASH2 => {
                let _entity = reader.read_i16();
                let _effect = reader.read_u8();
            }
            svc::FRAME => {
                let _server_frame = reader.read_i32();
                let _delta_frame = reader.read_i32();
                let _suppress = reader.read_u8();
                let area_len = reader.read_u8().max(0) as usize;
                let _ = reader.read_bytes(area_len);

                let sub = reader.read_u8();
                if sub != i32::from(svc::PLAYERINFO) {
                    return TagScan::failed(tags, format!("expected playerinfo, got {sub}"));
                }
                tags.push(tag_name(svc::PLAYERINFO));
                let mut scratch = PlayerState::default();
                parse_player_delta(&PlayerState::default(), &mut scratch, &mut reader, false);

                let sub = reader.read_u8();
                if sub != i32::from(svc::PACKETENTITIES) {
                    return TagScan::failed(tags, format!("expected packetentities, got {sub}"));
                }
                tags.push(tag_name(svc::PACKETENTITIES));
                if let Err(err) = skip_packet_entities(&mut reader) {
                    return TagScan::failed(tags, err);
                }
            }
            svc::PLAYERINFO | svc::PACKETENTITIES => {
                return TagScan::failed(tags, "frame sub-message outside a frame".to_owned());
            }
            _ => return TagScan::failed(tags, "unknown tag".to_owned()),
        }
    }
}

/// Walks a client-to-server payload and lists its message tags.
#[must_use]
pub fn scan_client_tags(payload: &[u8]) -> TagScan {
    let mut reader = MessageReader::new(payload);
    let mut tags = Vec::new();

    loop {
        if reader.is_overrun() {
            return TagScan::failed(tags, format!("truncated at byte {}", reader.position()));
        }
        let tag = reader.read_u8();
        if tag == -1 {
            return TagScan::done(tags);
        }

        match tag as u8 {
            clc::NOP => tags.push("nop".to_owned()),
            clc::MOVE => {
                tags.push("move".to_owned());
                let _last_frame = reader.read_i32();
                let mut previous = UserCmd::default();
                for _ in 0..3 {
                    previous = codec::read_user_cmd_delta(&previous, &mut reader);
                }
            }
            clc::USERINFO => {
                tags.push("userinfo".to_owned());
                let _ = reader.read_string();
            }
            clc::STRINGCMD => {
                tags.push("stringcmd".to_owned());
                let _ = reader.read_string();
            }
            other => return TagScan::failed(tags, format!("unknown tag {other}")),
        }
    }
}

/// Aggregate statistics over one direction of a capture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub datagrams: usize,
    pub out_of_band: usize,
    pub runts: usize,
    pub total_bytes: usize,
    pub first_sequence: i32,
    pub last_sequence: i32,
    /// Sequence numbers skipped between consecutive records.
    pub gaps: usize,
    /// Records whose sequence did not advance (duplicates or reordering).
    pub stale: usize,
    /// Datagrams that carried the reliable payload.
    pub reliable_carried: usize,
    /// Maximal runs of consecutive reliable-carrying datagrams. A lower
    /// bound on logical reliable messages; the capture alone cannot tell a
    /// retransmission from a fresh message acknowledged between records.
    pub reliable_runs: usize,
}

impl CaptureStats {
    /// Reliable datagrams beyond the first carry of each run. An upper
    /// bound on retransmissions.
    #[must_use]
    pub const fn retransmissions(&self) -> usize {
        self.reliable_carried.saturating_sub(self.reliable_runs)
    }
}

/// Computes statistics over a capture's datagrams.
#[must_use]
pub fn capture_stats(datagrams: &[Vec<u8>], to_server: bool) -> CaptureStats {
    let mut stats = CaptureStats::default();
    let mut expected = None;
    let mut in_reliable_run = false;

    for datagram in datagrams {
        stats.datagrams += 1;
        stats.total_bytes += datagram.len();

        let header = match classify(datagram, to_server) {
            DatagramKind::OutOfBand { .. } => {
                stats.out_of_band += 1;
                continue;
            }
            DatagramKind::Runt { .. } => {
                stats.runts += 1;
                continue;
            }
            DatagramKind::InBand { header } => header,
        };

        if expected.is_none() {
            stats.first_sequence = header.sequence;
        }
        stats.last_sequence = header.sequence;

        match expected {
            Some(next) if header.sequence > next => {
                stats.gaps += (header.sequence - next) as usize;
            }
            Some(next) if header.sequence < next => stats.stale += 1,
            _ => {}
        }
        expected = Some(header.sequence + 1);

        if header.reliable {
            stats.reliable_carried += 1;
            if !in_reliable_run {
                stats.reliable_runs += 1;
            }
        }
        in_reliable_run = header.reliable;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use msg::MessageWriter;
    use netchan::{out_of_band, ChanSide, Netchan};

    #[test]
    fn capture_roundtrip() {
        let mut capture = Vec::new();
        append_record(&mut capture, b"first");
        append_record(&mut capture, b"");
        append_record(&mut capture, &[1, 2, 3]);

        let datagrams = read_capture(&capture).unwrap();
        assert_eq!(datagrams.len(), 3);
        assert_eq!(datagrams[0], b"first");
        assert!(datagrams[1].is_empty());
    }

    #[test]
    fn truncated_capture_is_an_error() {
        let mut capture = Vec::new();
        append_record(&mut capture, b"whole");
        capture.extend_from_slice(&99u32.to_le_bytes());
        capture.push(1);

        let err = read_capture(&capture).unwrap_err();
        assert!(matches!(err, CaptureError::Truncated { .. }));
    }

    #[test]
    fn classify_decodes_channel_headers() {
        let mut chan = Netchan::new(ChanSide::Client { qport: 0xABCD }, 0);
        let datagram = chan.transmit(b"xy", 0).unwrap();

        match classify(&datagram, true) {
            DatagramKind::InBand { header } => {
                assert_eq!(header.sequence, 1);
                assert!(!header.reliable);
                assert_eq!(header.qport, Some(0xABCD));
                assert_eq!(header.payload_len, 2);
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn classify_spots_out_of_band_and_runts() {
        assert_eq!(
            classify(&out_of_band("getchallenge\n"), false),
            DatagramKind::OutOfBand {
                text: "getchallenge\n".to_owned()
            }
        );
        assert_eq!(classify(&[1, 2, 3], false), DatagramKind::Runt { len: 3 });
    }

    #[test]
    fn server_tag_scan_walks_a_mixed_payload() {
        let mut buf = MessageWriter::new(256);
        buf.write_u8(svc::PRINT).unwrap();
        buf.write_u8(2).unwrap();
        buf.write_string("hello").unwrap();
        buf.write_u8(svc::STUFFTEXT).unwrap();
        buf.write_string("skins\n").unwrap();
        buf.write_u8(svc::NOP).unwrap();

        let scan = scan_server_tags(buf.as_slice());
        assert_eq!(scan.tags, ["print", "stufftext", "nop"]);
        assert_eq!(scan.error, None);
    }

    #[test]
    fn server_tag_scan_walks_a_frame() {
        let mut buf = MessageWriter::new(512);
        buf.write_u8(svc::FRAME).unwrap();
        buf.write_i32(10).unwrap();
        buf.write_i32(0).unwrap();
        buf.write_u8(0).unwrap(); // suppress
        buf.write_u8(0).unwrap(); // area bytes
        buf.write_u8(svc::PLAYERINFO).unwrap();
        codec::write_player_delta(&PlayerState::default(), &PlayerState::default(), &mut buf)
            .unwrap();
        buf.write_u8(svc::PACKETENTITIES).unwrap();
        buf.write_u8(0).unwrap(); // end of entity list
        buf.write_u8(0).unwrap();

        let scan = scan_server_tags(buf.as_slice());
        assert_eq!(scan.tags, ["frame", "playerinfo", "packetentities"]);
        assert_eq!(scan.error, None);
    }

    #[test]
    fn server_tag_scan_reports_unknown_tags() {
        let scan = scan_server_tags(&[svc::NOP, 200]);
        assert_eq!(scan.tags.last().unwrap(), "unknown(200)");
        assert!(scan.error.is_some());
    }

    #[test]
    fn client_tag_scan_walks_a_move_payload() {
        let mut buf = MessageWriter::new(64);
        buf.write_u8(clc::MOVE).unwrap();
        buf.write_i32(-1).unwrap();
        let mut previous = UserCmd::default();
        for msec in [16u8, 16, 32] {
            let cmd = UserCmd {
                msec,
                forward_move: 100,
                ..UserCmd::default()
            };
            codec::write_user_cmd_delta(&previous, &cmd, &mut buf).unwrap();
            previous = cmd;
        }

        let scan = scan_client_tags(buf.as_slice());
        assert_eq!(scan.tags, ["move"]);
        assert_eq!(scan.error, None);
    }

    #[test]
    fn stats_count_gaps_and_reliable_carries() {
        let mut chan = Netchan::new(ChanSide::Server, 0);
        chan.message.write_bytes(b"reliable").unwrap();

        let mut datagrams = Vec::new();
        datagrams.push(chan.transmit(&[], 0).unwrap()); // seq 1, carries reliable
        let _lost = chan.transmit(&[], 0).unwrap(); // seq 2, never captured
        datagrams.push(chan.transmit(&[], 0).unwrap()); // seq 3

        let stats = capture_stats(&datagrams, false);
        assert_eq!(stats.datagrams, 2);
        assert_eq!(stats.first_sequence, 1);
        assert_eq!(stats.last_sequence, 3);
        assert_eq!(stats.gaps, 1);
        assert_eq!(stats.reliable_carried, 1);
        assert_eq!(stats.reliable_runs, 1);
        assert_eq!(stats.retransmissions(), 0);
    }
}
