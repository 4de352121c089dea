//! Connection lifecycle: the out-of-band handshake, the per-frame packet
//! pump, and outgoing command transmission.

use msg::{MessageReader, MessageWriter, MsgResult};
use netchan::{out_of_band, out_of_band_payload, ChanSide, ChannelError, Netchan};
use pmove::UserCmd;

use crate::error::ProtocolError;
use crate::events::{ClientEvents, NetAddr, NetSocket};
use crate::parse::{parse_server_message, ParseOutcome};
use crate::session::{ClientSession, ConnState, CMD_BACKUP};
use crate::wire::{clc, PROTOCOL_VERSION};

/// Milliseconds between handshake retransmissions.
const RETRY_MS: i64 = 3000;

/// Milliseconds without an accepted datagram before the connection is
/// declared dead.
const TIMEOUT_MS: i64 = 30_000;

/// Starts a connection attempt to `addr`, dropping any current connection.
///
/// The handshake itself is driven by [`check_for_resend`], which the caller
/// invokes once per packet frame alongside [`read_packets`].
pub fn begin_connect(cl: &mut ClientSession, addr: NetAddr) {
    cl.reset();
    cl.server_addr = Some(addr);
    cl.state = ConnState::Challenging;
    // backdate so the first check fires immediately
    cl.resend_time = cl.realtime - RETRY_MS;
}

/// Retransmits the pending handshake packet once it has gone unanswered
/// long enough.
pub fn check_for_resend(cl: &mut ClientSession, socket: &mut impl NetSocket) {
    let Some(addr) = cl.server_addr.clone() else {
        return;
    };
    if cl.realtime - cl.resend_time < RETRY_MS {
        return;
    }

    match cl.state {
        ConnState::Challenging => {
            cl.resend_time = cl.realtime;
            log::info!("connecting to {}...", addr.0);
            socket.send(&addr, &out_of_band("getchallenge\n"));
        }
        ConnState::Connecting => {
            cl.resend_time = cl.realtime;
            send_connect_packet(cl, socket, &addr);
        }
        _ => {}
    }
}

/// We have a challenge in hand; ask the server to accept us.
fn send_connect_packet(cl: &ClientSession, socket: &mut impl NetSocket, addr: &NetAddr) {
    let request = format!(
        "connect {} {} {} \"{}\"\n",
        PROTOCOL_VERSION, cl.qport, cl.challenge, cl.user_info
    );
    socket.send(addr, &out_of_band(&request));
}

/// Drains every pending datagram and processes each one.
///
/// Out-of-band packets drive the handshake; in-band datagrams go through the
/// channel and the message parser. Stale, runt, and stranger datagrams are
/// dropped silently. A fatal protocol error performs the single disconnect
/// cleanup here before being returned.
pub fn read_packets(
    cl: &mut ClientSession,
    socket: &mut impl NetSocket,
    events: &mut dyn ClientEvents,
) -> Result<(), ProtocolError> {
    while let Some((from, datagram)) = socket.recv() {
        if let Some(payload) = out_of_band_payload(&datagram) {
            handle_connectionless(cl, socket, &from, payload, events);
            continue;
        }

        if !cl.is_connected() {
            continue; // sequenced packet without a connection
        }
        if datagram.len() < 8 {
            log::debug!("{}: runt packet", from.0);
            continue;
        }
        if cl.server_addr.as_ref() != Some(&from) {
            log::debug!("{}: sequenced packet from the wrong peer", from.0);
            continue;
        }

        let mut reader = MessageReader::new(&datagram);
        if !cl.netchan.process(&mut reader, cl.realtime) {
            continue; // stale or duplicated
        }

        match parse_server_message(cl, &mut reader, events) {
            Ok(ParseOutcome::Continue) => {}
            Ok(ParseOutcome::Disconnect) => {
                log::info!("server disconnected");
                cl.reset();
                return Ok(());
            }
            Ok(ParseOutcome::Reconnect) => {
                log::info!("server changing, reconnecting");
                let addr = cl.server_addr.clone();
                cl.reset();
                cl.server_addr = addr;
                cl.state = ConnState::Challenging;
                cl.resend_time = cl.realtime - RETRY_MS;
            }
            Err(err) => {
                log::error!("{err}");
                cl.reset();
                return Err(err);
            }
        }
    }

    // timeout detection belongs here, not in the channel
    if cl.is_connected() && cl.realtime - cl.netchan.last_received > TIMEOUT_MS {
        log::info!("server connection timed out");
        cl.reset();
    }

    Ok(())
}

fn handle_connectionless(
    cl: &mut ClientSession,
    socket: &mut impl NetSocket,
    from: &NetAddr,
    payload: &[u8],
    events: &mut dyn ClientEvents,
) {
    let mut reader = MessageReader::new(payload);
    let line = reader.read_string_line();
    let mut tokens = line.split_whitespace();
    let command = tokens.next().unwrap_or("");
    log::debug!("{}: {command}", from.0);

    match command {
        // the server accepted us; switch to the sequenced channel
        "client_connect" => {
            if cl.is_connected() {
                log::info!("duplicate connect acknowledgement ignored");
                return;
            }
            cl.netchan = Netchan::new(ChanSide::Client { qport: cl.qport }, cl.realtime);
            cl.state = ConnState::Connected;
            cl.send_string_cmd("new");
        }

        "challenge" => {
            if !matches!(cl.state, ConnState::Challenging | ConnState::Connecting) {
                return;
            }
            cl.challenge = tokens.next().and_then(|t| t.parse().ok()).unwrap_or(0);
            cl.state = ConnState::Connecting;
            cl.resend_time = cl.realtime;
            if let Some(addr) = cl.server_addr.clone() {
                send_connect_packet(cl, socket, &addr);
            }
        }

        "print" => {
            let text = reader.read_string();
            events.on_print(2, &text);
        }

        "echo" => {
            socket.send(from, &out_of_band(tokens.next().unwrap_or("")));
        }

        _ => log::debug!("unknown connectionless packet: {line}"),
    }
}

/// Builds the outgoing `move` payload: frame acknowledgement plus the last
/// three commands, delta encoded against each other so a single lost
/// datagram costs nothing.
pub fn build_move_payload(cl: &ClientSession) -> MsgResult<MessageWriter> {
    let mut buf = MessageWriter::new(128);
    buf.write_u8(clc::MOVE)?;

    // tell the server which frame to delta from, or that we have none
    if cl.frame.valid {
        buf.write_i32(cl.frame.server_frame)?;
    } else {
        buf.write_i32(-1)?;
    }

    let mask = CMD_BACKUP as i32 - 1;
    let seq = cl.netchan.outgoing_sequence;
    let oldest = &cl.cmds[((seq - 2) & mask) as usize];
    let older = &cl.cmds[((seq - 1) & mask) as usize];
    let newest = &cl.cmds[(seq & mask) as usize];

    let null_cmd = UserCmd::default();
    codec::write_user_cmd_delta(&null_cmd, oldest, &mut buf)?;
    codec::write_user_cmd_delta(oldest, older, &mut buf)?;
    codec::write_user_cmd_delta(older, newest, &mut buf)?;

    Ok(buf)
}

/// Samples one input command into the pending ring and transmits it.
///
/// Always produces exactly one datagram while connected, so
/// acknowledgements keep flowing even when the player is idle.
pub fn send_command(
    cl: &mut ClientSession,
    socket: &mut impl NetSocket,
    cmd: UserCmd,
) -> Result<(), ProtocolError> {
    if !cl.is_connected() {
        return Ok(());
    }

    let slot = (cl.netchan.outgoing_sequence & (CMD_BACKUP as i32 - 1)) as usize;
    cl.cmds[slot] = cmd;
    cl.cmd_times[slot] = cl.realtime;

    let payload = build_move_payload(cl).map_err(ChannelError::from)?;
    let datagram = match cl.netchan.transmit(payload.as_slice(), cl.realtime) {
        Ok(datagram) => datagram,
        Err(err) => {
            // the channel is dead; unwind through the one cleanup point
            log::error!("{err}");
            cl.reset();
            return Err(err.into());
        }
    };

    if let Some(addr) = &cl.server_addr {
        socket.send(addr, &datagram);
    }
    Ok(())
}

/// Drops the connection, telling the server when the channel still works.
///
/// The farewell goes out three times; past that the server's own timeout
/// covers the loss. All session state is reinitialized atomically.
pub fn disconnect(cl: &mut ClientSession, socket: &mut impl NetSocket) {
    if cl.is_connected() {
        let mut buf = MessageWriter::new(16);
        let _ = buf.write_u8(clc::STRINGCMD);
        let _ = buf.write_string("disconnect");
        for _ in 0..3 {
            if let Ok(datagram) = cl.netchan.transmit(buf.as_slice(), cl.realtime) {
                if let Some(addr) = &cl.server_addr {
                    socket.send(addr, &datagram);
                }
            }
        }
    }
    cl.reset();
}
