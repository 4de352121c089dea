//! Prediction replay consistency: replaying only the unacknowledged tail of
//! the command ring from an authoritative state must agree exactly with a
//! full replay from the initial state.

use client::{predict_movement, ClientSession, ConnState};
use pmove::{run, EmptyEnv, MoveConstants, Pmove, PmoveState, UserCmd};

fn cmd(msec: u8, forward: i16, yaw: i16) -> UserCmd {
    UserCmd {
        msec,
        forward_move: forward,
        angles: [0, yaw, 0],
        ..UserCmd::default()
    }
}

fn session_with(
    seed: PmoveState,
    cmds: &[(usize, UserCmd)],
    acked: i32,
    outgoing: i32,
) -> ClientSession {
    let mut cl = ClientSession::new(1);
    cl.state = ConnState::Active;
    cl.frame.valid = true;
    cl.frame.playerstate.pmove = seed;
    for &(slot, command) in cmds {
        cl.cmds[slot] = command;
    }
    cl.netchan.incoming_acknowledged = acked;
    cl.netchan.outgoing_sequence = outgoing;
    cl
}

#[test]
fn incremental_replay_matches_full_replay() {
    let consts = MoveConstants::default();
    let spawn = PmoveState {
        gravity: 800,
        origin: [0, 0, 800],
        velocity: [0, 0, 0],
        ..PmoveState::default()
    };
    let commands = [cmd(16, 200, 0), cmd(16, 200, 4096), cmd(16, 0, 8192)];

    // the authoritative result for command 1, as the server computes it
    let mut server = Pmove::new(spawn, commands[0]);
    run(&mut server, &EmptyEnv, &consts);
    let after_first = server.state;

    // full replay: commands 1..3 against the initial state
    let mut full = session_with(
        spawn,
        &[(1, commands[0]), (2, commands[1]), (3, commands[2])],
        0,
        4,
    );
    predict_movement(&mut full, &EmptyEnv);

    // incremental replay: commands 2..3 against the acknowledged state
    let mut incremental = session_with(after_first, &[(2, commands[1]), (3, commands[2])], 1, 4);
    predict_movement(&mut incremental, &EmptyEnv);

    assert_eq!(full.predicted_origin, incremental.predicted_origin);
    assert_eq!(full.predicted_angles, incremental.predicted_angles);
}

#[test]
fn replay_is_deterministic() {
    let spawn = PmoveState {
        gravity: 800,
        origin: [800, -1600, 320],
        velocity: [100, 50, 0],
        ..PmoveState::default()
    };
    let commands = [(1, cmd(16, 300, 1024)), (2, cmd(32, -100, 2048))];

    let mut a = session_with(spawn, &commands, 0, 3);
    let mut b = session_with(spawn, &commands, 0, 3);
    predict_movement(&mut a, &EmptyEnv);
    predict_movement(&mut b, &EmptyEnv);

    assert_eq!(a.predicted_origin, b.predicted_origin);
    assert_eq!(a.predicted_angles, b.predicted_angles);
    assert_eq!(a.predicted_origins, b.predicted_origins);
}

#[test]
fn zero_duration_slots_are_skipped() {
    let spawn = PmoveState {
        gravity: 800,
        origin: [0, 0, 800],
        ..PmoveState::default()
    };
    let first = cmd(16, 200, 0);
    let second = cmd(16, -50, 512);

    // an unsent tick sits between the two real commands
    let mut gapped = session_with(spawn, &[(1, first), (2, cmd(0, 999, 999)), (3, second)], 0, 4);
    predict_movement(&mut gapped, &EmptyEnv);

    let mut packed = session_with(spawn, &[(1, first), (2, second)], 0, 3);
    predict_movement(&mut packed, &EmptyEnv);

    assert_eq!(gapped.predicted_origin, packed.predicted_origin);
}

#[test]
fn replay_freezes_when_the_server_falls_too_far_behind() {
    let spawn = PmoveState {
        gravity: 800,
        origin: [0, 0, 800],
        ..PmoveState::default()
    };
    let mut cl = session_with(spawn, &[], 0, 128);
    cl.predicted_origin = glam::Vec3::new(1.0, 2.0, 3.0);
    predict_movement(&mut cl, &EmptyEnv);

    // untouched: prediction declined to run rather than wrap the ring
    assert_eq!(cl.predicted_origin, glam::Vec3::new(1.0, 2.0, 3.0));
}
