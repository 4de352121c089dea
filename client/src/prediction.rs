//! Client-side movement prediction: replaying unacknowledged commands
//! against the latest authoritative state.

use glam::Vec3;
use pmove::{CollisionEnv, Pmove, PMF_NO_PREDICTION, PMF_ON_GROUND};

use crate::session::{ClientSession, ConnState, CMD_BACKUP};
use crate::COORD_TO_WORLD;

const CMD_MASK: i32 = CMD_BACKUP as i32 - 1;

/// Manhattan distance (in 1/8-unit counts) beyond which a mismatch is a
/// legitimate teleport rather than a misprediction.
const TELEPORT_DISTANCE: i32 = 640;

/// Compares the authoritative origin in the newest frame against what we
/// predicted when the acknowledged command was sent, and stores the
/// difference as a decaying view correction.
pub fn check_prediction_error(cl: &mut ClientSession) {
    if !cl.prediction_enabled
        || cl.frame.playerstate.pmove.pm_flags & PMF_NO_PREDICTION != 0
    {
        return;
    }

    // the frame acknowledges the command that produced it
    let slot = (cl.netchan.incoming_acknowledged & CMD_MASK) as usize;

    let authoritative = cl.frame.playerstate.pmove.origin;
    let predicted = cl.predicted_origins[slot];
    let delta = [
        i32::from(authoritative[0]) - i32::from(predicted[0]),
        i32::from(authoritative[1]) - i32::from(predicted[1]),
        i32::from(authoritative[2]) - i32::from(predicted[2]),
    ];

    let len = delta[0].abs() + delta[1].abs() + delta[2].abs();
    if len > TELEPORT_DISTANCE {
        // a real teleport, not an error to smooth over
        cl.prediction_error = Vec3::ZERO;
    } else {
        if len > 1 {
            log::debug!(
                "prediction miss on frame {}: {delta:?}",
                cl.frame.server_frame
            );
        }
        cl.predicted_origins[slot] = authoritative;
        cl.prediction_error = Vec3::new(
            delta[0] as f32,
            delta[1] as f32,
            delta[2] as f32,
        ) * COORD_TO_WORLD;
    }
}

/// Re-runs the movement simulation over every command the server has not
/// acknowledged yet, producing the predicted render origin and angles.
pub fn predict_movement(cl: &mut ClientSession, env: &impl CollisionEnv) {
    if cl.state != ConnState::Active {
        return;
    }

    if !cl.prediction_enabled
        || cl.frame.playerstate.pmove.pm_flags & PMF_NO_PREDICTION != 0
    {
        // just set the view angles; movement waits for the server
        let latest = &cl.cmds[(cl.netchan.outgoing_sequence & CMD_MASK) as usize];
        let delta = cl.frame.playerstate.pmove.delta_angles;
        for i in 0..3 {
            cl.predicted_angles[i] = f32::from(latest.angles[i].wrapping_add(delta[i]))
                * (360.0 / 65536.0);
        }
        return;
    }

    let ack = cl.netchan.incoming_acknowledged;
    let current = cl.netchan.outgoing_sequence;

    if current - ack >= CMD_BACKUP as i32 {
        // too far behind to recover; freeze until the server catches up
        log::debug!("prediction exceeded command backup");
        return;
    }

    let mut pm = Pmove::new(cl.frame.playerstate.pmove, pmove::UserCmd::default());

    let mut ack = ack;
    while ack + 1 < current {
        ack += 1;
        let slot = (ack & CMD_MASK) as usize;
        let cmd = cl.cmds[slot];
        if cmd.msec == 0 {
            // unsent tick, nothing to simulate
            continue;
        }

        pm.cmd = cmd;
        pmove::run(&mut pm, env, &cl.move_constants);

        cl.predicted_origins[slot] = pm.state.origin;
    }

    // stair climbs pop the origin by a step; record it so the view can
    // smooth the rise over the next tenth of a second
    if pm.state.pm_flags & PMF_ON_GROUND != 0 {
        let old_slot = ((ack - 1) & CMD_MASK) as usize;
        let old_z = i32::from(cl.predicted_origins[old_slot][2]);
        let step = i32::from(pm.state.origin[2]) - old_z;
        if step > 63 && step < 160 {
            cl.predicted_step = step as f32 * COORD_TO_WORLD;
            cl.predicted_step_time = cl.realtime - cl.frame_time_ms / 2;
        }
    }

    cl.predicted_origin = Vec3::new(
        f32::from(pm.state.origin[0]),
        f32::from(pm.state.origin[1]),
        f32::from(pm.state.origin[2]),
    ) * COORD_TO_WORLD;
    cl.predicted_angles = pm.view_angles;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmove::PmType;

    #[test]
    fn small_miss_becomes_a_correction() {
        let mut cl = ClientSession::new(1);
        cl.netchan.incoming_acknowledged = 5;
        let slot = 5 & CMD_MASK as usize;
        cl.predicted_origins[slot] = [100, 0, 0];
        cl.frame.playerstate.pmove.origin = [108, 0, 0];

        check_prediction_error(&mut cl);
        assert_eq!(cl.prediction_error, Vec3::new(1.0, 0.0, 0.0));
        // the slot now holds the authoritative value
        assert_eq!(cl.predicted_origins[slot], [108, 0, 0]);
    }

    #[test]
    fn teleport_distance_discards_the_error() {
        let mut cl = ClientSession::new(1);
        cl.netchan.incoming_acknowledged = 2;
        let slot = 2 & CMD_MASK as usize;
        cl.predicted_origins[slot] = [0, 0, 0];
        cl.frame.playerstate.pmove.origin = [0, 8000, 0];

        check_prediction_error(&mut cl);
        assert_eq!(cl.prediction_error, Vec3::ZERO);
    }

    #[test]
    fn server_can_disable_prediction() {
        let mut cl = ClientSession::new(1);
        cl.frame.playerstate.pmove.pm_flags = PMF_NO_PREDICTION;
        cl.prediction_error = Vec3::new(1.0, 1.0, 1.0);
        check_prediction_error(&mut cl);
        // untouched: the check declined to run
        assert_eq!(cl.prediction_error, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn inactive_session_does_not_predict(){
        let mut cl = ClientSession::new(1);
        cl.state = ConnState::Connected;
        cl.frame.playerstate.pmove.pm_type = PmType::Normal;
        predict_movement(&mut cl, &pmove::EmptyEnv);
        assert_eq!(cl.predicted_origin, Vec3::ZERO);
    }
}
