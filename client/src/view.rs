//! Render-time interpolation: the lerp fraction, entity transforms, and the
//! predicted view origin.

use codec::{RF_BEAM, RF_FRAMELERP};
use glam::Vec3;
use pmove::PMF_NO_PREDICTION;

use crate::frame::SERVER_FRAME_MS;
use crate::session::{ClientEntity, ClientSession, ConnState};
use crate::COORD_TO_WORLD;

/// Milliseconds a recorded stair step is smoothed over.
const STEP_SMOOTH_MS: i64 = 100;

/// Advances the simulation clock window and recomputes the interpolation
/// fraction between the previous and current frame.
///
/// Both clamp branches correct `time` itself, not just the fraction, so the
/// local clock stays loosely locked to server ticks without a full clock
/// sync protocol.
pub fn update_lerp(cl: &mut ClientSession, elapsed_ms: i64) -> f32 {
    cl.realtime += elapsed_ms;
    cl.frame_time_ms = elapsed_ms;
    cl.time += elapsed_ms as i32;

    if cl.time > cl.frame.server_time {
        log::trace!("high clamp {}ms", cl.time - cl.frame.server_time);
        cl.time = cl.frame.server_time;
        cl.lerp_frac = 1.0;
    } else if cl.time < cl.frame.server_time - SERVER_FRAME_MS {
        log::trace!(
            "low clamp {}ms",
            cl.frame.server_time - SERVER_FRAME_MS - cl.time
        );
        cl.time = cl.frame.server_time - SERVER_FRAME_MS;
        cl.lerp_frac = 0.0;
    } else {
        cl.lerp_frac = 1.0 - (cl.frame.server_time - cl.time) as f32 / SERVER_FRAME_MS as f32;
    }

    cl.lerp_frac
}

/// Shortest-path interpolation between two angles in degrees.
#[must_use]
pub fn lerp_angle(from: f32, to: f32, frac: f32) -> f32 {
    let mut to = to;
    if to - from > 180.0 {
        to -= 360.0;
    }
    if to - from < -180.0 {
        to += 360.0;
    }
    from + frac * (to - from)
}

/// A render-ready entity transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    pub origin: Vec3,
    /// Second anchor point for beams, the interpolation start otherwise.
    pub old_origin: Vec3,
    pub angles: [f32; 3],
}

/// Computes the render transform for one entity at the given lerp fraction.
///
/// Beams keep their discrete endpoints, frame-lerped entities step, and
/// entities flagged across a discontinuity were already snapped by the
/// parser (their previous state equals the current one).
#[must_use]
pub fn entity_transform(ent: &ClientEntity, lerp_frac: f32) -> RenderTransform {
    let current = &ent.current;
    let prev = &ent.prev;

    if current.render_fx & RF_BEAM != 0 {
        return RenderTransform {
            origin: Vec3::from_array(current.origin),
            old_origin: Vec3::from_array(current.old_origin),
            angles: current.angles,
        };
    }

    let (origin, old_origin) = if current.render_fx & RF_FRAMELERP != 0 {
        // step exactly on the server-provided pair
        (
            Vec3::from_array(current.origin),
            Vec3::from_array(current.old_origin),
        )
    } else {
        let from = Vec3::from_array(prev.origin);
        let to = Vec3::from_array(current.origin);
        (from + (to - from) * lerp_frac, from)
    };

    let mut angles = [0.0; 3];
    for i in 0..3 {
        angles[i] = lerp_angle(prev.angles[i], current.angles[i], lerp_frac);
    }

    RenderTransform {
        origin,
        old_origin,
        angles,
    }
}

/// The camera pose for this render tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub origin: Vec3,
    pub angles: [f32; 3],
}

/// Computes the view origin and angles, consuming prediction output when
/// available and falling back to pure frame interpolation otherwise.
#[must_use]
pub fn calc_view(cl: &ClientSession) -> ViewState {
    if cl.state != ConnState::Active {
        return ViewState {
            origin: Vec3::ZERO,
            angles: [0.0; 3],
        };
    }

    let ps = &cl.frame.playerstate;

    // previous frame's player state, when it is actually the previous tick
    let prev_slot =
        (cl.frame.server_frame - 1) & (crate::frame::UPDATE_BACKUP as i32 - 1);
    let prev_frame = &cl.frames[prev_slot as usize];
    let ops = if prev_frame.valid && prev_frame.server_frame == cl.frame.server_frame - 1 {
        &prev_frame.playerstate
    } else {
        ps
    };

    let lerp = cl.lerp_frac;
    let view_offset = |state: &codec::PlayerState| Vec3::from_array(state.view_offset);

    let mut origin;
    let angles;

    if cl.prediction_enabled && ps.pmove.pm_flags & PMF_NO_PREDICTION == 0 {
        // predicted position, minus the decaying error correction
        let backlerp = 1.0 - lerp;
        origin = cl.predicted_origin
            + view_offset(ops)
            + (view_offset(ps) - view_offset(ops)) * lerp
            - cl.prediction_error * backlerp;

        // smooth out stair climbs
        let since_step = cl.realtime - cl.predicted_step_time;
        if since_step < STEP_SMOOTH_MS {
            origin.z -=
                cl.predicted_step * (STEP_SMOOTH_MS - since_step) as f32 * 0.01;
        }

        angles = cl.predicted_angles;
    } else {
        // spectating or prediction off: pure interpolation
        let from = Vec3::new(
            f32::from(ops.pmove.origin[0]),
            f32::from(ops.pmove.origin[1]),
            f32::from(ops.pmove.origin[2]),
        ) * COORD_TO_WORLD
            + view_offset(ops);
        let to = Vec3::new(
            f32::from(ps.pmove.origin[0]),
            f32::from(ps.pmove.origin[1]),
            f32::from(ps.pmove.origin[2]),
        ) * COORD_TO_WORLD
            + view_offset(ps);
        origin = from + (to - from) * lerp;

        let mut lerped = [0.0; 3];
        for i in 0..3 {
            lerped[i] = lerp_angle(ops.view_angles[i], ps.view_angles[i], lerp);
        }
        angles = lerped;
    }

    ViewState { origin, angles }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn lerp_frac_tracks_the_tick_window() {
        let mut cl = ClientSession::new(1);
        cl.frame.server_time = 1000;
        cl.time = 900;

        assert_eq!(update_lerp(&mut cl, 50), 0.5);
        assert_eq!(cl.time, 950);
    }

    #[test]
    fn high_clamp_pins_time_to_the_frame() {
        let mut cl = ClientSession::new(1);
        cl.frame.server_time = 1000;
        cl.time = 990;

        assert_eq!(update_lerp(&mut cl, 50), 1.0);
        assert_eq!(cl.time, 1000, "clock pulled back to the frame time");
    }

    #[test]
    fn low_clamp_pins_time_to_the_window_floor() {
        let mut cl = ClientSession::new(1);
        cl.frame.server_time = 1000;
        cl.time = 700;

        assert_eq!(update_lerp(&mut cl, 10), 0.0);
        assert_eq!(cl.time, 900, "clock pushed up into the window");
    }

    #[test]
    fn angle_lerp_takes_the_short_way_around() {
        assert_eq!(lerp_angle(350.0, 10.0, 0.5), 360.0);
        assert_eq!(lerp_angle(10.0, 350.0, 0.5), 0.0);
        assert_eq!(lerp_angle(0.0, 90.0, 0.5), 45.0);
    }

    #[test]
    fn entity_transform_interpolates_origin() {
        let mut ent = ClientEntity::default();
        ent.prev.origin = [0.0, 0.0, 0.0];
        ent.current.origin = [10.0, 20.0, 0.0];

        let transform = entity_transform(&ent, 0.5);
        assert_eq!(transform.origin, Vec3::new(5.0, 10.0, 0.0));
    }

    #[test]
    fn beams_do_not_interpolate() {
        let mut ent = ClientEntity::default();
        ent.prev.origin = [0.0, 0.0, 0.0];
        ent.current.origin = [10.0, 0.0, 0.0];
        ent.current.old_origin = [90.0, 0.0, 0.0];
        ent.current.render_fx = RF_BEAM;

        let transform = entity_transform(&ent, 0.5);
        assert_eq!(transform.origin, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(transform.old_origin, Vec3::new(90.0, 0.0, 0.0));
    }

    #[test]
    fn predicted_view_blends_error_away() {
        let mut cl = ClientSession::new(1);
        cl.state = ConnState::Active;
        cl.predicted_origin = Vec3::new(100.0, 0.0, 24.0);
        cl.prediction_error = Vec3::new(8.0, 0.0, 0.0);
        cl.lerp_frac = 0.25;
        // make the previous-frame lookup fail so ops == ps
        cl.frame.server_frame = 7;

        let view = calc_view(&cl);
        // three quarters of the error still subtracted at lerp 0.25
        assert_eq!(view.origin.x, 100.0 - 6.0);
    }

    #[test]
    fn unpredicted_view_interpolates_player_origin() {
        let mut cl = ClientSession::new(1);
        cl.state = ConnState::Active;
        cl.prediction_enabled = false;
        cl.lerp_frac = 0.5;

        cl.frame.server_frame = 8;
        cl.frame.playerstate.pmove.origin = [160, 0, 0]; // 20 units

        let prev = Frame {
            valid: true,
            server_frame: 7,
            ..Frame::default()
        };
        // prev playerstate origin is zero
        cl.frames[7] = prev;

        let view = calc_view(&cl);
        assert_eq!(view.origin.x, 10.0);
    }

    #[test]
    fn step_smoothing_decays_over_its_window() {
        let mut cl = ClientSession::new(1);
        cl.state = ConnState::Active;
        cl.predicted_origin = Vec3::new(0.0, 0.0, 40.0);
        cl.predicted_step = 16.0;
        cl.predicted_step_time = 1000;
        cl.realtime = 1050; // halfway through the smoothing window
        cl.lerp_frac = 1.0;
        cl.frame.server_frame = 3;

        let view = calc_view(&cl);
        assert_eq!(view.origin.z, 40.0 - 8.0);
    }
}
