//! Movement tuning constants.

/// Height a step-up move may climb, in units.
pub const STEP_SIZE: f32 = 18.0;

/// Minimum surface normal Z for a step landing (or ground contact) to count
/// as walkable.
pub const MIN_STEP_NORMAL: f32 = 0.7;

/// Velocity components smaller than this after clipping are zeroed.
pub const STOP_EPSILON: f32 = 0.1;

/// Maximum planes a slide move clips against before giving up.
pub const MAX_CLIP_PLANES: usize = 5;

/// Maximum entities reported touched per move.
pub const MAX_TOUCH: usize = 32;

/// Server-tunable movement scalars.
///
/// These mirror the server's movement configuration; `air_accelerate` in
/// particular arrives via a configstring and must match the server for
/// prediction to agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveConstants {
    /// Speed below which ground friction brakes to a stop.
    pub stop_speed: f32,
    /// Maximum horizontal wish speed.
    pub max_speed: f32,
    /// Maximum wish speed while ducked.
    pub duck_speed: f32,
    /// Ground acceleration.
    pub accelerate: f32,
    /// Air acceleration; zero selects the legacy single-step air control.
    pub air_accelerate: f32,
    /// Acceleration while swimming.
    pub water_accelerate: f32,
    /// Ground friction.
    pub friction: f32,
    /// Per-waterlevel friction while submerged.
    pub water_friction: f32,
    /// Speed applied by water currents.
    pub water_speed: f32,
}

impl Default for MoveConstants {
    fn default() -> Self {
        Self {
            stop_speed: 100.0,
            max_speed: 300.0,
            duck_speed: 100.0,
            accelerate: 10.0,
            air_accelerate: 0.0,
            water_accelerate: 10.0,
            friction: 6.0,
            water_friction: 1.0,
            water_speed: 400.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_classic_tuning() {
        let consts = MoveConstants::default();
        assert_eq!(consts.max_speed, 300.0);
        assert_eq!(consts.friction, 6.0);
        assert_eq!(consts.air_accelerate, 0.0);
    }
}
