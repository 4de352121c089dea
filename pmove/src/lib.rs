//! Deterministic, replayable player movement simulation.
//!
//! The same [`run`] step executes authoritatively on the server and
//! predictively on the client, which replays it over every unacknowledged
//! input command. Given identical inputs it produces bit-identical outputs:
//! positions are quantized back to 1/8-unit fixed point after every step,
//! collision queries go through an injected [`CollisionEnv`], and no ambient
//! state (clocks, globals, randomness) is read anywhere.
//!
//! # Example
//!
//! ```
//! use pmove::{run, EmptyEnv, MoveConstants, Pmove, PmoveState, UserCmd};
//!
//! let state = PmoveState {
//!     gravity: 800,
//!     ..PmoveState::default()
//! };
//! let cmd = UserCmd {
//!     msec: 16,
//!     forward_move: 200,
//!     ..UserCmd::default()
//! };
//!
//! let mut step = Pmove::new(state, cmd);
//! run(&mut step, &EmptyEnv, &MoveConstants::default());
//! ```

mod constants;
mod sim;
mod state;
mod trace;

pub use constants::{MoveConstants, MAX_CLIP_PLANES, MAX_TOUCH, MIN_STEP_NORMAL, STEP_SIZE};
pub use sim::{run, Pmove};
pub use state::{
    PmType, PmoveState, UserCmd, BUTTON_ANY, BUTTON_ATTACK, BUTTON_USE, PMF_DUCKED,
    PMF_JUMP_HELD, PMF_NO_PREDICTION, PMF_ON_GROUND, PMF_TIME_LAND, PMF_TIME_TELEPORT,
    PMF_TIME_WATERJUMP,
};
pub use trace::{
    CollisionEnv, EmptyEnv, Trace, TracePlane, CONTENTS_CURRENT_0, CONTENTS_CURRENT_180,
    CONTENTS_CURRENT_270, CONTENTS_CURRENT_90, CONTENTS_CURRENT_DOWN, CONTENTS_CURRENT_UP,
    CONTENTS_LADDER, CONTENTS_LAVA, CONTENTS_MONSTER, CONTENTS_PLAYERCLIP, CONTENTS_SLIME,
    CONTENTS_SOLID, CONTENTS_WATER, CONTENTS_WINDOW, MASK_CURRENT, MASK_PLAYERSOLID, MASK_WATER,
    SURF_SLICK,
};

/// Angle index: pitch (looking up/down).
pub const PITCH: usize = 0;
/// Angle index: yaw (turning left/right).
pub const YAW: usize = 1;
/// Angle index: roll (leaning).
pub const ROLL: usize = 2;
