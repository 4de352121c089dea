//! Collision environment interface.
//!
//! The movement simulation never touches a concrete collision module. It
//! traces through a [`CollisionEnv`] injected by the caller: the real client
//! wires this to the world model and the frame's solid entities, tests wire
//! it to synthetic geometry.

use glam::Vec3;

/// Contents bit: solid brush.
pub const CONTENTS_SOLID: u32 = 1;
/// Contents bit: translucent but solid window.
pub const CONTENTS_WINDOW: u32 = 2;
/// Contents bit: lava volume.
pub const CONTENTS_LAVA: u32 = 8;
/// Contents bit: slime volume.
pub const CONTENTS_SLIME: u32 = 16;
/// Contents bit: water volume.
pub const CONTENTS_WATER: u32 = 32;
/// Contents bit: blocks players only.
pub const CONTENTS_PLAYERCLIP: u32 = 0x10000;
/// Contents bits: directional water currents.
pub const CONTENTS_CURRENT_0: u32 = 0x40000;
pub const CONTENTS_CURRENT_90: u32 = 0x80000;
pub const CONTENTS_CURRENT_180: u32 = 0x0010_0000;
pub const CONTENTS_CURRENT_270: u32 = 0x0020_0000;
pub const CONTENTS_CURRENT_UP: u32 = 0x0040_0000;
pub const CONTENTS_CURRENT_DOWN: u32 = 0x0080_0000;
/// Contents bit: live monster.
pub const CONTENTS_MONSTER: u32 = 0x0200_0000;
/// Contents bit: climbable brush.
pub const CONTENTS_LADDER: u32 = 0x2000_0000;

/// Any liquid volume.
pub const MASK_WATER: u32 = CONTENTS_WATER | CONTENTS_LAVA | CONTENTS_SLIME;
/// Any directional current.
pub const MASK_CURRENT: u32 = CONTENTS_CURRENT_0
    | CONTENTS_CURRENT_90
    | CONTENTS_CURRENT_180
    | CONTENTS_CURRENT_270
    | CONTENTS_CURRENT_UP
    | CONTENTS_CURRENT_DOWN;
/// Everything that stops a player.
pub const MASK_PLAYERSOLID: u32 =
    CONTENTS_SOLID | CONTENTS_PLAYERCLIP | CONTENTS_WINDOW | CONTENTS_MONSTER;

/// Surface bit: frictionless.
pub const SURF_SLICK: u32 = 0x2;

/// The plane a trace stopped against.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TracePlane {
    pub normal: Vec3,
    pub dist: f32,
}

/// Result of sweeping a box through the collision environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    /// The entire sweep was inside solid.
    pub allsolid: bool,
    /// The sweep started inside solid.
    pub startsolid: bool,
    /// Fraction of the sweep completed before hitting something, 1.0 for a
    /// clear path.
    pub fraction: f32,
    /// Final position of the swept box.
    pub endpos: Vec3,
    /// Impact plane, valid when `fraction < 1.0`.
    pub plane: TracePlane,
    /// `SURF_*` bits of the struck surface.
    pub surface_flags: u32,
    /// Contents of the struck brush.
    pub contents: u32,
    /// Reference to the struck entity (0 = world), `None` if nothing was
    /// hit.
    pub entity: Option<u16>,
}

impl Trace {
    /// A trace that completed the full sweep without contact.
    #[must_use]
    pub fn unobstructed(end: Vec3) -> Self {
        Self {
            allsolid: false,
            startsolid: false,
            fraction: 1.0,
            endpos: end,
            plane: TracePlane::default(),
            surface_flags: 0,
            contents: 0,
            entity: None,
        }
    }
}

/// Injected collision queries.
///
/// Implementations must be pure functions of their inputs: the simulation is
/// replayed against the same environment and must produce identical results.
pub trait CollisionEnv {
    /// Sweeps an axis-aligned box from `start` to `end`.
    fn trace(&self, start: Vec3, mins: Vec3, maxs: Vec3, end: Vec3) -> Trace;

    /// Returns the contents bits at a point.
    fn point_contents(&self, point: Vec3) -> u32;
}

/// An environment with no geometry at all; every sweep passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyEnv;

impl CollisionEnv for EmptyEnv {
    fn trace(&self, _start: Vec3, _mins: Vec3, _maxs: Vec3, end: Vec3) -> Trace {
        Trace::unobstructed(end)
    }

    fn point_contents(&self, _point: Vec3) -> u32 {
        0
    }
}
