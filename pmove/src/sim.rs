//! The movement step itself.
//!
//! [`run`] advances one [`PmoveState`] by one [`UserCmd`] against an injected
//! collision environment. The server runs it authoritatively; the client
//! re-runs it over unacknowledged commands to predict. Both must agree bit
//! for bit, which is why positions are quantized back to 1/8-unit counts at
//! the end of every step and why nothing here reads a clock or any other
//! ambient state.

use glam::Vec3;

use crate::constants::{
    MoveConstants, MAX_CLIP_PLANES, MAX_TOUCH, MIN_STEP_NORMAL, STEP_SIZE, STOP_EPSILON,
};
use crate::state::{
    PmType, PmoveState, UserCmd, PMF_DUCKED, PMF_JUMP_HELD, PMF_ON_GROUND, PMF_TIME_LAND,
    PMF_TIME_TELEPORT, PMF_TIME_WATERJUMP,
};
use crate::trace::{
    CollisionEnv, CONTENTS_CURRENT_0, CONTENTS_CURRENT_180, CONTENTS_CURRENT_270,
    CONTENTS_CURRENT_90, CONTENTS_CURRENT_DOWN, CONTENTS_CURRENT_UP, CONTENTS_LADDER,
    CONTENTS_SLIME, CONTENTS_SOLID, CONTENTS_WATER, MASK_CURRENT, MASK_WATER, SURF_SLICK,
};
use crate::{PITCH, ROLL, YAW};

/// One movement step: inputs, state, and per-step outputs.
#[derive(Debug, Clone)]
pub struct Pmove {
    /// Movement state, advanced in place.
    pub state: PmoveState,
    /// The input command driving this step.
    pub cmd: UserCmd,
    /// Re-snap the origin before moving (used when the state came from a
    /// source that may not sit exactly on the grid).
    pub snap_initial: bool,

    /// Entities the move pressed against, in contact order.
    pub touched: Vec<u16>,
    /// Clamped view angles in degrees.
    pub view_angles: [f32; 3],
    /// Eye height above the origin.
    pub view_height: f32,
    /// Bounding box used for this step.
    pub mins: Vec3,
    /// Bounding box used for this step.
    pub maxs: Vec3,
    /// Entity stood on, if any (0 = world).
    pub ground_entity: Option<u16>,
    /// Contents of the liquid the player is in.
    pub water_type: u32,
    /// Submersion level: 0 dry, 1 feet, 2 waist, 3 eyes.
    pub water_level: u8,
}

impl Pmove {
    /// Creates a step block for the given state and command.
    #[must_use]
    pub fn new(state: PmoveState, cmd: UserCmd) -> Self {
        Self {
            state,
            cmd,
            snap_initial: false,
            touched: Vec::with_capacity(MAX_TOUCH),
            view_angles: [0.0; 3],
            view_height: 0.0,
            mins: Vec3::ZERO,
            maxs: Vec3::ZERO,
            ground_entity: None,
            water_type: 0,
            water_level: 0,
        }
    }
}

#[derive(Debug, Default)]
struct MoveLocals {
    origin: Vec3,
    velocity: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    frametime: f32,
    ground_surface_flags: u32,
    ground_contents: u32,
    previous_origin: [i16; 3],
    ladder: bool,
}

const fn short_to_angle(counts: i32) -> f32 {
    counts as f32 * (360.0 / 65536.0)
}

fn angle_vectors(angles: [f32; 3]) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = Vec3::new(cp * cy, cp * sy, -sp);
    let right = Vec3::new(
        -sr * sp * cy + cr * sy,
        -sr * sp * sy - cr * cy,
        -sr * cp,
    );
    let up = Vec3::new(cr * sp * cy + sr * sy, cr * sp * sy - sr * cy, cr * cp);
    (forward, right, up)
}

fn normalize(v: Vec3) -> (Vec3, f32) {
    let length = v.length();
    if length > 0.0 {
        (v / length, length)
    } else {
        (v, 0.0)
    }
}

fn clip_velocity(incoming: Vec3, normal: Vec3, overbounce: f32) -> Vec3 {
    let backoff = incoming.dot(normal) * overbounce;
    let mut out = incoming - normal * backoff;
    for i in 0..3 {
        if out[i] > -STOP_EPSILON && out[i] < STOP_EPSILON {
            out[i] = 0.0;
        }
    }
    out
}

/// Advances `pm.state` by one command.
///
/// Deterministic and side-effect-free: identical `(state, cmd, environment,
/// constants)` always produce identical outputs.
pub fn run(pm: &mut Pmove, env: &impl CollisionEnv, consts: &MoveConstants) {
    pm.touched.clear();
    pm.view_angles = [0.0; 3];
    pm.view_height = 0.0;
    pm.ground_entity = None;
    pm.water_type = 0;
    pm.water_level = 0;
    pm.mins = Vec3::ZERO;
    pm.maxs = Vec3::ZERO;

    let mut sim = Sim {
        pm,
        env,
        consts,
        l: MoveLocals::default(),
    };
    sim.run();
}

struct Sim<'a, E: CollisionEnv> {
    pm: &'a mut Pmove,
    env: &'a E,
    consts: &'a MoveConstants,
    l: MoveLocals,
}

impl<E: CollisionEnv> Sim<'_, E> {
    fn run(&mut self) {
        self.l.origin = decode_coords(self.pm.state.origin);
        self.l.velocity = decode_coords(self.pm.state.velocity);
        self.l.previous_origin = self.pm.state.origin;
        self.l.frametime = f32::from(self.pm.cmd.msec) * 0.001;

        self.clamp_angles();

        if self.pm.state.pm_type == PmType::Spectator {
            self.fly_move();
            self.snap_position();
            return;
        }

        if matches!(
            self.pm.state.pm_type,
            PmType::Dead | PmType::Gib | PmType::Freeze
        ) {
            self.pm.cmd.forward_move = 0;
            self.pm.cmd.side_move = 0;
            self.pm.cmd.up_move = 0;
        }

        if self.pm.state.pm_type == PmType::Freeze {
            return;
        }

        self.check_duck();

        if self.pm.snap_initial {
            self.initial_snap_position();
        }

        self.categorize_position();

        if self.pm.state.pm_type == PmType::Dead {
            self.dead_move();
        }

        self.check_special_movement();

        self.drop_timers();

        if self.pm.state.pm_flags & PMF_TIME_TELEPORT != 0 {
            // teleport pause stays exactly in place
        } else if self.pm.state.pm_flags & PMF_TIME_WATERJUMP != 0 {
            // waterjump has no control, but falls
            self.l.velocity.z -= f32::from(self.pm.state.gravity) * self.l.frametime;
            if self.l.velocity.z < 0.0 {
                self.pm.state.pm_flags &=
                    !(PMF_TIME_WATERJUMP | PMF_TIME_LAND | PMF_TIME_TELEPORT);
                self.pm.state.pm_time = 0;
            }
            self.step_slide_move();
        } else {
            self.check_jump();
            self.friction();

            if self.pm.water_level >= 2 {
                self.water_move();
            } else {
                let mut angles = self.pm.view_angles;
                if angles[PITCH] > 180.0 {
                    angles[PITCH] -= 360.0;
                }
                angles[PITCH] /= 3.0;
                let (forward, right, up) = angle_vectors(angles);
                self.l.forward = forward;
                self.l.right = right;
                self.l.up = up;

                self.air_move();
            }
        }

        self.categorize_position();
        self.snap_position();
    }

    fn clamp_angles(&mut self) {
        if self.pm.state.pm_flags & PMF_TIME_TELEPORT != 0 {
            self.pm.view_angles[YAW] = short_to_angle(
                i32::from(self.pm.cmd.angles[YAW]) + i32::from(self.pm.state.delta_angles[YAW]),
            );
            self.pm.view_angles[PITCH] = 0.0;
            self.pm.view_angles[ROLL] = 0.0;
        } else {
            for i in 0..3 {
                let temp =
                    i32::from(self.pm.cmd.angles[i]) + i32::from(self.pm.state.delta_angles[i]);
                self.pm.view_angles[i] = short_to_angle(temp);
            }

            // don't let the player look up or down more than 90 degrees
            if self.pm.view_angles[PITCH] > 89.0 && self.pm.view_angles[PITCH] < 180.0 {
                self.pm.view_angles[PITCH] = 89.0;
            } else if self.pm.view_angles[PITCH] < 271.0 && self.pm.view_angles[PITCH] >= 180.0 {
                self.pm.view_angles[PITCH] = 271.0;
            }
        }

        let (forward, right, up) = angle_vectors(self.pm.view_angles);
        self.l.forward = forward;
        self.l.right = right;
        self.l.up = up;
    }

    fn check_duck(&mut self) {
        self.pm.mins.x = -16.0;
        self.pm.mins.y = -16.0;
        self.pm.maxs.x = 16.0;
        self.pm.maxs.y = 16.0;

        if self.pm.state.pm_type == PmType::Gib {
            self.pm.mins.z = 0.0;
            self.pm.maxs.z = 16.0;
            self.pm.view_height = 8.0;
            return;
        }

        self.pm.mins.z = -24.0;

        if self.pm.state.pm_type == PmType::Dead {
            self.pm.state.pm_flags |= PMF_DUCKED;
        } else if self.pm.cmd.up_move < 0 && self.pm.state.pm_flags & PMF_ON_GROUND != 0 {
            self.pm.state.pm_flags |= PMF_DUCKED;
        } else if self.pm.state.pm_flags & PMF_DUCKED != 0 {
            // try to stand up
            self.pm.maxs.z = 32.0;
            let trace = self
                .env
                .trace(self.l.origin, self.pm.mins, self.pm.maxs, self.l.origin);
            if !trace.allsolid {
                self.pm.state.pm_flags &= !PMF_DUCKED;
            }
        }

        if self.pm.state.pm_flags & PMF_DUCKED != 0 {
            self.pm.maxs.z = 4.0;
            self.pm.view_height = -2.0;
        } else {
            self.pm.maxs.z = 32.0;
            self.pm.view_height = 22.0;
        }
    }

    fn add_touch(&mut self, entity: Option<u16>) {
        if let Some(ent) = entity {
            if self.pm.touched.len() < MAX_TOUCH {
                self.pm.touched.push(ent);
            }
        }
    }

    fn categorize_position(&mut self) {
        // a short downward trace decides ground contact; moving up fast
        // always counts as airborne
        let mut point = self.l.origin;
        point.z -= 0.25;

        if self.l.velocity.z > 180.0 {
            self.pm.state.pm_flags &= !PMF_ON_GROUND;
            self.pm.ground_entity = None;
        } else {
            let trace = self.env.trace(self.l.origin, self.pm.mins, self.pm.maxs, point);
            self.l.ground_surface_flags = trace.surface_flags;
            self.l.ground_contents = trace.contents;

            if trace.entity.is_none() || (trace.plane.normal.z < 0.7 && !trace.startsolid) {
                self.pm.ground_entity = None;
                self.pm.state.pm_flags &= !PMF_ON_GROUND;
            } else {
                self.pm.ground_entity = trace.entity;

                // hitting solid ground ends a waterjump
                if self.pm.state.pm_flags & PMF_TIME_WATERJUMP != 0 {
                    self.pm.state.pm_flags &=
                        !(PMF_TIME_WATERJUMP | PMF_TIME_LAND | PMF_TIME_TELEPORT);
                    self.pm.state.pm_time = 0;
                }

                if self.pm.state.pm_flags & PMF_ON_GROUND == 0 {
                    // just hit the ground
                    self.pm.state.pm_flags |= PMF_ON_GROUND;
                    // don't apply landing time when just running down a slope
                    if self.l.velocity.z < -200.0 {
                        self.pm.state.pm_flags |= PMF_TIME_LAND;
                        self.pm.state.pm_time = if self.l.velocity.z < -400.0 { 25 } else { 18 };
                    }
                }
            }

            self.add_touch(trace.entity);
        }

        // waterlevel from three probes up the box, accounting for ducking
        self.pm.water_level = 0;
        self.pm.water_type = 0;

        let sample2 = self.pm.view_height - self.pm.mins.z;
        let sample1 = sample2 / 2.0;

        let mut point = self.l.origin;
        point.z = self.l.origin.z + self.pm.mins.z + 1.0;
        let contents = self.env.point_contents(point);
        if contents & MASK_WATER != 0 {
            self.pm.water_type = contents;
            self.pm.water_level = 1;
            point.z = self.l.origin.z + self.pm.mins.z + sample1;
            if self.env.point_contents(point) & MASK_WATER != 0 {
                self.pm.water_level = 2;
                point.z = self.l.origin.z + self.pm.mins.z + sample2;
                if self.env.point_contents(point) & MASK_WATER != 0 {
                    self.pm.water_level = 3;
                }
            }
        }
    }

    fn check_special_movement(&mut self) {
        if self.pm.state.pm_time != 0 {
            return;
        }

        self.l.ladder = false;

        let (flat_forward, _) = normalize(Vec3::new(self.l.forward.x, self.l.forward.y, 0.0));

        let spot = self.l.origin + flat_forward;
        let trace = self.env.trace(self.l.origin, self.pm.mins, self.pm.maxs, spot);
        if trace.fraction < 1.0 && trace.contents & CONTENTS_LADDER != 0 {
            self.l.ladder = true;
        }

        // check for a waterjump ledge
        if self.pm.water_level != 2 {
            return;
        }

        let mut spot = self.l.origin + flat_forward * 30.0;
        spot.z += 4.0;
        if self.env.point_contents(spot) & CONTENTS_SOLID == 0 {
            return;
        }
        spot.z += 16.0;
        if self.env.point_contents(spot) != 0 {
            return;
        }

        // launch out of the water
        self.l.velocity = flat_forward * 50.0;
        self.l.velocity.z = 350.0;
        self.pm.state.pm_flags |= PMF_TIME_WATERJUMP;
        self.pm.state.pm_time = 255;
    }

    fn drop_timers(&mut self) {
        if self.pm.state.pm_time != 0 {
            let mut msec = self.pm.cmd.msec >> 3;
            if msec == 0 {
                msec = 1;
            }
            if msec >= self.pm.state.pm_time {
                self.pm.state.pm_flags &=
                    !(PMF_TIME_WATERJUMP | PMF_TIME_LAND | PMF_TIME_TELEPORT);
                self.pm.state.pm_time = 0;
            } else {
                self.pm.state.pm_time -= msec;
            }
        }
    }

    fn check_jump(&mut self) {
        if self.pm.state.pm_flags & PMF_TIME_LAND != 0 {
            // hasn't been long enough since landing to jump again
            return;
        }

        if self.pm.cmd.up_move < 10 {
            // not holding jump
            self.pm.state.pm_flags &= !PMF_JUMP_HELD;
            return;
        }

        // must wait for jump to be released
        if self.pm.state.pm_flags & PMF_JUMP_HELD != 0 {
            return;
        }

        if self.pm.state.pm_type == PmType::Dead {
            return;
        }

        if self.pm.water_level >= 2 {
            // swimming, not jumping
            self.pm.ground_entity = None;

            if self.l.velocity.z <= -300.0 {
                return;
            }

            self.l.velocity.z = if self.pm.water_type == CONTENTS_WATER {
                100.0
            } else if self.pm.water_type == CONTENTS_SLIME {
                80.0
            } else {
                50.0
            };
            return;
        }

        if self.pm.ground_entity.is_none() {
            return; // in air, so no effect
        }

        self.pm.state.pm_flags |= PMF_JUMP_HELD;
        self.pm.ground_entity = None;
        self.l.velocity.z += 270.0;
        if self.l.velocity.z < 270.0 {
            self.l.velocity.z = 270.0;
        }
    }

    fn friction(&mut self) {
        let speed = self.l.velocity.length();
        if speed < 1.0 {
            self.l.velocity.x = 0.0;
            self.l.velocity.y = 0.0;
            return;
        }

        let mut drop = 0.0;

        // ground friction, zeroed on slick surfaces
        if (self.pm.ground_entity.is_some() && self.l.ground_surface_flags & SURF_SLICK == 0)
            || self.l.ladder
        {
            let control = if speed < self.consts.stop_speed {
                self.consts.stop_speed
            } else {
                speed
            };
            drop += control * self.consts.friction * self.l.frametime;
        }

        // water friction scales with submersion
        if self.pm.water_level != 0 && !self.l.ladder {
            drop += speed
                * self.consts.water_friction
                * f32::from(self.pm.water_level)
                * self.l.frametime;
        }

        let mut newspeed = speed - drop;
        if newspeed < 0.0 {
            newspeed = 0.0;
        }
        self.l.velocity *= newspeed / speed;
    }

    fn accelerate(&mut self, wishdir: Vec3, wishspeed: f32, accel: f32) {
        let currentspeed = self.l.velocity.dot(wishdir);
        let addspeed = wishspeed - currentspeed;
        if addspeed <= 0.0 {
            return;
        }
        let mut accelspeed = accel * self.l.frametime * wishspeed;
        if accelspeed > addspeed {
            accelspeed = addspeed;
        }
        self.l.velocity += wishdir * accelspeed;
    }

    fn air_accelerate(&mut self, wishdir: Vec3, wishspeed: f32, accel: f32) {
        let wishspd = wishspeed.min(30.0);
        let currentspeed = self.l.velocity.dot(wishdir);
        let addspeed = wishspd - currentspeed;
        if addspeed <= 0.0 {
            return;
        }
        // the uncapped wishspeed in the accel term is original behavior
        let mut accelspeed = accel * wishspeed * self.l.frametime;
        if accelspeed > addspeed {
            accelspeed = addspeed;
        }
        self.l.velocity += wishdir * accelspeed;
    }

    fn add_currents(&mut self, wishvel: &mut Vec3) {
        // ladder overrides vertical intent
        if self.l.ladder && self.l.velocity.z.abs() <= 200.0 {
            if self.pm.view_angles[PITCH] <= -15.0 && self.pm.cmd.forward_move > 0 {
                wishvel.z = 200.0;
            } else if self.pm.view_angles[PITCH] >= 15.0 && self.pm.cmd.forward_move > 0 {
                wishvel.z = -200.0;
            } else if self.pm.cmd.up_move > 0 {
                wishvel.z = 200.0;
            } else if self.pm.cmd.up_move < 0 {
                wishvel.z = -200.0;
            } else {
                wishvel.z = 0.0;
            }

            // limit horizontal speed when on a ladder
            wishvel.x = wishvel.x.clamp(-25.0, 25.0);
            wishvel.y = wishvel.y.clamp(-25.0, 25.0);
        }

        // water currents
        if self.pm.water_type & MASK_CURRENT != 0 {
            let mut v = Vec3::ZERO;
            if self.pm.water_type & CONTENTS_CURRENT_0 != 0 {
                v.x += 1.0;
            }
            if self.pm.water_type & CONTENTS_CURRENT_90 != 0 {
                v.y += 1.0;
            }
            if self.pm.water_type & CONTENTS_CURRENT_180 != 0 {
                v.x -= 1.0;
            }
            if self.pm.water_type & CONTENTS_CURRENT_270 != 0 {
                v.y -= 1.0;
            }
            if self.pm.water_type & CONTENTS_CURRENT_UP != 0 {
                v.z += 1.0;
            }
            if self.pm.water_type & CONTENTS_CURRENT_DOWN != 0 {
                v.z -= 1.0;
            }

            let mut s = self.consts.water_speed;
            if self.pm.water_level == 1 && self.pm.ground_entity.is_some() {
                s /= 2.0;
            }
            *wishvel += v * s;
        }

        // conveyor-belt ground currents
        if self.pm.ground_entity.is_some() {
            let mut v = Vec3::ZERO;
            if self.l.ground_contents & CONTENTS_CURRENT_0 != 0 {
                v.x += 1.0;
            }
            if self.l.ground_contents & CONTENTS_CURRENT_90 != 0 {
                v.y += 1.0;
            }
            if self.l.ground_contents & CONTENTS_CURRENT_180 != 0 {
                v.x -= 1.0;
            }
            if self.l.ground_contents & CONTENTS_CURRENT_270 != 0 {
                v.y -= 1.0;
            }
            if self.l.ground_contents & CONTENTS_CURRENT_UP != 0 {
                v.z += 1.0;
            }
            if self.l.ground_contents & CONTENTS_CURRENT_DOWN != 0 {
                v.z -= 1.0;
            }
            *wishvel += v * 100.0;
        }
    }

    fn water_move(&mut self) {
        let fmove = f32::from(self.pm.cmd.forward_move);
        let smove = f32::from(self.pm.cmd.side_move);
        let mut wishvel = self.l.forward * fmove + self.l.right * smove;

        if self.pm.cmd.forward_move == 0 && self.pm.cmd.side_move == 0 && self.pm.cmd.up_move == 0
        {
            wishvel.z -= 60.0; // drift towards bottom
        } else {
            wishvel.z += f32::from(self.pm.cmd.up_move);
        }

        self.add_currents(&mut wishvel);

        let (wishdir, mut wishspeed) = normalize(wishvel);
        if wishspeed > self.consts.max_speed {
            wishspeed = self.consts.max_speed;
        }
        wishspeed *= 0.5;

        self.accelerate(wishdir, wishspeed, self.consts.water_accelerate);
        self.step_slide_move();
    }

    fn air_move(&mut self) {
        let fmove = f32::from(self.pm.cmd.forward_move);
        let smove = f32::from(self.pm.cmd.side_move);

        let mut wishvel = Vec3::new(
            self.l.forward.x * fmove + self.l.right.x * smove,
            self.l.forward.y * fmove + self.l.right.y * smove,
            0.0,
        );

        self.add_currents(&mut wishvel);

        let (wishdir, raw_wishspeed) = normalize(wishvel);
        let mut wishspeed = raw_wishspeed;

        let maxspeed = if self.pm.state.pm_flags & PMF_DUCKED != 0 {
            self.consts.duck_speed
        } else {
            self.consts.max_speed
        };
        if wishspeed > maxspeed {
            wishvel *= maxspeed / wishspeed;
            wishspeed = maxspeed;
        }

        if self.l.ladder {
            self.accelerate(wishdir, wishspeed, self.consts.accelerate);
            if wishvel.z == 0.0 {
                // settle against gravity while hanging on
                if self.l.velocity.z > 0.0 {
                    self.l.velocity.z -= f32::from(self.pm.state.gravity) * self.l.frametime;
                    if self.l.velocity.z < 0.0 {
                        self.l.velocity.z = 0.0;
                    }
                } else {
                    self.l.velocity.z += f32::from(self.pm.state.gravity) * self.l.frametime;
                    if self.l.velocity.z > 0.0 {
                        self.l.velocity.z = 0.0;
                    }
                }
            }
            self.step_slide_move();
        } else if self.pm.ground_entity.is_some() {
            // walking on ground
            self.l.velocity.z = 0.0;
            self.accelerate(wishdir, wishspeed, self.consts.accelerate);

            if self.pm.state.gravity > 0 {
                self.l.velocity.z = 0.0;
            } else {
                self.l.velocity.z -= f32::from(self.pm.state.gravity) * self.l.frametime;
            }

            if self.l.velocity.x == 0.0 && self.l.velocity.y == 0.0 {
                return;
            }
            self.step_slide_move();
        } else {
            // airborne: little control
            if self.consts.air_accelerate != 0.0 {
                self.air_accelerate(wishdir, wishspeed, self.consts.accelerate);
            } else {
                self.accelerate(wishdir, wishspeed, 1.0);
            }
            self.l.velocity.z -= f32::from(self.pm.state.gravity) * self.l.frametime;
            self.step_slide_move();
        }
    }

    /// Clips the move against up to [`MAX_CLIP_PLANES`] impacted planes over
    /// at most four bump iterations.
    fn slide_move(&mut self) {
        const NUM_BUMPS: usize = 4;

        let primal_velocity = self.l.velocity;
        let mut planes = [Vec3::ZERO; MAX_CLIP_PLANES];
        let mut num_planes = 0usize;
        let mut time_left = self.l.frametime;

        for _ in 0..NUM_BUMPS {
            let end = self.l.origin + self.l.velocity * time_left;
            let trace = self.env.trace(self.l.origin, self.pm.mins, self.pm.maxs, end);

            if trace.allsolid {
                // trapped in a solid; kill vertical speed so no fall
                // damage accumulates
                self.l.velocity.z = 0.0;
                return;
            }

            if trace.fraction > 0.0 {
                // covered some distance
                self.l.origin = trace.endpos;
                num_planes = 0;
            }

            if trace.fraction == 1.0 {
                break; // moved the entire distance
            }

            self.add_touch(trace.entity);

            time_left -= time_left * trace.fraction;

            if num_planes >= MAX_CLIP_PLANES {
                // shouldn't really happen
                self.l.velocity = Vec3::ZERO;
                break;
            }
            planes[num_planes] = trace.plane.normal;
            num_planes += 1;

            // clip the velocity so it parallels all of the hit planes
            let mut i = 0;
            while i < num_planes {
                self.l.velocity = clip_velocity(self.l.velocity, planes[i], 1.01);
                let mut ok = true;
                for (j, plane) in planes.iter().enumerate().take(num_planes) {
                    if j != i && self.l.velocity.dot(*plane) < 0.0 {
                        ok = false;
                        break;
                    }
                }
                if ok {
                    break;
                }
                i += 1;
            }

            if i == num_planes {
                // no direction satisfies every plane: slide along the
                // crease of exactly two, otherwise stop
                if num_planes != 2 {
                    self.l.velocity = Vec3::ZERO;
                    break;
                }
                let dir = planes[0].cross(planes[1]);
                self.l.velocity = dir * dir.dot(self.l.velocity);
            }

            // stop dead if we turned against the original velocity, to
            // avoid oscillations in sloping corners
            if self.l.velocity.dot(primal_velocity) <= 0.0 {
                self.l.velocity = Vec3::ZERO;
                break;
            }
        }

        if self.pm.state.pm_time != 0 {
            self.l.velocity = primal_velocity;
        }
    }

    /// Tries the flat slide and a stepped-up slide, keeping whichever
    /// traveled farther horizontally.
    fn step_slide_move(&mut self) {
        let start_o = self.l.origin;
        let start_v = self.l.velocity;

        self.slide_move();

        let down_o = self.l.origin;
        let down_v = self.l.velocity;

        let mut up = start_o;
        up.z += STEP_SIZE;

        let trace = self.env.trace(up, self.pm.mins, self.pm.maxs, up);
        if trace.allsolid {
            return; // can't step up
        }

        // try sliding from the raised position
        self.l.origin = up;
        self.l.velocity = start_v;
        self.slide_move();

        // push down the final amount
        let mut down = self.l.origin;
        down.z -= STEP_SIZE;
        let trace = self.env.trace(self.l.origin, self.pm.mins, self.pm.maxs, down);
        if !trace.allsolid {
            self.l.origin = trace.endpos;
        }

        let up = self.l.origin;

        // decide which one went farther, on horizontal distance only
        let down_dist = (down_o.x - start_o.x) * (down_o.x - start_o.x)
            + (down_o.y - start_o.y) * (down_o.y - start_o.y);
        let up_dist =
            (up.x - start_o.x) * (up.x - start_o.x) + (up.y - start_o.y) * (up.y - start_o.y);

        if down_dist > up_dist || trace.plane.normal.z < MIN_STEP_NORMAL {
            self.l.origin = down_o;
            self.l.velocity = down_v;
            return;
        }

        // stepping keeps the flat move's vertical speed
        self.l.velocity.z = down_v.z;
    }

    fn dead_move(&mut self) {
        if self.pm.ground_entity.is_none() {
            return;
        }

        // extra friction
        let remaining = self.l.velocity.length() - 20.0;
        if remaining <= 0.0 {
            self.l.velocity = Vec3::ZERO;
        } else {
            let (dir, _) = normalize(self.l.velocity);
            self.l.velocity = dir * remaining;
        }
    }

    /// Spectator flight: friction and acceleration with no clipping.
    fn fly_move(&mut self) {
        self.pm.view_height = 22.0;

        // friction
        let speed = self.l.velocity.length();
        if speed < 1.0 {
            self.l.velocity = Vec3::ZERO;
        } else {
            let friction = self.consts.friction * 1.5; // extra friction
            let control = if speed < self.consts.stop_speed {
                self.consts.stop_speed
            } else {
                speed
            };
            let mut newspeed = speed - control * friction * self.l.frametime;
            if newspeed < 0.0 {
                newspeed = 0.0;
            }
            self.l.velocity *= newspeed / speed;
        }

        // accelerate
        let fmove = f32::from(self.pm.cmd.forward_move);
        let smove = f32::from(self.pm.cmd.side_move);

        let (forward, _) = normalize(self.l.forward);
        let (right, _) = normalize(self.l.right);

        let mut wishvel = forward * fmove + right * smove;
        wishvel.z += f32::from(self.pm.cmd.up_move);

        let (wishdir, mut wishspeed) = normalize(wishvel);
        if wishspeed > self.consts.max_speed {
            wishvel *= self.consts.max_speed / wishspeed;
            wishspeed = self.consts.max_speed;
        }

        let currentspeed = self.l.velocity.dot(wishdir);
        let addspeed = wishspeed - currentspeed;
        if addspeed > 0.0 {
            let mut accelspeed = self.consts.accelerate * self.l.frametime * wishspeed;
            if accelspeed > addspeed {
                accelspeed = addspeed;
            }
            self.l.velocity += wishdir * accelspeed;
        }

        // move without clipping
        self.l.origin += self.l.velocity * self.l.frametime;
    }

    fn good_position(&self, origin: [i16; 3]) -> bool {
        if self.pm.state.pm_type == PmType::Spectator {
            return true;
        }
        let point = decode_coords(origin);
        let trace = self.env.trace(point, self.pm.mins, self.pm.maxs, point);
        !trace.allsolid
    }

    /// Quantizes the float position back to 1/8-unit counts, probing the
    /// jitter combinations so the snapped box is not embedded in solid.
    fn snap_position(&mut self) {
        // probe order: exact truncation, then Z alone, then the X/Y
        // combinations, then the full-corner offsets
        const JITTER_BITS: [u8; 8] = [0, 4, 1, 2, 3, 5, 6, 7];

        for i in 0..3 {
            self.pm.state.velocity[i] = ((self.l.velocity[i] * 8.0) as i32) as i16;
        }

        let mut sign = [0i16; 3];
        let mut base = [0i16; 3];
        for i in 0..3 {
            sign[i] = if self.l.origin[i] >= 0.0 { 1 } else { -1 };
            base[i] = ((self.l.origin[i] * 8.0) as i32) as i16;
            if f32::from(base[i]) * 0.125 == self.l.origin[i] {
                sign[i] = 0;
            }
        }

        for bits in JITTER_BITS {
            let mut candidate = base;
            for i in 0..3 {
                if bits & (1 << i) != 0 {
                    candidate[i] = candidate[i].wrapping_add(sign[i]);
                }
            }
            if self.good_position(candidate) {
                self.pm.state.origin = candidate;
                return;
            }
        }

        // go back to the last position
        self.pm.state.origin = self.l.previous_origin;
    }

    /// Probes the 27 neighbor offsets for a free spot when the incoming
    /// state may be off-grid.
    fn initial_snap_position(&mut self) {
        const OFFSET: [i16; 3] = [0, -1, 1];

        let base = self.pm.state.origin;
        for z in OFFSET {
            for y in OFFSET {
                for x in OFFSET {
                    let candidate = [
                        base[0].wrapping_add(x),
                        base[1].wrapping_add(y),
                        base[2].wrapping_add(z),
                    ];
                    if self.good_position(candidate) {
                        self.pm.state.origin = candidate;
                        self.l.origin = decode_coords(candidate);
                        self.l.previous_origin = candidate;
                        return;
                    }
                }
            }
        }
    }
}

fn decode_coords(counts: [i16; 3]) -> Vec3 {
    Vec3::new(
        f32::from(counts[0]) * 0.125,
        f32::from(counts[1]) * 0.125,
        f32::from(counts[2]) * 0.125,
    )
}
