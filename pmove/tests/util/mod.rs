//! Synthetic axis-aligned collision environments for movement tests.

use glam::Vec3;
use pmove::{CollisionEnv, Trace, TracePlane, CONTENTS_SOLID};

const DIST_EPSILON: f32 = 0.03125;

/// A solid axis-aligned box.
#[derive(Debug, Clone, Copy)]
pub struct Brush {
    pub min: Vec3,
    pub max: Vec3,
    pub contents: u32,
    pub surface_flags: u32,
}

impl Brush {
    pub fn solid(min: Vec3, max: Vec3) -> Self {
        Self {
            min,
            max,
            contents: CONTENTS_SOLID,
            surface_flags: 0,
        }
    }

    pub fn with_surface(mut self, flags: u32) -> Self {
        self.surface_flags = flags;
        self
    }
}

/// A world made of solid boxes plus non-solid content volumes.
#[derive(Debug, Clone, Default)]
pub struct BoxWorld {
    pub brushes: Vec<Brush>,
    pub volumes: Vec<Brush>,
}

impl BoxWorld {
    /// A large flat floor with its top surface at z = 0.
    pub fn flat_floor() -> Self {
        Self {
            brushes: vec![Brush::solid(
                Vec3::new(-4096.0, -4096.0, -64.0),
                Vec3::new(4096.0, 4096.0, 0.0),
            )],
            volumes: Vec::new(),
        }
    }

    pub fn add(mut self, brush: Brush) -> Self {
        self.brushes.push(brush);
        self
    }

    pub fn add_volume(mut self, volume: Brush) -> Self {
        self.volumes.push(volume);
        self
    }
}

fn inside(point: Vec3, min: Vec3, max: Vec3) -> bool {
    (0..3).all(|i| point[i] > min[i] && point[i] < max[i])
}

/// Clips a ray against an expanded box, returning the entry fraction and the
/// entry plane normal.
fn clip_ray(start: Vec3, delta: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let d = delta[axis];
        if d == 0.0 {
            if start[axis] <= min[axis] || start[axis] >= max[axis] {
                return None;
            }
            continue;
        }
        let t0 = (min[axis] - start[axis]) / d;
        let t1 = (max[axis] - start[axis]) / d;
        let (near, far) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
        if near > t_enter {
            t_enter = near;
            normal = Vec3::ZERO;
            // entry face normal opposes the motion on this axis
            normal[axis] = -d.signum();
        }
        t_exit = t_exit.min(far);
        if t_enter > t_exit {
            return None;
        }
    }

    if t_enter < 0.0 || t_enter > 1.0 {
        return None;
    }
    Some((t_enter, normal))
}

impl CollisionEnv for BoxWorld {
    fn trace(&self, start: Vec3, mins: Vec3, maxs: Vec3, end: Vec3) -> Trace {
        let delta = end - start;
        let mut result = Trace::unobstructed(end);

        for brush in &self.brushes {
            let bmin = brush.min - maxs;
            let bmax = brush.max - mins;

            if inside(start, bmin, bmax) {
                return Trace {
                    allsolid: true,
                    startsolid: true,
                    fraction: 0.0,
                    endpos: start,
                    plane: TracePlane::default(),
                    surface_flags: brush.surface_flags,
                    contents: brush.contents,
                    entity: Some(0),
                };
            }

            if let Some((t, normal)) = clip_ray(start, delta, bmin, bmax) {
                if t < result.fraction {
                    let length = delta.length();
                    let fraction = if length > 0.0 {
                        ((t * length - DIST_EPSILON) / length).max(0.0)
                    } else {
                        0.0
                    };
                    result = Trace {
                        allsolid: false,
                        startsolid: false,
                        fraction,
                        endpos: start + delta * fraction,
                        plane: TracePlane {
                            normal,
                            dist: 0.0,
                        },
                        surface_flags: brush.surface_flags,
                        contents: brush.contents,
                        entity: Some(0),
                    };
                }
            }
        }

        result
    }

    fn point_contents(&self, point: Vec3) -> u32 {
        let mut contents = 0;
        for brush in &self.brushes {
            if inside(point, brush.min, brush.max) {
                contents |= brush.contents;
            }
        }
        for volume in &self.volumes {
            if inside(point, volume.min, volume.max) {
                contents |= volume.contents;
            }
        }
        contents
    }
}
