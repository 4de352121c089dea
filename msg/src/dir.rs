//! Compressed unit-vector directions.
//!
//! Directions travel as a single byte indexing a fixed table of 162 unit
//! vectors. The table is a deterministic spherical spiral; both peers build
//! the identical table, so encode/decode is stable without shipping the table
//! on the wire.

use std::sync::OnceLock;

/// Number of entries in the direction table.
pub const DIR_TABLE_LEN: usize = 162;

// Golden angle in radians, drives the spiral's azimuth step.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;

fn table() -> &'static [[f32; 3]; DIR_TABLE_LEN] {
    static TABLE: OnceLock<[[f32; 3]; DIR_TABLE_LEN]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut out = [[0.0f32; 3]; DIR_TABLE_LEN];
        for (i, entry) in out.iter_mut().enumerate() {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / DIR_TABLE_LEN as f64;
            let r = (1.0 - z * z).sqrt();
            let phi = i as f64 * GOLDEN_ANGLE;
            *entry = [
                (r * phi.cos()) as f32,
                (r * phi.sin()) as f32,
                z as f32,
            ];
        }
        out
    })
}

/// Decodes a table index back into a unit vector.
///
/// Returns `None` for indices outside the table; the message layer treats
/// that as a protocol violation.
#[must_use]
pub fn decode_direction(index: u8) -> Option<[f32; 3]> {
    table().get(index as usize).copied()
}

/// Encodes a direction as the table index with the largest dot product.
///
/// A zero vector encodes as index 0.
#[must_use]
pub fn encode_direction(dir: &[f32; 3]) -> u8 {
    let mut best = 0usize;
    let mut best_dot = f32::MIN;
    for (i, entry) in table().iter().enumerate() {
        let dot = dir[0] * entry[0] + dir[1] * entry[1] + dir[2] * entry[2];
        if dot > best_dot {
            best_dot = dot;
            best = i;
        }
    }
    best as u8
}
