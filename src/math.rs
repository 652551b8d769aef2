use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

const EPSILON: f32 = 1.0e-6;

/// Precision preset selected per simulation instance.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathMode {
    #[default]
    Accurate = 0,
    Fast = 1,
}

impl MathMode {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Fast,
            _ => Self::Accurate,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Accurate => 0,
            Self::Fast => 1,
        }
    }
}

/// Distance and normalization policy used by every force model.
///
/// Implementors only decide how an inverse square root is taken; the vector
/// helpers are shared so both presets agree on degenerate-input fallbacks.
/// Steps are monomorphized over the strategy, so the choice costs one branch
/// per step rather than one per agent.
pub trait MathStrategy {
    const MODE: MathMode;

    fn inverse_sqrt(value: f32) -> f32;

    #[inline]
    fn length(x: f32, y: f32, z: f32) -> f32 {
        let mag_sq = distance_sq_3d(x, y, z);
        if mag_sq <= 0.0 {
            return 0.0;
        }
        mag_sq * Self::inverse_sqrt(mag_sq)
    }

    #[inline]
    fn normalize_to_magnitude(x: f32, y: f32, z: f32, magnitude: f32) -> (f32, f32, f32) {
        let mag_sq = distance_sq_3d(x, y, z);
        if mag_sq <= EPSILON {
            return (0.0, 0.0, 0.0);
        }

        let scale = magnitude * Self::inverse_sqrt(mag_sq);
        (x * scale, y * scale, z * scale)
    }

    #[inline]
    fn normalize_or(x: f32, y: f32, z: f32, fallback: (f32, f32, f32)) -> (f32, f32, f32) {
        let mag_sq = distance_sq_3d(x, y, z);
        if mag_sq <= EPSILON {
            return fallback;
        }

        let inv_mag = Self::inverse_sqrt(mag_sq);
        (x * inv_mag, y * inv_mag, z * inv_mag)
    }

    #[inline]
    fn limit_magnitude(x: f32, y: f32, z: f32, max_magnitude: f32) -> (f32, f32, f32) {
        if max_magnitude <= 0.0 {
            return (0.0, 0.0, 0.0);
        }

        let mag_sq = distance_sq_3d(x, y, z);
        if mag_sq <= max_magnitude * max_magnitude {
            return (x, y, z);
        }

        let scale = max_magnitude * Self::inverse_sqrt(mag_sq);
        (x * scale, y * scale, z * scale)
    }
}

/// Library-precision square roots.
pub struct Accurate;

/// Bit-trick inverse square root with one Newton-Raphson refinement.
pub struct Fast;

impl MathStrategy for Accurate {
    const MODE: MathMode = MathMode::Accurate;

    #[inline]
    fn inverse_sqrt(value: f32) -> f32 {
        1.0 / value.sqrt()
    }
}

impl MathStrategy for Fast {
    const MODE: MathMode = MathMode::Fast;

    #[inline]
    fn inverse_sqrt(value: f32) -> f32 {
        fast_inverse_sqrt(value)
    }
}

pub fn distance_sq_3d(dx: f32, dy: f32, dz: f32) -> f32 {
    dx * dx + dy * dy + dz * dz
}

// One Newton-Raphson refinement keeps this fast while staying stable enough
// for steering vectors where small precision drift is acceptable.
fn fast_inverse_sqrt(value: f32) -> f32 {
    let half = 0.5 * value;
    let mut i = value.to_bits();
    i = 0x5f37_59df_u32.wrapping_sub(i >> 1);
    let mut y = f32::from_bits(i);
    y *= 1.5 - half * y * y;
    y.max(0.0)
}
