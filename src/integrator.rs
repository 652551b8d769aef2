use crate::math::MathStrategy;
use crate::neighbor_grid::AxisWrap;

pub(crate) const MIN_BOUND: f32 = 1.0e-6;
const EPSILON: f32 = 1.0e-6;
const MAX_REFLECTIONS: usize = 4;

/// World extents and per-axis boundary policy.
///
/// The longer canvas side maps to extent 1.0 so radii and speeds keep their
/// meaning across canvas sizes. Depth always spans 1.0.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Bounds {
    pub(crate) extent_x: f32,
    pub(crate) extent_y: f32,
    pub(crate) extent_z: f32,
    pub(crate) bounce_x: bool,
    pub(crate) bounce_y: bool,
    pub(crate) bounce_z: bool,
}

impl Bounds {
    pub(crate) fn new(width: f32, height: f32) -> Self {
        let mut bounds = Self {
            extent_x: 1.0,
            extent_y: 1.0,
            extent_z: 1.0,
            bounce_x: false,
            bounce_y: false,
            bounce_z: false,
        };
        bounds.resize(width, height);
        bounds
    }

    /// Applies a new canvas size and returns the factors that carry existing
    /// positions into the new extents.
    pub(crate) fn resize(&mut self, width: f32, height: f32) -> (f32, f32) {
        let old_x = self.extent_x;
        let old_y = self.extent_y;

        let width = sanitize_bound(width);
        let height = sanitize_bound(height);
        let longest = width.max(height);
        self.extent_x = width / longest;
        self.extent_y = height / longest;

        (self.extent_x / old_x, self.extent_y / old_y)
    }

    pub(crate) fn set_bounce(&mut self, bounce_x: bool, bounce_y: bool, bounce_z: bool) {
        self.bounce_x = bounce_x;
        self.bounce_y = bounce_y;
        self.bounce_z = bounce_z;
    }

    pub(crate) fn wrap(&self) -> AxisWrap {
        AxisWrap {
            x: !self.bounce_x,
            y: !self.bounce_y,
            z: !self.bounce_z,
        }
    }

    pub(crate) fn mid_layer(&self) -> f32 {
        self.extent_z * 0.5
    }

    #[cfg(debug_assertions)]
    pub(crate) fn contains(&self, x: f32, y: f32, z: f32) -> bool {
        (0.0..=self.extent_x).contains(&x)
            && (0.0..=self.extent_y).contains(&y)
            && (0.0..=self.extent_z).contains(&z)
    }
}

fn sanitize_bound(value: f32) -> f32 {
    if value.is_finite() {
        value.max(MIN_BOUND)
    } else {
        MIN_BOUND
    }
}

/// Advances one coordinate by `velocity * dt`.
///
/// Wrapping folds the result back into `[0, extent)`. Bouncing reflects off
/// either wall (flipping the velocity each time) up to four times, then clamps.
pub(crate) fn integrate_axis(
    position: f32,
    velocity: f32,
    dt: f32,
    extent: f32,
    bounce: bool,
) -> (f32, f32) {
    if !bounce {
        return ((position + velocity * dt).rem_euclid(extent), velocity);
    }

    let mut next_position = position + velocity * dt;
    let mut next_velocity = velocity;

    for _ in 0..MAX_REFLECTIONS {
        if (0.0..=extent).contains(&next_position) {
            break;
        }

        if next_position < 0.0 {
            next_position = -next_position;
        } else {
            next_position = extent * 2.0 - next_position;
        }
        next_velocity = -next_velocity;
    }

    (next_position.clamp(0.0, extent), next_velocity)
}

/// Puts a corrected coordinate back inside the world without touching velocity.
pub(crate) fn project_axis_position(position: f32, extent: f32, bounce: bool) -> f32 {
    if bounce {
        position.clamp(0.0, extent)
    } else {
        position.rem_euclid(extent)
    }
}

/// Rescales a velocity into `[min_speed, max_speed]`. A velocity too small to
/// carry a direction restarts along `fallback` (a unit vector), unless there
/// is no minimum speed to restart at.
pub(crate) fn clamp_speed<M: MathStrategy>(
    velocity: (f32, f32, f32),
    min_speed: f32,
    max_speed: f32,
    fallback: (f32, f32, f32),
) -> (f32, f32, f32) {
    let (vx, vy, vz) = velocity;
    let speed_sq = vx * vx + vy * vy + vz * vz;

    if speed_sq <= EPSILON {
        if min_speed <= 0.0 {
            return velocity;
        }
        return (
            fallback.0 * min_speed,
            fallback.1 * min_speed,
            fallback.2 * min_speed,
        );
    }

    if speed_sq < min_speed * min_speed {
        return M::normalize_to_magnitude(vx, vy, vz, min_speed);
    }
    if speed_sq > max_speed * max_speed {
        return M::normalize_to_magnitude(vx, vy, vz, max_speed);
    }
    velocity
}

/// Velocity change that turns `current` toward `desired` at `max_speed`.
pub(crate) fn steer_towards<M: MathStrategy>(
    desired: (f32, f32, f32),
    current: (f32, f32, f32),
    max_speed: f32,
) -> (f32, f32, f32) {
    let (tx, ty, tz) = M::normalize_to_magnitude(desired.0, desired.1, desired.2, max_speed);
    (tx - current.0, ty - current.1, tz - current.2)
}
