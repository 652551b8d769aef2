//! Heading frames and rotations for the orientation-steered models.

use crate::math::MathStrategy;

/// Forward, up and right unit vectors of a body frame.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Basis {
    pub(crate) forward: (f32, f32, f32),
    pub(crate) up: (f32, f32, f32),
    pub(crate) right: (f32, f32, f32),
}

impl Basis {
    /// Builds a frame around `heading`, using world +Y as the up reference
    /// unless the heading is nearly vertical.
    pub(crate) fn from_heading<M: MathStrategy>(heading: (f32, f32, f32)) -> Self {
        let forward = M::normalize_or(heading.0, heading.1, heading.2, (1.0, 0.0, 0.0));

        let mut up_ref = (0.0, 1.0, 0.0);
        if dot3(forward, up_ref).abs() > 0.97 {
            up_ref = (0.0, 0.0, 1.0);
        }

        let cross_right = cross3(up_ref, forward);
        let right = M::normalize_or(
            cross_right.0,
            cross_right.1,
            cross_right.2,
            (0.0, 0.0, 1.0),
        );
        let cross_up = cross3(forward, right);
        let up = M::normalize_or(cross_up.0, cross_up.1, cross_up.2, (0.0, 1.0, 0.0));

        Self { forward, up, right }
    }

    /// Yaw and pitch (radians) that would turn `forward` onto `direction`.
    /// A zero direction yields no turn.
    ///
    /// In the plane `up` lies in XY and `right` along Z, so a planar turn is
    /// all pitch and spans the full circle.
    pub(crate) fn turn_towards(&self, direction: (f32, f32, f32), planar: bool) -> (f32, f32) {
        if direction == (0.0, 0.0, 0.0) {
            return (0.0, 0.0);
        }
        let local_x = dot3(direction, self.forward);
        let local_y = dot3(direction, self.up);
        if planar {
            return (0.0, local_y.atan2(local_x));
        }
        let local_z = dot3(direction, self.right);
        (local_z.atan2(local_x), local_y.clamp(-1.0, 1.0).asin())
    }
}

pub(crate) fn dot3(a: (f32, f32, f32), b: (f32, f32, f32)) -> f32 {
    a.0 * b.0 + a.1 * b.1 + a.2 * b.2
}

pub(crate) fn cross3(a: (f32, f32, f32), b: (f32, f32, f32)) -> (f32, f32, f32) {
    (
        a.1 * b.2 - a.2 * b.1,
        a.2 * b.0 - a.0 * b.2,
        a.0 * b.1 - a.1 * b.0,
    )
}

/// Rodrigues rotation of `vector` around `axis`.
pub(crate) fn rotate_around_axis<M: MathStrategy>(
    vector: (f32, f32, f32),
    axis: (f32, f32, f32),
    angle_radians: f32,
) -> (f32, f32, f32) {
    let unit = M::normalize_or(axis.0, axis.1, axis.2, (0.0, 1.0, 0.0));
    let cos_theta = angle_radians.cos();
    let sin_theta = angle_radians.sin();
    let dot = dot3(unit, vector);
    let cross = cross3(unit, vector);

    (
        vector.0 * cos_theta + cross.0 * sin_theta + unit.0 * dot * (1.0 - cos_theta),
        vector.1 * cos_theta + cross.1 * sin_theta + unit.1 * dot * (1.0 - cos_theta),
        vector.2 * cos_theta + cross.2 * sin_theta + unit.2 * dot * (1.0 - cos_theta),
    )
}

/// Applies a yaw/pitch turn to a heading and returns the new unit heading.
/// With `planar` the result is flattened onto the XY plane.
pub(crate) fn apply_turn<M: MathStrategy>(
    basis: &Basis,
    yaw: f32,
    pitch: f32,
    planar: bool,
) -> (f32, f32, f32) {
    // `right` is up x forward, so pitching towards `up` is a negative
    // rotation about it.
    let yawed = rotate_around_axis::<M>(basis.forward, basis.up, yaw);
    let yawed_basis = Basis::from_heading::<M>(yawed);
    let turned = rotate_around_axis::<M>(yawed, yawed_basis.right, -pitch);

    let fallback = if planar {
        (basis.forward.0, basis.forward.1, 0.0)
    } else {
        basis.forward
    };
    let turned_z = if planar { 0.0 } else { turned.2 };
    let (hx, hy, hz) = M::normalize_or(turned.0, turned.1, turned_z, fallback);
    if hx == 0.0 && hy == 0.0 && hz == 0.0 {
        return (1.0, 0.0, 0.0);
    }
    (hx, hy, hz)
}
