use crate::config::SOCIAL_MAX_TOPOLOGICAL_NEIGHBORS;
use crate::integrator::{clamp_speed, integrate_axis};
use crate::math::{Accurate, MathStrategy};
use crate::neighbor_grid::{axis_delta, Visit};
use crate::orientation::{apply_turn, dot3, Basis};
use crate::{ModelKind, Sim};

/// World units per metre: the social models fly at metres per second,
/// positions live in the normalized world.
pub const SOCIAL_WORLD_SCALE: f32 = 0.02;

const EPSILON: f32 = 1.0e-6;
const COINCIDENT_DIST_SQ: f32 = 1.0e-12;
const STABILITY_RATE_HZ: f32 = 60.0;

/// The `cap` nearest candidates offered so far, ordered by distance then
/// index.
pub(crate) struct NearestSet {
    indices: [usize; SOCIAL_MAX_TOPOLOGICAL_NEIGHBORS],
    dist_sq: [f32; SOCIAL_MAX_TOPOLOGICAL_NEIGHBORS],
    len: usize,
    cap: usize,
}

impl NearestSet {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            indices: [usize::MAX; SOCIAL_MAX_TOPOLOGICAL_NEIGHBORS],
            dist_sq: [f32::MAX; SOCIAL_MAX_TOPOLOGICAL_NEIGHBORS],
            len: 0,
            cap: cap.min(SOCIAL_MAX_TOPOLOGICAL_NEIGHBORS),
        }
    }

    pub(crate) fn offer(&mut self, index: usize, dist_sq: f32) {
        let mut slot = self.len;
        while slot > 0 && (dist_sq, index) < (self.dist_sq[slot - 1], self.indices[slot - 1]) {
            slot -= 1;
        }
        if slot >= self.cap {
            return;
        }

        let last = self.len.min(self.cap - 1);
        let mut k = last;
        while k > slot {
            self.dist_sq[k] = self.dist_sq[k - 1];
            self.indices[k] = self.indices[k - 1];
            k -= 1;
        }
        self.dist_sq[slot] = dist_sq;
        self.indices[slot] = index;
        if self.len < self.cap {
            self.len += 1;
        }
    }

    pub(crate) fn indices(&self) -> &[usize] {
        &self.indices[..self.len]
    }

    pub(crate) fn nearest(&self) -> Option<usize> {
        self.indices().first().copied()
    }
}

impl Sim {
    /// Rescales every velocity when the host switches between the classic
    /// model (world units) and a social model (m/s), then clamps speeds to
    /// the new model's bounds.
    pub(super) fn reseed_velocity_for_model(&mut self, previous: ModelKind) {
        let scale = match (previous.is_social(), self.model_kind.is_social()) {
            (false, true) => 1.0 / SOCIAL_WORLD_SCALE,
            (true, false) => SOCIAL_WORLD_SCALE,
            _ => 1.0,
        };
        let (min_speed, max_speed) = if self.model_kind.is_social() {
            (self.flight.min_speed, self.flight.max_speed)
        } else {
            (self.classic.min_speed, self.classic.max_speed)
        };

        let z_mode = self.z_mode;
        let agents = &mut self.agents;
        for i in 0..agents.capacity() {
            let heading_z = if z_mode { agents.heading_z[i] } else { 0.0 };
            let fallback = Accurate::normalize_or(
                agents.heading_x[i],
                agents.heading_y[i],
                heading_z,
                (1.0, 0.0, 0.0),
            );
            let vz = if z_mode { agents.vel_z[i] * scale } else { 0.0 };
            let velocity = (agents.vel_x[i] * scale, agents.vel_y[i] * scale, vz);
            let (vx, vy, vz) = clamp_speed::<Accurate>(velocity, min_speed, max_speed, fallback);
            let (hx, hy, hz) = Accurate::normalize_or(vx, vy, vz, fallback);

            agents.vel_x[i] = vx;
            agents.vel_y[i] = vy;
            agents.vel_z[i] = vz;
            agents.heading_x[i] = hx;
            agents.heading_y[i] = hy;
            agents.heading_z[i] = hz;
        }
    }

    pub(super) fn step_social<M: MathStrategy>(&mut self, dt: f32, with_flight: bool) {
        self.rebuild_grid();
        let centroid = self.active_centroid();
        let active = self.agents.active();

        for i in 0..active {
            let (hx, hy, hz, neighbors_used) = self.social_heading::<M>(i, dt, centroid);
            self.agents.accel_x[i] = hx;
            self.agents.accel_y[i] = hy;
            self.agents.accel_z[i] = hz;
            self.neighbors_visited_last_step += neighbors_used;
        }

        let flight = self.flight;
        let z_mode = self.z_mode;
        let z_force_scale = self.z_force_scale;
        for i in 0..active {
            let heading = (
                self.agents.accel_x[i],
                self.agents.accel_y[i],
                if z_mode { self.agents.accel_z[i] } else { 0.0 },
            );
            let agents = &mut self.agents;
            let vz = if z_mode { agents.vel_z[i] } else { 0.0 };
            let velocity = (agents.vel_x[i], agents.vel_y[i], vz);
            // Speed is carried step to step, so it never goes through the
            // approximate inverse square root.
            let speed = Accurate::length(velocity.0, velocity.1, velocity.2)
                .clamp(flight.min_speed, flight.max_speed);

            let mut velocity = if with_flight {
                let basis = Basis::from_heading::<M>(heading);
                let v_axis = M::normalize_or(velocity.0, velocity.1, velocity.2, heading);

                let dynamic_pressure = 0.5 * flight.air_density * speed * speed;
                let lift = dynamic_pressure * flight.lift_factor * flight.wing_area;
                let drag = dynamic_pressure * flight.drag_factor * flight.wing_area;
                let weight = flight.gravity * flight.mass;

                let force_x = basis.up.0 * lift - v_axis.0 * drag + heading.0 * flight.thrust;
                let force_y =
                    basis.up.1 * lift - v_axis.1 * drag + heading.1 * flight.thrust - weight;
                let force_z = (basis.up.2 * lift - v_axis.2 * drag + heading.2 * flight.thrust)
                    * z_force_scale;

                let inv_mass = 1.0 / flight.mass;
                agents.accel_x[i] = force_x * inv_mass;
                agents.accel_y[i] = force_y * inv_mass;
                agents.accel_z[i] = if z_mode { force_z * inv_mass } else { 0.0 };

                (
                    velocity.0 + agents.accel_x[i] * dt,
                    velocity.1 + agents.accel_y[i] * dt,
                    velocity.2 + agents.accel_z[i] * dt,
                )
            } else {
                agents.accel_x[i] = 0.0;
                agents.accel_y[i] = 0.0;
                agents.accel_z[i] = 0.0;
                let (hx, hy, hz) = Accurate::normalize_or(heading.0, heading.1, heading.2, heading);
                (hx * speed, hy * speed, hz * speed)
            };

            let stability_gain = if with_flight {
                (flight.dynamic_stability * dt * STABILITY_RATE_HZ).clamp(0.0, 1.0)
            } else {
                0.0
            };
            velocity = self.finish_social_velocity::<M>(i, dt, velocity);
            let moving = M::normalize_or(velocity.0, velocity.1, velocity.2, heading);
            let blended = (
                heading.0 * (1.0 - stability_gain) + moving.0 * stability_gain,
                heading.1 * (1.0 - stability_gain) + moving.1 * stability_gain,
                heading.2 * (1.0 - stability_gain) + moving.2 * stability_gain,
            );
            let heading = M::normalize_or(blended.0, blended.1, blended.2, heading);

            self.integrate_social_agent(i, dt, velocity, heading);
        }
    }

    /// Adds the shape pull and clamps speed to the flight bounds. The clamp is
    /// always exact so the approximate math cannot bleed speed.
    pub(super) fn finish_social_velocity<M: MathStrategy>(
        &self,
        i: usize,
        dt: f32,
        velocity: (f32, f32, f32),
    ) -> (f32, f32, f32) {
        let (sx, sy, sz) = self.shape_attractor_force::<M>(i);
        let pull = dt / SOCIAL_WORLD_SCALE;
        let vz = if self.z_mode { velocity.2 + sz * pull } else { 0.0 };
        let velocity = (velocity.0 + sx * pull, velocity.1 + sy * pull, vz);

        let agents = &self.agents;
        let heading_z = if self.z_mode { agents.heading_z[i] } else { 0.0 };
        let fallback = Accurate::normalize_or(
            agents.heading_x[i],
            agents.heading_y[i],
            heading_z,
            (1.0, 0.0, 0.0),
        );
        clamp_speed::<Accurate>(velocity, self.flight.min_speed, self.flight.max_speed, fallback)
    }

    /// Moves agent `i` by a velocity in m/s and stores the new heading. An
    /// axis that bounced flips its heading component with the velocity.
    pub(super) fn integrate_social_agent(
        &mut self,
        i: usize,
        dt: f32,
        velocity: (f32, f32, f32),
        heading: (f32, f32, f32),
    ) {
        let bounds = self.bounds;
        let z_mode = self.z_mode;
        let agents = &mut self.agents;

        let (x, vx) = integrate_axis(
            agents.pos_x[i],
            velocity.0 * SOCIAL_WORLD_SCALE,
            dt,
            bounds.extent_x,
            bounds.bounce_x,
        );
        let (y, vy) = integrate_axis(
            agents.pos_y[i],
            velocity.1 * SOCIAL_WORLD_SCALE,
            dt,
            bounds.extent_y,
            bounds.bounce_y,
        );
        let (z, vz) = if z_mode {
            integrate_axis(
                agents.pos_z[i],
                velocity.2 * SOCIAL_WORLD_SCALE,
                dt,
                bounds.extent_z,
                bounds.bounce_z,
            )
        } else {
            (bounds.mid_layer(), 0.0)
        };

        let flip = |reflected: f32, original: f32| {
            if reflected * original < 0.0 {
                -1.0
            } else {
                1.0
            }
        };
        agents.heading_x[i] = heading.0 * flip(vx, velocity.0);
        agents.heading_y[i] = heading.1 * flip(vy, velocity.1);
        agents.heading_z[i] = if z_mode { heading.2 * flip(vz, velocity.2) } else { 0.0 };

        agents.pos_x[i] = x;
        agents.pos_y[i] = y;
        agents.pos_z[i] = z;
        agents.vel_x[i] = vx / SOCIAL_WORLD_SCALE;
        agents.vel_y[i] = vy / SOCIAL_WORLD_SCALE;
        agents.vel_z[i] = vz / SOCIAL_WORLD_SCALE;
    }

    /// Mean position of the active agents, used by the boundary term.
    pub(super) fn active_centroid(&self) -> (f32, f32, f32) {
        let agents = &self.agents;
        let active = agents.active();
        if active == 0 {
            return (0.0, 0.0, 0.0);
        }

        let inv = 1.0 / active as f32;
        let sum = |column: &[f32]| column[..active].iter().sum::<f32>() * inv;
        (sum(&agents.pos_x[..]), sum(&agents.pos_y[..]), sum(&agents.pos_z[..]))
    }

    /// Unit vector from agent `i` toward `target`, across wrapped axes.
    pub(super) fn direction_to<M: MathStrategy>(
        &self,
        i: usize,
        target: (f32, f32, f32),
    ) -> (f32, f32, f32) {
        let bounds = &self.bounds;
        let wrap = bounds.wrap();
        let agents = &self.agents;
        let dx = axis_delta(target.0 - agents.pos_x[i], bounds.extent_x, wrap.x);
        let dy = axis_delta(target.1 - agents.pos_y[i], bounds.extent_y, wrap.y);
        let dz = if self.z_mode {
            axis_delta(target.2 - agents.pos_z[i], bounds.extent_z, wrap.z)
        } else {
            0.0
        };
        M::normalize_or(dx, dy, dz, (0.0, 0.0, 0.0))
    }

    /// Share of the boundary pull: zero at `boundary_count` visible
    /// neighbors, one when alone.
    pub(super) fn boundary_ratio(&self, visible: usize) -> f32 {
        let count = self.social.boundary_count;
        if count <= EPSILON || visible as f32 >= count {
            return 0.0;
        }
        ((count - visible as f32) / count).clamp(0.0, 1.0)
    }

    fn social_heading<M: MathStrategy>(
        &self,
        i: usize,
        dt: f32,
        centroid: (f32, f32, f32),
    ) -> (f32, f32, f32, usize) {
        let config = &self.social;
        let agents = &self.agents;
        let z_mode = self.z_mode;
        let planar = !z_mode;

        let heading_z = if z_mode { agents.heading_z[i] } else { 0.0 };
        let heading = (agents.heading_x[i], agents.heading_y[i], heading_z);
        let basis = Basis::from_heading::<M>(heading);
        let fov_cos = config.fov_cos();

        let mut nearest = NearestSet::new(config.topological_neighbors);
        let visible = self.grid.for_each_neighbor(
            i,
            config.neighbor_radius,
            0,
            self.bounds.wrap(),
            |n| {
                if n.dist_sq <= COINCIDENT_DIST_SQ {
                    return Visit::Skip;
                }
                let direction = M::normalize_or(n.dx, n.dy, n.dz, (0.0, 0.0, 0.0));
                if dot3(direction, basis.forward) < fov_cos {
                    return Visit::Skip;
                }
                nearest.offer(n.index, n.dist_sq);
                Visit::Accept
            },
        );

        let mut yaw = 0.0;
        let mut pitch = 0.0;
        let z_scale = self.z_force_scale;
        let mut add_turn = |direction: (f32, f32, f32), weight: f32| {
            let (dx, dy, dz) = direction;
            let direction = M::normalize_or(dx, dy, dz * z_scale, (0.0, 0.0, 0.0));
            let (dyaw, dpitch) = basis.turn_towards(direction, planar);
            yaw += dyaw * weight;
            pitch += dpitch * weight;
        };

        if let Some(j) = nearest.nearest() {
            let (ax, ay, az) = self.direction_to::<M>(
                i,
                (agents.pos_x[j], agents.pos_y[j], agents.pos_z[j]),
            );
            add_turn((-ax, -ay, -az), config.avoid_weight);
        }

        let selected = nearest.indices();
        if !selected.is_empty() {
            let mut heading_sum = (0.0, 0.0, 0.0);
            let mut offset_sum = (0.0, 0.0, 0.0);
            let bounds = &self.bounds;
            let wrap = bounds.wrap();

            for &j in selected {
                heading_sum.0 += agents.heading_x[j];
                heading_sum.1 += agents.heading_y[j];
                heading_sum.2 += if z_mode { agents.heading_z[j] } else { 0.0 };

                offset_sum.0 +=
                    axis_delta(agents.pos_x[j] - agents.pos_x[i], bounds.extent_x, wrap.x);
                offset_sum.1 +=
                    axis_delta(agents.pos_y[j] - agents.pos_y[i], bounds.extent_y, wrap.y);
                if z_mode {
                    offset_sum.2 +=
                        axis_delta(agents.pos_z[j] - agents.pos_z[i], bounds.extent_z, wrap.z);
                }
            }

            let zero = (0.0, 0.0, 0.0);
            let alignment = M::normalize_or(heading_sum.0, heading_sum.1, heading_sum.2, zero);
            add_turn(alignment, config.align_weight);

            let cohesion = M::normalize_or(offset_sum.0, offset_sum.1, offset_sum.2, zero);
            add_turn(cohesion, config.cohesion_weight);
        }

        let ratio = self.boundary_ratio(visible);
        if ratio > 0.0 {
            let to_flock = self.direction_to::<M>(i, centroid);
            add_turn(to_flock, config.boundary_weight * ratio);
        }

        let gain = self.flight.reaction_gain(dt);
        let (hx, hy, hz) = apply_turn::<M>(&basis, yaw * gain, pitch * gain, planar);
        (hx, hy, hz, visible)
    }
}

#[cfg(test)]
mod tests {
    use super::{NearestSet, SOCIAL_WORLD_SCALE};
    use crate::config::{FlightConfig, SocialConfig};
    use crate::math::MathMode;
    use crate::{ModelKind, Sim};
    use approx::assert_relative_eq;

    #[test]
    fn nearest_set_keeps_the_closest_in_order() {
        let mut set = NearestSet::new(3);
        for (index, dist_sq) in [(4, 0.5), (1, 0.1), (7, 0.9), (2, 0.3), (9, 0.05)] {
            set.offer(index, dist_sq);
        }
        assert_eq!(set.indices(), &[9, 1, 2]);
        assert_eq!(set.nearest(), Some(9));
    }

    #[test]
    fn nearest_set_breaks_ties_by_index() {
        let mut set = NearestSet::new(2);
        set.offer(8, 0.2);
        set.offer(3, 0.2);
        set.offer(5, 0.2);
        assert_eq!(set.indices(), &[3, 5]);
    }

    #[test]
    fn empty_set_has_no_nearest() {
        assert_eq!(NearestSet::new(4).nearest(), None);
    }

    #[test]
    fn switching_models_converts_velocity_units() {
        let mut sim = Sim::create(4, 10, 1.0, 1.0).expect("valid capacity");
        sim.set_agent(0, 0.5, 0.5, 0.5, 0.2, 0.0, 0.0);

        sim.set_model_kind(ModelKind::Social);
        assert_relative_eq!(sim.agents.vel_x[0], 0.2 / SOCIAL_WORLD_SCALE, epsilon = 1.0e-3);

        sim.set_model_kind(ModelKind::LiteSocial);
        assert_relative_eq!(sim.agents.vel_x[0], 10.0, epsilon = 1.0e-3);

        sim.set_model_kind(ModelKind::Classic);
        assert_relative_eq!(sim.agents.vel_x[0], 0.19, epsilon = 1.0e-4);
    }

    #[test]
    fn social_speeds_respect_flight_bounds() {
        let mut sim = Sim::create(150, 31, 1.0, 1.0).expect("valid capacity");
        sim.set_model_kind(ModelKind::SocialFlight);
        for _ in 0..60 {
            sim.step(1.0 / 60.0);
        }

        let flight = FlightConfig::default();
        for i in 0..sim.active_count() {
            let speed = (sim.agents.vel_x[i].powi(2) + sim.agents.vel_y[i].powi(2)).sqrt();
            assert!(speed >= flight.min_speed - 1.0e-2, "speed={speed}");
            assert!(speed <= flight.max_speed + 1.0e-2, "speed={speed}");
        }
    }

    #[test]
    fn every_visible_neighbor_is_counted() {
        let mut sim = Sim::create(300, 12, 1.0, 1.0).expect("valid capacity");
        sim.set_model_kind(ModelKind::Social);
        sim.set_social_config(&SocialConfig {
            neighbor_radius: 0.5,
            topological_neighbors: 3,
            ..SocialConfig::default()
        });
        sim.step(1.0 / 60.0);

        // The selection stops at three but the tally covers the whole field of view.
        assert!(sim.neighbors_visited_last_step() > sim.active_count() * 3);
    }

    #[test]
    fn headings_stay_unit_length() {
        let mut sim = Sim::create(120, 40, 1.0, 1.0).expect("valid capacity");
        sim.set_z_mode(true);
        sim.set_model_kind(ModelKind::SocialFlight);
        for _ in 0..50 {
            sim.step(1.0 / 60.0);
        }

        for i in 0..sim.active_count() {
            let length = (sim.agents.heading_x[i].powi(2)
                + sim.agents.heading_y[i].powi(2)
                + sim.agents.heading_z[i].powi(2))
            .sqrt();
            assert_relative_eq!(length, 1.0, epsilon = 1.0e-3);
        }
    }

    fn mean_speed_after(model: ModelKind, mode: MathMode, steps: usize) -> f32 {
        let mut sim = Sim::create(300, 2024, 1.0, 1.0).expect("valid capacity");
        sim.set_model_kind(model);
        sim.set_math_mode(mode);
        for _ in 0..steps {
            sim.step(1.0 / 120.0);
        }

        let agents = &sim.agents;
        let total: f32 = (0..sim.active_count())
            .map(|i| {
                (agents.vel_x[i].powi(2) + agents.vel_y[i].powi(2) + agents.vel_z[i].powi(2))
                    .sqrt()
            })
            .sum();
        total / sim.active_count() as f32
    }

    #[test]
    fn fast_math_keeps_cruising_speed() {
        for model in [ModelKind::Social, ModelKind::SocialFlight] {
            let accurate = mean_speed_after(model, MathMode::Accurate, 600);
            let fast = mean_speed_after(model, MathMode::Fast, 600);
            assert_relative_eq!(fast, accurate, max_relative = 0.02);
        }
    }
}
