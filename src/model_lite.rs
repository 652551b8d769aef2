use crate::math::{Accurate, MathStrategy};
use crate::neighbor_grid::Visit;
use crate::orientation::dot3;
use crate::Sim;

/// Upper bound on neighbors read per agent by the lite models.
pub(crate) const LITE_NEIGHBOR_CAP: usize = 12;

const COINCIDENT_DIST_SQ: f32 = 1.0e-12;
const MIN_SEPARATION_DIST_SQ: f32 = 1.0e-4;
const DRAG_SCALE: f32 = 0.01;
const CLIMB_SCALE: f32 = 0.02;

impl Sim {
    /// Social steering without k-nearest selection or the aerodynamic force
    /// model: the first in-view neighbors found by the grid are used, and
    /// flight reduces to a scalar speed.
    pub(super) fn step_lite<M: MathStrategy>(&mut self, dt: f32, with_flight: bool) {
        self.rebuild_grid();
        let centroid = self.active_centroid();
        let active = self.agents.active();

        for i in 0..active {
            let (hx, hy, hz, neighbors_used) = self.lite_heading::<M>(i, dt, centroid);
            self.agents.accel_x[i] = hx;
            self.agents.accel_y[i] = hy;
            self.agents.accel_z[i] = hz;
            self.neighbors_visited_last_step += neighbors_used;
        }

        let flight = self.flight;
        let z_mode = self.z_mode;
        for i in 0..active {
            let agents = &mut self.agents;
            let heading = (
                agents.accel_x[i],
                agents.accel_y[i],
                if z_mode { agents.accel_z[i] } else { 0.0 },
            );
            agents.accel_x[i] = 0.0;
            agents.accel_y[i] = 0.0;
            agents.accel_z[i] = 0.0;

            let vz = if z_mode { agents.vel_z[i] } else { 0.0 };
            let mut speed =
                Accurate::length(agents.vel_x[i], agents.vel_y[i], vz).max(flight.min_speed);
            if with_flight {
                let drag_loss = flight.drag_factor * speed * speed * DRAG_SCALE;
                let climb_loss = flight.gravity * heading.1.max(0.0) * CLIMB_SCALE;
                speed += (flight.thrust - drag_loss - climb_loss) * dt;
            }
            let speed = speed.clamp(flight.min_speed, flight.max_speed);

            let heading = Accurate::normalize_or(heading.0, heading.1, heading.2, heading);
            let velocity = (heading.0 * speed, heading.1 * speed, heading.2 * speed);
            let velocity = self.finish_social_velocity::<M>(i, dt, velocity);
            self.integrate_social_agent(i, dt, velocity, heading);
        }
    }

    fn lite_heading<M: MathStrategy>(
        &self,
        i: usize,
        dt: f32,
        centroid: (f32, f32, f32),
    ) -> (f32, f32, f32, usize) {
        let config = &self.social;
        let agents = &self.agents;
        let z_mode = self.z_mode;

        let heading_z = if z_mode { agents.heading_z[i] } else { 0.0 };
        let forward = M::normalize_or(
            agents.heading_x[i],
            agents.heading_y[i],
            heading_z,
            (1.0, 0.0, 0.0),
        );
        let fov_cos = config.fov_cos();
        let cap = config.topological_neighbors.clamp(1, LITE_NEIGHBOR_CAP);

        let mut sep = (0.0, 0.0, 0.0);
        let mut align = (0.0, 0.0, 0.0);
        let mut coh = (0.0, 0.0, 0.0);
        let visible = self.grid.for_each_neighbor(
            i,
            config.neighbor_radius,
            cap,
            self.bounds.wrap(),
            |n| {
                if n.dist_sq <= COINCIDENT_DIST_SQ {
                    return Visit::Skip;
                }
                let direction = M::normalize_or(n.dx, n.dy, n.dz, (0.0, 0.0, 0.0));
                if dot3(direction, forward) < fov_cos {
                    return Visit::Skip;
                }

                let inv_dist_sq = 1.0 / n.dist_sq.max(MIN_SEPARATION_DIST_SQ);
                sep.0 -= direction.0 * inv_dist_sq;
                sep.1 -= direction.1 * inv_dist_sq;
                sep.2 -= direction.2 * inv_dist_sq;

                let j = n.index;
                let vz = if z_mode { agents.vel_z[j] } else { 0.0 };
                let moving =
                    M::normalize_or(agents.vel_x[j], agents.vel_y[j], vz, (0.0, 0.0, 0.0));
                align.0 += moving.0;
                align.1 += moving.1;
                align.2 += moving.2;

                coh.0 += direction.0;
                coh.1 += direction.1;
                coh.2 += direction.2;
                Visit::Accept
            },
        );

        if visible > 0 {
            let inv = 1.0 / visible as f32;
            align = (align.0 * inv, align.1 * inv, align.2 * inv);
            coh = (coh.0 * inv, coh.1 * inv, coh.2 * inv);
        }

        let blend = |s: f32, a: f32, c: f32| {
            s * config.avoid_weight + a * config.align_weight + c * config.cohesion_weight
        };
        let mut target = (
            blend(sep.0, align.0, coh.0),
            blend(sep.1, align.1, coh.1),
            blend(sep.2, align.2, coh.2),
        );

        let ratio = self.boundary_ratio(visible);
        if ratio > 0.0 {
            let to_flock = self.direction_to::<M>(i, centroid);
            let pull = config.boundary_weight * ratio;
            target.0 += to_flock.0 * pull;
            target.1 += to_flock.1 * pull;
            target.2 += to_flock.2 * pull;
        }
        target.2 = if z_mode { target.2 * self.z_force_scale } else { 0.0 };

        let target = M::normalize_or(target.0, target.1, target.2, forward);
        let gain = self.flight.reaction_gain(dt);
        let blended = (
            forward.0 * (1.0 - gain) + target.0 * gain,
            forward.1 * (1.0 - gain) + target.1 * gain,
            forward.2 * (1.0 - gain) + target.2 * gain,
        );
        let (hx, hy, hz) = M::normalize_or(blended.0, blended.1, blended.2, forward);
        (hx, hy, hz, visible)
    }
}

#[cfg(test)]
mod tests {
    use super::LITE_NEIGHBOR_CAP;
    use crate::config::{FlightConfig, SocialConfig};
    use crate::math::MathMode;
    use crate::{ModelKind, Sim};
    use approx::assert_relative_eq;

    #[test]
    fn neighbor_reads_are_capped() {
        let mut sim = Sim::create(400, 21, 1.0, 1.0).expect("valid capacity");
        sim.set_model_kind(ModelKind::LiteSocial);
        sim.set_social_config(&SocialConfig {
            neighbor_radius: 0.5,
            topological_neighbors: 64,
            ..SocialConfig::default()
        });
        sim.step(1.0 / 60.0);

        assert!(sim.neighbors_visited_last_step() <= sim.active_count() * LITE_NEIGHBOR_CAP);
        assert!(sim.neighbors_visited_last_step() > 0);
    }

    #[test]
    fn lone_agent_keeps_its_heading_and_cruises() {
        let mut sim = Sim::create(1, 2, 1.0, 1.0).expect("valid capacity");
        sim.set_model_kind(ModelKind::LiteSocial);
        sim.set_agent(0, 0.5, 0.5, 0.5, 0.2, 0.0, 0.0);
        sim.step(1.0 / 60.0);

        // Alone, the boundary term points at the agent itself and vanishes.
        assert_relative_eq!(sim.agents.heading_x[0], 1.0, epsilon = 1.0e-5);
        assert_relative_eq!(sim.agents.vel_x[0], 10.0, epsilon = 1.0e-3);
        assert!(sim.agents.pos_x[0] > 0.5);
    }

    #[test]
    fn flight_speed_stays_in_bounds() {
        let mut sim = Sim::create(200, 77, 1.0, 1.0).expect("valid capacity");
        sim.set_z_mode(true);
        sim.set_model_kind(ModelKind::LiteSocialFlight);
        for _ in 0..120 {
            sim.step(1.0 / 60.0);
        }

        let flight = FlightConfig::default();
        for i in 0..sim.active_count() {
            let speed = (sim.agents.vel_x[i].powi(2)
                + sim.agents.vel_y[i].powi(2)
                + sim.agents.vel_z[i].powi(2))
            .sqrt();
            assert!(speed >= flight.min_speed - 1.0e-2, "speed={speed}");
            assert!(speed <= flight.max_speed + 1.0e-2, "speed={speed}");
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
        for model in [ModelKind::LiteSocial, ModelKind::LiteSocialFlight] {
            let accurate = mean_speed_after(model, MathMode::Accurate, 600);
            let fast = mean_speed_after(model, MathMode::Fast, 600);
            assert_relative_eq!(fast, accurate, max_relative = 0.02);
        }
    }
}
