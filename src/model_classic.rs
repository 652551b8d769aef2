use crate::agents::hash_unit;
use crate::integrator::{clamp_speed, integrate_axis, project_axis_position, steer_towards};
use crate::math::MathStrategy;
use crate::neighbor_grid::{axis_delta, Visit};
use crate::Sim;

const EPSILON: f32 = 1.0e-6;
const COINCIDENT_DIST_SQ: f32 = 1.0e-12;
const HARD_CONSTRAINT_PASSES: usize = 4;
const HARD_CONSTRAINT_MAX_PAIRS: usize = 32;
const HARD_CONSTRAINT_RELAXATION: f32 = 0.05;
const HARD_CONSTRAINT_MAX_PUSH: f32 = 0.0025;

impl Sim {
    pub(super) fn step_classic<M: MathStrategy>(&mut self, dt: f32) {
        let config = self.classic;
        let active = self.agents.active();

        // If steering cannot produce non-zero acceleration, skip neighbor/force work.
        let steering_disabled = config.max_force <= EPSILON
            || (config.sep_weight <= EPSILON
                && config.align_weight <= EPSILON
                && config.coh_weight <= EPSILON
                && config.jitter_strength <= EPSILON
                && config.shape_attractor_weight <= EPSILON);
        let drag_damping = if config.drag <= EPSILON {
            1.0
        } else {
            (-config.drag * dt).exp()
        };

        if steering_disabled {
            self.agents.accel_x[..active].fill(0.0);
            self.agents.accel_y[..active].fill(0.0);
            self.agents.accel_z[..active].fill(0.0);
        } else {
            self.rebuild_grid();
            for i in 0..active {
                let (ax, ay, az, neighbors_used) = self.classic_acceleration::<M>(i);
                self.agents.accel_x[i] = ax;
                self.agents.accel_y[i] = ay;
                self.agents.accel_z[i] = az;
                self.neighbors_visited_last_step += neighbors_used;
            }
        }

        let bounds = self.bounds;
        let z_mode = self.z_mode;
        let mid_layer = bounds.mid_layer();
        let agents = &mut self.agents;

        for i in 0..active {
            let vx = (agents.vel_x[i] + agents.accel_x[i] * dt) * drag_damping;
            let vy = (agents.vel_y[i] + agents.accel_y[i] * dt) * drag_damping;
            let vz = if z_mode {
                (agents.vel_z[i] + agents.accel_z[i] * dt) * drag_damping
            } else {
                0.0
            };

            let heading_z = if z_mode { agents.heading_z[i] } else { 0.0 };
            let fallback = M::normalize_or(
                agents.heading_x[i],
                agents.heading_y[i],
                heading_z,
                (1.0, 0.0, 0.0),
            );
            let (vx, vy, vz) =
                clamp_speed::<M>((vx, vy, vz), config.min_speed, config.max_speed, fallback);

            let (x, vx) = integrate_axis(agents.pos_x[i], vx, dt, bounds.extent_x, bounds.bounce_x);
            let (y, vy) = integrate_axis(agents.pos_y[i], vy, dt, bounds.extent_y, bounds.bounce_y);
            let (z, vz) = if z_mode {
                integrate_axis(agents.pos_z[i], vz, dt, bounds.extent_z, bounds.bounce_z)
            } else {
                (mid_layer, 0.0)
            };

            let (hx, hy, hz) = M::normalize_or(vx, vy, vz, fallback);
            agents.heading_x[i] = hx;
            agents.heading_y[i] = hy;
            agents.heading_z[i] = hz;
            agents.vel_x[i] = vx;
            agents.vel_y[i] = vy;
            agents.vel_z[i] = vz;
            agents.pos_x[i] = x;
            agents.pos_y[i] = y;
            agents.pos_z[i] = z;
        }

        self.resolve_hard_min_distance::<M>();
    }

    fn classic_acceleration<M: MathStrategy>(&self, i: usize) -> (f32, f32, f32, usize) {
        let config = &self.classic;
        let agents = &self.agents;
        let z_mode = self.z_mode;
        let velocity = (
            agents.vel_x[i],
            agents.vel_y[i],
            if z_mode { agents.vel_z[i] } else { 0.0 },
        );

        let separation_radius_sq = config.separation_radius * config.separation_radius;
        let soft_min_distance = config.soft_min_distance;
        let soft_min_distance_sq = soft_min_distance * soft_min_distance;

        let mut sep = (0.0, 0.0, 0.0);
        let mut sep_count = 0usize;
        let mut align = (0.0, 0.0, 0.0);
        let mut coh = (0.0, 0.0, 0.0);

        let neighbor_count = self.grid.for_each_neighbor(
            i,
            config.neighbor_radius,
            config.max_neighbors_sampled,
            self.bounds.wrap(),
            |n| {
                if n.dist_sq <= COINCIDENT_DIST_SQ {
                    return Visit::Skip;
                }

                let j = n.index;
                align.0 += agents.vel_x[j];
                align.1 += agents.vel_y[j];
                align.2 += if z_mode { agents.vel_z[j] } else { 0.0 };

                coh.0 += n.dx;
                coh.1 += n.dy;
                coh.2 += n.dz;

                if n.dist_sq <= separation_radius_sq {
                    let inv_dist_sq = 1.0 / n.dist_sq;
                    sep.0 -= n.dx * inv_dist_sq;
                    sep.1 -= n.dy * inv_dist_sq;
                    sep.2 -= n.dz * inv_dist_sq;

                    if soft_min_distance_sq > EPSILON * EPSILON && n.dist_sq < soft_min_distance_sq
                    {
                        let push = soft_min_distance * (1.0 - n.dist_sq / soft_min_distance_sq);
                        let (px, py, pz) = M::normalize_to_magnitude(-n.dx, -n.dy, -n.dz, push);
                        sep.0 += px;
                        sep.1 += py;
                        sep.2 += pz;
                    }

                    sep_count += 1;
                }

                Visit::Accept
            },
        );

        let z_scale = self.z_force_scale;
        let mut force = (0.0, 0.0, 0.0);

        if sep_count > 0 {
            let n = sep_count as f32;
            let desired = (sep.0 / n, sep.1 / n, sep.2 / n);
            let steer = steer_towards::<M>(desired, velocity, config.max_speed);
            force.0 += steer.0 * config.sep_weight;
            force.1 += steer.1 * config.sep_weight;
            force.2 += steer.2 * config.sep_weight * z_scale;
        }

        if neighbor_count > 0 {
            let n = neighbor_count as f32;

            let desired = (align.0 / n, align.1 / n, align.2 / n);
            let steer = steer_towards::<M>(desired, velocity, config.max_speed);
            force.0 += steer.0 * config.align_weight;
            force.1 += steer.1 * config.align_weight;
            force.2 += steer.2 * config.align_weight * z_scale;

            let desired = (coh.0 / n, coh.1 / n, coh.2 / n);
            let steer = steer_towards::<M>(desired, velocity, config.max_speed);
            force.0 += steer.0 * config.coh_weight;
            force.1 += steer.1 * config.coh_weight;
            force.2 += steer.2 * config.coh_weight * z_scale;
        }

        if config.jitter_strength > 0.0 {
            let seed = agents.seed[i];
            force.0 += hash_unit(self.step_index, seed, 0) * config.jitter_strength;
            force.1 += hash_unit(self.step_index, seed, 1) * config.jitter_strength;
            force.2 += hash_unit(self.step_index, seed, 2) * config.jitter_strength * z_scale;
        }

        let shape = self.shape_attractor_force::<M>(i);
        force.0 += shape.0;
        force.1 += shape.1;
        force.2 += shape.2;

        if !z_mode {
            force.2 = 0.0;
        }

        let (fx, fy, fz) = M::limit_magnitude(force.0, force.1, force.2, config.max_force);
        (fx, fy, fz, neighbor_count)
    }

    /// Pushes apart pairs closer than `hard_min_distance` with relaxed
    /// positional corrections.
    ///
    /// Runs at most four passes and stops after a pass that moved nothing.
    /// Each agent corrects against at most 32 higher-indexed partners per
    /// pass, held on the stack.
    fn resolve_hard_min_distance<M: MathStrategy>(&mut self) {
        let min_distance = self.classic.hard_min_distance;
        let active = self.agents.active();
        if min_distance <= EPSILON || active < 2 {
            return;
        }

        let bounds = self.bounds;
        let wrap = bounds.wrap();
        let z_mode = self.z_mode;
        let min_distance_sq = min_distance * min_distance;

        for _ in 0..HARD_CONSTRAINT_PASSES {
            self.rebuild_grid();
            let mut corrected = 0usize;

            for i in 0..active {
                let mut partners = [0usize; HARD_CONSTRAINT_MAX_PAIRS];
                let mut partner_count = 0usize;
                self.grid.for_each_neighbor(
                    i,
                    min_distance,
                    HARD_CONSTRAINT_MAX_PAIRS,
                    wrap,
                    |n| {
                        if n.index <= i {
                            return Visit::Skip;
                        }
                        partners[partner_count] = n.index;
                        partner_count += 1;
                        Visit::Accept
                    },
                );

                let agents = &mut self.agents;
                for &j in &partners[..partner_count] {
                    let dx = axis_delta(agents.pos_x[j] - agents.pos_x[i], bounds.extent_x, wrap.x);
                    let dy = axis_delta(agents.pos_y[j] - agents.pos_y[i], bounds.extent_y, wrap.y);
                    let dz = if z_mode {
                        axis_delta(agents.pos_z[j] - agents.pos_z[i], bounds.extent_z, wrap.z)
                    } else {
                        0.0
                    };
                    let dist_sq = dx * dx + dy * dy + dz * dz;
                    if dist_sq >= min_distance_sq {
                        continue;
                    }

                    let (nx, ny, nz, dist) = if dist_sq > COINCIDENT_DIST_SQ {
                        let dist = M::length(dx, dy, dz);
                        let (nx, ny, nz) = M::normalize_or(dx, dy, dz, (1.0, 0.0, 0.0));
                        (nx, ny, nz, dist)
                    } else {
                        let pair_seed = agents.seed[i] ^ agents.seed[j].rotate_left(16);
                        let hz = if z_mode {
                            hash_unit(self.step_index, pair_seed, 2)
                        } else {
                            0.0
                        };
                        let (nx, ny, nz) = M::normalize_or(
                            hash_unit(self.step_index, pair_seed, 0),
                            hash_unit(self.step_index, pair_seed, 1),
                            hz,
                            (1.0, 0.0, 0.0),
                        );
                        (nx, ny, nz, 0.0)
                    };

                    let push = ((min_distance - dist) * 0.5 * HARD_CONSTRAINT_RELAXATION)
                        .min(HARD_CONSTRAINT_MAX_PUSH);
                    if push <= 0.0 {
                        continue;
                    }

                    agents.pos_x[i] = project_axis_position(
                        agents.pos_x[i] - nx * push,
                        bounds.extent_x,
                        bounds.bounce_x,
                    );
                    agents.pos_y[i] = project_axis_position(
                        agents.pos_y[i] - ny * push,
                        bounds.extent_y,
                        bounds.bounce_y,
                    );
                    agents.pos_x[j] = project_axis_position(
                        agents.pos_x[j] + nx * push,
                        bounds.extent_x,
                        bounds.bounce_x,
                    );
                    agents.pos_y[j] = project_axis_position(
                        agents.pos_y[j] + ny * push,
                        bounds.extent_y,
                        bounds.bounce_y,
                    );
                    if z_mode {
                        agents.pos_z[i] = project_axis_position(
                            agents.pos_z[i] - nz * push,
                            bounds.extent_z,
                            bounds.bounce_z,
                        );
                        agents.pos_z[j] = project_axis_position(
                            agents.pos_z[j] + nz * push,
                            bounds.extent_z,
                            bounds.bounce_z,
                        );
                    }
                    corrected += 1;
                }
            }

            if corrected == 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ClassicConfig;
    use crate::neighbor_grid::axis_delta;
    use crate::Sim;

    fn pair_distance(sim: &Sim) -> f32 {
        let agents = &sim.agents;
        let dx = axis_delta(agents.pos_x[1] - agents.pos_x[0], 1.0, true);
        let dy = axis_delta(agents.pos_y[1] - agents.pos_y[0], 1.0, true);
        (dx * dx + dy * dy).sqrt()
    }

    #[test]
    fn close_pair_separates() {
        let mut sim = Sim::create(2, 1, 1.0, 1.0).expect("valid capacity");
        sim.set_classic_config(&ClassicConfig {
            sep_weight: 1.0,
            align_weight: 0.0,
            coh_weight: 0.0,
            jitter_strength: 0.0,
            ..ClassicConfig::default()
        });
        sim.set_agent(0, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0);
        sim.set_agent(1, 0.5 + 0.0175, 0.5, 0.5, 0.0, 0.0, 0.0);

        let before = pair_distance(&sim);
        sim.step(1.0 / 120.0);

        assert!(pair_distance(&sim) > before);
        assert_eq!(sim.neighbors_visited_last_step(), 2);
    }

    #[test]
    fn disabled_steering_skips_neighbor_work() {
        let mut sim = Sim::create(32, 9, 1.0, 1.0).expect("valid capacity");
        sim.set_classic_config(&ClassicConfig {
            max_force: 0.0,
            ..ClassicConfig::default()
        });
        sim.step(1.0 / 60.0);

        assert_eq!(sim.neighbors_visited_last_step(), 0);
        assert!(sim.agents.accel_x.iter().all(|a| *a == 0.0));
    }

    #[test]
    fn speeds_stay_within_configured_bounds() {
        let mut sim = Sim::create(200, 21, 1.0, 1.0).expect("valid capacity");
        for _ in 0..30 {
            sim.step(1.0 / 60.0);
        }

        let config = ClassicConfig::default();
        for i in 0..sim.active_count() {
            let vx = sim.agents.vel_x[i];
            let vy = sim.agents.vel_y[i];
            let speed = (vx * vx + vy * vy).sqrt();
            assert!(speed >= config.min_speed - 1.0e-4, "speed={speed}");
            assert!(speed <= config.max_speed + 1.0e-4, "speed={speed}");
        }
    }

    #[test]
    fn drag_slows_unsteered_agents() {
        let mut sim = Sim::create(1, 2, 1.0, 1.0).expect("valid capacity");
        sim.set_classic_config(&ClassicConfig {
            max_force: 0.0,
            min_speed: 0.0,
            drag: 2.0,
            ..ClassicConfig::default()
        });
        sim.set_agent(0, 0.5, 0.5, 0.5, 0.1, 0.0, 0.0);
        sim.step(0.05);

        let expected = 0.1 * (-2.0_f32 * 0.05).exp();
        assert!((sim.agents.vel_x[0] - expected).abs() < 1.0e-6);
    }

    #[test]
    fn hard_constraint_leaves_distant_pairs_alone() {
        let mut sim = Sim::create(2, 6, 1.0, 1.0).expect("valid capacity");
        sim.set_classic_config(&ClassicConfig {
            max_force: 0.0,
            min_speed: 0.0,
            hard_min_distance: 0.05,
            ..ClassicConfig::default()
        });
        sim.set_agent(0, 0.2, 0.2, 0.5, 0.0, 0.0, 0.0);
        sim.set_agent(1, 0.6, 0.6, 0.5, 0.0, 0.0, 0.0);
        sim.step(0.01);

        assert_eq!(sim.agents.pos_x[0], 0.2);
        assert_eq!(sim.agents.pos_x[1], 0.6);
    }
}
