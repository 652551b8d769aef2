mod agents;
pub mod config;
pub mod error;
mod integrator;
pub mod math;
mod model_classic;
mod model_lite;
mod model_social;
pub mod neighbor_grid;
mod orientation;
pub mod pacing;
pub mod render;

use agents::{AgentState, SpawnRange};
use config::{
    clamp_finite, sanitize_z_force_scale, ClassicConfig, FlightConfig, SimSettings, SocialConfig,
};
use error::{check_capacity, SimError, MAX_CAPACITY};
use integrator::Bounds;
use log::{debug, info, warn};
use math::{Accurate, Fast, MathMode, MathStrategy};
use neighbor_grid::{axis_delta, NeighborGrid};
use pacing::FixedStepClock;
use render::{RenderExportBuffer, RenderView};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

pub use model_social::SOCIAL_WORLD_SCALE;

const MAX_DT: f32 = 0.1;
const MAX_SHAPE_POINTS: usize = 128;

/// Force model driving the step. Discriminants are part of the host ABI.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Classic = 0,
    Social = 1,
    SocialFlight = 2,
    LiteSocial = 3,
    LiteSocialFlight = 4,
}

impl ModelKind {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Social,
            2 => Self::SocialFlight,
            3 => Self::LiteSocial,
            4 => Self::LiteSocialFlight,
            _ => Self::Classic,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Classic => 0,
            Self::Social => 1,
            Self::SocialFlight => 2,
            Self::LiteSocial => 3,
            Self::LiteSocialFlight => 4,
        }
    }

    /// Social models keep velocities in m/s instead of world units.
    pub fn is_social(self) -> bool {
        !matches!(self, Self::Classic)
    }
}

/// One flock: agent storage, the neighbor grid, every model's configuration
/// and the export buffers handed to the renderer.
#[wasm_bindgen]
pub struct Sim {
    agents: AgentState,
    grid: NeighborGrid,
    bounds: Bounds,
    model_kind: ModelKind,
    math_mode: MathMode,
    classic: ClassicConfig,
    social: SocialConfig,
    flight: FlightConfig,
    z_mode: bool,
    z_force_scale: f32,
    shape_points: Vec<f32>,
    render: RenderExportBuffer,
    clock: FixedStepClock,
    neighbors_visited_last_step: usize,
    step_index: u32,
}

impl Sim {
    /// Builds a flock of `capacity` agents scattered over a `width` x
    /// `height` canvas. Every agent starts active.
    pub fn create(capacity: usize, seed: u32, width: f32, height: f32) -> Result<Sim, SimError> {
        let capacity = check_capacity(capacity)?;
        let bounds = Bounds::new(width, height);
        let classic = ClassicConfig::default();

        let mut agents = AgentState::new(
            capacity,
            seed,
            SpawnRange {
                extent_x: bounds.extent_x,
                extent_y: bounds.extent_y,
                extent_z: bounds.extent_z,
                min_speed: classic.min_speed,
                max_speed: classic.max_speed,
            },
        );
        agents.flatten_z(bounds.mid_layer());

        let grid = NeighborGrid::new(
            capacity,
            bounds.extent_x,
            bounds.extent_y,
            bounds.extent_z,
            classic.neighbor_radius,
        );

        let mut shape_points = Vec::with_capacity(MAX_SHAPE_POINTS * 3);
        shape_points.extend_from_slice(&[0.5, 0.5, 0.5]);

        let mut sim = Sim {
            agents,
            grid,
            bounds,
            model_kind: ModelKind::Classic,
            math_mode: MathMode::Accurate,
            classic,
            social: SocialConfig::default(),
            flight: FlightConfig::default(),
            z_mode: false,
            z_force_scale: config::DEFAULT_Z_FORCE_SCALE,
            shape_points,
            render: RenderExportBuffer::new(capacity),
            clock: FixedStepClock::default(),
            neighbors_visited_last_step: 0,
            step_index: 0,
        };
        sim.render.sync(&sim.agents, &sim.bounds);

        info!(
            "created flock: capacity={capacity} seed={seed} extents={:.3}x{:.3}",
            sim.bounds.extent_x, sim.bounds.extent_y
        );
        Ok(sim)
    }

    /// Like [`Sim::create`], with the seed drawn from the platform entropy
    /// source.
    pub fn create_with_entropy(capacity: usize, width: f32, height: f32) -> Result<Sim, SimError> {
        let seed = getrandom::u32().map_err(|err| SimError::Entropy(err.to_string()))?;
        Self::create(capacity, seed, width, height)
    }

    /// Replaces every host-tunable setting at once.
    pub fn apply_settings(&mut self, settings: SimSettings) {
        let mut settings = settings;
        settings.sanitize();

        self.classic = settings.classic;
        self.social = settings.social;
        self.flight = settings.flight;
        self.set_model_kind(settings.model_kind);
        self.set_math_mode(settings.math_mode);
        self.set_axis_bounce(settings.bounce_x, settings.bounce_y, settings.bounce_z);
        self.set_z_mode(settings.z_mode);
        self.z_force_scale = settings.z_force_scale;
        self.configure_grid();
    }

    /// Parses a JSON [`SimSettings`] document and applies it. On error the
    /// current settings are left untouched.
    pub fn configure_json(&mut self, text: &str) -> Result<(), SimError> {
        let settings = SimSettings::from_json(text)
            .inspect_err(|err| warn!("ignoring settings document: {err}"))?;
        self.apply_settings(settings);
        Ok(())
    }

    pub fn settings(&self) -> SimSettings {
        SimSettings {
            model_kind: self.model_kind,
            math_mode: self.math_mode,
            classic: self.classic,
            social: self.social,
            flight: self.flight,
            bounce_x: self.bounds.bounce_x,
            bounce_y: self.bounds.bounce_y,
            bounce_z: self.bounds.bounce_z,
            z_mode: self.z_mode,
            z_force_scale: self.z_force_scale,
        }
    }

    /// Borrows the export arrays for the active agents.
    pub fn render_view(&self) -> RenderView<'_> {
        self.render.view()
    }

    fn step_with<M: MathStrategy>(&mut self, dt: f32) {
        self.step_index = self.step_index.wrapping_add(1);
        self.neighbors_visited_last_step = 0;

        match self.model_kind {
            ModelKind::Classic => self.step_classic::<M>(dt),
            ModelKind::Social => self.step_social::<M>(dt, false),
            ModelKind::SocialFlight => self.step_social::<M>(dt, true),
            ModelKind::LiteSocial => self.step_lite::<M>(dt, false),
            ModelKind::LiteSocialFlight => self.step_lite::<M>(dt, true),
        }

        self.render.sync(&self.agents, &self.bounds);
        self.debug_validate_state();
    }

    fn neighbor_radius(&self) -> f32 {
        if self.model_kind.is_social() {
            self.social.neighbor_radius
        } else {
            self.classic.neighbor_radius
        }
    }

    /// Re-derives the cell layout. Only setters call this, so steps never
    /// resize the grid.
    fn configure_grid(&mut self) {
        self.grid.configure(
            self.neighbor_radius(),
            self.bounds.extent_x,
            self.bounds.extent_y,
            self.bounds.extent_z,
            self.z_mode,
        );
    }

    fn rebuild_grid(&mut self) {
        let agents = &self.agents;
        self.grid.rebuild(
            &agents.pos_x,
            &agents.pos_y,
            &agents.pos_z,
            agents.active(),
        );
    }

    fn spawn_range(&self) -> SpawnRange {
        let (min_speed, max_speed) = if self.model_kind.is_social() {
            (self.flight.min_speed, self.flight.max_speed)
        } else {
            (self.classic.min_speed, self.classic.max_speed)
        };

        SpawnRange {
            extent_x: self.bounds.extent_x,
            extent_y: self.bounds.extent_y,
            extent_z: self.bounds.extent_z,
            min_speed,
            max_speed,
        }
    }

    /// Unit direction from agent `i` toward the nearest shape point, or
    /// `None` when the attractor is off or the agent sits on a point.
    fn shape_attractor_direction<M: MathStrategy>(&self, i: usize) -> Option<(f32, f32, f32)> {
        if self.classic.shape_attractor_weight <= 0.0 {
            return None;
        }

        let wrap = self.bounds.wrap();
        let bounds = &self.bounds;
        let px = self.agents.pos_x[i];
        let py = self.agents.pos_y[i];
        let pz = self.agents.pos_z[i];

        let mut best = (0.0, 0.0, 0.0);
        let mut best_dist_sq = f32::MAX;
        for point in self.shape_points.chunks_exact(3) {
            let dx = axis_delta(point[0] * bounds.extent_x - px, bounds.extent_x, wrap.x);
            let dy = axis_delta(point[1] * bounds.extent_y - py, bounds.extent_y, wrap.y);
            let dz = if self.z_mode {
                axis_delta(point[2] * bounds.extent_z - pz, bounds.extent_z, wrap.z)
            } else {
                0.0
            };
            let dist_sq = math::distance_sq_3d(dx, dy, dz);
            if dist_sq < best_dist_sq {
                best_dist_sq = dist_sq;
                best = (dx, dy, dz);
            }
        }

        if !best_dist_sq.is_finite() || best_dist_sq <= 1.0e-12 {
            return None;
        }
        Some(M::normalize_or(best.0, best.1, best.2, (0.0, 0.0, 0.0)))
    }

    /// Attractor pull in world units per second squared.
    fn shape_attractor_force<M: MathStrategy>(&self, i: usize) -> (f32, f32, f32) {
        let Some((nx, ny, nz)) = self.shape_attractor_direction::<M>(i) else {
            return (0.0, 0.0, 0.0);
        };
        let weight = self.classic.shape_attractor_weight;
        (nx * weight, ny * weight, nz * weight * self.z_force_scale)
    }

    fn debug_validate_state(&self) {
        #[cfg(debug_assertions)]
        {
            let agents = &self.agents;
            for i in 0..agents.capacity() {
                debug_assert!(agents.vel_x[i].is_finite());
                debug_assert!(agents.vel_y[i].is_finite());
                debug_assert!(agents.vel_z[i].is_finite());
                debug_assert!(agents.accel_x[i].is_finite());
                debug_assert!(agents.accel_y[i].is_finite());
                debug_assert!(agents.accel_z[i].is_finite());
                debug_assert!(agents.heading_x[i].is_finite());
                debug_assert!(agents.heading_y[i].is_finite());
                debug_assert!(agents.heading_z[i].is_finite());
                debug_assert!(
                    self.bounds
                        .contains(agents.pos_x[i], agents.pos_y[i], agents.pos_z[i]),
                    "agent {i} left the world"
                );
            }
        }
    }
}

#[wasm_bindgen]
impl Sim {
    #[wasm_bindgen(constructor)]
    pub fn new(capacity: usize, seed: u32, width: f32, height: f32) -> Result<Sim, JsError> {
        Ok(Self::create(capacity, seed, width, height)?)
    }

    #[wasm_bindgen(js_name = createWithEntropy)]
    pub fn new_with_entropy(capacity: usize, width: f32, height: f32) -> Result<Sim, JsError> {
        Ok(Self::create_with_entropy(capacity, width, height)?)
    }

    #[wasm_bindgen(js_name = configureJson)]
    pub fn configure_json_for_host(&mut self, text: &str) -> Result<(), JsError> {
        Ok(self.configure_json(text)?)
    }

    /// Advances one fixed step. `dt` is clamped to `[0, 0.1]` seconds and a
    /// non-finite `dt` leaves the flock untouched.
    pub fn step(&mut self, dt: f32) {
        if !dt.is_finite() {
            self.neighbors_visited_last_step = 0;
            return;
        }
        let dt = dt.clamp(0.0, MAX_DT);
        if dt <= 0.0 || self.agents.active() == 0 {
            self.neighbors_visited_last_step = 0;
            return;
        }

        match self.math_mode {
            MathMode::Accurate => self.step_with::<Accurate>(dt),
            MathMode::Fast => self.step_with::<Fast>(dt),
        }
    }

    /// Feeds wall-clock time to the pacing clock and runs the fixed steps it
    /// releases. Returns the number of steps taken.
    pub fn advance(&mut self, elapsed_seconds: f32) -> u32 {
        let steps = self.clock.advance(elapsed_seconds);
        let dt = self.clock.step();
        for _ in 0..steps {
            self.step(dt);
        }
        steps
    }

    pub fn set_pacing(&mut self, step_seconds: f32, max_steps_per_frame: u32) {
        self.clock = FixedStepClock::new(step_seconds, max_steps_per_frame);
    }

    pub fn set_model_kind(&mut self, kind: ModelKind) {
        if kind == self.model_kind {
            return;
        }

        let previous = self.model_kind;
        self.model_kind = kind;
        self.reseed_velocity_for_model(previous);
        self.configure_grid();
        self.render.sync(&self.agents, &self.bounds);
        debug!("model switched from {previous:?} to {kind:?}");
    }

    pub fn set_model_kind_index(&mut self, kind: u32) {
        self.set_model_kind(ModelKind::from_u32(kind));
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model_kind
    }

    pub fn set_math_mode(&mut self, mode: MathMode) {
        if mode != self.math_mode {
            debug!("math mode switched to {mode:?}");
        }
        self.math_mode = mode;
    }

    pub fn set_math_mode_index(&mut self, mode: u32) {
        self.set_math_mode(MathMode::from_u32(mode));
    }

    pub fn math_mode(&self) -> MathMode {
        self.math_mode
    }

    pub fn set_classic_config(&mut self, config: &ClassicConfig) {
        let mut config = *config;
        config.sanitize();
        self.classic = config;
        self.configure_grid();
        debug!("classic config replaced: {config:?}");
    }

    pub fn set_social_config(&mut self, config: &SocialConfig) {
        let mut config = *config;
        config.sanitize();
        self.social = config;
        self.configure_grid();
        debug!("social config replaced: {config:?}");
    }

    pub fn set_flight_config(&mut self, config: &FlightConfig) {
        let mut config = *config;
        config.sanitize();
        self.flight = config;
        debug!("flight config replaced: {config:?}");
    }

    /// Resizes the canvas. Positions keep their relative place in the world.
    pub fn set_bounds(&mut self, width: f32, height: f32) {
        let scale = self.bounds.resize(width, height);
        self.agents.scale_positions(scale, (self.bounds.extent_x, self.bounds.extent_y));
        self.configure_grid();
        self.render.sync(&self.agents, &self.bounds);
    }

    pub fn set_axis_bounce(&mut self, bounce_x: bool, bounce_y: bool, bounce_z: bool) {
        self.bounds.set_bounce(bounce_x, bounce_y, bounce_z);
    }

    /// Turns the depth axis on or off. Turning it off pins every agent to
    /// the mid layer; turning it on spreads them over the depth again.
    pub fn set_z_mode(&mut self, enabled: bool) {
        if enabled == self.z_mode {
            return;
        }

        self.z_mode = enabled;
        if enabled {
            self.agents.spread_z(self.bounds.extent_z);
        } else {
            self.agents.flatten_z(self.bounds.mid_layer());
        }
        self.configure_grid();
        self.render.sync(&self.agents, &self.bounds);
        debug!("z mode {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn z_mode(&self) -> bool {
        self.z_mode
    }

    pub fn set_z_force_scale(&mut self, scale: f32) {
        self.z_force_scale = sanitize_z_force_scale(scale);
    }

    pub fn set_active_count(&mut self, active: usize) {
        let stored = self.agents.set_active(active);
        if stored != active {
            warn!("active count {active} clamped to capacity {stored}");
        }
        self.render.sync(&self.agents, &self.bounds);
    }

    /// Replaces the attractor shape with up to 128 normalized `x, y, z`
    /// triples. An empty list restores the single centre point.
    pub fn set_shape_points(&mut self, points_xyz: &[f32]) {
        self.shape_points.clear();

        let usable = points_xyz.len().min(MAX_SHAPE_POINTS * 3) / 3 * 3;
        for point in points_xyz[..usable].chunks_exact(3) {
            self.shape_points.push(clamp_finite(point[0], 0.0, 1.0, 0.5));
            self.shape_points.push(clamp_finite(point[1], 0.0, 1.0, 0.5));
            self.shape_points.push(clamp_finite(point[2], 0.0, 1.0, 0.5));
        }

        if self.shape_points.is_empty() {
            self.shape_points.extend_from_slice(&[0.5, 0.5, 0.5]);
        }
    }

    pub fn shape_point_count(&self) -> usize {
        self.shape_points.len() / 3
    }

    /// Enlarges every buffer to hold `capacity` agents. New agents spawn
    /// inactive. Invalidates previously obtained render pointers.
    pub fn grow_capacity(&mut self, capacity: usize) -> usize {
        let capacity = if capacity > MAX_CAPACITY {
            warn!("capacity {capacity} clamped to {MAX_CAPACITY}");
            MAX_CAPACITY
        } else {
            capacity
        };
        if capacity <= self.agents.capacity() {
            return self.agents.capacity();
        }

        let previous = self.agents.capacity();
        let spawn = self.spawn_range();
        self.agents.grow(capacity, spawn);
        if !self.z_mode {
            self.agents.flatten_z(self.bounds.mid_layer());
        }
        self.grid.reserve(capacity);
        self.render.grow(capacity);
        self.render.sync(&self.agents, &self.bounds);

        info!(
            "capacity grown from {previous} to {capacity} (buffer generation {})",
            self.render.generation()
        );
        capacity
    }

    /// Overwrites one agent. Positions are normalized to `[0, 1]` per axis,
    /// velocities are in world units per second. Out-of-range indices are
    /// ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn set_agent(&mut self, i: usize, x: f32, y: f32, z: f32, vx: f32, vy: f32, vz: f32) {
        if i >= self.agents.capacity() {
            return;
        }

        let bounds = self.bounds;
        let px = clamp_finite(x, 0.0, 1.0, 0.5) * bounds.extent_x;
        let py = clamp_finite(y, 0.0, 1.0, 0.5) * bounds.extent_y;
        let pz = if self.z_mode {
            clamp_finite(z, 0.0, 1.0, 0.5) * bounds.extent_z
        } else {
            bounds.mid_layer()
        };

        let unit = if self.model_kind.is_social() {
            1.0 / SOCIAL_WORLD_SCALE
        } else {
            1.0
        };
        let vx = clamp_finite(vx, -1.0e3, 1.0e3, 0.0) * unit;
        let vy = clamp_finite(vy, -1.0e3, 1.0e3, 0.0) * unit;
        let vz = if self.z_mode {
            clamp_finite(vz, -1.0e3, 1.0e3, 0.0) * unit
        } else {
            0.0
        };

        self.agents.place(i, px, py, pz, vx, vy, vz);
        self.render.sync(&self.agents, &self.bounds);
    }

    pub fn count(&self) -> usize {
        self.agents.capacity()
    }

    pub fn active_count(&self) -> usize {
        self.agents.active()
    }

    pub fn neighbors_visited_last_step(&self) -> usize {
        self.neighbors_visited_last_step
    }

    /// Bumped whenever the render arrays are reallocated.
    pub fn buffer_generation(&self) -> u32 {
        self.render.generation()
    }

    pub fn render_xy_ptr(&self) -> *const f32 {
        self.render.xy_ptr()
    }

    pub fn render_xy_len(&self) -> usize {
        self.render.exported() * 2
    }

    pub fn render_z_ptr(&self) -> *const f32 {
        self.render.z_ptr()
    }

    pub fn render_z_len(&self) -> usize {
        self.render.exported()
    }

    pub fn render_heading_xy_ptr(&self) -> *const f32 {
        self.render.heading_xy_ptr()
    }

    pub fn render_heading_xy_len(&self) -> usize {
        self.render.exported() * 2
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelKind, Sim};
    use crate::config::ClassicConfig;
    use crate::math::MathMode;
    use crate::neighbor_grid::axis_delta;
    use approx::assert_relative_eq;

    fn sim(capacity: usize, seed: u32) -> Sim {
        Sim::create(capacity, seed, 1.0, 1.0).expect("valid capacity")
    }

    #[test]
    fn disabled_z_mode_keeps_agents_in_mid_layer() {
        let mut sim = sim(64, 1337);
        sim.step(0.016);

        assert!(sim.agents.pos_z.iter().all(|z| *z == 0.5));
        assert!(sim.agents.vel_z.iter().all(|vz| *vz == 0.0));
    }

    #[test]
    fn enabled_z_mode_updates_depth_and_stays_inside() {
        let mut sim = sim(64, 42);
        sim.set_z_mode(true);
        sim.step(0.016);

        let view = sim.render_view();
        assert!(view.z.iter().all(|z| (0.0..=1.0).contains(z)));
        assert!(view.z.iter().any(|z| (*z - 0.5).abs() > 1.0e-4));
    }

    #[test]
    fn bounce_mode_reflects_velocity() {
        let mut sim = sim(1, 7);
        sim.set_axis_bounce(true, false, false);
        sim.set_agent(0, 0.01, 0.5, 0.5, -0.2, 0.0, 0.0);

        sim.step(0.1);

        assert!((0.0..=1.0).contains(&sim.agents.pos_x[0]));
        assert!(sim.agents.vel_x[0] > 0.0);
    }

    #[test]
    fn wrapping_axis_keeps_velocity_sign() {
        let mut sim = sim(1, 11);
        sim.set_axis_bounce(true, false, false);
        sim.set_agent(0, 0.5, 0.01, 0.5, 0.0, -0.2, 0.0);

        sim.step(0.1);

        assert!((0.0..=1.0).contains(&sim.agents.pos_y[0]));
        assert!(sim.agents.pos_y[0] > 0.9);
        assert!(sim.agents.vel_y[0] < 0.0);
    }

    #[test]
    fn z_axis_can_bounce_independently() {
        let mut sim = sim(1, 17);
        sim.set_z_mode(true);
        sim.set_axis_bounce(false, false, true);
        sim.set_agent(0, 0.5, 0.5, 0.01, 0.0, 0.0, -0.2);

        sim.step(0.1);

        assert!((0.0..=1.0).contains(&sim.agents.pos_z[0]));
        assert!(sim.agents.vel_z[0] > 0.0);
    }

    #[test]
    fn fast_math_mode_stays_stable() {
        let mut sim = sim(128, 99);
        sim.set_z_mode(true);
        sim.set_math_mode_index(1);
        assert_eq!(sim.math_mode(), MathMode::Fast);

        sim.step(0.016);

        for i in 0..sim.count() {
            assert!(sim.agents.pos_x[i].is_finite());
            assert!(sim.agents.pos_y[i].is_finite());
            assert!(sim.agents.pos_z[i].is_finite());
        }
    }

    #[test]
    fn neighbor_sampling_cap_limits_work() {
        let mut sim = sim(256, 2026);
        sim.set_classic_config(&ClassicConfig {
            max_neighbors_sampled: 2,
            ..ClassicConfig::default()
        });
        sim.step(0.016);

        assert!(sim.neighbors_visited_last_step() <= sim.count() * 2);
    }

    #[test]
    fn hard_min_distance_separates_coincident_agents() {
        let mut sim = sim(2, 123);
        sim.set_classic_config(&ClassicConfig {
            min_speed: 0.0,
            max_force: 0.0,
            hard_min_distance: 0.2,
            soft_min_distance: 0.0,
            ..ClassicConfig::default()
        });
        sim.set_agent(0, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0);
        sim.set_agent(1, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0);

        for _ in 0..2_000 {
            sim.step(0.016);
        }

        let dx = axis_delta(sim.agents.pos_x[1] - sim.agents.pos_x[0], 1.0, true);
        let dy = axis_delta(sim.agents.pos_y[1] - sim.agents.pos_y[0], 1.0, true);
        let dist = (dx * dx + dy * dy).sqrt();
        assert!(dist + 2.0e-3 >= 0.2, "dist={dist}");
    }

    #[test]
    fn soft_and_hard_min_distance_are_independent() {
        let mut sim = sim(2, 5);
        sim.set_classic_config(&ClassicConfig {
            soft_min_distance: 0.12,
            hard_min_distance: 0.34,
            ..ClassicConfig::default()
        });

        let settings = sim.settings();
        assert_relative_eq!(settings.classic.soft_min_distance, 0.12);
        assert_relative_eq!(settings.classic.hard_min_distance, 0.34);
    }

    #[test]
    fn non_finite_dt_is_a_no_op() {
        let mut sim = sim(16, 3);
        let before = sim.agents.pos_x.clone();
        sim.step(f32::NAN);
        sim.step(-1.0);
        assert_eq!(sim.agents.pos_x, before);
        assert_eq!(sim.neighbors_visited_last_step(), 0);
    }

    #[test]
    fn unknown_model_index_falls_back_to_classic() {
        let mut sim = sim(4, 1);
        sim.set_model_kind_index(3);
        assert_eq!(sim.model_kind(), ModelKind::LiteSocial);
        sim.set_model_kind_index(99);
        assert_eq!(sim.model_kind(), ModelKind::Classic);
        assert_eq!(ModelKind::default(), ModelKind::Classic);
    }

    #[test]
    fn shape_attractor_pulls_toward_nearest_point() {
        let mut sim = sim(1, 8);
        sim.set_classic_config(&ClassicConfig {
            shape_attractor_weight: 1.0,
            ..ClassicConfig::default()
        });
        sim.set_shape_points(&[0.9, 0.5, 0.5, 0.1, 0.1]);
        assert_eq!(sim.shape_point_count(), 1);
        sim.set_agent(0, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0);

        let (fx, fy, _) = sim.shape_attractor_force::<crate::math::Accurate>(0);
        assert_relative_eq!(fx, 1.0, epsilon = 1.0e-6);
        assert_relative_eq!(fy, 0.0, epsilon = 1.0e-6);

        sim.set_shape_points(&[]);
        assert_eq!(sim.shape_point_count(), 1);
        assert!(sim.shape_attractor_direction::<crate::math::Accurate>(0).is_none());
    }

    #[test]
    fn resizing_keeps_relative_positions() {
        let mut sim = sim(1, 4);
        sim.set_agent(0, 0.5, 0.5, 0.5, 0.0, 0.0, 0.0);
        sim.set_bounds(2.0, 1.0);

        let view = sim.render_view();
        assert_relative_eq!(view.xy[0], 0.5, epsilon = 1.0e-6);
        assert_relative_eq!(view.xy[1], 0.5, epsilon = 1.0e-6);
        assert_relative_eq!(sim.bounds.extent_y, 0.5);
    }
}
