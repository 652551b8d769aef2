use crate::math::MathMode;
use crate::ModelKind;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

pub const MIN_NEIGHBOR_RADIUS: f32 = 0.001;
pub const MAX_NEIGHBOR_RADIUS: f32 = 0.5;
const MIN_SEPARATION_RADIUS: f32 = 0.0005;
const MIN_SPEED: f32 = 0.0;
const MAX_SPEED: f32 = 3.0;
const MAX_WEIGHT: f32 = 10.0;
const MIN_MAX_FORCE: f32 = 0.0;
const MAX_MAX_FORCE: f32 = 5.0;
const DEFAULT_MAX_FORCE: f32 = 0.42;
const MIN_MIN_DISTANCE: f32 = 0.0;
const MAX_MIN_DISTANCE: f32 = 1.0;
const DEFAULT_SOFT_MIN_DISTANCE: f32 = 0.008;
const DEFAULT_HARD_MIN_DISTANCE: f32 = 0.0;
const MIN_JITTER_STRENGTH: f32 = 0.0;
const MAX_JITTER_STRENGTH: f32 = 1.0;
const DEFAULT_JITTER_STRENGTH: f32 = 0.01;
const MIN_DRAG: f32 = 0.0;
const MAX_DRAG: f32 = 6.0;
const DEFAULT_DRAG: f32 = 0.0;
const MIN_SHAPE_ATTRACTOR_WEIGHT: f32 = 0.0;
const MAX_SHAPE_ATTRACTOR_WEIGHT: f32 = 5.0;
const DEFAULT_SHAPE_ATTRACTOR_WEIGHT: f32 = 0.0;

pub const SOCIAL_MAX_TOPOLOGICAL_NEIGHBORS: usize = 64;
const SOCIAL_MIN_TOPOLOGICAL_NEIGHBORS: usize = 1;
const SOCIAL_MAX_WEIGHT: f32 = 2.0;
const SOCIAL_MAX_BOUNDARY_COUNT: f32 = 256.0;
const SOCIAL_MIN_FOV_DEG: f32 = 30.0;
const SOCIAL_MAX_FOV_DEG: f32 = 360.0;

const FLIGHT_MIN_REACTION_MS: f32 = 25.0;
const FLIGHT_MAX_REACTION_MS: f32 = 2_000.0;
const FLIGHT_MIN_DYNAMIC_STABILITY: f32 = 0.0;
const FLIGHT_MAX_DYNAMIC_STABILITY: f32 = 1.0;
const FLIGHT_MIN_MASS: f32 = 0.01;
const FLIGHT_MAX_MASS: f32 = 5.0;
const FLIGHT_MIN_WING_AREA: f32 = 0.0005;
const FLIGHT_MAX_WING_AREA: f32 = 1.0;
const FLIGHT_MIN_LIFT_FACTOR: f32 = 0.0;
const FLIGHT_MAX_LIFT_FACTOR: f32 = 2.0;
const FLIGHT_MIN_DRAG_FACTOR: f32 = 0.0;
const FLIGHT_MAX_DRAG_FACTOR: f32 = 2.0;
const FLIGHT_MIN_THRUST: f32 = 0.0;
const FLIGHT_MAX_THRUST: f32 = 20.0;
const FLIGHT_MIN_SPEED: f32 = 0.0;
const FLIGHT_MAX_MIN_SPEED: f32 = 200.0;
const FLIGHT_MAX_SPEED: f32 = 250.0;
const FLIGHT_MIN_SPEED_SPAN: f32 = 0.1;
const FLIGHT_MIN_GRAVITY: f32 = 0.0;
const FLIGHT_MAX_GRAVITY: f32 = 30.0;
const FLIGHT_MIN_AIR_DENSITY: f32 = 0.1;
const FLIGHT_MAX_AIR_DENSITY: f32 = 3.0;

pub const MIN_Z_FORCE_SCALE: f32 = 0.0;
pub const MAX_Z_FORCE_SCALE: f32 = 2.0;
pub const DEFAULT_Z_FORCE_SCALE: f32 = 0.75;

/// Separation/alignment/cohesion parameters in normalized world units.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassicConfig {
    pub sep_weight: f32,
    pub align_weight: f32,
    pub coh_weight: f32,
    pub neighbor_radius: f32,
    pub separation_radius: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub max_force: f32,
    /// Neighbors sampled per agent; `0` samples all of them.
    pub max_neighbors_sampled: usize,
    pub soft_min_distance: f32,
    pub hard_min_distance: f32,
    pub jitter_strength: f32,
    pub drag: f32,
    pub shape_attractor_weight: f32,
}

impl Default for ClassicConfig {
    fn default() -> Self {
        Self {
            sep_weight: 1.45,
            align_weight: 1.0,
            coh_weight: 0.85,
            neighbor_radius: 0.08,
            separation_radius: 0.035,
            min_speed: 0.045,
            max_speed: 0.19,
            max_force: DEFAULT_MAX_FORCE,
            max_neighbors_sampled: 0,
            soft_min_distance: DEFAULT_SOFT_MIN_DISTANCE,
            hard_min_distance: DEFAULT_HARD_MIN_DISTANCE,
            jitter_strength: DEFAULT_JITTER_STRENGTH,
            drag: DEFAULT_DRAG,
            shape_attractor_weight: DEFAULT_SHAPE_ATTRACTOR_WEIGHT,
        }
    }
}

#[wasm_bindgen]
impl ClassicConfig {
    #[wasm_bindgen(constructor)]
    pub fn new() -> ClassicConfig {
        Self::default()
    }
}

impl ClassicConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        self.sep_weight = clamp_finite(self.sep_weight, 0.0, MAX_WEIGHT, defaults.sep_weight);
        self.align_weight = clamp_finite(self.align_weight, 0.0, MAX_WEIGHT, defaults.align_weight);
        self.coh_weight = clamp_finite(self.coh_weight, 0.0, MAX_WEIGHT, defaults.coh_weight);

        self.neighbor_radius = clamp_finite(
            self.neighbor_radius,
            MIN_NEIGHBOR_RADIUS,
            MAX_NEIGHBOR_RADIUS,
            defaults.neighbor_radius,
        );
        self.separation_radius = clamp_finite(
            self.separation_radius,
            MIN_SEPARATION_RADIUS,
            self.neighbor_radius,
            defaults.separation_radius.min(self.neighbor_radius),
        );

        self.min_speed = clamp_finite(self.min_speed, MIN_SPEED, MAX_SPEED, defaults.min_speed);
        self.max_speed = clamp_finite(
            self.max_speed,
            self.min_speed.max(MIN_NEIGHBOR_RADIUS),
            MAX_SPEED,
            defaults.max_speed.max(self.min_speed),
        );

        self.max_force = clamp_finite(
            self.max_force,
            MIN_MAX_FORCE,
            MAX_MAX_FORCE,
            DEFAULT_MAX_FORCE,
        );
        self.soft_min_distance = clamp_finite(
            self.soft_min_distance,
            MIN_MIN_DISTANCE,
            MAX_MIN_DISTANCE,
            DEFAULT_SOFT_MIN_DISTANCE,
        );
        self.hard_min_distance = clamp_finite(
            self.hard_min_distance,
            MIN_MIN_DISTANCE,
            MAX_MIN_DISTANCE,
            DEFAULT_HARD_MIN_DISTANCE,
        );
        self.jitter_strength = clamp_finite(
            self.jitter_strength,
            MIN_JITTER_STRENGTH,
            MAX_JITTER_STRENGTH,
            DEFAULT_JITTER_STRENGTH,
        );
        self.drag = clamp_finite(self.drag, MIN_DRAG, MAX_DRAG, DEFAULT_DRAG);
        self.shape_attractor_weight = clamp_finite(
            self.shape_attractor_weight,
            MIN_SHAPE_ATTRACTOR_WEIGHT,
            MAX_SHAPE_ATTRACTOR_WEIGHT,
            DEFAULT_SHAPE_ATTRACTOR_WEIGHT,
        );
    }
}

/// Neighbor selection and orientation weights for the social models.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub avoid_weight: f32,
    pub align_weight: f32,
    pub cohesion_weight: f32,
    pub boundary_weight: f32,
    pub boundary_count: f32,
    pub neighbor_radius: f32,
    pub topological_neighbors: usize,
    pub field_of_view_deg: f32,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            avoid_weight: 0.02,
            align_weight: 0.60,
            cohesion_weight: 0.004,
            boundary_weight: 0.10,
            boundary_count: 20.0,
            neighbor_radius: 0.10,
            topological_neighbors: 7,
            field_of_view_deg: 290.0,
        }
    }
}

#[wasm_bindgen]
impl SocialConfig {
    #[wasm_bindgen(constructor)]
    pub fn new() -> SocialConfig {
        Self::default()
    }
}

impl SocialConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        self.avoid_weight =
            clamp_finite(self.avoid_weight, 0.0, SOCIAL_MAX_WEIGHT, defaults.avoid_weight);
        self.align_weight =
            clamp_finite(self.align_weight, 0.0, SOCIAL_MAX_WEIGHT, defaults.align_weight);
        self.cohesion_weight = clamp_finite(
            self.cohesion_weight,
            0.0,
            SOCIAL_MAX_WEIGHT,
            defaults.cohesion_weight,
        );
        self.boundary_weight = clamp_finite(
            self.boundary_weight,
            0.0,
            SOCIAL_MAX_WEIGHT,
            defaults.boundary_weight,
        );
        self.boundary_count = clamp_finite(
            self.boundary_count,
            0.0,
            SOCIAL_MAX_BOUNDARY_COUNT,
            defaults.boundary_count,
        );
        self.neighbor_radius = clamp_finite(
            self.neighbor_radius,
            MIN_NEIGHBOR_RADIUS,
            MAX_NEIGHBOR_RADIUS,
            defaults.neighbor_radius,
        );
        self.topological_neighbors = self.topological_neighbors.clamp(
            SOCIAL_MIN_TOPOLOGICAL_NEIGHBORS,
            SOCIAL_MAX_TOPOLOGICAL_NEIGHBORS,
        );
        self.field_of_view_deg = clamp_finite(
            self.field_of_view_deg,
            SOCIAL_MIN_FOV_DEG,
            SOCIAL_MAX_FOV_DEG,
            defaults.field_of_view_deg,
        );
    }

    /// Cosine of the half field of view; neighbors whose direction has a
    /// smaller dot product with the heading are out of sight.
    pub fn fov_cos(&self) -> f32 {
        (self.field_of_view_deg * 0.5).to_radians().cos()
    }
}

/// Reaction and aerodynamic parameters, in physical units (m, s, kg).
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub reaction_time_ms: f32,
    pub dynamic_stability: f32,
    pub mass: f32,
    pub wing_area: f32,
    pub lift_factor: f32,
    pub drag_factor: f32,
    pub thrust: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub gravity: f32,
    pub air_density: f32,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            reaction_time_ms: 250.0,
            dynamic_stability: 0.70,
            mass: 0.08,
            wing_area: 0.0224,
            lift_factor: 0.5714,
            drag_factor: 0.1731,
            thrust: 0.2373,
            min_speed: 5.0,
            max_speed: 18.0,
            gravity: 9.8,
            air_density: 1.225,
        }
    }
}

#[wasm_bindgen]
impl FlightConfig {
    #[wasm_bindgen(constructor)]
    pub fn new() -> FlightConfig {
        Self::default()
    }
}

impl FlightConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        self.reaction_time_ms = clamp_finite(
            self.reaction_time_ms,
            FLIGHT_MIN_REACTION_MS,
            FLIGHT_MAX_REACTION_MS,
            defaults.reaction_time_ms,
        );
        self.dynamic_stability = clamp_finite(
            self.dynamic_stability,
            FLIGHT_MIN_DYNAMIC_STABILITY,
            FLIGHT_MAX_DYNAMIC_STABILITY,
            defaults.dynamic_stability,
        );
        self.mass = clamp_finite(self.mass, FLIGHT_MIN_MASS, FLIGHT_MAX_MASS, defaults.mass);
        self.wing_area = clamp_finite(
            self.wing_area,
            FLIGHT_MIN_WING_AREA,
            FLIGHT_MAX_WING_AREA,
            defaults.wing_area,
        );
        self.lift_factor = clamp_finite(
            self.lift_factor,
            FLIGHT_MIN_LIFT_FACTOR,
            FLIGHT_MAX_LIFT_FACTOR,
            defaults.lift_factor,
        );
        self.drag_factor = clamp_finite(
            self.drag_factor,
            FLIGHT_MIN_DRAG_FACTOR,
            FLIGHT_MAX_DRAG_FACTOR,
            defaults.drag_factor,
        );
        self.thrust = clamp_finite(
            self.thrust,
            FLIGHT_MIN_THRUST,
            FLIGHT_MAX_THRUST,
            defaults.thrust,
        );
        self.min_speed = clamp_finite(
            self.min_speed,
            FLIGHT_MIN_SPEED,
            FLIGHT_MAX_MIN_SPEED,
            defaults.min_speed,
        );
        self.max_speed = clamp_finite(
            self.max_speed,
            self.min_speed.max(FLIGHT_MIN_SPEED_SPAN),
            FLIGHT_MAX_SPEED,
            defaults.max_speed.max(self.min_speed),
        );
        self.gravity = clamp_finite(
            self.gravity,
            FLIGHT_MIN_GRAVITY,
            FLIGHT_MAX_GRAVITY,
            defaults.gravity,
        );
        self.air_density = clamp_finite(
            self.air_density,
            FLIGHT_MIN_AIR_DENSITY,
            FLIGHT_MAX_AIR_DENSITY,
            defaults.air_density,
        );
    }

    /// Share of the remaining turn applied per step: a step as long as the
    /// reaction time converges fully.
    pub fn reaction_gain(&self, dt: f32) -> f32 {
        (dt * 1_000.0 / self.reaction_time_ms).clamp(0.0, 1.0)
    }
}

/// Complete host-replaceable configuration, as carried by settings documents.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    pub model_kind: ModelKind,
    pub math_mode: MathMode,
    pub classic: ClassicConfig,
    pub social: SocialConfig,
    pub flight: FlightConfig,
    pub bounce_x: bool,
    pub bounce_y: bool,
    pub bounce_z: bool,
    pub z_mode: bool,
    pub z_force_scale: f32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            model_kind: ModelKind::default(),
            math_mode: MathMode::default(),
            classic: ClassicConfig::default(),
            social: SocialConfig::default(),
            flight: FlightConfig::default(),
            bounce_x: false,
            bounce_y: false,
            bounce_z: false,
            z_mode: false,
            z_force_scale: DEFAULT_Z_FORCE_SCALE,
        }
    }
}

impl SimSettings {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let mut settings: SimSettings = serde_json::from_str(text)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn sanitize(&mut self) {
        self.classic.sanitize();
        self.social.sanitize();
        self.flight.sanitize();
        self.z_force_scale = sanitize_z_force_scale(self.z_force_scale);
    }
}

pub fn sanitize_z_force_scale(scale: f32) -> f32 {
    clamp_finite(
        scale,
        MIN_Z_FORCE_SCALE,
        MAX_Z_FORCE_SCALE,
        DEFAULT_Z_FORCE_SCALE,
    )
}

pub(crate) fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if !value.is_finite() {
        return fallback;
    }

    value.clamp(min, max)
}
