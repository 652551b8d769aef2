use crate::math::{Accurate, MathStrategy};
use std::f32::consts::TAU;

/// Share of the spawn speed given to the initial vertical velocity.
const SPAWN_Z_SPEED_SHARE: f32 = 0.35;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Lcg32 {
    state: u32,
}

impl Lcg32 {
    pub(crate) fn new(seed: u32) -> Self {
        let state = if seed == 0 { 0xA341_316C } else { seed };
        Self { state }
    }

    pub(crate) fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(1_664_525)
            .wrapping_add(1_013_904_223);
        self.state
    }

    pub(crate) fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / ((1_u32 << 24) as f32)
    }
}

/// Structure-of-arrays store for every agent slot.
///
/// All vectors share the same length (`capacity`) and are only resized by
/// [`AgentState::grow`]. Slots past `active` keep whatever values they last
/// held; the step loops never touch them.
pub(crate) struct AgentState {
    capacity: usize,
    active: usize,
    rng: Lcg32,
    pub(crate) pos_x: Vec<f32>,
    pub(crate) pos_y: Vec<f32>,
    pub(crate) pos_z: Vec<f32>,
    pub(crate) vel_x: Vec<f32>,
    pub(crate) vel_y: Vec<f32>,
    pub(crate) vel_z: Vec<f32>,
    pub(crate) heading_x: Vec<f32>,
    pub(crate) heading_y: Vec<f32>,
    pub(crate) heading_z: Vec<f32>,
    pub(crate) accel_x: Vec<f32>,
    pub(crate) accel_y: Vec<f32>,
    pub(crate) accel_z: Vec<f32>,
    pub(crate) seed: Vec<u32>,
}

/// Spawn parameters shared by construction and growth.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SpawnRange {
    pub(crate) extent_x: f32,
    pub(crate) extent_y: f32,
    pub(crate) extent_z: f32,
    pub(crate) min_speed: f32,
    pub(crate) max_speed: f32,
}

impl AgentState {
    pub(crate) fn new(capacity: usize, seed: u32, spawn: SpawnRange) -> Self {
        let mut agents = Self {
            capacity: 0,
            active: 0,
            rng: Lcg32::new(seed),
            pos_x: Vec::with_capacity(capacity),
            pos_y: Vec::with_capacity(capacity),
            pos_z: Vec::with_capacity(capacity),
            vel_x: Vec::with_capacity(capacity),
            vel_y: Vec::with_capacity(capacity),
            vel_z: Vec::with_capacity(capacity),
            heading_x: Vec::with_capacity(capacity),
            heading_y: Vec::with_capacity(capacity),
            heading_z: Vec::with_capacity(capacity),
            accel_x: Vec::with_capacity(capacity),
            accel_y: Vec::with_capacity(capacity),
            accel_z: Vec::with_capacity(capacity),
            seed: Vec::with_capacity(capacity),
        };
        agents.grow(capacity, spawn);
        agents.active = capacity;
        agents
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn active(&self) -> usize {
        self.active
    }

    /// Sets the simulated prefix length, clamped to capacity. Returns the
    /// value actually stored.
    pub(crate) fn set_active(&mut self, active: usize) -> usize {
        self.active = active.min(self.capacity);
        self.active
    }

    /// Appends freshly spawned slots until `capacity` is reached. The active
    /// count is left untouched.
    pub(crate) fn grow(&mut self, capacity: usize, spawn: SpawnRange) {
        if capacity <= self.capacity {
            return;
        }

        let additional = capacity - self.capacity;
        for column in self.columns_mut() {
            column.reserve_exact(additional);
        }
        self.seed.reserve_exact(additional);

        for _ in self.capacity..capacity {
            let x = self.rng.next_f32() * spawn.extent_x;
            let y = self.rng.next_f32() * spawn.extent_y;
            let z = self.rng.next_f32() * spawn.extent_z;

            let angle = self.rng.next_f32() * TAU;
            let speed = spawn.min_speed + (spawn.max_speed - spawn.min_speed) * self.rng.next_f32();
            let vx = angle.cos() * speed;
            let vy = angle.sin() * speed;
            let vz = (self.rng.next_f32() * 2.0 - 1.0) * speed * SPAWN_Z_SPEED_SHARE;
            let (hx, hy, hz) = Accurate::normalize_or(vx, vy, vz, (1.0, 0.0, 0.0));

            self.pos_x.push(x);
            self.pos_y.push(y);
            self.pos_z.push(z);
            self.vel_x.push(vx);
            self.vel_y.push(vy);
            self.vel_z.push(vz);
            self.heading_x.push(hx);
            self.heading_y.push(hy);
            self.heading_z.push(hz);
            self.accel_x.push(0.0);
            self.accel_y.push(0.0);
            self.accel_z.push(0.0);
            let agent_seed = self.rng.next_u32();
            self.seed.push(agent_seed);
        }

        self.capacity = capacity;
    }

    /// Overwrites one slot. Heading follows the new velocity, or keeps its
    /// previous direction when the velocity is degenerate.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn place(&mut self, i: usize, x: f32, y: f32, z: f32, vx: f32, vy: f32, vz: f32) {
        if i >= self.capacity {
            return;
        }

        self.pos_x[i] = x;
        self.pos_y[i] = y;
        self.pos_z[i] = z;
        self.vel_x[i] = vx;
        self.vel_y[i] = vy;
        self.vel_z[i] = vz;
        let fallback = (self.heading_x[i], self.heading_y[i], self.heading_z[i]);
        let (hx, hy, hz) = Accurate::normalize_or(vx, vy, vz, fallback);
        self.heading_x[i] = hx;
        self.heading_y[i] = hy;
        self.heading_z[i] = hz;
    }

    /// Pins every slot to the mid layer with no vertical motion.
    pub(crate) fn flatten_z(&mut self, layer: f32) {
        self.pos_z.fill(layer);
        self.vel_z.fill(0.0);
        self.accel_z.fill(0.0);
        self.heading_z.fill(0.0);
    }

    /// Spreads agents over the depth using their per-agent seed so the
    /// layout is reproducible for a given construction seed.
    pub(crate) fn spread_z(&mut self, extent_z: f32) {
        for i in 0..self.capacity {
            self.pos_z[i] = (hash_unit(0, self.seed[i], 3) * 0.5 + 0.5) * extent_z;
        }
    }

    /// Carries positions into resized extents, clamping rounding overshoot.
    pub(crate) fn scale_positions(&mut self, scale: (f32, f32), extent: (f32, f32)) {
        for x in &mut self.pos_x {
            *x = (*x * scale.0).clamp(0.0, extent.0);
        }
        for y in &mut self.pos_y {
            *y = (*y * scale.1).clamp(0.0, extent.1);
        }
    }

    fn columns_mut(&mut self) -> [&mut Vec<f32>; 12] {
        [
            &mut self.pos_x,
            &mut self.pos_y,
            &mut self.pos_z,
            &mut self.vel_x,
            &mut self.vel_y,
            &mut self.vel_z,
            &mut self.heading_x,
            &mut self.heading_y,
            &mut self.heading_z,
            &mut self.accel_x,
            &mut self.accel_y,
            &mut self.accel_z,
        ]
    }
}

/// Stateless hash mapped to `[-1, 1]`, used for jitter and tie-breaking.
pub(crate) fn hash_unit(step_index: u32, agent_seed: u32, axis: u32) -> f32 {
    let mut x = step_index
        .wrapping_mul(0x9E37_79B9)
        .wrapping_add(agent_seed.wrapping_mul(0x85EB_CA6B))
        .wrapping_add(axis.wrapping_mul(0xC2B2_AE35))
        .wrapping_add(0x27D4_EB2F);

    x ^= x >> 15;
    x = x.wrapping_mul(0x85EB_CA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2_AE35);
    x ^= x >> 16;

    let normalized = (x as f32) / (u32::MAX as f32);
    normalized * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::{hash_unit, AgentState, Lcg32, SpawnRange};

    fn spawn() -> SpawnRange {
        SpawnRange {
            extent_x: 1.0,
            extent_y: 0.5,
            extent_z: 1.0,
            min_speed: 0.05,
            max_speed: 0.2,
        }
    }

    #[test]
    fn same_seed_spawns_same_layout() {
        let a = AgentState::new(32, 9, spawn());
        let b = AgentState::new(32, 9, spawn());
        assert_eq!(a.pos_x, b.pos_x);
        assert_eq!(a.vel_y, b.vel_y);
        assert_eq!(a.seed, b.seed);
    }

    #[test]
    fn spawned_agents_respect_extents() {
        let agents = AgentState::new(256, 3, spawn());
        assert!(agents.pos_x.iter().all(|x| (0.0..=1.0).contains(x)));
        assert!(agents.pos_y.iter().all(|y| (0.0..=0.5).contains(y)));
    }

    #[test]
    fn active_count_is_clamped_to_capacity() {
        let mut agents = AgentState::new(8, 1, spawn());
        assert_eq!(agents.set_active(100), 8);
        assert_eq!(agents.set_active(3), 3);
        assert_eq!(agents.capacity(), 8);
    }

    #[test]
    fn growth_keeps_existing_slots_and_active_count() {
        let mut agents = AgentState::new(4, 77, spawn());
        agents.set_active(2);
        let before = agents.pos_x.clone();

        agents.grow(10, spawn());

        assert_eq!(agents.capacity(), 10);
        assert_eq!(agents.active(), 2);
        assert_eq!(&agents.pos_x[..4], &before[..]);
        assert_eq!(agents.accel_z.len(), 10);
        assert_eq!(agents.seed.len(), 10);
    }

    #[test]
    fn zero_seed_is_not_degenerate() {
        let mut rng = Lcg32::new(0);
        let first = rng.next_u32();
        assert_ne!(first, rng.next_u32());
    }

    #[test]
    fn hash_stays_in_unit_range() {
        for step in 0..64 {
            let value = hash_unit(step, 0xDEAD_BEEF, step % 3);
            assert!((-1.0..=1.0).contains(&value));
        }
    }
}
