use crate::agents::AgentState;
use crate::integrator::Bounds;

const EPSILON: f32 = 1.0e-6;

/// Read-only borrow of the export arrays, covering the active agents only.
///
/// Holding a view borrows the simulation, so in Rust it cannot outlive a
/// capacity change. Hosts reading through raw pointers compare `generation`
/// against [`crate::Sim::buffer_generation`] instead.
#[derive(Clone, Copy, Debug)]
pub struct RenderView<'a> {
    /// Interleaved normalized `x, y` pairs.
    pub xy: &'a [f32],
    /// Normalized depth per agent.
    pub z: &'a [f32],
    /// Interleaved unit `x, y` heading pairs.
    pub heading_xy: &'a [f32],
    pub generation: u32,
}

impl RenderView<'_> {
    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }
}

/// Flat arrays refreshed after every step for the renderer.
///
/// Storage is allocated for the full capacity and only reallocated by
/// [`RenderExportBuffer::grow`], which bumps `generation`.
pub(crate) struct RenderExportBuffer {
    xy: Vec<f32>,
    z: Vec<f32>,
    heading_xy: Vec<f32>,
    exported: usize,
    generation: u32,
}

impl RenderExportBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            xy: vec![0.0; capacity * 2],
            z: vec![0.5; capacity],
            heading_xy: vec![0.0; capacity * 2],
            exported: 0,
            generation: 0,
        }
    }

    pub(crate) fn grow(&mut self, capacity: usize) {
        if capacity <= self.z.len() {
            return;
        }

        self.xy.resize(capacity * 2, 0.0);
        self.z.resize(capacity, 0.5);
        self.heading_xy.resize(capacity * 2, 0.0);
        self.generation = self.generation.wrapping_add(1);
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }

    /// Copies the active prefix of `agents` into the export arrays, with
    /// positions divided by the world extents.
    pub(crate) fn sync(&mut self, agents: &AgentState, bounds: &Bounds) {
        let count = agents.active().min(self.z.len());
        let inv_x = 1.0 / bounds.extent_x;
        let inv_y = 1.0 / bounds.extent_y;
        let inv_z = 1.0 / bounds.extent_z;

        for i in 0..count {
            let base = 2 * i;
            self.xy[base] = (agents.pos_x[i] * inv_x).clamp(0.0, 1.0);
            self.xy[base + 1] = (agents.pos_y[i] * inv_y).clamp(0.0, 1.0);
            self.z[i] = (agents.pos_z[i] * inv_z).clamp(0.0, 1.0);

            let (hx, hy) = planar_heading(
                (agents.vel_x[i], agents.vel_y[i]),
                (agents.heading_x[i], agents.heading_y[i]),
            );
            self.heading_xy[base] = hx;
            self.heading_xy[base + 1] = hy;
        }

        self.exported = count;
    }

    pub(crate) fn view(&self) -> RenderView<'_> {
        RenderView {
            xy: &self.xy[..self.exported * 2],
            z: &self.z[..self.exported],
            heading_xy: &self.heading_xy[..self.exported * 2],
            generation: self.generation,
        }
    }

    pub(crate) fn xy_ptr(&self) -> *const f32 {
        self.xy.as_ptr()
    }

    pub(crate) fn z_ptr(&self) -> *const f32 {
        self.z.as_ptr()
    }

    pub(crate) fn heading_xy_ptr(&self) -> *const f32 {
        self.heading_xy.as_ptr()
    }

    pub(crate) fn exported(&self) -> usize {
        self.exported
    }
}

// Velocity direction first, then the stored heading, then +X.
fn planar_heading(velocity: (f32, f32), heading: (f32, f32)) -> (f32, f32) {
    for (x, y) in [velocity, heading] {
        let len_sq = x * x + y * y;
        if len_sq > EPSILON && len_sq.is_finite() {
            let inv_len = len_sq.sqrt().recip();
            return (x * inv_len, y * inv_len);
        }
    }
    (1.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::{planar_heading, RenderExportBuffer};
    use crate::agents::{AgentState, SpawnRange};
    use crate::integrator::Bounds;
    use approx::assert_relative_eq;

    fn agents(capacity: usize, bounds: &Bounds) -> AgentState {
        AgentState::new(
            capacity,
            11,
            SpawnRange {
                extent_x: bounds.extent_x,
                extent_y: bounds.extent_y,
                extent_z: bounds.extent_z,
                min_speed: 0.05,
                max_speed: 0.2,
            },
        )
    }

    #[test]
    fn positions_are_normalized_per_axis() {
        let bounds = Bounds::new(2000.0, 1000.0);
        let mut agents = agents(2, &bounds);
        agents.place(0, 1.0, 0.5, 0.25, 0.1, 0.0, 0.0);
        agents.place(1, 0.5, 0.25, 0.5, 0.0, 0.0, 0.0);

        let mut buffer = RenderExportBuffer::new(2);
        buffer.sync(&agents, &bounds);
        let view = buffer.view();

        assert_eq!(view.len(), 2);
        assert_relative_eq!(view.xy[0], 1.0);
        assert_relative_eq!(view.xy[1], 1.0);
        assert_relative_eq!(view.xy[2], 0.5);
        assert_relative_eq!(view.xy[3], 0.5);
        assert_relative_eq!(view.z[0], 0.25);
    }

    #[test]
    fn view_covers_only_the_active_prefix() {
        let bounds = Bounds::new(1.0, 1.0);
        let mut agents = agents(8, &bounds);
        agents.set_active(3);

        let mut buffer = RenderExportBuffer::new(8);
        buffer.sync(&agents, &bounds);
        let view = buffer.view();

        assert_eq!(view.xy.len(), 6);
        assert_eq!(view.z.len(), 3);
        assert_eq!(view.heading_xy.len(), 6);
    }

    #[test]
    fn growth_bumps_generation_once() {
        let mut buffer = RenderExportBuffer::new(4);
        buffer.grow(2);
        assert_eq!(buffer.generation(), 0);
        buffer.grow(16);
        assert_eq!(buffer.generation(), 1);
    }

    #[test]
    fn heading_falls_back_when_velocity_is_degenerate() {
        assert_eq!(planar_heading((0.0, 0.0), (0.0, -2.0)), (0.0, -1.0));
        assert_eq!(planar_heading((0.0, 0.0), (0.0, 0.0)), (1.0, 0.0));

        let (hx, hy) = planar_heading((3.0, 4.0), (1.0, 0.0));
        assert_relative_eq!(hx, 0.6);
        assert_relative_eq!(hy, 0.8);
    }
}
