const MIN_BOUND: f32 = 1.0e-6;
const MIN_CELL_SIZE: f32 = 1.0e-6;
const INVALID_INDEX: usize = usize::MAX;
const MAX_CELLS_PER_AXIS_2D: usize = 1024;
const MAX_CELLS_PER_AXIS_3D: usize = 64;

/// Which axes measure distance across the periodic boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AxisWrap {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

/// One candidate handed to a neighbor callback. Deltas point from the
/// queried agent to the neighbor and already account for wrapping.
#[derive(Clone, Copy, Debug)]
pub struct Neighbor {
    pub index: usize,
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
    pub dist_sq: f32,
}

/// Callback verdict for a visited neighbor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    /// Counts toward the query's `max_count`.
    Accept,
    /// Ignored by the caller (for example outside a field of view).
    Skip,
    /// Ends the query immediately.
    Stop,
}

/// Uniform bucket grid over the active agents.
///
/// Buckets are singly linked through `next`, with `head` holding the first
/// agent of each cell. Both arrays are sized when the layout changes
/// (`configure`, `reserve`) and only overwritten by `rebuild`, so a step does
/// not allocate. Cells are laid out z-major, then y, then x, and every axis
/// is split into equal cells no narrower than the requested size so a
/// wrapped window never misses the partial last cell.
pub struct NeighborGrid {
    cell_size: f32,
    inv_cell_x: f32,
    inv_cell_y: f32,
    inv_cell_z: f32,
    width: f32,
    height: f32,
    depth: f32,
    layered: bool,
    cols: usize,
    rows: usize,
    layers: usize,
    particle_count: usize,
    head: Vec<usize>,
    next: Vec<usize>,
    cached_x: Vec<f32>,
    cached_y: Vec<f32>,
    cached_z: Vec<f32>,
}

impl NeighborGrid {
    pub fn new(capacity: usize, width: f32, height: f32, depth: f32, cell_size: f32) -> Self {
        let mut grid = Self {
            cell_size: MIN_CELL_SIZE,
            inv_cell_x: 1.0,
            inv_cell_y: 1.0,
            inv_cell_z: 1.0,
            width: MIN_BOUND,
            height: MIN_BOUND,
            depth: MIN_BOUND,
            layered: false,
            cols: 0,
            rows: 0,
            layers: 0,
            particle_count: 0,
            head: Vec::new(),
            next: Vec::new(),
            cached_x: Vec::new(),
            cached_y: Vec::new(),
            cached_z: Vec::new(),
        };

        grid.reserve(capacity);
        grid.configure(cell_size, width, height, depth, false);
        grid
    }

    pub fn capacity(&self) -> usize {
        self.next.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cols * self.rows * self.layers
    }

    /// Sizes the per-agent arrays. Only capacity growth calls this.
    pub fn reserve(&mut self, capacity: usize) {
        if self.next.len() < capacity {
            self.next.resize(capacity, INVALID_INDEX);
            self.cached_x.resize(capacity, 0.0);
            self.cached_y.resize(capacity, 0.0);
            self.cached_z.resize(capacity, 0.0);
        }
    }

    /// Recomputes the cell layout for a neighbor radius and world extents.
    /// With `layered` the grid also buckets by depth and queries scan the 26
    /// surrounding cells instead of 8.
    pub fn configure(
        &mut self,
        cell_size: f32,
        width: f32,
        height: f32,
        depth: f32,
        layered: bool,
    ) {
        self.width = sanitize_extent(width);
        self.height = sanitize_extent(height);
        self.depth = sanitize_extent(depth);
        self.layered = layered;

        let max_cells = if layered {
            MAX_CELLS_PER_AXIS_3D
        } else {
            MAX_CELLS_PER_AXIS_2D
        };
        let longest = self
            .width
            .max(self.height)
            .max(if layered { self.depth } else { 0.0 });
        let requested = if cell_size.is_finite() {
            cell_size.max(MIN_CELL_SIZE)
        } else {
            longest
        };
        self.cell_size = requested.max(longest / max_cells as f32);

        let cols = axis_cells(self.width, self.cell_size);
        let rows = axis_cells(self.height, self.cell_size);
        let layers = if layered {
            axis_cells(self.depth, self.cell_size)
        } else {
            1
        };
        self.inv_cell_x = cols as f32 / self.width;
        self.inv_cell_y = rows as f32 / self.height;
        self.inv_cell_z = layers as f32 / self.depth;

        if cols != self.cols || rows != self.rows || layers != self.layers {
            self.cols = cols;
            self.rows = rows;
            self.layers = layers;
            self.head.resize(cols * rows * layers, INVALID_INDEX);
        }
    }

    /// Buckets the first `count` agents. A count above capacity is a caller
    /// error and is clamped.
    pub fn rebuild(
        &mut self,
        positions_x: &[f32],
        positions_y: &[f32],
        positions_z: &[f32],
        count: usize,
    ) {
        let count = count
            .min(self.next.len())
            .min(positions_x.len())
            .min(positions_y.len())
            .min(positions_z.len());

        self.particle_count = count;
        self.head.fill(INVALID_INDEX);

        if count == 0 {
            return;
        }

        self.cached_x[..count].copy_from_slice(&positions_x[..count]);
        self.cached_y[..count].copy_from_slice(&positions_y[..count]);
        self.cached_z[..count].copy_from_slice(&positions_z[..count]);

        // Reverse insertion leaves every bucket in ascending index order.
        for i in (0..count).rev() {
            let cell =
                self.cell_index_for_position(self.cached_x[i], self.cached_y[i], self.cached_z[i]);
            self.next[i] = self.head[cell];
            self.head[cell] = i;
        }
    }

    /// Visits every other bucketed agent within `radius` of agent `i`.
    ///
    /// Once `max_count` neighbors have been accepted the scan stops
    /// (`0` means unbounded). Returns the number of accepted neighbors.
    pub fn for_each_neighbor<F>(
        &self,
        i: usize,
        radius: f32,
        max_count: usize,
        wrap: AxisWrap,
        mut callback: F,
    ) -> usize
    where
        F: FnMut(Neighbor) -> Visit,
    {
        if i >= self.particle_count {
            return 0;
        }

        let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
        let radius_sq = radius * radius;
        let reach_x = (radius * self.inv_cell_x).ceil() as isize;
        let reach_y = (radius * self.inv_cell_y).ceil() as isize;
        let reach_z = (radius * self.inv_cell_z).ceil() as isize;

        let x = self.cached_x[i];
        let y = self.cached_y[i];
        let z = self.cached_z[i];

        let span_x = CellSpan::new(self.cell_x(x), reach_x, self.cols, wrap.x);
        let span_y = CellSpan::new(self.cell_y(y), reach_y, self.rows, wrap.y);
        let span_z = if self.layered {
            CellSpan::new(self.cell_z(z), reach_z, self.layers, wrap.z)
        } else {
            CellSpan::single()
        };

        let mut accepted = 0usize;
        'scan: for cell_z in span_z.iter() {
            for cell_y in span_y.iter() {
                let row_base = (cell_z * self.rows + cell_y) * self.cols;
                for cell_x in span_x.iter() {
                    let mut candidate = self.head[row_base + cell_x];

                    while candidate != INVALID_INDEX {
                        if candidate != i {
                            let dx = axis_delta(self.cached_x[candidate] - x, self.width, wrap.x);
                            let dy = axis_delta(self.cached_y[candidate] - y, self.height, wrap.y);
                            let dz = if self.layered {
                                axis_delta(self.cached_z[candidate] - z, self.depth, wrap.z)
                            } else {
                                0.0
                            };
                            let dist_sq = dx * dx + dy * dy + dz * dz;

                            if dist_sq <= radius_sq {
                                let neighbor = Neighbor {
                                    index: candidate,
                                    dx,
                                    dy,
                                    dz,
                                    dist_sq,
                                };
                                match callback(neighbor) {
                                    Visit::Accept => {
                                        accepted += 1;
                                        if max_count > 0 && accepted >= max_count {
                                            break 'scan;
                                        }
                                    }
                                    Visit::Skip => {}
                                    Visit::Stop => break 'scan,
                                }
                            }
                        }

                        candidate = self.next[candidate];
                    }
                }
            }
        }

        accepted
    }

    fn cell_index_for_position(&self, x: f32, y: f32, z: f32) -> usize {
        let layer = if self.layered { self.cell_z(z) as usize } else { 0 };
        (layer * self.rows + self.cell_y(y) as usize) * self.cols + self.cell_x(x) as usize
    }

    fn cell_x(&self, x: f32) -> isize {
        axis_cell(x, self.inv_cell_x, self.cols)
    }

    fn cell_y(&self, y: f32) -> isize {
        axis_cell(y, self.inv_cell_y, self.rows)
    }

    fn cell_z(&self, z: f32) -> isize {
        axis_cell(z, self.inv_cell_z, self.layers)
    }
}

/// Contiguous run of cells along one axis, possibly wrapping past the edge.
#[derive(Clone, Copy, Debug)]
struct CellSpan {
    start: isize,
    len: usize,
    cells: usize,
}

impl CellSpan {
    fn new(base: isize, reach: isize, cells: usize, wrap: bool) -> Self {
        let n = cells as isize;
        if wrap {
            // A window wider than the axis would revisit cells.
            if 2 * reach + 1 >= n {
                return Self {
                    start: 0,
                    len: cells,
                    cells,
                };
            }
            return Self {
                start: base - reach,
                len: (2 * reach + 1) as usize,
                cells,
            };
        }

        let lo = (base - reach).max(0);
        let hi = (base + reach).min(n - 1);
        Self {
            start: lo,
            len: (hi - lo + 1).max(0) as usize,
            cells,
        }
    }

    fn single() -> Self {
        Self {
            start: 0,
            len: 1,
            cells: 1,
        }
    }

    fn iter(self) -> impl Iterator<Item = usize> {
        let n = self.cells as isize;
        (0..self.len as isize).map(move |k| (self.start + k).rem_euclid(n) as usize)
    }
}

fn sanitize_extent(extent: f32) -> f32 {
    if extent.is_finite() {
        extent.max(MIN_BOUND)
    } else {
        MIN_BOUND
    }
}

fn axis_cells(extent: f32, cell_size: f32) -> usize {
    ((extent / cell_size).floor() as usize).max(1)
}

fn axis_cell(position: f32, inv_cell: f32, cells: usize) -> isize {
    let cell = if position.is_finite() {
        (position * inv_cell).floor() as isize
    } else {
        0
    };
    cell.clamp(0, cells as isize - 1)
}

/// Shortest signed delta along one axis, taking the periodic image when
/// `wrap` is set.
pub(crate) fn axis_delta(delta: f32, extent: f32, wrap: bool) -> f32 {
    if !wrap {
        return delta;
    }

    let half_extent = extent * 0.5;
    if delta > half_extent {
        delta - extent
    } else if delta < -half_extent {
        delta + extent
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::{AxisWrap, NeighborGrid, Visit};

    const WRAP_ALL: AxisWrap = AxisWrap {
        x: true,
        y: true,
        z: true,
    };

    fn sorted_neighbors(
        grid: &NeighborGrid,
        i: usize,
        radius: f32,
        wrap: AxisWrap,
    ) -> Vec<usize> {
        let mut neighbors = Vec::new();
        grid.for_each_neighbor(i, radius, 0, wrap, |n| {
            neighbors.push(n.index);
            Visit::Accept
        });
        neighbors.sort_unstable();
        neighbors
    }

    fn planar_grid(pos_x: &[f32], pos_y: &[f32], extent: f32, cell: f32) -> NeighborGrid {
        let pos_z = vec![0.0; pos_x.len()];
        let mut grid = NeighborGrid::new(pos_x.len(), extent, extent, extent, cell);
        grid.rebuild(pos_x, pos_y, &pos_z, pos_x.len());
        grid
    }

    #[test]
    fn finds_neighbors_in_known_layout() {
        let grid = planar_grid(&[1.0, 1.5, 8.0, 2.7], &[1.0, 1.2, 8.0, 1.1], 10.0, 2.0);

        assert_eq!(sorted_neighbors(&grid, 0, 2.0, WRAP_ALL), vec![1, 3]);
        assert_eq!(sorted_neighbors(&grid, 2, 2.0, WRAP_ALL), Vec::<usize>::new());
    }

    #[test]
    fn checks_across_cell_boundaries() {
        let grid = planar_grid(&[1.9, 2.1, 5.0], &[1.0, 1.0, 5.0], 10.0, 2.0);

        assert_eq!(sorted_neighbors(&grid, 0, 0.25, WRAP_ALL), vec![1]);
        assert_eq!(sorted_neighbors(&grid, 1, 0.25, WRAP_ALL), vec![0]);
    }

    #[test]
    fn wrapping_finds_neighbors_across_the_edge() {
        let grid = planar_grid(&[0.1, 9.9], &[5.0, 5.0], 10.0, 1.0);

        assert_eq!(sorted_neighbors(&grid, 0, 0.5, WRAP_ALL), vec![1]);
        assert!(sorted_neighbors(&grid, 0, 0.5, AxisWrap::default()).is_empty());
    }

    #[test]
    fn wide_radius_on_small_grid_reports_each_neighbor_once() {
        let grid = planar_grid(&[0.5, 1.5, 2.5], &[0.5, 0.5, 0.5], 3.0, 1.0);

        assert_eq!(sorted_neighbors(&grid, 0, 2.9, WRAP_ALL), vec![1, 2]);
    }

    #[test]
    fn max_count_stops_the_scan() {
        let pos_x: Vec<f32> = (0..20).map(|i| 5.0 + i as f32 * 0.01).collect();
        let pos_y = vec![5.0; 20];
        let grid = planar_grid(&pos_x, &pos_y, 10.0, 1.0);

        let mut seen = 0;
        let accepted = grid.for_each_neighbor(0, 1.0, 4, WRAP_ALL, |_| {
            seen += 1;
            Visit::Accept
        });
        assert_eq!(accepted, 4);
        assert_eq!(seen, 4);
    }

    #[test]
    fn skipped_neighbors_do_not_count_toward_the_cap() {
        let pos_x: Vec<f32> = (0..10).map(|i| 5.0 + i as f32 * 0.01).collect();
        let pos_y = vec![5.0; 10];
        let grid = planar_grid(&pos_x, &pos_y, 10.0, 1.0);

        let accepted = grid.for_each_neighbor(0, 1.0, 3, WRAP_ALL, |n| {
            if n.index % 2 == 0 {
                Visit::Accept
            } else {
                Visit::Skip
            }
        });
        assert_eq!(accepted, 3);
    }

    #[test]
    fn buckets_are_visited_in_index_order() {
        let grid = planar_grid(&[0.2, 0.3, 0.4, 0.5], &[0.2, 0.2, 0.2, 0.2], 10.0, 2.0);

        let mut order = Vec::new();
        grid.for_each_neighbor(3, 1.0, 0, WRAP_ALL, |n| {
            order.push(n.index);
            Visit::Accept
        });
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn agents_beyond_rebuild_count_are_invisible() {
        let pos_x = [1.0, 1.1, 1.2];
        let pos_y = [1.0, 1.0, 1.0];
        let pos_z = [0.0; 3];
        let mut grid = NeighborGrid::new(3, 10.0, 10.0, 10.0, 1.0);
        grid.rebuild(&pos_x, &pos_y, &pos_z, 2);

        assert_eq!(sorted_neighbors(&grid, 0, 1.0, WRAP_ALL), vec![1]);
        assert!(sorted_neighbors(&grid, 2, 1.0, WRAP_ALL).is_empty());
    }

    #[test]
    fn layered_grid_measures_depth() {
        let pos_x = [0.5, 0.5];
        let pos_y = [0.5, 0.5];
        let pos_z = [0.1, 0.9];
        let mut grid = NeighborGrid::new(2, 1.0, 1.0, 1.0, 0.1);

        grid.configure(0.1, 1.0, 1.0, 1.0, true);
        grid.rebuild(&pos_x, &pos_y, &pos_z, 2);
        assert!(sorted_neighbors(&grid, 0, 0.1, AxisWrap::default()).is_empty());
        assert_eq!(sorted_neighbors(&grid, 0, 0.25, WRAP_ALL), vec![1]);

        grid.configure(0.1, 1.0, 1.0, 1.0, false);
        grid.rebuild(&pos_x, &pos_y, &pos_z, 2);
        assert_eq!(sorted_neighbors(&grid, 0, 0.1, AxisWrap::default()), vec![1]);
    }

    #[test]
    fn tiny_cells_are_capped_per_axis() {
        let mut grid = NeighborGrid::new(4, 1.0, 1.0, 1.0, 1.0e-5);
        assert!(grid.cell_count() <= 1024 * 1024);

        grid.configure(1.0e-5, 1.0, 1.0, 1.0, true);
        assert!(grid.cell_count() <= 64 * 64 * 64);
        assert_eq!(grid.capacity(), 4);
    }
}
