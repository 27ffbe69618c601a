//! Axis-separable 3-D Cartesian grid of rectangular cells, with optional
//! periodic boundary conditions per axis.

use ultraviolet::Vec3;

/// Discrete per-axis cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellCoord(pub [i32; 3]);

/// Result of advancing an ion by one candidate flight path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryCrossing {
    /// Stayed within the current cell.
    None,
    /// Crossed into a different cell within the simulation volume.
    Internal,
    /// Left the simulation volume entirely.
    External,
    /// Reached a boundary but remained in the same cell: a single-cell
    /// periodic axis where the wrapped point maps back to its own cell.
    InternalPBC,
}

/// Three axis-separable edge arrays plus per-axis periodicity.
#[derive(Clone, Debug)]
pub struct Grid {
    edges: [Vec<f32>; 3],
    periodic: [bool; 3],
    origin: Vec3,
    size: Vec3,
    ncells: [i32; 3],
}

impl Grid {
    pub fn new(x: Vec<f32>, y: Vec<f32>, z: Vec<f32>, periodic: [bool; 3]) -> Self {
        assert!(x.len() >= 2 && y.len() >= 2 && z.len() >= 2, "each axis needs at least one cell");
        let origin = Vec3::new(x[0], y[0], z[0]);
        let size = Vec3::new(
            x[x.len() - 1] - x[0],
            y[y.len() - 1] - y[0],
            z[z.len() - 1] - z[0],
        );
        let ncells = [(x.len() - 1) as i32, (y.len() - 1) as i32, (z.len() - 1) as i32];
        Self { edges: [x, y, z], periodic, origin, size, ncells }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn size(&self) -> Vec3 {
        self.size
    }

    pub fn ncells(&self) -> [i32; 3] {
        self.ncells
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    pub fn total_cells(&self) -> usize {
        (self.ncells[0] * self.ncells[1] * self.ncells[2]) as usize
    }

    /// Row-major flat index for a discrete cell vector, `-1` if out of range.
    pub fn flat_index(&self, cell: CellCoord) -> i32 {
        let [i, j, k] = cell.0;
        if i < 0
            || j < 0
            || k < 0
            || i >= self.ncells[0]
            || j >= self.ncells[1]
            || k >= self.ncells[2]
        {
            return -1;
        }
        i * self.ncells[1] * self.ncells[2] + j * self.ncells[2] + k
    }

    fn axis_lo(&self, axis: usize) -> f32 {
        self.edges[axis][0]
    }

    fn axis_hi(&self, axis: usize) -> f32 {
        *self.edges[axis].last().unwrap()
    }

    /// `[origin, origin+size)` test per axis, periodic axes always pass.
    pub fn contains_with_bc(&self, x: Vec3) -> bool {
        for axis in 0..3 {
            if self.periodic[axis] {
                continue;
            }
            let lo = self.axis_lo(axis);
            let hi = self.axis_hi(axis);
            let v = x[axis];
            if !(v >= lo && v < hi) {
                return false;
            }
        }
        true
    }

    /// Strict `[lo, hi)` test against a specific cell's bounds.
    pub fn contains(&self, cell_index: i32, x: Vec3) -> bool {
        if cell_index < 0 {
            return false;
        }
        let cell = self.cell_of_flat(cell_index);
        for axis in 0..3 {
            let lo = self.edges[axis][cell.0[axis] as usize];
            let hi = self.edges[axis][cell.0[axis] as usize + 1];
            let v = x[axis];
            if !(v >= lo && v < hi) {
                return false;
            }
        }
        true
    }

    fn cell_of_flat(&self, flat: i32) -> CellCoord {
        let nz = self.ncells[2];
        let ny = self.ncells[1];
        let k = flat % nz;
        let rest = flat / nz;
        let j = rest % ny;
        let i = rest / ny;
        CellCoord([i, j, k])
    }

    fn locate_axis(&self, axis: usize, mut v: f32) -> usize {
        let edges = &self.edges[axis];
        if self.periodic[axis] {
            let lo = edges[0];
            let hi = *edges.last().unwrap();
            let span = hi - lo;
            v = lo + (v - lo).rem_euclid(span);
        }
        match edges.binary_search_by(|e| e.partial_cmp(&v).unwrap()) {
            Ok(i) => i.min(edges.len() - 2),
            Err(i) => (i.max(1) - 1).min(edges.len() - 2),
        }
    }

    /// Discrete cell vector for a position, wrapping periodic axes first.
    pub fn pos2cell(&self, x: Vec3) -> CellCoord {
        CellCoord([
            self.locate_axis(0, x.x) as i32,
            self.locate_axis(1, x.y) as i32,
            self.locate_axis(2, x.z) as i32,
        ])
    }

    /// Wrap `pos` on every periodic axis.
    pub fn apply_bc(&self, pos: &mut Vec3) {
        for axis in 0..3 {
            if !self.periodic[axis] {
                continue;
            }
            let lo = self.axis_lo(axis);
            let span = self.axis_hi(axis) - lo;
            pos[axis] = lo + (pos[axis] - lo).rem_euclid(span);
        }
    }

    /// Advance `pos` to the nearest cell boundary along `dir` from
    /// `cell_index`, returning the distance travelled. `pos` is updated
    /// in place.
    pub fn bring2boundary(&self, cell_index: i32, pos: &mut Vec3, dir: Vec3) -> f32 {
        let cell = self.cell_of_flat(cell_index);
        let mut best_s = f32::INFINITY;
        for axis in 0..3 {
            let d = dir[axis];
            if d.abs() < 1e-12 {
                continue;
            }
            let lo = self.edges[axis][cell.0[axis] as usize];
            let hi = self.edges[axis][cell.0[axis] as usize + 1];
            let target = if d > 0.0 { hi } else { lo };
            let s = (target - pos[axis]) / d;
            if s >= 0.0 && s < best_s {
                best_s = s;
            }
        }
        if !best_s.is_finite() {
            best_s = 0.0;
        }
        *pos += dir * best_s;
        best_s
    }

    /// Advance the ion through one candidate step, returning the crossing
    /// classification. `pos` and `cell_index` are mutated in place; the
    /// return value tells the caller how the step ended so it can finish
    /// the segment's tallying.
    pub fn propagate(
        &self,
        dx: f32,
        pos: &mut Vec3,
        dir: Vec3,
        cell_index: &mut i32,
    ) -> BoundaryCrossing {
        let candidate = *pos + dir * dx;
        if self.contains_with_bc(candidate) && self.contains(*cell_index, candidate) {
            *pos = candidate;
            return BoundaryCrossing::None;
        }

        let prev_cell = *cell_index;
        self.bring2boundary(*cell_index, pos, dir);
        self.apply_bc(pos);

        if !self.contains_with_bc(*pos) {
            *cell_index = -1;
            return BoundaryCrossing::External;
        }

        let new_cell = self.pos2cell(*pos);
        let new_flat = self.flat_index(new_cell);
        *cell_index = new_flat;

        if new_flat != prev_cell {
            BoundaryCrossing::Internal
        } else {
            BoundaryCrossing::InternalPBC
        }
    }
}
