//! 2-D row-major tables over a `(row, col)` Corteo grid pair, with bilinear
//! and bilog interpolation.

use super::CorteoGrid;
use std::sync::Arc;

/// Four flat indices and interpolation weights for a bilinear/bilog lookup.
pub struct Stencil {
    pub idx: [usize; 4],
    pub coef: [f32; 4],
}

#[derive(Clone)]
pub struct Table2D {
    rows: CorteoGrid,
    cols: CorteoGrid,
    ncols: usize,
    pub data: Arc<[f32]>,
}

impl Table2D {
    pub fn new(rows: CorteoGrid, cols: CorteoGrid, data: Vec<f32>) -> Self {
        let ncols = cols.len();
        assert_eq!(data.len(), rows.len() * ncols);
        Self { rows, cols, ncols, data: data.into() }
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.ncols + j]
    }

    /// Locate the bracketing (row, col) cell for `(e, s)`, clamped at the
    /// grid edges.
    fn locate(&self, e: f32, s: f32) -> (i32, i32, i32, i32, f32, f32) {
        let mut e = e;
        let mut s = s;
        let mut i0 = self.rows.index_of(e);
        let mut i1 = i0;
        if e >= self.rows.max_val() {
            i0 -= 1;
            e = self.rows.max_val();
        } else {
            i1 += 1;
            if e < self.rows.min_val() {
                e = self.rows.min_val();
            }
        }
        let mut j0 = self.cols.index_of(s);
        let mut j1 = j0;
        if s >= self.cols.max_val() {
            j0 -= 1;
            s = self.cols.max_val();
        } else {
            j1 += 1;
            if s < self.cols.min_val() {
                s = self.cols.min_val();
            }
        }
        (i0, i1, j0, j1, e, s)
    }

    fn stencil_indices(&self, i0: i32, i1: i32, j0: i32, j1: i32) -> [usize; 4] {
        let k00 = i0 as usize * self.ncols + j0 as usize;
        let k01 = i0 as usize * self.ncols + j1 as usize;
        let k10 = i1 as usize * self.ncols + j0 as usize;
        let k11 = i1 as usize * self.ncols + j1 as usize;
        [k00, k01, k10, k11]
    }

    /// Linear-linear interpolation stencil.
    pub fn bilinear(&self, e: f32, s: f32) -> Stencil {
        let (i0, i1, j0, j1, e, s) = self.locate(e, s);
        let idx = self.stencil_indices(i0, i1, j0, j1);
        let e0 = self.rows.value_at(i0);
        let e1 = self.rows.value_at(i1);
        let s0 = self.cols.value_at(j0);
        let s1 = self.cols.value_at(j1);
        let t = (e - e0) / (e1 - e0);
        let u = (s - s0) / (s1 - s0);
        let coef = [(1.0 - t) * (1.0 - u), (1.0 - t) * u, t * (1.0 - u), t * u];
        Stencil { idx, coef }
    }

    /// Log-log interpolation stencil (both axes in `log2` space).
    pub fn bilog(&self, e: f32, s: f32) -> Stencil {
        let (i0, i1, j0, j1, e, s) = self.locate(e, s);
        let idx = self.stencil_indices(i0, i1, j0, j1);
        let e0 = self.rows.log2_at(i0);
        let e1 = self.rows.log2_at(i1);
        let s0 = self.cols.log2_at(j0);
        let s1 = self.cols.log2_at(j1);
        let t = (e.log2() - e0) / (e1 - e0);
        let u = (s.log2() - s0) / (s1 - s0);
        let coef = [(1.0 - t) * (1.0 - u), (1.0 - t) * u, t * (1.0 - u), t * u];
        Stencil { idx, coef }
    }

    pub fn eval_with(&self, stencil: &Stencil) -> f32 {
        stencil.idx.iter().zip(stencil.coef.iter()).map(|(&i, &c)| self.data[i] * c).sum()
    }

    pub fn rows(&self) -> &CorteoGrid {
        &self.rows
    }

    pub fn cols(&self) -> &CorteoGrid {
        &self.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_reproduces_constant_function() {
        let rows = CorteoGrid::new(4, -19, 21);
        let cols = CorteoGrid::new(4, -26, 6);
        let data = vec![2.5f32; rows.len() * cols.len()];
        let table = Table2D::new(rows, cols, data);
        let s = table.bilinear(1.0, 0.01);
        assert!((table.eval_with(&s) - 2.5).abs() < 1e-5);
    }
}
