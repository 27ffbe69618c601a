//! 1-D interpolators over a [`CorteoGrid`](super::CorteoGrid), used for
//! electronic-stopping, straggling and flight-path tables.

use super::CorteoGrid;

/// Piecewise-linear interpolator: stores `y[i]` and the slope to the next
/// point, evaluates in `O(1)` via direct Corteo indexing.
#[derive(Clone)]
pub struct LinInterp {
    grid: CorteoGrid,
    y: Vec<f32>,
    dydx: Vec<f32>,
}

impl LinInterp {
    pub fn new(grid: CorteoGrid, y: &[f32]) -> Self {
        let n = grid.len();
        assert_eq!(y.len(), n);
        let mut dydx = vec![0.0; n];
        for i in 0..n - 1 {
            let xi = grid.value_at(i as i32);
            let xj = grid.value_at(i as i32 + 1);
            dydx[i] = (y[i + 1] - y[i]) / (xj - xi);
        }
        Self { grid, y: y.to_vec(), dydx }
    }

    pub fn eval(&self, x: f32) -> f32 {
        if x <= self.grid.min_val() {
            return *self.y.first().unwrap();
        }
        if x >= self.grid.max_val() {
            return *self.y.last().unwrap();
        }
        let i = self.grid.index_of(x) as usize;
        let xi = self.grid.value_at(i as i32);
        self.y[i] + self.dydx[i] * (x - xi)
    }
}

/// Log-log interpolator: stores `y[i]` and the slope of `log2(y)` vs
/// `log2(x)`, evaluates as `y[i] * 2^(d * log2(x/x[i]))`.
#[derive(Clone)]
pub struct LogInterp {
    grid: CorteoGrid,
    y: Vec<f32>,
    dlog: Vec<f32>,
}

impl LogInterp {
    pub fn new(grid: CorteoGrid, y: &[f32]) -> Self {
        let n = grid.len();
        assert_eq!(y.len(), n);
        let mut dlog = vec![0.0; n];
        for i in 0..n - 1 {
            let log_xi = grid.log2_at(i as i32);
            let log_xj = grid.log2_at(i as i32 + 1);
            dlog[i] = (y[i + 1].log2() - y[i].log2()) / (log_xj - log_xi);
        }
        Self { grid, y: y.to_vec(), dlog }
    }

    pub fn eval(&self, x: f32) -> f32 {
        if x <= self.grid.min_val() {
            return *self.y.first().unwrap();
        }
        if x >= self.grid.max_val() {
            return *self.y.last().unwrap();
        }
        let i = self.grid.index_of(x) as usize;
        let log_xi = self.grid.log2_at(i as i32);
        self.y[i] * 2f32.powf(self.dlog[i] * (x.log2() - log_xi))
    }
}
