//! Electronic stopping and straggling: per-(projectile, material) log-log
//! interpolators over the 4-bit energy grid, built by Bragg mixing of
//! per-element data.

use crate::numeric::{CorteoGrid, LogInterp};
use crate::random_vars::gaussian;
use crate::target::Material;
use crate::units::{DEDX_EMAX, DEDX_EMIN};

/// The raw per-element electronic-stopping-power source. The actual
/// tabulated parametrizations (SRIM/DPASS) are a collaborator data source;
/// this crate only consumes `(E[], Se[])` pairs through this trait.
pub trait StoppingSource {
    /// Stopping power `Se(E)` in `eV*1e-15*at^-1*cm^2` on a grid covering at
    /// least `[2^DEDX_EMIN, 2^DEDX_EMAX]` eV, for projectile `z1` in a pure
    /// target of atomic number `z2`.
    fn se_table(&self, z1: u8, z2: u8) -> (Vec<f32>, Vec<f32>);

    /// Straggling coefficient source data, same units convention, for one
    /// of the Bohr/Chu/Yang parametrizations selected by the caller.
    fn straggling_table(&self, z1: u8, z2: u8) -> (Vec<f32>, Vec<f32>);
}

fn dedx_grid() -> CorteoGrid {
    CorteoGrid::new(4, DEDX_EMIN, DEDX_EMAX)
}

/// Resample a source `(E, Se)` curve onto the canonical 4-bit energy grid,
/// with sub-range extrapolation scaling as `sqrt(E/Emin)` of the lowest
/// tabulated point.
fn resample_onto_grid(grid: &CorteoGrid, e: &[f32], se: &[f32]) -> Vec<f32> {
    assert_eq!(e.len(), se.len());
    let mut out = vec![0f32; grid.len()];
    let e_min = e[0];
    let se_min = se[0];
    for i in 0..grid.len() {
        let x = grid.value_at(i as i32);
        out[i] = if x <= e_min {
            se_min * (x / e_min).sqrt()
        } else {
            interp_linear_in_log(e, se, x)
        };
    }
    out
}

fn interp_linear_in_log(e: &[f32], se: &[f32], x: f32) -> f32 {
    if x >= *e.last().unwrap() {
        return *se.last().unwrap();
    }
    let idx = e.partition_point(|&v| v < x).saturating_sub(1).min(e.len() - 2);
    let (x0, x1) = (e[idx], e[idx + 1]);
    let (y0, y1) = (se[idx], se[idx + 1]);
    let t = ((x / x0).ln()) / ((x1 / x0).ln());
    (y0.ln() + t * (y1.ln() - y0.ln())).exp()
}

/// Per-(projectile, material) stopping-power interpolator, `eV/nm`.
pub struct ElectronicStopping {
    interp: LogInterp,
}

impl ElectronicStopping {
    /// Wrap an already-built `Se(E)` table, for callers (or tests) that
    /// precompute the combined stopping curve themselves.
    pub fn from_precomputed(grid: CorteoGrid, se: Vec<f32>) -> Self {
        Self { interp: LogInterp::new(grid, &se) }
    }

    /// Bragg-mix per-element stopping data into one material interpolator.
    /// `0.1` converts from `eV*1e-15*at^-1*cm^2` to `eV/nm` given `density`
    /// in `at/nm^3`.
    pub fn build(source: &dyn StoppingSource, z1: u8, material: &Material, atoms_z: &[u8]) -> Self {
        let grid = dedx_grid();
        let mut combined = vec![0f32; grid.len()];
        for (atom_id, &z2) in material.atom_ids.iter().zip(atoms_z.iter()) {
            let x_j = material.fraction_of(*atom_id);
            if x_j <= 0.0 {
                continue;
            }
            let (e, se) = source.se_table(z1, z2);
            let resampled = resample_onto_grid(&grid, &e, &se);
            for (c, s) in combined.iter_mut().zip(resampled.iter()) {
                *c += x_j * material.density * s * 0.1;
            }
        }
        Self { interp: LogInterp::new(grid, &combined) }
    }

    pub fn se(&self, e: f32) -> f32 {
        self.interp.eval(e)
    }
}

/// Per-(projectile, material) straggling interpolator, `eV/nm^(1/2)`.
pub struct StragglingInterpolator {
    interp: LogInterp,
}

impl StragglingInterpolator {
    /// Bragg-mix the *squared* per-element straggling coefficients, divide
    /// by the atomic radius, then take the square root.
    pub fn build(source: &dyn StoppingSource, z1: u8, material: &Material, atoms_z: &[u8]) -> Self {
        let grid = dedx_grid();
        let mut combined_sq = vec![0f32; grid.len()];
        let rat = material.atomic_radius();
        for (atom_id, &z2) in material.atom_ids.iter().zip(atoms_z.iter()) {
            let x_j = material.fraction_of(*atom_id);
            if x_j <= 0.0 {
                continue;
            }
            let (e, omega) = source.straggling_table(z1, z2);
            let resampled = resample_onto_grid(&grid, &e, &omega);
            for (c, o) in combined_sq.iter_mut().zip(resampled.iter()) {
                *c += x_j * o * o;
            }
        }
        let combined: Vec<f32> = combined_sq.iter().map(|v| (v / rat).sqrt()).collect();
        Self { interp: LogInterp::new(grid, &combined) }
    }

    pub fn omega(&self, e: f32) -> f32 {
        self.interp.eval(e)
    }
}

/// Apply one flight-path segment's electronic energy loss, with optional
/// straggling. Returns the new energy, clamped so the ion never goes
/// non-positive.
pub fn apply_stopping<R: rand::Rng + ?Sized>(
    stopping: &ElectronicStopping,
    straggling: Option<&StragglingInterpolator>,
    e: f32,
    dx: f32,
    rng: &mut R,
) -> f32 {
    let mut d_e = dx * stopping.se(e);
    if let Some(strag) = straggling {
        let g = gaussian(rng);
        d_e += strag.omega(e) * g * dx.sqrt();
    }
    if d_e > e {
        let delta = (1e-3_f32).min(e / 2.0);
        e - delta
    } else {
        e - d_e
    }
}
