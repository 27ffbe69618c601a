//! Flight-path sampling: either a constant path length or a variable,
//! energy-dependent mean free path derived from a minimum useful recoil
//! energy per target atom.

use crate::dedx::ElectronicStopping;
use crate::numeric::{CorteoGrid, LinInterp};
use crate::random_vars;
use crate::target::Material;
use crate::units::{DEDX_EMAX, DEDX_EMIN};
use crate::xs::LabScatteringCalc;
use rand::Rng;

#[derive(Clone, Copy, Debug)]
pub struct FlightPathSample {
    pub dx: f32,
    pub impact_parameter: f32,
    pub collide: bool,
    /// Azimuth direction cosine/sine, reused from the rejection sample.
    pub azimuth: (f32, f32),
}

#[derive(Clone, Copy, Debug)]
pub enum FlightPathMode {
    Constant { ell0: f32 },
    Variable { max_rel_eloss: f32, t_min: f32, mfp_lo: f32, mfp_hi: f32 },
}

/// Per-(projectile atom, material) precomputed tables for the variable mode.
pub struct FlightPathTables {
    mode: FlightPathMode,
    density: f32,
    mfp: LinInterp,
    pmax: LinInterp,
    dx_max: LinInterp,
    umin: LinInterp,
}

fn fp_grid() -> CorteoGrid {
    CorteoGrid::new(4, DEDX_EMIN, DEDX_EMAX)
}

impl FlightPathTables {
    /// Build the tables for one (projectile, material, each target-atom
    /// scattering calc) combination.
    pub fn build(
        mode: FlightPathMode,
        material: &Material,
        scatter_calcs: &[(u16, &LabScatteringCalc)],
        theta_min: f32,
        stopping: &ElectronicStopping,
    ) -> Self {
        let grid = fp_grid();
        let density = material.density;

        let (mfp, pmax, dx_max, umin) = match mode {
            FlightPathMode::Constant { ell0 } => {
                let rat = material.atomic_radius();
                let ell = ell0 * rat;
                let p = (1.0 / (std::f32::consts::PI * ell * density)).sqrt();
                let n = grid.len();
                (vec![ell; n], vec![p; n], vec![f32::INFINITY; n], vec![0.0; n])
            }
            FlightPathMode::Variable { max_rel_eloss, t_min, mfp_lo, mfp_hi } => {
                let rat = material.atomic_radius();
                let n = grid.len();
                let mut mfp = vec![0f32; n];
                let mut pmax = vec![0f32; n];
                let mut dx_max = vec![0f32; n];
                let mut umin = vec![0f32; n];
                for k in 0..n {
                    let e = grid.value_at(k as i32);
                    let mut p_max_sq = 0.0f32;
                    for (atom_id, calc) in scatter_calcs {
                        let x_i = material.fraction_of(*atom_id);
                        if x_i <= 0.0 {
                            continue;
                        }
                        let t0_theta = calc.gamma * e * (theta_min / 2.0 * (1.0 + calc.mass_ratio)).sin().powi(2);
                        let t0 = t_min.min(t0_theta);
                        let p_i = calc.find_p(e, t0);
                        p_max_sq += x_i * p_i * p_i;
                    }
                    let mut p = p_max_sq.sqrt();
                    let mut ell = 1.0 / (std::f32::consts::PI * density * p_max_sq.max(1e-30));
                    let ell_lo = mfp_lo * rat;
                    let ell_hi = mfp_hi * rat;
                    if ell < ell_lo {
                        ell = ell_lo;
                        p = (1.0 / (std::f32::consts::PI * ell * density)).sqrt();
                    } else if ell > ell_hi {
                        ell = ell_hi;
                        p = (1.0 / (std::f32::consts::PI * ell * density)).sqrt();
                    }
                    let se = stopping.se(e);
                    let dxmax = if se > 0.0 { max_rel_eloss * e / se } else { f32::INFINITY };
                    let um = (-dxmax / ell).exp();
                    mfp[k] = ell;
                    pmax[k] = p;
                    dx_max[k] = dxmax;
                    umin[k] = um;
                }
                (mfp, pmax, dx_max, umin)
            }
        };

        Self {
            mode,
            density,
            mfp: LinInterp::new(grid.clone(), &mfp),
            pmax: LinInterp::new(grid.clone(), &pmax),
            dx_max: LinInterp::new(grid.clone(), &dx_max),
            umin: LinInterp::new(grid, &umin),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, e: f32, rng: &mut R) -> FlightPathSample {
        let (nx, ny, u) = random_vars::random_azimuth_dir_norm(rng);
        match self.mode {
            FlightPathMode::Constant { .. } => FlightPathSample {
                dx: self.mfp.eval(e),
                impact_parameter: self.pmax.eval(e) * u.sqrt(),
                collide: true,
                azimuth: (nx, ny),
            },
            FlightPathMode::Variable { .. } => {
                let umin = self.umin.eval(e);
                if u < umin {
                    FlightPathSample {
                        dx: self.dx_max.eval(e),
                        impact_parameter: 0.0,
                        collide: false,
                        azimuth: (nx, ny),
                    }
                } else {
                    let v = random_vars::u01s_lopen(rng);
                    FlightPathSample {
                        dx: self.mfp.eval(e) * (-u.ln()),
                        impact_parameter: self.pmax.eval(e) * v.sqrt(),
                        collide: true,
                        azimuth: (nx, ny),
                    }
                }
            }
        }
    }

    pub fn density(&self) -> f32 {
        self.density
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_mode_always_collides() {
        let mat = crate::target::Material {
            name: "Si".into(),
            atom_ids: vec![1],
            fractions: vec![1.0],
            density: 50.0,
            color: [0.5, 0.5, 0.5],
        };
        let grid = fp_grid();
        let se_flat = vec![1.0f32; grid.len()];
        let stopping = crate::dedx::ElectronicStopping::from_precomputed(grid.clone(), se_flat);
        let tables = FlightPathTables::build(
            FlightPathMode::Constant { ell0: 1.0 },
            &mat,
            &[],
            1e-3,
            &stopping,
        );
        use rand::SeedableRng;
        let mut rng = rand::rngs::SmallRng::seed_from_u64(7);
        for _ in 0..10 {
            let sample = tables.sample(1000.0, &mut rng);
            assert!(sample.collide);
            assert!(sample.dx > 0.0);
        }
    }
}
