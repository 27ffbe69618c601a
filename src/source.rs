//! Ion-beam source: turns the configured energy/angular/spatial
//! distributions into a freshly sampled primary [`IonState`] entering the
//! target through its `z = origin.z` front surface.

use crate::config::{Distribution, DistributionKind, IonBeamConfig};
use crate::geometry::Grid;
use crate::ion::IonState;
use crate::random_vars::{gaussian, random_azimuth_dir_norm};
use rand::Rng;
use ultraviolet::Vec3;

fn sample<R: Rng + ?Sized>(d: &Distribution, rng: &mut R) -> f32 {
    match d.kind {
        DistributionKind::SingleValue => d.a,
        DistributionKind::Uniform => {
            let (lo, hi) = (d.a.min(d.b), d.a.max(d.b));
            if hi > lo {
                rng.random_range(lo..hi)
            } else {
                lo
            }
        }
        DistributionKind::Gaussian => d.a + d.b * gaussian(rng),
    }
}

/// Sample a new primary ion: energy from `energy_distribution`, a tilt off
/// the beam axis (`+z`) from `angular_distribution` (degrees) combined with
/// a uniform-random azimuth, and a radial offset in the entry plane from
/// `spatial_distribution` combined with its own uniform-random azimuth.
pub fn source_ion<R: Rng + ?Sized>(beam: &IonBeamConfig, grid: &Grid, atom_ref: u16, rng: &mut R) -> IonState {
    let energy = sample(&beam.energy_distribution, rng).max(0.0);

    let theta = sample(&beam.angular_distribution, rng).to_radians();
    let (cos_phi, sin_phi, _) = random_azimuth_dir_norm(rng);
    let dir = Vec3::new(theta.sin() * cos_phi, theta.sin() * sin_phi, theta.cos()).normalized();

    let r = sample(&beam.spatial_distribution, rng);
    let (ox, oy, _) = random_azimuth_dir_norm(rng);
    let origin = grid.origin();
    let pos = Vec3::new(origin.x + r * ox, origin.y + r * oy, origin.z);

    let cell_index = grid.pos2cell(pos);
    let cell_id = grid.flat_index(cell_index);
    IonState::new(pos, dir, energy, cell_index, cell_id, atom_ref)
}
