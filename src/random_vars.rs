//! Random-variable helpers shared by the flight-path sampler and the
//! electronic-stopping straggling term: azimuth-by-rejection, uniform-open
//! intervals, and the standard normal.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Sample an azimuth direction `(cos(phi), sin(phi))` by rejection from the
/// unit disk, returning the direction together with `u = 1 - r^2`, which is
/// itself a free `Uniform(0,1)` sample — reused by the flight-path sampler
/// so it doesn't need a second draw.
pub fn random_azimuth_dir_norm<R: Rng + ?Sized>(rng: &mut R) -> (f32, f32, f32) {
    loop {
        let x: f32 = rng.random_range(-1.0..1.0);
        let y: f32 = rng.random_range(-1.0..1.0);
        let r2 = x * x + y * y;
        if r2 < 1.0 && r2 > 0.0 {
            let r = r2.sqrt();
            return (x / r, y / r, 1.0 - r2);
        }
    }
}

/// Uniform sample on the open interval `(0, 1)`.
pub fn u01s_open<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    loop {
        let u: f32 = rng.random();
        if u > 0.0 && u < 1.0 {
            return u;
        }
    }
}

/// Uniform sample on the left-open interval `(0, 1]`.
pub fn u01s_lopen<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    loop {
        let u: f32 = rng.random();
        if u > 0.0 {
            return u;
        }
    }
}

/// Standard normal sample, used by the straggling term.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    StandardNormal.sample(rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn azimuth_direction_is_normalized() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            let (nx, ny, u) = random_azimuth_dir_norm(&mut rng);
            let norm = (nx * nx + ny * ny).sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
            assert!(u > 0.0 && u < 1.0);
        }
    }

    #[test]
    fn open_interval_samples_never_hit_the_endpoints() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..1000 {
            let u = u01s_open(&mut rng);
            assert!(u > 0.0 && u < 1.0);
            let v = u01s_lopen(&mut rng);
            assert!(v > 0.0 && v <= 1.0);
        }
    }
}
