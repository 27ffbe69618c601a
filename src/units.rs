//! Physical unit definitions and conversions used throughout the transport core.
//!
//! Base units:
//! - Length: nanometre (nm)
//! - Energy: electronvolt (eV)
//! - Time: picosecond (ps)
//! - Mass: atomic mass unit (amu)
//! - Charge: elementary charge (e)

/// Nanometre in metres.
pub const NANOMETRE: f64 = 1.0e-9;
/// Picosecond in seconds.
pub const PICOSECOND: f64 = 1.0e-12;
/// Elementary charge in coulombs.
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;
/// Atomic mass unit in kilograms.
pub const AMU: f64 = 1.660_539_066_60e-27;

/// Coulomb's constant, `e^2` in eV*nm (Gaussian units: `k*e^2 = 1.43996 eV*nm`).
pub const E2: f32 = 1.439_964_5;

/// Conversion constant for the kinematic clock: `t += dx * sqrt(M) * C / sqrt(E)`.
///
/// Units: ps / (nm * sqrt(amu/eV)), i.e. ps * nm^-1 * eV^(1/2) when M is in amu.
pub const S_ERG_TO_TIME_CONST: f32 = 7.198_712e-2;

/// Bohr radius in nm, used in screening-length formulae.
pub const BOHR_RADIUS_NM: f32 = 0.052_917_721;

/// Lowest energy of the 4-bit dE/dx and flight-path grids, in eV (`2^4`).
pub const DEDX_EMIN: i32 = 4;
/// Highest energy exponent of the 4-bit dE/dx and flight-path grids (`2^30` eV).
pub const DEDX_EMAX: i32 = 30;
