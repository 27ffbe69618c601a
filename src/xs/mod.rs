//! Screened-Coulomb scattering: per-screening CMS kinematics, precomputed
//! `(epsilon, s)` tables, and per-species-pair lab-frame calculators.

mod cms;
mod screening;
mod tables;

pub use cms::sn;
pub use screening::Screening;
pub use tables::{LabScatteringCalc, ScatteringTable};
