//! Quasi-log (Corteo) indexing, 1-D interpolators and 2-D bilinear/bilog
//! table lookups over IEEE-754 floating point bit layout.
//!
//! These grids back every wide table in the transport loop: scattering
//! angles, electronic stopping, straggling and flight paths all index into
//! one of these rather than calling `log`/`exp` per lookup.

mod corteo;
mod interp;
mod table2d;

pub use corteo::CorteoGrid;
pub use interp::{LinInterp, LogInterp};
pub use table2d::Table2D;
