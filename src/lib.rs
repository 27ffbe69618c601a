pub mod arrays;
pub mod cascade;
pub mod config;
pub mod dedx;
pub mod driver;
pub mod error;
pub mod event_stream;
pub mod flight_path;
pub mod geometry;
pub mod ion;
pub mod numeric;
pub mod nrt;
pub mod random_vars;
pub mod source;
pub mod tally;
pub mod target;
pub mod transport;
pub mod units;
pub mod xs;
