//! Live display module
//!
//! Shows the performance monitor's latest sample as terminal gauges,
//! or as plain lines when stderr is not a terminal.

mod reporter;

pub use reporter::*;
