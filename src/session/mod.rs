//! Command sessions layered on top of a bridge.

mod outcome;
mod runner;
mod state;

pub use outcome::*;
pub use runner::*;
pub use state::*;
