//! Wire models for device telemetry: state snapshots, wifi scan results, and
//! per-band phy capabilities.

mod capabilities;
mod state;
mod wifiscan;

pub use capabilities::*;
pub use state::*;
pub use wifiscan::*;
