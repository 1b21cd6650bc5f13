//! Guardian safety system: motion scoring, sonification, and the hazard
//! monitor loop.

pub mod monitor;
pub mod motion;
pub mod sonifier;

pub use monitor::{HazardMonitor, TICK_INTERVAL};
pub use motion::{HazardSample, HazardTier, classify, motion_score};
pub use sonifier::Sonifier;
