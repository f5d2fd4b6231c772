//! Rogue DPS simulator - a discrete-event combat engine for estimating
//! sustained melee damage output from a resolved gear/talent configuration.
//!
//! Trials are independent and reproducible: each gets its own RNG stream
//! derived from the master seed plus trial index.

pub mod ability;
pub mod aggregate;
pub mod buffs;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod resource;
pub mod stats;

pub use ability::*;
pub use aggregate::*;
pub use buffs::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use policy::*;
pub use resource::*;
pub use stats::*;
