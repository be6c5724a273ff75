pub mod aura;
pub mod clock;
pub mod config;
pub mod core;
pub mod logging;

pub use aura::{AuraConfig, AuraEngine};
pub use clock::{Clock, ManualClock, SystemClock};
