pub mod classifier;
pub mod config;
pub mod context;
pub mod engine;
pub mod history;
pub mod modeling;
pub mod persistence;
pub mod predictor;
pub mod types;

pub use config::{AuraConfig, ConfigError};
pub use engine::AuraEngine;
