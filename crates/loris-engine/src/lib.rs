#![doc = include_str!("../README.md")]

pub mod accelerate;
pub mod analysis;
pub mod asymptotic;
pub mod chain;
pub mod config;
pub mod export;
pub mod meter;
pub mod preprocess;
pub mod proof;
pub mod prune;
pub mod recurrence;
pub mod result;
pub mod timing;

pub use analysis::{Analysis, AnalysisOutcome};
pub use config::AnalysisSettings;
pub use result::RuntimeResult;
