#![doc = include_str!("../README.md")]

pub mod backends;
pub mod encode;
pub mod oracle;
pub mod solver;
pub mod sorts;
pub mod terms;

pub use oracle::SmtOracle;
pub use solver::{Model, ModelValue, SatResult, SmtSolver};
pub use sorts::SmtSort;
pub use terms::SmtTerm;
