#![doc = include_str!("../README.md")]

//! Loris intermediate representation.
//!
//! This crate defines the integer transition system the engine rewrites:
//! interned variables, polynomial expressions, guard atoms, rules with
//! simultaneous updates, the location/rule multigraph, and the complexity
//! lattice the final result is reported in.

pub mod complexity;
pub mod expr;
pub mod its;
pub mod rel;
pub mod rule;
pub mod variables;

pub use complexity::Complexity;
pub use expr::{Expr, Numeric, Subs};
pub use its::{ItsProblem, LocationId, RuleId};
pub use rel::{CmpOp, Guard, Rel};
pub use rule::{Rule, RuleRhs, Update};
pub use variables::{VarId, VariableManager};
