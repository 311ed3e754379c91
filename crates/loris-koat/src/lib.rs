#![doc = include_str!("../README.md")]

pub mod ast;
pub mod errors;
pub mod lower;
pub mod parser;

pub use errors::ParseError;
pub use lower::{load_file, parse_problem};
pub use parser::parse;
