//! # tally-core
//! Foundation types, constants, and collaborator traits for the Tally
//! accounting engine.

pub mod constants;
pub mod error;
pub mod fees;
pub mod reward;
pub mod traits;
pub mod types;
