//! Command-line entry points

pub mod commands;

pub use commands::TaskChoice;
