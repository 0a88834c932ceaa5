//! Core types: errors, configuration, the problem model.

pub mod config;
pub mod errors;
pub mod problem;
