//! Core types: errors, configuration, snapshot locations.

pub mod config;
pub mod errors;
pub mod paths;
