//! Utilities: configuration paths and logging

pub mod config_paths;
pub mod logger;
