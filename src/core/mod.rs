//! Core discovery logic
//!
//! Process table abstraction, instance discovery and the shared data model

pub mod discovery;
pub mod models;
pub mod probe;
