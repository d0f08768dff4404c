//! MAPDL Warden Library
//!
//! Discovery of local MAPDL gRPC solver instances, plus the launcher, port
//! probing and HPC credential helpers behind the `mapdl-warden` CLI.

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod hpc;
pub mod launcher;
pub mod network;
pub mod platform;
pub mod utils;

// Re-export commonly used types for convenience
pub use core::discovery::{
    find_instance_by_port, list_instances, Discovery, OwnershipPolicy, SolverMatcher,
    SolverProcess,
};
pub use core::models::*;
pub use core::probe::{ProbeError, ProbeResult, ProcessEntry, ProcessStatus, ProcessTable};
pub use error::{WardenError, WardenResult};
