//! Data model shared by discovery, the launcher and the CLI

use crate::core::probe::ProcessStatus;
use serde::{Deserialize, Serialize};

/// A running solver process exposing a gRPC endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceDescriptor {
    pub pid: u32,
    pub name: String,
    pub status: ProcessStatus,
    /// Value of the `-port` switch
    pub port: u16,
    #[serde(default)]
    pub cmdline: Vec<String>,
    /// Working directory, empty when it could not be read
    #[serde(default)]
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// At least two descendant processes: the server rather than a helper
    pub is_instance: bool,
}

impl InstanceDescriptor {
    pub fn new(pid: u32, name: impl Into<String>, status: ProcessStatus, port: u16) -> Self {
        Self {
            pid,
            name: name.into(),
            status,
            port,
            cmdline: Vec::new(),
            cwd: String::new(),
            owner: None,
            is_instance: false,
        }
    }

    pub fn with_cmdline(mut self, cmdline: Vec<String>) -> Self {
        self.cmdline = cmdline;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_is_instance(mut self, is_instance: bool) -> Self {
        self.is_instance = is_instance;
        self
    }

    pub fn command_line(&self) -> String {
        self.cmdline.join(" ")
    }
}

/// State of a local TCP port
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortStatus {
    pub port: u16,
    /// Nothing listens on the port and it can be bound
    pub available: bool,
    /// The listener is a solver gRPC process
    pub used_by_solver: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl PortStatus {
    pub fn free(port: u16, available: bool) -> Self {
        Self {
            port,
            available,
            used_by_solver: false,
            pid: None,
        }
    }

    pub fn taken(port: u16, pid: u32, used_by_solver: bool) -> Self {
        Self {
            port,
            available: false,
            used_by_solver,
            pid: Some(pid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_optional_fields() {
        let descriptor = InstanceDescriptor::new(10, "ansys.e", ProcessStatus::Sleeping, 50052)
            .with_cmdline(vec!["ansys.e".into(), "-grpc".into()])
            .with_cwd("/work")
            .with_is_instance(true);

        assert_eq!(descriptor.command_line(), "ansys.e -grpc");
        assert_eq!(descriptor.cwd, "/work");
        assert!(descriptor.is_instance);
        assert!(descriptor.owner.is_none());
    }

    #[test]
    fn descriptor_json_omits_missing_owner() {
        let descriptor = InstanceDescriptor::new(10, "mapdl", ProcessStatus::Running, 50053);
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["port"], 50053);
        assert_eq!(json["status"], "running");
        assert!(json.get("owner").is_none());
    }

    #[test]
    fn port_status_constructors() {
        let free = PortStatus::free(50052, true);
        assert!(free.available);
        assert!(free.pid.is_none());

        let taken = PortStatus::taken(50052, 99, true);
        assert!(!taken.available);
        assert!(taken.used_by_solver);
        assert_eq!(taken.pid, Some(99));
    }
}
