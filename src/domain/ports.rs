//! Domain Ports - Backend trait definitions for storage preparation
//!
//! These traits define the boundaries between the preparation workflow and
//! the tooling that actually reconfigures hardware. Adapters in
//! [`crate::hardware`] implement them.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Separator used between addresses in PCI allow/block lists
pub const PCI_ADDR_SEP: &str = ",";

// =============================================================================
// SCM Types
// =============================================================================

/// State of the SCM subsystem as reported after a backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScmState {
    /// No persistent memory modules installed
    NoModules,
    /// Modules present but no regions configured
    NoRegions,
    /// Regions exist but are not interleaved
    NotInterleaved,
    /// Regions exist with capacity not yet consumed by namespaces
    FreeCapacity,
    /// All region capacity is consumed by namespaces
    NoFreeCapacity,
}

impl std::fmt::Display for ScmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScmState::NoModules => write!(f, "no modules"),
            ScmState::NoRegions => write!(f, "no regions"),
            ScmState::NotInterleaved => write!(f, "regions not interleaved"),
            ScmState::FreeCapacity => write!(f, "free capacity"),
            ScmState::NoFreeCapacity => write!(f, "no free capacity"),
        }
    }
}

/// A persistent memory namespace exposed as a block device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmNamespace {
    /// Namespace UUID
    #[serde(default)]
    pub uuid: String,
    /// Block device name (e.g., pmem0)
    #[serde(rename = "blockdev")]
    pub block_device: String,
    /// Namespace device name (e.g., namespace0.0)
    #[serde(rename = "dev")]
    pub name: String,
    /// Socket (NUMA node) the namespace lives on
    #[serde(rename = "numa_node", default)]
    pub socket_id: u32,
    /// Size in bytes
    #[serde(rename = "size")]
    pub size_bytes: u64,
}

impl ScmNamespace {
    /// Device path of the namespace's block device
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.block_device)
    }
}

/// Request to prepare or reset SCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmPrepareRequest {
    /// Remove regions instead of creating them
    pub reset: bool,
    /// Namespaces to create on each socket
    pub namespaces_per_socket: u32,
}

/// Outcome of an SCM backend call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmPrepareResponse {
    /// State after the call
    pub state: ScmState,
    /// Whether a reboot is needed for the change to take effect
    pub reboot_required: bool,
    /// Namespaces present after the call
    pub namespaces: Vec<ScmNamespace>,
}

impl ScmPrepareResponse {
    pub fn new(state: ScmState) -> Self {
        Self {
            state,
            reboot_required: false,
            namespaces: Vec::new(),
        }
    }

    pub fn with_reboot_required(mut self) -> Self {
        self.reboot_required = true;
        self
    }

    pub fn with_namespaces(mut self, namespaces: Vec<ScmNamespace>) -> Self {
        self.namespaces = namespaces;
        self
    }
}

// =============================================================================
// Bdev Types
// =============================================================================

/// Request to prepare or reset NVMe devices for user-space access
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdevPrepareRequest {
    /// Number of huge pages to allocate
    pub huge_page_count: u32,
    /// Owner of the huge pages and device files
    pub target_user: String,
    /// PCI addresses to include, comma separated
    pub pci_allow_list: String,
    /// PCI addresses to exclude, comma separated
    pub pci_block_list: String,
    /// Detect VMD controllers automatically
    pub enable_vmd: bool,
    /// Reverse a previous preparation
    pub reset: bool,
}

/// Outcome of a bdev backend call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdevPrepareResponse {
    /// Whether VMD controllers were prepared
    pub vmd_detected: bool,
}

// =============================================================================
// Ports
// =============================================================================

/// Port for persistent memory preparation
#[async_trait]
pub trait ScmPreparer: Send + Sync {
    /// Create regions/namespaces, or remove them when `request.reset` is set
    async fn prepare(&self, request: ScmPrepareRequest) -> Result<ScmPrepareResponse>;

    /// Get backend name
    fn backend_name(&self) -> &str;
}

/// Port for NVMe block device preparation
#[async_trait]
pub trait BdevPreparer: Send + Sync {
    /// Bind devices and allocate huge pages
    async fn prepare(&self, request: BdevPrepareRequest) -> Result<BdevPrepareResponse>;

    /// Reverse a previous preparation
    async fn reset(&self, request: BdevPrepareRequest) -> Result<BdevPrepareResponse>;

    /// Get backend name
    fn backend_name(&self) -> &str;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ScmPreparerRef = Arc<dyn ScmPreparer>;
pub type BdevPreparerRef = Arc<dyn BdevPreparer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scm_state_display() {
        assert_eq!(format!("{}", ScmState::NoModules), "no modules");
        assert_eq!(format!("{}", ScmState::NotInterleaved), "regions not interleaved");
        assert_eq!(format!("{}", ScmState::NoFreeCapacity), "no free capacity");
    }

    #[test]
    fn test_namespace_from_ndctl_json() {
        let json = r#"{
            "dev": "namespace1.0",
            "mode": "fsdax",
            "map": "dev",
            "size": 3183575302144,
            "uuid": "842fc847-28e0-4bb6-8dfc-d24afdba1528",
            "blockdev": "pmem1",
            "numa_node": 1
        }"#;

        let ns: ScmNamespace = serde_json::from_str(json).unwrap();
        assert_eq!(ns.name, "namespace1.0");
        assert_eq!(ns.block_device, "pmem1");
        assert_eq!(ns.socket_id, 1);
        assert_eq!(ns.size_bytes, 3183575302144);
        assert_eq!(ns.device_path(), "/dev/pmem1");
    }

    #[test]
    fn test_response_builders() {
        let resp = ScmPrepareResponse::new(ScmState::NoRegions).with_reboot_required();
        assert!(resp.reboot_required);
        assert!(resp.namespaces.is_empty());
    }
}
