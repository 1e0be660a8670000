//! Hardware Module
//!
//! Backend adapters that carry out preparation on the host (ipmctl/ndctl
//! for persistent memory, the SPDK setup script for NVMe) and in-memory
//! doubles of both.

pub mod command;
pub mod mock;
pub mod ndctl;
pub mod spdk;

pub use command::*;
pub use mock::*;
pub use ndctl::*;
pub use spdk::*;

use crate::error::{Error, Result};
use std::path::Path;

/// Locations of the tooling used by the real backends
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub ipmctl: String,
    pub ndctl: String,
    pub spdk_setup_script: String,
    pub lspci: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ipmctl: "ipmctl".to_string(),
            ndctl: "ndctl".to_string(),
            spdk_setup_script: "/usr/share/spdk/scripts/setup.sh".to_string(),
            lspci: "lspci".to_string(),
        }
    }
}

impl BackendConfig {
    /// Reject a setup script path that is not an existing file
    pub fn validate(&self) -> Result<()> {
        if !Path::new(&self.spdk_setup_script).is_file() {
            return Err(Error::Configuration(format!(
                "SPDK setup script not found: {}",
                self.spdk_setup_script
            )));
        }
        Ok(())
    }

    /// Build both host backends sharing one command runner
    pub fn build(&self, runner: CommandRunnerRef) -> (NdctlScmBackend, SpdkBdevBackend) {
        (
            NdctlScmBackend::new(&self.ipmctl, &self.ndctl, runner.clone()),
            SpdkBdevBackend::new(&self.spdk_setup_script, &self.lspci, runner),
        )
    }
}
