//! NVMe Preparation Driver
//!
//! Translates a preparation request into exactly one bdev backend call.
//! The backend's answer is binary, so its error is returned untouched.

use crate::domain::ports::{BdevPrepareRequest, BdevPrepareResponse, BdevPreparerRef};
use crate::error::{Error, Result};
use crate::prepare::request::PreparationRequest;
use nix::unistd::{getuid, User};
use tracing::{debug, info};

/// Login name of the user running this process
pub fn current_username() -> Result<String> {
    let uid = getuid();
    match User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        Ok(None) => Err(Error::UserResolution(format!("no passwd entry for uid {}", uid))),
        Err(e) => Err(Error::UserResolution(format!("lookup of uid {} failed: {}", uid, e))),
    }
}

/// Prepares NVMe devices through a bdev backend
pub struct NvmePreparation {
    backend: BdevPreparerRef,
}

impl NvmePreparation {
    pub fn new(backend: BdevPreparerRef) -> Self {
        Self { backend }
    }

    /// Build the backend request, defaulting the target user to the caller
    pub fn build_request(request: &PreparationRequest) -> Result<BdevPrepareRequest> {
        let target_user = match request.target_user.as_deref() {
            Some(user) if !user.is_empty() => user.to_string(),
            _ => current_username()?,
        };

        Ok(BdevPrepareRequest {
            huge_page_count: request.huge_page_count,
            target_user,
            pci_allow_list: request.pci_allow_list.clone(),
            pci_block_list: request.pci_block_list.clone(),
            // Always set for local preparation so VMD controllers are detected
            enable_vmd: true,
            reset: request.reset,
        })
    }

    /// Prepare or reset devices with a single backend call
    pub async fn run(&self, request: &PreparationRequest) -> Result<BdevPrepareResponse> {
        let req = Self::build_request(request)?;
        debug!(
            "calling bdev backend {}: {:?}",
            self.backend.backend_name(),
            req
        );

        let resp = if req.reset {
            self.backend.reset(req).await?
        } else {
            self.backend.prepare(req).await?
        };

        if resp.vmd_detected {
            info!("VMD controllers detected and prepared");
        }
        Ok(resp)
    }
}
