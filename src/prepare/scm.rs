//! SCM Preparation State Machine
//!
//! Drives persistent memory region and namespace creation (or removal)
//! through an [`ScmPreparer`] backend. Every backend call reports the
//! current state and the machine reacts to it exactly once:
//!
//! ```text
//! create:  consent ─► prepare ─┬─ NoModules ───────────► no modules fault
//!                              ├─ NoRegions ─┬─ reboot ─► notice
//!                              │             └─────────► failed to create regions
//!                              ├─ NotInterleaved ──────► unexpected state
//!                              ├─ FreeCapacity ─► prepare ─► namespace check
//!                              └─ NoFreeCapacity ──────► namespace check
//!
//! reset:   consent ─► prepare ─┬─ NoRegions ─┬─ reboot ─► notice
//!                              │             └─────────► reset successful
//!                              └─ anything else ───────► unexpected state
//! ```

use crate::domain::ports::{
    ScmNamespace, ScmPrepareRequest, ScmPrepareResponse, ScmPreparerRef, ScmState,
};
use crate::error::{Error, Result};
use crate::prepare::consent::Consent;
use crate::prepare::diagnostics::DiagnosticSet;
use crate::prepare::render::render_namespaces;
use crate::prepare::request::PreparationRequest;
use tracing::{debug, info};

/// Notice logged when regions only take effect after a reboot
pub const SCM_MSG_REBOOT_REQUIRED: &str =
    "reboot required to process new SCM memory allocation goals";

/// Notice logged when regions were removed
pub const SCM_MSG_RESET_SUCCESSFUL: &str = "SCM reset successful";

const REGION_CREATE_PROMPT: &str = "Memory allocation goals for SCM will be changed and \
    namespaces created, existing data may be lost and a reboot may be required. \
    Are you sure you want to continue?";

const REGION_REMOVE_PROMPT: &str = "Memory allocation goals for SCM will be changed and \
    all namespaces and regions will be destroyed, a reboot may be required. \
    Are you sure you want to continue?";

// =============================================================================
// Notices
// =============================================================================

/// Operator-facing outcome of a preparation step that is not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Changes are pending until the host reboots
    RebootRequired,
    /// Regions were removed
    ResetSuccessful,
    /// Namespaces are in place and usable
    NamespacesCreated(Vec<ScmNamespace>),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::RebootRequired => write!(f, "{}", SCM_MSG_REBOOT_REQUIRED),
            Notice::ResetSuccessful => write!(f, "{}", SCM_MSG_RESET_SUCCESSFUL),
            Notice::NamespacesCreated(namespaces) => {
                write!(f, "SCM namespaces:\n{}", render_namespaces(namespaces))
            }
        }
    }
}

/// What one SCM run produced
#[derive(Debug, Default)]
pub struct ScmReport {
    pub notices: Vec<Notice>,
    pub diagnostics: DiagnosticSet,
}

// =============================================================================
// State Machine
// =============================================================================

/// Prepares persistent memory through an SCM backend
pub struct ScmPreparation {
    backend: ScmPreparerRef,
    consent: Consent,
}

impl ScmPreparation {
    pub fn new(backend: ScmPreparerRef, consent: Consent) -> Self {
        Self { backend, consent }
    }

    /// Run one create or reset pass.
    ///
    /// Only request validation fails the call; everything the backend reports
    /// lands in the returned diagnostics.
    pub async fn run(&self, request: &PreparationRequest) -> Result<ScmReport> {
        let outcome = if request.reset {
            self.reset().await
        } else {
            request.validate_namespace_count()?;
            self.create(request.namespaces_per_socket).await
        };

        let mut report = ScmReport::default();
        match outcome {
            Ok(notice) => {
                info!("{}", notice);
                report.notices.push(notice);
            }
            Err(err) => {
                debug!("SCM preparation diagnostic: {}", err);
                report.diagnostics.push(err);
            }
        }

        Ok(report)
    }

    async fn create(&self, namespaces_per_socket: u32) -> Result<Notice> {
        if !self.consent.obtain(REGION_CREATE_PROMPT)? {
            return Err(Error::ConsentNotGiven);
        }

        let request = ScmPrepareRequest {
            reset: false,
            namespaces_per_socket,
        };

        let resp = self.call(request).await?;
        match resp.state {
            ScmState::NoModules => Err(Error::NoScmModules),
            ScmState::NoRegions if resp.reboot_required => Ok(Notice::RebootRequired),
            ScmState::NoRegions => Err(Error::RegionsNotCreated),
            // Non-interleaved regions are rejected by the backend itself
            ScmState::NotInterleaved => Err(Error::UnexpectedScmState(resp.state)),
            ScmState::FreeCapacity => {
                let resp = self.call(request).await?;
                namespaces_outcome(resp)
            }
            ScmState::NoFreeCapacity => namespaces_outcome(resp),
        }
    }

    async fn reset(&self) -> Result<Notice> {
        if !self.consent.obtain(REGION_REMOVE_PROMPT)? {
            return Err(Error::ConsentNotGiven);
        }

        let resp = self
            .call(ScmPrepareRequest {
                reset: true,
                namespaces_per_socket: 0,
            })
            .await?;

        match resp.state {
            ScmState::NoRegions if resp.reboot_required => Ok(Notice::RebootRequired),
            ScmState::NoRegions => Ok(Notice::ResetSuccessful),
            state => Err(Error::UnexpectedScmState(state)),
        }
    }

    async fn call(&self, request: ScmPrepareRequest) -> Result<ScmPrepareResponse> {
        debug!(
            "calling SCM backend {}: {:?}",
            self.backend.backend_name(),
            request
        );
        let resp = self.backend.prepare(request).await?;
        debug!(
            "SCM backend reported state '{}' (reboot required: {}, {} namespaces)",
            resp.state,
            resp.reboot_required,
            resp.namespaces.len()
        );
        Ok(resp)
    }
}

/// Interpret the state reported once namespaces should exist
fn namespaces_outcome(resp: ScmPrepareResponse) -> Result<Notice> {
    match resp.state {
        ScmState::FreeCapacity => Err(Error::NamespacesNotCreated),
        ScmState::NoFreeCapacity if resp.namespaces.is_empty() => Err(Error::NamespacesNotFound),
        ScmState::NoFreeCapacity => Ok(Notice::NamespacesCreated(resp.namespaces)),
        state => Err(Error::UnexpectedScmState(state)),
    }
}
