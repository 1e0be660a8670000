//! Preparation Orchestrator
//!
//! Coordinates one preparation invocation:
//! - Scope validation before any backend is touched
//! - SCM state machine, when in scope
//! - NVMe driver, when in scope, regardless of how SCM fared
//! - Selection of the final command error

use crate::domain::ports::{
    BdevPrepareResponse, BdevPreparer, BdevPreparerRef, ScmPreparer, ScmPreparerRef,
};
use crate::error::Result;
use crate::prepare::consent::{Consent, ConsentGate, ConsentGateRef};
use crate::prepare::diagnostics::DiagnosticSet;
use crate::prepare::nvme::NvmePreparation;
use crate::prepare::request::{PrepareScope, PreparationRequest};
use crate::prepare::scm::{Notice, ScmPreparation};
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Report
// =============================================================================

/// Everything one invocation produced
#[derive(Debug)]
pub struct PrepareReport {
    pub scope: PrepareScope,
    pub notices: Vec<Notice>,
    pub scm_diagnostics: DiagnosticSet,
    /// `None` when NVMe was out of scope
    pub nvme_result: Option<Result<BdevPrepareResponse>>,
}

impl PrepareReport {
    /// Collapse into the command's result.
    ///
    /// A failed NVMe step is reported verbatim and SCM diagnostics are
    /// dropped; otherwise the SCM diagnostics are concatenated.
    pub fn into_result(self) -> Result<Vec<Notice>> {
        if let Some(Err(err)) = self.nvme_result {
            if !self.scm_diagnostics.is_empty() {
                debug!(
                    "dropping {} SCM diagnostic(s) in favour of NVMe error",
                    self.scm_diagnostics.len()
                );
            }
            return Err(err);
        }

        self.scm_diagnostics.into_result()?;
        Ok(self.notices)
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs SCM and NVMe preparation for a request
pub struct Orchestrator {
    scm_backend: ScmPreparerRef,
    bdev_backend: BdevPreparerRef,
    consent_gate: ConsentGateRef,
}

impl Orchestrator {
    pub fn new(
        scm_backend: ScmPreparerRef,
        bdev_backend: BdevPreparerRef,
        consent_gate: ConsentGateRef,
    ) -> Arc<Self> {
        Arc::new(Self {
            scm_backend,
            bdev_backend,
            consent_gate,
        })
    }

    /// Build from concrete backends
    pub fn with_backends<S, B, C>(scm: S, bdev: B, gate: C) -> Arc<Self>
    where
        S: ScmPreparer + 'static,
        B: BdevPreparer + 'static,
        C: ConsentGate + 'static,
    {
        Self::new(Arc::new(scm), Arc::new(bdev), Arc::new(gate))
    }

    /// Run every subsystem in scope and collect their outcomes
    pub async fn prepare(&self, request: &PreparationRequest) -> Result<PrepareReport> {
        let scope = request.scope()?;
        info!(
            "Preparing storage: scope={}, reset={}, force={}",
            scope, request.reset, request.force
        );

        let mut report = PrepareReport {
            scope,
            notices: Vec::new(),
            scm_diagnostics: DiagnosticSet::new(),
            nvme_result: None,
        };

        if scope.runs_scm() {
            let consent = Consent::new(request.force, self.consent_gate.clone());
            let scm = ScmPreparation::new(self.scm_backend.clone(), consent);
            let scm_report = scm.run(request).await?;

            report.notices.extend(scm_report.notices);
            report.scm_diagnostics.merge(scm_report.diagnostics);
        }

        if scope.runs_nvme() {
            let nvme = NvmePreparation::new(self.bdev_backend.clone());
            report.nvme_result = Some(nvme.run(request).await);
        }

        Ok(report)
    }

    /// Run a request to completion and return the command's result
    pub async fn run(&self, request: &PreparationRequest) -> Result<Vec<Notice>> {
        self.prepare(request).await?.into_result()
    }
}
