//! In-memory backends
//!
//! Record every request they receive and answer with scripted outcomes.

use crate::domain::ports::{
    BdevPrepareRequest, BdevPrepareResponse, BdevPreparer, ScmNamespace, ScmPrepareRequest,
    ScmPrepareResponse, ScmPreparer, ScmState,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Build a namespace with values derived from `idx`
pub fn mock_namespace(idx: u32) -> ScmNamespace {
    ScmNamespace {
        uuid: format!("00000000-0000-0000-0000-{:012}", idx),
        block_device: format!("pmem{}", idx),
        name: format!("namespace{}.0", idx),
        socket_id: idx,
        size_bytes: 3_183_575_302_144,
    }
}

// =============================================================================
// SCM
// =============================================================================

/// Scripted behaviour of [`MockScmBackend`]
#[derive(Debug, Clone)]
pub struct MockScmConfig {
    /// Responses handed out in order; the last one repeats
    pub responses: Vec<ScmPrepareResponse>,
    /// Fail calls with this reason once `fail_after` calls have succeeded
    pub prepare_err: Option<String>,
    pub fail_after: usize,
}

impl Default for MockScmConfig {
    fn default() -> Self {
        Self::responding(ScmPrepareResponse::new(ScmState::NoModules))
    }
}

impl MockScmConfig {
    pub fn responding(resp: ScmPrepareResponse) -> Self {
        Self::sequence(vec![resp])
    }

    pub fn sequence(responses: Vec<ScmPrepareResponse>) -> Self {
        Self {
            responses,
            prepare_err: None,
            fail_after: 0,
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            responses: Vec::new(),
            prepare_err: Some(reason.into()),
            fail_after: 0,
        }
    }

    /// Answer with the scripted responses once each, then fail
    pub fn then_failing(self, reason: impl Into<String>) -> Self {
        Self {
            fail_after: self.responses.len(),
            prepare_err: Some(reason.into()),
            ..self
        }
    }
}

/// SCM backend double
pub struct MockScmBackend {
    prepare_err: Option<String>,
    fail_after: usize,
    responses: RwLock<VecDeque<ScmPrepareResponse>>,
    prepare_calls: RwLock<Vec<ScmPrepareRequest>>,
}

impl MockScmBackend {
    pub fn new(config: MockScmConfig) -> Self {
        Self {
            prepare_err: config.prepare_err,
            fail_after: config.fail_after,
            responses: RwLock::new(config.responses.into()),
            prepare_calls: RwLock::new(Vec::new()),
        }
    }

    /// Requests received so far
    pub fn prepare_calls(&self) -> Vec<ScmPrepareRequest> {
        self.prepare_calls.read().clone()
    }

    fn next_response(&self) -> Result<ScmPrepareResponse> {
        let mut responses = self.responses.write();
        let resp = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        resp.ok_or_else(|| Error::backend("mock-scm", "prepare", "no response scripted"))
    }
}

#[async_trait]
impl ScmPreparer for MockScmBackend {
    async fn prepare(&self, request: ScmPrepareRequest) -> Result<ScmPrepareResponse> {
        let call_count = {
            let mut calls = self.prepare_calls.write();
            calls.push(request);
            calls.len()
        };

        if let Some(reason) = &self.prepare_err {
            if call_count > self.fail_after {
                return Err(Error::backend("mock-scm", "prepare", reason.clone()));
            }
        }
        self.next_response()
    }

    fn backend_name(&self) -> &str {
        "mock-scm"
    }
}

// =============================================================================
// Bdev
// =============================================================================

/// Scripted behaviour of [`MockBdevBackend`]
#[derive(Debug, Clone, Default)]
pub struct MockBdevConfig {
    pub prepare_err: Option<String>,
    pub reset_err: Option<String>,
    pub vmd_detected: bool,
}

/// Bdev backend double
pub struct MockBdevBackend {
    config: MockBdevConfig,
    prepare_calls: RwLock<Vec<BdevPrepareRequest>>,
    reset_calls: RwLock<Vec<BdevPrepareRequest>>,
}

impl MockBdevBackend {
    pub fn new(config: MockBdevConfig) -> Self {
        Self {
            config,
            prepare_calls: RwLock::new(Vec::new()),
            reset_calls: RwLock::new(Vec::new()),
        }
    }

    pub fn prepare_calls(&self) -> Vec<BdevPrepareRequest> {
        self.prepare_calls.read().clone()
    }

    pub fn reset_calls(&self) -> Vec<BdevPrepareRequest> {
        self.reset_calls.read().clone()
    }

    fn respond(&self, operation: &str, err: &Option<String>) -> Result<BdevPrepareResponse> {
        match err {
            Some(reason) => Err(Error::backend("mock-bdev", operation, reason.clone())),
            None => Ok(BdevPrepareResponse {
                vmd_detected: self.config.vmd_detected,
            }),
        }
    }
}

#[async_trait]
impl BdevPreparer for MockBdevBackend {
    async fn prepare(&self, request: BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        self.prepare_calls.write().push(request);
        self.respond("prepare", &self.config.prepare_err)
    }

    async fn reset(&self, request: BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        self.reset_calls.write().push(request);
        self.respond("reset", &self.config.reset_err)
    }

    fn backend_name(&self) -> &str {
        "mock-bdev"
    }
}
