//! Storage Prepare - SCM and NVMe preparation for storage nodes
//!
//! Brings persistent memory (SCM) and NVMe devices into a state a storage
//! engine can use, and reverses that state on reset.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     Preparation Orchestrator                         │
//! │          scope validation ─► SCM ─► NVMe ─► final error              │
//! ├─────────────────────────────────┬───────────────────────────────────┤
//! │     SCM State Machine           │        NVMe Driver                │
//! │  (consent, regions, namespaces) │  (target user, huge pages, VMD)   │
//! ├─────────────────────────────────┼───────────────────────────────────┤
//! │     ScmPreparer port            │        BdevPreparer port          │
//! ├─────────────────────────────────┼───────────────────────────────────┤
//! │  ipmctl / ndctl  │  mock        │  SPDK setup script  │  mock       │
//! └─────────────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`prepare`]: Orchestrator, SCM state machine, NVMe driver, consent
//! - [`hardware`]: Backend adapters and test doubles
//! - [`domain`]: Backend ports and their request/response types
//! - [`error`]: Error types and handling

pub mod domain;
pub mod error;
pub mod hardware;
pub mod prepare;

// Re-export commonly used types
pub use domain::ports::{
    BdevPrepareRequest, BdevPrepareResponse, BdevPreparer, ScmNamespace, ScmPrepareRequest,
    ScmPrepareResponse, ScmPreparer, ScmState,
};

pub use error::{Error, ErrorCategory, Result};

pub use hardware::{
    BackendConfig, CommandRunner, NdctlScmBackend, SpdkBdevBackend, SystemRunner,
};

pub use prepare::{
    Consent, ConsentGate, DiagnosticSet, Notice, Orchestrator, PrepareReport, PrepareScope,
    PreparationRequest, PromptConsent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
