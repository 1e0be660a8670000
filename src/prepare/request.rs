//! Preparation request and scope selection

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default number of SCM namespaces created on each socket
pub const DEFAULT_NAMESPACES_PER_SOCKET: u32 = 1;

/// Which subsystems a preparation run touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepareScope {
    ScmOnly,
    NvmeOnly,
    Both,
}

impl PrepareScope {
    pub fn runs_scm(&self) -> bool {
        matches!(self, PrepareScope::ScmOnly | PrepareScope::Both)
    }

    pub fn runs_nvme(&self) -> bool {
        matches!(self, PrepareScope::NvmeOnly | PrepareScope::Both)
    }
}

impl std::fmt::Display for PrepareScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrepareScope::ScmOnly => write!(f, "scm-only"),
            PrepareScope::NvmeOnly => write!(f, "nvme-only"),
            PrepareScope::Both => write!(f, "scm+nvme"),
        }
    }
}

/// Parameters of a single preparation invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationRequest {
    pub scm_only: bool,
    pub nvme_only: bool,
    /// Skip interactive consent
    pub force: bool,
    /// Reverse preparation instead of performing it
    pub reset: bool,
    pub namespaces_per_socket: u32,
    pub huge_page_count: u32,
    /// Owner of huge pages and device files; the invoking user when unset
    pub target_user: Option<String>,
    pub pci_allow_list: String,
    pub pci_block_list: String,
}

impl Default for PreparationRequest {
    fn default() -> Self {
        Self {
            scm_only: false,
            nvme_only: false,
            force: false,
            reset: false,
            namespaces_per_socket: DEFAULT_NAMESPACES_PER_SOCKET,
            huge_page_count: 0,
            target_user: None,
            pci_allow_list: String::new(),
            pci_block_list: String::new(),
        }
    }
}

impl PreparationRequest {
    /// Resolve the scope flags, rejecting conflicting selections
    pub fn scope(&self) -> Result<PrepareScope> {
        match (self.scm_only, self.nvme_only) {
            (true, true) => Err(Error::ScopeConflict),
            (true, false) => Ok(PrepareScope::ScmOnly),
            (false, true) => Ok(PrepareScope::NvmeOnly),
            (false, false) => Ok(PrepareScope::Both),
        }
    }

    /// Ensure namespace creation has something to create
    pub fn validate_namespace_count(&self) -> Result<()> {
        if self.namespaces_per_socket < 1 {
            return Err(Error::InvalidNamespaceCount(self.namespaces_per_socket));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_scope_resolution() {
        let mut req = PreparationRequest::default();
        assert_eq!(req.scope().unwrap(), PrepareScope::Both);

        req.scm_only = true;
        assert_eq!(req.scope().unwrap(), PrepareScope::ScmOnly);

        req.scm_only = false;
        req.nvme_only = true;
        assert_eq!(req.scope().unwrap(), PrepareScope::NvmeOnly);
    }

    #[test]
    fn test_scope_conflict() {
        let req = PreparationRequest {
            scm_only: true,
            nvme_only: true,
            ..Default::default()
        };
        assert_matches!(req.scope(), Err(Error::ScopeConflict));
    }

    #[test]
    fn test_scope_subsystems() {
        assert!(PrepareScope::Both.runs_scm() && PrepareScope::Both.runs_nvme());
        assert!(PrepareScope::ScmOnly.runs_scm() && !PrepareScope::ScmOnly.runs_nvme());
        assert!(!PrepareScope::NvmeOnly.runs_scm() && PrepareScope::NvmeOnly.runs_nvme());
    }

    #[test]
    fn test_namespace_count_validation() {
        let req = PreparationRequest::default();
        assert_eq!(req.namespaces_per_socket, 1);
        assert!(req.validate_namespace_count().is_ok());

        let req = PreparationRequest {
            namespaces_per_socket: 0,
            ..Default::default()
        };
        assert_matches!(
            req.validate_namespace_count(),
            Err(Error::InvalidNamespaceCount(0))
        );
    }
}
