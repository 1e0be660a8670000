//! Persistent memory backend over ipmctl and ndctl
//!
//! Regions are requested through ipmctl memory allocation goals (applied on
//! the next reboot) and namespaces are carved out of region capacity with
//! ndctl. The reported [`ScmState`] is always derived from a fresh scan.

use crate::domain::ports::{
    ScmNamespace, ScmPrepareRequest, ScmPrepareResponse, ScmPreparer, ScmState,
};
use crate::error::{Error, Result};
use crate::hardware::command::{CommandRunnerRef, CommandSpec};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

/// Namespace sizes are rounded down to this alignment, except the last
/// namespace of a region which is created without an explicit size
const NAMESPACE_ALIGN: u64 = 2 * 1024 * 1024;

// =============================================================================
// ndctl Output
// =============================================================================

/// Region as listed by `ndctl list --regions`
#[derive(Debug, Clone, Deserialize)]
pub struct NdctlRegion {
    pub dev: String,
    pub size: u64,
    #[serde(default)]
    pub available_size: u64,
    #[serde(rename = "type", default)]
    pub region_type: String,
    /// Only interleave sets carry an id
    #[serde(default)]
    pub iset_id: Option<i64>,
    #[serde(default)]
    pub numa_node: Option<u32>,
}

/// Parse ndctl JSON, which is empty for no objects and a bare object for one
pub fn parse_ndctl_list<T: DeserializeOwned>(output: &str) -> Result<Vec<T>> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Error::from))
            .collect(),
        object => Ok(vec![serde_json::from_value(object)?]),
    }
}

/// Result of scanning modules and regions
#[derive(Debug, Clone)]
struct ScmScan {
    module_count: usize,
    regions: Vec<NdctlRegion>,
}

impl ScmScan {
    fn state(&self) -> ScmState {
        if self.module_count == 0 {
            ScmState::NoModules
        } else if self.regions.is_empty() {
            ScmState::NoRegions
        } else if self.regions.iter().any(|r| r.iset_id.is_none()) {
            ScmState::NotInterleaved
        } else if self.regions.iter().any(|r| r.available_size > 0) {
            ScmState::FreeCapacity
        } else {
            ScmState::NoFreeCapacity
        }
    }
}

// =============================================================================
// Backend
// =============================================================================

/// SCM backend driving ipmctl and ndctl
pub struct NdctlScmBackend {
    ipmctl: String,
    ndctl: String,
    runner: CommandRunnerRef,
}

impl NdctlScmBackend {
    pub fn new(
        ipmctl: impl Into<String>,
        ndctl: impl Into<String>,
        runner: CommandRunnerRef,
    ) -> Self {
        Self {
            ipmctl: ipmctl.into(),
            ndctl: ndctl.into(),
            runner,
        }
    }

    async fn ndctl(&self, args: &[&str]) -> Result<String> {
        let cmd = CommandSpec::new(&self.ndctl).args(args.iter().copied());
        Ok(self.runner.run(&cmd).await?.stdout)
    }

    async fn ipmctl(&self, args: &[&str]) -> Result<String> {
        let cmd = CommandSpec::new(&self.ipmctl).args(args.iter().copied());
        Ok(self.runner.run(&cmd).await?.stdout)
    }

    async fn scan(&self) -> Result<ScmScan> {
        let modules: Vec<serde_json::Value> =
            parse_ndctl_list(&self.ndctl(&["list", "--dimms"]).await?)?;
        let regions = if modules.is_empty() {
            Vec::new()
        } else {
            parse_ndctl_list::<NdctlRegion>(&self.ndctl(&["list", "--regions"]).await?)?
                .into_iter()
                .filter(|r| r.region_type.is_empty() || r.region_type == "pmem")
                .collect()
        };

        let scan = ScmScan {
            module_count: modules.len(),
            regions,
        };
        debug!(
            "SCM scan: {} modules, {} regions, state '{}'",
            scan.module_count,
            scan.regions.len(),
            scan.state()
        );
        Ok(scan)
    }

    async fn namespaces(&self) -> Result<Vec<ScmNamespace>> {
        parse_ndctl_list(&self.ndctl(&["list", "--namespaces"]).await?)
    }

    /// Respond with the state of a fresh scan, listing namespaces when full
    async fn current_state(&self) -> Result<ScmPrepareResponse> {
        let state = self.scan().await?.state();
        let mut resp = ScmPrepareResponse::new(state);
        if state == ScmState::NoFreeCapacity {
            resp.namespaces = self.namespaces().await?;
        }
        Ok(resp)
    }

    async fn create_regions(&self) -> Result<ScmPrepareResponse> {
        info!("Creating AppDirect memory allocation goal");
        self.ipmctl(&["create", "-f", "-goal", "PersistentMemoryType=AppDirect"])
            .await?;
        Ok(ScmPrepareResponse::new(ScmState::NoRegions).with_reboot_required())
    }

    async fn create_namespaces(
        &self,
        regions: &[NdctlRegion],
        per_region: u32,
    ) -> Result<ScmPrepareResponse> {
        if per_region == 0 {
            return Err(Error::InvalidNamespaceCount(per_region));
        }

        for region in regions.iter().filter(|r| r.available_size > 0) {
            let size = namespace_size(region.available_size, per_region);
            info!(
                "Creating {} namespace(s) on {} ({} bytes each)",
                per_region, region.dev, size
            );

            for idx in 0..per_region {
                let mut args = vec![
                    "create-namespace".to_string(),
                    "--region".to_string(),
                    region.dev.clone(),
                    "--mode".to_string(),
                    "fsdax".to_string(),
                ];
                // The last namespace takes the remainder left by alignment
                if idx + 1 < per_region {
                    args.push("--size".to_string());
                    args.push(size.to_string());
                }
                self.runner
                    .run(&CommandSpec::new(&self.ndctl).args(args))
                    .await?;
            }
        }

        self.current_state().await
    }

    async fn remove_regions(&self) -> Result<ScmPrepareResponse> {
        info!("Destroying namespaces and removing memory allocation goals");
        self.ndctl(&["disable-namespace", "all"]).await?;
        self.ndctl(&["destroy-namespace", "all", "--force"]).await?;
        self.ipmctl(&["delete", "-goal"]).await?;
        self.ipmctl(&["create", "-f", "-goal", "MemoryMode=100"])
            .await?;
        Ok(ScmPrepareResponse::new(ScmState::NoRegions).with_reboot_required())
    }
}

/// Equal share of `available` for each of `count` namespaces, aligned down
fn namespace_size(available: u64, count: u32) -> u64 {
    let share = available / u64::from(count.max(1));
    share - share % NAMESPACE_ALIGN
}

#[async_trait]
impl ScmPreparer for NdctlScmBackend {
    async fn prepare(&self, request: ScmPrepareRequest) -> Result<ScmPrepareResponse> {
        let scan = self.scan().await?;
        let state = scan.state();

        if request.reset {
            return match state {
                ScmState::NoModules | ScmState::NoRegions => Ok(ScmPrepareResponse::new(state)),
                _ => self.remove_regions().await,
            };
        }

        match state {
            ScmState::NoRegions => self.create_regions().await,
            ScmState::NotInterleaved => Err(Error::backend(
                "ndctl",
                "prepare",
                "regions are not interleaved, reset them before preparing",
            )),
            ScmState::FreeCapacity => {
                self.create_namespaces(&scan.regions, request.namespaces_per_socket)
                    .await
            }
            ScmState::NoModules => Ok(ScmPrepareResponse::new(state)),
            ScmState::NoFreeCapacity => self.current_state().await,
        }
    }

    fn backend_name(&self) -> &str {
        "ndctl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::command::ScriptedRunner;
    use std::sync::Arc;

    const DIMMS: &str = r#"[{"dev":"nmem0","id":"8089-a2-1837-00000bb3"},
                            {"dev":"nmem1","id":"8089-a2-1837-00000bb4"}]"#;
    const REGION_FREE: &str = r#"{"dev":"region0","size":1082331758592,
        "available_size":1082331758592,"type":"pmem","iset_id":-6862590591590366668,
        "numa_node":0}"#;
    const REGION_FULL: &str = r#"{"dev":"region0","size":1082331758592,
        "available_size":0,"type":"pmem","iset_id":-6862590591590366668,"numa_node":0}"#;
    const REGION_NO_ISET: &str = r#"[{"dev":"region0","size":541165879296,
        "available_size":541165879296,"type":"pmem"}]"#;
    const NAMESPACES: &str = r#"{"dev":"namespace0.0","mode":"fsdax","map":"dev",
        "size":1065418227712,"uuid":"842fc847-28e0-4bb6-8dfc-d24afdba1528",
        "blockdev":"pmem0","numa_node":0}"#;

    fn backend(runner: ScriptedRunner) -> (NdctlScmBackend, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        (
            NdctlScmBackend::new("ipmctl", "ndctl", runner.clone()),
            runner,
        )
    }

    fn create(nr: u32) -> ScmPrepareRequest {
        ScmPrepareRequest {
            reset: false,
            namespaces_per_socket: nr,
        }
    }

    const RESET: ScmPrepareRequest = ScmPrepareRequest {
        reset: true,
        namespaces_per_socket: 0,
    };

    #[test]
    fn test_parse_ndctl_list_shapes() {
        assert!(parse_ndctl_list::<NdctlRegion>("").unwrap().is_empty());
        assert_eq!(parse_ndctl_list::<NdctlRegion>(REGION_FREE).unwrap().len(), 1);
        assert_eq!(
            parse_ndctl_list::<serde_json::Value>(DIMMS).unwrap().len(),
            2
        );
        assert!(parse_ndctl_list::<NdctlRegion>("not json").is_err());
    }

    #[test]
    fn test_namespace_size_alignment() {
        assert_eq!(namespace_size(10 * NAMESPACE_ALIGN + 5, 1), 10 * NAMESPACE_ALIGN);
        assert_eq!(namespace_size(10 * NAMESPACE_ALIGN, 3), 3 * NAMESPACE_ALIGN);
    }

    #[tokio::test]
    async fn test_no_modules() {
        let (scm, runner) = backend(ScriptedRunner::new().on("ndctl list --dimms", ""));

        let resp = scm.prepare(create(1)).await.unwrap();
        assert_eq!(resp.state, ScmState::NoModules);
        assert_eq!(runner.rendered_calls(), vec!["ndctl list --dimms"]);
    }

    #[tokio::test]
    async fn test_no_regions_creates_goal() {
        let (scm, runner) = backend(
            ScriptedRunner::new()
                .on("ndctl list --dimms", DIMMS)
                .on("ndctl list --regions", "")
                .on("ipmctl create -f -goal PersistentMemoryType=AppDirect", "ok"),
        );

        let resp = scm.prepare(create(1)).await.unwrap();
        assert_eq!(resp.state, ScmState::NoRegions);
        assert!(resp.reboot_required);
        assert!(runner
            .rendered_calls()
            .contains(&"ipmctl create -f -goal PersistentMemoryType=AppDirect".to_string()));
    }

    #[tokio::test]
    async fn test_not_interleaved_is_rejected() {
        let (scm, _) = backend(
            ScriptedRunner::new()
                .on("ndctl list --dimms", DIMMS)
                .on("ndctl list --regions", REGION_NO_ISET),
        );

        let err = scm.prepare(create(1)).await.unwrap_err();
        assert!(err.to_string().contains("not interleaved"));
    }

    #[tokio::test]
    async fn test_free_capacity_creates_namespaces() {
        let (scm, runner) = backend(
            ScriptedRunner::new()
                .on("ndctl list --dimms", DIMMS)
                .on("ndctl list --regions", REGION_FREE)
                .on("ndctl list --regions", REGION_FULL)
                .on("ndctl create-namespace --region region0 --mode fsdax", NAMESPACES)
                .on("ndctl list --namespaces", NAMESPACES),
        );

        let resp = scm.prepare(create(1)).await.unwrap();

        assert_eq!(resp.state, ScmState::NoFreeCapacity);
        assert_eq!(resp.namespaces.len(), 1);
        assert_eq!(resp.namespaces[0].block_device, "pmem0");
        let creates = runner
            .rendered_calls()
            .into_iter()
            .filter(|c| c.contains("create-namespace"))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_multiple_namespaces_per_region_are_sized() {
        let size = namespace_size(1082331758592, 2);
        let sized_cmd = format!(
            "ndctl create-namespace --region region0 --mode fsdax --size {}",
            size
        );
        let last_cmd = "ndctl create-namespace --region region0 --mode fsdax";
        let (scm, runner) = backend(
            ScriptedRunner::new()
                .on("ndctl list --dimms", DIMMS)
                .on("ndctl list --regions", REGION_FREE)
                .on("ndctl list --regions", REGION_FULL)
                .on(&sized_cmd, NAMESPACES)
                .on(last_cmd, NAMESPACES)
                .on("ndctl list --namespaces", NAMESPACES),
        );

        scm.prepare(create(2)).await.unwrap();

        let creates: Vec<String> = runner
            .rendered_calls()
            .into_iter()
            .filter(|c| c.contains("create-namespace"))
            .collect();
        assert_eq!(creates, vec![sized_cmd, last_cmd.to_string()]);
    }

    #[tokio::test]
    async fn test_unaligned_capacity_is_fully_consumed() {
        // 4 MiB beyond a multiple of 3 * 2 MiB
        let available = 1082331758592 + 4 * 1024 * 1024;
        let region = format!(
            r#"{{"dev":"region0","size":{0},"available_size":{0},"type":"pmem",
            "iset_id":-6862590591590366668,"numa_node":0}}"#,
            available
        );
        let size = namespace_size(available, 3);
        assert_ne!(size * 3, available);

        let sized_cmd = format!(
            "ndctl create-namespace --region region0 --mode fsdax --size {}",
            size
        );
        let last_cmd = "ndctl create-namespace --region region0 --mode fsdax";
        let (scm, runner) = backend(
            ScriptedRunner::new()
                .on("ndctl list --dimms", DIMMS)
                .on("ndctl list --regions", &region)
                .on("ndctl list --regions", REGION_FULL)
                .on(&sized_cmd, NAMESPACES)
                .on(last_cmd, NAMESPACES)
                .on("ndctl list --namespaces", NAMESPACES),
        );

        let resp = scm.prepare(create(3)).await.unwrap();

        assert_eq!(resp.state, ScmState::NoFreeCapacity);
        let creates: Vec<String> = runner
            .rendered_calls()
            .into_iter()
            .filter(|c| c.contains("create-namespace"))
            .collect();
        assert_eq!(
            creates,
            vec![sized_cmd.clone(), sized_cmd, last_cmd.to_string()]
        );
    }

    #[tokio::test]
    async fn test_full_regions_list_namespaces() {
        let (scm, _) = backend(
            ScriptedRunner::new()
                .on("ndctl list --dimms", DIMMS)
                .on("ndctl list --regions", REGION_FULL)
                .on("ndctl list --namespaces", NAMESPACES),
        );

        let resp = scm.prepare(create(1)).await.unwrap();
        assert_eq!(resp.state, ScmState::NoFreeCapacity);
        assert_eq!(resp.namespaces[0].name, "namespace0.0");
    }

    #[tokio::test]
    async fn test_reset_removes_regions() {
        let (scm, runner) = backend(
            ScriptedRunner::new()
                .on("ndctl list --dimms", DIMMS)
                .on("ndctl list --regions", REGION_FULL)
                .on("ndctl disable-namespace all", "")
                .on("ndctl destroy-namespace all --force", "")
                .on("ipmctl delete -goal", "")
                .on("ipmctl create -f -goal MemoryMode=100", ""),
        );

        let resp = scm.prepare(RESET).await.unwrap();

        assert_eq!(resp.state, ScmState::NoRegions);
        assert!(resp.reboot_required);
        assert_eq!(
            runner.rendered_calls()[2..],
            [
                "ndctl disable-namespace all",
                "ndctl destroy-namespace all --force",
                "ipmctl delete -goal",
                "ipmctl create -f -goal MemoryMode=100",
            ]
        );
    }

    #[tokio::test]
    async fn test_reset_without_regions_is_noop() {
        let (scm, runner) = backend(
            ScriptedRunner::new()
                .on("ndctl list --dimms", DIMMS)
                .on("ndctl list --regions", ""),
        );

        let resp = scm.prepare(RESET).await.unwrap();
        assert_eq!(resp.state, ScmState::NoRegions);
        assert!(!resp.reboot_required);
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_tooling_failure_propagates() {
        let (scm, _) = backend(ScriptedRunner::new().fail("ndctl list --dimms", "not found"));
        let err = scm.prepare(create(1)).await.unwrap_err();
        assert!(err.to_string().contains("ndctl list --dimms"));
    }
}
