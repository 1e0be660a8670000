//! NVMe backend over the SPDK setup script
//!
//! The script rebinds NVMe controllers to a user-space driver and reserves
//! huge pages; `reset` hands the controllers back to the kernel. Its inputs
//! are passed through the environment.

use crate::domain::ports::{BdevPrepareRequest, BdevPrepareResponse, BdevPreparer, PCI_ADDR_SEP};
use crate::error::Result;
use crate::hardware::command::{CommandRunnerRef, CommandSpec};
use async_trait::async_trait;
use tracing::{debug, info};

/// PCI vendor:device of Intel VMD controllers
pub const VMD_DEVICE_ID: &str = "8086:201d";

/// Split a separator-delimited PCI address list
pub fn split_pci_list(list: &str) -> Vec<String> {
    list.split(PCI_ADDR_SEP)
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `lspci -D -n` output into PCI addresses
pub fn parse_lspci_addresses(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Bdev backend running the SPDK setup script
pub struct SpdkBdevBackend {
    setup_script: String,
    lspci: String,
    runner: CommandRunnerRef,
}

impl SpdkBdevBackend {
    pub fn new(
        setup_script: impl Into<String>,
        lspci: impl Into<String>,
        runner: CommandRunnerRef,
    ) -> Self {
        Self {
            setup_script: setup_script.into(),
            lspci: lspci.into(),
            runner,
        }
    }

    /// Addresses of VMD controllers on this host; none when lspci fails
    async fn detect_vmd(&self) -> Vec<String> {
        let cmd = CommandSpec::new(&self.lspci).args(["-D", "-n", "-d", VMD_DEVICE_ID]);
        match self.runner.run(&cmd).await {
            Ok(output) => parse_lspci_addresses(&output.stdout),
            Err(e) => {
                debug!("VMD detection skipped: {}", e);
                Vec::new()
            }
        }
    }

    /// Build the script invocation, returning whether VMD devices were added
    async fn setup_command(&self, request: &BdevPrepareRequest) -> (CommandSpec, bool) {
        let mut allowed = split_pci_list(&request.pci_allow_list);
        let blocked = split_pci_list(&request.pci_block_list);

        let mut vmd_detected = false;
        if request.enable_vmd {
            let vmd: Vec<String> = self
                .detect_vmd()
                .await
                .into_iter()
                .filter(|addr| !blocked.contains(addr))
                .collect();
            vmd_detected = !vmd.is_empty();

            // An empty allow list already covers every controller
            if !allowed.is_empty() {
                for addr in vmd {
                    if !allowed.contains(&addr) {
                        allowed.push(addr);
                    }
                }
            }
        }

        let mut cmd = CommandSpec::new(&self.setup_script);
        if request.reset {
            cmd = cmd.arg("reset");
        }
        if request.huge_page_count > 0 {
            cmd = cmd.env("NRHUGE", request.huge_page_count.to_string());
        }
        if !request.target_user.is_empty() {
            cmd = cmd.env("TARGET_USER", request.target_user.clone());
        }
        if !allowed.is_empty() {
            cmd = cmd.env("PCI_ALLOWED", allowed.join(" "));
        }
        if !blocked.is_empty() {
            cmd = cmd.env("PCI_BLOCKED", blocked.join(" "));
        }

        (cmd, vmd_detected)
    }

    async fn run_setup(&self, request: &BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        let (cmd, vmd_detected) = self.setup_command(request).await;
        info!(
            "Running {} (huge pages: {}, user: {})",
            cmd.render(),
            request.huge_page_count,
            request.target_user
        );
        self.runner.run(&cmd).await?;
        Ok(BdevPrepareResponse { vmd_detected })
    }
}

#[async_trait]
impl BdevPreparer for SpdkBdevBackend {
    async fn prepare(&self, request: BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        self.run_setup(&BdevPrepareRequest {
            reset: false,
            ..request
        })
        .await
    }

    async fn reset(&self, request: BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        self.run_setup(&BdevPrepareRequest {
            reset: true,
            ..request
        })
        .await
    }

    fn backend_name(&self) -> &str {
        "spdk"
    }
}
