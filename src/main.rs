//! Storage Prepare
//!
//! Prepares persistent memory and NVMe devices on the local node for use by
//! a storage engine, or resets them with `--reset`.
//!
//! ```text
//! storage-prepare [--scm-only | --nvme-only] [--force] [--reset]
//!                 [--nr-namespaces-per-socket N] [--nr-hugepages N]
//!                 [--target-user USER]
//!                 [--pci-allow-list ADDRS] [--pci-block-list ADDRS]
//! ```

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_prepare::hardware::CommandRunnerRef;
use storage_prepare::{
    BackendConfig, ConsentGate, Notice, Orchestrator, PrepareScope, PreparationRequest,
    PromptConsent, Result, SystemRunner,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Prepare SCM and NVMe storage for use by the storage engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Only prepare SCM
    #[arg(short = 's', long)]
    scm_only: bool,

    /// Only prepare NVMe
    #[arg(short = 'n', long)]
    nvme_only: bool,

    /// Perform operation without waiting for confirmation
    #[arg(short = 'f', long)]
    force: bool,

    /// Reset SCM modules and NVMe devices instead of preparing them
    #[arg(long)]
    reset: bool,

    /// Number of SCM namespaces to create per socket
    #[arg(short = 'S', long, default_value_t = 1)]
    nr_namespaces_per_socket: u32,

    /// Number of huge pages to allocate for use by SPDK
    #[arg(short = 'p', long, default_value_t = 0)]
    nr_hugepages: u32,

    /// User that will own huge pages and device files (defaults to the caller)
    #[arg(short = 'u', long)]
    target_user: Option<String>,

    /// Comma separated PCI addresses of NVMe controllers to include
    #[arg(long, default_value = "")]
    pci_allow_list: String,

    /// Comma separated PCI addresses of NVMe controllers to exclude
    #[arg(long, default_value = "")]
    pci_block_list: String,

    /// Path to ipmctl
    #[arg(long, env = "IPMCTL_PATH", default_value = "ipmctl")]
    ipmctl_path: String,

    /// Path to ndctl
    #[arg(long, env = "NDCTL_PATH", default_value = "ndctl")]
    ndctl_path: String,

    /// Path to the SPDK setup script
    #[arg(
        long,
        env = "SPDK_SETUP",
        default_value = "/usr/share/spdk/scripts/setup.sh"
    )]
    spdk_setup: String,

    /// Path to lspci
    #[arg(long, env = "LSPCI_PATH", default_value = "lspci")]
    lspci_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn request(&self) -> PreparationRequest {
        PreparationRequest {
            scm_only: self.scm_only,
            nvme_only: self.nvme_only,
            force: self.force,
            reset: self.reset,
            namespaces_per_socket: self.nr_namespaces_per_socket,
            huge_page_count: self.nr_hugepages,
            target_user: self.target_user.clone(),
            pci_allow_list: self.pci_allow_list.clone(),
            pci_block_list: self.pci_block_list.clone(),
        }
    }

    fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            ipmctl: self.ipmctl_path.clone(),
            ndctl: self.ndctl_path.clone(),
            spdk_setup_script: self.spdk_setup.clone(),
            lspci: self.lspci_path.clone(),
        }
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting storage prepare");
    info!("  Version: {}", storage_prepare::VERSION);

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let notices = prepare(args, Arc::new(SystemRunner), PromptConsent::stdio()).await?;
    info!(
        "Storage prepare complete ({} notice(s))",
        notices.len()
    );

    Ok(())
}

async fn prepare<C>(args: &Args, runner: CommandRunnerRef, gate: C) -> Result<Vec<Notice>>
where
    C: ConsentGate + 'static,
{
    let request = args.request();
    let config = args.backend_config();

    // With SCM in scope a missing setup script is reported as the NVMe result
    if request.scope()? == PrepareScope::NvmeOnly {
        config.validate()?;
    }

    let (scm, bdev) = config.build(runner);
    Orchestrator::with_backends(scm, bdev, gate).run(&request).await
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }
}
