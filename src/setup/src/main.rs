// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! One-shot setup tool for a single database server node.
//!
//! Reads a TOML configuration file (optionally overridden by flags and
//! `CB_SETUP_*` environment variables), then runs the convergence sequence:
//! install, start, configure, wait, and issue the cluster setup calls.
//! Re-running the tool converges rather than duplicating effects.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cb_bootstrap::credentials::{CredentialStore, FileCredentialStore};
use cb_bootstrap::host::{HostPackageInstaller, SystemdSupervisor};
use cb_bootstrap::{Bootstrap, NodeConfig};

#[derive(Parser, Debug, Clone)]
#[clap(name = "cb-setup", about = "Converge a database server node on this host.")]
struct Args {
    /// Path to a TOML configuration file.
    #[clap(long, env = "CB_SETUP_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Run without a credential store; all required values, including the
    /// administrator password, must then be supplied directly.
    #[clap(long, env = "CB_SETUP_STANDALONE")]
    standalone: bool,

    /// Directory that persists state (the generated administrator
    /// password) across runs.
    #[clap(long, env = "CB_SETUP_STATE_DIR", default_value = "/var/lib/cb-setup")]
    state_dir: PathBuf,

    // === Configuration overrides. ===
    /// File name of the server package artifact.
    #[clap(long, env = "CB_SETUP_PACKAGE_FILE")]
    package_file: Option<String>,
    /// URL the package artifact is fetched from.
    #[clap(long, env = "CB_SETUP_PACKAGE_URL")]
    package_url: Option<String>,
    /// Administrator username.
    #[clap(long, env = "CB_SETUP_USERNAME")]
    username: Option<String>,
    /// Administrator password.
    #[clap(long, env = "CB_SETUP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Directory to point the server's error logger at.
    #[clap(long, env = "CB_SETUP_LOG_DIR")]
    log_dir: Option<PathBuf>,
    /// On-disk data directory for the node.
    #[clap(long, env = "CB_SETUP_DATABASE_PATH")]
    database_path: Option<PathBuf>,
    /// Cluster-wide memory quota, in megabytes.
    #[clap(long, env = "CB_SETUP_MEMORY_QUOTA_MB")]
    memory_quota_mb: Option<u64>,
    /// Port of the management API on the local host.
    #[clap(long, env = "CB_SETUP_ADMIN_PORT")]
    admin_port: Option<u16>,
    /// Name of the system service to supervise.
    #[clap(long, env = "CB_SETUP_SERVICE_NAME")]
    service_name: Option<String>,
}

fn load_config(args: &Args) -> Result<NodeConfig, anyhow::Error> {
    let mut config = match &args.config_file {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => NodeConfig::default(),
    };

    if let Some(package_file) = &args.package_file {
        config.package_file = package_file.clone();
    }
    if let Some(package_url) = &args.package_url {
        config.package_url = package_url.clone();
    }
    if let Some(username) = &args.username {
        config.username = username.clone();
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = log_dir.clone();
    }
    if let Some(database_path) = &args.database_path {
        config.database_path = database_path.clone();
    }
    if let Some(memory_quota_mb) = args.memory_quota_mb {
        config.memory_quota_mb = memory_quota_mb;
    }
    if let Some(admin_port) = args.admin_port {
        config.admin_port = admin_port;
    }
    if let Some(service_name) = &args.service_name {
        config.service_name = service_name.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CB_SETUP_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(args).await {
        eprintln!("cb-setup: fatal: {:#}", err);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), anyhow::Error> {
    let config = load_config(&args)?;

    let installer = Arc::new(HostPackageInstaller::new(config.cache_dir.clone()));
    let supervisor = Arc::new(SystemdSupervisor);
    let store: Option<Arc<dyn CredentialStore>> = if args.standalone {
        None
    } else {
        Some(Arc::new(FileCredentialStore::new(&args.state_dir)))
    };

    info!(service = %config.service_name, standalone = args.standalone, "starting convergence");
    let report = Bootstrap::new(config, installer, supervisor, store)
        .run()
        .await?;

    if report.password_generated {
        println!("generated a new administrator password (persisted in the state directory)");
    }
    if report.config_rewritten {
        println!("static configuration updated; service restarted");
    }
    if !report.became_ready {
        println!("warning: admin port never opened during the probe window");
    }
    println!("node converged");
    Ok(())
}
