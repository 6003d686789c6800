// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The convergence sequencer.
//!
//! Runs the steps strictly top to bottom; each step is a prerequisite for
//! the next. The three cluster setup calls at the end have a hard ordering
//! dependency: a cluster cannot be created on an uninitialized node, and
//! settings apply to an existing cluster. There is no rollback — a failure
//! aborts the run and the completed steps are reconciled by the next run
//! through their individual idempotence.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use cb_admin_client::ClientConfig;
use tracing::{info, warn};
use url::Url;

use crate::config::NodeConfig;
use crate::credentials::{ensure_password, CredentialStore};
use crate::error::BootstrapError;
use crate::logconf::ensure_log_directive;
use crate::readiness::wait_until_listening;
use crate::system::{ensure_directory, PackageArtifact, PackageInstaller, ServiceSupervisor};

/// What a convergence run did, for reporting.
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    /// Whether a fresh administrator password was generated this run.
    pub password_generated: bool,
    /// Whether the static configuration was rewritten (and the service
    /// restarted).
    pub config_rewritten: bool,
    /// Whether the admin port accepted a connection within the probe
    /// budget. The run proceeds either way.
    pub became_ready: bool,
}

/// A single-node convergence run.
#[derive(Debug)]
pub struct Bootstrap {
    config: NodeConfig,
    installer: Arc<dyn PackageInstaller>,
    supervisor: Arc<dyn ServiceSupervisor>,
    store: Option<Arc<dyn CredentialStore>>,
}

impl Bootstrap {
    /// Wires a run together. Passing `None` for `store` selects standalone
    /// mode, in which all required values must be supplied directly.
    pub fn new(
        config: NodeConfig,
        installer: Arc<dyn PackageInstaller>,
        supervisor: Arc<dyn ServiceSupervisor>,
        store: Option<Arc<dyn CredentialStore>>,
    ) -> Bootstrap {
        Bootstrap {
            config,
            installer,
            supervisor,
            store,
        }
    }

    /// Runs the full sequence to completion.
    pub async fn run(&self) -> Result<BootstrapReport, BootstrapError> {
        let config = &self.config;

        // Pre-flight: surface every missing field in one message, before
        // any side effect.
        let missing = config.missing_required_fields(self.store.is_none());
        if !missing.is_empty() {
            return Err(BootstrapError::MissingConfig { fields: missing });
        }
        let artifact = PackageArtifact::from_config(config)?;

        let provisioned = ensure_password(config, self.store.as_deref()).await?;

        self.installer
            .ensure_installed(&artifact)
            .await
            .map_err(BootstrapError::Install)?;

        self.supervisor
            .ensure_running(&config.service_name)
            .await
            .map_err(BootstrapError::Service)?;

        ensure_directory(&config.log_dir)?;
        let config_rewritten = ensure_log_directive(&config.static_config_path, &config.log_dir)
            .map_err(BootstrapError::LogConfig)?;
        if config_rewritten {
            // The running process must always match the on-disk static
            // configuration after convergence.
            self.supervisor
                .restart(&config.service_name)
                .await
                .map_err(BootstrapError::Service)?;
        }

        ensure_directory(&config.database_path)?;

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.admin_port);
        let became_ready = wait_until_listening(
            addr,
            config.probe_attempts,
            config.probe_interval(),
        )
        .await
        .map_err(BootstrapError::Probe)?;
        if !became_ready {
            warn!(
                %addr,
                attempts = config.probe_attempts,
                "admin port never opened; proceeding anyway"
            );
        }

        let url: Url = format!("http://{}", addr)
            .parse()
            .expect("loopback URL always parses");
        let client = ClientConfig::new(url)
            .auth(config.username.clone(), provisioned.password.clone())
            .build()
            .map_err(|e| BootstrapError::InvalidConfig(e.to_string()))?;

        // Strict ordering: node init, then cluster, then settings.
        client
            .initialize_node(&config.database_path.display().to_string())
            .await?;
        client.create_or_update_cluster(config.memory_quota_mb).await?;
        client
            .apply_settings(
                "web",
                &[
                    ("username", config.username.clone()),
                    ("password", provisioned.password.clone()),
                    ("port", config.admin_port.to_string()),
                ],
            )
            .await?;

        info!(service = %config.service_name, "node converged");
        Ok(BootstrapReport {
            password_generated: provisioned.generated,
            config_rewritten,
            became_ready,
        })
    }
}
