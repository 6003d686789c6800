// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The node configuration threaded through every convergence step.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Everything the convergence run needs to know about the node.
///
/// Deserialized from a TOML file; individual fields may be overridden by
/// command-line flags or the environment. The configuration is passed to
/// each step explicitly rather than living in ambient state.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// File name of the server package artifact, e.g.
    /// `couchbase-server-enterprise_2.0.0_x86_64.deb`. The package format is
    /// inferred from its extension.
    #[serde(default)]
    pub package_file: String,
    /// Full URL the package artifact is fetched from.
    #[serde(default)]
    pub package_url: String,
    /// Administrator username for the cluster.
    #[serde(default)]
    pub username: String,
    /// Administrator password. Optional when a credential store is
    /// available; required in standalone mode.
    #[serde(default)]
    pub password: Option<String>,
    /// Directory the server's error logger is pointed at.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// On-disk data directory for the node.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Cluster-wide memory quota, in megabytes.
    #[serde(default = "default_memory_quota_mb")]
    pub memory_quota_mb: u64,
    /// The server's static configuration file, which carries the
    /// `error_logger_mf_dir` directive.
    #[serde(default = "default_static_config_path")]
    pub static_config_path: PathBuf,
    /// Name of the system service to supervise.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Port of the management API on the local host.
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    /// Directory downloaded package artifacts are cached in.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Maximum number of readiness probe attempts.
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    /// Milliseconds to sleep between readiness probe attempts.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

fn default_log_dir() -> PathBuf {
    "/opt/couchbase/var/lib/couchbase/logs".into()
}

fn default_database_path() -> PathBuf {
    "/opt/couchbase/var/lib/couchbase/data".into()
}

fn default_memory_quota_mb() -> u64 {
    256
}

fn default_static_config_path() -> PathBuf {
    "/opt/couchbase/etc/couchbase/static_config".into()
}

fn default_service_name() -> String {
    "couchbase-server".into()
}

fn default_admin_port() -> u16 {
    8091
}

fn default_cache_dir() -> PathBuf {
    "/var/cache/cb-setup".into()
}

fn default_probe_attempts() -> u32 {
    crate::readiness::DEFAULT_MAX_ATTEMPTS
}

fn default_probe_interval_ms() -> u64 {
    crate::readiness::DEFAULT_INTERVAL.as_millis() as u64
}

impl Default for NodeConfig {
    fn default() -> NodeConfig {
        NodeConfig {
            package_file: String::new(),
            package_url: String::new(),
            username: String::new(),
            password: None,
            log_dir: default_log_dir(),
            database_path: default_database_path(),
            memory_quota_mb: default_memory_quota_mb(),
            static_config_path: default_static_config_path(),
            service_name: default_service_name(),
            admin_port: default_admin_port(),
            cache_dir: default_cache_dir(),
            probe_attempts: default_probe_attempts(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

impl NodeConfig {
    /// Returns the names of all required fields that are absent, in one
    /// pass. The password is only required when no credential store is
    /// available to generate and persist one (`standalone`).
    pub fn missing_required_fields(&self, standalone: bool) -> Vec<String> {
        let mut missing = Vec::new();
        if self.package_file.is_empty() {
            missing.push("package_file".into());
        }
        if self.package_url.is_empty() {
            missing.push("package_url".into());
        }
        if self.username.is_empty() {
            missing.push("username".into());
        }
        if standalone && self.password.as_deref().map_or(true, str::is_empty) {
            missing.push("password".into());
        }
        missing
    }

    /// The interval between readiness probe attempts.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}
