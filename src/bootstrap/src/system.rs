// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Collaborator seams for host-level resource management.
//!
//! The convergence sequence only decides *what* must hold on the host —
//! package installed, service running — and delegates *how* to these
//! traits. Every operation is contractually idempotent: asserting a state
//! that already holds must be a harmless no-op, which is what makes
//! re-running the whole sequence safe.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use crate::config::NodeConfig;
use crate::error::BootstrapError;

/// A package artifact to fetch and install.
#[derive(Debug, Clone)]
pub struct PackageArtifact {
    /// The artifact's file name, used for caching and format inference.
    pub file: String,
    /// Where the artifact is fetched from.
    pub url: Url,
    /// The package format, resolved from the file name.
    pub format: PackageFormat,
}

impl PackageArtifact {
    /// Resolves the artifact named by the configuration.
    pub fn from_config(config: &NodeConfig) -> Result<PackageArtifact, BootstrapError> {
        let url = config
            .package_url
            .parse::<Url>()
            .map_err(|e| BootstrapError::InvalidConfig(format!("package_url: {}", e)))?;
        let format = PackageFormat::from_file_name(&config.package_file).ok_or_else(|| {
            BootstrapError::InvalidConfig(format!(
                "package_file {:?} has an unrecognized package format",
                config.package_file
            ))
        })?;
        Ok(PackageArtifact {
            file: config.package_file.clone(),
            url,
            format,
        })
    }
}

/// The native package format of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFormat {
    /// A Debian package, installed with `dpkg`.
    Deb,
    /// An RPM package, installed with `rpm`.
    Rpm,
    /// A platform installer run unattended with a generated answer file.
    Installer,
}

impl PackageFormat {
    /// Infers the format from an artifact file name.
    pub fn from_file_name(name: &str) -> Option<PackageFormat> {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".deb") {
            Some(PackageFormat::Deb)
        } else if name.ends_with(".rpm") {
            Some(PackageFormat::Rpm)
        } else if name.ends_with(".exe") {
            Some(PackageFormat::Installer)
        } else {
            None
        }
    }
}

/// Installs package artifacts on the host.
#[async_trait]
pub trait PackageInstaller: fmt::Debug + Send + Sync {
    /// Ensures the artifact is installed.
    ///
    /// Idempotent: if the package is already installed, this is a no-op (or
    /// a harmless re-assert).
    async fn ensure_installed(&self, artifact: &PackageArtifact) -> Result<(), anyhow::Error>;
}

/// Controls a named system service.
#[async_trait]
pub trait ServiceSupervisor: fmt::Debug + Send + Sync {
    /// Ensures the service is enabled and running. Idempotent.
    async fn ensure_running(&self, name: &str) -> Result<(), anyhow::Error>;

    /// Restarts the service so it picks up changed on-disk configuration.
    async fn restart(&self, name: &str) -> Result<(), anyhow::Error>;
}

/// Ensures a managed directory exists, creating parents as needed, with
/// mode 0755 on Unix.
pub fn ensure_directory(path: &Path) -> Result<(), BootstrapError> {
    let fail = |source: io::Error| BootstrapError::Filesystem {
        path: PathBuf::from(path),
        source,
    };
    std::fs::create_dir_all(path).map_err(fail)?;
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, Permissions::from_mode(0o755)).map_err(fail)?;
    }
    Ok(())
}
