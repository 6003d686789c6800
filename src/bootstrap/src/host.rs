// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Production collaborators that act on the local host.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::system::{PackageArtifact, PackageFormat, PackageInstaller, ServiceSupervisor};

/// Unattended answer file for the platform installer, equivalent to
/// recording an interactive run that accepts every default.
const INSTALLER_ANSWER_FILE: &str = "\
[InstallShield Silent]
Version=v7.00
File=Response File
[File Transfer]
OverwrittenReadOnly=NoToAll
[Application]
Name=Couchbase Server
Lang=0009
[{A561D6D2-6C55-4C09-A68A-F4F5A1A97CA4}-DlgOrder]
Dlg0={A561D6D2-6C55-4C09-A68A-F4F5A1A97CA4}-SdWelcome-0
Count=3
Dlg1={A561D6D2-6C55-4C09-A68A-F4F5A1A97CA4}-SdAskDestPath-0
Dlg2={A561D6D2-6C55-4C09-A68A-F4F5A1A97CA4}-SdStartCopy-0
[{A561D6D2-6C55-4C09-A68A-F4F5A1A97CA4}-SdWelcome-0]
Result=1
[{A561D6D2-6C55-4C09-A68A-F4F5A1A97CA4}-SdAskDestPath-0]
Result=1
[{A561D6D2-6C55-4C09-A68A-F4F5A1A97CA4}-SdStartCopy-0]
Result=1
";

/// Installs artifacts with the host's native package manager, caching the
/// downloaded artifact so reruns skip the fetch.
#[derive(Debug)]
pub struct HostPackageInstaller {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl HostPackageInstaller {
    /// Creates an installer caching artifacts under `cache_dir`.
    pub fn new(cache_dir: PathBuf) -> HostPackageInstaller {
        HostPackageInstaller {
            cache_dir,
            client: reqwest::Client::new(),
        }
    }

    /// Downloads the artifact into the cache unless it is already there,
    /// returning the cached path.
    async fn fetch_if_missing(&self, artifact: &PackageArtifact) -> Result<PathBuf, anyhow::Error> {
        let target = self.cache_dir.join(&artifact.file);
        if tokio::fs::try_exists(&target).await? {
            debug!(path = %target.display(), "package artifact already cached");
            return Ok(target);
        }

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        info!(url = %artifact.url, "fetching package artifact");
        let mut res = self
            .client
            .get(artifact.url.clone())
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .with_context(|| format!("fetching {}", artifact.url))?;

        // Stream into a sibling temp path; the rename publishes the
        // artifact only once it is fully written, so an interrupted fetch
        // never leaves a truncated file at the cached path.
        let partial = target.with_extension("partial");
        let mut file = tokio::fs::File::create(&partial).await?;
        while let Some(chunk) = res.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, &target).await?;
        Ok(target)
    }

    async fn write_answer_file(&self) -> Result<PathBuf, anyhow::Error> {
        let path = self.cache_dir.join("setup.iss");
        tokio::fs::write(&path, INSTALLER_ANSWER_FILE).await?;
        Ok(path)
    }
}

#[async_trait]
impl PackageInstaller for HostPackageInstaller {
    async fn ensure_installed(&self, artifact: &PackageArtifact) -> Result<(), anyhow::Error> {
        let package = self.fetch_if_missing(artifact).await?;
        match artifact.format {
            PackageFormat::Deb => {
                run_command(Command::new("dpkg").arg("-i").arg(&package)).await?;
            }
            PackageFormat::Rpm => {
                // The server links against libssl.so.6, which rpm-family
                // hosts only provide through the legacy compat package.
                run_command(Command::new("yum").args(["install", "-y", "openssl098e"])).await?;
                run_command(Command::new("rpm").args(["-U", "--replacepkgs"]).arg(&package))
                    .await?;
            }
            PackageFormat::Installer => {
                let answer_file = self.write_answer_file().await?;
                run_command(
                    Command::new(&package)
                        .arg("/s")
                        .arg(format!("/f1{}", answer_file.display())),
                )
                .await?;
            }
        }
        info!(package = %package.display(), "package installed");
        Ok(())
    }
}

/// Drives a system service through `systemctl`.
#[derive(Debug, Default)]
pub struct SystemdSupervisor;

#[async_trait]
impl ServiceSupervisor for SystemdSupervisor {
    async fn ensure_running(&self, name: &str) -> Result<(), anyhow::Error> {
        run_command(Command::new("systemctl").args(["enable", "--now", name])).await?;
        debug!(service = name, "service enabled and started");
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), anyhow::Error> {
        run_command(Command::new("systemctl").args(["restart", name])).await?;
        info!(service = name, "service restarted");
        Ok(())
    }
}

async fn run_command(command: &mut Command) -> Result<(), anyhow::Error> {
    let program = Path::new(command.as_std().get_program())
        .file_name()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let output = command
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("spawning {}", program))?;
    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
