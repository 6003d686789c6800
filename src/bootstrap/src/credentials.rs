// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Credential provisioning for the service administrator account.
//!
//! The password is generated at most once. A regenerated password would
//! desynchronize the credentials already applied to an initialized cluster,
//! so every later run must observe the value persisted by the first.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::{debug, info};

use crate::config::NodeConfig;
use crate::error::BootstrapError;

const GENERATED_PASSWORD_LEN: usize = 32;

/// The outcome of credential provisioning.
#[derive(Clone)]
pub struct ProvisionedPassword {
    /// The administrator password to use for this run.
    pub password: String,
    /// Whether the password was freshly generated (and persisted) by this
    /// run.
    pub generated: bool,
}

impl fmt::Debug for ProvisionedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedPassword")
            .field("password", &"<redacted>")
            .field("generated", &self.generated)
            .finish()
    }
}

/// The persistence seam for generated credentials.
#[async_trait]
pub trait CredentialStore: fmt::Debug + Send + Sync {
    /// Loads the previously persisted password, if any.
    async fn load(&self) -> Result<Option<String>, anyhow::Error>;
    /// Persists the password for future runs.
    async fn store(&self, password: &str) -> Result<(), anyhow::Error>;
}

/// Ensures an administrator password exists.
///
/// With no store available (standalone mode) the password must already be
/// present in the configuration; absence is a fatal configuration error.
/// Otherwise an explicitly configured password wins, a previously stored
/// password is reused, and only as a last resort is a fresh one generated
/// and persisted.
pub async fn ensure_password(
    config: &NodeConfig,
    store: Option<&dyn CredentialStore>,
) -> Result<ProvisionedPassword, BootstrapError> {
    if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
        return Ok(ProvisionedPassword {
            password: password.into(),
            generated: false,
        });
    }

    let store = match store {
        Some(store) => store,
        None => {
            return Err(BootstrapError::MissingConfig {
                fields: vec!["password".into()],
            })
        }
    };

    if let Some(password) = store
        .load()
        .await
        .map_err(BootstrapError::Credentials)?
        .filter(|p| !p.is_empty())
    {
        debug!("reusing previously provisioned administrator password");
        return Ok(ProvisionedPassword {
            password,
            generated: false,
        });
    }

    let password = generate_password();
    store
        .store(&password)
        .await
        .map_err(BootstrapError::Credentials)?;
    info!("generated and persisted a new administrator password");
    Ok(ProvisionedPassword {
        password,
        generated: true,
    })
}

fn generate_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// A [`CredentialStore`] backed by a single file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store rooted at `state_dir`. The directory is created on
    /// first write.
    pub fn new(state_dir: &Path) -> FileCredentialStore {
        FileCredentialStore {
            path: state_dir.join("admin-password"),
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<String>, anyhow::Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents.trim_end_matches('\n').to_string())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn store(&self, password: &str) -> Result<(), anyhow::Error> {
        let dir = self
            .path
            .parent()
            .expect("store path always has a parent directory");
        tokio::fs::create_dir_all(dir).await?;
        let mut contents = password.to_string();
        contents.push('\n');
        tokio::fs::write(&self.path, contents).await?;
        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }
}
