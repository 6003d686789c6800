// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::io;
use std::path::PathBuf;

use cb_admin_client::AdminError;

/// Errors that can abort a convergence run.
///
/// Steps never terminate the process themselves; every failure propagates
/// through this enum to the caller, which decides exit behavior.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Required configuration is absent. Lists every offending field at
    /// once so the operator can fix them all in one pass.
    #[error("missing required configuration: {}", fields.join(", "))]
    MissingConfig {
        /// The names of all missing fields.
        fields: Vec<String>,
    },
    /// Configuration was present but unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The credential store could not be read or written.
    #[error("credential store failure: {0}")]
    Credentials(#[source] anyhow::Error),
    /// Reading or rewriting the static configuration file failed.
    #[error("static configuration rewrite failed: {0}")]
    LogConfig(#[source] io::Error),
    /// A managed directory could not be created.
    #[error("creating directory {} failed: {source}", path.display())]
    Filesystem {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: io::Error,
    },
    /// The readiness probe failed in a way other than the service not yet
    /// listening.
    #[error("probing the admin port failed: {0}")]
    Probe(#[source] io::Error),
    /// The package installer collaborator reported a failure.
    #[error("package installation failed: {0}")]
    Install(#[source] anyhow::Error),
    /// The service supervisor collaborator reported a failure.
    #[error("service control failed: {0}")]
    Service(#[source] anyhow::Error),
    /// A cluster setup call was rejected or could not be delivered.
    #[error("cluster setup call failed: {0}")]
    Admin(#[from] AdminError),
}
