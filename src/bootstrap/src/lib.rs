// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Convergence logic that takes a single database server node from
//! "uninstalled" to "configured and serving".
//!
//! The flow is strictly sequential: provision credentials, install the
//! package, start the service, patch the log directory into the static
//! configuration (restarting on change), wait for the admin port to open,
//! then issue the three idempotent cluster setup calls. Every step is
//! individually idempotent, so re-running the whole sequence converges
//! instead of duplicating effects.
//!
//! Package installation and service control are collaborator seams (see
//! [`system`]); production implementations that shell out to the host live
//! in [`host`], and tests substitute recording fakes.

pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod error;
pub mod host;
pub mod logconf;
pub mod readiness;
pub mod system;

pub use bootstrap::{Bootstrap, BootstrapReport};
pub use config::NodeConfig;
pub use error::BootstrapError;
