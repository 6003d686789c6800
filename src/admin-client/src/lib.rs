// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! An API client for the Couchbase cluster management REST API.
//!
//! The client exposes only the handful of setup endpoints that node
//! bootstrapping needs. Each operation is idempotent on the server side:
//! re-issuing a call with the same values leaves the cluster in the same
//! state, which is what lets a convergence run be safely repeated.

use reqwest::{Method, RequestBuilder, StatusCode};
use tracing::debug;
use url::Url;

mod config;

pub use config::{Auth, ClientConfig};

/// An API client for the cluster management API of a single node.
///
/// Construct with [`ClientConfig::build`].
#[derive(Debug)]
pub struct Client {
    inner: reqwest::Client,
    url: Url,
    auth: Option<Auth>,
}

impl Client {
    pub(crate) fn new(
        inner: reqwest::Client,
        url: Url,
        auth: Option<Auth>,
    ) -> Result<Self, anyhow::Error> {
        if url.cannot_be_a_base() {
            anyhow::bail!("cannot construct an admin client with a cannot-be-a-base URL");
        }
        Ok(Client { inner, url, auth })
    }

    /// Sets the data directory for a freshly-installed node.
    ///
    /// Safe to call on an already-initialized node; the server re-asserts the
    /// path without disturbing existing data.
    pub async fn initialize_node(&self, database_path: &str) -> Result<(), AdminError> {
        let req = self.make_request(Method::POST, &["nodes", "self", "controller", "settings"]);
        let req = req.form(&[("path", database_path)]);
        self.send_request(req).await
    }

    /// Creates the cluster on this node, or updates its memory quota if the
    /// cluster already exists.
    pub async fn create_or_update_cluster(&self, memory_quota_mb: u64) -> Result<(), AdminError> {
        let req = self.make_request(Method::POST, &["pools", "default"]);
        let req = req.form(&[("memoryQuota", memory_quota_mb.to_string())]);
        self.send_request(req).await
    }

    /// Applies settings within the named scope, e.g. the administrative
    /// credentials and console port within the `web` scope.
    pub async fn apply_settings(
        &self,
        scope: &str,
        settings: &[(&str, String)],
    ) -> Result<(), AdminError> {
        let req = self.make_request(Method::POST, &["settings", scope]);
        let req = req.form(settings);
        self.send_request(req).await
    }

    fn make_request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .expect("constructor validated URL can be a base")
            .extend(segments);
        let mut req = self.inner.request(method, url);
        if let Some(auth) = &self.auth {
            req = req.basic_auth(&auth.username, Some(&auth.password));
        }
        req
    }

    async fn send_request(&self, req: RequestBuilder) -> Result<(), AdminError> {
        let res = req.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let message = match res.text().await {
            Ok(body) if !body.is_empty() => body,
            _ => "unable to decode error details".into(),
        };
        debug!(%status, body = %message, "management API rejected request");
        Err(AdminError::Server { status, message })
    }
}

/// Errors returned by [`Client`] operations.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// The request could not be delivered or the response could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server rejected the request.
    #[error("server error {status}: {message}")]
    Server {
        /// The HTTP status code of the response.
        status: StatusCode,
        /// The response body, if one could be read.
        message: String,
    },
}

impl AdminError {
    /// Reports whether the error is a rejection by the server, as opposed to
    /// a failure to reach it.
    pub fn is_server_rejection(&self) -> bool {
        matches!(self, AdminError::Server { .. })
    }
}
