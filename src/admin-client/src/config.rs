// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::Client;

/// HTTP basic authentication credentials.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for a [`Client`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    url: Url,
    auth: Option<Auth>,
    timeout: Duration,
}

impl ClientConfig {
    /// Constructs a new `ClientConfig` that will target the management API at
    /// the specified URL.
    pub fn new(url: Url) -> ClientConfig {
        ClientConfig {
            url,
            auth: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Enables HTTP basic authentication with the specified username and
    /// password.
    pub fn auth(mut self, username: String, password: String) -> ClientConfig {
        self.auth = Some(Auth { username, password });
        self
    }

    /// Overrides the default per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> ClientConfig {
        self.timeout = timeout;
        self
    }

    /// Builds the [`Client`].
    pub fn build(self) -> Result<Client, anyhow::Error> {
        let inner = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.timeout)
            .build()
            .expect("must build Client");

        Client::new(inner, self.url, self.auth)
    }
}
