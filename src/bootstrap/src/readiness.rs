// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Best-effort readiness probing of the admin port.
//!
//! On a fresh install the server is not listening yet when the service
//! reports started, so the sequence waits a bounded amount of time for the
//! port to open. Exhausting the budget is deliberately not an error: the
//! setup calls that follow surface their own failures if the service truly
//! never comes up.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

/// Default number of probe attempts. [`NodeConfig`](crate::NodeConfig)
/// defaults to this when `probe_attempts` is unset.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default fixed interval between probe attempts, the counterpart of
/// [`DEFAULT_MAX_ATTEMPTS`].
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Polls `addr` with a TCP connect until it accepts a connection, up to
/// `max_attempts` times with a fixed `interval` between attempts.
///
/// Returns `Ok(true)` as soon as a connection succeeds (the connection is
/// closed immediately) and `Ok(false)` if the budget is exhausted.
/// Connection-refused and host-unreachable are the expected "not yet
/// listening" outcomes and are swallowed; any other connect error
/// propagates.
pub async fn wait_until_listening(
    addr: SocketAddr,
    max_attempts: u32,
    interval: Duration,
) -> Result<bool, io::Error> {
    for attempt in 1..=max_attempts {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                drop(stream);
                debug!(%addr, attempt, "service is listening");
                return Ok(true);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::HostUnreachable
                ) =>
            {
                debug!(%addr, attempt, "service not yet listening: {}", err);
            }
            Err(err) => return Err(err),
        }
        if attempt < max_attempts {
            time::sleep(interval).await;
        }
    }
    Ok(false)
}
