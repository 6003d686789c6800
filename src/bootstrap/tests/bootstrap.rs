// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! End-to-end tests of the convergence sequence against recording fakes
//! and a mock management API.

use std::fs;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use tempfile::TempDir;

use cb_bootstrap::credentials::CredentialStore;
use cb_bootstrap::system::{PackageArtifact, PackageInstaller, ServiceSupervisor};
use cb_bootstrap::{Bootstrap, BootstrapError, NodeConfig};

type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct RecordingInstaller {
    events: EventLog,
}

#[async_trait]
impl PackageInstaller for RecordingInstaller {
    async fn ensure_installed(&self, _: &PackageArtifact) -> Result<(), anyhow::Error> {
        self.events.lock().unwrap().push("install".into());
        Ok(())
    }
}

#[derive(Debug)]
struct RecordingSupervisor {
    events: EventLog,
}

#[async_trait]
impl ServiceSupervisor for RecordingSupervisor {
    async fn ensure_running(&self, _: &str) -> Result<(), anyhow::Error> {
        self.events.lock().unwrap().push("service-start".into());
        Ok(())
    }

    async fn restart(&self, _: &str) -> Result<(), anyhow::Error> {
        self.events.lock().unwrap().push("service-restart".into());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryStore {
    password: Mutex<Option<String>>,
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<Option<String>, anyhow::Error> {
        Ok(self.password.lock().unwrap().clone())
    }

    async fn store(&self, password: &str) -> Result<(), anyhow::Error> {
        *self.password.lock().unwrap() = Some(password.into());
        Ok(())
    }
}

#[derive(Clone)]
struct MockAdmin {
    events: EventLog,
    bodies: Arc<Mutex<Vec<String>>>,
}

async fn record(State(state): State<MockAdmin>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, 1 << 20).await.unwrap();
    state
        .events
        .lock()
        .unwrap()
        .push(format!("admin {}", parts.uri.path()));
    state
        .bodies
        .lock()
        .unwrap()
        .push(String::from_utf8(bytes.to_vec()).unwrap());
    Response::new(Body::empty())
}

/// Starts a mock management API on an ephemeral port, recording every
/// request into `events`/`bodies`. Returns the port.
async fn start_mock_admin(events: EventLog, bodies: Arc<Mutex<Vec<String>>>) -> u16 {
    let app = Router::new()
        .fallback(record)
        .with_state(MockAdmin { events, bodies });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

struct Harness {
    _dir: TempDir,
    config: NodeConfig,
    events: EventLog,
    bodies: Arc<Mutex<Vec<String>>>,
    installer: Arc<RecordingInstaller>,
    supervisor: Arc<RecordingSupervisor>,
}

/// Builds a workspace with a static config containing `directive`, plus a
/// mock admin server wired into the configuration.
async fn harness(directive: &str, password: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let static_config = dir.path().join("static_config");
    fs::write(
        &static_config,
        format!("{{ns_server, [{{path, \"/opt\"}}]}}.\n{}\n", directive),
    )
    .unwrap();

    let events: EventLog = Arc::default();
    let bodies: Arc<Mutex<Vec<String>>> = Arc::default();
    let port = start_mock_admin(Arc::clone(&events), Arc::clone(&bodies)).await;

    let config: NodeConfig = toml::from_str(&format!(
        r#"
            package_file = "couchbase-server.deb"
            package_url = "http://packages.example.com/couchbase-server.deb"
            username = "admin"
            {password}
            log_dir = {log_dir:?}
            database_path = {database_path:?}
            memory_quota_mb = 1024
            static_config_path = {static_config:?}
            admin_port = {port}
            probe_attempts = 3
            probe_interval_ms = 0
        "#,
        password = match password {
            Some(p) => format!("password = \"{}\"", p),
            None => String::new(),
        },
        log_dir = dir.path().join("logs"),
        database_path = dir.path().join("data"),
        static_config = static_config,
    ))
    .unwrap();

    Harness {
        installer: Arc::new(RecordingInstaller {
            events: Arc::clone(&events),
        }),
        supervisor: Arc::new(RecordingSupervisor {
            events: Arc::clone(&events),
        }),
        _dir: dir,
        config,
        events,
        bodies,
    }
}

impl Harness {
    fn bootstrap(&self, store: Option<Arc<dyn CredentialStore>>) -> Bootstrap {
        Bootstrap::new(
            self.config.clone(),
            Arc::clone(&self.installer) as Arc<dyn PackageInstaller>,
            Arc::clone(&self.supervisor) as Arc<dyn ServiceSupervisor>,
            store,
        )
    }

    fn recorded(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

fn stale_directive() -> String {
    "{error_logger_mf_dir, \"/opt/couchbase/var/lib/couchbase/logs\"}.".into()
}

#[tokio::test]
async fn test_full_sequence_in_order() {
    let h = harness(&stale_directive(), None).await;
    let store = Arc::new(MemoryStore::default());

    let report = h.bootstrap(Some(store)).run().await.unwrap();

    assert!(report.password_generated);
    assert!(report.config_rewritten);
    assert!(report.became_ready);
    assert_eq!(
        h.recorded(),
        [
            "install",
            "service-start",
            "service-restart",
            "admin /nodes/self/controller/settings",
            "admin /pools/default",
            "admin /settings/web",
        ]
    );

    let bodies = h.bodies.lock().unwrap();
    assert!(bodies[0].starts_with("path="));
    assert_eq!(bodies[1], "memoryQuota=1024");
    assert!(bodies[2].starts_with("username=admin&password="));
    assert!(bodies[2].ends_with(&format!("&port={}", h.config.admin_port)));
}

#[tokio::test]
async fn test_current_directive_skips_restart() {
    let h = harness(&stale_directive(), Some("hunter2")).await;
    // The harness log dir is only known after construction; rewrite the
    // static config so the desired line is already present.
    fs::write(
        &h.config.static_config_path,
        format!(
            "{{ns_server, [{{path, \"/opt\"}}]}}.\n{}\n",
            cb_bootstrap::logconf::render_log_directive(&h.config.log_dir)
        ),
    )
    .unwrap();

    let report = h.bootstrap(None).run().await.unwrap();

    assert!(!report.config_rewritten);
    assert!(!h.recorded().contains(&"service-restart".to_string()));
    assert_eq!(
        h.recorded(),
        [
            "install",
            "service-start",
            "admin /nodes/self/controller/settings",
            "admin /pools/default",
            "admin /settings/web",
        ]
    );
}

#[tokio::test]
async fn test_standalone_missing_password_fails_before_side_effects() {
    let h = harness(&stale_directive(), None).await;

    match h.bootstrap(None).run().await {
        Err(BootstrapError::MissingConfig { fields }) => {
            assert_eq!(fields, ["password"]);
        }
        res => panic!("expected MissingConfig, got {:?}", res),
    }
    assert!(h.recorded().is_empty(), "no side effect may precede the error");
}

#[tokio::test]
async fn test_missing_fields_are_reported_together() {
    let mut h = harness(&stale_directive(), None).await;
    h.config.username = String::new();
    h.config.package_url = String::new();

    match h.bootstrap(None).run().await {
        Err(BootstrapError::MissingConfig { fields }) => {
            assert_eq!(fields, ["package_url", "username", "password"]);
        }
        res => panic!("expected MissingConfig, got {:?}", res),
    }
    assert!(h.recorded().is_empty());
}

#[tokio::test]
async fn test_password_survives_reruns() {
    let h = harness(&stale_directive(), None).await;
    let store: Arc<MemoryStore> = Arc::default();

    let first = h
        .bootstrap(Some(Arc::clone(&store) as Arc<dyn CredentialStore>))
        .run()
        .await
        .unwrap();
    assert!(first.password_generated);
    let first_password = extract_password(&h.bodies.lock().unwrap()[2]);

    let second = h
        .bootstrap(Some(store as Arc<dyn CredentialStore>))
        .run()
        .await
        .unwrap();
    assert!(!second.password_generated);
    let second_password = extract_password(&h.bodies.lock().unwrap()[5]);

    assert_eq!(first_password, second_password);
}

fn extract_password(web_settings_body: &str) -> String {
    web_settings_body
        .split('&')
        .find_map(|pair| pair.strip_prefix("password="))
        .expect("web settings body must carry a password")
        .to_string()
}

#[tokio::test]
async fn test_unready_service_is_not_fatal_by_itself() {
    let mut h = harness(&stale_directive(), Some("hunter2")).await;
    // Point the probe (and the admin client) at a port nothing listens on.
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    h.config.admin_port = unused.local_addr().unwrap().port();
    drop(unused);

    // The sequence proceeds past the probe and fails on the first admin
    // call instead, as a transport error.
    match h.bootstrap(None).run().await {
        Err(BootstrapError::Admin(err)) => assert!(!err.is_server_rejection()),
        res => panic!("expected Admin transport error, got {:?}", res),
    }
    // Host-level convergence had already happened.
    assert_eq!(h.recorded(), ["install", "service-start", "service-restart"]);
}
