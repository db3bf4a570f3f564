//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;

use drive_gatekeeper::config::DriveConfig;
use drive_gatekeeper::http::{AppState, HttpServer};
use drive_gatekeeper::lifecycle::Shutdown;
use drive_gatekeeper::security::session::SessionAuthenticator;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const SIGNING_KEY: &str = "integration-test-signing-key";

/// A gatekeeper serving on an ephemeral port with a private storage base.
pub struct TestServer {
    pub addr: SocketAddr,
    pub storage: TempDir,
    pub config: DriveConfig,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<DriveConfig>,
    client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `Cookie` header value for `user_id`.
    pub fn cookie(&self, user_id: u64) -> String {
        let auth = SessionAuthenticator::new(&self.config.session);
        let token = auth.issue(user_id, &format!("user{}@example.com", user_id)).unwrap();
        format!("{}={}", self.config.session.cookie_name, token)
    }

    pub fn user_root(&self, user_id: u64) -> std::path::PathBuf {
        self.storage.path().join(user_id.to_string())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn test_config(storage: &TempDir) -> DriveConfig {
    let mut config = DriveConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.session.signing_key = SIGNING_KEY.into();
    config.storage.base_dir = storage.path().to_path_buf();
    config.observability.metrics_enabled = false;
    config
}

/// Start a server with the default collaborators.
pub async fn start_server<F>(customize: F) -> TestServer
where
    F: FnOnce(&mut DriveConfig),
{
    start_server_with(customize, AppState::new).await
}

/// Start a server whose state is built by `make_state`, for custom collaborators.
pub async fn start_server_with<F, S>(customize: F, make_state: S) -> TestServer
where
    F: FnOnce(&mut DriveConfig),
    S: FnOnce(DriveConfig) -> AppState,
{
    let storage = tempfile::tempdir().unwrap();
    let mut config = test_config(&storage);
    customize(&mut config);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (updates, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::with_state(make_state(config.clone()));
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestServer {
        addr,
        storage,
        config,
        shutdown,
        updates,
        client,
    }
}
