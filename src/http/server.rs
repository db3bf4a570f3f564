//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the drive and health handlers
//! - Wire up middleware (tracing, request id, body limit, security headers,
//!   maintenance gate)
//! - Own the shared state: config snapshot, limiter, collaborators
//! - Start the limiter sweeper and apply hot-reloaded configuration
//! - Serve the admin API on its own listener when enabled

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::DriveConfig;
use crate::drive::{DirectoryResolver, FileOperations, IdentityResolver, LocalDrive};
use crate::gatekeeper::Pipeline;
use crate::http::drive as handlers;
use crate::http::middleware::{backpressure_middleware, maintenance_middleware};
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::security::headers;
use crate::security::rate_limit::{RateLimitPolicy, RateLimiter};
use crate::security::session::SessionAuthenticator;

/// Everything derived from one configuration snapshot.
pub struct Snapshot {
    pub config: DriveConfig,
    pub authenticator: SessionAuthenticator,
}

impl Snapshot {
    fn new(config: DriveConfig) -> Self {
        Self {
            authenticator: SessionAuthenticator::new(&config.session),
            config,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<Snapshot>>,
    pub limiter: Arc<RateLimiter>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub drive: Arc<dyn FileOperations>,
    /// Bounds requests in flight at `listener.max_connections`.
    pub in_flight: Arc<Semaphore>,
    pub started_at: Instant,
}

impl AppState {
    /// State with the local directory resolver and local drive.
    pub fn new(config: DriveConfig) -> Self {
        let resolver = Arc::new(DirectoryResolver::new(&config.storage.base_dir));
        let drive = Arc::new(LocalDrive::new(config.security.max_upload_bytes));
        Self::with_collaborators(config, resolver, drive)
    }

    pub fn with_collaborators(
        config: DriveConfig,
        resolver: Arc<dyn IdentityResolver>,
        drive: Arc<dyn FileOperations>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(RateLimitPolicy::from(&config.rate_limit)));
        Self {
            in_flight: Arc::new(Semaphore::new(config.listener.max_connections)),
            inner: Arc::new(ArcSwap::from_pointee(Snapshot::new(config))),
            limiter,
            resolver,
            drive,
            started_at: Instant::now(),
        }
    }

    /// The configuration snapshot a request should use from start to finish.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.load_full()
    }

    pub fn pipeline(&self, snapshot: &Snapshot) -> Pipeline {
        Pipeline::new(
            snapshot.authenticator.clone(),
            Arc::clone(&self.limiter),
            Arc::clone(&self.resolver),
        )
    }

    /// Swap in a reloaded configuration.
    ///
    /// Rate and burst apply to existing buckets immediately. Listener, body
    /// limit, storage base, sweep interval and the in-flight bound keep their
    /// startup values.
    pub fn apply_config(&self, config: DriveConfig) {
        self.limiter.update_policy(RateLimitPolicy::from(&config.rate_limit));
        tracing::info!(
            maintenance = config.maintenance.enabled,
            request_timeout_secs = config.timeouts.request_secs,
            "Configuration snapshot swapped"
        );
        self.inner.store(Arc::new(Snapshot::new(config)));
    }
}

/// HTTP server for the drive gatekeeper.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: DriveConfig) -> Self {
        Self::with_state(AppState::new(config))
    }

    pub fn with_state(state: AppState) -> Self {
        let router = Self::build_router(&state.snapshot().config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &DriveConfig, state: AppState) -> Router {
        let drive_routes = Router::new()
            .route("/drive/create", post(handlers::create_folder))
            .route("/drive/delete", delete(handlers::delete))
            .route("/drive/rename", put(handlers::rename))
            .route("/drive/upload", post(handlers::upload))
            .route("/drive/", get(handlers::read_root))
            .route("/drive/{*path}", get(handlers::read))
            .route_layer(middleware::from_fn_with_state(state.clone(), maintenance_middleware));

        let router = Router::new()
            .route("/health", get(health))
            .merge(drive_routes)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(middleware::from_fn_with_state(state.clone(), backpressure_middleware))
            .with_state(state);

        let router = if config.security.enable_headers {
            headers::apply_security_headers(router)
        } else {
            router
        };

        router
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The router without a listener, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<DriveConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        self.start_background(config_updates, &shutdown).await?;

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<DriveConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        self.start_background(config_updates, &shutdown).await?;

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTPS server received shutdown signal");
            drain.graceful_shutdown(Some(Duration::from_secs(10)));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, tls).handle(handle).serve(app).await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// Sweeper, config reload loop and admin listener.
    async fn start_background(
        &self,
        mut config_updates: mpsc::UnboundedReceiver<DriveConfig>,
        shutdown: &broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        self.state.limiter.start_sweeper(shutdown.resubscribe());

        let state = self.state.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => state.apply_config(config),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        let admin = self.state.snapshot().config.admin.clone();
        if admin.enabled {
            let admin_listener = TcpListener::bind(&admin.bind_address).await?;
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");

            let admin_app = setup_admin_router(self.state.clone());
            let mut admin_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                let served = axum::serve(admin_listener, admin_app)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API server failed");
                }
            });
        }
        Ok(())
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
