//! Upload HTTP server.
//!
//! Binds a TCP listener, serves the upload routes over plain HTTP or TLS and
//! shuts down gracefully when its cancellation token fires.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::head;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;

use direct_upload_store::FileStore;

use crate::ServerError;
use crate::auth::Authenticator;
use crate::handlers;

/// How long in-flight requests may run after shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:8080` (port 0 = OS-assigned).
    pub address: String,

    /// PEM certificate chain. TLS is enabled when both files are set.
    pub cert_file: Option<PathBuf>,

    /// PEM private key matching `cert_file`.
    pub key_file: Option<PathBuf>,

    /// Time allowed to receive a request's headers.
    pub header_timeout: Duration,

    /// Longest wait for the next chunk of a request body. A stalled upload
    /// fails after this and releases its file.
    pub body_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".into(),
            cert_file: None,
            key_file: None,
            header_timeout: Duration::from_secs(10),
            body_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn FileStore>,
    pub auth: Arc<dyn Authenticator>,
}

/// The upload server.
pub struct UploadServer {
    config: ServerConfig,
    state: AppState,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl UploadServer {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn FileStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config,
            state: AppState { store, auth },
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Gracefully shuts down the server.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Builds the router with authentication, tracing and panic recovery.
    pub fn router(&self) -> Router {
        router(self.state.clone(), self.config.body_timeout)
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind(&self.config.address).await?;
        Ok(listener)
    }

    /// Serves requests on `listener` until cancellation.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let result = self.serve_until_cancelled(listener).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Binds and serves until cancellation.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    async fn serve_until_cancelled(&self, listener: TcpListener) -> Result<(), ServerError> {
        let tls = self.tls_config().await?;
        let local_addr: SocketAddr = listener.local_addr()?;
        let listener = listener.into_std()?;

        let handle = Handle::new();
        let watcher = {
            let handle = handle.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                tracing::info!("server shutting down");
                handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            })
        };

        let app = self.router().into_make_service();
        let result = match tls {
            Some(tls) => {
                tracing::info!("upload server listening on https://{local_addr}");
                let mut server = axum_server::from_tcp_rustls(listener, tls).handle(handle);
                limit_header_read(server.http_builder(), self.config.header_timeout);
                server.serve(app).await
            }
            None => {
                tracing::info!("upload server listening on http://{local_addr}");
                let mut server = axum_server::from_tcp(listener).handle(handle);
                limit_header_read(server.http_builder(), self.config.header_timeout);
                server.serve(app).await
            }
        };

        watcher.abort();
        result?;
        Ok(())
    }

    /// Loads the certificate pair, or `None` for plain HTTP.
    async fn tls_config(&self) -> Result<Option<RustlsConfig>, ServerError> {
        match (&self.config.cert_file, &self.config.key_file) {
            (Some(cert), Some(key)) => {
                tracing::info!(
                    cert = %cert.display(),
                    key = %key.display(),
                    "using TLS certificate"
                );
                let config = RustlsConfig::from_pem_file(cert, key)
                    .await
                    .map_err(ServerError::Tls)?;
                Ok(Some(config))
            }
            (None, None) => Ok(None),
            _ => Err(ServerError::IncompleteTls),
        }
    }
}

fn limit_header_read(builder: &mut Builder<TokioExecutor>, timeout: Duration) {
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeout);
}

pub(crate) fn router(state: AppState, body_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/:file",
            head(handlers::handle_head)
                .put(handlers::handle_put)
                .post(handlers::handle_post)
                .delete(handlers::handle_delete),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_auth,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyTimeoutLayer::new(body_timeout))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
