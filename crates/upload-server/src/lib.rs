//! HTTP front end for the resumable upload store.
//!
//! Routes `HEAD`/`PUT`/`POST`/`DELETE /{file}` to the store's `stat`,
//! `append` and `close` operations behind HTTP Basic authentication. Store
//! calls block, so every handler runs them on the blocking thread pool.

mod auth;
mod handlers;
mod server;

pub use auth::{Authenticator, StaticAuthenticator, basic_credentials};
pub use server::{AppState, ServerConfig, UploadServer};

/// Errors produced by the upload server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server already running")]
    AlreadyRunning,

    #[error("cert_file and key_file must be set together")]
    IncompleteTls,

    #[error("failed to load TLS certificate: {0}")]
    Tls(#[source] std::io::Error),
}
