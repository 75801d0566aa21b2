//! Route handlers and the authentication middleware.

use std::io;

use axum::Extension;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use tokio_util::io::{StreamReader, SyncIoBridge};

use direct_upload_store::{
    CallContext, Principal, StoreError, validate_file_name, validate_username,
};

use crate::auth::basic_credentials;
use crate::server::AppState;

/// Failure of a request, rendered as a bare status code.
#[derive(Debug)]
pub(crate) enum ApiError {
    Store(StoreError),
    /// The blocking task running the store call panicked or was cancelled.
    Worker(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Store(StoreError::Invalid(_)) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Store(StoreError::Io(_)) | Self::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Store(StoreError::Io(e)) => tracing::error!(error = %e, "storage failure"),
            Self::Worker(e) => tracing::error!(error = %e, "store task failed"),
            Self::Store(e) => tracing::debug!(error = %e, %status, "request rejected"),
        }
        status.into_response()
    }
}

/// Runs a blocking store call on the blocking thread pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::Worker(e.to_string())),
    }
}

/// Requires valid Basic credentials and attaches the [`Principal`].
pub(crate) async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some((username, password)) = basic_credentials(req.headers()) {
        if let Err(e) = validate_username(&username) {
            tracing::debug!(username = %username, error = %e, "username not valid");
            return StatusCode::BAD_REQUEST.into_response();
        }

        if state.auth.check(&username, &password) {
            req.extensions_mut().insert(Principal::new(username));
            return next.run(req).await;
        }

        tracing::debug!(username = %username, "bad credentials");
    }

    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=Restricted"),
    );
    response
}

/// `HEAD /{file}`: current size of the upload as `Content-Length`.
pub(crate) async fn handle_head(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    validate_file_name(&file)?;

    let ctx = CallContext::authenticated(principal);
    let info = run_blocking(move || state.store.stat(&ctx, &file)).await?;

    Ok(([(header::CONTENT_LENGTH, info.size.to_string())], ()).into_response())
}

/// `PUT /{file}`: appends the request body.
pub(crate) async fn handle_put(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(file): Path<String>,
    body: Body,
) -> Result<StatusCode, ApiError> {
    validate_file_name(&file)?;

    let stream = body.into_data_stream().map_err(io::Error::other);
    let reader = StreamReader::new(stream);

    let ctx = CallContext::authenticated(principal);
    run_blocking(move || {
        let mut reader = SyncIoBridge::new(reader);
        state.store.append(&ctx, &file, &mut reader)
    })
    .await?;

    Ok(StatusCode::OK)
}

/// `POST /{file}`: closes the upload.
pub(crate) async fn handle_post(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(file): Path<String>,
) -> Result<StatusCode, ApiError> {
    validate_file_name(&file)?;

    let ctx = CallContext::authenticated(principal);
    run_blocking(move || state.store.close(&ctx, &file)).await?;

    Ok(StatusCode::OK)
}

/// `DELETE /{file}`: acknowledged without deleting anything.
pub(crate) async fn handle_delete(
    Extension(principal): Extension<Principal>,
    Path(file): Path<String>,
) -> Result<StatusCode, ApiError> {
    validate_file_name(&file)?;
    tracing::info!(
        username = %principal.username,
        file = %file,
        "delete requested, ignoring"
    );
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::http::Request as HttpRequest;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use direct_upload_store::{LocalFileStore, LocalFileStoreConfig};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::StaticAuthenticator;
    use crate::server::router;

    fn app() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let store = LocalFileStore::new(LocalFileStoreConfig {
            path: dir.path().to_path_buf(),
        });
        let state = AppState {
            store: Arc::new(store),
            auth: Arc::new(StaticAuthenticator::new([("alice", "pw"), ("bob", "pw2")])),
        };
        (dir, router(state, Duration::from_secs(30)))
    }

    fn request(
        method: &str,
        uri: &str,
        creds: Option<&str>,
        body: &'static [u8],
    ) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(creds) = creds {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Basic {}", STANDARD.encode(creds)),
            );
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn send(app: &Router, req: HttpRequest<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    fn content_length(resp: &Response) -> u64 {
        resp.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn missing_credentials_is_unauthorized() {
        let (_dir, app) = app();
        let resp = send(&app, request("HEAD", "/a.bin", None, b"")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=Restricted"
        );
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let (_dir, app) = app();
        let resp = send(&app, request("PUT", "/a.bin", Some("alice:nope"), b"x")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_username_is_bad_request() {
        let (_dir, app) = app();
        let resp = send(&app, request("HEAD", "/a.bin", Some("../root:pw"), b"")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_file_name_is_bad_request() {
        let (_dir, app) = app();
        for uri in ["/.hidden", "/video.part", "/has%20space"] {
            let resp = send(&app, request("PUT", uri, Some("alice:pw"), b"x")).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn head_on_new_upload_is_zero() {
        let (_dir, app) = app();
        let resp = send(&app, request("HEAD", "/new.bin", Some("alice:pw"), b"")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(content_length(&resp), 0);
    }

    #[tokio::test]
    async fn full_upload_flow() {
        let (dir, app) = app();
        let alice = Some("alice:pw");

        let resp = send(&app, request("PUT", "/report.csv", alice, b"hello")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = send(&app, request("PUT", "/report.csv", alice, b" world")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&app, request("HEAD", "/report.csv", alice, b"")).await;
        assert_eq!(content_length(&resp), 11);

        let resp = send(&app, request("POST", "/report.csv", alice, b"")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = send(&app, request("POST", "/report.csv", alice, b"")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&app, request("HEAD", "/report.csv", alice, b"")).await;
        assert_eq!(content_length(&resp), 11);

        let resp = send(&app, request("PUT", "/report.csv", alice, b"!")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        assert_eq!(
            std::fs::read(dir.path().join("alice/report.csv")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn close_without_upload_is_ok() {
        let (_dir, app) = app();
        let resp = send(&app, request("POST", "/ghost.txt", Some("bob:pw2"), b"")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&app, request("HEAD", "/ghost.txt", Some("bob:pw2"), b"")).await;
        assert_eq!(content_length(&resp), 0);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let (_dir, app) = app();
        send(&app, request("PUT", "/same.bin", Some("alice:pw"), b"alice")).await;

        let resp = send(&app, request("HEAD", "/same.bin", Some("bob:pw2"), b"")).await;
        assert_eq!(content_length(&resp), 0);
    }

    #[tokio::test]
    async fn delete_is_acknowledged_only() {
        let (dir, app) = app();
        send(&app, request("PUT", "/keep.bin", Some("alice:pw"), b"data")).await;

        let resp = send(&app, request("DELETE", "/keep.bin", Some("alice:pw"), b"")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(dir.path().join("alice/keep.bin.part").exists());
    }

    #[tokio::test]
    async fn storage_failure_is_internal_error() {
        let (dir, app) = app();
        std::fs::write(dir.path().join("alice"), b"file where a dir belongs").unwrap();

        let resp = send(&app, request("PUT", "/a.bin", Some("alice:pw"), b"x")).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            ApiError::from(StoreError::Conflict("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::Invalid("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::Unauthenticated).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(StoreError::Io(io::Error::other("disk"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Worker("panicked".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
