//! Application orchestrator: wires the store, authenticator and server together.

use std::sync::Arc;
use std::time::Duration;

use direct_upload_server::{ServerConfig, StaticAuthenticator, UploadServer};
use direct_upload_store::{LocalFileStore, LocalFileStoreConfig, validate_username};

use crate::config::Config;

/// Runs the server until Ctrl+C or a server error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = build_server(&config)?;

    let mut server_task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down");
        }
    }

    server.shutdown();
    server_task.await??;
    Ok(())
}

/// Builds the server from configuration.
fn build_server(config: &Config) -> anyhow::Result<Arc<UploadServer>> {
    for user in &config.users {
        if let Err(e) = validate_username(&user.username) {
            anyhow::bail!("configured user {:?}: {e}", user.username);
        }
    }
    if config.cert_file.is_some() != config.key_file.is_some() {
        anyhow::bail!("cert_file and key_file must be set together");
    }
    if config.cert_file.is_none() {
        tracing::warn!("TLS disabled, credentials travel in cleartext");
    }
    if config.users.is_empty() {
        tracing::warn!("no users configured, every request will be rejected");
    }

    let auth = StaticAuthenticator::new(
        config
            .users
            .iter()
            .map(|u| (u.username.clone(), u.password.clone())),
    );

    let store = LocalFileStore::new(LocalFileStoreConfig {
        path: config.files_path.clone(),
    });
    tracing::info!(
        path = %config.files_path.display(),
        users = auth.len(),
        "upload store ready"
    );

    let server = UploadServer::new(
        ServerConfig {
            address: config.address.clone(),
            cert_file: config.cert_file.clone(),
            key_file: config.key_file.clone(),
            header_timeout: Duration::from_secs(config.header_timeout_secs),
            body_timeout: Duration::from_secs(config.body_timeout_secs),
        },
        Arc::new(store),
        Arc::new(auth),
    );
    Ok(Arc::new(server))
}
