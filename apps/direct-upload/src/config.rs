//! Server configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/direct-upload/server.toml`
//! - Windows: `%APPDATA%/direct-upload/server.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_address")]
    pub address: String,

    /// Root directory for uploaded files (one subdirectory per user).
    #[serde(default = "default_files_path")]
    pub files_path: PathBuf,

    /// Debug-level logging.
    #[serde(default)]
    pub verbose: bool,

    /// PEM certificate chain; serves HTTPS together with `key_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    /// PEM private key for `cert_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Seconds allowed to receive request headers.
    #[serde(default = "default_header_timeout_secs")]
    pub header_timeout_secs: u64,

    /// Seconds an upload body may stay silent before the request fails.
    #[serde(default = "default_body_timeout_secs")]
    pub body_timeout_secs: u64,

    /// Accounts allowed to upload.
    #[serde(default)]
    pub users: Vec<UserCredentials>,
}

/// One account entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

fn default_address() -> String {
    "0.0.0.0:8080".into()
}

fn default_files_path() -> PathBuf {
    PathBuf::from("./files")
}

fn default_header_timeout_secs() -> u64 {
    10
}

fn default_body_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            files_path: default_files_path(),
            verbose: false,
            cert_file: None,
            key_file: None,
            header_timeout_secs: default_header_timeout_secs(),
            body_timeout_secs: default_body_timeout_secs(),
            users: Vec::new(),
        }
    }
}

impl Config {
    /// Reads configuration from `path`; `None` if the file does not exist.
    pub fn read_from(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(Some(config))
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Holds passwords.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("direct-upload")
            .join("server.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("direct-upload")
            .join("server.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/direct-upload/server.toml"))
    }
}
