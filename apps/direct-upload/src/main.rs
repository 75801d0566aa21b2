//! direct-upload server entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Resumable per-user file upload server.
#[derive(Parser, Debug)]
#[command(name = "direct-upload", version, about, long_about = None)]
struct Cli {
    /// Configuration file (created with defaults if missing).
    #[arg(short = 'C', long, env = "DIRECT_UPLOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overrides the configuration file.
    #[arg(short, long, env = "DIRECT_UPLOAD_ADDRESS")]
    address: Option<String>,

    /// Directory where uploaded files are stored, overrides the configuration file.
    #[arg(short, long, env = "DIRECT_UPLOAD_FILES")]
    files: Option<PathBuf>,

    /// PEM certificate chain; enables HTTPS together with `--key`.
    #[arg(long, env = "DIRECT_UPLOAD_CERT", requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key for `--cert`.
    #[arg(long, env = "DIRECT_UPLOAD_KEY", requires = "cert")]
    key: Option<PathBuf>,

    /// Verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => config::config_path()?,
    };
    let stored = config::Config::read_from(&path)?;
    let created = stored.is_none();
    let mut config = stored.unwrap_or_default();
    if let Some(address) = cli.address {
        config.address = address;
    }
    if let Some(files) = cli.files {
        config.files_path = files;
    }
    if let (Some(cert), Some(key)) = (cli.cert, cli.key) {
        config.cert_file = Some(cert);
        config.key_file = Some(key);
    }
    config.verbose |= cli.verbose;

    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if created {
        config::Config::default().save_to(&path)?;
        tracing::info!(config = %path.display(), "wrote default configuration");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %path.display(),
        "starting direct-upload server"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::try_parse_from([
            "direct-upload",
            "--config",
            "/tmp/server.toml",
            "-a",
            "127.0.0.1:9000",
            "-f",
            "/srv/uploads",
            "--cert",
            "/etc/cert.pem",
            "--key",
            "/etc/key.pem",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/server.toml")));
        assert_eq!(cli.address.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cli.files, Some(PathBuf::from("/srv/uploads")));
        assert_eq!(cli.cert, Some(PathBuf::from("/etc/cert.pem")));
        assert_eq!(cli.key, Some(PathBuf::from("/etc/key.pem")));
        assert!(cli.verbose);
    }

    #[test]
    fn cert_requires_key() {
        let result = Cli::try_parse_from(["direct-upload", "--cert", "/etc/cert.pem"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
