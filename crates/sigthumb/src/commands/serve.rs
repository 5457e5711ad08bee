//! `sigthumb serve` command implementation.

use std::path::{Path, PathBuf};

use clap::Args;
use sigthumb_config::{CliSettings, Config};
use sigthumb_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover sigthumb.toml).
    #[arg(short, long, env = "SIGTHUMB_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Thumbnail cache directory (overrides config).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Directory holding source images (overrides config).
    #[arg(short, long)]
    source_root: Option<PathBuf>,

    /// Enable verbose output (request and render logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            cache_dir: self.cache_dir,
            source_root: self.source_root,
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let server_config = server_config_from_config(&config)?;

        ensure_cache_dir(&config.cache_resolved.dir)?;

        output.highlight(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!(
            "Source root: {}",
            config.source_resolved.root.display()
        ));
        output.info(&format!(
            "Cache directory: {}",
            config.cache_resolved.dir.display()
        ));
        let prefix = config.url_prefix();
        output.info(&format!(
            "Thumbnails: {}/",
            if prefix.is_empty() { "" } else { prefix }
        ));
        if config.styles.is_empty() {
            output.warning("No styles configured, every thumbnail request will 404");
        } else {
            let names: Vec<&str> = config.styles.keys().map(String::as_str).collect();
            output.info(&format!("Styles: {}", names.join(", ")));
        }
        if !config.source_resolved.root.is_dir() {
            output.warning(&format!(
                "Source root {} does not exist",
                config.source_resolved.root.display()
            ));
        }

        run_server(server_config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Ensure the cache directory exists.
fn ensure_cache_dir(cache_dir: &Path) -> Result<(), CliError> {
    std::fs::create_dir_all(cache_dir)
        .map_err(|e| CliError::Server(format!("Failed to create cache directory: {e}")))
}
