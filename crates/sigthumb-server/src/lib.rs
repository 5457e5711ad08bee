//! HTTP server for signed, disk-cached thumbnails.
//!
//! Serves `GET {prefix}/<identifier>-<style>-<version>-<signature>.<extension>`:
//!
//! ```text
//! request ──► RequestValidator ──403/404──► reject
//!                  │ ok
//!                  ▼
//!             cache hit? ──yes──► serve file
//!                  │ no
//!                  ▼
//!    spawn_blocking(RenderPipeline::render) ──► serve file
//! ```
//!
//! Rendering and lock waits are blocking filesystem work and run on tokio's
//! blocking pool; the async workers only validate and stream cached files.
//!
//! # Quick Start
//!
//! ```ignore
//! use sigthumb_server::{ServerConfig, run_server};
//! use sigthumb_url::{StyleSpec, Styles};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         secret_key: "s3cret".to_owned(),
//!         styles: Styles::new().with_style(StyleSpec::new("small", "image", "jpg", 1)),
//!         ..ServerConfig::default()
//!     };
//!     run_server(config).await.unwrap();
//! }
//! ```

mod app;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sigthumb_cache::CacheStore;
use sigthumb_config::{Config, ConfigError};
use sigthumb_render::{FsResolver, ProcessorRegistry, RenderPipeline, Resolver};
use sigthumb_url::{RequestValidator, Signer, Styles};
use state::AppState;

pub use error::{ServerError, StartupError};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// URL prefix thumbnails are mounted under (no trailing slash).
    pub prefix: String,
    /// Signing key.
    pub secret_key: String,
    /// Cache root directory.
    pub cache_dir: PathBuf,
    /// Attempts to become the populator of a cache entry.
    pub max_attempts: u32,
    /// Bound on each wait for a concurrent render.
    pub wait_timeout: Option<Duration>,
    /// Directory source images are served from.
    pub source_root: PathBuf,
    /// Configured styles.
    pub styles: Styles,
    /// ImageMagick binary for the `"magick"` processor.
    pub magick_binary: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7980,
            prefix: "/thumbs".to_owned(),
            secret_key: String::new(),
            cache_dir: PathBuf::from(".sigthumb/cache"),
            max_attempts: 16,
            wait_timeout: None,
            source_root: PathBuf::from("media"),
            styles: Styles::new(),
            magick_binary: "convert".to_owned(),
        }
    }
}

/// Build the router with injected resolver and processors.
///
/// # Errors
///
/// Returns an error if a style references a processor missing from `processors`.
pub fn build_router(
    config: &ServerConfig,
    resolver: Arc<dyn Resolver>,
    processors: ProcessorRegistry,
) -> Result<Router, StartupError> {
    check_processors(&config.styles, &processors)?;

    let cache = CacheStore::new(&config.cache_dir)
        .with_max_attempts(config.max_attempts)
        .with_wait_timeout(config.wait_timeout);
    let state = Arc::new(AppState {
        validator: RequestValidator::new(
            Signer::new(&config.secret_key),
            Arc::new(config.styles.clone()),
        ),
        pipeline: RenderPipeline::new(cache, resolver, processors),
    });

    Ok(app::create_router(state, config.prefix.trim_end_matches('/')))
}

/// Every style must name a registered processor.
fn check_processors(styles: &Styles, processors: &ProcessorRegistry) -> Result<(), StartupError> {
    for style in styles.iter() {
        if !processors.contains(&style.processor) {
            return Err(StartupError::UnknownProcessor {
                style: style.name.clone(),
                processor: style.processor.clone(),
                available: processors.names().join(", "),
            });
        }
    }
    Ok(())
}

/// Run the server with the filesystem resolver and built-in processors.
///
/// # Errors
///
/// Returns an error if the configuration is inconsistent or the server fails
/// to start.
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let resolver: Arc<dyn Resolver> = Arc::new(FsResolver::new(&config.source_root));
    let processors = ProcessorRegistry::builtin(config.magick_binary.as_str());
    let app = build_router(&config, resolver, processors)?;

    let addr = SocketAddr::from_str(&format!("{}:{}", config.host, config.port))?;
    tracing::info!(
        address = %addr,
        prefix = %config.prefix,
        styles = config.styles.len(),
        cache = %config.cache_dir.display(),
        "Starting server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}

/// Create server configuration from sigthumb config.
///
/// # Errors
///
/// Returns `ConfigError::Validation` if no secret key is configured.
pub fn server_config_from_config(config: &Config) -> Result<ServerConfig, ConfigError> {
    Ok(ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        prefix: config.url_prefix().to_owned(),
        secret_key: config.require_secret_key()?.to_owned(),
        cache_dir: config.cache_resolved.dir.clone(),
        max_attempts: config.cache_resolved.max_attempts,
        wait_timeout: config.cache_resolved.wait_timeout,
        source_root: config.source_resolved.root.clone(),
        styles: config.style_registry(),
        magick_binary: config.processors.magick_binary.clone(),
    })
}
