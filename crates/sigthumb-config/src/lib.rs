//! Configuration management for sigthumb.
//!
//! Parses `sigthumb.toml` with serde and discovers it in the current
//! directory or its parents. CLI settings are applied during load via
//! [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! `${VAR}` and `${VAR:-default}` are expanded in:
//! - `secret_key`
//! - `server.host`
//! - `cache.dir`
//! - `source.root`
//! - `processors.magick_binary`

mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use sigthumb_url::{StyleSpec, Styles, is_valid_extension, is_valid_style_name};

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "sigthumb.toml";

const DEFAULT_CACHE_DIR: &str = ".sigthumb/cache";
const DEFAULT_SOURCE_ROOT: &str = "media";
const DEFAULT_MAX_ATTEMPTS: u32 = 16;
const DEFAULT_MAGICK_BINARY: &str = "convert";

/// Extension reserved for the cache's lock markers.
const LOCK_EXTENSION: &str = "lock";

/// CLI settings that override configuration file values.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Override source root.
    pub source_root: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key used to sign and verify thumbnail URLs.
    pub secret_key: String,
    /// Server configuration.
    pub server: ServerConfig,
    /// Cache configuration as written in the file.
    cache: CacheConfigRaw,
    /// Source configuration as written in the file.
    source: SourceConfigRaw,
    /// Built-in processor settings.
    pub processors: ProcessorsConfig,
    /// Styles by name.
    pub styles: BTreeMap<String, StyleConfig>,

    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Resolved source configuration (set after loading).
    #[serde(skip)]
    pub source_resolved: SourceConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// URL prefix thumbnails are served under.
    pub prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7980,
            prefix: "/thumbs".to_owned(),
        }
    }
}

/// Settings of the built-in processors.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessorsConfig {
    /// ImageMagick `convert` binary used by the `"magick"` processor.
    pub magick_binary: String,
}

impl Default for ProcessorsConfig {
    fn default() -> Self {
        Self {
            magick_binary: DEFAULT_MAGICK_BINARY.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    dir: Option<String>,
    max_attempts: Option<u32>,
    wait_timeout_ms: Option<u64>,
}

/// Resolved cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cache root directory.
    pub dir: PathBuf,
    /// Attempts to become the populator before giving up.
    pub max_attempts: u32,
    /// Bound on each wait for a concurrent render.
    pub wait_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_timeout: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SourceConfigRaw {
    root: Option<String>,
}

/// Resolved source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceConfig {
    /// Directory source images are served from.
    pub root: PathBuf,
}

/// A `[styles.<name>]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleConfig {
    /// Processor backend name.
    #[serde(default = "default_processor")]
    pub processor: String,
    /// Output file extension.
    pub extension: String,
    /// Style version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Options passed to the processor.
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_processor() -> String {
    "image".to_owned()
}

fn default_version() -> u32 {
    1
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`secret_key`").
        field: String,
        /// Error message (e.g., "${`SIGTHUMB_SECRET`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise, searches
    /// for `sigthumb.toml` in the current directory and parents, falling back
    /// to defaults relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails or
    /// the loaded values are invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string, resolving paths against `base`.
    ///
    /// # Errors
    ///
    /// Returns error if parsing, expansion or validation fails.
    pub fn from_toml(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(cache_dir) = &settings.cache_dir {
            self.cache_resolved.dir.clone_from(cache_dir);
        }
        if let Some(source_root) = &settings.source_root {
            self.source_resolved.root.clone_from(source_root);
        }
    }

    /// The signing key, which must be set for anything but inspecting config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if `secret_key` is empty.
    pub fn require_secret_key(&self) -> Result<&str, ConfigError> {
        if self.secret_key.is_empty() {
            return Err(ConfigError::Validation(
                "secret_key must be set (e.g. secret_key = \"${SIGTHUMB_SECRET}\")".to_owned(),
            ));
        }
        Ok(&self.secret_key)
    }

    /// Build the style registry from the `[styles]` tables.
    #[must_use]
    pub fn style_registry(&self) -> Styles {
        self.styles
            .iter()
            .fold(Styles::new(), |styles, (name, style)| {
                styles.with_style(
                    StyleSpec::new(name, &style.processor, &style.extension, style.version)
                        .with_options(style.options.clone()),
                )
            })
    }

    /// Mount prefix without a trailing slash (`""` mounts at the root).
    #[must_use]
    pub fn url_prefix(&self) -> &str {
        self.server.prefix.trim_end_matches('/')
    }

    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            secret_key: String::new(),
            server: ServerConfig::default(),
            cache: CacheConfigRaw::default(),
            source: SourceConfigRaw::default(),
            processors: ProcessorsConfig::default(),
            styles: BTreeMap::new(),
            cache_resolved: CacheConfig {
                dir: base.join(DEFAULT_CACHE_DIR),
                ..CacheConfig::default()
            },
            source_resolved: SourceConfig {
                root: base.join(DEFAULT_SOURCE_ROOT),
            },
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_cache()?;
        require_non_empty(&self.processors.magick_binary, "processors.magick_binary")?;
        self.validate_styles()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }
        if !self.server.prefix.starts_with('/') {
            return Err(ConfigError::Validation(
                "server.prefix must start with '/'".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        if self.cache_resolved.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "cache.max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.cache_resolved.wait_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Validation(
                "cache.wait_timeout_ms must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_styles(&self) -> Result<(), ConfigError> {
        for (name, style) in &self.styles {
            if !is_valid_style_name(name) {
                return Err(ConfigError::Validation(format!(
                    "style name {name:?} must match [a-z0-9_]+"
                )));
            }
            if !is_valid_extension(&style.extension) {
                return Err(ConfigError::Validation(format!(
                    "styles.{name}.extension {:?} must match [a-z0-9]+",
                    style.extension
                )));
            }
            if style.extension == LOCK_EXTENSION {
                return Err(ConfigError::Validation(format!(
                    "styles.{name}.extension {LOCK_EXTENSION:?} is reserved for cache lock files"
                )));
            }
            require_non_empty(&style.processor, &format!("styles.{name}.processor"))?;
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.secret_key = expand::expand_env(&self.secret_key, "secret_key")?;
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        if let Some(ref dir) = self.cache.dir {
            self.cache.dir = Some(expand::expand_env(dir, "cache.dir")?);
        }
        if let Some(ref root) = self.source.root {
            self.source.root = Some(expand::expand_env(root, "source.root")?);
        }
        self.processors.magick_binary =
            expand::expand_env(&self.processors.magick_binary, "processors.magick_binary")?;
        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.cache_resolved = CacheConfig {
            dir: resolve(self.cache.dir.as_deref(), DEFAULT_CACHE_DIR),
            max_attempts: self.cache.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            wait_timeout: self.cache.wait_timeout_ms.map(Duration::from_millis),
        };
        self.source_resolved = SourceConfig {
            root: resolve(self.source.root.as_deref(), DEFAULT_SOURCE_ROOT),
        };
    }
}
