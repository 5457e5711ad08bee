//! `sigthumb url` command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use sigthumb_config::{CliSettings, Config};
use sigthumb_render::{FsResolver, UrlBuilder};
use sigthumb_url::Signer;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the url command.
#[derive(Args)]
pub(crate) struct UrlArgs {
    /// Source image, absolute or relative to the source root.
    object: PathBuf,

    /// Style to render the image with.
    #[arg(short, long)]
    style: String,

    /// Path to configuration file (default: auto-discover sigthumb.toml).
    #[arg(short, long, env = "SIGTHUMB_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding source images (overrides config).
    #[arg(long)]
    source_root: Option<PathBuf>,
}

impl UrlArgs {
    /// Execute the url command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, the style is unknown or the
    /// object lies outside the source root.
    pub(crate) fn execute(self, output: &Output) -> Result<(), CliError> {
        let cli_settings = CliSettings {
            source_root: self.source_root,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let url = signed_url(&config, &self.object, &self.style)?;
        output.result(&url);
        Ok(())
    }
}

/// Signed URL of `object` in `style` under the configured prefix.
fn signed_url(config: &Config, object: &Path, style: &str) -> Result<String, CliError> {
    let signer = Signer::new(config.require_secret_key()?);
    let builder = UrlBuilder::new(
        signer,
        Arc::new(config.style_registry()),
        Arc::new(FsResolver::new(&config.source_resolved.root)),
        config.url_prefix(),
    );
    Ok(builder.image_url(object, style)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
secret_key = "s3cret"

[server]
prefix = "/media/thumbs/"

[source]
root = "images"

[styles.small]
extension = "jpg"
version = 2
options = { width = 100 }
"#;

    fn config(tmp: &Path) -> Config {
        Config::from_toml(CONFIG, tmp).unwrap()
    }

    #[test]
    fn test_signed_url_for_relative_object() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());

        let url = signed_url(&config, Path::new("albums/cat.png"), "small").unwrap();

        assert!(url.starts_with("/media/thumbs/albums/cat~2epng-small-2-"));
        assert!(url.ends_with(".jpg"));
    }

    #[test]
    fn test_absolute_object_matches_relative_object() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        let absolute = tmp.path().join("images/albums/cat.png");

        let from_absolute = signed_url(&config, &absolute, "small").unwrap();
        let from_relative = signed_url(&config, Path::new("albums/cat.png"), "small").unwrap();

        assert_eq!(from_absolute, from_relative);
    }

    #[test]
    fn test_unknown_style_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());

        let err = signed_url(&config, Path::new("cat.png"), "huge").unwrap_err();

        assert!(matches!(err, CliError::Url(_)));
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config =
            Config::from_toml("[styles.small]\nextension = \"jpg\"\n", tmp.path()).unwrap();

        let err = signed_url(&config, Path::new("cat.png"), "small").unwrap_err();

        assert!(matches!(err, CliError::Config(_)));
    }
}
