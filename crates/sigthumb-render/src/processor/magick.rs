//! ImageMagick processor.

use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;

use serde_json::Value;

use super::{Processor, ProcessorError, ResizeMode, ResizeOptions};
use crate::source::Source;

pub(super) const DEFAULT_BINARY: &str = "convert";

const INSTALL_HINT: &str =
    "Install ImageMagick (https://imagemagick.org) or point the processor at its `convert` binary.";

/// Processor piping images through ImageMagick's `convert`.
#[derive(Debug, Clone)]
pub struct MagickProcessor {
    binary: String,
}

impl MagickProcessor {
    /// Use the given `convert` binary.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for MagickProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

impl Processor for MagickProcessor {
    fn process(
        &self,
        source: &mut Source,
        sink: &mut dyn Write,
        extension: &str,
        options: &Value,
    ) -> Result<(), ProcessorError> {
        let options = ResizeOptions::from_value(options)?;
        let args = convert_args(source.extension().as_deref(), extension, &options);
        let input = source.read_all()?;

        tracing::debug!(binary = %self.binary, ?args, "Running ImageMagick");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ProcessorError::Unavailable {
                    binary: self.binary.clone(),
                    hint: INSTALL_HINT,
                },
                _ => ProcessorError::Io(e),
            })?;

        // Feed stdin from a separate thread so a full stdout pipe cannot deadlock us
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin not captured"))?;
        let writer = thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));

        if !output.status.success() {
            return Err(ProcessorError::Backend {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        written?;

        sink.write_all(&output.stdout)?;
        Ok(())
    }
}

/// Command-line arguments for a `convert` run reading stdin and writing stdout.
fn convert_args(
    input_extension: Option<&str>,
    output_extension: &str,
    options: &ResizeOptions,
) -> Vec<String> {
    let mut args = vec![match input_extension {
        Some(ext) => format!("{ext}:-"),
        None => "-".to_owned(),
    }];

    let dim = |d: Option<u32>| d.map(|v| v.to_string()).unwrap_or_default();
    let geometry = format!("{}x{}", dim(options.width), dim(options.height));
    let has_box = options.width.is_some() || options.height.is_some();

    match options.resize {
        ResizeMode::Fit if has_box => {
            args.extend(["-thumbnail".to_owned(), geometry]);
        }
        ResizeMode::Fit => {}
        ResizeMode::Fill => {
            args.extend([
                "-thumbnail".to_owned(),
                format!("{geometry}^"),
                "-gravity".to_owned(),
                "center".to_owned(),
                "-extent".to_owned(),
                geometry,
            ]);
        }
        ResizeMode::Pad => {
            args.extend([
                "-thumbnail".to_owned(),
                geometry.clone(),
                "-background".to_owned(),
                options.background.clone(),
                "-gravity".to_owned(),
                "center".to_owned(),
                "-extent".to_owned(),
                geometry,
            ]);
        }
        ResizeMode::Squash => {
            args.extend(["-thumbnail".to_owned(), format!("{geometry}!")]);
        }
    }

    args.extend([
        "-colorspace".to_owned(),
        "sRGB".to_owned(),
        "-quality".to_owned(),
        options.quality.to_string(),
        format!("{output_extension}:-"),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn args(input: Option<&str>, output: &str, options: &Value) -> Vec<String> {
        convert_args(input, output, &ResizeOptions::from_value(options).unwrap())
    }

    #[test]
    fn test_args_plain_conversion() {
        assert_eq!(
            args(None, "png", &Value::Null),
            vec!["-", "-colorspace", "sRGB", "-quality", "85", "png:-"]
        );
    }

    #[test]
    fn test_args_fit_with_one_dimension() {
        assert_eq!(
            args(Some("jpg"), "jpg", &json!({"width": 40})),
            vec!["jpg:-", "-thumbnail", "40x", "-colorspace", "sRGB", "-quality", "85", "jpg:-"]
        );
        assert_eq!(
            args(Some("jpg"), "jpg", &json!({"height": 30}))[1..3],
            ["-thumbnail", "x30"]
        );
    }

    #[test]
    fn test_args_fill() {
        assert_eq!(
            args(Some("png"), "jpg", &json!({"width": 30, "height": 30, "resize": "fill", "quality": 70})),
            vec![
                "png:-", "-thumbnail", "30x30^", "-gravity", "center", "-extent", "30x30",
                "-colorspace", "sRGB", "-quality", "70", "jpg:-"
            ]
        );
    }

    #[test]
    fn test_args_pad() {
        assert_eq!(
            args(
                None,
                "png",
                &json!({"width": 80, "height": 60, "resize": "pad", "background": "#ffffff"})
            )[1..9],
            [
                "-thumbnail", "80x60", "-background", "#ffffff", "-gravity", "center", "-extent",
                "80x60"
            ]
        );
    }

    #[test]
    fn test_args_squash() {
        assert_eq!(
            args(None, "png", &json!({"width": 20, "height": 40, "resize": "squash"}))[1..3],
            ["-thumbnail", "20x40!"]
        );
    }

    #[test]
    fn test_missing_binary() {
        let processor = MagickProcessor::new("sigthumb-no-such-convert");
        let mut source = Source::from_bytes("rose.png", b"not really a png".to_vec());
        let mut out = Vec::new();

        let err = processor
            .process(&mut source, &mut out, "jpg", &Value::Null)
            .unwrap_err();

        let ProcessorError::Unavailable { binary, .. } = &err else {
            panic!("expected unavailable error, got {err:?}");
        };
        assert_eq!(binary, "sigthumb-no-such-convert");
        assert!(err.to_string().contains("Install ImageMagick"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_invalid_options_checked_before_spawning() {
        let processor = MagickProcessor::new("sigthumb-no-such-convert");
        let mut source = Source::from_bytes("rose.png", Vec::new());
        let mut out = Vec::new();

        let err = processor
            .process(&mut source, &mut out, "jpg", &json!({"resize": "fill"}))
            .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidOptions(_)));
    }
}
