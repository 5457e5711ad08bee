//! Render pipeline: validated request in, cached thumbnail path out.

use std::path::PathBuf;
use std::sync::Arc;

use sigthumb_cache::{CacheError, CacheStore, PopulateError};
use sigthumb_url::{EscapeError, ValidatedRequest};

use crate::processor::{ProcessorError, ProcessorRegistry};
use crate::resolver::{ResolveError, Resolver};

/// Rendering failure.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The identifier token does not decode.
    #[error("Invalid identifier: {0}")]
    Identifier(#[from] EscapeError),

    /// The source object could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The style names a processor that is not registered.
    #[error("Unknown processor: {0}")]
    UnknownProcessor(String),

    /// The processor failed.
    #[error("Processor failed: {0}")]
    Processor(#[from] ProcessorError),

    /// The cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl RenderError {
    /// Whether the request names a source that does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Identifier(_)
                | Self::Resolve(ResolveError::NotFound(_) | ResolveError::InvalidIdentifier(_))
        )
    }

    /// Whether concurrent renders of the same entry kept this one from finishing.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Cache(e) if e.is_busy())
    }
}

impl From<PopulateError<RenderError>> for RenderError {
    fn from(err: PopulateError<RenderError>) -> Self {
        match err {
            PopulateError::Producer(e) => e,
            PopulateError::Cache(e) => Self::Cache(e),
        }
    }
}

/// Renders validated requests into the cache.
#[derive(Clone)]
pub struct RenderPipeline {
    cache: CacheStore,
    resolver: Arc<dyn Resolver>,
    processors: ProcessorRegistry,
}

impl RenderPipeline {
    /// Create a pipeline.
    pub fn new(cache: CacheStore, resolver: Arc<dyn Resolver>, processors: ProcessorRegistry) -> Self {
        Self {
            cache,
            resolver,
            processors,
        }
    }

    /// Path of the already rendered thumbnail, if any.
    pub fn cached(&self, request: &ValidatedRequest) -> Result<Option<PathBuf>, RenderError> {
        Ok(self.cache.get(request.cache_key().as_str())?)
    }

    /// Path of the rendered thumbnail, rendering it first if needed.
    ///
    /// Blocks while another caller renders the same thumbnail.
    pub fn render(&self, request: &ValidatedRequest) -> Result<PathBuf, RenderError> {
        let style = request.style();
        let processor = self
            .processors
            .get(&style.processor)
            .ok_or_else(|| RenderError::UnknownProcessor(style.processor.clone()))?;
        let identifier = request.identifier()?;
        let key = request.cache_key();

        let path = self.cache.get_or_create(key.as_str(), |sink| {
            let mut source = self.resolver.open(&identifier)?;
            tracing::info!(
                %identifier,
                style = %style.name,
                processor = %style.processor,
                "Rendering thumbnail"
            );
            processor
                .process(&mut source, sink, request.extension(), &style.options)
                .map_err(|e| {
                    tracing::error!(%identifier, style = %style.name, "Processor failed: {e}");
                    RenderError::Processor(e)
                })
        })?;
        Ok(path)
    }
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("cache", &self.cache)
            .field("processors", &self.processors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::io::{Read, Write};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};
    use sigthumb_url::{RequestValidator, Signer, StyleSpec, Styles, escape};
    use tempfile::TempDir;

    use crate::processor::Processor;
    use crate::source::Source;

    #[derive(Default)]
    struct MemoryResolver {
        objects: HashMap<String, Vec<u8>>,
    }

    impl MemoryResolver {
        fn with(mut self, identifier: &str, contents: &[u8]) -> Self {
            self.objects.insert(identifier.to_owned(), contents.to_vec());
            self
        }
    }

    impl Resolver for MemoryResolver {
        fn identify(&self, object: &Path) -> Result<String, ResolveError> {
            Ok(object.to_string_lossy().into_owned())
        }

        fn open(&self, identifier: &str) -> Result<Source, ResolveError> {
            self.objects
                .get(identifier)
                .map(|bytes| Source::from_bytes(identifier, bytes.clone()))
                .ok_or_else(|| ResolveError::NotFound(identifier.to_owned()))
        }
    }

    /// Copies the source verbatim and counts invocations.
    #[derive(Default)]
    struct CopyProcessor {
        calls: AtomicUsize,
        seen_options: std::sync::Mutex<Vec<Value>>,
    }

    impl Processor for CopyProcessor {
        fn process(
            &self,
            source: &mut Source,
            sink: &mut dyn Write,
            _extension: &str,
            options: &Value,
        ) -> Result<(), ProcessorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_options.lock().unwrap().push(options.clone());
            let mut buf = Vec::new();
            source.read_to_end(&mut buf)?;
            sink.write_all(&buf)?;
            Ok(())
        }
    }

    struct FailingProcessor;

    impl Processor for FailingProcessor {
        fn process(
            &self,
            _source: &mut Source,
            sink: &mut dyn Write,
            _extension: &str,
            _options: &Value,
        ) -> Result<(), ProcessorError> {
            sink.write_all(b"half a thumb")?;
            Err(ProcessorError::InvalidOptions("boom".to_owned()))
        }
    }

    struct Fixture {
        tmp: TempDir,
        validator: RequestValidator,
        signer: Signer,
    }

    fn fixture(processor: &str) -> Fixture {
        let styles = Styles::new().with_style(
            StyleSpec::new("test", processor, "jpg", 1)
                .with_options(json!({"test": 123, "other": "yes"})),
        );
        let signer = Signer::new("secret");
        Fixture {
            tmp: TempDir::new().unwrap(),
            validator: RequestValidator::new(signer.clone(), Arc::new(styles)),
            signer,
        }
    }

    impl Fixture {
        fn request(&self, identifier: &str) -> ValidatedRequest {
            let token = escape::escape(identifier);
            let sig = self.signer.sign(&token, "test", "1", "jpg");
            self.validator
                .validate_path(&format!("{token}-test-1-{sig}.jpg"))
                .unwrap()
        }

        fn pipeline(&self, processors: ProcessorRegistry) -> RenderPipeline {
            let resolver = MemoryResolver::default().with("contains/sub/dirs", b"blah blah blah");
            RenderPipeline::new(CacheStore::new(self.tmp.path()), Arc::new(resolver), processors)
        }
    }

    #[test]
    fn test_render_caches_processor_output() {
        let fx = fixture("copy");
        let processor = Arc::new(CopyProcessor::default());
        let shared: Arc<dyn Processor> = Arc::<CopyProcessor>::clone(&processor);
        let pipeline = fx.pipeline(ProcessorRegistry::new().with_processor("copy", shared));
        let request = fx.request("contains/sub/dirs");

        assert_eq!(pipeline.cached(&request).unwrap(), None);
        let path = pipeline.render(&request).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"blah blah blah");
        assert_eq!(path, fx.tmp.path().join(request.cache_key().as_str()));
        assert_eq!(pipeline.cached(&request).unwrap(), Some(path.clone()));
        assert_eq!(
            *processor.seen_options.lock().unwrap(),
            vec![json!({"test": 123, "other": "yes"})]
        );

        // Second render is a cache hit
        assert_eq!(pipeline.render(&request).unwrap(), path);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let fx = fixture("copy");
        let pipeline = fx.pipeline(
            ProcessorRegistry::new().with_processor("copy", Arc::new(CopyProcessor::default())),
        );
        let request = fx.request("contains/nothing");

        let err = pipeline.render(&request).unwrap_err();
        assert!(matches!(err, RenderError::Resolve(ResolveError::NotFound(_))));
        assert!(err.is_not_found());
        assert!(!fx.tmp.path().join(request.cache_key().as_str()).exists());
    }

    #[test]
    fn test_unknown_processor() {
        let fx = fixture("nope");
        let pipeline = fx.pipeline(ProcessorRegistry::new());

        let err = pipeline.render(&fx.request("contains/sub/dirs")).unwrap_err();
        assert!(matches!(err, RenderError::UnknownProcessor(name) if name == "nope"));
    }

    #[test]
    fn test_processor_failure_leaves_no_entry() {
        let fx = fixture("broken");
        let pipeline =
            fx.pipeline(ProcessorRegistry::new().with_processor("broken", Arc::new(FailingProcessor)));
        let request = fx.request("contains/sub/dirs");

        let err = pipeline.render(&request).unwrap_err();
        assert!(matches!(err, RenderError::Processor(_)));
        assert!(!err.is_not_found());
        assert!(!err.is_busy());

        let entry_dir = fx.tmp.path().join("contains/sub");
        assert_eq!(fs::read_dir(entry_dir).unwrap().count(), 0);
    }
}
