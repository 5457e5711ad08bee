//! Thumbnail rendering for sigthumb.
//!
//! Two capabilities are injected at startup:
//!
//! - [`Resolver`]: maps source objects to identifiers and identifiers back to
//!   readable [`Source`]s ([`FsResolver`] serves a directory)
//! - [`Processor`]: renders a source into a sink, selected per style from a
//!   [`ProcessorRegistry`]
//!
//! [`RenderPipeline`] ties them to the cache: given a validated request it
//! resolves the source and runs the style's processor inside
//! [`CacheStore::get_or_create`](sigthumb_cache::CacheStore::get_or_create).
//! [`UrlBuilder`] goes the other way and produces signed URLs for objects.

mod pipeline;
pub mod processor;
mod resolver;
mod source;
mod url;

pub use pipeline::{RenderError, RenderPipeline};
pub use processor::{Processor, ProcessorError, ProcessorRegistry};
pub use resolver::{FsResolver, ResolveError, Resolver};
pub use source::Source;
pub use url::{UrlBuilder, UrlError};
