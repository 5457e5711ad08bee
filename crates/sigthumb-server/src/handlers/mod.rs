//! HTTP request handlers.

pub(crate) mod thumbnails;
