//! Convert EPUB books into chaptered M4B audiobooks.
//!
//! The pipeline is parse → normalize → synthesize (one pluggable engine) →
//! probe → assemble. [`converter::Converter`] drives it; [`jobs::JobStore`]
//! runs it in the background for callers that poll for status.

pub mod audio;
pub mod cancellation;
pub mod config;
pub mod converter;
pub mod epub_loader;
pub mod error;
pub mod jobs;
pub mod metadata;
pub mod models;
pub mod normalizer;
pub mod progress;
pub mod text_utils;
pub mod tts;
pub mod util;
