use std::path::PathBuf;
use thiserror::Error;

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Every way a conversion can stop.
///
/// All variants are fatal to the run. Enrichment problems never show up here;
/// they degrade to "no cover found" inside [`crate::metadata`].
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("cannot parse EPUB {path}: {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    #[error("required dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("synthesis failed for chapter {index} ({title}): {reason}")]
    SynthesisFailure {
        index: usize,
        title: String,
        reason: String,
    },

    #[error("cannot probe duration of {path}: {reason}")]
    ProbeFailure { path: PathBuf, reason: String },

    #[error("audiobook assembly failed: {0}")]
    AssemblyFailure(String),

    #[error("unknown engine '{requested}'; available: {}", format_keys(.available))]
    UnknownEngine {
        requested: String,
        available: Vec<String>,
    },

    #[error("invalid voice '{voice}' for engine {engine}: {reason}")]
    InvalidVoice {
        engine: String,
        voice: String,
        reason: String,
    },

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("conversion interrupted at stage={stage}")]
    Interrupted { stage: &'static str },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, ConvertError::Interrupted { .. })
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ConvertError::Io {
            context: context.into(),
            source,
        }
    }

    /// Synthesis error with no chapter attached yet; the orchestrator fills in
    /// index and title via [`ConvertError::for_chapter`].
    pub fn synthesis(reason: impl Into<String>) -> Self {
        ConvertError::SynthesisFailure {
            index: 0,
            title: String::new(),
            reason: reason.into(),
        }
    }

    /// Attach chapter context to a synthesis failure. Other variants pass through.
    pub fn for_chapter(self, index: usize, title: &str) -> Self {
        match self {
            ConvertError::SynthesisFailure { reason, .. } => ConvertError::SynthesisFailure {
                index,
                title: title.to_string(),
                reason,
            },
            other => other,
        }
    }
}

fn format_keys(keys: &[String]) -> String {
    if keys.is_empty() {
        "(none)".to_string()
    } else {
        keys.join(", ")
    }
}
