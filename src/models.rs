//! Plain data carried between the pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One ordered, non-empty narrative unit extracted from the book.
///
/// `index` is dense and 0-based; it is the only ordering the pipeline ever uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub index: usize,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub language: String,
    pub cover_image: Option<Vec<u8>>,
}

impl BookMetadata {
    /// Copy of this metadata carrying `cover`; every other field is preserved.
    pub fn with_cover(&self, cover: Vec<u8>) -> Self {
        Self {
            title: self.title.clone(),
            author: self.author.clone(),
            language: self.language.clone(),
            cover_image: Some(cover),
        }
    }
}

/// Synthesis settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Empty means "engine default for `language`".
    pub voice: String,
    pub speed: f32,
    pub pitch: Option<String>,
    pub language: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice: String::new(),
            speed: 1.0,
            pitch: None,
            language: "it".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterAudio {
    pub chapter: Chapter,
    pub audio_path: PathBuf,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub name: String,
    pub language: String,
    pub gender: Option<String>,
}

impl VoiceInfo {
    pub fn new(name: &str, language: &str, gender: &str) -> Self {
        Self {
            name: name.to_string(),
            language: language.to_string(),
            gender: (!gender.is_empty()).then(|| gender.to_string()),
        }
    }
}

/// Audio containers an engine can natively produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
