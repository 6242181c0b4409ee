use crate::models::TtsConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// High-level converter configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "crate::config::defaults::default_engine")]
    pub engine: String,
    #[serde(default)]
    pub voice: String,
    #[serde(default = "crate::config::defaults::default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub pitch: Option<String>,
    #[serde(default = "crate::config::defaults::default_language")]
    pub language: String,
    #[serde(default = "crate::config::defaults::default_bitrate")]
    pub bitrate: String,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
    #[serde(default = "crate::config::defaults::default_enrich_metadata")]
    pub enrich_metadata: bool,
    #[serde(default = "crate::config::defaults::default_enrichment_timeout_secs")]
    pub enrichment_timeout_secs: u64,
    #[serde(default = "crate::config::defaults::default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
    #[serde(default = "crate::config::defaults::default_ffprobe_bin")]
    pub ffprobe_bin: String,
    #[serde(default)]
    pub edge: EdgeConfig,
    #[serde(default)]
    pub kokoro: KokoroConfig,
    #[serde(default)]
    pub piper: PiperConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            engine: crate::config::defaults::default_engine(),
            voice: String::new(),
            speed: crate::config::defaults::default_speed(),
            pitch: None,
            language: crate::config::defaults::default_language(),
            bitrate: crate::config::defaults::default_bitrate(),
            work_dir: None,
            log_level: crate::config::defaults::default_log_level(),
            enrich_metadata: crate::config::defaults::default_enrich_metadata(),
            enrichment_timeout_secs: crate::config::defaults::default_enrichment_timeout_secs(),
            ffmpeg_bin: crate::config::defaults::default_ffmpeg_bin(),
            ffprobe_bin: crate::config::defaults::default_ffprobe_bin(),
            edge: EdgeConfig::default(),
            kokoro: KokoroConfig::default(),
            piper: PiperConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn tts_config(&self) -> TtsConfig {
        TtsConfig {
            voice: self.voice.trim().to_string(),
            speed: self.speed,
            pitch: self
                .pitch
                .as_ref()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            language: self.language.trim().to_string(),
        }
    }

    pub fn work_dir_path(&self) -> Option<PathBuf> {
        self.work_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment_timeout_secs.max(1))
    }
}

/// Settings for the cloud voice engine (`edge`).
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
#[serde(default)]
pub struct EdgeConfig {
    pub bin: String,
    pub max_chunk_chars: usize,
    pub chunk_timeout_secs: u64,
    pub voices_timeout_secs: u64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            bin: crate::config::defaults::default_edge_bin(),
            max_chunk_chars: crate::config::defaults::default_edge_max_chunk_chars(),
            chunk_timeout_secs: crate::config::defaults::default_edge_chunk_timeout_secs(),
            voices_timeout_secs: crate::config::defaults::default_edge_voices_timeout_secs(),
        }
    }
}

/// Settings for the offline Kokoro engine (`kokoro`).
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
#[serde(default)]
pub struct KokoroConfig {
    pub bin: String,
    pub model_path: Option<String>,
    pub voices_path: Option<String>,
    /// Zero disables the limit.
    pub timeout_secs: u64,
}

impl Default for KokoroConfig {
    fn default() -> Self {
        Self {
            bin: crate::config::defaults::default_kokoro_bin(),
            model_path: None,
            voices_path: None,
            timeout_secs: 0,
        }
    }
}

/// Settings for the Piper engine (`piper`).
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
#[serde(default)]
pub struct PiperConfig {
    pub bin: String,
    /// Explicit `.onnx` model; bypasses the voice catalogue when set.
    pub model_path: Option<String>,
    pub models_dir: String,
    pub download_timeout_secs: u64,
    /// Zero disables the limit.
    pub timeout_secs: u64,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            bin: crate::config::defaults::default_piper_bin(),
            model_path: None,
            models_dir: crate::config::defaults::default_piper_models_dir(),
            download_timeout_secs: crate::config::defaults::default_piper_download_timeout_secs(),
            timeout_secs: 0,
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
