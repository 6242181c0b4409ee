//! Text-to-speech engines behind one blocking contract.
//!
//! The converter only ever sees [`TtsEngine`]; concrete engines are built by
//! key through an [`EngineRegistry`] that the caller owns.

mod edge;
mod kokoro;
mod piper;

pub use edge::EdgeEngine;
pub use kokoro::KokoroEngine;
pub use piper::PiperEngine;

use crate::config::AppConfig;
use crate::error::{ConvertError, ConvertResult};
use crate::models::{AudioFormat, TtsConfig, VoiceInfo};
use crate::util::{ToolOutput, ToolRun, command_available, non_empty_file, run_tool};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// A pluggable synthesis backend.
///
/// Calls block until the audio file is complete. Engines whose transport is
/// asynchronous or networked hide that behind this contract and enforce their
/// own timeouts.
pub trait TtsEngine: Send + Sync {
    /// Human-readable engine name.
    fn name(&self) -> &str;

    /// Container the engine writes natively; decides chapter file extensions.
    fn output_format(&self) -> AudioFormat;

    /// Verify runtime dependencies. Missing tools are
    /// [`ConvertError::DependencyUnavailable`], never a silent downgrade.
    fn initialize(&self) -> ConvertResult<()>;

    /// Synthesize all of `text` into one playable file at `output_path`.
    fn synthesize(&self, text: &str, output_path: &Path, config: &TtsConfig) -> ConvertResult<()>;

    /// Voices the engine offers, optionally filtered by language. An unmatched
    /// filter gives an empty list.
    fn list_voices(&self, language: Option<&str>) -> ConvertResult<Vec<VoiceInfo>>;

    /// Reject settings the engine cannot honour before any work starts.
    fn validate_config(&self, _config: &TtsConfig) -> ConvertResult<()> {
        Ok(())
    }
}

impl<T: TtsEngine + ?Sized> TtsEngine for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn output_format(&self) -> AudioFormat {
        (**self).output_format()
    }

    fn initialize(&self) -> ConvertResult<()> {
        (**self).initialize()
    }

    fn synthesize(&self, text: &str, output_path: &Path, config: &TtsConfig) -> ConvertResult<()> {
        (**self).synthesize(text, output_path, config)
    }

    fn list_voices(&self, language: Option<&str>) -> ConvertResult<Vec<VoiceInfo>> {
        (**self).list_voices(language)
    }

    fn validate_config(&self, config: &TtsConfig) -> ConvertResult<()> {
        (**self).validate_config(config)
    }
}

pub type EngineFactory = Box<dyn Fn() -> Box<dyn TtsEngine> + Send + Sync>;

/// Explicit key → factory map, built once at startup and passed by reference.
#[derive(Default)]
pub struct EngineRegistry {
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `edge`, `kokoro` and `piper`, configured from `config`.
    pub fn builtin(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        let edge_cfg = config.edge.clone();
        let ffmpeg = config.ffmpeg_bin.clone();
        registry.register("edge", move || {
            Box::new(EdgeEngine::new(edge_cfg.clone(), ffmpeg.clone()))
        });

        let kokoro_cfg = config.kokoro.clone();
        registry.register("kokoro", move || Box::new(KokoroEngine::new(kokoro_cfg.clone())));

        let piper_cfg = config.piper.clone();
        registry.register("piper", move || Box::new(PiperEngine::new(piper_cfg.clone())));

        registry
    }

    /// Add or replace the factory for `key`.
    pub fn register<F>(&mut self, key: &str, factory: F)
    where
        F: Fn() -> Box<dyn TtsEngine> + Send + Sync + 'static,
    {
        debug!(engine = key, "Registering TTS engine");
        self.factories.insert(key.to_string(), Box::new(factory));
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn create(&self, key: &str) -> ConvertResult<Box<dyn TtsEngine>> {
        match self.factories.get(key) {
            Some(factory) => Ok(factory()),
            None => Err(ConvertError::UnknownEngine {
                requested: key.to_string(),
                available: self.keys(),
            }),
        }
    }
}

/// Primary language subtag, lowercased: `en-US` → `en`.
pub(crate) fn base_language(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Explicit voice if set, else the table entry for the language, else the
/// table's first entry.
pub(crate) fn resolve_voice(config: &TtsConfig, defaults: &[(&str, &str)]) -> String {
    if !config.voice.trim().is_empty() {
        return config.voice.trim().to_string();
    }
    let lang = base_language(&config.language);
    defaults
        .iter()
        .find(|(code, _)| *code == lang)
        .or_else(|| defaults.first())
        .map(|(_, voice)| voice.to_string())
        .unwrap_or_default()
}

pub(crate) fn require_binary(bin: &str, hint: &str) -> ConvertResult<()> {
    if command_available(bin) {
        Ok(())
    } else {
        Err(ConvertError::DependencyUnavailable(format!(
            "'{bin}' not found on PATH ({hint})"
        )))
    }
}

/// Run an engine tool and turn every way it can fail into a synthesis error
/// carrying the tool's own message.
pub(crate) fn run_synthesis_tool(
    cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> ConvertResult<ToolOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    match run_tool(cmd, stdin, timeout) {
        Err(err) => Err(ConvertError::synthesis(format!(
            "failed to start {program}: {err}"
        ))),
        Ok(ToolRun::TimedOut) => Err(ConvertError::synthesis(format!(
            "{program} timed out after {}s",
            timeout.map(|t| t.as_secs()).unwrap_or_default()
        ))),
        Ok(ToolRun::Finished(out)) if !out.status.success() => Err(ConvertError::synthesis(
            format!("{program} exited with {}: {}", out.status, out.stderr_tail()),
        )),
        Ok(ToolRun::Finished(out)) => Ok(out),
    }
}

pub(crate) fn ensure_audio_written(path: &Path) -> ConvertResult<()> {
    if non_empty_file(path) {
        Ok(())
    } else {
        Err(ConvertError::synthesis(format!(
            "no audio produced at {}",
            path.display()
        )))
    }
}
