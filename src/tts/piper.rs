use super::{TtsEngine, ensure_audio_written, require_binary, resolve_voice, run_synthesis_tool};
use crate::config::PiperConfig;
use crate::error::{ConvertError, ConvertResult};
use crate::models::{AudioFormat, TtsConfig, VoiceInfo};
use crate::util::{ensure_dir, optional_timeout, persist_file, temp_sibling};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

const HF_BASE: &str = "https://huggingface.co/rhasspy/piper-voices/resolve/main";

/// Downloadable voices: name, repository sub-path, language, gender.
const VOICE_CATALOGUE: [(&str, &str, &str, &str); 7] = [
    ("it_IT-paola-medium", "it/it_IT/paola/medium", "it", "Female"),
    ("it_IT-riccardo-x_low", "it/it_IT/riccardo/x_low", "it", "Male"),
    ("en_US-lessac-medium", "en/en_US/lessac/medium", "en", "Male"),
    ("en_US-amy-medium", "en/en_US/amy/medium", "en", "Female"),
    ("es_ES-davefx-medium", "es/es_ES/davefx/medium", "es", "Male"),
    ("fr_FR-siwis-medium", "fr/fr_FR/siwis/medium", "fr", "Female"),
    ("de_DE-thorsten-medium", "de/de_DE/thorsten/medium", "de", "Male"),
];
const DEFAULT_VOICES: [(&str, &str); 5] = [
    ("it", "it_IT-paola-medium"),
    ("en", "en_US-lessac-medium"),
    ("es", "es_ES-davefx-medium"),
    ("fr", "fr_FR-siwis-medium"),
    ("de", "de_DE-thorsten-medium"),
];

/// Fast local voices through the `piper` command-line tool (wav output).
///
/// Models come from `model_path` when set, otherwise from the voice catalogue,
/// downloaded into `models_dir` on first use.
pub struct PiperEngine {
    config: PiperConfig,
}

impl PiperEngine {
    pub fn new(config: PiperConfig) -> Self {
        Self { config }
    }

    fn models_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.models_dir)
    }

    fn local_model(&self, voice: &str) -> (PathBuf, PathBuf) {
        let model = self.models_dir().join(format!("{voice}.onnx"));
        let config = resolve_piper_config(&model);
        (model, config)
    }

    /// Model and config paths for `config`, downloading catalogue voices that
    /// are not on disk yet.
    fn ensure_model(&self, config: &TtsConfig) -> ConvertResult<(PathBuf, PathBuf)> {
        if let Some(explicit) = &self.config.model_path {
            let model = PathBuf::from(explicit);
            let model_config = resolve_piper_config(&model);
            if !model.is_file() {
                return Err(ConvertError::DependencyUnavailable(format!(
                    "piper model not found: {}",
                    model.display()
                )));
            }
            return Ok((model, model_config));
        }

        let voice = resolve_voice(config, &DEFAULT_VOICES);
        let (model, model_config) = self.local_model(&voice);
        if model.is_file() && model_config.is_file() {
            return Ok((model, model_config));
        }

        let sub_path = catalogue_path(&voice).ok_or_else(|| unknown_voice(&voice))?;
        ensure_dir(&self.models_dir())?;
        info!(voice = %voice, "Downloading piper voice model");
        let timeout = Duration::from_secs(self.config.download_timeout_secs.max(1));
        if !model.is_file() {
            download(&format!("{HF_BASE}/{sub_path}/{voice}.onnx"), &model, timeout)?;
        }
        if !model_config.is_file() {
            download(
                &format!("{HF_BASE}/{sub_path}/{voice}.onnx.json"),
                &model_config,
                timeout,
            )?;
        }
        info!(voice = %voice, "Piper voice model ready");
        Ok((model, model_config))
    }
}

impl TtsEngine for PiperEngine {
    fn name(&self) -> &str {
        "Piper TTS"
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn initialize(&self) -> ConvertResult<()> {
        require_binary(&self.config.bin, "install with `pip install piper-tts`")
    }

    fn validate_config(&self, config: &TtsConfig) -> ConvertResult<()> {
        if self.config.model_path.is_some() {
            return Ok(());
        }
        let voice = resolve_voice(config, &DEFAULT_VOICES);
        let (model, model_config) = self.local_model(&voice);
        if catalogue_path(&voice).is_some() || (model.is_file() && model_config.is_file()) {
            Ok(())
        } else {
            Err(unknown_voice(&voice))
        }
    }

    fn synthesize(&self, text: &str, output_path: &Path, config: &TtsConfig) -> ConvertResult<()> {
        let (model, model_config) = self.ensure_model(config)?;
        let speed = if config.speed > 0.0 { config.speed } else { 1.0 };
        let length_scale = 1.0 / speed;

        let mut cmd = Command::new(&self.config.bin);
        cmd.arg("--model")
            .arg(&model)
            .arg("--config")
            .arg(&model_config)
            .arg("--output_file")
            .arg(output_path)
            .arg("--length_scale")
            .arg(format!("{length_scale:.3}"));
        debug!(model = %model.display(), length_scale, "Piper synthesis");

        run_synthesis_tool(
            cmd,
            Some(text.as_bytes()),
            optional_timeout(self.config.timeout_secs),
        )?;
        ensure_audio_written(output_path)
    }

    fn list_voices(&self, language: Option<&str>) -> ConvertResult<Vec<VoiceInfo>> {
        Ok(VOICE_CATALOGUE
            .iter()
            .filter(|(_, _, lang, _)| language.is_none_or(|wanted| *lang == wanted))
            .map(|(name, _, lang, gender)| VoiceInfo::new(name, lang, gender))
            .collect())
    }
}

/// Repository sub-path of a catalogue voice.
fn catalogue_path(voice: &str) -> Option<&'static str> {
    VOICE_CATALOGUE
        .iter()
        .find(|(name, _, _, _)| *name == voice)
        .map(|(_, sub_path, _, _)| *sub_path)
}

fn unknown_voice(voice: &str) -> ConvertError {
    let available: Vec<&str> = VOICE_CATALOGUE.iter().map(|(name, _, _, _)| *name).collect();
    ConvertError::InvalidVoice {
        engine: "piper".to_string(),
        voice: voice.to_string(),
        reason: format!("not in the voice catalogue; available: {}", available.join(", ")),
    }
}

/// `voice.onnx` → `voice.onnx.json`; any other path is taken as the config itself.
fn resolve_piper_config(model_path: &Path) -> PathBuf {
    if model_path
        .extension()
        .map(|ext| ext == "onnx")
        .unwrap_or(false)
    {
        return model_path.with_extension("onnx.json");
    }
    model_path.to_path_buf()
}

fn download(url: &str, dest: &Path, timeout: Duration) -> ConvertResult<()> {
    let failed = |reason: String| {
        ConvertError::DependencyUnavailable(format!("cannot download {url}: {reason}"))
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ebup-audiobook/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| failed(err.to_string()))?;
    let bytes = client
        .get(url)
        .send()
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.bytes())
        .map_err(|err| failed(err.to_string()))?;

    let temp = temp_sibling(dest, "tmp");
    if let Err(err) = fs::write(&temp, &bytes) {
        let _ = fs::remove_file(&temp);
        return Err(ConvertError::io(format!("write {}", temp.display()), err));
    }
    persist_file(&temp, dest)?;
    debug!(path = %dest.display(), bytes = bytes.len(), "Downloaded model file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_in(dir: &Path) -> PiperEngine {
        PiperEngine::new(PiperConfig {
            models_dir: dir.to_string_lossy().into_owned(),
            ..PiperConfig::default()
        })
    }

    #[test]
    fn catalogue_voices_filter_by_language() {
        let dir = tempfile::tempdir().expect("tempdir");
        let voices = engine_in(dir.path()).list_voices(Some("en")).expect("voices");
        let names: Vec<&str> = voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["en_US-lessac-medium", "en_US-amy-medium"]);
        assert!(engine_in(dir.path()).list_voices(Some("pl")).expect("voices").is_empty());
    }

    #[test]
    fn unknown_voice_is_rejected_before_synthesis() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = engine_in(dir.path());
        let cfg = TtsConfig {
            voice: "xx_XX-nobody-low".to_string(),
            ..TtsConfig::default()
        };
        let err = engine.validate_config(&cfg).expect_err("unknown voice");
        assert!(matches!(err, ConvertError::InvalidVoice { .. }));

        let err = engine
            .synthesize("ciao", &dir.path().join("out.wav"), &cfg)
            .expect_err("unknown voice");
        assert!(matches!(err, ConvertError::InvalidVoice { .. }));
    }

    #[test]
    fn locally_installed_voice_is_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("custom.onnx"), b"model").expect("write");
        fs::write(dir.path().join("custom.onnx.json"), b"{}").expect("write");
        let cfg = TtsConfig {
            voice: "custom".to_string(),
            ..TtsConfig::default()
        };
        engine_in(dir.path()).validate_config(&cfg).expect("local voice");
    }

    #[test]
    fn default_voice_depends_on_language() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = TtsConfig {
            language: "de".to_string(),
            ..TtsConfig::default()
        };
        engine_in(dir.path()).validate_config(&cfg).expect("catalogue voice");
        assert_eq!(resolve_voice(&cfg, &DEFAULT_VOICES), "de_DE-thorsten-medium");
    }

    #[test]
    fn config_path_sits_next_to_the_model() {
        assert_eq!(
            resolve_piper_config(Path::new("/m/it_IT-paola-medium.onnx")),
            PathBuf::from("/m/it_IT-paola-medium.onnx.json")
        );
    }
}
