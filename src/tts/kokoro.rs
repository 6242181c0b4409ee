use super::{
    TtsEngine, base_language, ensure_audio_written, require_binary, resolve_voice,
    run_synthesis_tool,
};
use crate::config::KokoroConfig;
use crate::error::{ConvertError, ConvertResult};
use crate::models::{AudioFormat, TtsConfig, VoiceInfo};
use crate::util::optional_timeout;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::debug;

const LANGUAGE_CODES: [(&str, &str); 7] = [
    ("it", "it"),
    ("en", "en-us"),
    ("es", "es"),
    ("fr", "fr-fr"),
    ("ja", "ja"),
    ("zh", "cmn"),
    ("pt", "pt-br"),
];
const DEFAULT_VOICES: [(&str, &str); 4] = [
    ("it", "if_sara"),
    ("en", "af_heart"),
    ("es", "ef_dora"),
    ("fr", "ff_siwis"),
];
const KNOWN_VOICES: [(&str, &str, &str); 4] = [
    ("if_sara", "it", "Female"),
    ("im_nicola", "it", "Male"),
    ("af_heart", "en", "Female"),
    ("am_adam", "en", "Male"),
];

/// Offline neural voices through the `kokoro-tts` command-line tool (wav output).
pub struct KokoroEngine {
    config: KokoroConfig,
}

impl KokoroEngine {
    pub fn new(config: KokoroConfig) -> Self {
        Self { config }
    }
}

impl TtsEngine for KokoroEngine {
    fn name(&self) -> &str {
        "Kokoro TTS"
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn initialize(&self) -> ConvertResult<()> {
        require_binary(&self.config.bin, "install with `pip install kokoro-tts`")?;
        for path in [&self.config.model_path, &self.config.voices_path]
            .into_iter()
            .flatten()
        {
            if !Path::new(path).is_file() {
                return Err(ConvertError::DependencyUnavailable(format!(
                    "kokoro model file not found: {path}"
                )));
            }
        }
        Ok(())
    }

    fn synthesize(&self, text: &str, output_path: &Path, config: &TtsConfig) -> ConvertResult<()> {
        let voice = resolve_voice(config, &DEFAULT_VOICES);
        let lang = language_code(&config.language);
        let text_path = output_path.with_extension("txt");
        fs::write(&text_path, text)
            .map_err(|err| ConvertError::io(format!("write {}", text_path.display()), err))?;

        let mut cmd = Command::new(&self.config.bin);
        cmd.arg(&text_path)
            .arg(output_path)
            .arg("--voice")
            .arg(&voice)
            .arg("--speed")
            .arg(format!("{}", config.speed))
            .arg("--lang")
            .arg(lang)
            .args(["--format", "wav"]);
        if let Some(model) = &self.config.model_path {
            cmd.arg("--model").arg(model);
        }
        if let Some(voices) = &self.config.voices_path {
            cmd.arg("--voices").arg(voices);
        }
        debug!(voice = %voice, lang, speed = config.speed, "Kokoro synthesis");

        let result = run_synthesis_tool(cmd, None, optional_timeout(self.config.timeout_secs));
        let _ = fs::remove_file(&text_path);
        result?;
        ensure_audio_written(output_path)
    }

    fn list_voices(&self, language: Option<&str>) -> ConvertResult<Vec<VoiceInfo>> {
        Ok(KNOWN_VOICES
            .iter()
            .filter(|(_, lang, _)| language.is_none_or(|wanted| *lang == wanted))
            .map(|(name, lang, gender)| VoiceInfo::new(name, lang, gender))
            .collect())
    }
}

/// Kokoro's language identifier for `language`; Italian when unmapped.
fn language_code(language: &str) -> &'static str {
    let base = base_language(language);
    LANGUAGE_CODES
        .iter()
        .find(|(code, _)| *code == base)
        .map(|(_, kokoro)| *kokoro)
        .unwrap_or("it")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_codes_map_to_kokoro_identifiers() {
        assert_eq!(language_code("en"), "en-us");
        assert_eq!(language_code("zh-CN"), "cmn");
        assert_eq!(language_code("pt"), "pt-br");
        assert_eq!(language_code("xx"), "it");
    }

    #[test]
    fn voices_filter_by_exact_language() {
        let engine = KokoroEngine::new(KokoroConfig::default());
        let it = engine.list_voices(Some("it")).expect("voices");
        assert_eq!(
            it.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            vec!["if_sara", "im_nicola"]
        );
        assert!(engine.list_voices(Some("it-IT")).expect("voices").is_empty());
        assert_eq!(engine.list_voices(None).expect("voices").len(), 4);
    }

    #[test]
    fn missing_model_file_is_reported() {
        let engine = KokoroEngine::new(KokoroConfig {
            bin: "sh".to_string(),
            model_path: Some("/nonexistent/kokoro.onnx".to_string()),
            ..KokoroConfig::default()
        });
        let err = engine.initialize().expect_err("should fail");
        assert!(matches!(err, ConvertError::DependencyUnavailable(_)));
    }
}
