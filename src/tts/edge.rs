use super::{TtsEngine, ensure_audio_written, require_binary, resolve_voice, run_synthesis_tool};
use crate::config::EdgeConfig;
use crate::error::{ConvertError, ConvertResult};
use crate::models::{AudioFormat, TtsConfig, VoiceInfo};
use crate::text_utils::split_into_chunks;
use crate::util::{concat_list_entry, optional_timeout};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_VOICES: [(&str, &str); 5] = [
    ("it", "it-IT-IsabellaNeural"),
    ("en", "en-US-AriaNeural"),
    ("es", "es-ES-ElviraNeural"),
    ("fr", "fr-FR-DeniseNeural"),
    ("de", "de-DE-KatjaNeural"),
];
const DEFAULT_PITCH: &str = "+0Hz";
const VOICES_URL: &str = "https://speech.platform.bing.com/consumer/speech/synthesize/readaloud/voices/list?trustedclienttoken=6A5AA1D4EAFF4E9FB37E23D68491D6F4";

/// Cloud neural voices through the `edge-tts` command-line tool (mp3 output).
pub struct EdgeEngine {
    config: EdgeConfig,
    ffmpeg_bin: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogueVoice {
    short_name: String,
    locale: String,
    #[serde(default)]
    gender: String,
}

impl EdgeEngine {
    pub fn new(config: EdgeConfig, ffmpeg_bin: String) -> Self {
        Self { config, ffmpeg_bin }
    }

    fn synthesize_chunk(
        &self,
        text: &str,
        output: &Path,
        voice: &str,
        rate: &str,
        pitch: &str,
    ) -> ConvertResult<()> {
        // Text goes through a file so long chapters never hit argv limits.
        let text_path = output.with_extension("txt");
        fs::write(&text_path, text)
            .map_err(|err| ConvertError::io(format!("write {}", text_path.display()), err))?;

        let mut cmd = Command::new(&self.config.bin);
        cmd.arg("--file")
            .arg(&text_path)
            .arg("--voice")
            .arg(voice)
            .arg(format!("--rate={rate}"))
            .arg(format!("--pitch={pitch}"))
            .arg("--write-media")
            .arg(output);
        let result = run_synthesis_tool(
            cmd,
            None,
            optional_timeout(self.config.chunk_timeout_secs),
        );
        let _ = fs::remove_file(&text_path);
        result?;
        ensure_audio_written(output)
    }

    fn concat_chunks(&self, chunks: &[PathBuf], output: &Path) -> ConvertResult<()> {
        let list_path = output.with_extension("concat.txt");
        let listing: String = chunks
            .iter()
            .map(|path| concat_list_entry(path))
            .collect();
        fs::write(&list_path, listing)
            .map_err(|err| ConvertError::io(format!("write {}", list_path.display()), err))?;

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(output);
        let result = run_synthesis_tool(cmd, None, None);
        let _ = fs::remove_file(&list_path);
        result.map(|_| ())
    }

    fn fetch_catalogue(&self) -> ConvertResult<Vec<CatalogueVoice>> {
        let unavailable =
            |err: reqwest::Error| ConvertError::DependencyUnavailable(format!("edge voice list: {err}"));
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.config.voices_timeout_secs.max(1)))
            .user_agent(concat!("ebup-audiobook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(unavailable)?;
        client
            .get(VOICES_URL)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(unavailable)?
            .json::<Vec<CatalogueVoice>>()
            .map_err(unavailable)
    }
}

impl TtsEngine for EdgeEngine {
    fn name(&self) -> &str {
        "Edge TTS"
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn initialize(&self) -> ConvertResult<()> {
        require_binary(&self.config.bin, "install with `pip install edge-tts`")
    }

    fn synthesize(&self, text: &str, output_path: &Path, config: &TtsConfig) -> ConvertResult<()> {
        let voice = resolve_voice(config, &DEFAULT_VOICES);
        let rate = speed_to_rate(config.speed);
        let pitch = config.pitch.as_deref().unwrap_or(DEFAULT_PITCH);
        let chunks = split_into_chunks(text, self.config.max_chunk_chars.max(1));
        debug!(voice = %voice, rate = %rate, chunks = chunks.len(), "Edge synthesis");

        if chunks.len() == 1 {
            return self.synthesize_chunk(&chunks[0], output_path, &voice, &rate, pitch);
        }

        let stem = output_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("edge");
        let mut chunk_files = ChunkFiles::default();
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_path = output_path.with_file_name(format!("{stem}_chunk{i:04}.mp3"));
            chunk_files.0.push(chunk_path.clone());
            self.synthesize_chunk(chunk, &chunk_path, &voice, &rate, pitch)?;
        }
        info!(chunks = chunk_files.0.len(), "Concatenating edge chunks");
        self.concat_chunks(&chunk_files.0, output_path)?;
        ensure_audio_written(output_path)
    }

    fn list_voices(&self, language: Option<&str>) -> ConvertResult<Vec<VoiceInfo>> {
        Ok(filter_catalogue(self.fetch_catalogue()?, language))
    }
}

/// Chunk files are scratch output; they go away whether or not the
/// concatenation succeeded.
#[derive(Default)]
struct ChunkFiles(Vec<PathBuf>);

impl Drop for ChunkFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            let _ = fs::remove_file(path);
        }
    }
}

/// Speed multiplier to edge rate string: 1.2 → `+20%`, 0.9 → `-10%`.
fn speed_to_rate(speed: f32) -> String {
    let percent = ((speed - 1.0) * 100.0).round() as i32;
    if percent >= 0 {
        format!("+{percent}%")
    } else {
        format!("{percent}%")
    }
}

fn filter_catalogue(voices: Vec<CatalogueVoice>, language: Option<&str>) -> Vec<VoiceInfo> {
    let prefix = language.map(|l| l.trim().to_lowercase());
    voices
        .into_iter()
        .filter(|v| match &prefix {
            Some(p) => v.locale.to_lowercase().starts_with(p.as_str()),
            None => true,
        })
        .map(|v| VoiceInfo::new(&v.short_name, &v.locale, &v.gender))
        .collect()
}
