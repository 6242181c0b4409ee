//! Audio measurement and audiobook assembly on top of ffmpeg/ffprobe.
//!
//! The converter talks to [`AudioToolkit`] so tests can substitute a fake
//! that never shells out.

mod m4b;
mod probe;

pub use m4b::{
    ChapterMarker, CoverFormat, assemble_m4b, build_concat_list, build_ffmetadata,
    chapter_markers, escape_ffmetadata,
};
pub use probe::{parse_probe_output, probe_duration_ms};

use crate::config::AppConfig;
use crate::error::{ConvertError, ConvertResult};
use crate::models::{BookMetadata, ChapterAudio};
use crate::util::command_available;
use std::path::Path;

pub trait AudioToolkit: Send + Sync {
    /// Fail with [`ConvertError::DependencyUnavailable`] when the tools are missing.
    fn check_available(&self) -> ConvertResult<()>;

    /// Duration of a finished audio file in whole milliseconds, read from
    /// container metadata.
    fn probe_duration_ms(&self, path: &Path) -> ConvertResult<u64>;

    /// Concatenate `chapters` in order into one chaptered audiobook at
    /// `output`. Intermediates live in `work_dir` and are removed afterwards.
    fn assemble(
        &self,
        chapters: &[ChapterAudio],
        metadata: &BookMetadata,
        output: &Path,
        work_dir: &Path,
        bitrate: &str,
    ) -> ConvertResult<()>;
}

impl<T: AudioToolkit + ?Sized> AudioToolkit for Box<T> {
    fn check_available(&self) -> ConvertResult<()> {
        (**self).check_available()
    }

    fn probe_duration_ms(&self, path: &Path) -> ConvertResult<u64> {
        (**self).probe_duration_ms(path)
    }

    fn assemble(
        &self,
        chapters: &[ChapterAudio],
        metadata: &BookMetadata,
        output: &Path,
        work_dir: &Path,
        bitrate: &str,
    ) -> ConvertResult<()> {
        (**self).assemble(chapters, metadata, output, work_dir, bitrate)
    }
}

/// The real toolkit: external `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl Ffmpeg {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.ffmpeg_bin.clone(), config.ffprobe_bin.clone())
    }
}

impl AudioToolkit for Ffmpeg {
    fn check_available(&self) -> ConvertResult<()> {
        let missing: Vec<&str> = [self.ffmpeg.as_str(), self.ffprobe.as_str()]
            .into_iter()
            .filter(|bin| !command_available(bin))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConvertError::DependencyUnavailable(format!(
                "{} not found on PATH; install ffmpeg",
                missing.join(" and ")
            )))
        }
    }

    fn probe_duration_ms(&self, path: &Path) -> ConvertResult<u64> {
        probe_duration_ms(&self.ffprobe, path)
    }

    fn assemble(
        &self,
        chapters: &[ChapterAudio],
        metadata: &BookMetadata,
        output: &Path,
        work_dir: &Path,
        bitrate: &str,
    ) -> ConvertResult<()> {
        assemble_m4b(&self.ffmpeg, chapters, metadata, output, work_dir, bitrate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tools_are_reported_together() {
        let toolkit = Ffmpeg::new("no-ffmpeg-here-1", "no-ffprobe-here-1");
        match toolkit.check_available() {
            Err(ConvertError::DependencyUnavailable(msg)) => {
                assert!(msg.contains("no-ffmpeg-here-1 and no-ffprobe-here-1"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn toolkit_follows_configured_binaries() {
        let mut cfg = AppConfig::default();
        cfg.ffmpeg_bin = "/opt/ff/ffmpeg".to_string();
        let toolkit = Ffmpeg::from_config(&cfg);
        assert_eq!(toolkit.ffmpeg, "/opt/ff/ffmpeg");
        assert_eq!(toolkit.ffprobe, "ffprobe");
    }
}
