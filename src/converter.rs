//! Conversion orchestrator: EPUB in, chaptered M4B out.
//!
//! Chapters are processed strictly in index order, one synthesis call at a
//! time. Each chapter file is either reused from the working directory or
//! synthesized into a temporary sibling and renamed into place, then probed.
//! Once every chapter is probed the audio toolkit assembles the book.

use crate::audio::AudioToolkit;
use crate::cancellation::CancellationToken;
use crate::epub_loader;
use crate::error::{ConvertError, ConvertResult};
use crate::metadata::{MetadataLookup, NoLookup, enrich_book};
use crate::models::{AudioFormat, BookMetadata, Chapter, ChapterAudio, TtsConfig};
use crate::tts::TtsEngine;
use crate::util::{ensure_dir, non_empty_file, persist_file, temp_sibling};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

const WORK_DIR_PREFIX: &str = "e2a_";

/// Called once per completed chapter with `(completed, total, chapter_title)`.
pub type ProgressFn<'a> = dyn FnMut(usize, usize, &str) + 'a;

/// Deterministic chapter file name inside the working directory.
pub fn chapter_file_name(index: usize, format: AudioFormat) -> String {
    format!("chapter_{index:04}.{}", format.extension())
}

pub struct Converter<E: TtsEngine, A: AudioToolkit> {
    engine: E,
    toolkit: A,
    tts: TtsConfig,
    bitrate: String,
    lookup: Box<dyn MetadataLookup>,
    cancel: CancellationToken,
}

/// Where chapter files live for one run. A caller-supplied directory is left
/// on disk for resume; a temporary one is removed when this drops.
enum WorkDir {
    Kept(PathBuf),
    Temp(TempDir),
}

impl WorkDir {
    fn path(&self) -> &Path {
        match self {
            WorkDir::Kept(path) => path,
            WorkDir::Temp(dir) => dir.path(),
        }
    }
}

impl<E: TtsEngine, A: AudioToolkit> Converter<E, A> {
    pub fn new(engine: E, toolkit: A, tts: TtsConfig, bitrate: impl Into<String>) -> Self {
        Self {
            engine,
            toolkit,
            tts,
            bitrate: bitrate.into(),
            lookup: Box::new(NoLookup),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `lookup` to find a cover when the EPUB has none.
    pub fn with_lookup(mut self, lookup: Box<dyn MetadataLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Configuration and dependency checks; nothing is written.
    pub fn preflight(&self) -> ConvertResult<()> {
        if !(self.tts.speed.is_finite() && self.tts.speed > 0.0) {
            return Err(ConvertError::InvalidSetting(format!(
                "speed must be a positive number, got {}",
                self.tts.speed
            )));
        }
        if self.bitrate.trim().is_empty() {
            return Err(ConvertError::InvalidSetting("bitrate must not be empty".into()));
        }
        self.engine.initialize()?;
        self.engine.validate_config(&self.tts)?;
        self.toolkit.check_available()
    }

    /// Convert `epub` into an audiobook at `output`.
    ///
    /// With `work_dir` set, finished chapter files stay there and a later run
    /// with the same directory picks up where this one stopped.
    pub fn convert(
        &self,
        epub: &Path,
        output: &Path,
        work_dir: Option<&Path>,
        progress: &mut ProgressFn<'_>,
    ) -> ConvertResult<PathBuf> {
        self.preflight()?;
        self.cancel.check_cancelled("parse")?;

        info!(path = %epub.display(), "Parsing EPUB");
        let (metadata, chapters) = epub_loader::parse_epub(epub)?;
        info!(
            title = %metadata.title,
            author = %metadata.author,
            chapters = chapters.len(),
            "Parsed EPUB"
        );
        self.run(metadata, chapters, output, work_dir, progress)
    }

    /// Same as [`Converter::convert`] for a book that is already parsed.
    pub fn convert_parsed(
        &self,
        metadata: BookMetadata,
        chapters: Vec<Chapter>,
        output: &Path,
        work_dir: Option<&Path>,
        progress: &mut ProgressFn<'_>,
    ) -> ConvertResult<PathBuf> {
        self.preflight()?;
        self.run(metadata, chapters, output, work_dir, progress)
    }

    fn run(
        &self,
        metadata: BookMetadata,
        chapters: Vec<Chapter>,
        output: &Path,
        work_dir: Option<&Path>,
        progress: &mut ProgressFn<'_>,
    ) -> ConvertResult<PathBuf> {
        let started = Instant::now();
        if chapters.is_empty() {
            return Err(ConvertError::InvalidSetting("book has no chapters".into()));
        }

        let metadata = enrich_book(&metadata, self.lookup.as_ref());
        self.cancel.check_cancelled("metadata")?;

        let work = self.prepare_work_dir(work_dir)?;
        info!(
            engine = self.engine.name(),
            work_dir = %work.path().display(),
            "Starting synthesis"
        );

        let audio = self.synthesize_chapters(&chapters, work.path(), progress)?;

        self.cancel.check_cancelled("assembly")?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        info!(output = %output.display(), chapters = audio.len(), "Assembling audiobook");
        self.toolkit
            .assemble(&audio, &metadata, output, work.path(), &self.bitrate)
            .map_err(|err| self.interrupted_or(err, "assembly"))?;

        let total_ms: u64 = audio.iter().map(|a| a.duration_ms).sum();
        info!(
            output = %output.display(),
            duration_secs = total_ms / 1000,
            elapsed_secs = started.elapsed().as_secs(),
            "Audiobook created"
        );
        if let WorkDir::Kept(path) = &work {
            debug!(work_dir = %path.display(), "Keeping working directory for resume");
        }
        Ok(output.to_path_buf())
    }

    fn prepare_work_dir(&self, supplied: Option<&Path>) -> ConvertResult<WorkDir> {
        match supplied {
            Some(path) => {
                ensure_dir(path)?;
                Ok(WorkDir::Kept(path.to_path_buf()))
            }
            None => tempfile::Builder::new()
                .prefix(WORK_DIR_PREFIX)
                .tempdir()
                .map(WorkDir::Temp)
                .map_err(|err| ConvertError::io("create temporary working directory", err)),
        }
    }

    fn synthesize_chapters(
        &self,
        chapters: &[Chapter],
        work_dir: &Path,
        progress: &mut ProgressFn<'_>,
    ) -> ConvertResult<Vec<ChapterAudio>> {
        let total = chapters.len();
        let mut done = Vec::with_capacity(total);
        for chapter in chapters {
            self.cancel.check_cancelled("chapter")?;
            let audio = self.chapter_audio(chapter, work_dir)?;
            info!(
                chapter = chapter.index + 1,
                total,
                title = %chapter.title,
                duration_ms = audio.duration_ms,
                "Chapter ready"
            );
            done.push(audio);
            progress(done.len(), total, &chapter.title);
        }
        Ok(done)
    }

    fn chapter_audio(&self, chapter: &Chapter, work_dir: &Path) -> ConvertResult<ChapterAudio> {
        let path = work_dir.join(chapter_file_name(
            chapter.index,
            self.engine.output_format(),
        ));

        if non_empty_file(&path) {
            info!(chapter = chapter.index + 1, path = %path.display(), "Reusing cached chapter audio");
        } else {
            self.synthesize_into(chapter, &path)?;
        }

        let duration_ms = self
            .toolkit
            .probe_duration_ms(&path)
            .map_err(|err| self.interrupted_or(err, "probe"))?;
        Ok(ChapterAudio {
            chapter: chapter.clone(),
            audio_path: path,
            duration_ms,
        })
    }

    /// Synthesize into a temporary sibling and rename it over `path` only
    /// once the engine produced a non-empty file.
    fn synthesize_into(&self, chapter: &Chapter, path: &Path) -> ConvertResult<()> {
        let temp = temp_sibling(path, "tmp");
        if temp.exists() {
            debug!(path = %temp.display(), "Removing leftover partial chapter");
            let _ = fs::remove_file(&temp);
        }

        info!(
            chapter = chapter.index + 1,
            title = %chapter.title,
            chars = chapter.text.chars().count(),
            "Synthesizing chapter"
        );
        let result = self.engine.synthesize(&chapter.text, &temp, &self.tts);

        if let Err(err) = result {
            let _ = fs::remove_file(&temp);
            return Err(self.interrupted_or(err.for_chapter(chapter.index, &chapter.title), "synthesis"));
        }
        if !non_empty_file(&temp) {
            let _ = fs::remove_file(&temp);
            return Err(ConvertError::SynthesisFailure {
                index: chapter.index,
                title: chapter.title.clone(),
                reason: format!("{} produced no audio", self.engine.name()),
            });
        }
        persist_file(&temp, path)
    }

    /// Ctrl-C reaches child tools too, so a tool failure after cancellation
    /// is the interruption itself.
    fn interrupted_or(&self, err: ConvertError, stage: &'static str) -> ConvertError {
        if self.cancel.is_cancelled() && !err.is_interrupted() {
            warn!(stage, "Stopped by interruption: {err}");
            ConvertError::Interrupted { stage }
        } else {
            err
        }
    }
}
