//! Shared fixtures for the integration tests: real EPUB archives written with
//! `zip`, a stub engine that writes silent WAV files with `hound`, and an
//! audio toolkit that never shells out.

#![allow(dead_code)]

use ebup_audiobook::audio::AudioToolkit;
use ebup_audiobook::error::{ConvertError, ConvertResult};
use ebup_audiobook::models::{AudioFormat, BookMetadata, ChapterAudio, TtsConfig, VoiceInfo};
use ebup_audiobook::tts::TtsEngine;
use ebup_audiobook::util::command_available;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zip::write::FileOptions;

pub const SAMPLE_RATE: u32 = 8000;

/// One spine document: file name inside `OEBPS/` and its XHTML body.
pub struct Doc<'a> {
    pub name: &'a str,
    pub body: &'a str,
}

/// Write an EPUB 3 archive whose spine lists `docs` in order.
pub fn write_epub(path: &Path, title: &str, author: &str, docs: &[Doc<'_>]) {
    let file = File::create(path).expect("create epub");
    let mut zip = zip::ZipWriter::new(file);
    let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("mimetype", stored).expect("mimetype");
    zip.write_all(b"application/epub+zip").expect("write mimetype");

    zip.start_file("META-INF/container.xml", FileOptions::default())
        .expect("container");
    zip.write_all(
        br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#,
    )
    .expect("write container");

    let manifest: String = docs
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            format!(
                r#"<item id="doc{i}" href="{}" media-type="application/xhtml+xml"/>"#,
                doc.name
            )
        })
        .collect::<Vec<_>>()
        .join("\n    ");
    let spine: String = (0..docs.len())
        .map(|i| format!(r#"<itemref idref="doc{i}"/>"#))
        .collect::<Vec<_>>()
        .join("\n    ");
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{title}</dc:title>
    <dc:creator>{author}</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    {manifest}
  </manifest>
  <spine>
    {spine}
  </spine>
</package>"#
    );
    zip.start_file("OEBPS/content.opf", FileOptions::default())
        .expect("opf");
    zip.write_all(opf.as_bytes()).expect("write opf");

    for doc in docs {
        let xhtml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{}</title></head>
<body>{}</body></html>"#,
            doc.name, doc.body
        );
        zip.start_file(format!("OEBPS/{}", doc.name), FileOptions::default())
            .expect("doc");
        zip.write_all(xhtml.as_bytes()).expect("write doc");
    }
    zip.finish().expect("finish epub");
}

/// Body of a chapter with a heading and three short paragraphs.
pub fn chapter_body(title: &str) -> String {
    format!(
        "<h1>{title}</h1><p>First paragraph.</p><p>Second paragraph.</p><p>Third paragraph.</p>"
    )
}

/// Write `duration_ms` of 16-bit mono silence.
pub fn write_silent_wav(path: &Path, duration_ms: u64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    let samples = SAMPLE_RATE as u64 * duration_ms / 1000;
    for _ in 0..samples {
        writer.write_sample(0i16).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

pub fn wav_duration_ms(path: &Path) -> u64 {
    let reader = hound::WavReader::open(path).expect("open wav");
    let spec = reader.spec();
    reader.duration() as u64 * 1000 / spec.sample_rate as u64
}

/// Engine producing silent WAVs whose durations come from `durations_ms`,
/// one per call, cycling when exhausted.
#[derive(Clone)]
pub struct SilentEngine {
    durations_ms: Vec<u64>,
    next: Arc<AtomicUsize>,
    pub texts: Arc<Mutex<Vec<String>>>,
}

impl SilentEngine {
    pub fn new(durations_ms: &[u64]) -> Self {
        Self {
            durations_ms: durations_ms.to_vec(),
            next: Arc::new(AtomicUsize::new(0)),
            texts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().expect("texts lock").clone()
    }
}

impl TtsEngine for SilentEngine {
    fn name(&self) -> &str {
        "Silent"
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn initialize(&self) -> ConvertResult<()> {
        Ok(())
    }

    fn synthesize(&self, text: &str, output_path: &Path, _config: &TtsConfig) -> ConvertResult<()> {
        self.texts.lock().expect("texts lock").push(text.to_string());
        let call = self.next.fetch_add(1, Ordering::SeqCst);
        let duration = self.durations_ms[call % self.durations_ms.len()];
        write_silent_wav(output_path, duration);
        Ok(())
    }

    fn list_voices(&self, _language: Option<&str>) -> ConvertResult<Vec<VoiceInfo>> {
        Ok(vec![VoiceInfo::new("silence", "en", "")])
    }
}

/// Reads WAV headers for durations and records what it was asked to assemble.
#[derive(Clone, Default)]
pub struct RecordingToolkit {
    pub assembled: Arc<Mutex<Option<(Vec<ChapterAudio>, BookMetadata)>>>,
}

impl RecordingToolkit {
    pub fn assembled(&self) -> Option<(Vec<ChapterAudio>, BookMetadata)> {
        self.assembled.lock().expect("assembled lock").clone()
    }
}

impl AudioToolkit for RecordingToolkit {
    fn check_available(&self) -> ConvertResult<()> {
        Ok(())
    }

    fn probe_duration_ms(&self, path: &Path) -> ConvertResult<u64> {
        hound::WavReader::open(path)
            .map(|reader| reader.duration() as u64 * 1000 / reader.spec().sample_rate as u64)
            .map_err(|err| ConvertError::ProbeFailure {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
    }

    fn assemble(
        &self,
        chapters: &[ChapterAudio],
        metadata: &BookMetadata,
        output: &Path,
        _work_dir: &Path,
        _bitrate: &str,
    ) -> ConvertResult<()> {
        *self.assembled.lock().expect("assembled lock") = Some((chapters.to_vec(), metadata.clone()));
        fs::write(output, b"fake m4b").map_err(|err| ConvertError::io("write output", err))
    }
}

pub fn ffmpeg_available() -> bool {
    command_available("ffmpeg") && command_available("ffprobe")
}

pub fn scratch() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_path_buf();
    (dir, path)
}
