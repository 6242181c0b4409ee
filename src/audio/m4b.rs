//! Chaptered M4B assembly.
//!
//! Two ffmpeg passes: chapter audio is concatenated and encoded to AAC once,
//! then chapter markers, title/author and optional cover art are muxed in with
//! stream copy. The final file is written beside the output path and renamed
//! into place only after both passes succeed.

use crate::error::{ConvertError, ConvertResult};
use crate::models::{BookMetadata, ChapterAudio};
use crate::util::{ToolRun, concat_list_entry, ensure_dir, persist_file, run_tool, temp_sibling};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

const CONCAT_LIST: &str = "concat.txt";
const METADATA_FILE: &str = "ffmetadata.txt";
const COMBINED_AUDIO: &str = "combined.m4a";

/// One navigation point in the finished audiobook, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterMarker {
    pub start_ms: u64,
    pub end_ms: u64,
    pub title: String,
}

/// Markers laid end to end: each starts where the previous one ended.
pub fn chapter_markers(chapters: &[ChapterAudio]) -> Vec<ChapterMarker> {
    let mut cursor = 0u64;
    chapters
        .iter()
        .map(|audio| {
            let start_ms = cursor;
            cursor += audio.duration_ms;
            ChapterMarker {
                start_ms,
                end_ms: cursor,
                title: audio.chapter.title.clone(),
            }
        })
        .collect()
}

/// Backslash first, then `=`, `;`, `#` and newline.
pub fn escape_ffmetadata(value: &str) -> String {
    let mut out = value.replace('\\', "\\\\");
    for special in ['=', ';', '#', '\n'] {
        out = out.replace(special, &format!("\\{special}"));
    }
    out
}

pub fn build_ffmetadata(chapters: &[ChapterAudio], metadata: &BookMetadata) -> String {
    let mut lines = vec![
        ";FFMETADATA1".to_string(),
        format!("title={}", escape_ffmetadata(&metadata.title)),
        format!("artist={}", escape_ffmetadata(&metadata.author)),
        String::new(),
    ];
    for marker in chapter_markers(chapters) {
        lines.push("[CHAPTER]".to_string());
        lines.push("TIMEBASE=1/1000".to_string());
        lines.push(format!("START={}", marker.start_ms));
        lines.push(format!("END={}", marker.end_ms));
        lines.push(format!("title={}", escape_ffmetadata(&marker.title)));
        lines.push(String::new());
    }
    lines.join("\n")
}

pub fn build_concat_list(chapters: &[ChapterAudio]) -> String {
    chapters
        .iter()
        .map(|audio| concat_list_entry(&audio.audio_path))
        .collect()
}

/// Cover image container, sniffed from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverFormat {
    Jpeg,
    Png,
}

impl CoverFormat {
    const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

    /// Unknown signatures are assumed to be JPEG.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(&Self::JPEG_SIGNATURE) {
            CoverFormat::Jpeg
        } else if bytes.starts_with(&Self::PNG_SIGNATURE) {
            CoverFormat::Png
        } else {
            CoverFormat::Jpeg
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            CoverFormat::Jpeg => "jpg",
            CoverFormat::Png => "png",
        }
    }
}

/// Removes intermediates when assembly ends, successfully or not.
struct Scratch(Vec<PathBuf>);

impl Drop for Scratch {
    fn drop(&mut self) {
        for path in &self.0 {
            if path.exists() {
                if let Err(err) = fs::remove_file(path) {
                    debug!(path = %path.display(), "Failed to remove intermediate: {err}");
                }
            }
        }
    }
}

pub fn assemble_m4b(
    ffmpeg: &str,
    chapters: &[ChapterAudio],
    metadata: &BookMetadata,
    output: &Path,
    work_dir: &Path,
    bitrate: &str,
) -> ConvertResult<()> {
    if chapters.is_empty() {
        return Err(ConvertError::AssemblyFailure(
            "no chapter audio to assemble".into(),
        ));
    }
    ensure_dir(work_dir)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }

    let concat_path = work_dir.join(CONCAT_LIST);
    let meta_path = work_dir.join(METADATA_FILE);
    let combined = work_dir.join(COMBINED_AUDIO);
    let staged_output = temp_sibling(output, "tmp");
    let mut scratch = Scratch(vec![
        concat_path.clone(),
        meta_path.clone(),
        combined.clone(),
        staged_output.clone(),
    ]);

    write_file(&concat_path, build_concat_list(chapters).as_bytes())?;
    write_file(&meta_path, build_ffmetadata(chapters, metadata).as_bytes())?;

    let cover_path = match metadata.cover_image.as_deref() {
        Some(bytes) if !bytes.is_empty() => {
            let format = CoverFormat::sniff(bytes);
            let path = work_dir.join(format!("cover.{}", format.extension()));
            write_file(&path, bytes)?;
            scratch.0.push(path.clone());
            debug!(path = %path.display(), bytes = bytes.len(), ?format, "Saved cover image");
            Some(path)
        }
        _ => None,
    };

    info!(chapters = chapters.len(), bitrate, "Encoding audio to AAC");
    let mut encode = Command::new(ffmpeg);
    encode
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(["-f", "concat", "-safe", "0", "-i"])
        .arg(&concat_path)
        .args(["-c:a", "aac", "-b:a", bitrate, "-flags:a", "+bitexact"])
        .args(["-fflags", "+bitexact"])
        .arg(&combined);
    run_ffmpeg("encode", encode)?;

    info!(with_cover = cover_path.is_some(), "Muxing chapters and metadata");
    let mut mux = Command::new(ffmpeg);
    mux.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(&combined)
        .args(["-f", "ffmetadata", "-i"])
        .arg(&meta_path);
    if let Some(cover) = &cover_path {
        mux.arg("-i").arg(cover);
    }
    mux.args(["-map", "0:a"]);
    if cover_path.is_some() {
        mux.args(["-map", "2:v"]);
    }
    mux.args(["-map_metadata", "1", "-map_chapters", "1", "-c", "copy"]);
    if cover_path.is_some() {
        mux.args([
            "-disposition:v:0",
            "attached_pic",
            "-metadata:s:v",
            "title=Cover",
            "-metadata:s:v",
            "comment=Cover (front)",
        ]);
    }
    mux.args(["-fflags", "+bitexact"]).arg(&staged_output);
    run_ffmpeg("mux", mux)?;

    persist_file(&staged_output, output)
        .map_err(|err| ConvertError::AssemblyFailure(format!("finalize output: {err}")))?;
    info!(path = %output.display(), "M4B created");
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> ConvertResult<()> {
    fs::write(path, bytes).map_err(|err| {
        ConvertError::AssemblyFailure(format!("cannot write {}: {err}", path.display()))
    })
}

fn run_ffmpeg(step: &str, cmd: Command) -> ConvertResult<()> {
    match run_tool(cmd, None, None) {
        Ok(ToolRun::Finished(out)) if out.status.success() => Ok(()),
        Ok(ToolRun::Finished(out)) => Err(ConvertError::AssemblyFailure(format!(
            "{step} step: ffmpeg exited with {}: {}",
            out.status,
            out.stderr_tail()
        ))),
        Ok(ToolRun::TimedOut) => Err(ConvertError::AssemblyFailure(format!(
            "{step} step: ffmpeg timed out"
        ))),
        Err(err) => Err(ConvertError::AssemblyFailure(format!(
            "{step} step: failed to start ffmpeg: {err}"
        ))),
    }
}
