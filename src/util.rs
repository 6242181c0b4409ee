//! Filesystem and external-tool helpers shared by the engines and the
//! ffmpeg toolkit.

use crate::error::{ConvertError, ConvertResult};
use sha2::{Digest, Sha256};
use std::env;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn ensure_dir(p: &Path) -> ConvertResult<()> {
    std::fs::create_dir_all(p)
        .map_err(|err| ConvertError::io(format!("create_dir_all {}", p.display()), err))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    format!("{:x}", h.finalize())
}

/// True when `path` exists and holds at least one byte.
pub fn non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Resolve `bin` the way a shell would: explicit paths are checked directly,
/// bare names are searched on `PATH`.
pub fn find_executable(bin: &str) -> Option<PathBuf> {
    let candidate = Path::new(bin);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(bin))
        .find(|full| full.is_file())
}

pub fn command_available(bin: &str) -> bool {
    find_executable(bin).is_some()
}

/// Result of a finished external tool.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    /// Last non-empty stderr line, which is where ffmpeg-style tools put the
    /// actual error.
    pub fn stderr_tail(&self) -> String {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("")
            .to_string()
    }
}

#[derive(Debug)]
pub enum ToolRun {
    Finished(ToolOutput),
    TimedOut,
}

/// Run `cmd` to completion, optionally feeding `stdin` and enforcing `timeout`.
///
/// Stdout and stderr are drained on helper threads so a chatty tool can never
/// block on a full pipe while we poll for exit.
pub fn run_tool(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> std::io::Result<ToolRun> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    debug!(command = ?cmd, "Spawning external tool");

    let mut child = cmd.spawn()?;
    let stdout_reader = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            buf
        })
    });
    let stderr_reader = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            buf
        })
    });

    if let Some(bytes) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            if let Err(err) = pipe.write_all(bytes) {
                warn!("Failed to write tool stdin: {err}");
            }
        }
    }

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                warn!(
                    elapsed_secs = started.elapsed().as_secs(),
                    "External tool timed out; killing"
                );
                let _ = child.kill();
                let _ = child.wait();
                return Ok(ToolRun::TimedOut);
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    Ok(ToolRun::Finished(ToolOutput {
        status,
        stdout,
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }))
}

/// Converts a zero-means-unlimited seconds setting into an optional limit.
pub fn optional_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Sibling path for write-then-rename, e.g. `chapter_0001.tmp.wav`, so a
/// partial file never sits at the final name.
pub fn temp_sibling(path: &Path, marker: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{marker}.{ext}"),
        None => format!("{stem}.{marker}"),
    };
    path.with_file_name(name)
}

/// Move a finished temp file into place. Falls back to copy when the rename
/// crosses filesystems; a failed copy leaves nothing at `dest`.
pub fn persist_file(temp: &Path, dest: &Path) -> ConvertResult<()> {
    if std::fs::rename(temp, dest).is_err() {
        if let Err(err) = std::fs::copy(temp, dest) {
            let _ = std::fs::remove_file(dest);
            return Err(ConvertError::io(
                format!("move {} to {}", temp.display(), dest.display()),
                err,
            ));
        }
        let _ = std::fs::remove_file(temp);
    }
    Ok(())
}

/// One `file '...'` line for ffmpeg's concat demuxer. Entries are made
/// absolute because the demuxer resolves relative ones against the list file.
pub fn concat_list_entry(path: &Path) -> String {
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file '{}'\n", path.to_string_lossy().replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn concat_entries_quote_single_quotes() {
        assert_eq!(
            concat_list_entry(Path::new("/tmp/it's.mp3")),
            "file '/tmp/it'\\''s.mp3'\n"
        );
    }

    #[test]
    fn temp_sibling_keeps_directory_and_extension() {
        let p = Path::new("/work/chapter_0003.wav");
        assert_eq!(
            temp_sibling(p, "tmp"),
            PathBuf::from("/work/chapter_0003.tmp.wav")
        );
    }

    #[test]
    fn persist_moves_temp_over_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp = dir.path().join("chapter_0000.tmp.wav");
        let dest = dir.path().join("chapter_0000.wav");
        std::fs::write(&temp, b"audio").expect("write");
        persist_file(&temp, &dest).expect("persist");
        assert_eq!(std::fs::read(&dest).expect("read"), b"audio");
        assert!(!temp.exists());
    }

    #[test]
    fn failed_persist_leaves_no_file_at_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("chapter_0000.wav");
        std::fs::write(&dest, b"trunc").expect("write stale");
        let err = persist_file(&dir.path().join("missing.tmp.wav"), &dest).expect_err("no temp");
        assert!(matches!(err, ConvertError::Io { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn non_empty_file_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = dir.path().join("empty.wav");
        std::fs::write(&empty, b"").expect("write");
        let full = dir.path().join("full.wav");
        std::fs::write(&full, b"RIFF").expect("write");

        assert!(!non_empty_file(&dir.path().join("missing.wav")));
        assert!(!non_empty_file(&empty));
        assert!(non_empty_file(&full));
    }

    #[test]
    fn missing_binary_is_not_available() {
        assert!(!command_available("definitely-not-a-real-tool-7f3a"));
        assert!(!command_available("/nonexistent/dir/tool"));
    }

    #[cfg(unix)]
    #[test]
    fn run_tool_captures_output_and_times_out() {
        if !command_available("sh") {
            return;
        }
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("cat; echo oops >&2");
        let run = run_tool(cmd, Some(b"hello"), Some(Duration::from_secs(10))).expect("spawn");
        match run {
            ToolRun::Finished(out) => {
                assert!(out.status.success());
                assert_eq!(out.stdout, b"hello");
                assert_eq!(out.stderr_tail(), "oops");
            }
            ToolRun::TimedOut => panic!("unexpected timeout"),
        }

        let mut slow = Command::new("sh");
        slow.arg("-c").arg("sleep 5");
        let run = run_tool(slow, None, Some(Duration::from_millis(100))).expect("spawn");
        assert!(matches!(run, ToolRun::TimedOut));
    }
}
