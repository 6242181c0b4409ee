use crate::error::{ConvertError, ConvertResult};
use crate::util::{ToolRun, non_empty_file, run_tool};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProbeReport {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Duration of `path` in whole milliseconds from ffprobe's format section.
///
/// Only container metadata is read; the audio is never decoded.
pub fn probe_duration_ms(ffprobe: &str, path: &Path) -> ConvertResult<u64> {
    let fail = |reason: String| ConvertError::ProbeFailure {
        path: path.to_path_buf(),
        reason,
    };
    if !path.exists() {
        return Err(fail("file does not exist".into()));
    }
    if !non_empty_file(path) {
        return Err(fail("file is empty".into()));
    }

    let mut cmd = Command::new(ffprobe);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path);
    let output = match run_tool(cmd, None, None) {
        Ok(ToolRun::Finished(out)) => out,
        Ok(ToolRun::TimedOut) => return Err(fail("ffprobe timed out".into())),
        Err(err) => return Err(fail(format!("failed to start {ffprobe}: {err}"))),
    };
    if !output.status.success() {
        return Err(fail(format!(
            "ffprobe exited with {}: {}",
            output.status,
            output.stderr_tail()
        )));
    }

    let duration = parse_probe_output(&String::from_utf8_lossy(&output.stdout)).map_err(fail)?;
    debug!(path = %path.display(), duration_ms = duration, "Probed audio duration");
    Ok(duration)
}

/// Extract `format.duration` (seconds, as ffprobe prints it) in milliseconds.
pub fn parse_probe_output(json: &str) -> Result<u64, String> {
    let report: ProbeReport =
        serde_json::from_str(json).map_err(|err| format!("unreadable ffprobe output: {err}"))?;
    let raw = report
        .format
        .duration
        .ok_or_else(|| "no duration in container metadata".to_string())?;
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|err| format!("invalid duration '{raw}': {err}"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("invalid duration '{raw}'"));
    }
    Ok((seconds * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_seconds_into_millis() {
        let json = r#"{"format": {"filename": "a.wav", "duration": "2.000000", "bit_rate": "705600"}}"#;
        assert_eq!(parse_probe_output(json), Ok(2000));
        let json = r#"{"format": {"duration": "1.2345"}}"#;
        assert_eq!(parse_probe_output(json), Ok(1235));
    }

    #[test]
    fn missing_or_bad_duration_is_an_error() {
        assert!(parse_probe_output(r#"{"format": {}}"#).is_err());
        assert!(parse_probe_output(r#"{"format": {"duration": "N/A"}}"#).is_err());
        assert!(parse_probe_output("not json").is_err());
    }

    #[test]
    fn missing_and_empty_files_fail_before_running_ffprobe() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("none.wav");
        assert!(matches!(
            probe_duration_ms("ffprobe-not-needed", &missing),
            Err(ConvertError::ProbeFailure { .. })
        ));

        let empty = dir.path().join("empty.wav");
        std::fs::write(&empty, b"").expect("write");
        match probe_duration_ms("ffprobe-not-needed", &empty) {
            Err(ConvertError::ProbeFailure { reason, .. }) => assert_eq!(reason, "file is empty"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
