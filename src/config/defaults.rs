pub(crate) fn default_engine() -> String {
    "edge".to_string()
}

pub(crate) fn default_speed() -> f32 {
    1.0
}

pub(crate) fn default_language() -> String {
    "it".to_string()
}

pub(crate) fn default_bitrate() -> String {
    "64k".to_string()
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Info
}

pub(crate) fn default_enrich_metadata() -> bool {
    true
}

pub(crate) fn default_enrichment_timeout_secs() -> u64 {
    10
}

pub(crate) fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

pub(crate) fn default_ffprobe_bin() -> String {
    "ffprobe".to_string()
}

pub(crate) fn default_edge_bin() -> String {
    "edge-tts".to_string()
}

pub(crate) fn default_edge_max_chunk_chars() -> usize {
    3000
}

pub(crate) fn default_edge_chunk_timeout_secs() -> u64 {
    300
}

pub(crate) fn default_edge_voices_timeout_secs() -> u64 {
    15
}

pub(crate) fn default_kokoro_bin() -> String {
    "kokoro-tts".to_string()
}

pub(crate) fn default_piper_bin() -> String {
    "piper".to_string()
}

pub(crate) fn default_piper_models_dir() -> String {
    ".cache/piper-models".to_string()
}

pub(crate) fn default_piper_download_timeout_secs() -> u64 {
    600
}
