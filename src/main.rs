//! Command-line entry point.
//!
//! Responsibilities here are intentionally minimal:
//! - Parse command-line arguments and merge them over `conf/config.toml`.
//! - Build the selected engine from the registry.
//! - Run one conversion with a terminal progress bar, or list voices/engines.

use anyhow::{Context, Result, bail};
use clap::Parser;
use ebup_audiobook::audio::Ffmpeg;
use ebup_audiobook::cancellation::CancellationToken;
use ebup_audiobook::config::{AppConfig, DEFAULT_CONFIG_PATH, load_config};
use ebup_audiobook::converter::Converter;
use ebup_audiobook::epub_loader::default_output_path;
use ebup_audiobook::metadata::{MetadataLookup, NoLookup, OpenLibrary};
use ebup_audiobook::progress::ProgressReporter;
use ebup_audiobook::tts::EngineRegistry;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const EXIT_INTERRUPTED: i32 = 130;

/// Convert EPUB books into M4B audiobooks with chapters and cover art.
#[derive(Debug, Parser)]
#[command(name = "ebup-audiobook", version)]
struct Cli {
    /// EPUB file to convert
    input: Option<PathBuf>,

    /// Output M4B file (default: the input path with a .m4b extension)
    output: Option<PathBuf>,

    /// TTS engine to use (edge, kokoro, piper)
    #[arg(short = 'e', long)]
    engine: Option<String>,

    /// Voice name; depends on the engine
    #[arg(short = 'v', long)]
    voice: Option<String>,

    /// Reading speed multiplier (1.0 = normal)
    #[arg(short = 's', long)]
    speed: Option<f32>,

    /// Engine-specific pitch adjustment, e.g. "+0Hz"
    #[arg(long, allow_hyphen_values = true)]
    pitch: Option<String>,

    /// Language code
    #[arg(short = 'l', long)]
    language: Option<String>,

    /// AAC bitrate of the output
    #[arg(short = 'b', long)]
    bitrate: Option<String>,

    /// Directory for intermediate files; enables resume
    #[arg(short = 'w', long)]
    work_dir: Option<PathBuf>,

    /// Explicit Piper .onnx model
    #[arg(long)]
    piper_model: Option<PathBuf>,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// List the voices of the selected engine and exit
    #[arg(long)]
    list_voices: bool,

    /// List the registered engines and exit
    #[arg(long)]
    list_engines: bool,

    /// Skip the online cover lookup
    #[arg(long)]
    no_enrich: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

enum Outcome {
    Completed,
    Interrupted,
}

fn main() {
    let cli = Cli::parse();
    let reload_handle = init_tracing();
    match run(cli, &reload_handle) {
        Ok(Outcome::Completed) => {}
        Ok(Outcome::Interrupted) => std::process::exit(EXIT_INTERRUPTED),
        Err(err) => {
            error!("{err:?}");
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli, reload_handle: &ReloadHandle) -> Result<Outcome> {
    let mut config = load_config(&cli.config);
    apply_overrides(&mut config, &cli);
    let level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_filter_str()
    };
    set_log_level(reload_handle, level);

    let registry = EngineRegistry::builtin(&config);
    if cli.list_engines {
        for key in registry.keys() {
            println!("{key}");
        }
        return Ok(Outcome::Completed);
    }

    let engine = registry.create(&config.engine)?;
    if cli.list_voices {
        list_voices(&*engine, &config)?;
        return Ok(Outcome::Completed);
    }

    let Some(input) = cli.input.as_deref() else {
        bail!("No input file given; usage: ebup-audiobook <book.epub> [output.m4b]");
    };
    validate_input(input)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(input));
    let work_dir = config.work_dir_path();

    info!(
        input = %input.display(),
        output = %output.display(),
        engine = %config.engine,
        voice = %config.voice,
        speed = config.speed,
        language = %config.language,
        bitrate = %config.bitrate,
        "Starting conversion"
    );

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Ctrl-C handler not installed: {err}");
    }

    let lookup: Box<dyn MetadataLookup> = if config.enrich_metadata {
        Box::new(OpenLibrary::new(config.enrichment_timeout()))
    } else {
        Box::new(NoLookup)
    };
    let converter = Converter::new(
        engine,
        Ffmpeg::from_config(&config),
        config.tts_config(),
        config.bitrate.clone(),
    )
    .with_lookup(lookup)
    .with_cancel(cancel);

    let mut reporter = ProgressReporter::new();
    let result = converter.convert(
        input,
        &output,
        work_dir.as_deref(),
        &mut |current, total, title| reporter.update(current, total, title),
    );

    match result {
        Ok(path) => {
            reporter.finish();
            println!("Audiobook created: {}", path.display());
            Ok(Outcome::Completed)
        }
        Err(err) if err.is_interrupted() => {
            reporter.abandon();
            eprintln!("\nConversion interrupted.");
            match &work_dir {
                Some(dir) => eprintln!(
                    "Resume with: ebup-audiobook {} {} -w {}",
                    input.display(),
                    output.display(),
                    dir.display()
                ),
                None => eprintln!("Pass -w <dir> next time to keep finished chapters."),
            }
            Ok(Outcome::Interrupted)
        }
        Err(err) => {
            reporter.abandon();
            Err(err).with_context(|| format!("Conversion of {} failed", input.display()))
        }
    }
}

/// Command-line values win over the configuration file.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(engine) = &cli.engine {
        config.engine = engine.trim().to_string();
    }
    if let Some(voice) = &cli.voice {
        config.voice = voice.clone();
    }
    if let Some(speed) = cli.speed {
        config.speed = speed;
    }
    if let Some(pitch) = &cli.pitch {
        config.pitch = Some(pitch.clone());
    }
    if let Some(language) = &cli.language {
        config.language = language.clone();
    }
    if let Some(bitrate) = &cli.bitrate {
        config.bitrate = bitrate.clone();
    }
    if let Some(dir) = &cli.work_dir {
        config.work_dir = Some(dir.to_string_lossy().into_owned());
    }
    if let Some(model) = &cli.piper_model {
        config.piper.model_path = Some(model.to_string_lossy().into_owned());
    }
    if cli.no_enrich {
        config.enrich_metadata = false;
    }
}

fn validate_input(input: &Path) -> Result<()> {
    if !input.exists() {
        bail!("File not found: {}", input.display());
    }
    let is_epub = input
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("epub"))
        .unwrap_or(false);
    if !is_epub {
        bail!("Input must be an EPUB file: {}", input.display());
    }
    Ok(())
}

fn list_voices(engine: &dyn ebup_audiobook::tts::TtsEngine, config: &AppConfig) -> Result<()> {
    engine
        .initialize()
        .with_context(|| format!("{} is not ready", engine.name()))?;
    let language = config.language.trim();
    let voices = engine.list_voices(Some(language))?;
    if voices.is_empty() {
        println!(
            "No voices found for language '{language}' with engine '{}'",
            config.engine
        );
        return Ok(());
    }
    println!("\nAvailable voices ({}, language: {language}):\n", engine.name());
    for voice in voices {
        println!(
            "  {:<35} {:<10} {}",
            voice.name,
            voice.language,
            voice.gender.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level");
    }
}
