mod common;

use common::{Doc, RecordingToolkit, SilentEngine, chapter_body, write_epub};
use ebup_audiobook::audio::Ffmpeg;
use ebup_audiobook::config::AppConfig;
use ebup_audiobook::converter::Converter;
use ebup_audiobook::epub_loader::parse_epub;
use ebup_audiobook::error::ConvertError;
use ebup_audiobook::jobs::{JobStatus, JobStore};
use ebup_audiobook::metadata::NoLookup;
use ebup_audiobook::models::TtsConfig;
use ebup_audiobook::tts::EngineRegistry;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

fn three_chapter_book(path: &Path) {
    let one = chapter_body("One");
    let two = chapter_body("Two");
    let three = chapter_body("Three");
    write_epub(
        path,
        "Test Book",
        "Author X",
        &[
            Doc { name: "one.xhtml", body: &one },
            Doc { name: "scripts.xhtml", body: "<script>var x = 1;</script>" },
            Doc { name: "two.xhtml", body: &two },
            Doc { name: "three.xhtml", body: &three },
        ],
    );
}

#[test]
fn parsed_chapters_are_dense_and_skip_script_only_documents() {
    let (_guard, dir) = common::scratch();
    let epub = dir.join("book.epub");
    three_chapter_book(&epub);

    let (metadata, chapters) = parse_epub(&epub).expect("parse");
    assert_eq!(metadata.title, "Test Book");
    assert_eq!(metadata.author, "Author X");
    assert_eq!(metadata.language, "en");

    let indices: Vec<usize> = chapters.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["One", "Two", "Three"]);
    assert_eq!(
        chapters[0].text,
        "One\nFirst paragraph.\nSecond paragraph.\nThird paragraph."
    );
}

#[test]
fn resumed_run_matches_an_uninterrupted_one() {
    let (_guard, dir) = common::scratch();
    let epub = dir.join("book.epub");
    three_chapter_book(&epub);

    let reference_toolkit = RecordingToolkit::default();
    Converter::new(
        SilentEngine::new(&[1000, 2000, 500]),
        reference_toolkit.clone(),
        TtsConfig::default(),
        "64k",
    )
    .convert(&epub, &dir.join("reference.m4b"), Some(&dir.join("ref-work")), &mut |_, _, _| {})
    .expect("uninterrupted run");

    let work = dir.join("work");
    let output = dir.join("book.m4b");
    let first_engine = SilentEngine::new(&[1000, 2000, 500]);
    let first = Converter::new(
        first_engine.clone(),
        RecordingToolkit::default(),
        TtsConfig::default(),
        "64k",
    );
    let token = first.cancel_token();
    let err = first
        .convert(&epub, &output, Some(&work), &mut |done, _, _| {
            if done == 2 {
                token.cancel();
            }
        })
        .expect_err("interrupted");
    assert!(err.is_interrupted());
    assert_eq!(first_engine.texts().len(), 2);
    assert!(!output.exists());

    let second_engine = SilentEngine::new(&[500]);
    let toolkit = RecordingToolkit::default();
    let mut reported = Vec::new();
    Converter::new(second_engine.clone(), toolkit.clone(), TtsConfig::default(), "64k")
        .convert(&epub, &output, Some(&work), &mut |done, total, title| {
            reported.push((done, total, title.to_string()))
        })
        .expect("resumed run");

    assert_eq!(second_engine.texts().len(), 1);
    assert!(second_engine.texts()[0].starts_with("Three"));
    assert_eq!(reported.len(), 3);
    assert_eq!(reported[2], (3, 3, "Three".to_string()));

    let (resumed, _) = toolkit.assembled().expect("assembled");
    let (reference, _) = reference_toolkit.assembled().expect("assembled");
    let durations = |audio: &[ebup_audiobook::models::ChapterAudio]| {
        audio.iter().map(|a| a.duration_ms).collect::<Vec<u64>>()
    };
    assert_eq!(durations(&resumed), vec![1000, 2000, 500]);
    assert_eq!(durations(&resumed), durations(&reference));
    for (a, b) in resumed.iter().zip(&reference) {
        assert_eq!(
            fs::read(&a.audio_path).expect("read resumed"),
            fs::read(&b.audio_path).expect("read reference")
        );
    }
    assert!(work.join("chapter_0002.wav").is_file());
}

#[test]
fn unknown_engine_lists_registered_keys() {
    let mut registry = EngineRegistry::builtin(&AppConfig::default());
    registry.register("silent", || Box::new(SilentEngine::new(&[1000])));

    match registry.create("festival") {
        Err(ConvertError::UnknownEngine { requested, available }) => {
            assert_eq!(requested, "festival");
            assert_eq!(available, vec!["edge", "kokoro", "piper", "silent"]);
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("unknown engine must not be created"),
    }

    let engine = registry.create("silent").expect("registered engine");
    assert_eq!(engine.name(), "Silent");
}

#[test]
fn background_job_reports_progress_and_finishes() {
    let (_guard, dir) = common::scratch();
    let upload = dir.join("upload");
    fs::create_dir_all(&upload).expect("upload dir");
    let epub = upload.join("book.epub");
    three_chapter_book(&epub);

    let store = Arc::new(JobStore::new());
    let job = store.register_upload(&epub, &NoLookup).expect("upload");
    assert_eq!(job.status, JobStatus::Uploaded);
    assert_eq!(job.total_chapters, 3);
    assert!(!job.has_cover());

    let toolkit = RecordingToolkit::default();
    let converter = Converter::new(
        SilentEngine::new(&[1000]),
        toolkit.clone(),
        TtsConfig::default(),
        "64k",
    );
    let handle = store
        .spawn_conversion(&job.id, converter)
        .expect("worker started");
    assert!(
        store
            .spawn_conversion(
                &job.id,
                Converter::new(
                    SilentEngine::new(&[1000]),
                    RecordingToolkit::default(),
                    TtsConfig::default(),
                    "64k",
                ),
            )
            .is_err(),
        "a converting job cannot be started twice"
    );
    handle.join().expect("worker thread");

    let done = store.get(&job.id).expect("job");
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.output_path, Some(upload.join("book.m4b")));
    assert_eq!((done.current_chapter, done.total_chapters), (3, 3));
    assert_eq!(done.chapter_title, "Three");
    assert!(done.work_dir.starts_with(&upload));
    assert!(done.work_dir.join("chapter_0000.wav").is_file());
}

#[test]
fn jobs_for_books_in_one_directory_keep_separate_chapter_audio() {
    let (_guard, dir) = common::scratch();
    let alpha = dir.join("alpha.epub");
    let beta = dir.join("beta.epub");
    let alpha_one = chapter_body("Alpha One");
    let beta_one = chapter_body("Beta One");
    write_epub(&alpha, "Alpha", "A", &[Doc { name: "one.xhtml", body: &alpha_one }]);
    write_epub(&beta, "Beta", "B", &[Doc { name: "one.xhtml", body: &beta_one }]);

    let store = Arc::new(JobStore::new());
    let run = |epub: &Path, duration_ms: u64| {
        let job = store.register_upload(epub, &NoLookup).expect("upload");
        let engine = SilentEngine::new(&[duration_ms]);
        let toolkit = RecordingToolkit::default();
        let converter =
            Converter::new(engine.clone(), toolkit.clone(), TtsConfig::default(), "64k");
        store
            .spawn_conversion(&job.id, converter)
            .expect("worker started")
            .join()
            .expect("worker thread");
        (store.get(&job.id).expect("job"), engine, toolkit)
    };

    let (alpha_job, _, _) = run(&alpha, 1000);
    let (beta_job, beta_engine, beta_toolkit) = run(&beta, 2500);

    assert_eq!(alpha_job.status, JobStatus::Done);
    assert_eq!(beta_job.status, JobStatus::Done);
    assert_ne!(alpha_job.work_dir, beta_job.work_dir);
    assert_eq!(beta_engine.texts().len(), 1);
    assert!(beta_engine.texts()[0].starts_with("Beta One"));
    let (audio, _) = beta_toolkit.assembled().expect("assembled");
    assert_eq!(audio[0].chapter.title, "Beta One");
    assert_eq!(audio[0].duration_ms, 2500);
}

#[test]
fn failed_background_job_records_the_error() {
    let (_guard, dir) = common::scratch();
    let epub = dir.join("broken.epub");
    fs::write(&epub, b"not a zip archive").expect("write");

    let store = Arc::new(JobStore::new());
    let job = store.create(&epub, Default::default());
    let converter = Converter::new(
        SilentEngine::new(&[1000]),
        RecordingToolkit::default(),
        TtsConfig::default(),
        "64k",
    );
    store
        .spawn_conversion(&job.id, converter)
        .expect("worker started")
        .join()
        .expect("worker thread");

    let failed = store.get(&job.id).expect("job");
    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed.error.as_deref().unwrap_or("").contains("cannot parse EPUB"));
    assert_eq!(failed.output_path, None);
}

#[test]
fn end_to_end_with_ffmpeg_writes_chapter_markers() {
    if !common::ffmpeg_available() {
        eprintln!("skipping: ffmpeg/ffprobe not installed");
        return;
    }
    let (_guard, dir) = common::scratch();
    let epub = dir.join("book.epub");
    let one = chapter_body("Chapter One");
    let two = chapter_body("Chapter Two");
    write_epub(
        &epub,
        "Test Book",
        "Author X",
        &[
            Doc { name: "one.xhtml", body: &one },
            Doc { name: "two.xhtml", body: &two },
        ],
    );
    let output = dir.join("out").join("book.m4b");

    Converter::new(
        SilentEngine::new(&[1000, 2000]),
        Ffmpeg::default(),
        TtsConfig::default(),
        "64k",
    )
    .convert(&epub, &output, None, &mut |_, _, _| {})
    .expect("conversion with ffmpeg");

    assert!(output.is_file());
    assert!(!dir.join("out").join("book.tmp.m4b").exists());

    let probe = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_chapters", "-show_format"])
        .arg(&output)
        .output()
        .expect("run ffprobe");
    assert!(probe.status.success());
    let report: serde_json::Value = serde_json::from_slice(&probe.stdout).expect("json");

    let chapters = report["chapters"].as_array().expect("chapters");
    assert_eq!(chapters.len(), 2);
    let seconds = |value: &serde_json::Value| {
        value.as_str().and_then(|s| s.parse::<f64>().ok()).expect("time")
    };
    assert_eq!(seconds(&chapters[0]["start_time"]), 0.0);
    assert_eq!(seconds(&chapters[0]["end_time"]), 1.0);
    assert_eq!(seconds(&chapters[1]["start_time"]), 1.0);
    assert_eq!(seconds(&chapters[1]["end_time"]), 3.0);
    assert_eq!(chapters[0]["tags"]["title"], "Chapter One");
    assert_eq!(chapters[1]["tags"]["title"], "Chapter Two");

    let tags = &report["format"]["tags"];
    assert_eq!(tags["title"], "Test Book");
    assert_eq!(tags["artist"], "Author X");
    let total = seconds(&report["format"]["duration"]);
    assert!((total - 3.0).abs() < 0.1, "total duration {total}");
}
