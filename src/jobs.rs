//! In-memory tracking of background conversions.
//!
//! Each job moves forward only: `uploaded → converting → done | error |
//! interrupted`. The store is one mutex-guarded map; readers get cloned
//! snapshots and never block a running conversion for longer than a copy.

use crate::audio::AudioToolkit;
use crate::cancellation::CancellationToken;
use crate::converter::Converter;
use crate::epub_loader::{default_output_path, parse_epub};
use crate::error::{ConvertError, ConvertResult};
use crate::metadata::{MetadataLookup, enrich_book};
use crate::models::BookMetadata;
use crate::tts::TtsEngine;
use crate::util::sha256_hex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{error, info, warn};

const JOB_ID_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Converting,
    Done,
    Error,
    Interrupted,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Interrupted)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Uploaded, Converting | Error | Interrupted) | (Converting, Done | Error | Interrupted)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Converting => "converting",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job cannot move from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("cannot start conversion worker: {0}")]
    WorkerUnavailable(String),
}

/// What an upload learned about the book, shown before conversion starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub title: String,
    pub author: String,
    pub language: String,
    pub total_chapters: usize,
    pub cover_image: Option<Vec<u8>>,
}

impl JobSummary {
    pub fn from_book(metadata: &BookMetadata, total_chapters: usize) -> Self {
        Self {
            title: metadata.title.clone(),
            author: metadata.author.clone(),
            language: metadata.language.clone(),
            total_chapters,
            cover_image: metadata.cover_image.clone(),
        }
    }
}

/// Snapshot of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionJob {
    pub id: String,
    pub status: JobStatus,
    pub epub_path: PathBuf,
    /// Chapter audio for this job only; kept for resume.
    pub work_dir: PathBuf,
    /// Set only once the job is done.
    pub output_path: Option<PathBuf>,
    pub title: String,
    pub author: String,
    pub language: String,
    pub current_chapter: usize,
    pub total_chapters: usize,
    pub chapter_title: String,
    /// Set only when the job failed.
    pub error: Option<String>,
    #[serde(skip)]
    pub cover_image: Option<Vec<u8>>,
}

impl ConversionJob {
    pub fn has_cover(&self) -> bool {
        self.cover_image.is_some()
    }
}

struct JobEntry {
    seq: u64,
    job: ConversionJob,
    cancel: CancellationToken,
}

#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<String, JobEntry>>,
    next_seq: AtomicU64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an uploaded EPUB and return the new job in `uploaded` state.
    pub fn create(&self, epub_path: &Path, summary: JobSummary) -> ConversionJob {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = new_job_id(epub_path, seq);
        let job = ConversionJob {
            id: id.clone(),
            status: JobStatus::Uploaded,
            epub_path: epub_path.to_path_buf(),
            work_dir: job_work_dir(epub_path, &id),
            output_path: None,
            title: summary.title,
            author: summary.author,
            language: summary.language,
            current_chapter: 0,
            total_chapters: summary.total_chapters,
            chapter_title: String::new(),
            error: None,
            cover_image: summary.cover_image,
        };
        info!(job = %id, title = %job.title, chapters = job.total_chapters, "Job created");
        self.lock().insert(
            id,
            JobEntry {
                seq,
                job: job.clone(),
                cancel: CancellationToken::new(),
            },
        );
        job
    }

    /// Parse `epub_path`, look for a cover online when it has none, and
    /// create a job from the result.
    pub fn register_upload(
        &self,
        epub_path: &Path,
        lookup: &dyn MetadataLookup,
    ) -> ConvertResult<ConversionJob> {
        let (metadata, chapters) = parse_epub(epub_path)?;
        let metadata = enrich_book(&metadata, lookup);
        Ok(self.create(epub_path, JobSummary::from_book(&metadata, chapters.len())))
    }

    pub fn get(&self, id: &str) -> Option<ConversionJob> {
        self.lock().get(id).map(|entry| entry.job.clone())
    }

    /// All jobs in creation order.
    pub fn list(&self) -> Vec<ConversionJob> {
        let guard = self.lock();
        let mut entries: Vec<&JobEntry> = guard.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.job.clone()).collect()
    }

    pub fn transition(&self, id: &str, next: JobStatus) -> Result<ConversionJob, JobError> {
        self.update(id, |job| {
            if !job.status.can_transition_to(next) {
                return Err(JobError::InvalidTransition {
                    from: job.status,
                    to: next,
                });
            }
            job.status = next;
            Ok(())
        })
    }

    pub fn update_progress(
        &self,
        id: &str,
        current: usize,
        total: usize,
        title: &str,
    ) -> Result<(), JobError> {
        self.update(id, |job| {
            job.current_chapter = current;
            job.total_chapters = total;
            job.chapter_title = title.to_string();
            Ok(())
        })
        .map(|_| ())
    }

    pub fn complete(&self, id: &str, output: &Path) -> Result<ConversionJob, JobError> {
        self.update(id, |job| {
            check_transition(job.status, JobStatus::Done)?;
            job.status = JobStatus::Done;
            job.output_path = Some(output.to_path_buf());
            Ok(())
        })
    }

    pub fn fail(&self, id: &str, message: &str) -> Result<ConversionJob, JobError> {
        self.update(id, |job| {
            check_transition(job.status, JobStatus::Error)?;
            job.status = JobStatus::Error;
            job.error = Some(message.to_string());
            Ok(())
        })
    }

    /// Ask a job to stop. A job that never started is interrupted right away;
    /// a running one stops before its next chapter.
    pub fn cancel(&self, id: &str) -> Result<ConversionJob, JobError> {
        self.update_entry(id, |entry| {
            if entry.job.status.is_terminal() {
                return Err(JobError::InvalidTransition {
                    from: entry.job.status,
                    to: JobStatus::Interrupted,
                });
            }
            entry.cancel.cancel();
            if entry.job.status == JobStatus::Uploaded {
                entry.job.status = JobStatus::Interrupted;
            }
            Ok(())
        })
    }

    /// Move the job to `converting` and run `converter` on a dedicated thread.
    ///
    /// The audiobook is written next to the EPUB; chapter files go to the
    /// job's own work directory.
    pub fn spawn_conversion<E, A>(
        self: &Arc<Self>,
        id: &str,
        converter: Converter<E, A>,
    ) -> Result<JoinHandle<()>, JobError>
    where
        E: TtsEngine + 'static,
        A: AudioToolkit + 'static,
    {
        let (epub_path, work_dir, cancel) = {
            let mut guard = self.lock();
            let entry = guard
                .get_mut(id)
                .ok_or_else(|| JobError::NotFound(id.to_string()))?;
            check_transition(entry.job.status, JobStatus::Converting)?;
            entry.job.status = JobStatus::Converting;
            (
                entry.job.epub_path.clone(),
                entry.job.work_dir.clone(),
                entry.cancel.clone(),
            )
        };

        let output = default_output_path(&epub_path);
        let converter = converter.with_cancel(cancel);
        let store = Arc::clone(self);
        let job_id = id.to_string();

        let spawned = thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || {
                info!(job = %job_id, "Conversion started");
                let result = converter.convert(
                    &epub_path,
                    &output,
                    Some(&work_dir),
                    &mut |current, total, title| {
                        let _ = store.update_progress(&job_id, current, total, title);
                    },
                );
                store.record_outcome(&job_id, result.as_ref().map(PathBuf::as_path));
            });

        spawned.map_err(|err| {
            let message = err.to_string();
            let _ = self.fail(id, &message);
            JobError::WorkerUnavailable(message)
        })
    }

    fn record_outcome(&self, id: &str, result: Result<&Path, &ConvertError>) {
        let recorded = match result {
            Ok(output) => {
                info!(job = %id, output = %output.display(), "Conversion finished");
                self.complete(id, output)
            }
            Err(err) if err.is_interrupted() => {
                warn!(job = %id, "Conversion interrupted; work directory kept for resume");
                self.transition(id, JobStatus::Interrupted)
            }
            Err(err) => {
                error!(job = %id, "Conversion failed: {err}");
                self.fail(id, &err.to_string())
            }
        };
        if let Err(err) = recorded {
            warn!(job = %id, "Could not record job outcome: {err}");
        }
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<ConversionJob, JobError>
    where
        F: FnOnce(&mut ConversionJob) -> Result<(), JobError>,
    {
        self.update_entry(id, |entry| apply(&mut entry.job))
    }

    fn update_entry<F>(&self, id: &str, apply: F) -> Result<ConversionJob, JobError>
    where
        F: FnOnce(&mut JobEntry) -> Result<(), JobError>,
    {
        let mut guard = self.lock();
        let entry = guard
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        apply(entry)?;
        Ok(entry.job.clone())
    }
}

fn check_transition(from: JobStatus, to: JobStatus) -> Result<(), JobError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(JobError::InvalidTransition { from, to })
    }
}

/// `<upload dir>/<job id>/work`
fn job_work_dir(epub_path: &Path, id: &str) -> PathBuf {
    epub_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(id)
        .join("work")
}

fn new_job_id(epub_path: &Path, seq: u64) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seed = format!("{}:{seq}:{nanos}", epub_path.display());
    sha256_hex(seed.as_bytes())[..JOB_ID_LEN].to_string()
}
