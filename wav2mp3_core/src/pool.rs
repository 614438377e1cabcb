//! The fixed-size worker pool.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::claim::ClaimTable;
use crate::container::{self, ContainerError};
use crate::discover;
use crate::encoder::{EncodeError, Encoder};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::{Error, FailureClass};

/// Why a single file was skipped. Never escapes the worker that hit it.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("failed to write '{}'", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Container(err) => err.class(),
            Self::Encode(_) => FailureClass::Encoding,
            Self::Write { .. } => FailureClass::Io,
        }
    }
}

/// What happened to one claimed file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Converted { output: PathBuf },
    Skipped(FailureClass),
}

impl FileOutcome {
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }
}

/// Private counters of one worker, handed back through the join.
#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub worker: usize,
    pub converted: usize,
    pub skipped: usize,
    pub elapsed: Duration,
    pub(crate) outcomes: Vec<(usize, FileOutcome)>,
}

impl WorkerReport {
    fn new(worker: usize) -> Self {
        Self {
            worker,
            converted: 0,
            skipped: 0,
            elapsed: Duration::ZERO,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, index: usize, outcome: FileOutcome) {
        if outcome.is_converted() {
            self.converted += 1;
        } else {
            self.skipped += 1;
        }
        self.outcomes.push((index, outcome));
    }

    /// Files this worker claimed, converted or not.
    pub fn processed(&self) -> usize {
        self.converted + self.skipped
    }
}

/// Logical CPUs reported by the operating system, at least one.
pub fn hardware_concurrency() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Number of workers for `files` inputs when at most `limit` may run.
pub fn pool_size(limit: usize, files: usize) -> usize {
    limit.max(1).min(files)
}

/// Spawn `workers` threads draining `table`, then join them in index order.
pub(crate) fn run_pool<E, P>(
    table: &ClaimTable<PathBuf>,
    workers: usize,
    encoder: &E,
    progress: &P,
) -> Result<Vec<WorkerReport>, Error>
where
    E: Encoder + ?Sized,
    P: ProgressReporter + ?Sized,
{
    thread::scope(|scope| -> Result<Vec<WorkerReport>, Error> {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let handle = thread::Builder::new()
                .name(format!("encoder-{worker}"))
                .spawn_scoped(scope, move || work(worker, table, encoder, progress))
                .map_err(|source| Error::SpawnWorker { worker, source })?;
            handles.push(handle);
        }

        handles
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| handle.join().map_err(|_| Error::WorkerPanicked(worker)))
            .collect()
    })
}

fn work<E, P>(worker: usize, table: &ClaimTable<PathBuf>, encoder: &E, progress: &P) -> WorkerReport
where
    E: Encoder + ?Sized,
    P: ProgressReporter + ?Sized,
{
    let started = Instant::now();
    let mut report = WorkerReport::new(worker);

    while let Some(claim) = table.claim_next() {
        let input = claim.item.as_path();
        debug!("worker {worker} claimed '{}'", input.display());

        let outcome = match convert_file(input, encoder) {
            Ok(output) => {
                progress.report(ProgressEvent::Converted {
                    worker,
                    input,
                    output: &output,
                });
                FileOutcome::Converted { output }
            }
            Err(err) => {
                warn!("skipping '{}': {err}", input.display());
                progress.report(ProgressEvent::Skipped {
                    worker,
                    input,
                    error: &err,
                });
                FileOutcome::Skipped(err.class())
            }
        };
        report.record(claim.index, outcome);
    }

    report.elapsed = started.elapsed();
    debug!(
        "worker {worker} done: {} converted, {} skipped",
        report.converted, report.skipped
    );
    report
}

/// Decode, encode and write one file. The samples are dropped on return.
fn convert_file<E: Encoder + ?Sized>(input: &Path, encoder: &E) -> Result<PathBuf, FileError> {
    let (header, samples) = container::read_container(input)?;
    let encoded = encoder.encode(&header, &samples)?;

    let output = discover::output_path(input, encoder.extension());
    write_output(&output, &encoded).map_err(|source| FileError::Write {
        path: output.clone(),
        source,
    })?;
    Ok(output)
}

fn write_output(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()
}
