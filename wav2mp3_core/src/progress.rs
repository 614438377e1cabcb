use std::path::Path;

use crate::pool::FileError;

/// Events emitted while a directory is converted.
///
/// `Converted` and `Skipped` are reported from worker threads, in completion
/// order.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    Start {
        total_files: usize,
        workers: usize,
    },
    Converted {
        worker: usize,
        input: &'a Path,
        output: &'a Path,
    },
    Skipped {
        worker: usize,
        input: &'a Path,
        error: &'a FileError,
    },
    Finish,
}

/// Receives [`ProgressEvent`]s. Shared by all workers of a run.
pub trait ProgressReporter: Sync {
    fn report(&self, _event: ProgressEvent<'_>) {}
}

impl<F> ProgressReporter for F
where
    F: Fn(ProgressEvent<'_>) + Sync,
{
    fn report(&self, event: ProgressEvent<'_>) {
        self(event)
    }
}

/// Reporter that drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}
