//! Convert every WAV file of a directory to MP3 on all available cores.
//!
//! Files are handed to a fixed pool of worker threads through a
//! [`ClaimTable`], which assigns each file to exactly one worker. Workers
//! decode the container themselves, pass the samples to an [`Encoder`] and
//! write the result next to the input. A file that fails is logged and
//! skipped; it never stops the other workers.

pub mod claim;
pub mod container;
pub mod discover;
pub mod encoder;
pub mod pool;
pub mod progress;

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::info;

pub use claim::{Claim, ClaimTable};
pub use container::{ContainerError, ContainerHeader, DataChunk, SampleBuffer};
pub use encoder::{lame_version, EncodeError, Encoder, EncoderSettings, LameEncoder};
pub use pool::{FileError, FileOutcome, WorkerReport};
pub use progress::{NoProgress, ProgressEvent, ProgressReporter};

/// Errors that end a conversion run.
///
/// Problems with individual files are reported as [`FileError`]s instead and
/// only cause that file to be skipped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input path is missing or not a directory.
    #[error("input directory does not exist: {}", .0.display())]
    MissingInputDirectory(PathBuf),

    /// LAME quality outside `0..=9`.
    #[error("quality must be between 0 and 9, got {0}")]
    InvalidQuality(u8),

    /// A bitrate LAME does not offer.
    #[error("unsupported bitrate of {0} kbps")]
    UnsupportedBitrate(u32),

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker {worker}")]
    SpawnWorker {
        worker: usize,
        #[source]
        source: io::Error,
    },

    /// A worker thread panicked.
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    /// Workers reported more conversions than there were files.
    #[error("{converted} file(s) reported as converted but only {total} exist")]
    CountMismatch { converted: usize, total: usize },

    /// Wrapper around IO errors encountered while preparing the run.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Coarse classification of a skipped file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Malformed container or missing required chunk.
    Format,
    /// Well-formed container with a layout we do not handle.
    UnsupportedFormat,
    /// Opening, reading or writing failed.
    Io,
    /// The encoder rejected the input.
    Encoding,
}

/// Configuration for a conversion run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Canonicalized directory holding the WAV files.
    pub input_dir: PathBuf,
    pub encoder: EncoderSettings,
    /// Upper bound on the pool size. Defaults to the hardware concurrency.
    pub threads: Option<NonZeroUsize>,
}

impl Config {
    /// Construct a [`Config`] with default encoder settings.
    pub fn new<P: AsRef<Path>>(input_dir: P) -> Result<Self, Error> {
        Self::builder(input_dir).build()
    }

    pub fn builder<P: AsRef<Path>>(input_dir: P) -> ConfigBuilder {
        ConfigBuilder {
            input_dir: input_dir.as_ref().to_path_buf(),
            quality: encoder::DEFAULT_QUALITY,
            bitrate_kbps: encoder::DEFAULT_BITRATE_KBPS,
            threads: None,
        }
    }

    /// Most workers this run may start.
    pub fn worker_limit(&self) -> usize {
        self.threads
            .map(NonZeroUsize::get)
            .unwrap_or_else(pool::hardware_concurrency)
    }
}

/// Builder for [`Config`]; validation happens in [`build`](Self::build).
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    input_dir: PathBuf,
    quality: u8,
    bitrate_kbps: u32,
    threads: Option<NonZeroUsize>,
}

impl ConfigBuilder {
    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn bitrate_kbps(mut self, bitrate_kbps: u32) -> Self {
        self.bitrate_kbps = bitrate_kbps;
        self
    }

    pub fn threads(mut self, threads: NonZeroUsize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn build(self) -> Result<Config, Error> {
        let encoder = EncoderSettings::new(self.quality, self.bitrate_kbps)?;
        if !self.input_dir.is_dir() {
            return Err(Error::MissingInputDirectory(self.input_dir));
        }
        let input_dir = fs::canonicalize(&self.input_dir)?;

        Ok(Config {
            input_dir,
            encoder,
            threads: self.threads,
        })
    }
}

/// Outcome of one input file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileReport {
    pub input: PathBuf,
    /// Worker that claimed the file.
    pub worker: usize,
    pub outcome: FileOutcome,
}

/// Totals of a finished run.
#[derive(Clone, Debug)]
pub struct RunReport {
    total_files: usize,
    workers: Vec<WorkerReport>,
    files: Vec<FileReport>,
    elapsed: Duration,
}

impl RunReport {
    /// Combine the worker reports, which must be in worker-index order.
    fn aggregate(
        inputs: Vec<PathBuf>,
        mut workers: Vec<WorkerReport>,
        elapsed: Duration,
    ) -> Result<Self, Error> {
        let total_files = inputs.len();
        let converted: usize = workers.iter().map(|worker| worker.converted).sum();
        if converted > total_files {
            return Err(Error::CountMismatch {
                converted,
                total: total_files,
            });
        }

        let mut files: Vec<(usize, FileReport)> = Vec::with_capacity(total_files);
        for report in &mut workers {
            for (index, outcome) in report.outcomes.drain(..) {
                files.push((
                    index,
                    FileReport {
                        input: inputs[index].clone(),
                        worker: report.worker,
                        outcome,
                    },
                ));
            }
        }
        files.sort_by_key(|(index, _)| *index);

        Ok(Self {
            total_files,
            workers,
            files: files.into_iter().map(|(_, file)| file).collect(),
            elapsed,
        })
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn converted(&self) -> usize {
        self.workers.iter().map(|worker| worker.converted).sum()
    }

    pub fn skipped(&self) -> usize {
        self.workers.iter().map(|worker| worker.skipped).sum()
    }

    /// Per-worker counters, in worker-index order.
    pub fn workers(&self) -> &[WorkerReport] {
        &self.workers
    }

    /// Per-file outcomes, in input order.
    pub fn files(&self) -> &[FileReport] {
        &self.files
    }

    /// Wall time from the first spawn to the last join. Discovery is excluded.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Convert `config.input_dir` with LAME, reporting nothing.
pub fn run(config: &Config) -> Result<RunReport, Error> {
    run_with_progress(config, &NoProgress)
}

/// Convert `config.input_dir` with LAME, reporting to `progress`.
pub fn run_with_progress<P>(config: &Config, progress: &P) -> Result<RunReport, Error>
where
    P: ProgressReporter + ?Sized,
{
    let encoder = LameEncoder::new(config.encoder);
    convert_directory(config, &encoder, progress)
}

/// Convert every WAV file in `config.input_dir` with `encoder`.
pub fn convert_directory<E, P>(
    config: &Config,
    encoder: &E,
    progress: &P,
) -> Result<RunReport, Error>
where
    E: Encoder + ?Sized,
    P: ProgressReporter + ?Sized,
{
    let inputs = discover::find_wav_files(&config.input_dir)?;
    convert_files(inputs, config.worker_limit(), encoder, progress)
}

/// Convert `inputs` on at most `max_workers` threads.
pub fn convert_files<E, P>(
    inputs: Vec<PathBuf>,
    max_workers: usize,
    encoder: &E,
    progress: &P,
) -> Result<RunReport, Error>
where
    E: Encoder + ?Sized,
    P: ProgressReporter + ?Sized,
{
    let total_files = inputs.len();
    let workers = pool::pool_size(max_workers, total_files);
    info!("converting {total_files} file(s) on {workers} worker(s)");
    progress.report(ProgressEvent::Start {
        total_files,
        workers,
    });

    let started = Instant::now();
    let table = ClaimTable::new(inputs);
    let reports = pool::run_pool(&table, workers, encoder, progress)?;
    let report = RunReport::aggregate(table.into_items(), reports, started.elapsed())?;

    info!(
        "converted {} of {} file(s) in {:.3?}",
        report.converted(),
        report.total_files(),
        report.elapsed()
    );
    progress.report(ProgressEvent::Finish);
    Ok(report)
}

/// Input and output paths a run over `config` would produce.
pub fn plan_conversions(config: &Config) -> Result<Vec<(PathBuf, PathBuf)>, Error> {
    let inputs = discover::find_wav_files(&config.input_dir)?;
    Ok(inputs
        .into_iter()
        .map(|input| {
            let output = discover::output_path(&input, encoder::MP3_EXTENSION);
            (input, output)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(worker: usize, outcomes: Vec<(usize, FileOutcome)>) -> WorkerReport {
        let converted = outcomes.iter().filter(|(_, o)| o.is_converted()).count();
        WorkerReport {
            worker,
            converted,
            skipped: outcomes.len() - converted,
            elapsed: Duration::from_millis(5),
            outcomes,
        }
    }

    fn converted(name: &str) -> FileOutcome {
        FileOutcome::Converted {
            output: PathBuf::from(name),
        }
    }

    #[test]
    fn aggregate_orders_files_by_input_index() {
        let inputs = vec![
            PathBuf::from("a.wav"),
            PathBuf::from("b.wav"),
            PathBuf::from("c.wav"),
        ];
        let workers = vec![
            worker(0, vec![(2, converted("c.mp3")), (0, converted("a.mp3"))]),
            worker(1, vec![(1, FileOutcome::Skipped(FailureClass::Format))]),
        ];

        let report = RunReport::aggregate(inputs, workers, Duration::from_millis(9)).unwrap();

        assert_eq!(report.total_files(), 3);
        assert_eq!(report.converted(), 2);
        assert_eq!(report.skipped(), 1);
        let order: Vec<_> = report
            .files()
            .iter()
            .map(|file| (file.input.clone(), file.worker))
            .collect();
        assert_eq!(
            order,
            vec![
                (PathBuf::from("a.wav"), 0),
                (PathBuf::from("b.wav"), 1),
                (PathBuf::from("c.wav"), 0),
            ]
        );
        assert_eq!(report.workers()[1].worker, 1);
    }

    #[test]
    fn aggregate_rejects_more_successes_than_files() {
        let inputs = vec![PathBuf::from("a.wav")];
        let mut bogus = worker(0, vec![(0, converted("a.mp3"))]);
        bogus.converted = 2;

        let err = RunReport::aggregate(inputs, vec![bogus], Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            Error::CountMismatch {
                converted: 2,
                total: 1
            }
        ));
    }

    #[test]
    fn builder_validates_encoder_settings_before_the_directory() {
        let err = Config::builder("/definitely/not/here")
            .quality(12)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuality(12)));

        let err = Config::builder("/definitely/not/here").build().unwrap_err();
        assert!(matches!(err, Error::MissingInputDirectory(_)));
    }

    #[test]
    fn thread_override_bounds_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::builder(dir.path())
            .threads(NonZeroUsize::new(3).unwrap())
            .build()
            .unwrap();
        assert_eq!(config.worker_limit(), 3);

        let config = Config::new(dir.path()).unwrap();
        assert_eq!(config.worker_limit(), pool::hardware_concurrency());
        assert_eq!(config.encoder, EncoderSettings::default());
    }
}
