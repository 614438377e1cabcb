mod cli;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use wav2mp3_core::{
    lame_version, plan_conversions, run_with_progress, Config, ProgressEvent, ProgressReporter,
};

use crate::cli::build_cli;

/// Drives the progress bar and prints one line per finished file.
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn report(&self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::Start {
                total_files,
                workers,
            } => {
                self.bar
                    .suspend(|| println!("Found {total_files} WAV file(s)"));
                self.bar.set_length(total_files as u64);
                self.bar.set_message(format!("{workers} worker(s)"));
                self.bar.enable_steady_tick(Duration::from_millis(100));
            }
            ProgressEvent::Converted { worker, input, .. } => {
                self.bar
                    .suspend(|| println!("[:{worker}][ok] .... {}", input.display()));
                self.bar.inc(1);
            }
            ProgressEvent::Skipped {
                worker,
                input,
                error,
            } => {
                self.bar.suspend(|| {
                    println!("[:{worker}][skipped] {}: {error}", input.display())
                });
                self.bar.inc(1);
            }
            ProgressEvent::Finish => {
                self.bar.set_message(String::from("Completed"));
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let matches = build_cli().get_matches();

    let input_dir = matches
        .get_one::<PathBuf>("input_dir")
        .expect("required argument");
    let quality = *matches
        .get_one::<u8>("quality")
        .expect("defaulted argument");
    let bitrate = *matches
        .get_one::<u32>("bitrate")
        .expect("defaulted argument");
    let dry_run = matches.get_flag("dry-run");

    let config = Config::builder(input_dir)
        .quality(quality)
        .bitrate_kbps(bitrate)
        .build()
        .with_context(|| {
            format!(
                "failed to create configuration for '{}'",
                input_dir.display()
            )
        })?;

    println!("LAME version: {}", lame_version());
    info!(
        "encoding '{}' at quality {quality}, {bitrate} kbps",
        config.input_dir.display()
    );

    if dry_run {
        let plan = plan_conversions(&config)
            .with_context(|| format!("failed to list '{}'", input_dir.display()))?;

        if plan.is_empty() {
            println!("Dry run: no WAV files found.");
        } else {
            println!("Dry run: would encode {} file(s):", plan.len());
            for (input, output) in plan {
                println!("  {} -> {}", input.display(), output.display());
            }
        }

        return Ok(());
    }

    let progress = ProgressBar::new(0);
    progress.set_draw_target(ProgressDrawTarget::stderr());
    let bar_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(bar_style);

    let reporter = BarReporter {
        bar: progress.clone(),
    };
    let result = run_with_progress(&config, &reporter)
        .with_context(|| format!("failed to encode '{}'", input_dir.display()));

    progress.finish_and_clear();

    let report = result?;

    for worker in report.workers() {
        println!(
            "Worker {} encoded {} file(s), skipped {}, in {:.3} sec.",
            worker.worker,
            worker.converted,
            worker.skipped,
            worker.elapsed.as_secs_f64()
        );
    }
    println!(
        "Encoded {} of {} file(s) in total in {:.3} sec.",
        report.converted(),
        report.total_files(),
        report.elapsed().as_secs_f64()
    );

    Ok(())
}
