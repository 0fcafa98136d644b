use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use redux_core::frame::Frame;
use redux_core::header::Header;
use redux_core::ledger::{FileLedger, Ledger};
use redux_core::pipeline::{FrameReport, Pipeline, ProgressReporter, RunSummary};
use serde::Deserialize;
use tracing::info;

use crate::summary;

#[derive(Args)]
pub struct RunArgs {
    /// Frame manifest (TOML)
    pub manifest: PathBuf,

    /// Redux config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Reprocess frames already in the ledger
    #[arg(long)]
    pub clobber: bool,

    /// Ledger file, overriding the config
    #[arg(long)]
    pub ledger: Option<PathBuf>,

    /// Frames processed concurrently (0 = all cores)
    #[arg(long)]
    pub frame_workers: Option<usize>,
}

/// Frames to reduce, as listed in a manifest file.
#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    frames: Vec<ManifestFrame>,
}

#[derive(Deserialize)]
struct ManifestFrame {
    name: String,
    /// [height, width]; omitted for header-only frames.
    #[serde(default)]
    shape: Option<[usize; 2]>,
    /// Constant pixel value for synthetic frames.
    #[serde(default)]
    fill: f32,
    #[serde(default)]
    header: Header,
}

impl ManifestFrame {
    fn into_frame(self) -> Frame {
        match self.shape {
            Some([h, w]) => Frame::new(
                self.name,
                ndarray::Array2::from_elem((h, w), self.fill),
                self.header,
            ),
            None => Frame::header_only(self.name, self.header),
        }
    }
}

/// Drives an indicatif bar from pipeline callbacks.
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_run(&self, total_frames: usize) {
        self.bar.set_length(total_frames as u64);
    }

    fn stage_started(&self, frame: &str, event: &str) {
        self.bar.set_message(format!("{frame}: {event}"));
    }

    fn frame_done(&self, _report: &FrameReport) {
        self.bar.inc(1);
    }

    fn finish_run(&self) {
        self.bar.finish_with_message("Done");
    }
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config = super::load_config(args.config.as_deref())?;
    if args.clobber {
        config.instrument.clobber = true;
    }
    if let Some(ref path) = args.ledger {
        config.ledger.path = path.clone();
    }
    if let Some(n) = args.frame_workers {
        config.parallel.frame_workers = n;
    }

    let contents = std::fs::read_to_string(&args.manifest)
        .with_context(|| format!("Failed to read manifest {}", args.manifest.display()))?;
    let manifest: Manifest = toml::from_str(&contents).context("Invalid frame manifest")?;
    let frames: Vec<Frame> = manifest
        .frames
        .into_iter()
        .map(ManifestFrame::into_frame)
        .collect();

    summary::print_run_header(&config, &args.manifest, frames.len());

    let ledger = Arc::new(
        FileLedger::open(&config.ledger.path)
            .with_context(|| format!("Failed to open ledger {}", config.ledger.path.display()))?,
    );
    info!(path = %ledger.path().display(), rows = ledger.len(), "Ledger loaded");
    let pipeline = Pipeline::new(config, ledger.clone())?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:40} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let reporter = Arc::new(BarReporter { bar });

    let reports = pipeline.process_all(frames, reporter);
    let totals = RunSummary::from_reports(&reports);
    summary::print_run_summary(&reports, &totals, ledger.pending_count());

    if totals.failed > 0 {
        anyhow::bail!("{} frame(s) failed", totals.failed);
    }
    Ok(())
}
