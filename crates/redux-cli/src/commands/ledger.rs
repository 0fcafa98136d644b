use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use redux_core::frame::FrameType;
use redux_core::ledger::{FileLedger, Ledger, NearestQuery};

use crate::summary;

#[derive(Args)]
pub struct LedgerArgs {
    /// Ledger file (JSON lines)
    pub path: PathBuf,

    /// Count distinct frames of this type (requires --group)
    #[arg(long, requires = "group")]
    pub count: Option<FrameType>,

    /// Group for --count and --nearest
    #[arg(long)]
    pub group: Option<String>,

    /// Show the recorded frame of this type closest to --mjd
    #[arg(long, conflicts_with = "count")]
    pub nearest: Option<FrameType>,

    /// Observation time for --nearest
    #[arg(long)]
    pub mjd: Option<f64>,

    /// Camera for --nearest
    #[arg(long)]
    pub camera: Option<String>,

    /// Only list rows for this frame
    #[arg(long)]
    pub frame: Option<String>,
}

pub fn run(args: &LedgerArgs) -> Result<()> {
    if !args.path.exists() {
        anyhow::bail!("No ledger at {}", args.path.display());
    }
    let ledger = FileLedger::open(&args.path)
        .with_context(|| format!("Failed to open ledger {}", args.path.display()))?;

    if let (Some(frame_type), Some(group)) = (args.count, args.group.as_deref()) {
        let n = ledger.count_of_type(frame_type, group);
        println!("{n} {frame_type} frame(s) in group {group}");
        return Ok(());
    }

    if let Some(frame_type) = args.nearest {
        let query = NearestQuery {
            group: args.group.as_deref(),
            camera: args.camera.as_deref(),
            near_mjd: args.mjd,
            before_seq: None,
        };
        match ledger.nearest_of_type(frame_type, &query) {
            Some(record) => summary::print_records(&[record]),
            None => println!("No {frame_type} frame recorded"),
        }
        return Ok(());
    }

    let records = match &args.frame {
        Some(frame) => ledger.records_for(frame),
        None => ledger.records(),
    };
    summary::print_records(&records);
    Ok(())
}
