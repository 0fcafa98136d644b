//! Provenance ledger: which frame has been through which stage.
//!
//! The ledger is append-only. Stages may read it to find reference products
//! (e.g. the arc frame whose geometry a cube needs); only the dispatcher
//! appends, once a stage has completed.

mod file;
mod memory;
mod table;

pub use file::FileLedger;
pub use memory::MemoryLedger;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::FrameType;

/// One row: `frame` completed `stage`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Ordering key, assigned by the ledger on append.
    #[serde(default)]
    pub seq: u64,
    pub frame: String,
    pub frame_type: FrameType,
    pub group: String,
    /// Recipe event that completed.
    pub stage: String,
    /// Output suffix written by that stage.
    pub suffix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mjd: Option<f64>,
    /// Detector the frame was taken with (CAMERA keyword).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
}

impl Record {
    pub fn new(
        frame: impl Into<String>,
        frame_type: FrameType,
        group: impl Into<String>,
        stage: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            seq: 0,
            frame: frame.into(),
            frame_type,
            group: group.into(),
            stage: stage.into(),
            suffix: suffix.into(),
            mjd: None,
            camera: None,
        }
    }

    pub fn with_mjd(mut self, mjd: Option<f64>) -> Self {
        self.mjd = mjd;
        self
    }

    pub fn with_camera(mut self, camera: Option<String>) -> Self {
        self.camera = camera;
        self
    }
}

/// Nearest-match lookup parameters.
#[derive(Clone, Debug, Default)]
pub struct NearestQuery<'a> {
    /// Restrict to one group; `None` searches every group.
    pub group: Option<&'a str>,
    /// Restrict to one camera. Rows without a camera match any.
    pub camera: Option<&'a str>,
    /// Prefer the record closest to this observation time.
    pub near_mjd: Option<f64>,
    /// Ignore records appended after this sequence key.
    pub before_seq: Option<u64>,
}

impl<'a> NearestQuery<'a> {
    pub fn in_group(group: &'a str) -> Self {
        Self {
            group: Some(group),
            ..Self::default()
        }
    }

    pub fn near(mut self, mjd: Option<f64>) -> Self {
        self.near_mjd = mjd;
        self
    }

    pub fn on_camera(mut self, camera: Option<&'a str>) -> Self {
        self.camera = camera;
        self
    }
}

/// Capability set the dispatcher and stages need from a ledger.
///
/// Implementations serialize their own state; every method takes `&self`
/// so one ledger can be shared across frame workers behind an `Arc`.
pub trait Ledger: Send + Sync {
    /// Has `frame` completed `stage`?
    fn contains(&self, frame: &str, stage: &str) -> bool;

    /// Append a row and return its sequence key.
    ///
    /// The row is visible to queries even when persisting it fails; an error
    /// here means the row is still pending and will be retried.
    fn append(&self, record: Record) -> Result<u64>;

    /// Latest record of `frame_type` matching `query`, or `None`.
    fn nearest_of_type(&self, frame_type: FrameType, query: &NearestQuery<'_>) -> Option<Record>;

    /// Number of distinct frames of `frame_type` recorded in `group`.
    fn count_of_type(&self, frame_type: FrameType, group: &str) -> usize;

    /// All rows for `frame`, in sequence order.
    fn records_for(&self, frame: &str) -> Vec<Record>;

    /// Every row, in sequence order.
    fn records(&self) -> Vec<Record>;

    /// Persist pending rows. In-memory ledgers have nothing to do.
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        self.records().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Has `frame` completed any stage at all?
    fn is_recorded(&self, frame: &str) -> bool {
        !self.records_for(frame).is_empty()
    }

    /// Suffix of the most recent stage `frame` completed.
    fn last_suffix(&self, frame: &str) -> Option<String> {
        self.records_for(frame).pop().map(|r| r.suffix)
    }
}

/// Read-only handle given to stages. Appending stays with the dispatcher.
#[derive(Clone, Copy)]
pub struct LedgerView<'a>(&'a dyn Ledger);

impl<'a> LedgerView<'a> {
    pub fn new(ledger: &'a dyn Ledger) -> Self {
        Self(ledger)
    }

    pub fn contains(&self, frame: &str, stage: &str) -> bool {
        self.0.contains(frame, stage)
    }

    pub fn nearest_of_type(&self, frame_type: FrameType, query: &NearestQuery<'_>) -> Option<Record> {
        self.0.nearest_of_type(frame_type, query)
    }

    pub fn count_of_type(&self, frame_type: FrameType, group: &str) -> usize {
        self.0.count_of_type(frame_type, group)
    }

    pub fn records_for(&self, frame: &str) -> Vec<Record> {
        self.0.records_for(frame)
    }
}
