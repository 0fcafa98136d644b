use std::fmt;

use crate::error::{ClassificationError, ReduxError};
use crate::frame::Frame;

use super::params::StageParams;

/// A queued recipe event: which step to run next, on which frame.
///
/// The event owns the frame; it moves from stage to stage with it.
#[derive(Clone, Debug)]
pub struct Event {
    pub name: String,
    pub frame: Frame,
    pub params: StageParams,
}

impl Event {
    pub fn new(name: impl Into<String>, frame: Frame, params: StageParams) -> Self {
        Self {
            name: name.into(),
            frame,
            params,
        }
    }
}

/// How a frame's path through the recipe ended.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameStatus {
    /// Reached a terminal event.
    Completed,
    /// Already in the ledger and clobber not set; routed to the no-op event.
    AlreadyProcessed,
    /// The same frame and stage were recorded or in flight elsewhere.
    Duplicate { event: String },
    /// A stack stage declined for lack of group members.
    Deferred(String),
    /// Header missing or malformed; nothing was enqueued.
    Unclassified(ClassificationError),
    /// Dropped by input policy, e.g. a bias frame with nonzero exposure.
    Rejected(String),
    /// Image type with no recipe. Not an error.
    Unrouted(String),
    /// A stage failed; the ledger was not updated for it.
    Failed { event: String, error: String },
}

impl FrameStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::AlreadyProcessed => write!(f, "Already processed"),
            Self::Duplicate { event } => write!(f, "Duplicate of {event}"),
            Self::Deferred(reason) => write!(f, "Deferred ({reason})"),
            Self::Unclassified(e) => write!(f, "Unclassified ({e})"),
            Self::Rejected(reason) => write!(f, "Rejected ({reason})"),
            Self::Unrouted(imtype) => write!(f, "Unrouted ({imtype})"),
            Self::Failed { event, error } => write!(f, "Failed at {event}: {error}"),
        }
    }
}

/// Result of running one event.
#[derive(Debug)]
pub enum StepOutcome {
    /// The successor event to run next.
    Next(Event),
    /// The frame's path ends here.
    Stop { frame: Frame, status: FrameStatus },
    /// The stage failed and consumed the frame.
    Failed {
        frame: String,
        event: String,
        error: ReduxError,
    },
}

/// Everything that happened to one frame in a run.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub frame: String,
    /// Events visited, in order.
    pub events: Vec<String>,
    pub status: FrameStatus,
    /// The frame as the last stage left it, absent after a failure.
    pub output: Option<Frame>,
}

/// Thread-safe progress reporting for a run.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A run over `total_frames` frames has started.
    fn begin_run(&self, _total_frames: usize) {}

    /// A stage has started on a frame.
    fn stage_started(&self, _frame: &str, _event: &str) {}

    /// One frame has finished its path.
    fn frame_done(&self, _report: &FrameReport) {}

    /// Every frame is done.
    fn finish_run(&self) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
