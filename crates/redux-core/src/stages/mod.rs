//! Stage collaborators: the operations recipe events name.
//!
//! The calibration numerics live outside this crate. A stage receives the
//! frame by value with the dispatcher's parameter bag and returns it, or a
//! typed failure. It may read the ledger for reference products but never
//! writes it.

pub mod builtin;
pub mod make_cube;
mod registry;

pub use builtin::{FlagStage, Noop, Passthrough, SaturationCheck, StackGate};
pub use make_cube::{CopySlice, MakeCube, SliceProduct, SliceWarp};
pub use registry::StageRegistry;

use crate::error::StageError;
use crate::frame::Frame;
use crate::ledger::LedgerView;
use crate::parallel::ParallelRunner;
use crate::pipeline::StageParams;

/// What a stage did with a frame.
#[derive(Debug)]
pub enum StageOutcome {
    Completed(Frame),
    /// The stage chose not to run, e.g. a stack below its group threshold.
    /// A successful no-op: not recorded, and the frame's path ends.
    Deferred { frame: Frame, reason: String },
}

pub type StageResult = std::result::Result<StageOutcome, StageError>;

/// Everything a stage may look at besides its frame.
pub struct StageContext<'a> {
    /// Recipe event being run.
    pub event: &'a str,
    pub ledger: LedgerView<'a>,
    /// Worker pool for data-parallel stages.
    pub runner: &'a ParallelRunner,
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, frame: Frame, params: &StageParams, ctx: &StageContext<'_>) -> StageResult;
}
