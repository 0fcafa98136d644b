//! Recipe dispatch: the event graph, the action planner and the frame loop.

pub mod config;
mod dispatcher;
mod orchestrator;
mod params;
mod recipe;
mod types;

pub use config::ReduxConfig;
pub use dispatcher::{Decision, Dispatcher};
pub use orchestrator::{Pipeline, RunSummary};
pub use params::StageParams;
pub use recipe::{RecipeGraph, RecipeStep};
pub use types::{Event, FrameReport, FrameStatus, NoOpReporter, ProgressReporter, StepOutcome};
