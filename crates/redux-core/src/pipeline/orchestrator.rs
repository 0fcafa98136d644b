use std::convert::Infallible;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::consts::{MAX_EVENTS_PER_FRAME, PARALLEL_FRAME_THRESHOLD};
use crate::error::Result;
use crate::frame::Frame;
use crate::ledger::Ledger;
use crate::parallel::{ParallelRunner, UnitFailure};
use crate::stages::StageRegistry;

use super::config::ReduxConfig;
use super::dispatcher::{Decision, Dispatcher};
use super::types::{FrameReport, FrameStatus, NoOpReporter, ProgressReporter, StepOutcome};

/// Tallies of a run, by final frame status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub already_processed: usize,
    pub duplicates: usize,
    pub deferred: usize,
    pub unclassified: usize,
    pub rejected: usize,
    pub unrouted: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_reports(reports: &[FrameReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            let slot = match report.status {
                FrameStatus::Completed => &mut summary.completed,
                FrameStatus::AlreadyProcessed => &mut summary.already_processed,
                FrameStatus::Duplicate { .. } => &mut summary.duplicates,
                FrameStatus::Deferred(_) => &mut summary.deferred,
                FrameStatus::Unclassified(_) => &mut summary.unclassified,
                FrameStatus::Rejected(_) => &mut summary.rejected,
                FrameStatus::Unrouted(_) => &mut summary.unrouted,
                FrameStatus::Failed { .. } => &mut summary.failed,
            };
            *slot += 1;
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.completed
            + self.already_processed
            + self.duplicates
            + self.deferred
            + self.unclassified
            + self.rejected
            + self.unrouted
            + self.failed
    }
}

/// Drives frames through the recipe graph.
pub struct Pipeline {
    dispatcher: Dispatcher,
    frame_runner: ParallelRunner,
}

impl Pipeline {
    /// Pipeline with the built-in stage registry for the configured graph.
    pub fn new(config: ReduxConfig, ledger: Arc<dyn Ledger>) -> Result<Self> {
        let graph = config.recipe_graph();
        let registry = StageRegistry::with_builtins(&graph, &config);
        Self::with_registry(config, ledger, registry)
    }

    /// Pipeline with caller-supplied stages.
    pub fn with_registry(
        config: ReduxConfig,
        ledger: Arc<dyn Ledger>,
        registry: StageRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let graph = config.recipe_graph();
        let longest = graph.longest_chain()?;
        let unit_runner = ParallelRunner::new(config.parallel.workers)?;
        let frame_runner = ParallelRunner::new(config.parallel.frame_workers)?;
        info!(
            events = graph.len(),
            longest_chain = longest,
            workers = unit_runner.workers(),
            frame_workers = frame_runner.workers(),
            "Pipeline ready"
        );
        let dispatcher = Dispatcher::new(
            Arc::new(graph),
            Arc::new(registry),
            ledger,
            Arc::new(config),
            unit_runner,
        )?;
        Ok(Self {
            dispatcher,
            frame_runner,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one frame until its path ends.
    pub fn process_frame(&self, frame: Frame) -> FrameReport {
        self.process_frame_reported(frame, &NoOpReporter)
    }

    /// Run one frame until its path ends, reporting each stage start.
    pub fn process_frame_reported(&self, frame: Frame, reporter: &dyn ProgressReporter) -> FrameReport {
        let name = frame.name.clone();
        let mut events = Vec::new();

        let mut event = match self.dispatcher.ingest(frame) {
            Decision::Enqueue(event) => event,
            Decision::Stop { frame, status } => {
                return finish(name, events, status, Some(frame), reporter);
            }
        };

        loop {
            if events.len() >= MAX_EVENTS_PER_FRAME {
                error!(frame = %name, last = %event.name, "Event limit reached");
                let status = FrameStatus::Failed {
                    event: event.name.clone(),
                    error: format!("more than {MAX_EVENTS_PER_FRAME} events"),
                };
                return finish(name, events, status, None, reporter);
            }
            events.push(event.name.clone());

            match self.dispatcher.step(event, reporter) {
                StepOutcome::Next(next) => event = next,
                StepOutcome::Stop { frame, status } => {
                    return finish(name, events, status, Some(frame), reporter);
                }
                StepOutcome::Failed { event, error, .. } => {
                    let status = FrameStatus::Failed {
                        event,
                        error: error.to_string(),
                    };
                    return finish(name, events, status, None, reporter);
                }
            }
        }
    }

    /// Run every frame on the frame pool and return reports in input order.
    ///
    /// A failing or panicking frame never stops its siblings. Pending ledger
    /// rows are flushed once all frames are done.
    pub fn process_all(
        &self,
        frames: Vec<Frame>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Vec<FrameReport> {
        let total = frames.len();
        reporter.begin_run(total);
        info!(frames = total, "Processing frames");

        let reports = if total < PARALLEL_FRAME_THRESHOLD {
            frames
                .into_iter()
                .map(|frame| self.process_frame_reported(frame, reporter.as_ref()))
                .collect()
        } else {
            let names: Vec<String> = frames.iter().map(|f| f.name.clone()).collect();
            let fan_in = self.frame_runner.run(frames, |_, frame| {
                Ok::<_, Infallible>(self.process_frame_reported(frame, reporter.as_ref()))
            });
            fan_in
                .into_results()
                .into_iter()
                .zip(names)
                .map(|(result, name)| match result {
                    Ok(report) => report,
                    Err(UnitFailure::Failed(never)) => match never {},
                    Err(UnitFailure::Panicked(msg)) => {
                        error!(frame = %name, panic = %msg, "Frame worker panicked");
                        let report = FrameReport {
                            frame: name,
                            events: Vec::new(),
                            status: FrameStatus::Failed {
                                event: String::new(),
                                error: format!("panicked: {msg}"),
                            },
                            output: None,
                        };
                        reporter.frame_done(&report);
                        report
                    }
                })
                .collect()
        };

        if let Err(e) = self.dispatcher.ledger().flush() {
            warn!(error = %e, "Ledger flush failed; rows remain pending");
        }
        reporter.finish_run();
        reports
    }
}

fn finish(
    frame: String,
    events: Vec<String>,
    status: FrameStatus,
    output: Option<Frame>,
    reporter: &dyn ProgressReporter,
) -> FrameReport {
    debug!(frame = %frame, events = events.len(), status = %status, "Frame done");
    let report = FrameReport {
        frame,
        events,
        status,
        output,
    };
    reporter.frame_done(&report);
    report
}
