use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::classify::classify;
use crate::consts::{EVENT_NEXT_FILE, EVENT_NOOP, STAGE_ACTION_PLANNER};
use crate::error::{RecipeError, StageError};
use crate::frame::{Frame, FrameInfo, FrameType, ProductType};
use crate::header::Header;
use crate::ledger::{Ledger, LedgerView, Record};
use crate::parallel::{panic_message, ParallelRunner};
use crate::stages::{StageContext, StageOutcome, StageRegistry};

use super::config::ReduxConfig;
use super::params::StageParams;
use super::recipe::{RecipeGraph, RecipeStep};
use super::types::{Event, FrameStatus, ProgressReporter, StepOutcome};

/// Result of planning a freshly ingested frame.
#[derive(Debug)]
pub enum Decision {
    Enqueue(Event),
    Stop { frame: Frame, status: FrameStatus },
}

/// Every event `plan` can enqueue.
const PLANNED_EVENTS: [&str; 8] = [
    EVENT_NOOP,
    "process_bias",
    "process_dark",
    "process_contbars",
    "process_flat",
    "process_arc",
    "process_nandshuff",
    "process_object",
];

/// How a calibration type is routed.
struct CalibrationRoute {
    event: &'static str,
    new_type: ProductType,
    stack_type: Option<ProductType>,
    file_stem: &'static str,
    in_directory: bool,
}

fn calibration_route(frame_type: FrameType) -> Option<CalibrationRoute> {
    let route = |event, new_type, stack_type, file_stem, in_directory| CalibrationRoute {
        event,
        new_type,
        stack_type,
        file_stem,
        in_directory,
    };
    Some(match frame_type {
        FrameType::Bias => route("process_bias", ProductType::Mbias, None, "bias", false),
        FrameType::Dark => route("process_dark", ProductType::Mdark, None, "dark", true),
        FrameType::ContBars => route("process_contbars", ProductType::Mcbars, None, "contbars", true),
        FrameType::FlatLamp => route("process_flat", ProductType::Mflat, Some(ProductType::Sflat), "flat", true),
        FrameType::DomeFlat => route("process_flat", ProductType::Mdome, Some(ProductType::Sdome), "flat", true),
        FrameType::TwiFlat => route("process_flat", ProductType::Mtwif, Some(ProductType::Stwif), "flat", true),
        FrameType::ArcLamp => route("process_arc", ProductType::Marc, None, "arc", true),
        FrameType::Object => return None,
    })
}

/// Held while one (frame, event) pair runs; dropping it releases the claim.
struct Claim<'a> {
    claims: &'a Mutex<HashSet<(String, String)>>,
    key: (String, String),
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claims.lock().remove(&self.key);
    }
}

/// Chooses and runs recipe events for frames.
///
/// Stateless per frame apart from the ledger and the set of in-flight
/// (frame, event) claims, so one dispatcher serves every frame worker.
pub struct Dispatcher {
    graph: Arc<RecipeGraph>,
    registry: Arc<StageRegistry>,
    ledger: Arc<dyn Ledger>,
    config: Arc<ReduxConfig>,
    runner: ParallelRunner,
    claims: Mutex<HashSet<(String, String)>>,
}

impl Dispatcher {
    /// Build a dispatcher over a validated graph that defines every entry
    /// event the planner routes to.
    pub fn new(
        graph: Arc<RecipeGraph>,
        registry: Arc<StageRegistry>,
        ledger: Arc<dyn Ledger>,
        config: Arc<ReduxConfig>,
        runner: ParallelRunner,
    ) -> Result<Self, RecipeError> {
        graph.validate()?;
        graph.require(&PLANNED_EVENTS)?;
        Ok(Self {
            graph,
            registry,
            ledger,
            config,
            runner,
            claims: Mutex::new(HashSet::new()),
        })
    }

    pub fn graph(&self) -> &RecipeGraph {
        &self.graph
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn config(&self) -> &ReduxConfig {
        &self.config
    }

    /// First event for a newly arrived frame: the graph's ingestion entry
    /// when it has one, otherwise straight to planning.
    pub fn ingest(&self, frame: Frame) -> Decision {
        if self.graph.contains(EVENT_NEXT_FILE) {
            Decision::Enqueue(Event::new(EVENT_NEXT_FILE, frame, StageParams::default()))
        } else {
            self.plan(frame)
        }
    }

    /// The action planner: classify the frame, consult the ledger and pick
    /// the recipe entry event with its parameters.
    pub fn plan(&self, mut frame: Frame) -> Decision {
        let info = match classify(&frame) {
            Ok(Some(info)) => info,
            Ok(None) => {
                let imtype = frame.header.get_string("IMTYPE").unwrap_or_default();
                debug!(frame = %frame.name, imtype = %imtype, "No recipe for image type");
                return Decision::Stop {
                    frame,
                    status: FrameStatus::Unrouted(imtype),
                };
            }
            Err(e) => {
                warn!(frame = %frame.name, error = %e, "File type is not determined. No processing is possible");
                return Decision::Stop {
                    frame,
                    status: FrameStatus::Unclassified(e),
                };
            }
        };

        info!(
            frame = %frame.name,
            imtype = %info.frame_type,
            group = %info.group,
            camera = frame.header.get_string("CAMERA").unwrap_or_default(),
            "File type determined"
        );

        frame.in_ledger = self.ledger.is_recorded(&frame.name);
        if frame.in_ledger {
            frame.last_suffix = self.ledger.last_suffix(&frame.name);
            warn!(
                frame = %frame.name,
                last_suffix = frame.last_suffix.as_deref().unwrap_or(""),
                "Already processed"
            );
        }
        let group = info.group.clone();
        let frame_type = info.frame_type;
        let nod_and_shuffle = info.is_nod_and_shuffle();
        let exposure = info.exposure;
        frame.info = Some(info);

        if frame.in_ledger && !self.config.instrument.clobber {
            info!(frame = %frame.name, "Pushing noop to queue");
            return Decision::Enqueue(Event::new(EVENT_NOOP, frame, StageParams::for_group(group)));
        }

        if frame_type == FrameType::Bias && exposure > 0.0 {
            let reason = format!("bias frame with exposure time = {exposure} > 0");
            warn!(frame = %frame.name, %reason, "Discarding");
            return Decision::Stop {
                frame,
                status: FrameStatus::Rejected(reason),
            };
        }

        if let Some(route) = calibration_route(frame_type) {
            let params = StageParams {
                new_file_name: Some(format!("master_{}_{}.fits", route.file_stem, group)),
                groupid: Some(group),
                want_type: Some(frame_type),
                stack_type: route.stack_type,
                new_type: Some(route.new_type),
                min_files: Some(self.config.instrument.min_nframes(frame_type)),
                in_directory: route
                    .in_directory
                    .then(|| self.config.instrument.output_directory.clone()),
            };
            return Decision::Enqueue(Event::new(route.event, frame, params));
        }

        if nod_and_shuffle {
            return Decision::Enqueue(Event::new(
                "process_nandshuff",
                frame,
                StageParams::for_group(group),
            ));
        }

        let params = StageParams {
            groupid: Some(group),
            new_type: Some(self.config.object.new_type),
            min_files: Some(self.config.instrument.object_min_nframes),
            in_directory: Some(self.config.instrument.output_directory.clone()),
            ..StageParams::default()
        };
        Decision::Enqueue(Event::new("process_object", frame, params))
    }

    /// Run one event and decide what follows.
    ///
    /// For recorded steps the (frame, event) pair is claimed before the stage
    /// runs and released after the ledger row is written, so concurrent
    /// workers can never run or record the same pair twice.
    pub fn step(&self, event: Event, reporter: &dyn ProgressReporter) -> StepOutcome {
        let Event {
            name,
            mut frame,
            params,
        } = event;

        let Some(step) = self.graph.step(&name) else {
            return StepOutcome::Failed {
                frame: frame.name,
                error: RecipeError::UnknownEvent(name.clone()).into(),
                event: name,
            };
        };

        if step.stage == STAGE_ACTION_PLANNER {
            return match self.plan(frame) {
                Decision::Enqueue(next) => StepOutcome::Next(next),
                Decision::Stop { frame, status } => StepOutcome::Stop { frame, status },
            };
        }

        if frame.info.is_none() {
            match classify(&frame) {
                Ok(info) => frame.info = info,
                Err(e) if step.record => {
                    error!(frame = %frame.name, event = %name, error = %e, "Cannot record an unclassified frame");
                    return StepOutcome::Failed {
                        frame: frame.name,
                        event: name,
                        error: e.into(),
                    };
                }
                Err(_) => {}
            }
        }
        if step.record && frame.info.is_none() {
            error!(frame = %frame.name, event = %name, "No recipe type; completion cannot be recorded");
            return StepOutcome::Failed {
                frame: frame.name,
                error: StageError::failed(&step.stage, "frame has no recipe type to record").into(),
                event: name,
            };
        }

        let _claim = if step.record {
            match self.claim(&frame.name, &name) {
                Some(claim) => Some(claim),
                None => {
                    info!(frame = %frame.name, event = %name, "Already done or in flight; skipping");
                    return StepOutcome::Stop {
                        frame,
                        status: FrameStatus::Duplicate { event: name },
                    };
                }
            }
        } else {
            None
        };

        let stage = match self.registry.get(&step.stage) {
            Ok(stage) => stage,
            Err(e) => {
                error!(frame = %frame.name, event = %name, error = %e, "Stage missing");
                return StepOutcome::Failed {
                    frame: frame.name,
                    event: name,
                    error: e.into(),
                };
            }
        };

        if let Some(started) = &step.started {
            debug!(frame = %frame.name, event = %started, "Stage started");
        }
        reporter.stage_started(&frame.name, &name);

        let frame_name = frame.name.clone();
        let ctx = StageContext {
            event: &name,
            ledger: LedgerView::new(self.ledger.as_ref()),
            runner: &self.runner,
        };
        let run = catch_unwind(AssertUnwindSafe(|| stage.run(frame, &params, &ctx)));
        let result = run.unwrap_or_else(|payload| {
            Err(StageError::failed(
                &step.stage,
                format!("panicked: {}", panic_message(payload.as_ref())),
            ))
        });
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(frame = %frame_name, event = %name, error = %e, "Stage failed");
                return StepOutcome::Failed {
                    frame: frame_name,
                    event: name,
                    error: e.into(),
                };
            }
        };

        let mut frame = match outcome {
            StageOutcome::Completed(frame) => frame,
            StageOutcome::Deferred { frame, reason } => {
                return StepOutcome::Stop {
                    frame,
                    status: FrameStatus::Deferred(reason),
                };
            }
        };

        if step.record {
            let Some(info) = frame.info.as_ref() else {
                error!(frame = %frame.name, event = %name, "No frame type; completion cannot be recorded");
                return StepOutcome::Failed {
                    frame: frame.name,
                    error: StageError::failed(&step.stage, "completed without a frame type to record")
                        .into(),
                    event: name,
                };
            };
            let suffix = step.suffix.clone().unwrap_or_else(|| name.clone());
            self.record(&frame.name, info, &frame.header, &name, &suffix);
            frame.last_suffix = Some(suffix);
        }

        match &step.next {
            Some(next) => {
                debug!(frame = %frame.name, from = %name, to = %next, "Advancing");
                StepOutcome::Next(Event::new(next.clone(), frame, params))
            }
            None => {
                let status = if name == EVENT_NOOP {
                    FrameStatus::AlreadyProcessed
                } else {
                    FrameStatus::Completed
                };
                StepOutcome::Stop { frame, status }
            }
        }
    }

    /// Claim (frame, event) unless it is recorded (and clobber is off) or
    /// already claimed.
    fn claim(&self, frame: &str, event: &str) -> Option<Claim<'_>> {
        let mut claims = self.claims.lock();
        let key = (frame.to_string(), event.to_string());
        if claims.contains(&key) {
            return None;
        }
        if !self.config.instrument.clobber && self.ledger.contains(frame, event) {
            return None;
        }
        claims.insert(key.clone());
        Some(Claim {
            claims: &self.claims,
            key,
        })
    }

    fn record(&self, frame: &str, info: &FrameInfo, header: &Header, event: &str, suffix: &str) {
        let record = Record::new(frame, info.frame_type, info.group.as_str(), event, suffix)
            .with_mjd(info.mjd)
            .with_camera(header.get_string("CAMERA"));
        if let Err(e) = self.ledger.append(record) {
            warn!(frame, event, error = %e, "Ledger row kept for retry");
        }
    }

    /// Recipe step for `event`, if any.
    pub fn step_for(&self, event: &str) -> Option<&RecipeStep> {
        self.graph.step(event)
    }
}
