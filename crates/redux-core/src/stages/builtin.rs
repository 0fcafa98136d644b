use std::sync::Arc;

use ndarray::Array2;
use tracing::{debug, info};

use crate::error::StageError;
use crate::flags::{saturated_pixels, QualityFlag};
use crate::frame::Frame;
use crate::ledger::LedgerView;
use crate::pipeline::StageParams;

use super::{Stage, StageContext, StageOutcome, StageResult};

/// Placeholder for a stage whose work happens outside the engine.
/// Hands the frame back untouched.
#[derive(Clone, Debug)]
pub struct Passthrough {
    name: String,
}

impl Passthrough {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Stage for Passthrough {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, frame: Frame, _params: &StageParams, ctx: &StageContext<'_>) -> StageResult {
        debug!(stage = %self.name, event = ctx.event, frame = %frame.name, "External stage");
        Ok(StageOutcome::Completed(frame))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Noop;

impl Stage for Noop {
    fn name(&self) -> &str {
        "noop"
    }

    fn run(&self, frame: Frame, _params: &StageParams, _ctx: &StageContext<'_>) -> StageResult {
        Ok(StageOutcome::Completed(frame))
    }
}

/// First object stage: flags every pixel at or above the saturation level.
#[derive(Clone, Debug)]
pub struct SaturationCheck {
    name: String,
    level: f32,
}

impl SaturationCheck {
    pub fn new(name: impl Into<String>, level: f32) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }
}

impl Stage for SaturationCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, mut frame: Frame, _params: &StageParams, _ctx: &StageContext<'_>) -> StageResult {
        let saturated = saturated_pixels(&frame.data, self.level);
        let n = frame.flags.accumulate(QualityFlag::Saturated, &saturated);
        info!(frame = %frame.name, saturated = n, "Saturation check");
        frame.header.insert("NSATPIX", n as i64);
        Ok(StageOutcome::Completed(frame))
    }
}

/// Selects the pixels a flagging stage touches.
pub type MaskFn = dyn Fn(&Frame, &LedgerView<'_>) -> Result<Array2<bool>, String> + Send + Sync;

/// Stage that adds one flag weight to the pixels chosen by an injected mask
/// function. Defect and cosmic-ray collaborators plug in here.
pub struct FlagStage {
    name: String,
    flag: QualityFlag,
    mask: Box<MaskFn>,
}

impl FlagStage {
    pub fn new<F>(name: impl Into<String>, flag: QualityFlag, mask: F) -> Self
    where
        F: Fn(&Frame, &LedgerView<'_>) -> Result<Array2<bool>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            flag,
            mask: Box::new(mask),
        }
    }
}

impl Stage for FlagStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, mut frame: Frame, _params: &StageParams, ctx: &StageContext<'_>) -> StageResult {
        let selected =
            (self.mask)(&frame, &ctx.ledger).map_err(|e| StageError::failed(&self.name, e))?;
        if selected.dim() != frame.flags.dim() {
            return Err(StageError::failed(
                &self.name,
                format!(
                    "mask shape {:?} does not match frame shape {:?}",
                    selected.dim(),
                    frame.flags.dim()
                ),
            ));
        }
        let n = frame.flags.accumulate(self.flag, &selected);
        info!(stage = %self.name, frame = %frame.name, flagged = n, "Flags added");
        Ok(StageOutcome::Completed(frame))
    }
}

/// Gate in front of a stack-building stage.
///
/// Counts the recorded frames of the wanted type in the group and defers when
/// fewer than `min_files` are present.
pub struct StackGate {
    inner: Arc<dyn Stage>,
}

impl StackGate {
    pub fn new(inner: Arc<dyn Stage>) -> Self {
        Self { inner }
    }
}

impl Stage for StackGate {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn run(&self, frame: Frame, params: &StageParams, ctx: &StageContext<'_>) -> StageResult {
        let Some(want) = params.want_type.or_else(|| frame.frame_type()) else {
            return Err(StageError::failed(self.name(), "no wanted type for stack"));
        };
        let Some(group) = params
            .groupid
            .clone()
            .or_else(|| frame.group().map(str::to_string))
        else {
            return Err(StageError::failed(self.name(), "no group for stack"));
        };
        let min_files = params.min_files.unwrap_or(1);
        let count = ctx.ledger.count_of_type(want, &group);

        if count < min_files {
            let reason = format!("{count} of {min_files} {want} frames in group {group}");
            info!(stage = self.name(), frame = %frame.name, %reason, "Stack deferred");
            return Ok(StageOutcome::Deferred { frame, reason });
        }

        info!(stage = self.name(), group = %group, count, min_files, "Building stack");
        self.inner.run(frame, params, ctx)
    }
}
