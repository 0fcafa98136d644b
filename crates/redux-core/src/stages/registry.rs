use std::collections::HashMap;
use std::sync::Arc;

use crate::consts::STAGE_ACTION_PLANNER;
use crate::error::StageError;
use crate::pipeline::config::ReduxConfig;
use crate::pipeline::RecipeGraph;

use super::builtin::{Noop, Passthrough, SaturationCheck, StackGate};
use super::make_cube::{CopySlice, MakeCube, SliceWarp};
use super::Stage;

/// Stage name → implementation.
#[derive(Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `stage` under its own name, replacing any previous entry.
    pub fn register(&mut self, stage: impl Stage + 'static) -> &mut Self {
        let name = stage.name().to_string();
        self.stages.insert(name, Arc::new(stage));
        self
    }

    /// Register a shared stage under an explicit name.
    pub fn register_as(&mut self, name: impl Into<String>, stage: Arc<dyn Stage>) -> &mut Self {
        self.stages.insert(name.into(), stage);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Stage>, StageError> {
        self.stages
            .get(name)
            .cloned()
            .ok_or_else(|| StageError::NotRegistered(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// A stage for every name the graph uses, with the identity slice warp.
    pub fn with_builtins(graph: &RecipeGraph, config: &ReduxConfig) -> Self {
        Self::with_builtins_and_warp(graph, config, Arc::new(CopySlice))
    }

    /// Built-ins for `graph`: `noop`, saturation flagging for
    /// `ProcessObject`, cube building for `MakeCube`, passthrough for the
    /// rest. Stages of stack steps are wrapped in a [`StackGate`].
    pub fn with_builtins_and_warp(
        graph: &RecipeGraph,
        config: &ReduxConfig,
        warp: Arc<dyn SliceWarp>,
    ) -> Self {
        let mut registry = Self::new();
        for (_, step) in graph.iter() {
            let name = step.stage.as_str();
            if name == STAGE_ACTION_PLANNER || registry.contains(name) {
                continue;
            }
            let stage: Arc<dyn Stage> = match name {
                "noop" => Arc::new(Noop),
                "ProcessObject" => Arc::new(SaturationCheck::new(
                    name,
                    config.instrument.saturation_level,
                )),
                "MakeCube" => Arc::new(MakeCube::new(
                    name,
                    config.parallel.cube_slices,
                    Arc::clone(&warp),
                )),
                _ => Arc::new(Passthrough::new(name)),
            };
            let stacked = graph.iter().any(|(_, s)| s.stage == name && s.stack);
            let stage: Arc<dyn Stage> = if stacked {
                Arc::new(StackGate::new(stage))
            } else {
                stage
            };
            registry.register_as(name, stage);
        }
        registry
    }
}
