use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::consts::{EVENT_FILE_INGESTED, EVENT_NEXT_FILE, EVENT_NOOP, STAGE_ACTION_PLANNER};
use crate::error::RecipeError;

fn default_record() -> bool {
    true
}

/// One entry of the recipe graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    /// Stage run for this event, looked up in the stage registry.
    pub stage: String,
    /// Notification emitted when the stage starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    /// Event pushed when the stage completes. `None` ends the recipe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Output suffix recorded in the ledger. Defaults to the event name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Whether completion is written to the ledger. Control events are not.
    #[serde(default = "default_record")]
    pub record: bool,
    /// Stage builds a stack and is gated on group membership.
    #[serde(default)]
    pub stack: bool,
}

impl RecipeStep {
    pub fn new(stage: &str, started: Option<&str>, next: Option<&str>) -> Self {
        Self {
            stage: stage.to_string(),
            started: started.map(str::to_string),
            next: next.map(str::to_string),
            suffix: None,
            record: true,
            stack: false,
        }
    }

    pub fn suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix.to_string());
        self
    }

    /// Mark as a control event: runs, but leaves no ledger row.
    pub fn control(mut self) -> Self {
        self.record = false;
        self
    }

    /// Mark as stack-building.
    pub fn stack(mut self) -> Self {
        self.stack = true;
        self
    }
}

/// Static event → step table shared read-only by every frame in a run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipeGraph {
    steps: BTreeMap<String, RecipeStep>,
}

impl RecipeGraph {
    pub fn from_steps<I, S>(steps: I) -> Result<Self, RecipeError>
    where
        I: IntoIterator<Item = (S, RecipeStep)>,
        S: Into<String>,
    {
        let graph = Self {
            steps: steps.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        graph.validate()?;
        Ok(graph)
    }

    /// The full instrument recipe set.
    pub fn standard() -> Self {
        let s = RecipeStep::new;
        let steps = [
            // Ingestion and control
            ("add_only", s("add_to_dataframe_only", None, None).control()),
            (EVENT_NEXT_FILE, s("ingest_file", Some("ingest_file_started"), Some(EVENT_FILE_INGESTED)).control()),
            (EVENT_FILE_INGESTED, s(STAGE_ACTION_PLANNER, None, None).control()),
            ("next_file_stop", s("ingest_file", Some(EVENT_FILE_INGESTED), None).control()),
            (EVENT_NOOP, s("noop", None, None).control()),
            // Bias
            ("process_bias", s("ProcessBias", Some("bias_processing_started"), Some("bias_make_master")).suffix("int")),
            ("bias_make_master", s("MakeMasterBias", Some("master_bias_started"), None).suffix("mbias").stack()),
            // Dark
            ("process_dark", s("ProcessDark", Some("dark_processing_started"), Some("dark_make_master")).suffix("int")),
            ("dark_make_master", s("MakeMasterDark", Some("master_dark_started"), None).suffix("mdark").stack()),
            // Continuum bars
            ("process_contbars", s("ProcessContbars", Some("contbars_processing_started"), Some("contbars_make_master")).suffix("int")),
            ("contbars_make_master", s("MakeMasterContbars", Some("contbars_make_master_started"), Some("contbars_find_bars")).suffix("mcbars").stack()),
            ("contbars_find_bars", s("FindBars", Some("find_bars_started"), Some("contbars_trace_bars")).suffix("bars")),
            ("contbars_trace_bars", s("TraceBars", Some("trace_bars_started"), None).suffix("trace")),
            // Arcs and geometry
            ("process_arc", s("ProcessArc", Some("arc_processing_started"), Some("arcs_make_master")).suffix("int")),
            ("arcs_make_master", s("MakeMasterArc", Some("arcs_make_master_started"), Some("arcs_extract_arcs")).suffix("marc").stack()),
            ("arcs_extract_arcs", s("ExtractArcs", Some("extract_arcs_started"), Some("arcs_arc_offsets")).suffix("arcs")),
            ("arcs_arc_offsets", s("ArcOffsets", Some("arc_offsets_started"), Some("arcs_calc_prelim_disp")).suffix("arcoff")),
            ("arcs_calc_prelim_disp", s("CalcPrelimDisp", Some("prelim_disp_started"), Some("arcs_read_atlas")).suffix("prelim")),
            ("arcs_read_atlas", s("ReadAtlas", Some("read_atlas_started"), Some("arcs_fit_center")).suffix("atlas")),
            ("arcs_fit_center", s("FitCenter", Some("fit_center_started"), Some("arcs_get_atlas_lines")).suffix("fitc")),
            ("arcs_get_atlas_lines", s("GetAtlasLines", Some("get_atlas_lines_started"), Some("arcs_solve_arcs")).suffix("lines")),
            ("arcs_solve_arcs", s("SolveArcs", Some("solve_arcs_started"), Some("arcs_solve_geom")).suffix("wsol")),
            ("arcs_solve_geom", s("SolveGeom", Some("solve_geom_started"), Some("arcs_generate_maps")).suffix("geom")),
            ("arcs_generate_maps", s("GenerateMaps", Some("generate_maps_started"), None).suffix("wavemap")),
            // Flats
            ("process_flat", s("ProcessFlat", Some("flat_processing_started"), Some("flat_make_stack")).suffix("int")),
            ("flat_make_stack", s("StackFlats", Some("stack_flats_started"), Some("flat_make_master")).suffix("sflat").stack()),
            ("flat_make_master", s("MakeMasterFlat", Some("master_flat_started"), None).suffix("mflat")),
            // Objects
            ("process_object", s("ProcessObject", Some("object_processing_started"), Some("object_correct_defects")).suffix("int")),
            ("object_correct_defects", s("CorrectDefects", Some("correct_defects_started"), Some("object_remove_crs")).suffix("def")),
            ("object_remove_crs", s("RemoveCosmicRays", Some("remove_crs_started"), Some("object_make_cube")).suffix("crr")),
            ("object_make_cube", s("MakeCube", Some("making_cube_started"), Some("object_wavelengthcorr")).suffix("icube")),
            ("object_wavelengthcorr", s("WavelengthCorrections", Some("wavelength_correction_started"), Some("object_correct_dar")).suffix("icubew")),
            ("object_correct_dar", s("CorrectDar", Some("correcting_dar_started"), Some("object_make_invsens")).suffix("icubed")),
            ("object_make_invsens", s("MakeInvsens", Some("make_invsens_started"), Some("object_flux_calibrate")).suffix("invsens")),
            ("object_flux_calibrate", s("FluxCalibrate", Some("flux_calibration_started"), None).suffix("icubes")),
            // Nod-and-shuffle joins the object chain after sky subtraction
            ("process_nandshuff", s("ProcessObject", Some("nandshuff_processing_started"), Some("nandshuff_subtract_sky")).suffix("int")),
            ("nandshuff_subtract_sky", s("NandshuffSubtractSky", Some("subtract_sky_started"), Some("object_correct_defects")).suffix("sky")),
        ];
        Self {
            steps: steps
                .into_iter()
                .map(|(name, step)| (name.to_string(), step))
                .collect(),
        }
    }

    pub fn step(&self, event: &str) -> Option<&RecipeStep> {
        self.steps.get(event)
    }

    pub fn contains(&self, event: &str) -> bool {
        self.steps.contains_key(event)
    }

    pub fn successor(&self, event: &str) -> Option<&str> {
        self.step(event).and_then(|s| s.next.as_deref())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecipeStep)> {
        self.steps.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Distinct stage names referenced by the graph.
    pub fn stage_names(&self) -> BTreeSet<&str> {
        self.steps.values().map(|s| s.stage.as_str()).collect()
    }

    /// Events that no other event names as its successor.
    pub fn entry_events(&self) -> Vec<&str> {
        let targets: BTreeSet<&str> = self.steps.values().filter_map(|s| s.next.as_deref()).collect();
        self.steps
            .keys()
            .map(String::as_str)
            .filter(|e| !targets.contains(e))
            .collect()
    }

    /// Every successor exists and no chain loops back on itself.
    pub fn validate(&self) -> Result<(), RecipeError> {
        for (event, step) in &self.steps {
            if let Some(next) = &step.next {
                if !self.steps.contains_key(next) {
                    return Err(RecipeError::UnknownSuccessor {
                        event: event.clone(),
                        successor: next.clone(),
                    });
                }
            }
        }
        for event in self.steps.keys() {
            self.path_from(event)?;
        }
        Ok(())
    }

    /// Fail on the first of `events` the graph does not define.
    pub fn require(&self, events: &[&str]) -> Result<(), RecipeError> {
        match events.iter().find(|e| !self.steps.contains_key(**e)) {
            Some(missing) => Err(RecipeError::MissingEntry(missing.to_string())),
            None => Ok(()),
        }
    }

    /// Events visited starting at `event`, including it, up to the terminal.
    pub fn path_from(&self, event: &str) -> Result<Vec<String>, RecipeError> {
        if !self.steps.contains_key(event) {
            return Err(RecipeError::UnknownEvent(event.to_string()));
        }
        let mut path = vec![event.to_string()];
        let mut current = event;
        while let Some(next) = self.successor(current) {
            if path.len() > self.steps.len() {
                return Err(RecipeError::Cycle(event.to_string()));
            }
            path.push(next.to_string());
            current = next;
        }
        Ok(path)
    }

    /// Hops on the longest chain; no path needs more to terminate.
    pub fn longest_chain(&self) -> Result<usize, RecipeError> {
        let mut longest = 0;
        for event in self.steps.keys() {
            longest = longest.max(self.path_from(event)?.len() - 1);
        }
        Ok(longest)
    }
}
