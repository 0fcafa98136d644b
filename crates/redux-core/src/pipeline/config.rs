use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CUBE_SLICES, DEFAULT_LEDGER_PATH, DEFAULT_OUTPUT_DIRECTORY, DEFAULT_SATURATION_LEVEL,
};
use crate::error::{ReduxError, Result};
use crate::frame::{FrameType, ProductType};

use super::recipe::RecipeGraph;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReduxConfig {
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub object: ObjectRecipeConfig,
    #[serde(default)]
    pub parallel: ParallelConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Replaces the built-in recipe graph when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<RecipeGraph>,
}

impl ReduxConfig {
    /// The configured recipe graph, or the standard one.
    pub fn recipe_graph(&self) -> RecipeGraph {
        self.recipe.clone().unwrap_or_else(RecipeGraph::standard)
    }

    /// Reject settings no frame could run with.
    pub fn validate(&self) -> Result<()> {
        if self.parallel.cube_slices == 0 {
            return Err(ReduxError::Config("parallel.cube_slices must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Reprocess frames that are already in the ledger.
    pub clobber: bool,
    pub bias_min_nframes: usize,
    pub dark_min_nframes: usize,
    pub contbars_min_nframes: usize,
    pub flat_min_nframes: usize,
    pub dome_min_nframes: usize,
    pub twiflat_min_nframes: usize,
    pub arc_min_nframes: usize,
    pub object_min_nframes: usize,
    /// Directory tag attached to reduced products.
    pub output_directory: String,
    /// Pixels at or above this level are flagged saturated.
    pub saturation_level: f32,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            clobber: false,
            bias_min_nframes: 7,
            dark_min_nframes: 3,
            contbars_min_nframes: 1,
            flat_min_nframes: 6,
            dome_min_nframes: 3,
            twiflat_min_nframes: 1,
            arc_min_nframes: 1,
            object_min_nframes: 1,
            output_directory: DEFAULT_OUTPUT_DIRECTORY.to_string(),
            saturation_level: DEFAULT_SATURATION_LEVEL,
        }
    }
}

impl InstrumentConfig {
    /// Stack threshold for frames of `frame_type`.
    pub fn min_nframes(&self, frame_type: FrameType) -> usize {
        match frame_type {
            FrameType::Bias => self.bias_min_nframes,
            FrameType::Dark => self.dark_min_nframes,
            FrameType::ContBars => self.contbars_min_nframes,
            FrameType::FlatLamp => self.flat_min_nframes,
            FrameType::DomeFlat => self.dome_min_nframes,
            FrameType::TwiFlat => self.twiflat_min_nframes,
            FrameType::ArcLamp => self.arc_min_nframes,
            FrameType::Object => self.object_min_nframes,
        }
    }
}

/// Object recipe options.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectRecipeConfig {
    /// Product type tag for reduced objects; `MOBJ` or `SKY`.
    pub new_type: ProductType,
}

impl Default for ObjectRecipeConfig {
    fn default() -> Self {
        Self {
            new_type: ProductType::Mobj,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Workers for data-parallel stages. 0 = available parallelism.
    pub workers: usize,
    /// Frames processed concurrently. 0 = available parallelism.
    pub frame_workers: usize,
    /// Slices a frame is cut into when building a cube.
    pub cube_slices: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            frame_workers: 0,
            cube_slices: DEFAULT_CUBE_SLICES,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LEDGER_PATH),
        }
    }
}
