/// Default saturation level in DN for a 16-bit detector.
pub const DEFAULT_SATURATION_LEVEL: f32 = 65_535.0;

/// Number of IFU slices a raw frame is split into when building a cube.
pub const DEFAULT_CUBE_SLICES: usize = 24;

/// Minimum frame count to fan frames out over the worker pool instead of
/// running them on the calling thread.
pub const PARALLEL_FRAME_THRESHOLD: usize = 2;

/// Default output directory tag for reduced products.
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "redux";

/// Default ledger file, relative to the working directory.
pub const DEFAULT_LEDGER_PATH: &str = "redux/redux.proc";

/// Event pushed for every freshly ingested file.
pub const EVENT_NEXT_FILE: &str = "next_file";

/// Event whose stage is the dispatcher's own action planner.
pub const EVENT_FILE_INGESTED: &str = "file_ingested";

/// Terminal event pushed for frames that are already in the ledger.
pub const EVENT_NOOP: &str = "noop";

/// Stage name handled by the dispatcher itself rather than the registry.
pub const STAGE_ACTION_PLANNER: &str = "action_planner";

/// Upper bound on events one frame may visit. Guards against a recipe graph
/// that was mutated after validation.
pub const MAX_EVENTS_PER_FRAME: usize = 256;
