use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReduxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger record could not be encoded: {0}")]
    LedgerEncoding(#[from] serde_json::Error),

    #[error("Corrupt ledger line {line}: {message}")]
    CorruptLedger { line: usize, message: String },

    #[error("Frame could not be classified: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Recipe graph error: {0}")]
    Recipe(#[from] RecipeError),

    #[error("Stage failed: {0}")]
    Stage(#[from] StageError),

    #[error("Parallel units failed at indices {indices:?}")]
    UnitFailures { indices: Vec<usize> },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Metadata on a frame is missing or malformed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationError {
    #[error("missing header keyword {0}")]
    MissingKeyword(&'static str),

    #[error("header keyword {keyword} has unparseable value {value:?}")]
    Unparseable { keyword: &'static str, value: String },

    #[error("no group key: neither GROUPID nor STATEID present")]
    NoGroup,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecipeError {
    #[error("event {event} names unknown successor {successor}")]
    UnknownSuccessor { event: String, successor: String },

    #[error("recipe graph contains a cycle through {0}")]
    Cycle(String),

    #[error("unknown event {0}")]
    UnknownEvent(String),

    #[error("recipe graph has no {0} event for the planner to route to")]
    MissingEntry(String),
}

/// A stage collaborator could not complete.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    #[error("no stage registered under {0}")]
    NotRegistered(String),

    #[error("{stage}: slices {indices:?} failed")]
    Units { stage: String, indices: Vec<usize> },

    #[error("{stage}: {message}")]
    Failed { stage: String, message: String },
}

impl StageError {
    pub fn failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReduxError>;
