use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, warn};

use crate::error::{ReduxError, Result};

/// Why one unit of a fan-out produced no result.
#[derive(Clone, Debug, PartialEq)]
pub enum UnitFailure<E> {
    /// The worker returned an error.
    Failed(E),
    /// The worker panicked; siblings were unaffected.
    Panicked(String),
}

impl<E: fmt::Display> fmt::Display for UnitFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{e}"),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

/// Results of a fan-out, indexed exactly like the input units.
#[derive(Debug)]
pub struct FanIn<T, E> {
    results: Vec<std::result::Result<T, UnitFailure<E>>>,
}

impl<T, E> FanIn<T, E> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[std::result::Result<T, UnitFailure<E>>] {
        &self.results
    }

    pub fn into_results(self) -> Vec<std::result::Result<T, UnitFailure<E>>> {
        self.results
    }

    /// Indices of units that failed, ascending.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_err())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| r.is_ok())
    }

    /// All results in unit order, or the failed indices if any unit failed.
    pub fn into_all(self) -> Result<Vec<T>> {
        let failed = self.failed_indices();
        if !failed.is_empty() {
            return Err(ReduxError::UnitFailures { indices: failed });
        }
        Ok(self.results.into_iter().filter_map(|r| r.ok()).collect())
    }
}

/// Bounded fan-out / fan-in over independent units of one stage.
///
/// Units beyond the worker count wait in the pool's queue; the caller blocks
/// until every unit has finished.
#[derive(Clone, Default)]
pub struct ParallelRunner {
    pool: Option<Arc<ThreadPool>>,
}

impl fmt::Debug for ParallelRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelRunner")
            .field("workers", &self.workers())
            .finish()
    }
}

impl ParallelRunner {
    /// A runner with `workers` threads. Zero uses the global pool, sized to
    /// the available parallelism.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Ok(Self::default());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("redux-unit-{i}"))
            .build()
            .map_err(|e| ReduxError::WorkerPool(e.to_string()))?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    pub fn workers(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Run `worker` over every unit and return results in unit order.
    ///
    /// `worker` receives the unit index alongside the unit. A unit that
    /// errors or panics is reported at its index; units already running are
    /// left to finish.
    pub fn run<U, T, E, F>(&self, units: Vec<U>, worker: F) -> FanIn<T, E>
    where
        U: Send,
        T: Send,
        E: Send,
        F: Fn(usize, U) -> std::result::Result<T, E> + Send + Sync,
    {
        let count = units.len();
        let job = || -> Vec<_> {
            units
                .into_par_iter()
                .enumerate()
                .map(|(i, unit)| run_unit(&worker, i, unit))
                .collect()
        };
        let results = match &self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        };

        let fan_in = FanIn { results };
        let failed = fan_in.failed_indices();
        if failed.is_empty() {
            debug!(units = count, workers = self.workers(), "Fan-in complete");
        } else {
            warn!(units = count, failed = ?failed, "Fan-in complete with failed units");
        }
        fan_in
    }
}

fn run_unit<U, T, E, F>(worker: &F, index: usize, unit: U) -> std::result::Result<T, UnitFailure<E>>
where
    F: Fn(usize, U) -> std::result::Result<T, E>,
{
    match catch_unwind(AssertUnwindSafe(|| worker(index, unit))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(UnitFailure::Failed(e)),
        Err(payload) => Err(UnitFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
