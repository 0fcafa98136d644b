use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use redux_core::error::ReduxError;
use redux_core::parallel::{ParallelRunner, UnitFailure};

fn square(_: usize, x: u64) -> Result<u64, String> {
    Ok(x * x)
}

#[test]
fn test_results_in_unit_order() {
    let runner = ParallelRunner::new(4).unwrap();
    let units: Vec<u64> = (0..100).collect();
    let results = runner.run(units, square).into_all().unwrap();
    let expected: Vec<u64> = (0..100).map(|x| x * x).collect();
    assert_eq!(results, expected);
}

#[test]
fn test_same_result_for_any_worker_count() {
    let units: Vec<u64> = (0..37).collect();
    let sequential: Vec<u64> = units.iter().map(|&x| x * 3 + 1).collect();
    for workers in [1, 2, 5, 16] {
        let runner = ParallelRunner::new(workers).unwrap();
        let out = runner
            .run(units.clone(), |_, x| Ok::<_, String>(x * 3 + 1))
            .into_all()
            .unwrap();
        assert_eq!(out, sequential, "workers = {workers}");
    }
}

#[test]
fn test_index_matches_unit() {
    let runner = ParallelRunner::new(3).unwrap();
    let units: Vec<usize> = (0..20).collect();
    let fan_in = runner.run(units, |i, unit| {
        if i == unit {
            Ok(i)
        } else {
            Err(format!("index {i} got unit {unit}"))
        }
    });
    assert!(fan_in.is_complete());
    assert_eq!(fan_in.len(), 20);
}

#[test]
fn test_failures_reported_per_index() {
    let runner = ParallelRunner::new(4).unwrap();
    let units: Vec<u64> = (0..10).collect();
    let fan_in = runner.run(units, |_, x| if x % 4 == 1 { Err(format!("bad {x}")) } else { Ok(x) });

    assert_eq!(fan_in.failed_indices(), vec![1, 5, 9]);
    assert!(!fan_in.is_complete());
    assert_eq!(fan_in.results()[0], Ok(0));
    assert_eq!(fan_in.results()[5], Err(UnitFailure::Failed("bad 5".to_string())));

    match fan_in.into_all() {
        Err(ReduxError::UnitFailures { indices }) => assert_eq!(indices, vec![1, 5, 9]),
        other => panic!("expected unit failures, got {other:?}"),
    }
}

#[test]
fn test_panic_is_contained() {
    let runner = ParallelRunner::new(2).unwrap();
    let units: Vec<u64> = (0..6).collect();
    let fan_in = runner.run(units, |_, x| {
        if x == 3 {
            panic!("slice {x} exploded");
        }
        Ok::<_, String>(x)
    });
    assert_eq!(fan_in.failed_indices(), vec![3]);
    match &fan_in.results()[3] {
        Err(UnitFailure::Panicked(msg)) => assert!(msg.contains("exploded")),
        other => panic!("expected panic, got {other:?}"),
    }
    assert_eq!(fan_in.results()[4], Ok(4));
}

#[test]
fn test_bounded_concurrency() {
    let runner = ParallelRunner::new(2).unwrap();
    assert_eq!(runner.workers(), 2);
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let units: Vec<u32> = (0..12).collect();
    let fan_in = runner.run(units, |_, _| {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        active.fetch_sub(1, Ordering::SeqCst);
        Ok::<_, String>(())
    });
    assert!(fan_in.is_complete());
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[test]
fn test_empty_units() {
    let runner = ParallelRunner::default();
    let fan_in = runner.run(Vec::<u8>::new(), |_, x| Ok::<_, String>(x));
    assert!(fan_in.is_empty());
    assert!(fan_in.into_all().unwrap().is_empty());
}
