#[allow(dead_code)]
mod common;

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::{Array2, ArrayView2};

use redux_core::classify::classify;
use redux_core::error::StageError;
use redux_core::flags::QualityFlag;
use redux_core::frame::{Frame, FrameType};
use redux_core::ledger::{Ledger, LedgerView, MemoryLedger, Record};
use redux_core::parallel::ParallelRunner;
use redux_core::pipeline::{ReduxConfig, RecipeGraph, StageParams};
use redux_core::stages::make_cube::partition_columns;
use redux_core::stages::{
    CopySlice, FlagStage, MakeCube, Passthrough, SaturationCheck, SliceProduct, SliceWarp, Stage,
    StageContext, StageOutcome, StackGate, StageRegistry,
};

fn ctx<'a>(event: &'a str, ledger: &'a dyn Ledger, runner: &'a ParallelRunner) -> StageContext<'a> {
    StageContext {
        event,
        ledger: LedgerView::new(ledger),
        runner,
    }
}

fn completed(result: Result<StageOutcome, StageError>) -> Frame {
    match result.unwrap() {
        StageOutcome::Completed(frame) => frame,
        StageOutcome::Deferred { reason, .. } => panic!("unexpected deferral: {reason}"),
    }
}

fn classified(mut frame: Frame) -> Frame {
    frame.info = classify(&frame).unwrap();
    frame
}

// ---------------------------------------------------------------------------
// Stack gate
// ---------------------------------------------------------------------------

#[test]
fn test_stack_gate_threshold() {
    let ledger = MemoryLedger::new();
    let runner = ParallelRunner::default();
    let gate = StackGate::new(Arc::new(Passthrough::new("MakeMasterDark")));
    let params = StageParams {
        groupid: Some("D1".into()),
        want_type: Some(FrameType::Dark),
        min_files: Some(3),
        ..StageParams::default()
    };

    for (i, name) in ["d1", "d2", "d3"].into_iter().enumerate() {
        ledger
            .append(Record::new(name, FrameType::Dark, "D1", "process_dark", "int"))
            .unwrap();
        let frame = classified(common::frame(name, "DARK", "D1"));
        let outcome = gate
            .run(frame, &params, &ctx("dark_make_master", &ledger, &runner))
            .unwrap();
        match outcome {
            StageOutcome::Deferred { reason, .. } => {
                assert!(i < 2, "{name} should have built the stack");
                assert!(reason.contains(&format!("{} of 3", i + 1)), "{reason}");
            }
            StageOutcome::Completed(_) => assert_eq!(i, 2),
        }
    }
}

#[test]
fn test_stack_gate_falls_back_to_frame_info() {
    let ledger = MemoryLedger::from_records([Record::new("t", FrameType::TwiFlat, "T1", "process_flat", "int")]);
    let runner = ParallelRunner::default();
    let gate = StackGate::new(Arc::new(Passthrough::new("StackFlats")));
    let frame = classified(common::frame("t", "TWIFLAT", "T1"));
    let frame = completed(gate.run(frame, &StageParams::default(), &ctx("flat_make_stack", &ledger, &runner)));
    assert_eq!(frame.name, "t");
    assert_eq!(gate.name(), "StackFlats");
}

#[test]
fn test_stack_gate_without_type_fails() {
    let ledger = MemoryLedger::new();
    let runner = ParallelRunner::default();
    let gate = StackGate::new(Arc::new(Passthrough::new("MakeMasterBias")));
    let frame = common::frame("b", "BIAS", "B1");
    let err = gate
        .run(frame, &StageParams::default(), &ctx("bias_make_master", &ledger, &runner))
        .unwrap_err();
    assert!(matches!(err, StageError::Failed { .. }));
}

// ---------------------------------------------------------------------------
// Flagging stages
// ---------------------------------------------------------------------------

#[test]
fn test_saturation_check() {
    let ledger = MemoryLedger::new();
    let runner = ParallelRunner::default();
    let mut data = Array2::<f32>::zeros((4, 4));
    data[[1, 2]] = 70_000.0;
    data[[3, 0]] = 65_535.0;
    let frame = Frame::new("o", data, common::header("OBJECT", "O1"));

    let stage = SaturationCheck::new("ProcessObject", 65_535.0);
    let frame = completed(stage.run(frame, &StageParams::default(), &ctx("process_object", &ledger, &runner)));
    assert_eq!(frame.flags.get(1, 2), 1);
    assert_eq!(frame.flags.get(3, 0), 1);
    assert_eq!(frame.flags.flagged_count(), 2);
    assert_eq!(frame.header.get("NSATPIX").and_then(|v| v.as_i64()), Some(2));
}

#[test]
fn test_flag_stage_accumulates_on_saturation() {
    let ledger = MemoryLedger::new();
    let runner = ParallelRunner::default();
    let mut data = Array2::<f32>::zeros((3, 3));
    data[[0, 0]] = 1.0e6;
    let frame = Frame::new("o", data, common::header("OBJECT", "O1"));

    let saturation = SaturationCheck::new("ProcessObject", 65_535.0);
    let defects = FlagStage::new("CorrectDefects", QualityFlag::Defect, |frame, _| {
        Ok(Array2::from_shape_fn(frame.data.dim(), |(r, _)| r == 0))
    });
    let params = StageParams::default();
    let context = ctx("object_correct_defects", &ledger, &runner);
    let frame = completed(saturation.run(frame, &params, &context));
    let before = frame.flags.clone();
    let frame = completed(defects.run(frame, &params, &context));

    assert!(frame.flags.dominates(&before));
    assert_eq!(frame.flags.get(0, 0), 3);
    assert_eq!(frame.flags.get(0, 1), 2);
    assert_eq!(frame.flags.get(1, 1), 0);
}

#[test]
fn test_flag_stage_shape_mismatch() {
    let ledger = MemoryLedger::new();
    let runner = ParallelRunner::default();
    let frame = Frame::new("o", Array2::zeros((3, 3)), common::header("OBJECT", "O1"));
    let stage = FlagStage::new("RemoveCosmicRays", QualityFlag::CosmicRay, |_, _| {
        Ok(Array2::from_elem((2, 2), true))
    });
    let err = stage
        .run(frame, &StageParams::default(), &ctx("object_remove_crs", &ledger, &runner))
        .unwrap_err();
    assert!(matches!(err, StageError::Failed { ref stage, .. } if stage == "RemoveCosmicRays"));
}

// ---------------------------------------------------------------------------
// Cube building
// ---------------------------------------------------------------------------

#[test]
fn test_partition_columns() {
    let parts = partition_columns(10, 3);
    assert_eq!(parts, [0..4, 4..7, 7..10]);
    assert_eq!(partition_columns(24, 24).len(), 24);
    assert!(partition_columns(5, 6).is_empty());
    assert!(partition_columns(5, 0).is_empty());
}

fn arcs() -> MemoryLedger {
    MemoryLedger::from_records([
        Record::new("arc_a", FrameType::ArcLamp, "G1", "arcs_generate_maps", "wavemap").with_mjd(Some(60000.0)),
        Record::new("arc_b", FrameType::ArcLamp, "G2", "arcs_generate_maps", "wavemap").with_mjd(Some(60001.0)),
    ])
}

#[test]
fn test_make_cube_slices_in_order() {
    let ledger = arcs();
    let runner = ParallelRunner::new(4).unwrap();
    let mut frame = classified(common::object("o", "O1", (4, 48)));
    frame.flags.mark(QualityFlag::CosmicRay, 2, 9);

    let stage = MakeCube::new("MakeCube", 24, Arc::new(CopySlice));
    let frame = completed(stage.run(frame, &StageParams::default(), &ctx("object_make_cube", &ledger, &runner)));

    let cube = frame.cube.as_ref().unwrap();
    assert_eq!(cube.data.dim(), (4, 2, 24));
    assert_eq!(cube.slices(), 24);
    for i in 0..24 {
        for r in 0..4 {
            assert_eq!(cube.data[[r, 0, i]], frame.data[[r, 2 * i]]);
            assert_eq!(cube.data[[r, 1, i]], frame.data[[r, 2 * i + 1]]);
        }
    }
    // Column 9 is the second column of slice 4.
    assert_eq!(cube.flags[[2, 1, 4]], 4);
    // MJD 60000.5 ties between the arcs; the later row wins.
    assert_eq!(cube.geometry_from, "arc_b");
    assert_eq!(frame.header.get_bool("GEOMCOR"), Some(true));
    assert_eq!(frame.header.get_string("GEOMFL").as_deref(), Some("arc_b"));
}

#[test]
fn test_make_cube_uneven_width_pads() {
    let ledger = arcs();
    let runner = ParallelRunner::new(2).unwrap();
    let frame = classified(common::object("o", "O1", (2, 50)));
    let stage = MakeCube::new("MakeCube", 24, Arc::new(CopySlice));
    let frame = completed(stage.run(frame, &StageParams::default(), &ctx("object_make_cube", &ledger, &runner)));

    let cube = frame.cube.unwrap();
    assert_eq!(cube.data.dim(), (2, 3, 24));
    // Slices 0 and 1 take the two leftover columns.
    assert_eq!(cube.data[[1, 2, 1]], frame.data[[1, 5]]);
    assert_eq!(cube.data[[1, 2, 2]], 0.0);
}

#[test]
fn test_make_cube_without_geometry() {
    let ledger = MemoryLedger::new();
    let runner = ParallelRunner::default();
    let frame = classified(common::object("o", "O1", (2, 48)));
    let stage = MakeCube::new("MakeCube", 24, Arc::new(CopySlice));
    let frame = completed(stage.run(frame, &StageParams::default(), &ctx("object_make_cube", &ledger, &runner)));
    assert!(frame.cube.is_none());
    assert_eq!(frame.header.get_bool("GEOMCOR"), Some(false));
}

#[test]
fn test_make_cube_uses_arc_from_same_camera() {
    let ledger = MemoryLedger::from_records([
        Record::new("arc_blue", FrameType::ArcLamp, "G1", "arcs_generate_maps", "wavemap")
            .with_mjd(Some(59990.0))
            .with_camera(Some("BLUE".into())),
        Record::new("arc_red", FrameType::ArcLamp, "G2", "arcs_generate_maps", "wavemap")
            .with_mjd(Some(60000.5))
            .with_camera(Some("RED".into())),
    ]);
    let runner = ParallelRunner::default();
    let frame = classified(common::object("o", "O1", (2, 48)));
    let stage = MakeCube::new("MakeCube", 24, Arc::new(CopySlice));
    let frame = completed(stage.run(frame, &StageParams::default(), &ctx("object_make_cube", &ledger, &runner)));
    assert_eq!(frame.cube.unwrap().geometry_from, "arc_blue");
}

#[test]
fn test_make_cube_header_only_frame() {
    let ledger = arcs();
    let runner = ParallelRunner::default();
    let frame = classified(common::frame("o", "OBJECT", "O1"));
    let stage = MakeCube::new("MakeCube", 24, Arc::new(CopySlice));
    let frame = completed(stage.run(frame, &StageParams::default(), &ctx("object_make_cube", &ledger, &runner)));
    assert!(frame.cube.is_none());
    assert_eq!(frame.header.get_bool("GEOMCOR"), Some(false));
}

#[test]
fn test_make_cube_too_narrow() {
    let ledger = arcs();
    let runner = ParallelRunner::default();
    let frame = classified(common::object("o", "O1", (2, 10)));
    let stage = MakeCube::new("MakeCube", 24, Arc::new(CopySlice));
    let err = stage
        .run(frame, &StageParams::default(), &ctx("object_make_cube", &ledger, &runner))
        .unwrap_err();
    assert!(matches!(err, StageError::Failed { .. }));
}

struct FailingSlice(usize);

impl SliceWarp for FailingSlice {
    fn warp(
        &self,
        index: usize,
        data: ArrayView2<'_, f32>,
        flags: ArrayView2<'_, u8>,
        out_shape: (usize, usize),
        geometry: &Record,
    ) -> Result<SliceProduct, String> {
        if index == self.0 {
            return Err(format!("slice {index} off the detector"));
        }
        CopySlice.warp(index, data, flags, out_shape, geometry)
    }
}

#[test]
fn test_make_cube_reports_failed_slice() {
    let ledger = arcs();
    let runner = ParallelRunner::new(3).unwrap();
    let frame = classified(common::object("o", "O1", (2, 48)));
    let stage = MakeCube::new("MakeCube", 24, Arc::new(FailingSlice(5)));
    let err = stage
        .run(frame, &StageParams::default(), &ctx("object_make_cube", &ledger, &runner))
        .unwrap_err();
    assert_eq!(
        err,
        StageError::Units {
            stage: "MakeCube".into(),
            indices: vec![5],
        }
    );
}

struct ScaledSlice;

impl SliceWarp for ScaledSlice {
    fn warp(
        &self,
        index: usize,
        data: ArrayView2<'_, f32>,
        flags: ArrayView2<'_, u8>,
        out_shape: (usize, usize),
        geometry: &Record,
    ) -> Result<SliceProduct, String> {
        let mut product = CopySlice.warp(index, data, flags, out_shape, geometry)?;
        product.data.mapv_inplace(|v| v * 2.0);
        Ok(product)
    }
}

#[test]
fn test_make_cube_same_for_any_worker_count() {
    let ledger = arcs();
    let stage = MakeCube::new("MakeCube", 8, Arc::new(ScaledSlice));
    let build = |workers| {
        let runner = ParallelRunner::new(workers).unwrap();
        let frame = classified(common::object("o", "O1", (5, 40)));
        completed(stage.run(frame, &StageParams::default(), &ctx("object_make_cube", &ledger, &runner)))
            .cube
            .unwrap()
            .data
    };
    let reference = build(1);
    assert_abs_diff_eq!(reference[[4, 0, 7]], 2.0 * (35.0 + 4000.0));
    for workers in [2, 3, 8] {
        assert_eq!(build(workers), reference);
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn test_registry_covers_graph() {
    let config = ReduxConfig::default();
    let graph = RecipeGraph::standard();
    let registry = StageRegistry::with_builtins(&graph, &config);
    for name in graph.stage_names() {
        if name == "action_planner" {
            assert!(!registry.contains(name));
        } else {
            assert!(registry.get(name).is_ok(), "{name} missing");
        }
    }
}

#[test]
fn test_registry_unknown_stage() {
    let registry = StageRegistry::new();
    assert_eq!(
        registry.get("SolveArcs").err(),
        Some(StageError::NotRegistered("SolveArcs".into()))
    );
}
