use std::sync::Arc;

use redux_core::error::{RecipeError, ReduxError};
use redux_core::frame::{FrameType, ProductType};
use redux_core::ledger::MemoryLedger;
use redux_core::pipeline::{Pipeline, RecipeGraph, ReduxConfig};

#[test]
fn test_defaults() {
    let config = ReduxConfig::default();
    assert!(!config.instrument.clobber);
    assert_eq!(config.instrument.min_nframes(FrameType::Bias), 7);
    assert_eq!(config.instrument.min_nframes(FrameType::Dark), 3);
    assert_eq!(config.instrument.min_nframes(FrameType::ContBars), 1);
    assert_eq!(config.instrument.min_nframes(FrameType::FlatLamp), 6);
    assert_eq!(config.instrument.min_nframes(FrameType::DomeFlat), 3);
    assert_eq!(config.instrument.min_nframes(FrameType::TwiFlat), 1);
    assert_eq!(config.instrument.min_nframes(FrameType::ArcLamp), 1);
    assert_eq!(config.instrument.min_nframes(FrameType::Object), 1);
    assert_eq!(config.instrument.output_directory, "redux");
    assert_eq!(config.instrument.saturation_level, 65_535.0);
    assert_eq!(config.object.new_type, ProductType::Mobj);
    assert_eq!(config.parallel.cube_slices, 24);
    assert_eq!(config.ledger.path.to_str(), Some("redux/redux.proc"));
    assert!(config.recipe.is_none());
}

#[test]
fn test_empty_toml_is_default() {
    let config: ReduxConfig = toml::from_str("").unwrap();
    assert_eq!(config.instrument.bias_min_nframes, 7);
    assert_eq!(config.recipe_graph(), RecipeGraph::standard());
}

#[test]
fn test_partial_toml() {
    let config: ReduxConfig = toml::from_str(
        r#"
        [instrument]
        clobber = true
        flat_min_nframes = 2

        [object]
        new_type = "SKY"

        [parallel]
        workers = 3
        "#,
    )
    .unwrap();
    assert!(config.instrument.clobber);
    assert_eq!(config.instrument.flat_min_nframes, 2);
    assert_eq!(config.instrument.bias_min_nframes, 7);
    assert_eq!(config.object.new_type, ProductType::Sky);
    assert_eq!(config.parallel.workers, 3);
    assert_eq!(config.parallel.cube_slices, 24);
}

#[test]
fn test_custom_recipe() {
    let config: ReduxConfig = toml::from_str(
        r#"
        [recipe.process_dark]
        stage = "ProcessDark"
        next = "dark_make_master"
        suffix = "int"

        [recipe.dark_make_master]
        stage = "MakeMasterDark"
        stack = true
        "#,
    )
    .unwrap();
    let graph = config.recipe_graph();
    assert_eq!(graph.len(), 2);
    graph.validate().unwrap();
    let master = graph.step("dark_make_master").unwrap();
    assert!(master.stack);
    assert!(master.record);
}

#[test]
fn test_recipe_without_planner_entry_is_rejected() {
    let standard = RecipeGraph::standard();
    let graph = RecipeGraph::from_steps(
        standard
            .iter()
            .filter(|(event, _)| *event != "noop")
            .map(|(event, step)| (event.to_string(), step.clone())),
    )
    .unwrap();
    let config = ReduxConfig {
        recipe: Some(graph),
        ..ReduxConfig::default()
    };

    match Pipeline::new(config, Arc::new(MemoryLedger::new())) {
        Err(ReduxError::Recipe(RecipeError::MissingEntry(event))) => assert_eq!(event, "noop"),
        other => panic!("expected missing entry, got {:?}", other.err()),
    }
}

#[test]
fn test_zero_cube_slices_is_rejected() {
    let mut config = ReduxConfig::default();
    config.parallel.cube_slices = 0;
    assert!(matches!(config.validate(), Err(ReduxError::Config(_))));
    assert!(matches!(
        Pipeline::new(config, Arc::new(MemoryLedger::new())),
        Err(ReduxError::Config(_))
    ));
}

#[test]
fn test_round_trip() {
    let mut config = ReduxConfig::default();
    config.instrument.dark_min_nframes = 5;
    config.parallel.frame_workers = 4;
    let text = toml::to_string_pretty(&config).unwrap();
    let back: ReduxConfig = toml::from_str(&text).unwrap();
    assert_eq!(back.instrument.dark_min_nframes, 5);
    assert_eq!(back.parallel.frame_workers, 4);
}
