//! Integration tests for the complete Graphfold pipeline
//!
//! These tests verify end-to-end functionality from files on disk:
//! - JSON config → merged styles
//! - JSON fixtures → FixtureRunner → GraphEngine → dataset snapshot
//!
//! Run with: cargo test --test integration_tests

use graphfold_core::{
    EngineConfig, EventKind, FixtureRunner, FixtureSet, GraphEngine, GraphError, GraphEvent,
    LabelPolicy, LocalId,
};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const CONFIG: &str = r##"{
    "initial_query": "MATCH p=(:Person)-[:KNOWS]->(:Person) RETURN p",
    "label_policy": "first_configured",
    "labels": {
        "Person": { "caption": "name", "community": "team", "sizeCypher": "MATCH (n) WHERE id(n) = $id RETURN n.score" },
        "default": { "shape": "dot" }
    },
    "relationships": {
        "KNOWS": { "thickness": "weight", "caption": false },
        "default": { "color": "#888" }
    }
}"##;

const FIXTURES: &str = r#"{
    "queries": {
        "MATCH p=(:Person)-[:KNOWS]->(:Person) RETURN p": {
            "default": [
                [{ "path": {
                    "start": { "identity": 1, "labels": ["Employee", "Person"], "properties": { "name": "Ada", "team": 1 } },
                    "end":   { "identity": 2, "labels": ["Person"], "properties": { "name": "Brian", "team": 2 } },
                    "segments": [{
                        "start": { "identity": 1, "labels": ["Employee", "Person"], "properties": { "name": "Ada", "team": 1 } },
                        "relationship": { "identity": 10, "start": 1, "end": 2, "type": "KNOWS", "properties": { "weight": 3 } },
                        "end":   { "identity": 2, "labels": ["Person"], "properties": { "name": "Brian", "team": 2 } }
                    }]
                }}],
                [{ "node": { "identity": 3, "labels": ["Robot"], "properties": {} } }]
            ]
        },
        "MATCH (n) WHERE id(n) = $id RETURN n.score": {
            "by_identity": {
                "1": [[{ "scalar": 7 }]],
                "2": [[{ "scalar": null }]]
            }
        }
    }
}"#;

fn write_inputs() -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    let fixtures = dir.path().join("fixtures.json");
    std::fs::write(&config, CONFIG).unwrap();
    std::fs::write(&fixtures, FIXTURES).unwrap();
    (dir, config, fixtures)
}

// ============================================================================
// Config → engine → dataset
// ============================================================================

#[tokio::test]
async fn test_render_from_files() {
    let (_dir, config_path, fixture_path) = write_inputs();
    let config = EngineConfig::from_path(&config_path).unwrap();
    assert_eq!(config.label_policy, LabelPolicy::FirstConfigured);
    assert_eq!(config.query_limit, 30);

    let runner = Arc::new(FixtureRunner::new(FixtureSet::from_path(&fixture_path).unwrap()));
    let mut engine = GraphEngine::new(config, runner.clone()).unwrap();

    let completions = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&completions);
    engine.on(
        EventKind::Completion,
        Box::new(move |_| *counter.lock().unwrap() += 1),
    );

    let summary = engine.render().await.unwrap();
    assert_eq!(*completions.lock().unwrap(), 1);
    assert_eq!(summary.record_count, 2);
    assert_eq!(summary.node_count, 3);
    assert_eq!(summary.edge_count, 1);
    assert_eq!(summary.enrichments_issued, 2);
    assert_eq!(runner.call_count(), 3);

    let snapshot = engine.dataset().read().snapshot();

    // "Employee" has no entry, so the configured "Person" label decides
    let ada = &snapshot.nodes[0];
    assert_eq!(ada.local_id, LocalId::new(1));
    assert_eq!(ada.caption, "Ada");
    assert_eq!(ada.group, Some(serde_json::json!(1)));
    assert_eq!(ada.value, Some(7.0));
    assert_eq!(ada.style.get("shape"), Some(&serde_json::json!("dot")));

    // size query returned null: no value
    assert_eq!(snapshot.nodes[1].value, None);

    let robot = &snapshot.nodes[2];
    assert_eq!(robot.caption, "Robot");
    assert_eq!(robot.value, Some(1.0));
    assert_eq!(robot.group, None);

    let knows = &snapshot.edges[0];
    assert_eq!(knows.caption, "");
    assert_eq!(knows.value, 3.0);
    assert_eq!((knows.source, knows.target), (LocalId::new(1), LocalId::new(2)));
    assert_eq!(knows.style.get("color"), Some(&serde_json::json!("#888")));
    assert!(knows.title.contains("<strong>weight:</strong> 3<br>"));
}

#[tokio::test]
async fn test_snapshot_serializes_for_renderers() {
    let (_dir, config_path, fixture_path) = write_inputs();
    let config = EngineConfig::from_path(&config_path).unwrap();
    let runner = Arc::new(FixtureRunner::new(FixtureSet::from_path(&fixture_path).unwrap()));
    let mut engine = GraphEngine::new(config, runner).unwrap();
    engine.render().await.unwrap();

    let json = serde_json::to_value(engine.dataset().read().snapshot()).unwrap();
    assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(json["edges"][0]["type"], "KNOWS");
}

#[tokio::test]
async fn test_missing_fixture_query_reports_error_event() {
    let (_dir, config_path, _) = write_inputs();
    let config = EngineConfig::from_path(&config_path).unwrap();
    let mut engine = GraphEngine::new(config, Arc::new(FixtureRunner::new(FixtureSet::new()))).unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    engine.on(
        EventKind::Error,
        Box::new(move |event| {
            if let GraphEvent::Error { message, .. } = event {
                sink.lock().unwrap().push(message.clone());
            }
        }),
    );

    let err = engine.render().await.unwrap_err();
    assert!(matches!(err, GraphError::Ingestion(_)));
    assert_eq!(errors.lock().unwrap().len(), 1);
}

#[test]
fn test_invalid_config_file_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        EngineConfig::from_path(&path),
        Err(GraphError::Configuration { .. })
    ));
    assert!(matches!(
        EngineConfig::from_path(dir.path().join("missing.json")),
        Err(GraphError::Io(_))
    ));
}
