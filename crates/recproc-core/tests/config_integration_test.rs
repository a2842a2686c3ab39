//! Integration tests for the configuration-to-transformer pipeline
//!
//! Tests use temporary directories with real file fixtures to verify:
//! - Loading a config file or a directory containing one
//! - Resolution of relative script and binary paths
//! - Backend selection through `build_transformer`
//! - Construction-time failures surfacing as configuration errors

use std::sync::Arc;

use recproc_core::{
    BackendConfig, ErrorKind, NoopMetrics, TransformerConfig, build_transformer, codec,
};
use serde_json::json;
use tempfile::TempDir;

/// Create a project directory with a `scripts/` subdirectory.
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("scripts/lib")).unwrap();
    dir
}

// =============================================================================
// Script backend
// =============================================================================

#[tokio::test]
async fn test_script_pipeline_from_directory() {
    let dir = setup_project();

    std::fs::write(
        dir.path().join("recproc.yaml"),
        r#"
name: currency
backend:
  type: script
  libraries:
    - scripts/lib/rates.js
  main: scripts/main.js
  target: convert
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("scripts/lib/rates.js"),
        "var RATES = { EUR: 2, USD: 1 };",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("scripts/main.js"),
        r#"
function convert(input) {
    return JSON.parse(input).map(function (r) {
        r.usd = r.amount * RATES[r.currency];
        return r;
    });
}
"#,
    )
    .unwrap();

    let config = TransformerConfig::load(dir.path()).unwrap();
    assert_eq!(config.name, "currency");
    let BackendConfig::Script(script) = &config.backend else {
        panic!("expected script backend, got {}", config.backend.kind());
    };
    assert_eq!(script.main, dir.path().join("scripts/main.js"));
    assert_eq!(script.libraries, vec![dir.path().join("scripts/lib/rates.js")]);

    let transformer = build_transformer(&config, Arc::new(NoopMetrics)).unwrap();
    assert_eq!(transformer.name(), "currency");

    let output = transformer
        .transform(codec::from_value(json!([{"amount": 3, "currency": "EUR"}])).unwrap())
        .await
        .unwrap();
    assert_eq!(output.records()[0]["usd"].as_f64(), Some(6.0));
}

#[test]
fn test_script_with_missing_target_is_config_error() {
    let dir = setup_project();
    std::fs::write(
        dir.path().join("recproc.yaml"),
        "backend:\n  type: script\n  main: scripts/main.js\n  target: convert\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("scripts/main.js"),
        "function transform(input) { return input; }",
    )
    .unwrap();

    let config = TransformerConfig::load(dir.path().join("recproc.yaml")).unwrap();
    let err = build_transformer(&config, Arc::new(NoopMetrics))
        .err()
        .expect("construction should fail");
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("convert"));
}

// =============================================================================
// Process backend
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_process_pipeline_with_relative_working_dir() {
    let dir = setup_project();
    std::fs::write(
        dir.path().join("scripts/data.json"),
        r#"[{"source": "file"}]"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("recproc.yaml"),
        r#"
name: fixture
backend:
  type: process
  binary: sh
  args: ["-c", "cat >/dev/null; cat data.json"]
  working_dir: scripts
  timeout_ms: 5000
"#,
    )
    .unwrap();

    let config = TransformerConfig::load(dir.path()).unwrap();
    let BackendConfig::Process(process) = &config.backend else {
        panic!("expected process backend, got {}", config.backend.kind());
    };
    // Bare binary names stay as-is for PATH lookup.
    assert_eq!(process.binary, std::path::PathBuf::from("sh"));
    assert_eq!(process.working_dir, Some(dir.path().join("scripts")));

    let transformer = build_transformer(&config, Arc::new(NoopMetrics)).unwrap();
    let output = transformer
        .transform(codec::from_value(json!([{"ignored": true}])).unwrap())
        .await
        .unwrap();
    assert_eq!(output, codec::from_value(json!([{"source": "file"}])).unwrap());
}

#[tokio::test]
async fn test_process_with_missing_binary_fails_at_call_time() {
    let dir = setup_project();
    std::fs::write(
        dir.path().join("recproc.yaml"),
        "backend:\n  type: process\n  binary: ./bin/not-there\n",
    )
    .unwrap();

    let config = TransformerConfig::load(dir.path()).unwrap();
    let transformer = build_transformer(&config, Arc::new(NoopMetrics)).unwrap();
    let err = transformer
        .transform(codec::from_value(json!([])).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Launch);
}

// =============================================================================
// Error handling
// =============================================================================

#[test]
fn test_missing_config_file() {
    let dir = setup_project();
    let err = TransformerConfig::load(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("recproc.yaml"));
}

#[test]
fn test_malformed_yaml() {
    let dir = setup_project();
    std::fs::write(dir.path().join("recproc.yaml"), "backend: [not, a, map").unwrap();
    let err = TransformerConfig::load(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_default_timeout_applies() {
    let config =
        TransformerConfig::from_yaml("backend:\n  type: process\n  binary: cat\n").unwrap();
    let BackendConfig::Process(process) = &config.backend else {
        panic!("expected process backend");
    };
    assert_eq!(process.timeout(), std::time::Duration::from_secs(20));
    assert_eq!(config.name, "transformer");
}
