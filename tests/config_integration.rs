//! Configuration Integration Tests
//!
//! Loads config files from disk and checks environment overrides.

use phaseflow::core::{Config, ConfigError, API_URL_ENV};
use phaseflow::workflow::PhaseKind;
use serial_test::serial;
use tempfile::TempDir;

fn write(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("phaseflow.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_load_explicit_file() {
    std::env::remove_var(API_URL_ENV);
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        r#"
[api]
base_url = "https://pm.example.com/api"
timeout_secs = 10

[notifications]
console = false
fallback_message = "The workflow service is busy."
"#,
    );

    let config = Config::load_with(Some(path.as_path())).unwrap();
    assert_eq!(config.api.base_url, "https://pm.example.com/api");
    assert_eq!(config.api.timeout_secs, 10);
    assert!(!config.notifications.console);
    assert_eq!(config.coordinator_options().fallback_message, "The workflow service is busy.");
    assert_eq!(config.phase_chain().unwrap().len(), 4);
}

#[test]
#[serial]
fn test_env_overrides_base_url() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "[api]\nbase_url = \"http://localhost:5000/api\"\n");

    std::env::set_var(API_URL_ENV, "https://staging.example.com/api");
    let config = Config::load_with(Some(path.as_path()));
    std::env::remove_var(API_URL_ENV);

    assert_eq!(config.unwrap().api.base_url, "https://staging.example.com/api");
}

#[test]
#[serial]
fn test_token_read_from_configured_env() {
    std::env::remove_var(API_URL_ENV);
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "[api]\ntoken_env = \"PHASEFLOW_TEST_TOKEN\"\n");

    std::env::set_var("PHASEFLOW_TEST_TOKEN", "abc123");
    let config = Config::load_with(Some(path.as_path())).unwrap();
    let token = config.api_token();
    std::env::remove_var("PHASEFLOW_TEST_TOKEN");

    assert_eq!(token.as_deref(), Some("abc123"));
    assert!(config.gateway().is_ok());
}

#[test]
#[serial]
fn test_custom_chain_from_file() {
    std::env::remove_var(API_URL_ENV);
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        r#"
[[workflow.phases]]
id = "discovery"
label = "Discovery"
kind = "ui-ux"

[[workflow.phases]]
id = "qa"
label = "QA"
kind = "testing"

[[workflow.phases]]
id = "handover"
label = "Handover"
kind = "completion"
"#,
    );

    let chain = Config::load_with(Some(path.as_path())).unwrap().phase_chain().unwrap();
    let ids: Vec<&str> = chain.phases().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["discovery", "qa", "handover"]);
    assert_eq!(chain.get(&"qa".into()).unwrap().kind, PhaseKind::Testing);
}

#[test]
#[serial]
fn test_invalid_chain_rejected_on_load() {
    std::env::remove_var(API_URL_ENV);
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        r#"
[[workflow.phases]]
id = "Design Phase"
label = "Design"
kind = "ui-ux"
"#,
    );

    let err = Config::load_with(Some(path.as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::Phases(_)));
}

#[test]
#[serial]
fn test_malformed_toml_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "[api\nbase_url = ");
    assert!(matches!(Config::load_with(Some(path.as_path())), Err(ConfigError::Parse(_))));
}
