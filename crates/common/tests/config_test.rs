use grc_common::config::SystemConfig;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_load_from_toml() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");

    let config_content = r#"
[server]
host = "127.0.0.1"
port = 9090

[storage]
postgres_url = "postgresql://localhost/grc_test"
max_connections = 4

[llm]
model = "claude-3-5-haiku-latest"
max_tokens = 1024

[search]
endpoint = "https://search.example.com/v1/search"
max_results = 8

[security]
cron_secret = "0123456789abcdef-cron"

[telemetry]
log_level = "debug"
"#;

    fs::write(&config_path, config_content).unwrap();

    let config = SystemConfig::load(config_path.to_str().unwrap()).unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.storage.max_connections, 4);
    assert_eq!(config.llm.model, "claude-3-5-haiku-latest");
    assert_eq!(config.llm.timeout_secs, 120);
    assert_eq!(config.search.max_results, 8);
    assert_eq!(config.telemetry.log_level, "debug");
}

#[test]
fn test_empty_file_uses_defaults() {
    let config = SystemConfig::from_toml_str("").unwrap();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.search.max_results, 5);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_invalid_max_results() {
    let config = SystemConfig::from_toml_str(
        r#"
[search]
max_results = 0
"#,
    )
    .unwrap();

    let result = config.validate();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("search.max_results"));
}

#[test]
fn test_config_validation_short_secret() {
    let config = SystemConfig::from_toml_str(
        r#"
[security]
billing_secret = "short"
"#,
    )
    .unwrap();

    let result = config.validate();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("security.billing_secret"));
}

#[test]
fn test_missing_file_is_config_error() {
    let result = SystemConfig::load("/nonexistent/grc.toml");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("failed to read"));
}
