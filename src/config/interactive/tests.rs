use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn load_existing_config_defaults_when_missing() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config(temp_dir.path()).expect("config loaded successfully");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert!(!config.service.host.is_empty());
    assert!(config.service.port > 0);
    assert!(!config.embedding.model.is_empty());
    assert!(config.generation.top_k > 0);
}

#[test]
fn load_existing_config_falls_back_on_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(
        temp_dir.path().join(super::super::CONFIG_FILE),
        "[generation]\ntop_k = 0\n",
    )
    .expect("should write config");

    let config = load_existing_config(temp_dir.path()).expect("falls back to defaults");
    assert_eq!(config.generation.top_k, 3);
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn load_existing_config_reads_saved_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("should load defaults");
    config.embedding.dimension = 1536;
    config.save().expect("should save config");

    let loaded = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(loaded.embedding.dimension, 1536);
}

#[test]
#[serial]
fn describe_config_lists_every_section() {
    console::set_colors_enabled(false);
    let config = Config {
        base_dir: std::path::PathBuf::from("/tmp/statute-rag"),
        ..Config::default()
    };

    let description = describe_config(&config);

    assert!(description.contains("Flavor: ollama"));
    assert!(description.contains("URL: http://localhost:11434/"));
    assert!(description.contains("Failure policy: zero-vector"));
    assert!(description.contains("Top k: 3"));
    assert!(description.contains("Max length: 1000 words"));
    assert!(description.contains("Data directory: /tmp/statute-rag/data"));
}

#[test]
#[serial]
fn describe_config_never_prints_the_key() {
    let config = Config {
        service: ServiceConfig {
            api_key: Some("sk-do-not-print".to_string()),
            ..ServiceConfig::default()
        },
        ..Config::default()
    };

    assert!(!describe_config(&config).contains("sk-do-not-print"));
}
