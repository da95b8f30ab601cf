use super::*;
use std::fs;
use tempfile::TempDir;

mod integration_tests {
    use super::*;
    use crate::embeddings::FailurePolicy;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join(CONFIG_FILE);

        let original_config = Config {
            service: ServiceConfig {
                flavor: ApiFlavor::OpenAi,
                protocol: "https".to_string(),
                host: "api.openai.com".to_string(),
                port: 443,
                ..ServiceConfig::default()
            },
            embedding: EmbeddingConfig {
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
                failure_policy: FailurePolicy::Strict,
                ..EmbeddingConfig::default()
            },
            generation: GenerationConfig {
                model: "gpt-4o-mini".to_string(),
                top_k: 3,
            },
            ..Config::default()
        };

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn save_creates_config_directory() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_dir = temp_dir.path().join(".statute-rag");
        assert!(!config_dir.exists());

        let config = Config {
            base_dir: config_dir.clone(),
            ..Config::default()
        };
        config.save().expect("should save config");

        assert!(config_dir.is_dir());
        assert!(config_dir.join(CONFIG_FILE).exists());
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [service
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_failure_policy_is_rejected() {
        let result: Result<Config, toml::de::Error> =
            toml::from_str("[embedding]\nfailure_policy = \"retry-forever\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn default_dir_is_named_after_the_tool() {
        let dir = get_config_dir().expect("home directory is available");
        assert!(dir.ends_with(".statute-rag") || dir.ends_with("statute-rag"));
    }
}
