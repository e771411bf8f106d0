use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let original_config = Config {
            provider: ProviderConfig {
                base_url: "https://llm.plant.local/v1/".to_string(),
                embedding_model: "bge-m3".to_string(),
                embedding_dimension: 1024,
                chat_model: "qwen2.5".to_string(),
                batch_size: 32,
                ..ProviderConfig::default()
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
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [provider
            base_url = "http://localhost"
            batch_size = "many"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let invalid_toml = r#"
            [retrieval]
            top_k = "three"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn complete_valid_config() {
        let valid_toml = r#"
            [provider]
            base_url = "https://open.bigmodel.cn/api/paas/v4/"
            api_key_env = "ZHIPU_API_KEY"
            embedding_model = "embedding-2"
            embedding_dimension = 1024
            chat_model = "glm-4-flash"
            temperature = 0.1
            batch_size = 16
            timeout_seconds = 60
            retry_attempts = 2

            [chunking]
            chunk_size = 400
            chunk_overlap = 40

            [retrieval]
            top_k = 4
            collection_name = "line_3_manuals"
            max_document_chars = 100000

            [console]
            robot_count = 3
        "#;

        let config: Config = toml::from_str(valid_toml).expect("should parse toml successfully");
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.timeout_seconds, 60);
        assert_eq!(config.provider.retry_attempts, 2);
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.retrieval.collection_name, "line_3_manuals");
        assert_eq!(config.console.robot_count, 3);
    }

    #[test]
    fn config_dir_override() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let dir = get_config_dir(Some(temp_dir.path())).expect("override should resolve");
        assert_eq!(dir, temp_dir.path());
    }

    #[test]
    fn error_display_messages() {
        let errors = vec![
            ConfigError::InvalidProtocol("ftp".to_string()),
            ConfigError::InvalidBatchSize(0),
            ConfigError::InvalidModel(String::new()),
            ConfigError::InvalidUrl("invalid-url".to_string()),
            ConfigError::OverlapTooLarge(60, 50),
            ConfigError::MissingApiKey("ZHIPU_API_KEY".to_string()),
        ];

        for error in errors {
            let message = format!("{error}");
            assert!(!message.is_empty());
            assert!(message.len() > 10);
        }
    }
}
