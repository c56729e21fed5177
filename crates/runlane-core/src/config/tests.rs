//! Tests for configuration loading, overrides and validation

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::core_types::BackendKind;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn clear_env() {
        env::remove_var(ENV_POLL_INTERVAL_MS);
        env::remove_var(ENV_DEFAULT_TIMEOUT_MS);
        env::remove_var(ENV_LOG_LEVEL);
    }

    #[test]
    #[serial]
    fn test_empty_document_yields_defaults() {
        clear_env();
        let config = ConfigLoader::from_yaml_str("").unwrap();

        assert_eq!(config.lifecycle.poll_interval_ms, 5_000);
        assert_eq!(config.defaults.timeout_ms, 30_000);
        assert!(config.orchestrator.unwired_fallback_to_local);
        assert!(config.backends.is_enabled(BackendKind::Microsandbox));
        assert_eq!(config.local.runtimes.python, vec!["python3".to_string()]);
        assert_eq!(
            config.backends.descriptor(BackendKind::BatchCluster).max_single_run_ms,
            3_600_000
        );
    }

    #[test]
    #[serial]
    fn test_yaml_sections_override_defaults() {
        clear_env();
        let yaml = r#"
lifecycle:
  poll_interval_ms: 250
orchestrator:
  unwired_fallback_to_local: false
backends:
  microsandbox:
    enabled: false
  local_process:
    max_single_run_ms: 1500
local:
  runtimes:
    python: ["/usr/bin/python3", "-u"]
logging:
  level: debug
"#;
        let config = ConfigLoader::from_yaml_str(yaml).unwrap();

        assert_eq!(config.lifecycle.poll_interval_ms, 250);
        assert!(!config.orchestrator.unwired_fallback_to_local);
        assert!(!config.backends.is_enabled(BackendKind::Microsandbox));
        assert_eq!(
            config.backends.descriptor(BackendKind::LocalProcess).max_single_run_ms,
            1_500
        );
        assert_eq!(config.local.runtimes.python[1], "-u");
        assert_eq!(config.local.runtimes.bash, vec!["bash".to_string()]);
        assert_eq!(config.logging.level_filter().unwrap(), log::LevelFilter::Debug);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file_values() {
        clear_env();
        env::set_var(ENV_POLL_INTERVAL_MS, "100");
        env::set_var(ENV_LOG_LEVEL, "warn");

        let config = ConfigLoader::from_yaml_str("lifecycle:\n  poll_interval_ms: 9000\n").unwrap();
        clear_env();

        assert_eq!(config.lifecycle.poll_interval_ms, 100);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    #[serial]
    fn test_invalid_environment_value_is_rejected() {
        clear_env();
        env::set_var(ENV_DEFAULT_TIMEOUT_MS, "soon");
        let result = ConfigLoader::from_yaml_str("");
        clear_env();

        assert!(matches!(result, Err(RunlaneError::ConfigError(_))));
    }

    #[test]
    #[serial]
    fn test_validation_rejects_bad_values() {
        clear_env();
        assert!(ConfigLoader::from_yaml_str("lifecycle:\n  poll_interval_ms: 0\n").is_err());
        assert!(ConfigLoader::from_yaml_str("local:\n  runtimes:\n    bash: []\n").is_err());
        assert!(ConfigLoader::from_yaml_str("logging:\n  level: chatty\n").is_err());
        assert!(ConfigLoader::from_yaml_str(
            "backends:\n  wasm_sandbox:\n    max_single_run_ms: 0\n"
        )
        .is_err());
    }

    #[tokio::test]
    #[serial]
    async fn test_load_config_from_file() {
        clear_env();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "defaults:\n  timeout_ms: 4200").unwrap();

        let config = load_config(file.path()).await.unwrap();
        assert_eq!(config.defaults.timeout_ms, 4_200);
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_file_is_config_error() {
        let result = load_config("/definitely/not/here/runlane.yaml").await;
        assert!(matches!(result, Err(RunlaneError::ConfigError(_))));
    }

    #[test]
    fn test_builder_validates() {
        let built = config()
            .poll_interval_ms(10)
            .disable_backend(BackendKind::BatchCluster)
            .max_single_run_ms(BackendKind::Microsandbox, 5_000)
            .build()
            .unwrap();

        assert_eq!(built.lifecycle.poll_interval_ms, 10);
        assert!(!built.backends.is_enabled(BackendKind::BatchCluster));
        assert_eq!(
            built.backends.descriptor(BackendKind::Microsandbox).max_single_run_ms,
            5_000
        );

        assert!(config().poll_interval_ms(0).build().is_err());
    }
}
