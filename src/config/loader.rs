//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into an [`OptimizerConfig`], and run
//! validation before returning. This is the entry point for loading
//! optimizer configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::OptimizerConfig;

/// Load an [`OptimizerConfig`] from a TOML file.
///
/// # Errors
///
/// - `ConfigError::Io` if the file cannot be read.
/// - `ConfigError::Parse` if the TOML is malformed.
/// - `ConfigError::Validation` if semantic constraints are violated.
///
/// # Example
///
/// ```rust,ignore
/// use interface_optimizer::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("optimizer.toml"))?;
/// println!("capacity: {}", config.transform.qubit_capacity);
/// ```
pub fn load_from_file(path: &Path) -> Result<OptimizerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load an [`OptimizerConfig`] from a TOML string.
///
/// `source_name` identifies the source in error messages.
///
/// # Errors
///
/// - `ConfigError::Parse` if the TOML is malformed.
/// - `ConfigError::Validation` if semantic constraints are violated.
pub fn load_from_str(content: &str, source_name: &str) -> Result<OptimizerConfig, ConfigError> {
    let config: OptimizerConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[network]
bandwidth_gbps = 20.0
latency_ms = 5.0

[transform]
qubit_capacity = 128
entanglement_depth = 4
shots = 200
mixing_rate = 0.1
seed = 42

[consensus]
contribution_baseline = 50.0
stale_after_updates = 0
min_support = 0.05
max_entries = 1000

[observability]
log_format = "json"
metrics_enabled = false
"#;

    #[test]
    fn test_load_from_str_valid_toml_succeeds() {
        let config = load_from_str(VALID_TOML, "test.toml").expect("test: valid toml");
        assert_eq!(config.network.bandwidth_gbps, 20.0);
        assert_eq!(config.transform.qubit_capacity, 128);
        assert_eq!(config.transform.seed, 42);
        assert_eq!(config.consensus.stale_after_updates, 0);
        assert_eq!(config.consensus.max_entries, 1000);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn test_load_from_str_empty_uses_defaults() {
        let config = load_from_str("", "empty.toml").expect("test: empty toml");
        assert_eq!(config, OptimizerConfig::default());
    }

    #[test]
    fn test_load_from_str_malformed_returns_parse_error() {
        let result = load_from_str("[network\nbandwidth_gbps = ", "bad.toml");
        assert!(
            matches!(&result, Err(ConfigError::Parse { file, .. }) if file == "bad.toml"),
            "expected parse error, got {result:?}"
        );
    }

    #[test]
    fn test_load_from_str_wrong_type_returns_parse_error() {
        let result = load_from_str("[transform]\nqubit_capacity = \"many\"", "bad.toml");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_str_invalid_values_return_validation_error() {
        let result = load_from_str(
            "[network]\nlatency_ms = 0.0\n[transform]\nshots = 0",
            "invalid.toml",
        );
        let msg = match result {
            Err(ConfigError::Validation(msg)) => msg,
            _ => String::new(),
        };
        assert!(msg.contains("network.latency_ms"));
        assert!(msg.contains("transform.shots"));
    }

    #[test]
    fn test_load_from_file_reads_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("test: temp file");
        file.write_all(VALID_TOML.as_bytes())
            .expect("test: write temp file");
        let config = load_from_file(file.path()).expect("test: load file");
        assert_eq!(config.network.latency_ms, 5.0);
    }

    #[test]
    fn test_load_from_file_missing_returns_io_error() {
        let dir = tempfile::tempdir().expect("test: temp dir");
        let path = dir.path().join("missing.toml");
        let result = load_from_file(&path);
        assert!(
            matches!(&result, Err(ConfigError::Io { file, .. }) if file.contains("missing.toml")),
            "expected io error, got {result:?}"
        );
    }
}
