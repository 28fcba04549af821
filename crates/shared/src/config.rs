//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Workflow guard configuration.
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// Contract upload limits.
    #[serde(default)]
    pub uploads: UploadConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Workflow guard configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Minimum hours between delivery and completion.
    #[serde(default = "default_completion_wait_hours")]
    pub completion_wait_hours: u32,
    /// Suggested deposit as a percentage of the order total.
    #[serde(default = "default_deposit_percent")]
    pub default_deposit_percent: u8,
    /// Prefix for generated contract numbers.
    #[serde(default = "default_contract_number_prefix")]
    pub contract_number_prefix: String,
}

fn default_completion_wait_hours() -> u32 {
    24
}

fn default_deposit_percent() -> u8 {
    30
}

fn default_contract_number_prefix() -> String {
    "HD".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            completion_wait_hours: default_completion_wait_hours(),
            default_deposit_percent: default_deposit_percent(),
            contract_number_prefix: default_contract_number_prefix(),
        }
    }
}

/// Contract upload limits.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Files must be strictly smaller than this many bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Accepted MIME types; entries ending in `/` match a whole family.
    #[serde(default = "default_allowed_mime_prefixes")]
    pub allowed_mime_prefixes: Vec<String>,
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_allowed_mime_prefixes() -> Vec<String> {
    vec!["image/".to_string(), "application/pdf".to_string()]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_mime_prefixes: default_allowed_mime_prefixes(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "dealerflow=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("DEALERFLOW").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.workflow.completion_wait_hours, 24);
        assert_eq!(config.workflow.default_deposit_percent, 30);
        assert_eq!(config.workflow.contract_number_prefix, "HD");
        assert_eq!(config.uploads.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.logging.filter, "dealerflow=debug");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_without_sources_uses_defaults() {
        temp_env::with_vars_unset(
            ["DEALERFLOW__WORKFLOW__COMPLETION_WAIT_HOURS", "RUN_MODE"],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.workflow.completion_wait_hours, 24);
                assert_eq!(config.uploads.allowed_mime_prefixes.len(), 2);
            },
        );
    }

    #[test]
    fn test_load_reads_environment_overrides() {
        temp_env::with_vars(
            [
                ("DEALERFLOW__WORKFLOW__COMPLETION_WAIT_HOURS", Some("48")),
                ("DEALERFLOW__LOGGING__JSON", Some("true")),
            ],
            || {
                let config = AppConfig::load().unwrap();
                assert_eq!(config.workflow.completion_wait_hours, 48);
                assert_eq!(config.workflow.default_deposit_percent, 30);
                assert!(config.logging.json);
            },
        );
    }
}
