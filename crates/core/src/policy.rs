//! Tunable workflow guards, built from configuration.

use chrono::Duration;
use dealerflow_shared::AppConfig;

/// Limits applied to signed-contract uploads.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Files must be strictly smaller than this many bytes.
    pub max_file_size: u64,
    /// Accepted MIME types; entries ending in `/` match a whole family.
    pub allowed_mime_prefixes: Vec<String>,
}

impl UploadPolicy {
    /// Default maximum file size (10 MiB).
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

    /// Check if a MIME type is allowed.
    #[must_use]
    pub fn is_mime_type_allowed(&self, content_type: &str) -> bool {
        let content_type = content_type.trim().to_ascii_lowercase();
        self.allowed_mime_prefixes.iter().any(|allowed| {
            if allowed.ends_with('/') {
                content_type.starts_with(allowed.as_str()) && content_type.len() > allowed.len()
            } else {
                content_type == *allowed
            }
        })
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            allowed_mime_prefixes: vec!["image/".to_string(), "application/pdf".to_string()],
        }
    }
}

/// Guards and defaults the engine enforces.
#[derive(Debug, Clone)]
pub struct WorkflowPolicy {
    /// Minimum time between delivery and completion.
    pub completion_wait: Duration,
    /// Suggested deposit as a percentage of the order total.
    pub default_deposit_percent: u8,
    /// Prefix for generated contract numbers.
    pub contract_number_prefix: String,
    /// Contract upload limits.
    pub uploads: UploadPolicy,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            completion_wait: Duration::hours(24),
            default_deposit_percent: 30,
            contract_number_prefix: "HD".to_string(),
            uploads: UploadPolicy::default(),
        }
    }
}

impl From<&AppConfig> for WorkflowPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            completion_wait: Duration::hours(i64::from(config.workflow.completion_wait_hours)),
            default_deposit_percent: config.workflow.default_deposit_percent.min(100),
            contract_number_prefix: config.workflow.contract_number_prefix.clone(),
            uploads: UploadPolicy {
                max_file_size: config.uploads.max_file_size,
                allowed_mime_prefixes: config
                    .uploads
                    .allowed_mime_prefixes
                    .iter()
                    .map(|prefix| prefix.trim().to_ascii_lowercase())
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_validation() {
        let policy = UploadPolicy::default();
        assert!(policy.is_mime_type_allowed("application/pdf"));
        assert!(policy.is_mime_type_allowed("image/png"));
        assert!(policy.is_mime_type_allowed("IMAGE/JPEG"));
        assert!(!policy.is_mime_type_allowed("image/"));
        assert!(!policy.is_mime_type_allowed("application/x-executable"));
        assert!(!policy.is_mime_type_allowed("text/html"));
        assert!(!policy.is_mime_type_allowed("application/pdfx"));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = AppConfig::default();
        config.workflow.completion_wait_hours = 48;
        config.workflow.default_deposit_percent = 150;
        let policy = WorkflowPolicy::from(&config);
        assert_eq!(policy.completion_wait, Duration::hours(48));
        assert_eq!(policy.default_deposit_percent, 100);
        assert_eq!(policy.uploads.max_file_size, UploadPolicy::DEFAULT_MAX_FILE_SIZE);
    }
}
