//! The `{success, message, data}` envelope returned to API callers.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Uniform response body for every workflow operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable message.
    pub message: String,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Stable machine-readable error kind on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// HTTP status the transport layer should use.
    #[serde(skip)]
    pub status: u16,
}

impl<T> ApiResponse<T> {
    /// Creates a successful response.
    #[must_use]
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            code: None,
            status: 200,
        }
    }

    /// Creates a failed response from an application error.
    #[must_use]
    pub fn error(err: &AppError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            data: None,
            code: Some(err.error_code().to_string()),
            status: err.status_code(),
        }
    }

    /// Converts any result whose error converts into `AppError`.
    pub fn from_result<E>(result: Result<T, E>, message: impl Into<String>) -> Self
    where
        E: Into<AppError>,
    {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(err) => Self::error(&err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_serialization() {
        let response = ApiResponse::ok("Order created", 7u32);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Order created");
        assert_eq!(json["data"], 7);
        assert!(json.get("code").is_none());
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_error_envelope_carries_code_and_status() {
        let result: Result<u32, AppError> = Err(AppError::NotFound("order 1".into()));
        let response = ApiResponse::from_result(result, "unused");
        assert!(!response.success);
        assert_eq!(response.status, 404);
        assert_eq!(response.code.as_deref(), Some("NOT_FOUND"));
        assert_eq!(response.message, "Not found: order 1");
    }
}
