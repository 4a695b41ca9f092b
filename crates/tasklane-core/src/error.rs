use thiserror::Error;

pub const UNAUTHENTICATED_MESSAGE: &str = "User not authenticated";

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("User not authenticated")]
    Unauthenticated,

    #[error("session expired: {}", .message.as_deref().unwrap_or("unauthorized"))]
    Unauthorized { message: Option<String> },

    #[error("request failed with status {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    ServerRejected {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("no response from server: {0}")]
    Network(String),

    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    /// Message supplied by the server, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { message } | ApiError::ServerRejected { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }

    pub fn server_code(&self) -> Option<&str> {
        match self {
            ApiError::ServerRejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Human-readable text for a failed operation: the server's message when it sent one,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Unauthenticated => UNAUTHENTICATED_MESSAGE.to_string(),
            other => other
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string()),
        }
    }
}

/// A failed store or auth operation, displayed as the message a user should see.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
    #[source]
    pub cause: ApiError,
}

impl OperationError {
    pub fn new(message: impl Into<String>, cause: ApiError) -> Self {
        Self {
            message: message.into(),
            cause,
        }
    }

    pub fn from_api(cause: ApiError, fallback: &str) -> Self {
        Self {
            message: cause.user_message(fallback),
            cause,
        }
    }

    pub fn unauthenticated() -> Self {
        Self::from_api(ApiError::Unauthenticated, UNAUTHENTICATED_MESSAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_prefers_server_text() {
        let err = ApiError::ServerRejected {
            status: 404,
            code: Some("NOT_FOUND".to_string()),
            message: Some("Task not found".to_string()),
        };
        assert_eq!(err.user_message("Failed to update task"), "Task not found");
    }

    #[test]
    fn user_message_falls_back_without_payload() {
        let err = ApiError::Network("connection refused".to_string());
        assert_eq!(err.user_message("Failed to load tasks"), "Failed to load tasks");

        let rejected = ApiError::ServerRejected {
            status: 500,
            code: None,
            message: None,
        };
        assert_eq!(
            rejected.user_message("Failed to delete task"),
            "Failed to delete task"
        );
        assert_eq!(
            ApiError::Unauthenticated.user_message("ignored"),
            UNAUTHENTICATED_MESSAGE
        );
    }

    #[test]
    fn display_includes_status_and_message() {
        let err = ApiError::ServerRejected {
            status: 502,
            code: None,
            message: Some("AI service returned an error".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "request failed with status 502: AI service returned an error"
        );
    }
}
