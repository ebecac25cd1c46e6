use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors surfaced by the credential cache, the upstream client and the report gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("You are not authenticated. Please authenticate via the /auth endpoint.")]
    NotAuthenticated,

    #[error(
        "Your tracker was not found. Please check if your tracker is online and check your tracker id."
    )]
    TrackerNotFound,

    #[error("Invalid tracker id '{0}': expected exactly 8 characters")]
    InvalidTrackerId(String),

    /// Network or HTTP failure talking to the telemetry API.
    /// `status` is set when upstream answered with a non-2xx code.
    #[error("Upstream request failed: {message}")]
    Upstream { status: Option<u16>, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("timed out: {err}")
        } else {
            err.to_string()
        };
        Self::Upstream {
            status: err.status().map(|s| s.as_u16()),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_rest_surface() {
        assert_eq!(
            GatewayError::NotAuthenticated.to_string(),
            "You are not authenticated. Please authenticate via the /auth endpoint."
        );
        assert!(
            GatewayError::TrackerNotFound
                .to_string()
                .starts_with("Your tracker was not found.")
        );
    }

    #[test]
    fn test_upstream_status() {
        let err = GatewayError::Upstream {
            status: Some(429),
            message: "Too Many Requests".to_string(),
        };
        assert_eq!(err.upstream_status(), Some(429));
        assert_eq!(GatewayError::TrackerNotFound.upstream_status(), None);
    }
}
