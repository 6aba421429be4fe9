use thiserror::Error;

/// Remote query failures
///
/// Carried as data inside submission results and as the error side of every
/// `QueryTransport` call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection refused, reset or DNS failure
    #[error("{endpoint}: request failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint}: no response within {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("{endpoint}: HTTP {status}")]
    HttpStatus { endpoint: String, status: u16 },

    /// The node answered with a non-empty `errors` list
    #[error("{endpoint}: GraphQL errors: {message}")]
    GraphQl { endpoint: String, message: String },

    /// Body was not JSON or lacked the queried fields
    #[error("{endpoint}: unexpected response shape: {message}")]
    Decode { endpoint: String, message: String },

    #[error("No {0} endpoint configured")]
    NoEndpoint(&'static str),

    #[error("Invalid query setup: {0}")]
    Configuration(String),
}

impl FetchError {
    /// Transport-class failures that another attempt might not hit
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::GraphQl { .. }
            | Self::Decode { .. }
            | Self::NoEndpoint(_)
            | Self::Configuration(_) => false,
        }
    }

    /// Whether a fallback endpoint should be tried after this error
    ///
    /// Only transport-class failures fail over; a server that answered with
    /// a GraphQL error list has spoken for the whole network.
    pub fn should_fail_over(&self) -> bool {
        self.is_retryable()
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Timeout { endpoint, .. }
            | Self::HttpStatus { endpoint, .. }
            | Self::GraphQl { endpoint, .. }
            | Self::Decode { endpoint, .. } => Some(endpoint),
            Self::NoEndpoint(_) | Self::Configuration(_) => None,
        }
    }

    /// Classify a reqwest failure against the endpoint it was sent to
    pub fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout_ms: u64) -> Self {
        let endpoint = endpoint.to_string();
        if err.is_timeout() {
            return Self::Timeout { endpoint, timeout_ms };
        }
        if let Some(status) = err.status() {
            return Self::HttpStatus { endpoint, status: status.as_u16() };
        }
        let message = err.to_string();
        if err.is_decode() {
            Self::Decode { endpoint, message }
        } else {
            Self::Transport { endpoint, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE: &str = "https://node.test/graphql";

    fn status(code: u16) -> FetchError {
        FetchError::HttpStatus { endpoint: NODE.into(), status: code }
    }

    #[test]
    fn test_transport_class_fails_over() {
        let refused = FetchError::Transport { endpoint: NODE.into(), message: "connection refused".into() };
        let slow = FetchError::Timeout { endpoint: NODE.into(), timeout_ms: 5000 };
        assert!(refused.should_fail_over());
        assert!(slow.should_fail_over());
        assert!(status(503).should_fail_over());
        assert!(status(429).should_fail_over());
        assert!(!status(400).should_fail_over());
    }

    #[test]
    fn test_graphql_errors_stay_on_endpoint() {
        let err = FetchError::GraphQl { endpoint: NODE.into(), message: "Invalid nonce".into() };
        assert!(!err.should_fail_over());
        assert_eq!(err.endpoint(), Some(NODE));
        assert_eq!(err.to_string(), format!("{NODE}: GraphQL errors: Invalid nonce"));
    }

    #[test]
    fn test_missing_endpoint() {
        let err = FetchError::NoEndpoint("archive");
        assert_eq!(err.endpoint(), None);
        assert_eq!(err.to_string(), "No archive endpoint configured");
    }
}
