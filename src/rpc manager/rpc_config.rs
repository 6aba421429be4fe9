use serde::{Deserialize, Serialize};

/// HTTP settings for the GraphQL transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Optional bearer credentials sent with every request
    #[serde(default)]
    pub credentials: Option<String>,

    /// Maximum number of transactions scanned by a status query
    #[serde(default = "default_status_depth")]
    pub status_depth: u32,
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_status_depth() -> u32 {
    20
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            credentials: None,
            status_depth: default_status_depth(),
        }
    }
}

/// Validate a single endpoint URL
pub fn validate_url(url: &str) -> Result<(), String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("Invalid URL format: {}", url));
    }
    if url.trim().len() != url.len() {
        return Err(format!("URL has surrounding whitespace: {:?}", url));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.status_depth, 20);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://api.minascan.io/node/devnet/v1/graphql").is_ok());
        assert!(validate_url("http://localhost:8080/graphql").is_ok());
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("ftp://host").is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: HttpConfig = toml::from_str("timeout_ms = 500").unwrap();
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.status_depth, 20);
    }
}
