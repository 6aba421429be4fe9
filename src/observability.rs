//! Trace identifiers for builds and submissions
//!
//! A build opens one root `TraceContext`; each pass runs under a child whose
//! `operation` is the fetch mode. Submission and polling share the root of
//! the `submit` call, so every log line of one transaction carries the same
//! `trace_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing_subscriber::{fmt as subscriber_fmt, EnvFilter};
use uuid::Uuid;

/// Identifier shared by every span of one build or submission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, enough to tell concurrent builds apart in logs
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: CorrelationId,
    pub span_id: CorrelationId,
    pub parent_span_id: Option<CorrelationId>,
    pub operation: String,
    pub started_at: DateTime<Utc>,
}

impl TraceContext {
    pub fn new(operation: &str) -> Self {
        Self {
            trace_id: CorrelationId::random(),
            span_id: CorrelationId::random(),
            parent_span_id: None,
            operation: operation.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Same trace, new span under this one
    pub fn child_span(&self, operation: &str) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: CorrelationId::random(),
            parent_span_id: Some(self.span_id),
            operation: operation.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from((Utc::now() - self.started_at).num_milliseconds()).unwrap_or(0)
    }
}

/// Install the global tracing subscriber
///
/// `filter` uses `EnvFilter` syntax and is overridden by `RUST_LOG`. Returns
/// an error when a subscriber is already installed.
pub fn init_tracing(filter: &str, json: bool) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(filter)?,
    };

    let builder = subscriber_fmt().with_env_filter(env_filter).with_target(true);
    if json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("tracing init failed: {}", e))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("tracing init failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_spans_share_build_trace() {
        let build = TraceContext::new("build_transaction");
        let replay = build.child_span("cached");
        assert!(build.is_root());
        assert!(!replay.is_root());
        assert_eq!(replay.trace_id, build.trace_id);
        assert_eq!(replay.parent_span_id, Some(build.span_id));
        assert_ne!(replay.span_id, build.span_id);
        assert_eq!(replay.operation, "cached");
    }

    #[test]
    fn test_short_id() {
        let id = CorrelationId::random();
        assert_eq!(id.short().len(), 8);
        assert!(id.to_string().starts_with(&id.short()));
        assert_ne!(CorrelationId::random(), id);
    }
}
