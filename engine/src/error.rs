//! Engine error taxonomy.
//!
//! Four failure classes with distinct handling: upstream provider
//! faults are retryable and skip one unit of work, malformed evidence
//! falls through to the next evidence source, a missing credential is
//! fatal for the whole call, and a missing record is a client error.

use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Provider request failed (network, 5xx, rate limit). The
    /// enclosing unit of work (one job, one run, one release) is
    /// skipped, not the whole operation.
    #[error("upstream provider unavailable: {context}")]
    UpstreamUnavailable {
        context: String,
        status: Option<u16>,
    },

    /// A structured report or archive entry failed to parse.
    #[error("malformed evidence: {0}")]
    MalformedEvidence(String),

    /// No access token on file for the team. Fatal for the whole
    /// sync/analysis call.
    #[error("no provider credential configured for this team")]
    MissingCredential,

    /// Referenced record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}

impl EngineError {
    pub fn upstream(context: impl Into<String>, status: Option<u16>) -> Self {
        Self::UpstreamUnavailable {
            context: context.into(),
            status,
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::UpstreamUnavailable {
            status: err.status().map(|s| s.as_u16()),
            context: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_is_retryable() {
        assert!(EngineError::upstream("rate limited", Some(429)).is_retryable());
        assert!(!EngineError::MissingCredential.is_retryable());
        assert!(!EngineError::not_found("build", 7).is_retryable());
    }

    #[test]
    fn not_found_message_names_the_record() {
        let err = EngineError::not_found("build", 42);
        assert_eq!(err.to_string(), "build 42 not found");
    }
}
