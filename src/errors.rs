//! Typed error taxonomy for the acquisition engine.
//!
//! Every operation boundary translates internal faults into one of these
//! variants; the dispatch shell then maps each variant to a well-formed
//! response. The consumer is an automated agent, so no raw fault may ever
//! cross the operation boundary.

use crate::fallback::FallbackAttempt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed required field. Fails fast; no fallback chain
    /// is attempted.
    #[error("invalid input: {0}")]
    Input(String),

    /// The browser engine could not be started, even with the portable
    /// provisioning fallback.
    #[error("browser session could not be provisioned: {0}")]
    SessionInit(String),

    /// DNS, connection, or timeout failure during page load.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The target served an adversarial response (challenge page).
    #[error("bot detection triggered: {block_type} (trigger: {trigger})")]
    BlockDetected {
        block_type: String,
        trigger: String,
        title: String,
    },

    /// The page rendered but offered nothing extractable (empty body).
    #[error("no extraction candidates found")]
    ExtractionEmpty,

    /// Every strategy in a fallback chain failed. Carries the full attempt
    /// log so earlier, possibly more diagnostic, failures stay visible.
    #[error("all strategies failed for {operation}: {summary}")]
    AllStrategiesFailed {
        operation: String,
        summary: String,
        attempts: Vec<FallbackAttempt>,
    },

    /// An external collaborator (vision inference, caption host, media
    /// tooling) is not configured or not reachable.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl EngineError {
    /// Stable machine-readable code for the dispatch shell.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Input(_) => "invalid_input",
            Self::SessionInit(_) => "session_init_failed",
            Self::Navigation(_) => "navigation_failed",
            Self::BlockDetected { .. } => "bot_detected",
            Self::ExtractionEmpty => "extraction_empty",
            Self::AllStrategiesFailed { .. } => "all_methods_failed",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(EngineError::Input("x".into()).code(), "invalid_input");
        assert_eq!(
            EngineError::BlockDetected {
                block_type: "captcha".into(),
                trigger: "robot check".into(),
                title: "Robot Check".into(),
            }
            .code(),
            "bot_detected"
        );
        assert_eq!(EngineError::ExtractionEmpty.code(), "extraction_empty");
    }
}
