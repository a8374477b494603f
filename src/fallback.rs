//! Fallback chain controller.
//!
//! Runs an ordered sequence of extraction strategies, short-circuiting on the
//! first success. When every strategy fails the caller receives an aggregate
//! failure carrying each per-strategy reason, so an earlier, more diagnostic
//! failure is never hidden behind the last one.
//!
//! Strategies own their resources (a browser session, a subprocess) and must
//! release them before returning, success or failure. They share no mutable
//! state with the controller or with each other.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

/// One alternative method of achieving a logical operation.
#[async_trait]
pub trait Strategy<T>: Send + Sync {
    /// Stable name used in diagnostics and logs.
    fn name(&self) -> &'static str;

    /// Try this strategy once. Any owned resources must be released before
    /// this returns.
    async fn attempt(&self) -> Result<T>;
}

/// Outcome of one strategy invocation, retained for diagnostics only.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackAttempt {
    pub strategy: String,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { reason: String },
}

/// Successful chain run: the winning payload plus the attempt log.
#[derive(Debug)]
pub struct ChainResult<T> {
    pub payload: T,
    pub attempts: Vec<FallbackAttempt>,
}

/// Every strategy in the chain failed.
#[derive(Debug, thiserror::Error)]
#[error("all {} strategies failed", .attempts.len())]
pub struct ChainExhausted {
    pub attempts: Vec<FallbackAttempt>,
}

impl ChainExhausted {
    /// One-line summary of every failure, for error messages.
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| match &a.outcome {
                AttemptOutcome::Failed { reason } => format!("{}: {}", a.strategy, reason),
                AttemptOutcome::Succeeded => a.strategy.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Run strategies in order, returning the first success.
///
/// Remaining strategies are never invoked once one succeeds. Callers that
/// can reject a target as fundamentally invalid (malformed identifier) must
/// do so *before* calling this; input validation bypasses the chain.
pub async fn run<T: Send>(
    operation: &str,
    strategies: Vec<Box<dyn Strategy<T>>>,
) -> Result<ChainResult<T>, ChainExhausted> {
    let mut attempts = Vec::with_capacity(strategies.len());

    for strategy in &strategies {
        debug!("{operation}: trying strategy '{}'", strategy.name());
        match strategy.attempt().await {
            Ok(payload) => {
                attempts.push(FallbackAttempt {
                    strategy: strategy.name().to_string(),
                    outcome: AttemptOutcome::Succeeded,
                });
                return Ok(ChainResult { payload, attempts });
            }
            Err(e) => {
                warn!("{operation}: strategy '{}' failed: {e:#}", strategy.name());
                attempts.push(FallbackAttempt {
                    strategy: strategy.name().to_string(),
                    outcome: AttemptOutcome::Failed {
                        reason: format!("{e:#}"),
                    },
                });
            }
        }
    }

    Err(ChainExhausted { attempts })
}
