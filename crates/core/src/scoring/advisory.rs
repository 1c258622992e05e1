//! Advisory (external oracle) difficulty score.
//!
//! The oracle is consulted with a structured description of a
//! [`ConflictSignal`] and must answer with a JSON object holding exactly
//! `difficulty_score` (0..=100) and `reason`. Every failure, including a
//! missing credential, degrades to [`NEUTRAL_SCORE`] with the failure class
//! in the reason. Nothing here ever returns an error to the search loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AdvisoryConfig;
use crate::conflict::ConflictSignal;
use crate::errors::AdvisoryError;

use super::oracle::HttpOracle;

/// Score used whenever the oracle cannot provide one.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Text-in/JSON-out advisory oracle.
#[async_trait]
pub trait AdvisoryOracle: Send + Sync {
    /// Send `prompt` and return the raw text of the answer.
    async fn consult(&self, prompt: &str) -> Result<String, AdvisoryError>;
}

/// The oracle's verdict on one signal, possibly degraded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisoryVerdict {
    pub difficulty_score: f64,
    pub reason: String,
    /// Failure class when the verdict is the degraded fallback.
    pub degraded: Option<&'static str>,
}

impl AdvisoryVerdict {
    fn degraded(err: &AdvisoryError) -> Self {
        Self {
            difficulty_score: NEUTRAL_SCORE,
            reason: format!("advisory unavailable ({}): {}", err.kind(), err),
            degraded: Some(err.kind()),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VerdictPayload {
    difficulty_score: f64,
    reason: String,
}

/// Parse an oracle answer, enforcing the verdict schema.
pub fn parse_verdict(raw: &str) -> Result<(f64, String), AdvisoryError> {
    let payload: VerdictPayload = serde_json::from_str(raw.trim())
        .map_err(|e| AdvisoryError::InvalidResponse(e.to_string()))?;
    if !payload.difficulty_score.is_finite() || !(0.0..=100.0).contains(&payload.difficulty_score)
    {
        return Err(AdvisoryError::InvalidResponse(format!(
            "difficulty_score {} outside [0, 100]",
            payload.difficulty_score
        )));
    }
    let reason = payload.reason.trim();
    if reason.is_empty() {
        return Err(AdvisoryError::InvalidResponse("empty reason".into()));
    }
    Ok((payload.difficulty_score, reason.to_string()))
}

/// Builds the prompt sent for one signal.
fn prompt_for(signal: &ConflictSignal) -> String {
    format!(
        "Estimate how hard it is for an engineer to resolve this merge by hand.\n{}\n\
         Answer with a JSON object: \
         {{\"difficulty_score\": <number 0-100>, \"reason\": <short string>}}",
        signal.describe()
    )
}

/// Best-effort advisory scorer wrapping an optional oracle.
#[derive(Clone)]
pub struct AdvisoryScorer {
    oracle: Option<Arc<dyn AdvisoryOracle>>,
    credential_env: String,
    timeout: Duration,
}

impl AdvisoryScorer {
    pub fn new(oracle: Arc<dyn AdvisoryOracle>, timeout: Duration) -> Self {
        Self {
            oracle: Some(oracle),
            credential_env: String::new(),
            timeout,
        }
    }

    /// A scorer with no credential; every verdict is the degraded one.
    pub fn without_credential(credential_env: impl Into<String>) -> Self {
        Self {
            oracle: None,
            credential_env: credential_env.into(),
            timeout: Duration::from_secs(1),
        }
    }

    /// Build the HTTP oracle from config, or a credential-less scorer when
    /// the API key did not resolve.
    pub fn from_config(config: &AdvisoryConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        match config.api_key.as_deref() {
            Some(key) => {
                let oracle = HttpOracle::new(&config.api_url, key, &config.model, timeout);
                Self::new(Arc::new(oracle), timeout)
            }
            None => Self::without_credential(&config.api_key_env),
        }
    }

    /// Ask the oracle about `signal`. Never fails.
    pub async fn ask_advisory(&self, signal: &ConflictSignal) -> AdvisoryVerdict {
        match self.try_ask(signal).await {
            Ok((difficulty_score, reason)) => {
                debug!(difficulty_score, "advisory verdict received");
                AdvisoryVerdict {
                    difficulty_score,
                    reason,
                    degraded: None,
                }
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "advisory scorer degraded");
                AdvisoryVerdict::degraded(&e)
            }
        }
    }

    async fn try_ask(&self, signal: &ConflictSignal) -> Result<(f64, String), AdvisoryError> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or_else(|| AdvisoryError::MissingCredential {
                env_var: self.credential_env.clone(),
            })?;
        let raw = tokio::time::timeout(self.timeout, oracle.consult(&prompt_for(signal)))
            .await
            .map_err(|_| AdvisoryError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;
        parse_verdict(&raw)
    }
}
