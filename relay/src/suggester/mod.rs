mod completion;
mod substitution;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
pub use completion::CompletionSuggester;
pub use substitution::SubstitutionSuggester;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::config::{FallbackConfig, ModelBackend, ModelConfig};
use crate::protocol::{Suggestion, SuggestionSource};

#[async_trait]
pub trait SuggestionEngine: Send + Sync {
    async fn suggest(&self, text: &str) -> Result<Suggestion, GenerationError>;

    fn source(&self) -> SuggestionSource;
}

/// Why the primary engine could not produce a usable suggestion.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API credential configured")]
    MissingCredential,
    #[error("request to completion API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion API did not answer within {0}ms")]
    Timeout(u64),
    #[error("completion API returned no choices")]
    EmptyCompletion,
    #[error("model output contains no JSON object")]
    NoJsonObject,
    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("model output is missing keys: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),
    #[error("model returned {0} usable replies, expected 3")]
    TooFewReplies(usize),
    #[error("invalid output pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub struct SuggestionRouter {
    primary: Arc<dyn SuggestionEngine>,
    fallback: Arc<SubstitutionSuggester>,
    timeout_ms: u64,
}

impl SuggestionRouter {
    pub fn new(model: &ModelConfig, fallback_config: &FallbackConfig) -> Result<Self> {
        let fallback = Arc::new(
            SubstitutionSuggester::with_extra(&fallback_config.substitutions)
                .context("failed to build substitution table")?,
        );
        let primary: Arc<dyn SuggestionEngine> = match model.backend {
            ModelBackend::Substitution => fallback.clone(),
            ModelBackend::Completion => match CompletionSuggester::new(model) {
                Ok(suggester) => Arc::new(suggester),
                Err(error) => {
                    warn!("completion backend unavailable, using substitutions only: {error}");
                    fallback.clone()
                }
            },
        };

        Ok(Self::with_engines(primary, fallback, model.timeout_ms))
    }

    pub fn with_engines(
        primary: Arc<dyn SuggestionEngine>,
        fallback: Arc<SubstitutionSuggester>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            primary,
            fallback,
            timeout_ms,
        }
    }

    pub fn primary_source(&self) -> SuggestionSource {
        self.primary.source()
    }

    /// Asks the primary engine once; any failure is logged and replaced by the substitution result.
    pub async fn suggest(&self, text: &str) -> (Suggestion, SuggestionSource) {
        let started = Instant::now();
        let attempt = match timeout(
            Duration::from_millis(self.timeout_ms.max(1)),
            self.primary.suggest(text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(self.timeout_ms)),
        };

        let outcome = match attempt {
            Ok(suggestion) => (suggestion, self.primary.source()),
            Err(error) => {
                warn!(
                    engine = self.primary.source().as_str(),
                    "primary engine failed, fallback to substitutions: {error}"
                );
                (self.fallback.build(text), SuggestionSource::Substitution)
            }
        };
        debug!(
            elapsed = ?started.elapsed(),
            source = ?outcome.1,
            "suggestion ready"
        );
        outcome
    }
}
