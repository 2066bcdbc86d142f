//! Turns a submission into a structured verdict via the external generation capability.
//!
//! The adjudicator owns prompt construction, the timeout/retry policy, and verdict
//! extraction. It never touches session score; scoring is applied by the caller.

mod gemini;
mod generator;
mod prompt;
mod verdict;

pub use gemini::GeminiClient;
pub use generator::{
    GenerationError, GenerationOptions, ScriptedGenerator, ScriptedReply, TextGenerator,
    UnconfiguredGenerator,
};
pub use verdict::{parse_verdict, Classification, ParsedVerdict, Verdict};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::domain::ScenarioDefinition;
use super::session::{SimulationSession, TurnInput};
use prompt::PromptBuilder;

const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Explicit adjudicator settings; there is no process-wide client.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjudicatorConfig {
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Wall-clock bound on a single generation call.
    pub call_timeout: Duration,
    /// Extra attempts after the first failed call.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff_base: Duration,
    /// Number of most recent turns included in the prompt.
    pub transcript_window: usize,
}

impl Default for AdjudicatorConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            max_output_tokens: 2000,
            temperature: 0.7,
            call_timeout: Duration::from_secs(20),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            transcript_window: 6,
        }
    }
}

impl AdjudicatorConfig {
    fn backoff_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }

    /// Upper bound on one round of calls including backoff.
    fn round_bound(&self) -> Duration {
        let calls = self
            .call_timeout
            .saturating_mul(self.max_retries.saturating_add(1));
        // Backoff stops doubling after this many retries.
        let ramp = self.max_retries.min(MAX_BACKOFF_EXPONENT + 1);
        let ramped = (1..=ramp).fold(calls, |total, attempt| {
            total.saturating_add(self.backoff_for(attempt))
        });
        let plateau = self
            .backoff_for(ramp + 1)
            .saturating_mul(self.max_retries - ramp);
        ramped.saturating_add(plateau)
    }

    /// Longest a single adjudication may take: the first round plus one reformat round.
    pub fn worst_case_duration(&self) -> Duration {
        self.round_bound().saturating_mul(2)
    }

    fn options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }
}

/// Successful adjudication of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjudication {
    pub verdict: Verdict,
    pub raw_response: String,
    /// Generation calls made, including retries and the reformat request.
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdjudicationError {
    #[error("generation failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: GenerationError },
    #[error("verdict unparseable after reformat request: {reason}")]
    Unparseable { reason: String },
}

pub struct Adjudicator {
    generator: Arc<dyn TextGenerator>,
    config: AdjudicatorConfig,
    prompts: PromptBuilder,
}

impl std::fmt::Debug for Adjudicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adjudicator")
            .field("generator", &self.generator.model_id())
            .field("config", &self.config)
            .finish()
    }
}

impl Adjudicator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: AdjudicatorConfig) -> Self {
        let prompts = PromptBuilder::new(config.transcript_window);
        Self {
            generator,
            config,
            prompts,
        }
    }

    pub fn config(&self) -> &AdjudicatorConfig {
        &self.config
    }

    pub fn model_id(&self) -> String {
        self.generator.model_id()
    }

    /// Produce a verdict for `input` given the session's committed history.
    ///
    /// An unparseable reply earns exactly one reformat request before the turn fails.
    pub async fn adjudicate(
        &self,
        scenario: &ScenarioDefinition,
        session: &SimulationSession,
        input: &TurnInput,
    ) -> Result<Adjudication, AdjudicationError> {
        let prompt = self.prompts.build(scenario, session, input);
        let (raw, attempts) = self.generate_with_retry(&prompt).await?;

        let reason = match parse_verdict(&raw, scenario) {
            ParsedVerdict::Structured(verdict) => {
                return Ok(Adjudication {
                    verdict,
                    raw_response: raw,
                    attempts,
                })
            }
            ParsedVerdict::Unparseable { reason } => reason,
        };

        warn!(session = %session.id, %reason, "verdict unparseable; requesting reformat");
        let reformat = self.prompts.reformat(scenario, &prompt, &raw);
        let (retry_raw, retry_attempts) = self.generate_with_retry(&reformat).await.map_err(
            |err| match err {
                AdjudicationError::Exhausted { attempts: extra, last } => {
                    AdjudicationError::Exhausted {
                        attempts: attempts + extra,
                        last,
                    }
                }
                other => other,
            },
        )?;

        match parse_verdict(&retry_raw, scenario) {
            ParsedVerdict::Structured(verdict) => Ok(Adjudication {
                verdict,
                raw_response: retry_raw,
                attempts: attempts + retry_attempts,
            }),
            ParsedVerdict::Unparseable { reason } => {
                Err(AdjudicationError::Unparseable { reason })
            }
        }
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<(String, u32), AdjudicationError> {
        let options = self.config.options();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome =
                tokio::time::timeout(self.config.call_timeout, self.generator.generate(prompt, &options))
                    .await;

            let err = match outcome {
                Ok(Ok(text)) => {
                    debug!(attempt, "generation succeeded");
                    return Ok((text, attempt));
                }
                Ok(Err(err)) => err,
                Err(_) => GenerationError::Timeout,
            };

            if attempt > self.config.max_retries {
                return Err(AdjudicationError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.config.backoff_for(attempt);
            warn!(attempt, ?delay, error = %err, "generation attempt failed; backing off");
            tokio::time::sleep(delay).await;
        }
    }
}
