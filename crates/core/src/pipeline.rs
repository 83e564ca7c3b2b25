use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::{DeliverError, GenerateError};
use crate::retry::{RetryExhausted, RetryPolicy};

/// Produces one short quote per call. Implementations perform a single
/// provider call and never retry internally; retry belongs to the
/// pipeline's [`RetryPolicy`].
#[async_trait]
pub trait QuoteGenerator: Send + Sync {
    async fn generate(&self) -> Result<String, GenerateError>;
}

/// Sends one message to the configured destination per successful call.
/// Not idempotent on the provider side: a retried call that already
/// succeeded would send a second message, so implementations must only
/// return `Ok` once the provider confirmed the send.
#[async_trait]
pub trait QuoteDelivery: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), DeliverError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Generating,
    Validating,
    Delivering,
    Done,
    Failed,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error(transparent)]
    Generate(#[from] RetryExhausted<GenerateError>),
    #[error("generated quote was empty after trimming")]
    EmptyQuote,
    #[error(transparent)]
    Deliver(#[from] RetryExhausted<DeliverError>),
}

/// Result of one pipeline run, consumed by logging and exit-code mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub state: RunState,
    pub quote: Option<String>,
    pub delivered: bool,
    pub error: Option<RunError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done && self.delivered
    }

    fn done(quote: String) -> Self {
        Self { state: RunState::Done, quote: Some(quote), delivered: true, error: None }
    }

    fn failed(quote: Option<String>, error: RunError) -> Self {
        Self { state: RunState::Failed, quote, delivered: false, error: Some(error) }
    }
}

/// Sequences generate → validate → deliver for a single run.
///
/// Transitions: `Idle → Generating → Validating → Delivering → Done`,
/// with `Failed` reachable from `Generating` (retry exhaustion), from
/// `Validating` (empty quote) and from `Delivering` (retry exhaustion).
/// No step is skipped or reordered; delivery is never attempted unless
/// a non-empty quote is in hand.
pub struct Pipeline {
    generator: Arc<dyn QuoteGenerator>,
    delivery: Arc<dyn QuoteDelivery>,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn QuoteGenerator>,
        delivery: Arc<dyn QuoteDelivery>,
        retry: RetryPolicy,
    ) -> Self {
        Self { generator, delivery, retry }
    }

    pub async fn run(&self) -> RunOutcome {
        let run_id = Uuid::new_v4();

        info!(
            event_name = "pipeline.state_changed",
            correlation_id = %run_id,
            state = ?RunState::Generating,
            "requesting quote from generator"
        );
        let generator = Arc::clone(&self.generator);
        let quote = match self
            .retry
            .run("generate_quote", move || {
                let generator = Arc::clone(&generator);
                async move { generator.generate().await }
            })
            .await
        {
            Ok(quote) => quote,
            Err(exhausted) => {
                error!(
                    event_name = "pipeline.run_failed",
                    correlation_id = %run_id,
                    state = ?RunState::Failed,
                    attempts = exhausted.attempts,
                    error = %exhausted,
                    "quote generation exhausted its retries"
                );
                return RunOutcome::failed(None, RunError::Generate(exhausted));
            }
        };

        info!(
            event_name = "pipeline.state_changed",
            correlation_id = %run_id,
            state = ?RunState::Validating,
            "validating generated quote"
        );
        if quote.trim().is_empty() {
            error!(
                event_name = "pipeline.run_failed",
                correlation_id = %run_id,
                state = ?RunState::Failed,
                "generator produced an empty quote"
            );
            return RunOutcome::failed(None, RunError::EmptyQuote);
        }

        info!(
            event_name = "pipeline.state_changed",
            correlation_id = %run_id,
            state = ?RunState::Delivering,
            quote_chars = quote.chars().count(),
            "delivering quote"
        );
        let delivery = Arc::clone(&self.delivery);
        let payload = quote.clone();
        let delivered = self
            .retry
            .run("deliver_quote", move || {
                let delivery = Arc::clone(&delivery);
                let payload = payload.clone();
                async move { delivery.deliver(&payload).await }
            })
            .await;

        match delivered {
            Ok(()) => {
                info!(
                    event_name = "pipeline.state_changed",
                    correlation_id = %run_id,
                    state = ?RunState::Done,
                    "quote delivered"
                );
                RunOutcome::done(quote)
            }
            Err(exhausted) => {
                error!(
                    event_name = "pipeline.run_failed",
                    correlation_id = %run_id,
                    state = ?RunState::Failed,
                    attempts = exhausted.attempts,
                    error = %exhausted,
                    "quote delivery exhausted its retries"
                );
                RunOutcome::failed(Some(quote), RunError::Deliver(exhausted))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{Pipeline, QuoteDelivery, QuoteGenerator, RunError, RunState};
    use crate::errors::{DeliverError, GenerateError};
    use crate::retry::RetryPolicy;

    struct ScriptedGenerator {
        results: Mutex<VecDeque<Result<String, GenerateError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedGenerator {
        fn with_script(results: Vec<Result<String, GenerateError>>) -> Self {
            Self { results: Mutex::new(results.into()), calls: Mutex::new(0) }
        }

        async fn calls(&self) -> u32 {
            *self.calls.lock().await
        }
    }

    #[async_trait]
    impl QuoteGenerator for ScriptedGenerator {
        async fn generate(&self) -> Result<String, GenerateError> {
            *self.calls.lock().await += 1;
            self.results.lock().await.pop_front().unwrap_or(Err(GenerateError::Empty))
        }
    }

    struct ScriptedDelivery {
        results: Mutex<VecDeque<Result<(), DeliverError>>>,
        payloads: Mutex<Vec<String>>,
    }

    impl ScriptedDelivery {
        fn with_script(results: Vec<Result<(), DeliverError>>) -> Self {
            Self { results: Mutex::new(results.into()), payloads: Mutex::new(Vec::new()) }
        }

        fn always_ok() -> Self {
            Self::with_script(vec![])
        }

        async fn payloads(&self) -> Vec<String> {
            self.payloads.lock().await.clone()
        }
    }

    #[async_trait]
    impl QuoteDelivery for ScriptedDelivery {
        async fn deliver(&self, text: &str) -> Result<(), DeliverError> {
            self.payloads.lock().await.push(text.to_owned());
            self.results.lock().await.pop_front().unwrap_or(Ok(()))
        }
    }

    fn pipeline(
        generator: &Arc<ScriptedGenerator>,
        delivery: &Arc<ScriptedDelivery>,
        max_attempts: u32,
    ) -> Pipeline {
        Pipeline::new(
            Arc::clone(generator) as Arc<dyn QuoteGenerator>,
            Arc::clone(delivery) as Arc<dyn QuoteDelivery>,
            RetryPolicy { max_attempts, delay: Duration::ZERO },
        )
    }

    #[tokio::test]
    async fn delivers_generated_quote_exactly_once() {
        let generator =
            Arc::new(ScriptedGenerator::with_script(vec![Ok("Ship it.".to_owned())]));
        let delivery = Arc::new(ScriptedDelivery::always_ok());

        let outcome = pipeline(&generator, &delivery, 3).run().await;

        assert!(outcome.is_success());
        assert_eq!(outcome.state, RunState::Done);
        assert_eq!(outcome.quote.as_deref(), Some("Ship it."));
        assert_eq!(delivery.payloads().await, vec!["Ship it."]);
        assert_eq!(generator.calls().await, 1);
    }

    #[tokio::test]
    async fn empty_quote_fails_without_touching_delivery() {
        let generator = Arc::new(ScriptedGenerator::with_script(vec![Ok("   \n".to_owned())]));
        let delivery = Arc::new(ScriptedDelivery::always_ok());

        let outcome = pipeline(&generator, &delivery, 3).run().await;

        assert_eq!(outcome.state, RunState::Failed);
        assert!(!outcome.delivered);
        assert_eq!(outcome.error, Some(RunError::EmptyQuote));
        assert!(delivery.payloads().await.is_empty());
    }

    #[tokio::test]
    async fn generation_retries_then_succeeds() {
        let generator = Arc::new(ScriptedGenerator::with_script(vec![
            Err(GenerateError::Unavailable("connect refused".to_owned())),
            Ok("Small steps compound.".to_owned()),
        ]));
        let delivery = Arc::new(ScriptedDelivery::always_ok());

        let outcome = pipeline(&generator, &delivery, 3).run().await;

        assert!(outcome.is_success());
        assert_eq!(generator.calls().await, 2);
        assert_eq!(delivery.payloads().await.len(), 1);
    }

    #[tokio::test]
    async fn generation_exhaustion_never_reaches_delivery() {
        let generator = Arc::new(ScriptedGenerator::with_script(vec![
            Err(GenerateError::Unavailable("down".to_owned())),
            Err(GenerateError::Unavailable("down".to_owned())),
            Err(GenerateError::Auth("status 401".to_owned())),
        ]));
        let delivery = Arc::new(ScriptedDelivery::always_ok());

        let outcome = pipeline(&generator, &delivery, 3).run().await;

        assert_eq!(outcome.state, RunState::Failed);
        assert_eq!(generator.calls().await, 3);
        assert!(delivery.payloads().await.is_empty());

        match outcome.error {
            Some(RunError::Generate(exhausted)) => {
                assert_eq!(exhausted.attempts, 3);
                assert_eq!(exhausted.source, GenerateError::Auth("status 401".to_owned()));
            }
            other => panic!("expected generate exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delivery_failure_twice_then_success_ends_done() {
        let generator = Arc::new(ScriptedGenerator::with_script(vec![Ok("Keep going.".to_owned())]));
        let delivery = Arc::new(ScriptedDelivery::with_script(vec![
            Err(DeliverError::Unavailable("timeout".to_owned())),
            Err(DeliverError::Unavailable("timeout".to_owned())),
            Ok(()),
        ]));

        let outcome = pipeline(&generator, &delivery, 3).run().await;

        assert!(outcome.is_success());
        assert_eq!(delivery.payloads().await.len(), 3);
        assert_eq!(generator.calls().await, 1);
    }

    #[tokio::test]
    async fn delivery_exhaustion_stops_after_max_attempts() {
        let generator = Arc::new(ScriptedGenerator::with_script(vec![Ok("Keep going.".to_owned())]));
        let delivery = Arc::new(ScriptedDelivery::with_script(vec![
            Err(DeliverError::Unavailable("timeout".to_owned())),
            Err(DeliverError::Unavailable("timeout".to_owned())),
            Err(DeliverError::TargetInvalid("chat not found".to_owned())),
            Ok(()),
        ]));

        let outcome = pipeline(&generator, &delivery, 3).run().await;

        assert_eq!(outcome.state, RunState::Failed);
        assert!(!outcome.delivered);
        assert_eq!(outcome.quote.as_deref(), Some("Keep going."));
        assert_eq!(delivery.payloads().await.len(), 3);

        match outcome.error {
            Some(RunError::Deliver(exhausted)) => {
                assert_eq!(exhausted.attempts, 3);
                assert_eq!(
                    exhausted.source,
                    DeliverError::TargetInvalid("chat not found".to_owned())
                );
            }
            other => panic!("expected delivery exhaustion, got {other:?}"),
        }
    }
}
