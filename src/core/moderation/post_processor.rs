// Post processor - runs every new message through the moderation pipeline.
//
// Per message: filter by author -> classify (bounded) -> evaluate -> act.
// Each admitted event runs in its own task; nothing is shared between
// messages except the read-only config, the bot identity and the executor's
// claim set.
//
// Lifecycle: Idle -> Running (start) -> Stopping -> Stopped (stop).
// A processor is never restarted; reconfiguration builds a new one.

use super::action_executor::{ModerationHost, RemedialActionExecutor};
use super::moderation_config::{ModerationConfig, MODERATION_TIMEOUT};
use super::moderation_models::{
    ActionOutcome, BotIdentity, DiscardReason, MessageCreated, ModerationRequest,
    PipelineOutcome, Verdict,
};
use super::moderator::{ModerationError, Moderator};
use super::target_filter::in_scope;
use super::threshold_policy::evaluate;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Transient backend failures get one more try, inside the same deadline.
const MAX_CLASSIFY_ATTEMPTS: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);
/// How long `stop` waits for abandoned tasks to unwind.
const ABANDON_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorError {
    #[error("Post processor has not been started")]
    NotStarted,

    #[error("Post processor is already running")]
    AlreadyStarted,

    #[error("Post processor has been stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Admission state. Changing phase and counting in-flight work happen under
/// the same lock, so no event can slip in after `stop` closes the gate.
#[derive(Debug, Clone, Copy)]
struct Gate {
    phase: Phase,
    in_flight: usize,
}

/// Decrements the in-flight count when a message's task finishes (or panics).
struct InFlightGuard(Arc<watch::Sender<Gate>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|gate| gate.in_flight -= 1);
    }
}

/// Everything a single message's run needs. Built on `start`.
struct Pipeline {
    config: Arc<ModerationConfig>,
    bot: BotIdentity,
    moderator: Arc<dyn Moderator>,
    executor: RemedialActionExecutor,
    shutdown: watch::Receiver<bool>,
}

pub struct PostProcessor {
    config: Arc<ModerationConfig>,
    bot: BotIdentity,
    moderator: Arc<dyn Moderator>,
    drain_timeout: Duration,
    gate: Arc<watch::Sender<Gate>>,
    shutdown: watch::Sender<bool>,
    pipeline: OnceLock<Arc<Pipeline>>,
}

impl PostProcessor {
    pub fn new(config: Arc<ModerationConfig>, bot: BotIdentity, moderator: Arc<dyn Moderator>) -> Self {
        let (gate, _) = watch::channel(Gate {
            phase: Phase::Idle,
            in_flight: 0,
        });
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            bot,
            moderator,
            drain_timeout: MODERATION_TIMEOUT,
            gate: Arc::new(gate),
            shutdown,
            pipeline: OnceLock::new(),
        }
    }

    /// Override how long `stop` lets in-flight messages finish.
    #[cfg(test)]
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Start accepting events. Remedial actions go through `host`.
    pub fn start(&self, host: Arc<dyn ModerationHost>) -> Result<(), ProcessorError> {
        match self.gate.borrow().phase {
            Phase::Idle => {}
            Phase::Running => return Err(ProcessorError::AlreadyStarted),
            Phase::Stopping | Phase::Stopped => return Err(ProcessorError::Stopped),
        }

        let pipeline = Pipeline {
            config: Arc::clone(&self.config),
            bot: self.bot.clone(),
            moderator: Arc::clone(&self.moderator),
            executor: RemedialActionExecutor::new(
                host,
                self.config.action,
                self.config.warning_message.clone(),
            ),
            shutdown: self.shutdown.subscribe(),
        };
        self.pipeline
            .set(Arc::new(pipeline))
            .map_err(|_| ProcessorError::AlreadyStarted)?;

        let started = self.gate.send_if_modified(|gate| {
            if gate.phase != Phase::Idle {
                return false;
            }
            gate.phase = Phase::Running;
            true
        });
        if !started {
            return Err(ProcessorError::Stopped);
        }

        tracing::info!(
            moderator = self.moderator.name(),
            bot = %self.bot.username,
            threshold = %self.config.threshold,
            action = %self.config.action,
            moderate_all_users = self.config.moderate_all_users,
            target_users = self.config.target_users.len(),
            "Post processor started"
        );
        Ok(())
    }

    /// Handle a new-message notification in the background.
    ///
    /// Returns `false` if the event was rejected because the processor is
    /// not running.
    pub fn on_message_created(&self, event: MessageCreated) -> bool {
        let (pipeline, guard) = match self.admit() {
            Ok(admitted) => admitted,
            Err(e) => {
                tracing::debug!(message_id = event.message_id, "Rejected message event: {}", e);
                return false;
            }
        };

        tokio::spawn(async move {
            let _guard = guard;
            pipeline.run(ModerationRequest::from(event)).await;
        });
        true
    }

    /// Handle a new-message notification and wait for the outcome.
    #[cfg(test)]
    pub async fn process(&self, event: MessageCreated) -> Result<PipelineOutcome, ProcessorError> {
        let (pipeline, _guard) = self.admit()?;
        Ok(pipeline.run(ModerationRequest::from(event)).await)
    }

    /// Stop accepting events and let in-flight messages finish.
    ///
    /// Messages still running after the drain timeout are abandoned: their
    /// classification is dropped and they are never acted on.
    pub async fn stop(&self) {
        let stopping = self.gate.send_if_modified(|gate| match gate.phase {
            Phase::Idle | Phase::Running => {
                gate.phase = Phase::Stopping;
                true
            }
            Phase::Stopping | Phase::Stopped => false,
        });
        if !stopping {
            return;
        }

        let mut gate = self.gate.subscribe();
        let finished = tokio::time::timeout(self.drain_timeout, drained(&mut gate))
            .await
            .is_ok();

        if !finished {
            tracing::warn!(
                in_flight = self.in_flight(),
                "Moderation still in flight after drain timeout; abandoning"
            );
            self.shutdown.send_replace(true);
            let _ = tokio::time::timeout(ABANDON_GRACE, drained(&mut gate)).await;
        }

        self.shutdown.send_replace(true);
        self.gate.send_modify(|gate| gate.phase = Phase::Stopped);
        tracing::info!(bot = %self.bot.username, "Post processor stopped");
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.gate.borrow().phase == Phase::Running
    }

    pub fn in_flight(&self) -> usize {
        self.gate.borrow().in_flight
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    pub fn bot(&self) -> &BotIdentity {
        &self.bot
    }

    pub fn moderator_name(&self) -> &str {
        self.moderator.name()
    }

    fn admit(&self) -> Result<(Arc<Pipeline>, InFlightGuard), ProcessorError> {
        let pipeline = self.pipeline.get().ok_or(ProcessorError::NotStarted)?;

        let mut rejected = ProcessorError::NotStarted;
        let admitted = self.gate.send_if_modified(|gate| match gate.phase {
            Phase::Running => {
                gate.in_flight += 1;
                true
            }
            Phase::Idle => false,
            Phase::Stopping | Phase::Stopped => {
                rejected = ProcessorError::Stopped;
                false
            }
        });
        if !admitted {
            return Err(rejected);
        }

        Ok((Arc::clone(pipeline), InFlightGuard(Arc::clone(&self.gate))))
    }
}

/// Resolves once every in-flight message has finished.
async fn drained(gate: &mut watch::Receiver<Gate>) {
    let _ = gate.wait_for(|gate| gate.in_flight == 0).await;
}

/// Resolves once `stop` gives up on in-flight work, or the processor is gone.
async fn abandoned(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

impl Pipeline {
    async fn run(&self, request: ModerationRequest) -> PipelineOutcome {
        let outcome = self.moderate(&request).await;
        self.log_outcome(&request, &outcome);
        outcome
    }

    async fn moderate(&self, request: &ModerationRequest) -> PipelineOutcome {
        if request.author_id == self.bot.user_id {
            return PipelineOutcome::Discarded(DiscardReason::OwnMessage);
        }
        if !in_scope(request.author_id, &self.config) {
            return PipelineOutcome::Discarded(DiscardReason::OutOfScope);
        }
        if request.text.trim().is_empty() {
            return PipelineOutcome::Discarded(DiscardReason::EmptyText);
        }

        let classified = tokio::select! {
            result = tokio::time::timeout(MODERATION_TIMEOUT, self.classify(&request.text)) => result,
            _ = abandoned(self.shutdown.clone()) => return PipelineOutcome::Abandoned,
        };

        let verdict = match classified {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(e)) => return PipelineOutcome::Failed(e),
            Err(_) => return PipelineOutcome::Failed(ModerationError::Timeout),
        };

        let decision = evaluate(&verdict, self.config.threshold);
        if !decision.is_act() {
            return PipelineOutcome::Allowed;
        }

        if *self.shutdown.borrow() {
            return PipelineOutcome::Abandoned;
        }

        match self.executor.act(request, &decision, &self.bot).await {
            Ok(outcome) => PipelineOutcome::Acted(outcome),
            Err(e) => PipelineOutcome::ActionFailed(e),
        }
    }

    async fn classify(&self, text: &str) -> Result<Verdict, ModerationError> {
        let mut attempt = 1;
        loop {
            match self.moderator.classify(text).await {
                Err(e) if e.is_retryable() && attempt < MAX_CLASSIFY_ATTEMPTS => {
                    tracing::warn!(
                        moderator = self.moderator.name(),
                        attempt,
                        error = %e,
                        "Moderation backend failed, retrying"
                    );
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn log_outcome(&self, request: &ModerationRequest, outcome: &PipelineOutcome) {
        let message_id = request.message.message_id;
        let author_id = request.author_id;

        match outcome {
            PipelineOutcome::Discarded(reason) => {
                tracing::debug!(message_id, author_id, %reason, "Skipping message");
            }
            PipelineOutcome::Allowed => {
                tracing::debug!(message_id, author_id, "Message passed moderation");
            }
            PipelineOutcome::Acted(ActionOutcome::Applied(report)) => {
                tracing::info!(
                    message_id = report.message_id,
                    author_id,
                    channel_id = request.message.channel_id,
                    guild_id = ?request.message.guild_id,
                    action = %report.action,
                    category = %report.category,
                    score = report.score,
                    bot_id = report.actor_id,
                    acted_at = %report.acted_at,
                    "Took moderation action"
                );
            }
            PipelineOutcome::Acted(ActionOutcome::AlreadyHandled) => {
                tracing::info!(message_id, author_id, "Message already handled, no action taken");
            }
            PipelineOutcome::Failed(ModerationError::Timeout) => {
                tracing::error!(
                    message_id,
                    author_id,
                    timeout_secs = MODERATION_TIMEOUT.as_secs(),
                    "Moderation timed out; message left unmoderated"
                );
            }
            PipelineOutcome::Failed(e) => {
                tracing::error!(
                    message_id,
                    author_id,
                    moderator = self.moderator.name(),
                    error = %e,
                    "Failed to moderate message; message left unmoderated"
                );
            }
            PipelineOutcome::ActionFailed(e) => {
                tracing::error!(message_id, author_id, error = %e, "Failed to apply moderation action");
            }
            PipelineOutcome::Abandoned => {
                tracing::warn!(
                    message_id,
                    author_id,
                    "Processor stopped before moderation finished; message left untouched"
                );
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
