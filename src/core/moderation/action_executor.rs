// Remedial action executor - performs the single visible action taken on a
// message that crossed the threshold.
//
// The actual Discord calls live behind the `ModerationHost` port so this
// logic (claiming, state checks, attribution) stays testable.

use super::moderation_models::{
    ActionOutcome, ActionReport, BotIdentity, Decision, MessageRef, ModerationRequest,
    RemedialAction,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use std::sync::Arc;
use thiserror::Error;

// Cap how many message ids we remember so the claim set can't grow unbounded.
const MAX_CLAIMED_MESSAGES: usize = 5_000;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostError {
    #[error("Missing permission: {0}")]
    Forbidden(String),

    #[error("Host API error: {0}")]
    Api(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("Could not check message state: {0}")]
    StateCheck(HostError),

    #[error("Failed to {action} message: {source}")]
    Execution {
        action: RemedialAction,
        source: HostError,
    },
}

// ============================================================================
// HOST PORT
// ============================================================================

/// Current state of a message on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Gone (deleted by us, a moderator or the author)
    Missing,
    /// Still there. The flags say which bot markers it already carries.
    Present { flagged_by_bot: bool, warned_by_bot: bool },
}

/// Actions the host platform lets the bot perform.
///
/// Every call is made as the bot account the host was built with.
#[async_trait]
pub trait ModerationHost: Send + Sync {
    async fn message_state(&self, message: &MessageRef) -> Result<MessageState, HostError>;

    /// Delete the message. `reason` ends up in the host's audit log.
    async fn delete_message(&self, message: &MessageRef, reason: &str) -> Result<(), HostError>;

    /// Reply to the message with `text` and leave a marker on the message
    /// that `message_state` reports as `warned_by_bot`.
    async fn post_warning(&self, message: &MessageRef, text: &str) -> Result<(), HostError>;

    /// Mark the message for human review.
    async fn flag_message(&self, message: &MessageRef) -> Result<(), HostError>;
}

// ============================================================================
// EXECUTOR
// ============================================================================

pub struct RemedialActionExecutor {
    host: Arc<dyn ModerationHost>,
    action: RemedialAction,
    warning_message: String,
    // Message ids we've already acted on (or are acting on right now)
    claimed: DashSet<u64>,
}

impl RemedialActionExecutor {
    pub fn new(host: Arc<dyn ModerationHost>, action: RemedialAction, warning_message: String) -> Self {
        Self {
            host,
            action,
            warning_message,
            claimed: DashSet::new(),
        }
    }

    /// Apply the configured action to `request`'s message as `bot`.
    ///
    /// At most one visible action per message: duplicates get
    /// `AlreadyHandled`. A failed attempt releases the claim so a later
    /// redelivery of the same event can try again; there is no retry here.
    pub async fn act(
        &self,
        request: &ModerationRequest,
        decision: &Decision,
        bot: &BotIdentity,
    ) -> Result<ActionOutcome, ActionError> {
        let Decision::Act { category, score } = decision else {
            return Ok(ActionOutcome::AlreadyHandled);
        };

        let message_id = request.message.message_id;
        if !self.claim(message_id) {
            tracing::debug!(message_id, "Message already claimed, skipping duplicate action");
            return Ok(ActionOutcome::AlreadyHandled);
        }

        match self.apply(request, category, *score, bot).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.claimed.remove(&message_id);
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        request: &ModerationRequest,
        category: &str,
        score: f64,
        bot: &BotIdentity,
    ) -> Result<ActionOutcome, ActionError> {
        let message = &request.message;

        let state = self
            .host
            .message_state(message)
            .await
            .map_err(ActionError::StateCheck)?;

        match (state, self.action) {
            (MessageState::Missing, _) => return Ok(ActionOutcome::AlreadyHandled),
            (MessageState::Present { flagged_by_bot: true, .. }, RemedialAction::Flag)
            | (MessageState::Present { warned_by_bot: true, .. }, RemedialAction::Warn) => {
                return Ok(ActionOutcome::AlreadyHandled)
            }
            _ => {}
        }

        let reason = format!(
            "Content moderation by {}: {} scored {:.2}",
            bot.username, category, score
        );

        let result = match self.action {
            RemedialAction::Delete => self.host.delete_message(message, &reason).await,
            RemedialAction::Warn => self.host.post_warning(message, &self.warning_message).await,
            RemedialAction::Flag => self.host.flag_message(message).await,
        };

        result.map_err(|source| ActionError::Execution {
            action: self.action,
            source,
        })?;

        Ok(ActionOutcome::Applied(ActionReport {
            action: self.action,
            message_id: message.message_id,
            actor_id: bot.user_id,
            category: category.to_string(),
            score,
            acted_at: Utc::now(),
        }))
    }

    /// Returns false if the message was already claimed.
    fn claim(&self, message_id: u64) -> bool {
        if !self.claimed.insert(message_id) {
            return false;
        }

        // Simple eviction: drop an arbitrary other entry once we cross the cap.
        if self.claimed.len() > MAX_CLAIMED_MESSAGES {
            let victim = self
                .claimed
                .iter()
                .map(|entry| *entry.key())
                .find(|id| *id != message_id);
            if let Some(victim) = victim {
                self.claimed.remove(&victim);
            }
        }

        true
    }
}

// ============================================================================
// TESTS
// ============================================================================
