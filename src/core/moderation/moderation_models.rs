// Moderation domain models - data structures for the content moderation pipeline.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts serenity messages into these and turns
// decisions back into Discord actions.

use chrono::{DateTime, Utc};
use std::fmt;

use super::action_executor::ActionError;
use super::moderator::ModerationError;

/// A "message created" notification delivered by the host platform.
///
/// Delivery is at-least-once, so the same message may show up twice.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageCreated {
    pub message_id: u64,
    pub author_id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub content: String,
}

/// Where a message lives on the host. Enough to fetch, delete or reply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub message_id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
}

/// Per-message moderation request, built when the event arrives and dropped
/// once the decision has been made.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationRequest {
    pub message: MessageRef,
    pub author_id: u64,
    pub text: String,
}

impl From<MessageCreated> for ModerationRequest {
    fn from(event: MessageCreated) -> Self {
        Self {
            message: MessageRef {
                message_id: event.message_id,
                channel_id: event.channel_id,
                guild_id: event.guild_id,
            },
            author_id: event.author_id,
            text: event.content,
        }
    }
}

/// Score for a single risk category, normalized to `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryScore {
    pub category: String,
    pub score: f64,
}

impl CategoryScore {
    pub fn new(category: impl Into<String>, score: f64) -> Self {
        Self {
            category: category.into(),
            score,
        }
    }
}

/// Classifier result for one piece of text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verdict {
    pub categories: Vec<CategoryScore>,
}

impl Verdict {
    /// A verdict with no risk categories at all (e.g. for blank text).
    pub fn safe() -> Self {
        Self::default()
    }

    pub fn from_scores<I, S>(scores: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            categories: scores
                .into_iter()
                .map(|(category, score)| CategoryScore::new(category, score))
                .collect(),
        }
    }

    /// The category with the highest score. NaN scores are ignored.
    pub fn highest(&self) -> Option<&CategoryScore> {
        self.categories
            .iter()
            .filter(|c| !c.score.is_nan())
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

/// Outcome of the threshold policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Message is fine, leave it alone
    Allow,
    /// Message crossed the threshold; `category` is the one that triggered it
    Act { category: String, score: f64 },
}

impl Decision {
    pub fn is_act(&self) -> bool {
        matches!(self, Decision::Act { .. })
    }
}

/// The account remedial actions are attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: u64,
    pub username: String,
}

/// What happens to a message that crossed the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemedialAction {
    /// Remove the message
    #[default]
    Delete,
    /// Reply to the message with a warning
    Warn,
    /// Mark the message with a reaction so moderators can review it
    Flag,
}

impl fmt::Display for RemedialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemedialAction::Delete => write!(f, "delete"),
            RemedialAction::Warn => write!(f, "warn"),
            RemedialAction::Flag => write!(f, "flag"),
        }
    }
}

/// Result of a successful executor call.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// The action was performed now
    Applied(ActionReport),
    /// Someone (possibly us) already handled this message; nothing was done
    AlreadyHandled,
}

/// Record of an action we performed, used for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub action: RemedialAction,
    pub message_id: u64,
    pub actor_id: u64,
    pub category: String,
    pub score: f64,
    pub acted_at: DateTime<Utc>,
}

/// Why a message was dropped without classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    OwnMessage,
    OutOfScope,
    EmptyText,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::OwnMessage => write!(f, "message authored by the moderation bot"),
            DiscardReason::OutOfScope => write!(f, "author is not a moderation target"),
            DiscardReason::EmptyText => write!(f, "message has no text"),
        }
    }
}

/// Terminal state of one message's pipeline run.
#[derive(Debug)]
pub enum PipelineOutcome {
    Discarded(DiscardReason),
    Allowed,
    Acted(ActionOutcome),
    /// Classification failed; the message was left untouched (fail-open)
    Failed(ModerationError),
    ActionFailed(ActionError),
    /// The processor shut down before this message was decided
    Abandoned,
}
