// Discord implementation of the moderation host ports.
//
// Every call goes through the bot's own `Http` client, so Discord attributes
// deletions, replies and reactions to the bot account.

use crate::core::moderation::{BotIdentity, BotProvisioner, HostError, MessageRef, MessageState, ModerationHost};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

const FLAG_EMOJI: &str = "🚩";
const WARNED_EMOJI: &str = "⚠️";

pub struct DiscordHost {
    http: Arc<serenity::Http>,
}

impl DiscordHost {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    fn flag_reaction() -> serenity::ReactionType {
        serenity::ReactionType::Unicode(FLAG_EMOJI.to_string())
    }

    fn warned_reaction() -> serenity::ReactionType {
        serenity::ReactionType::Unicode(WARNED_EMOJI.to_string())
    }

    fn ids(message: &MessageRef) -> (serenity::ChannelId, serenity::MessageId) {
        (
            serenity::ChannelId::new(message.channel_id),
            serenity::MessageId::new(message.message_id),
        )
    }
}

/// HTTP status of a failed Discord request, if it got that far.
fn status_code(err: &serenity::Error) -> Option<u16> {
    match err {
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) => {
            Some(response.status_code.as_u16())
        }
        _ => None,
    }
}

fn to_host_error(err: serenity::Error) -> HostError {
    match status_code(&err) {
        Some(403) => HostError::Forbidden(err.to_string()),
        _ => HostError::Api(err.to_string()),
    }
}

#[async_trait]
impl ModerationHost for DiscordHost {
    async fn message_state(&self, message: &MessageRef) -> Result<MessageState, HostError> {
        let (channel_id, message_id) = Self::ids(message);

        match self.http.get_message(channel_id, message_id).await {
            Ok(fetched) => {
                let reacted = |marker: serenity::ReactionType| {
                    fetched
                        .reactions
                        .iter()
                        .any(|reaction| reaction.me && reaction.reaction_type == marker)
                };
                Ok(MessageState::Present {
                    flagged_by_bot: reacted(Self::flag_reaction()),
                    warned_by_bot: reacted(Self::warned_reaction()),
                })
            }
            Err(e) if status_code(&e) == Some(404) => Ok(MessageState::Missing),
            Err(e) => Err(to_host_error(e)),
        }
    }

    async fn delete_message(&self, message: &MessageRef, reason: &str) -> Result<(), HostError> {
        let (channel_id, message_id) = Self::ids(message);

        self.http
            .delete_message(channel_id, message_id, Some(reason))
            .await
            .map_err(to_host_error)
    }

    /// Reacts with ⚠️, then replies. The reaction is removed again if the
    /// reply fails.
    async fn post_warning(&self, message: &MessageRef, text: &str) -> Result<(), HostError> {
        let (channel_id, message_id) = Self::ids(message);
        let marker = Self::warned_reaction();

        self.http
            .create_reaction(channel_id, message_id, &marker)
            .await
            .map_err(to_host_error)?;

        let reply = serenity::CreateMessage::new()
            .content(text)
            .reference_message((channel_id, message_id));

        if let Err(e) = channel_id.send_message(&self.http, reply).await {
            if let Err(undo) = self
                .http
                .delete_reaction_me(channel_id, message_id, &marker)
                .await
            {
                tracing::warn!(
                    message_id = message.message_id,
                    "Could not remove warning marker: {}",
                    undo
                );
            }
            return Err(to_host_error(e));
        }

        Ok(())
    }

    async fn flag_message(&self, message: &MessageRef) -> Result<(), HostError> {
        let (channel_id, message_id) = Self::ids(message);

        self.http
            .create_reaction(channel_id, message_id, &Self::flag_reaction())
            .await
            .map_err(to_host_error)
    }
}

#[async_trait]
impl BotProvisioner for DiscordHost {
    /// The token decides which account we are; the configured name is only
    /// applied on a best-effort basis (Discord rate limits renames hard).
    async fn ensure_bot(&self, username: &str) -> Result<BotIdentity, HostError> {
        let mut current = self.http.get_current_user().await.map_err(to_host_error)?;

        if current.name != username {
            match current
                .edit(&self.http, serenity::EditProfile::new().username(username))
                .await
            {
                Ok(()) => tracing::info!(username, "Renamed moderation bot account"),
                Err(e) => tracing::warn!(
                    wanted = username,
                    actual = %current.name,
                    "Could not rename bot account: {}",
                    e
                ),
            }
        }

        Ok(BotIdentity {
            user_id: current.id.get(),
            username: current.name.clone(),
        })
    }
}
