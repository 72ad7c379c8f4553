// Translates serenity events into moderation notifications.

use crate::core::moderation::MessageCreated;
use poise::serenity_prelude as serenity;

/// Build the moderation notification for a new message.
///
/// Bot messages (including our own) are never moderated.
pub fn message_created(msg: &serenity::Message) -> Option<MessageCreated> {
    if msg.author.bot {
        return None;
    }

    Some(MessageCreated {
        message_id: msg.id.get(),
        author_id: msg.author.id.get(),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|id| id.get()),
        content: msg.content.clone(),
    })
}
