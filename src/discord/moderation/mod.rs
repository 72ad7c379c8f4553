// Discord side of content moderation: host ports, event translation and
// slash commands.

pub mod commands;
pub mod discord_host;
pub mod events;

pub use discord_host::DiscordHost;
pub use events::message_created;
