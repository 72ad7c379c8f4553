// Discord layer - commands and event handlers.

#[path = "moderation/mod.rs"]
pub mod moderation;

use crate::core::moderation::ModerationSupervisor;
use std::sync::Arc;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub moderation: Arc<ModerationSupervisor>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
