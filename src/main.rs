// This is the entry point of the content moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (classifier backends)
// - `discord/` = Discord-specific adapters (host actions, events, commands)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Route new messages into the moderation pipeline

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{ModerationConfig, ModerationSupervisor};
use crate::discord::moderation::{message_created, DiscordHost};
use crate::discord::{Data, Error};
use crate::infra::moderation::BackendModeratorFactory;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::{Arc, OnceLock};

/// Event handler for non-command Discord events.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        if let Some(created) = message_created(new_message) {
            if !data.moderation.dispatch(created).await {
                tracing::trace!(message_id = new_message.id.get(), "Moderation not active");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").context(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    )?;

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS;

    // Filled in by the setup hook so the shutdown handler can drain moderation
    // before the gateway goes away.
    let moderation: Arc<OnceLock<Arc<ModerationSupervisor>>> = Arc::new(OnceLock::new());
    let moderation_slot = Arc::clone(&moderation);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![discord::moderation::commands::moderation()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!(bot = %ready.user.name, "Bot is starting up...");

                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // ====================================================================
                // DEPENDENCY INJECTION
                // ====================================================================
                // The Discord host doubles as the bot provisioner: both act as
                // the account behind our token.
                let host = Arc::new(DiscordHost::new(ctx.http.clone()));
                let supervisor = Arc::new(ModerationSupervisor::new(
                    host.clone(),
                    host,
                    Arc::new(BackendModeratorFactory),
                ));

                // A bad config keeps moderation off but the bot stays up, so
                // `/moderation reload` can pick up a fix.
                match supervisor.reconfigure(ModerationConfig::from_env()).await {
                    Ok(status) => tracing::info!(?status, "Content moderation initialized"),
                    Err(e) => tracing::error!("Content moderation is inactive: {}", e),
                }

                if moderation_slot.set(Arc::clone(&supervisor)).is_err() {
                    tracing::warn!("Setup ran twice; Ctrl-C will drain the first supervisor only");
                }

                Ok(Data {
                    moderation: supervisor,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down...");
            if let Some(supervisor) = moderation.get() {
                supervisor.shutdown().await;
            }
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.context("Error running bot")?;
    Ok(())
}
