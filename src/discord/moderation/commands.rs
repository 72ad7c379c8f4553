// Content moderation slash commands: read-only status and reload.
//
// Configuration itself lives in `.env`; these commands never edit it.

use crate::core::moderation::supervisor::ActiveStatus;
use crate::core::moderation::{ModerationConfig, SupervisorStatus};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Content moderation commands.
#[poise::command(
    slash_command,
    subcommands("status", "reload"),
    required_permissions = "MANAGE_MESSAGES",
    guild_only
)]
pub async fn moderation(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show whether content moderation is running and how it is configured.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let status = ctx.data().moderation.status().await;

    ctx.send(
        poise::CreateReply::default()
            .embed(status_embed(&status))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Re-read the moderation settings and restart moderation with them.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn reload(ctx: Context<'_>) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;

    tracing::info!(user_id = ctx.author().id.get(), "Reloading content moderation config");
    let result = ctx
        .data()
        .moderation
        .reconfigure(ModerationConfig::from_env())
        .await;

    let reply = match result {
        Ok(status) => poise::CreateReply::default().embed(status_embed(&status)),
        Err(e) => poise::CreateReply::default()
            .content(format!("❌ Moderation could not be started: {}", e)),
    };

    ctx.send(reply.ephemeral(true)).await?;
    Ok(())
}

fn status_embed(status: &SupervisorStatus) -> serenity::CreateEmbed {
    let embed = serenity::CreateEmbed::new()
        .title("🛡️ Content Moderation")
        .timestamp(serenity::Timestamp::now());

    match status {
        SupervisorStatus::Active(active) => active_embed(embed, active),
        SupervisorStatus::Inert { bot } => embed
            .color(0xFFA500)
            .field("Status", "⏸️ Enabled, but no users are targeted", false)
            .field("Bot", format!("<@{}>", bot.user_id), true),
        SupervisorStatus::Disabled => embed
            .color(0xFF0000)
            .field("Status", "❌ Disabled", false),
        SupervisorStatus::Stopped => embed
            .color(0x808080)
            .field("Status", "⏹️ Not running", false),
        SupervisorStatus::Failed(reason) => embed
            .color(0xFF0000)
            .field("Status", "⚠️ Failed to start", false)
            .field("Error", reason.as_str(), false),
    }
}

fn active_embed(embed: serenity::CreateEmbed, active: &ActiveStatus) -> serenity::CreateEmbed {
    let scope = if active.moderate_all_users {
        "All users".to_string()
    } else {
        format!(
            "{} targeted user{}",
            active.target_users,
            if active.target_users == 1 { "" } else { "s" }
        )
    };

    embed
        .color(0x00FF00)
        .field("Status", "✅ Active", false)
        .field("Bot", format!("<@{}>", active.bot.user_id), true)
        .field("Backend", active.moderator.as_str(), true)
        .field("Threshold", format!("{:.2}", active.threshold), true)
        .field("Action", active.action.to_string(), true)
        .field("Scope", scope, true)
        .field("In flight", active.in_flight.to_string(), true)
}
