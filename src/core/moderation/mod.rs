// Core moderation module - the content moderation pipeline.
// Following the same pattern as the other core modules: pure domain logic
// here, Discord and HTTP implementations of the ports elsewhere.

pub mod action_executor;
pub mod moderation_config;
pub mod moderation_models;
pub mod moderator;
pub mod post_processor;
pub mod supervisor;
pub mod target_filter;
pub mod threshold_policy;

pub use action_executor::{HostError, MessageState, ModerationHost};
pub use moderation_config::{BackendConfig, BackendKind, ConfigError, ModerationConfig};
pub use moderation_models::*;
pub use moderator::{ModerationError, Moderator};
pub use supervisor::{BotProvisioner, ModerationSupervisor, ModeratorFactory, SupervisorStatus};
