// Owns the live post processor.
//
// Holds at most one processor at a time. A configuration change stops the
// current processor and builds a fresh one from the new snapshot; running
// handlers never see a half-updated config.

use super::action_executor::{HostError, ModerationHost};
use super::moderation_config::{BackendConfig, ConfigError, ModerationConfig};
use super::moderation_models::{BotIdentity, MessageCreated, RemedialAction};
use super::moderator::Moderator;
use super::post_processor::PostProcessor;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Resolves (and if needed creates or renames) the bot account actions are
/// attributed to.
#[async_trait]
pub trait BotProvisioner: Send + Sync {
    async fn ensure_bot(&self, username: &str) -> Result<BotIdentity, HostError>;
}

/// Picks a `Moderator` implementation for a backend config.
pub trait ModeratorFactory: Send + Sync {
    fn build(&self, backend: &BackendConfig) -> Result<Arc<dyn Moderator>, ConfigError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveStatus {
    pub bot: BotIdentity,
    pub moderator: String,
    pub threshold: f64,
    pub action: RemedialAction,
    pub moderate_all_users: bool,
    pub target_users: usize,
    pub in_flight: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorStatus {
    /// Not configured yet
    Stopped,
    Disabled,
    /// Enabled, but no user is in scope
    Inert { bot: BotIdentity },
    Active(ActiveStatus),
    /// Last reconfiguration failed; moderation is off until it is fixed
    Failed(String),
}

pub struct ModerationSupervisor {
    host: Arc<dyn ModerationHost>,
    provisioner: Arc<dyn BotProvisioner>,
    factory: Arc<dyn ModeratorFactory>,
    current: RwLock<Option<Arc<PostProcessor>>>,
    status: RwLock<SupervisorStatus>,
    // Serializes reconfigure/shutdown so two swaps never interleave
    swap_lock: Mutex<()>,
}

impl ModerationSupervisor {
    pub fn new(
        host: Arc<dyn ModerationHost>,
        provisioner: Arc<dyn BotProvisioner>,
        factory: Arc<dyn ModeratorFactory>,
    ) -> Self {
        Self {
            host,
            provisioner,
            factory,
            current: RwLock::new(None),
            status: RwLock::new(SupervisorStatus::Stopped),
            swap_lock: Mutex::new(()),
        }
    }

    /// Tear down the current processor and build a new one from a freshly
    /// loaded config.
    ///
    /// A load or initialization error leaves moderation off (the old
    /// processor is gone either way) and is kept in the status.
    pub async fn reconfigure(
        &self,
        loaded: Result<ModerationConfig, ConfigError>,
    ) -> Result<SupervisorStatus, ConfigError> {
        let _swap = self.swap_lock.lock().await;

        let old = self.current.write().await.take();
        if let Some(old) = old {
            old.stop().await;
        }

        let built = match loaded {
            Ok(config) => self.build(config).await,
            Err(e) => Err(e),
        };

        match built {
            Ok((status, processor)) => {
                *self.current.write().await = processor;
                *self.status.write().await = status.clone();
                Ok(status)
            }
            Err(e) => {
                tracing::error!(error = %e, "Content moderation could not be started");
                *self.status.write().await = SupervisorStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Route a new-message event to the live processor, if any.
    pub async fn dispatch(&self, event: MessageCreated) -> bool {
        let processor = self.current.read().await.clone();
        match processor {
            Some(processor) => processor.on_message_created(event),
            None => false,
        }
    }

    pub async fn status(&self) -> SupervisorStatus {
        let mut status = self.status.read().await.clone();
        if let SupervisorStatus::Active(active) = &mut status {
            if let Some(processor) = self.current.read().await.as_ref() {
                active.in_flight = processor.in_flight();
            }
        }
        status
    }

    /// Stop the live processor, draining in-flight messages.
    pub async fn shutdown(&self) {
        let _swap = self.swap_lock.lock().await;

        let old = self.current.write().await.take();
        if let Some(old) = old {
            old.stop().await;
        }
        *self.status.write().await = SupervisorStatus::Stopped;
    }

    async fn build(
        &self,
        config: ModerationConfig,
    ) -> Result<(SupervisorStatus, Option<Arc<PostProcessor>>), ConfigError> {
        if !config.enabled {
            tracing::info!("Content moderation is disabled");
            return Ok((SupervisorStatus::Disabled, None));
        }

        let bot = self
            .provisioner
            .ensure_bot(&config.bot_username)
            .await
            .map_err(|e| ConfigError::BotProvisioning(e.to_string()))?;

        if config.is_inert() {
            tracing::info!("Content moderation is targeting no users");
            return Ok((SupervisorStatus::Inert { bot }, None));
        }

        let moderator = self.factory.build(&config.backend)?;
        let processor = Arc::new(PostProcessor::new(Arc::new(config), bot, moderator));
        processor
            .start(Arc::clone(&self.host))
            .map_err(|e| ConfigError::Startup(e.to_string()))?;

        let config = processor.config();
        let status = SupervisorStatus::Active(ActiveStatus {
            bot: processor.bot().clone(),
            moderator: processor.moderator_name().to_string(),
            threshold: config.threshold.value(),
            action: config.action,
            moderate_all_users: config.moderate_all_users,
            target_users: config.target_users.len(),
            in_flight: 0,
        });

        Ok((status, Some(processor)))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::action_executor::tests::MockHost;
    use crate::core::moderation::post_processor::tests::{
        bot, config, event, keyword_verdict, Behavior, StubModerator, BOT_ID,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct StubProvisioner;

    #[async_trait]
    impl BotProvisioner for StubProvisioner {
        async fn ensure_bot(&self, username: &str) -> Result<BotIdentity, HostError> {
            if username == "broken" {
                return Err(HostError::Api("cannot create bot".to_string()));
            }
            Ok(BotIdentity {
                user_id: BOT_ID,
                username: username.to_string(),
            })
        }
    }

    /// Hands out the queued moderators in order.
    struct QueueFactory(StdMutex<VecDeque<Arc<StubModerator>>>);

    impl QueueFactory {
        fn new(moderators: &[Arc<StubModerator>]) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(moderators.iter().cloned().collect())))
        }
    }

    impl ModeratorFactory for QueueFactory {
        fn build(&self, _backend: &BackendConfig) -> Result<Arc<dyn Moderator>, ConfigError> {
            match self.0.lock().unwrap().pop_front() {
                Some(moderator) => Ok(moderator),
                None => Err(ConfigError::Backend("no moderator left".to_string())),
            }
        }
    }

    fn supervisor(factory: Arc<QueueFactory>) -> (ModerationSupervisor, Arc<MockHost>) {
        let host = Arc::new(MockHost::default());
        let supervisor = ModerationSupervisor::new(host.clone(), Arc::new(StubProvisioner), factory);
        (supervisor, host)
    }

    #[tokio::test]
    async fn starts_active_and_dispatches() {
        let moderator = StubModerator::new(Behavior::Score(keyword_verdict));
        let (supervisor, host) = supervisor(QueueFactory::new(&[moderator.clone()]));

        let status = supervisor.reconfigure(Ok(config(true, &[], 0.8))).await.unwrap();
        match status {
            SupervisorStatus::Active(active) => {
                assert_eq!(active.bot, bot());
                assert_eq!(active.moderator, "stub");
                assert_eq!(active.threshold, 0.8);
            }
            other => panic!("expected Active, got {:?}", other),
        }

        assert!(supervisor.dispatch(event(1, 42, "violence")).await);
        supervisor.shutdown().await;

        assert_eq!(moderator.calls(), 1);
        assert_eq!(host.calls().len(), 1);
        assert_eq!(supervisor.status().await, SupervisorStatus::Stopped);
    }

    #[tokio::test]
    async fn disabled_config_installs_nothing() {
        let moderator = StubModerator::new(Behavior::Score(keyword_verdict));
        let (supervisor, _host) = supervisor(QueueFactory::new(&[moderator.clone()]));

        let mut disabled = config(true, &[], 0.8);
        disabled.enabled = false;

        assert_eq!(
            supervisor.reconfigure(Ok(disabled)).await.unwrap(),
            SupervisorStatus::Disabled
        );
        assert!(!supervisor.dispatch(event(1, 42, "violence")).await);
        assert_eq!(moderator.calls(), 0);
    }

    #[tokio::test]
    async fn inert_config_provisions_bot_but_never_classifies() {
        let moderator = StubModerator::new(Behavior::Score(keyword_verdict));
        let (supervisor, _host) = supervisor(QueueFactory::new(&[moderator.clone()]));

        let status = supervisor.reconfigure(Ok(config(false, &[], 0.8))).await.unwrap();

        assert_eq!(status, SupervisorStatus::Inert { bot: bot() });
        for id in 0..5 {
            assert!(!supervisor.dispatch(event(id, 42, "violence")).await);
        }
        assert_eq!(moderator.calls(), 0);
    }

    #[tokio::test]
    async fn initialization_errors_keep_moderation_off() {
        let moderator = StubModerator::new(Behavior::Score(keyword_verdict));
        let (supervisor, _host) = supervisor(QueueFactory::new(&[moderator.clone()]));

        let mut broken_bot = config(true, &[], 0.8);
        broken_bot.bot_username = "broken".to_string();
        let err = supervisor.reconfigure(Ok(broken_bot)).await.unwrap_err();
        assert!(matches!(err, ConfigError::BotProvisioning(_)));
        assert!(matches!(supervisor.status().await, SupervisorStatus::Failed(_)));

        // Uses up the only moderator, then the factory runs dry.
        supervisor.reconfigure(Ok(config(true, &[], 0.8))).await.unwrap();
        let err = supervisor.reconfigure(Ok(config(true, &[], 0.8))).await.unwrap_err();
        assert!(matches!(err, ConfigError::Backend(_)));
        assert!(!supervisor.dispatch(event(1, 42, "violence")).await);
    }

    #[tokio::test]
    async fn invalid_config_stops_running_processor() {
        let moderator = StubModerator::new(Behavior::Score(keyword_verdict));
        let (supervisor, _host) = supervisor(QueueFactory::new(&[moderator.clone()]));

        supervisor.reconfigure(Ok(config(true, &[], 0.8))).await.unwrap();
        assert!(supervisor.dispatch(event(1, 42, "hello")).await);

        let loaded = Err(ConfigError::InvalidThreshold("very".to_string()));
        assert!(supervisor.reconfigure(loaded).await.is_err());

        assert!(!supervisor.dispatch(event(2, 42, "violence")).await);
        assert_eq!(moderator.calls(), 1);
        assert_eq!(
            supervisor.status().await,
            SupervisorStatus::Failed(
                "Invalid moderation threshold \"very\": expected a number between 0 and 1"
                    .to_string()
            )
        );
    }

    #[tokio::test]
    async fn reconfiguration_replaces_processor() {
        let old = StubModerator::new(Behavior::Score(keyword_verdict));
        let new = StubModerator::new(Behavior::Score(keyword_verdict));
        let (supervisor, host) = supervisor(QueueFactory::new(&[old.clone(), new.clone()]));

        supervisor.reconfigure(Ok(config(true, &[], 0.8))).await.unwrap();
        assert!(supervisor.dispatch(event(1, 42, "hello")).await);

        // Config B only targets user 7.
        supervisor.reconfigure(Ok(config(false, &[7], 0.5))).await.unwrap();
        let old_calls = old.calls();
        assert_eq!(old_calls, 1);

        assert!(supervisor.dispatch(event(2, 42, "violence")).await);
        assert!(supervisor.dispatch(event(3, 7, "violence")).await);
        supervisor.shutdown().await;

        assert_eq!(old.calls(), old_calls);
        assert_eq!(new.calls(), 1);
        assert_eq!(host.calls().len(), 1);
    }
}
