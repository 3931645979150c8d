use std::sync::Arc;

use tracing::{error, info};

use crate::config::Settings;
use crate::db::{MemoryStore, PgStore, Store};
use crate::event_bus::{
    EventBus, MemoryMessageStore, MessageStore, PgMessageStore, USER_ADDED, WELCOME_EMAIL,
};
use crate::mail::{LogTransport, MailTransport, WelcomeMailer};
use crate::models::{CreateItem, CreateUser, Item, SweepReport, User};
use crate::sweep::{check_pending_items, SweepScheduler};
use crate::TallyError;

/// The pieces a service is assembled from
pub struct Backends {
    pub store: Arc<dyn Store>,
    pub messages: Arc<dyn MessageStore>,
    pub transport: Arc<dyn MailTransport>,
}

impl Backends {
    /// In-memory store and bus with the logging mail transport
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            messages: Arc::new(MemoryMessageStore::new()),
            transport: Arc::new(LogTransport),
        }
    }

    /// PostgreSQL store and bus sharing one pool; runs migrations first
    pub async fn postgres(database_url: &str) -> crate::Result<Self> {
        let store = PgStore::new(database_url)?;

        info!("Running database migrations...");
        store.migrate().await?;

        let messages = PgMessageStore::new(store.pool());
        Ok(Self {
            store: Arc::new(store),
            messages: Arc::new(messages),
            transport: Arc::new(LogTransport),
        })
    }
}

/// Register every subscription the service needs
///
/// Must run before `EventBus::start`.
pub async fn register_subscribers(bus: &EventBus, welcome: Arc<WelcomeMailer>) -> anyhow::Result<()> {
    bus.subscribe(&USER_ADDED, WELCOME_EMAIL, welcome).await?;
    Ok(())
}

/// Items, users and the welcome pipeline behind one handle
///
/// Built once at startup by `init`, torn down by `shutdown`.
pub struct TallyService {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    welcome: Arc<WelcomeMailer>,
    scheduler: SweepScheduler,
}

impl TallyService {
    /// Pick backends from settings: PostgreSQL when `database_url` is set, memory otherwise
    pub async fn from_settings(settings: &Settings) -> crate::Result<Self> {
        let backends = if settings.uses_database() {
            info!("Using PostgreSQL store");
            Backends::postgres(&settings.database_url).await?
        } else {
            info!("No database_url configured, using in-memory store");
            Backends::in_memory()
        };

        Self::init(settings, backends).await
    }

    /// Register subscribers, start the bus, then start the sweep timer
    pub async fn init(settings: &Settings, backends: Backends) -> crate::Result<Self> {
        let scheduler = SweepScheduler::new(backends.store.clone(), settings.sweep.interval());
        Self::init_with_scheduler(settings, backends, scheduler).await
    }

    pub async fn init_with_scheduler(
        settings: &Settings,
        backends: Backends,
        scheduler: SweepScheduler,
    ) -> crate::Result<Self> {
        let bus = Arc::new(EventBus::new(backends.messages, settings.bus.clone()));
        let welcome = Arc::new(WelcomeMailer::new(
            backends.transport,
            settings.mail.clone(),
        ));

        register_subscribers(&bus, welcome.clone())
            .await
            .map_err(|e| TallyError::Config(format!("{:#}", e)))?;

        bus.start()
            .await
            .map_err(|e| TallyError::Unavailable(format!("event bus failed to start: {:#}", e)))?;

        scheduler.start().await;

        Ok(Self {
            store: backends.store,
            bus,
            welcome,
            scheduler,
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn welcome_mailer(&self) -> &Arc<WelcomeMailer> {
        &self.welcome
    }

    // ========================================================================
    // Item operations
    // ========================================================================

    pub async fn create_item(&self, title: impl Into<String>) -> crate::Result<Item> {
        let create = CreateItem::new(title)?;
        let item = self.store.create_item(create).await?;
        info!(item_id = item.id, "item created");
        Ok(item)
    }

    pub async fn list_items(&self) -> crate::Result<Vec<Item>> {
        self.store.list_items().await
    }

    /// Idempotent: an item that is already done is returned unchanged
    pub async fn mark_item_done(&self, id: i64) -> crate::Result<Item> {
        self.store
            .mark_item_done(id)
            .await?
            .ok_or_else(|| TallyError::NotFound(format!("Item {} not found", id)))
    }

    // ========================================================================
    // User operations
    // ========================================================================

    /// Store the user, then publish `user-added`
    ///
    /// The two writes are not atomic. If the publish fails the user still
    /// exists and `PartialFailure` carries it back to the caller.
    pub async fn create_user(
        &self,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> crate::Result<User> {
        let create = CreateUser::new(name, email)?;
        let event = create.added_event();
        let user = self.store.create_user(create).await?;
        info!(user_id = user.id, "user created");

        match self.bus.publish(&USER_ADDED, &event).await {
            Ok(message) => {
                info!(user_id = user.id, message_id = message.id, "user-added published");
                Ok(user)
            }
            Err(e) => {
                error!(user_id = user.id, "failed to publish user-added: {:#}", e);
                Err(TallyError::PartialFailure {
                    user,
                    topic: USER_ADDED.name().to_string(),
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    pub async fn get_user(&self, id: i64) -> crate::Result<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| TallyError::NotFound(format!("User {} not found", id)))
    }

    pub async fn list_users(&self) -> crate::Result<Vec<User>> {
        self.store.list_users().await
    }

    // ========================================================================
    // Sweep
    // ========================================================================

    pub async fn sweep(&self) -> crate::Result<SweepReport> {
        check_pending_items(self.store.as_ref()).await
    }

    /// Stop the sweep timer, then drain the bus
    pub async fn shutdown(&self) {
        info!("Shutting down services...");
        self.scheduler.shutdown().await;
        self.bus.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::SubscriptionInfo;

    #[tokio::test]
    async fn test_register_subscribers_wires_welcome_email() {
        let bus = EventBus::new(
            Arc::new(MemoryMessageStore::new()),
            Default::default(),
        );
        let welcome = Arc::new(WelcomeMailer::new(
            Arc::new(LogTransport),
            Default::default(),
        ));

        register_subscribers(&bus, welcome).await.unwrap();

        assert_eq!(
            bus.subscriptions().await,
            vec![SubscriptionInfo {
                topic: "user-added".to_string(),
                id: "welcome-email".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_not_found_is_distinct_from_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let service = TallyService::init(
            &Settings::default(),
            Backends {
                store: store.clone(),
                ..Backends::in_memory()
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            service.get_user(999_999).await,
            Err(TallyError::NotFound(_))
        ));
        assert!(matches!(
            service.mark_item_done(999_999).await,
            Err(TallyError::NotFound(_))
        ));

        store.set_available(false);
        assert!(service.get_user(1).await.unwrap_err().is_unavailable());
        assert!(service.list_items().await.unwrap_err().is_unavailable());

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_the_store() {
        let store = Arc::new(MemoryStore::new());
        let service = TallyService::init(
            &Settings::default(),
            Backends {
                store: store.clone(),
                ..Backends::in_memory()
            },
        )
        .await
        .unwrap();

        assert!(matches!(
            service.create_item("  ").await,
            Err(TallyError::Invalid(_))
        ));
        assert!(matches!(
            service.create_user("Ada", "not-an-address").await,
            Err(TallyError::Invalid(_))
        ));
        assert!(store.list_items().await.unwrap().is_empty());
        assert!(store.list_users().await.unwrap().is_empty());

        service.shutdown().await;
    }
}
