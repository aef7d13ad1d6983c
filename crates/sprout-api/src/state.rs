//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by the REST API.
//! The core service is generic over the repository trait, but AppState pins
//! it to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use sprout_core::boundary::{BoundaryDetector, BoundaryRules};
use sprout_core::conversation::ConversationService;
use sprout_core::finalize::FinalizeDispatcher;
use sprout_core::session::SessionStore;
use sprout_infra::config::load_service_config;
use sprout_infra::llm::DeepSeekClient;
use sprout_infra::sqlite::conversation::SqliteConversationRepository;
use sprout_infra::sqlite::pool::{resolve_data_dir, DatabasePool};
use sprout_types::config::ServiceConfig;

/// Concrete type alias for the service generics pinned to infra implementations.
pub type ConcreteConversationService = ConversationService<SqliteConversationRepository>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub conversation_service: Arc<ConcreteConversationService>,
    pub responder: Arc<DeepSeekClient>,
    pub config: ServiceConfig,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to the
    /// database, wire the lifecycle manager and its collaborators.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(resolve_data_dir());
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_service_config(&data_dir).await;

        let db_url = format!(
            "sqlite://{}?mode=rwc",
            data_dir.join("sprout.db").display()
        );
        let db_pool = DatabasePool::new(&db_url).await?;
        let repo = Arc::new(SqliteConversationRepository::new(db_pool.clone()));

        let api_key = std::env::var("DEEPSEEK_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("DEEPSEEK_API_KEY is not set; chat replies will fail upstream");
        }
        let responder = Arc::new(DeepSeekClient::new(SecretString::from(api_key), &config));

        let store = Arc::new(SessionStore::new());
        let detector = BoundaryDetector::new(BoundaryRules::from_config(&config));
        let dispatcher = FinalizeDispatcher::spawn(
            Arc::clone(&store),
            Arc::clone(&repo),
            Arc::clone(&responder),
            config.finalize_queue_capacity,
        );
        let conversation_service = Arc::new(ConversationService::new(
            store,
            detector,
            repo,
            dispatcher,
        ));

        Ok(Self {
            conversation_service,
            responder,
            config,
            db_pool,
        })
    }
}
