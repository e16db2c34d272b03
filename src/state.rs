use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::classifier::model::ModelConfig;
use crate::classifier::{BurnClassifier, Classifier};
use crate::config::{Config, StoreConfig};
use crate::db::cosmos::CosmosStore;
use crate::db::memory::MemoryStore;
use crate::db::service::DatabaseService;
use crate::db::store::DocumentStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabaseService,
    /// Loaded once at startup and shared read-only by all requests.
    pub classifier: Arc<dyn Classifier>,
    pub tokens: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        tracing::info!("Loading model from {}", config.model_path.display());
        let model_config = ModelConfig {
            image_size: config.image_size as usize,
            ..ModelConfig::default()
        };
        let classifier = BurnClassifier::load(&config.model_path, &model_config)?;
        tracing::info!("Model loaded from {}", config.model_path.display());

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let store = build_store(&config.store, http_client)?;

        Self::with_parts(config, store, Arc::new(classifier))
    }

    /// Assemble state from an already-built store and classifier.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn DocumentStore>,
        classifier: Arc<dyn Classifier>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.upload_dir)?;
        if config.auth_secret.is_empty() {
            tracing::warn!("AUTH_JWT_SECRET is empty; tokens are verified against an empty key");
        }

        Ok(Self {
            tokens: Arc::new(TokenVerifier::new(config.auth_secret.as_bytes())),
            db: DatabaseService::new(store),
            classifier,
            config,
        })
    }
}

fn build_store(
    config: &StoreConfig,
    client: reqwest::Client,
) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match &config.connection_string {
        Some(conn) => {
            let store = CosmosStore::new(client, conn, &config.database_id)?;
            tracing::info!("Using Cosmos DB database {}", config.database_id);
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("CONNECTION_STRING not set; using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
