use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::classifier::preprocess::DEFAULT_IMAGE_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Trained weights, without the recorder's `.mpk` extension
    pub model_path: PathBuf,
    /// Where uploads are written while they are classified
    pub upload_dir: PathBuf,
    /// Side length images are resized to before inference
    pub image_size: u32,
    /// Maximum images accepted by one predict call
    pub max_files: usize,
    /// Request body limit for uploads, in MB
    pub max_upload_mb: usize,
    /// Owner id whose registered model `model-info` reports
    pub model_owner_id: String,
    /// HS256 secret used to verify bearer tokens
    #[serde(skip_serializing, default)]
    pub auth_secret: String,
    /// Document store configuration
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// `AccountEndpoint=…;AccountKey=…;`. When unset an in-memory store is used.
    #[serde(skip_serializing)]
    pub connection_string: Option<String>,
    pub database_id: String,
    pub models_container: String,
    pub predictions_container: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            database_id: "CEC-2025".to_string(),
            models_container: "Models".to_string(),
            predictions_container: "Predictions".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
            model_path: PathBuf::from("model/brain_tumor_classifier"),
            upload_dir: PathBuf::from("./temp_uploads"),
            image_size: DEFAULT_IMAGE_SIZE,
            max_files: 100,
            max_upload_mb: 50,
            model_owner_id: "1".to_string(),
            auth_secret: String::new(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Read configuration from the environment, after loading a `.env` file
    /// if one is found. Variables already set take precedence over the file.
    pub fn from_env() -> Self {
        // Load .env file
        dotenvy::dotenv().ok();
        Self::from_vars()
    }

    fn from_vars() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("TUMOR_API_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("TUMOR_API_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("TUMOR_API_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Ok(val) = std::env::var("TUMOR_API_IMAGE_SIZE") {
            if let Ok(v) = val.parse() {
                config.image_size = v;
            }
        }
        if let Ok(val) = std::env::var("TUMOR_API_MAX_FILES") {
            if let Ok(v) = val.parse() {
                config.max_files = v;
            }
        }
        if let Ok(val) = std::env::var("TUMOR_API_MAX_UPLOAD_MB") {
            if let Ok(v) = val.parse() {
                config.max_upload_mb = v;
            }
        }
        if let Ok(owner) = std::env::var("TUMOR_API_MODEL_OWNER_ID") {
            config.model_owner_id = owner;
        }
        if let Ok(secret) = std::env::var("AUTH_JWT_SECRET") {
            config.auth_secret = secret;
        }

        // Document store
        if let Ok(conn) = std::env::var("CONNECTION_STRING") {
            if !conn.trim().is_empty() {
                config.store.connection_string = Some(conn);
            }
        }
        if let Ok(db) = std::env::var("COSMOS_DATABASE_ID") {
            config.store.database_id = db;
        }
        if let Ok(name) = std::env::var("TUMOR_API_MODELS_CONTAINER") {
            config.store.models_container = name;
        }
        if let Ok(name) = std::env::var("TUMOR_API_PREDICTIONS_CONTAINER") {
            config.store.predictions_container = name;
        }

        config
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }

    /// Temporary path for an upload: `<upload_dir>/temp_<filename>`.
    pub fn temp_upload_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join(format!("temp_{filename}"))
    }
}
