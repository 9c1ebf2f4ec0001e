use std::sync::{Arc, RwLock};

use crate::cache::Memo;
use crate::config::{load_config, AppConfig, AppPaths, EmbeddingSettings, ProviderConfig};
use crate::db::Database;
use crate::embedding::ApiEmbedder;
use crate::error::{AppError, AppResult};
use crate::llm::LlmClient;

/// Construction parameters of the chat client.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmKey {
    pub provider: ProviderConfig,
    pub proxy_url: Option<String>,
}

/// Construction parameters of the embedder.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedderKey {
    pub settings: EmbeddingSettings,
    pub proxy_url: Option<String>,
}

/// Everything a request handler needs. Configuration edits land here first
/// and reach disk only through an explicit save.
pub struct AppState {
    pub paths: AppPaths,
    pub db: Database,
    config: RwLock<AppConfig>,
    llm: Memo<LlmKey, LlmClient>,
    embedder: Memo<EmbedderKey, ApiEmbedder>,
}

impl AppState {
    pub fn new(paths: AppPaths, config: AppConfig, db: Database) -> Arc<Self> {
        Arc::new(Self {
            paths,
            db,
            config: RwLock::new(config),
            llm: Memo::new(),
            embedder: Memo::new(),
        })
    }

    pub fn initialize(paths: AppPaths) -> AppResult<Arc<Self>> {
        let config = load_config(&paths.config_file)?;
        std::fs::create_dir_all(&paths.upload_dir)?;
        let db = Database::new(&paths.db_path)?;
        Ok(Self::new(paths, config, db))
    }

    /// Snapshot of the current configuration; never hold the lock across an
    /// await point.
    pub fn config(&self) -> AppResult<AppConfig> {
        Ok(self.config.read()?.clone())
    }

    /// Runs `edit` on a copy and commits it only when the edit succeeds.
    pub fn update_config<T>(
        &self,
        edit: impl FnOnce(&mut AppConfig) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut config = self.config.write()?;
        let mut draft = config.clone();
        let out = edit(&mut draft)?;
        *config = draft;
        Ok(out)
    }

    /// Chat client for the active provider, rebuilt only when its provider
    /// entry or the proxy changes.
    pub fn llm(&self, config: &AppConfig) -> AppResult<Arc<LlmClient>> {
        let provider = config.active_provider()?;
        if !provider.has_api_key() {
            return Err(AppError::MissingApiKey(provider.name.clone()));
        }
        let key = LlmKey {
            provider: provider.clone(),
            proxy_url: config.proxy_url(),
        };
        self.llm
            .get_or_build(&key, |k| LlmClient::new(&k.provider, k.proxy_url.as_deref()))
    }

    pub fn embedder(&self, config: &AppConfig) -> AppResult<Arc<ApiEmbedder>> {
        let key = EmbedderKey {
            settings: config.embedding.clone(),
            proxy_url: config.proxy_url(),
        };
        self.embedder
            .get_or_build(&key, |k| ApiEmbedder::new(k.settings.clone(), k.proxy_url.as_deref()))
    }
}
