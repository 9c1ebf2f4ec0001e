use crate::config::{save_config, AppConfig, ConfigError, ProxyProtocol};
use crate::error::AppResult;
use crate::llm::{build_http_client, openai};
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::time::Duration;

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize)]
pub struct ProviderOption {
    pub key: String,
    pub name: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtocolOption {
    pub value: &'static str,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyView {
    pub enabled: bool,
    pub protocol: String,
    pub host: String,
    pub port: String,
    pub username: String,
    pub has_password: bool,
}

/// Settings as the admin page shows them. Secrets never leave masked.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub model_provider: String,
    pub provider_name: String,
    pub providers: Vec<ProviderOption>,
    pub api_key_masked: String,
    pub has_api_key: bool,
    pub base_url: String,
    pub model_name: String,
    pub retriever_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_api_key_masked: String,
    pub has_embedding_api_key: bool,
    pub proxy: ProxyView,
    pub protocols: Vec<ProtocolOption>,
}

/// Fields posted by the settings form. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsForm {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model_name: Option<String>,
    pub retriever_k: Option<String>,
    pub chunk_size: Option<String>,
    pub chunk_overlap: Option<String>,
    pub embedding_base_url: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_api_key: Option<String>,
    /// Checkbox; present only when ticked.
    pub proxy_enabled: Option<String>,
    pub proxy_protocol: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    /// "save" persists, anything else only applies.
    pub action: Option<String>,
}

impl SettingsForm {
    pub fn wants_save(&self) -> bool {
        self.action.as_deref() == Some("save")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
    pub detail: Option<String>,
}

impl ConnectionReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            detail: None,
        }
    }
}

/// `abcd...wxyz` for long secrets, `****` for short ones, empty when unset.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.trim().chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n > 8 => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{head}...{tail}")
        }
        _ => "****".to_string(),
    }
}

pub fn settings_view(config: &AppConfig) -> AppResult<SettingsView> {
    let provider = config.active_provider()?;
    Ok(SettingsView {
        model_provider: config.model_provider.clone(),
        provider_name: provider.name.clone(),
        providers: config
            .providers
            .iter()
            .map(|(key, p)| ProviderOption {
                key: key.clone(),
                name: p.name.clone(),
                selected: *key == config.model_provider,
            })
            .collect(),
        api_key_masked: mask_secret(&provider.api_key),
        has_api_key: provider.has_api_key(),
        base_url: provider.base_url.clone(),
        model_name: provider.model_name.clone(),
        retriever_k: config.rag_settings.retriever_k,
        chunk_size: config.rag_settings.chunk_size,
        chunk_overlap: config.rag_settings.chunk_overlap,
        embedding_base_url: config.embedding.base_url.clone(),
        embedding_model: config.embedding.model.clone(),
        embedding_api_key_masked: mask_secret(&config.embedding.api_key),
        has_embedding_api_key: !config.embedding.api_key.trim().is_empty(),
        proxy: ProxyView {
            enabled: config.proxy.enabled,
            protocol: config.proxy.protocol.to_string(),
            host: config.proxy.host.clone(),
            port: config.proxy.port.clone(),
            username: config.proxy.username.clone(),
            has_password: !config.proxy.password.is_empty(),
        },
        protocols: ProxyProtocol::ALL
            .iter()
            .map(|p| ProtocolOption {
                value: p.as_str(),
                selected: *p == config.proxy.protocol,
            })
            .collect(),
    })
}

fn parse_count(field: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(format!("{field} must be a whole number")))
}

fn required(field: &str, raw: &str) -> Result<String, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

/// Apply the posted form onto `config`. Credentials go to the provider that
/// is selected after the form's own provider choice.
pub fn apply_settings(config: &mut AppConfig, form: &SettingsForm) -> Result<(), ConfigError> {
    if let Some(key) = form.provider.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        config.switch_provider(key)?;
    }

    let active = config.model_provider.clone();
    let provider = config
        .providers
        .get_mut(&active)
        .ok_or(ConfigError::UnknownProvider(active))?;
    if let Some(key) = form.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        provider.api_key = key.to_string();
    }
    if let Some(url) = &form.base_url {
        provider.base_url = required("Base URL", url)?;
    }
    if let Some(model) = &form.model_name {
        provider.model_name = required("Model name", model)?;
    }

    let rag = &mut config.rag_settings;
    if let Some(k) = &form.retriever_k {
        rag.retriever_k = parse_count("Retriever k", k)?;
    }
    if let Some(size) = &form.chunk_size {
        rag.chunk_size = parse_count("Chunk size", size)?;
    }
    if let Some(overlap) = &form.chunk_overlap {
        rag.chunk_overlap = parse_count("Chunk overlap", overlap)?;
    }
    if rag.retriever_k == 0 {
        return Err(ConfigError::Invalid("Retriever k must be at least 1".into()));
    }
    if rag.chunk_overlap >= rag.chunk_size {
        return Err(ConfigError::Invalid(
            "Chunk overlap must be smaller than chunk size".into(),
        ));
    }

    let embedding = &mut config.embedding;
    if let Some(url) = &form.embedding_base_url {
        embedding.base_url = required("Embedding URL", url)?;
    }
    if let Some(model) = &form.embedding_model {
        embedding.model = required("Embedding model", model)?;
    }
    if let Some(key) = form
        .embedding_api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        embedding.api_key = key.to_string();
    }

    let proxy = &mut config.proxy;
    proxy.enabled = form.proxy_enabled.is_some();
    if let Some(protocol) = &form.proxy_protocol {
        proxy.protocol = protocol.parse()?;
    }
    if let Some(host) = &form.proxy_host {
        proxy.host = host.trim().to_string();
    }
    if let Some(port) = &form.proxy_port {
        let port = port.trim();
        if !port.is_empty() && !matches!(port.parse::<u16>(), Ok(p) if p > 0) {
            return Err(ConfigError::Invalid(format!(
                "Proxy port must be between 1 and 65535, got {port:?}"
            )));
        }
        proxy.port = port.to_string();
    }
    if let Some(username) = &form.proxy_username {
        proxy.username = username.trim().to_string();
    }
    if let Some(password) = form.proxy_password.as_deref().filter(|p| !p.is_empty()) {
        proxy.password = password.to_string();
    }

    Ok(())
}

/// Apply to the running configuration only; nothing is written to disk.
pub fn update_settings(state: &AppState, form: &SettingsForm) -> AppResult<()> {
    state.update_config(|config| Ok(apply_settings(config, form)?))?;
    tracing::info!("settings applied");
    Ok(())
}

pub fn save_settings(state: &AppState, form: &SettingsForm) -> AppResult<()> {
    let config = state.update_config(|config| {
        apply_settings(config, form)?;
        Ok(config.clone())
    })?;
    save_config(&state.paths.config_file, &config)?;
    tracing::info!(path = %state.paths.config_file.display(), "settings saved");
    Ok(())
}

pub fn switch_provider(state: &AppState, key: &str) -> AppResult<()> {
    state.update_config(|config| Ok(config.switch_provider(key)?))?;
    tracing::info!(provider = key, "switched model provider");
    Ok(())
}

fn error_chain(err: &dyn StdError) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    lines.join("\n")
}

/// Round trip to the active provider's `/models` endpoint through the
/// configured proxy.
pub async fn test_connection(config: &AppConfig, show_detail: bool) -> ConnectionReport {
    let proxy = &config.proxy;
    if proxy.enabled && !proxy.is_addressable() {
        return ConnectionReport::failed("Proxy host and port are required");
    }

    let provider = match config.active_provider() {
        Ok(p) => p,
        Err(e) => return ConnectionReport::failed(e.to_string()),
    };
    if !provider.has_api_key() {
        return ConnectionReport::failed(format!("No API key configured for {}", provider.name));
    }

    let route = if proxy.enabled {
        format!(
            "through proxy {}://{}:{}",
            proxy.protocol,
            proxy.host.trim(),
            proxy.port.trim()
        )
    } else {
        "directly".to_string()
    };

    let client = match build_http_client(config.proxy_url().as_deref(), CONNECTION_TEST_TIMEOUT) {
        Ok(client) => client,
        Err(e) => {
            return ConnectionReport {
                success: false,
                message: format!("Invalid proxy configuration: {e}"),
                detail: show_detail.then(|| error_chain(&e)),
            }
        }
    };

    match openai::list_models(&client, &openai::OpenAiConfig::from(provider)).await {
        Ok(models) => {
            tracing::info!(provider = %provider.name, models = models.len(), "connection test passed");
            ConnectionReport {
                success: true,
                message: format!(
                    "Connected to {} {route} ({} models available)",
                    provider.name,
                    models.len()
                ),
                detail: None,
            }
        }
        Err(e) => {
            tracing::warn!(provider = %provider.name, error = %e, "connection test failed");
            ConnectionReport {
                success: false,
                message: format!("Could not reach {} {route}: {e}", provider.name),
                detail: show_detail.then(|| error_chain(&e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, AppPaths};
    use crate::db::Database;

    fn form() -> SettingsForm {
        SettingsForm::default()
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("sk-1234567890abcd"), "sk-1...abcd");
        assert_eq!(mask_secret("short"), "****");
        assert_eq!(mask_secret(""), "");
    }

    #[test]
    fn test_view_never_contains_full_key() {
        let mut config = AppConfig::default();
        config.providers.get_mut("deepseek").unwrap().api_key = "sk-secretsecretsecret".into();
        config.embedding.api_key = "emb-secretsecretsecret".into();
        let view = settings_view(&config).unwrap();
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("sk-secretsecretsecret"));
        assert!(!json.contains("emb-secretsecretsecret"));
        assert_eq!(view.api_key_masked, "sk-s...cret");
        assert_eq!(view.providers.iter().filter(|p| p.selected).count(), 1);
    }

    #[test]
    fn test_blank_api_key_keeps_existing() {
        let mut config = AppConfig::default();
        config.providers.get_mut("deepseek").unwrap().api_key = "sk-old".into();
        let update = SettingsForm {
            api_key: Some("   ".into()),
            model_name: Some("deepseek-reasoner".into()),
            ..form()
        };
        apply_settings(&mut config, &update).unwrap();
        let provider = config.active_provider().unwrap();
        assert_eq!(provider.api_key, "sk-old");
        assert_eq!(provider.model_name, "deepseek-reasoner");
    }

    #[test]
    fn test_credentials_go_to_selected_provider_only() {
        let mut config = AppConfig::default();
        let update = SettingsForm {
            provider: Some("grok".into()),
            api_key: Some("xai-key".into()),
            ..form()
        };
        apply_settings(&mut config, &update).unwrap();
        assert_eq!(config.model_provider, "grok");
        assert_eq!(config.providers["grok"].api_key, "xai-key");
        assert!(config.providers["deepseek"].api_key.is_empty());
        assert!(config.providers["openai"].api_key.is_empty());
    }

    #[test]
    fn test_embedding_endpoint_is_editable() {
        let mut config = AppConfig::default();
        config.embedding.api_key = "emb-old-key-0001".into();
        let update = SettingsForm {
            embedding_base_url: Some(" https://api.openai.com/v1 ".into()),
            embedding_model: Some("text-embedding-3-small".into()),
            embedding_api_key: Some("".into()),
            ..form()
        };
        apply_settings(&mut config, &update).unwrap();
        assert_eq!(config.embedding.base_url, "https://api.openai.com/v1");
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.api_key, "emb-old-key-0001");

        let view = settings_view(&config).unwrap();
        assert_eq!(view.embedding_api_key_masked, "emb-...0001");
        assert!(view.has_embedding_api_key);

        let blank_model = SettingsForm {
            embedding_model: Some("  ".into()),
            ..form()
        };
        assert!(apply_settings(&mut config, &blank_model).is_err());
    }

    #[test]
    fn test_proxy_fields_untouched_when_hidden() {
        let mut config = AppConfig::default();
        config.proxy.host = "10.0.0.1".into();
        config.proxy.port = "1080".into();
        apply_settings(&mut config, &form()).unwrap();
        assert!(!config.proxy.enabled);
        assert_eq!(config.proxy.host, "10.0.0.1");
        assert_eq!(config.proxy.port, "1080");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            SettingsForm {
                proxy_port: Some("70000".into()),
                ..form()
            },
            SettingsForm {
                proxy_port: Some("0".into()),
                ..form()
            },
            SettingsForm {
                proxy_protocol: Some("ftp".into()),
                ..form()
            },
            SettingsForm {
                retriever_k: Some("0".into()),
                ..form()
            },
            SettingsForm {
                chunk_size: Some("100".into()),
                chunk_overlap: Some("100".into()),
                ..form()
            },
            SettingsForm {
                model_name: Some(" ".into()),
                ..form()
            },
        ];
        for case in cases {
            let mut config = AppConfig::default();
            assert!(apply_settings(&mut config, &case).is_err(), "{case:?}");
        }
    }

    #[test]
    fn test_save_then_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let state = AppState::new(paths.clone(), AppConfig::default(), Database::in_memory().unwrap());

        let update = SettingsForm {
            provider: Some("openai".into()),
            api_key: Some("sk-openai".into()),
            retriever_k: Some("6".into()),
            proxy_enabled: Some("on".into()),
            proxy_protocol: Some("socks5".into()),
            proxy_host: Some("127.0.0.1".into()),
            proxy_port: Some("1080".into()),
            action: Some("save".into()),
            ..form()
        };
        assert!(update.wants_save());
        save_settings(&state, &update).unwrap();

        let reloaded = load_config(&paths.config_file).unwrap();
        assert_eq!(reloaded, state.config().unwrap());
        assert_eq!(reloaded.model_provider, "openai");
        assert_eq!(reloaded.rag_settings.retriever_k, 6);
        assert_eq!(
            reloaded.proxy_url().as_deref(),
            Some("socks5://127.0.0.1:1080")
        );
    }

    #[test]
    fn test_apply_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path());
        let state = AppState::new(paths.clone(), AppConfig::default(), Database::in_memory().unwrap());
        update_settings(
            &state,
            &SettingsForm {
                model_name: Some("deepseek-reasoner".into()),
                ..form()
            },
        )
        .unwrap();
        assert!(!paths.config_file.exists());
        assert_eq!(state.config().unwrap().active_provider().unwrap().model_name, "deepseek-reasoner");
    }

    #[test]
    fn test_switch_provider_rejects_unknown() {
        let state = AppState::new(
            AppPaths::new("/tmp/kbqa-settings-test"),
            AppConfig::default(),
            Database::in_memory().unwrap(),
        );
        assert!(switch_provider(&state, "mistral").is_err());
        switch_provider(&state, "grok").unwrap();
        assert_eq!(state.config().unwrap().model_provider, "grok");
    }

    #[tokio::test]
    async fn test_connection_requires_proxy_address() {
        let mut config = AppConfig::default();
        config.proxy.enabled = true;
        let report = test_connection(&config, true).await;
        assert!(!report.success);
        assert!(report.message.contains("host and port"));
    }

    #[tokio::test]
    async fn test_connection_requires_api_key() {
        let report = test_connection(&AppConfig::default(), false).await;
        assert!(!report.success);
        assert!(report.message.contains("DeepSeek"));
        assert!(report.detail.is_none());
    }

    #[tokio::test]
    async fn test_connection_failure_reports_detail() {
        let mut config = AppConfig::default();
        let provider = config.providers.get_mut("deepseek").unwrap();
        provider.api_key = "sk-test".into();
        provider.base_url = "http://127.0.0.1:9".into();

        let report = test_connection(&config, true).await;
        assert!(!report.success);
        assert!(report.message.contains("directly"));
        assert!(report.detail.is_some());
    }
}
