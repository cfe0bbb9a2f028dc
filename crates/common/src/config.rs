use serde::{Deserialize, Serialize};

use crate::error::{GrcError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub security: SecurityConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub postgres_url: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost/grc".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: None,
            model: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            max_results: 5,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared secret expected from the external cron invoker
    pub cron_secret: Option<String>,
    /// Shared secret expected from the billing webhook relay
    pub billing_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}

impl SystemConfig {
    /// Load, apply environment overrides and validate
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GrcError::Config(format!("failed to read {}: {}", path, e)))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SystemConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Secrets and the database URL are usually injected by the environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.postgres_url = url;
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = lookup("SEARCH_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(secret) = lookup("GRC_CRON_SECRET") {
            self.security.cron_secret = Some(secret);
        }
        if let Some(secret) = lookup("GRC_BILLING_SECRET") {
            self.security.billing_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.postgres_url.trim().is_empty() {
            return Err(GrcError::validation("storage.postgres_url", "must not be empty"));
        }
        if self.storage.max_connections == 0 {
            return Err(GrcError::validation("storage.max_connections", "must be at least 1"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(GrcError::validation("llm.model", "must not be empty"));
        }
        if self.llm.max_tokens == 0 {
            return Err(GrcError::validation("llm.max_tokens", "must be at least 1"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(GrcError::validation("llm.timeout_secs", "must be at least 1"));
        }
        if self.search.max_results == 0 || self.search.max_results > 20 {
            return Err(GrcError::validation("search.max_results", "must be between 1 and 20"));
        }
        for (field, secret) in [
            ("security.cron_secret", &self.security.cron_secret),
            ("security.billing_secret", &self.security.billing_secret),
        ] {
            if matches!(secret, Some(s) if s.len() < 16) {
                return Err(GrcError::validation(field, "must be at least 16 characters"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = SystemConfig::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("DATABASE_URL", "postgresql://db/prod"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]);
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.storage.postgres_url, "postgresql://db/prod");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert!(config.security.cron_secret.is_none());
    }
}
