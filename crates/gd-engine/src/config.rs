use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gd_core::types::FilterListSource;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Filter lists in declared order. Rule IDs follow this order.
    #[serde(default = "default_sources")]
    pub sources: Vec<FilterListSource>,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Rule capacity of simulated enforcement surfaces
    #[serde(default = "default_surface_capacity")]
    pub surface_capacity: usize,

    #[serde(default = "default_badge_color")]
    pub badge_color: String,

    /// Requests remembered per tab
    #[serde(default = "default_tab_log_limit")]
    pub tab_log_limit: usize,
}

fn default_sources() -> Vec<FilterListSource> {
    vec![
        FilterListSource {
            id: "easylist".to_string(),
            name: "EasyList".to_string(),
            url: "https://easylist.to/easylist/easylist.txt".to_string(),
            enabled: true,
        },
        FilterListSource {
            id: "easyprivacy".to_string(),
            name: "EasyPrivacy".to_string(),
            url: "https://easylist.to/easylist/easyprivacy.txt".to_string(),
            enabled: false,
        },
        FilterListSource {
            id: "peter-lowe-list".to_string(),
            name: "Peter Lowe's List".to_string(),
            url: "https://pgl.yoyo.org/adservers/serverlist.php?hostformat=hosts&showintro=0&mimetype=plaintext"
                .to_string(),
            enabled: false,
        },
    ]
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Guardian/0.1".to_string()
}

fn default_surface_capacity() -> usize {
    5000
}

fn default_badge_color() -> String {
    "#e11d48".to_string()
}

fn default_tab_log_limit() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            surface_capacity: default_surface_capacity(),
            badge_color: default_badge_color(),
            tab_log_limit: default_tab_log_limit(),
        }
    }
}

impl EngineConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(ConfigError::Invalid("source id must not be empty".to_string()));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate source id '{}'", source.id)));
            }
            if source.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("source '{}' has no url", source.id)));
            }
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetchTimeoutSecs must be positive".to_string()));
        }
        if self.tab_log_limit == 0 {
            return Err(ConfigError::Invalid("tabLogLimit must be positive".to_string()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn source(&self, id: &str) -> Option<&FilterListSource> {
        self.sources.iter().find(|s| s.id == id)
    }
}
