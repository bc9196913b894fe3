//! Serializer configuration.
//!
//! [`FluxConfig`] is loaded from `config/config.toml` (section `[flux]`) and
//! environment variables prefixed with `FLUX__`, e.g. `FLUX__FLUX__DEPTH_LIMIT=30`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Fixed traversal bound used when nothing else is configured.
pub const DEFAULT_DEPTH_LIMIT: usize = 20;

/// Default number of rows per page for paginated listings.
pub const DEFAULT_PAGE_SIZE: u64 = 24;

const CONFIG_FILE: &str = "config/config.toml";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FluxConfig {
    #[serde(default = "default_depth_limit")]
    pub depth_limit: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Overall budget for one discover + assemble run; unlimited when unset
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Fetch independent entity types concurrently on `may` coroutines
    #[serde(default)]
    pub parallel_fetch: bool,
}

fn default_depth_limit() -> usize {
    DEFAULT_DEPTH_LIMIT
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for FluxConfig {
    fn default() -> Self {
        Self {
            depth_limit: default_depth_limit(),
            page_size: default_page_size(),
            deadline_ms: None,
            parallel_fetch: false,
        }
    }
}

impl FluxConfig {
    /// Load the configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("FLUX").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("FLUX").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        // A missing section is not an error: every field has a default.
        match settings.get::<FluxConfig>("flux") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Flux configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = FluxConfig::default();
        assert_eq!(cfg.depth_limit, 20);
        assert_eq!(cfg.page_size, 24);
        assert_eq!(cfg.deadline(), None);
        assert!(!cfg.parallel_fetch);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let settings = Config::builder()
            .add_source(config::File::from_str(
                "[flux]\ndeadline_ms = 250\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: FluxConfig = settings.get("flux").unwrap();
        assert_eq!(cfg.depth_limit, DEFAULT_DEPTH_LIMIT);
        assert_eq!(cfg.deadline(), Some(Duration::from_millis(250)));
    }
}
