use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const PRODUCT_NAME: &str = "WynnWatch";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bootstrap resource returning the endpoint directory.
    pub bootstrap_url: String,
    /// Overrides the OS cache directory when set.
    pub cache_root: Option<PathBuf>,
    /// Environment tag carried in the identifying request header.
    pub environment: String,
    pub build_number: u32,
    pub territory_interval_ms: u64,
    pub friend_start_delay_ms: u64,
    pub friend_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bootstrap_url: "https://api.wynnwatch.dev/webapi".to_owned(),
            cache_root: None,
            environment: "client".to_owned(),
            build_number: 0,
            territory_interval_ms: 30_000,
            friend_start_delay_ms: 1_000,
            friend_interval_ms: 10_000,
        }
    }
}

impl SyncConfig {
    pub fn load_or_create() -> Result<(Self, PathBuf)> {
        let config_dir = dirs::config_dir()
            .context("unable to locate OS config directory")?
            .join("wynnwatch");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("failed creating config dir at {}", config_dir.display()))?;

        let config_path = config_dir.join("config.json");
        if !config_path.exists() {
            let default = Self::default();
            default.save(&config_path)?;
            return Ok((default, config_path));
        }

        let text = fs::read_to_string(&config_path)
            .with_context(|| format!("failed reading {}", config_path.display()))?;
        let config = serde_json::from_str::<Self>(&text)
            .with_context(|| format!("invalid json in {}", config_path.display()))?;
        Ok((config, config_path))
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let payload = serde_json::to_string_pretty(self).context("failed serializing config")?;
        fs::write(path, payload).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(())
    }

    /// Identifying header: product, version, build number, environment tag.
    pub fn user_agent(&self) -> String {
        format!(
            "{PRODUCT_NAME}/{}-{} ({})",
            env!("CARGO_PKG_VERSION"),
            self.build_number,
            self.environment
        )
    }

    pub fn resolved_cache_root(&self) -> PathBuf {
        self.cache_root.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("wynnwatch")
                .join("apicache")
        })
    }

    pub fn territory_interval(&self) -> Duration {
        Duration::from_millis(self.territory_interval_ms)
    }

    pub fn friend_start_delay(&self) -> Duration {
        Duration::from_millis(self.friend_start_delay_ms)
    }

    pub fn friend_interval(&self) -> Duration {
        Duration::from_millis(self.friend_interval_ms)
    }
}
