//! Application configuration.
//!
//! Loaded from a TOML file with `QXMON__*` environment overrides, e.g.
//! `QXMON__RPC_URL` or `QXMON__MONITOR__POLL_INTERVAL_MS`.

use std::collections::BTreeMap;

use qxmon_core::EntityId;
use qxmon_monitor::MonitorConfig;
use qxmon_notify::NotifierConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "QXMON";

/// Order placement settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfig {
    /// Ticks ahead of the current tick a new transaction should target.
    /// Default: 5.
    #[serde(default = "default_tick_offset")]
    pub tick_offset: u64,
    /// Ticks after the transaction's tick before an unconfirmed order is
    /// given up on. Default: 5.
    #[serde(default = "default_confirmation_grace_ticks")]
    pub confirmation_grace_ticks: u64,
}

fn default_tick_offset() -> u64 {
    5
}

fn default_confirmation_grace_ticks() -> u64 {
    5
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            tick_offset: default_tick_offset(),
            confirmation_grace_ticks: default_confirmation_grace_ticks(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Qubic RPC base URL (tick info, broadcast).
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// QX query API base URL (order books, trades).
    #[serde(default = "default_qx_api_url")]
    pub qx_api_url: String,

    /// How long one tick reading is shared between pollers (ms).
    /// Default: 1000.
    #[serde(default = "default_tick_cache_ttl_ms")]
    pub tick_cache_ttl_ms: u64,

    /// Push-hint listener. Disabled when `url` is empty.
    #[serde(default)]
    pub notify: NotifierConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub orders: OrderConfig,

    /// Known assets: name -> issuer identity.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
}

fn default_rpc_url() -> String {
    "https://rpc.qubic.org".to_string()
}

fn default_qx_api_url() -> String {
    "https://api.qubic.org".to_string()
}

fn default_tick_cache_ttl_ms() -> u64 {
    1_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            qx_api_url: default_qx_api_url(),
            tick_cache_ttl_ms: default_tick_cache_ttl_ms(),
            notify: NotifierConfig::default(),
            monitor: MonitorConfig::default(),
            orders: OrderConfig::default(),
            assets: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (if given) layered under environment overrides.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| AppError::Config(format!("Failed to load config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document (no environment overrides).
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(AppError::Config("rpc_url is empty".to_string()));
        }
        if self.qx_api_url.trim().is_empty() {
            return Err(AppError::Config("qx_api_url is empty".to_string()));
        }
        self.monitor.validate()?;
        for (name, issuer) in &self.assets {
            if issuer.trim().is_empty() {
                return Err(AppError::Config(format!("asset {name} has no issuer")));
            }
        }
        Ok(())
    }

    /// Asset table keyed by upper-case name.
    pub fn asset_issuers(&self) -> AppResult<BTreeMap<String, EntityId>> {
        self.assets
            .iter()
            .map(|(name, issuer)| Ok((name.to_ascii_uppercase(), EntityId::new(issuer.as_str())?)))
            .collect()
    }

    pub fn notify_enabled(&self) -> bool {
        !self.notify.url.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.notify_enabled());
        assert_eq!(config.orders.confirmation_grace_ticks, 5);
        assert_eq!(config.monitor.poll_interval_ms, 2_000);
    }

    #[test]
    fn test_parse_full_document() {
        let config = AppConfig::from_toml_str(
            r#"
rpc_url = "http://localhost:8000"
tick_cache_ttl_ms = 500

[notify]
url = "https://api.qubic.example"
events = ["trades_updated"]

[monitor]
poll_interval_ms = 1000
min_poll_gap_ms = 200

[orders]
confirmation_grace_ticks = 8

[assets]
cfb = "CFBMEMZOIDEXQAUXYYSZIURADQLAPWPMNJXQSNVQZAHYVOPYUKKJBJUCTVJL"
"#,
        )
        .unwrap();

        assert_eq!(config.rpc_url, "http://localhost:8000");
        assert_eq!(config.qx_api_url, "https://api.qubic.org");
        assert!(config.notify_enabled());
        assert_eq!(config.notify.max_reconnect_attempts, 5);
        assert_eq!(config.monitor.min_poll_gap_ms, 200);
        assert_eq!(config.orders.tick_offset, 5);
        assert_eq!(config.orders.confirmation_grace_ticks, 8);

        let assets = config.asset_issuers().unwrap();
        assert!(assets.contains_key("CFB"));
    }

    #[test]
    fn test_shipped_default_file_parses() {
        let config =
            AppConfig::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert!(!config.notify_enabled());
        assert_eq!(config.asset_issuers().unwrap().len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("qxmon-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.toml");
        std::fs::write(&path, "qx_api_url = \"http://localhost:9000\"\n").unwrap();

        let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.qx_api_url, "http://localhost:9000");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_rejects_invalid_monitor_schedule() {
        let err = AppConfig::from_toml_str("[monitor]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, AppError::Monitor(_)));
    }

    #[test]
    fn test_rejects_blank_issuer() {
        assert!(AppConfig::from_toml_str("[assets]\nCFB = \" \"\n").is_err());
    }
}
