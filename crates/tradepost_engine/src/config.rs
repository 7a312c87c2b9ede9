//! # Engine Configuration
//!
//! Tuning data lives in TOML, not in code. Every field has a production
//! default so an empty file (or a missing optional section) is valid.
//!
//! ```toml
//! data_dir = "data/shops"
//! session_timeout_ticks = 600
//!
//! [persist]
//! interval_ticks = 100
//! dirty_flush_threshold = 64
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tradepost_shared::{DEFAULT_CREDIT_RETRY_ATTEMPTS, DEFAULT_SESSION_TIMEOUT_TICKS};

use crate::error::{TradeError, TradeResult};
use crate::pipeline::PersistConfig;
use crate::tradelog::DEFAULT_LOG_CAPACITY;

/// Top-level engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one record file per shop.
    pub data_dir: PathBuf,
    /// Idle ticks before an open trade session expires.
    pub session_timeout_ticks: u64,
    /// Committed-trade history ring capacity.
    pub trade_log_capacity: usize,
    /// Delivery attempts before a deferred owner credit is dropped and
    /// reported.
    pub credit_retry_attempts: u32,
    /// Persistence pipeline tuning.
    pub persist: PersistConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/shops"),
            session_timeout_ticks: DEFAULT_SESSION_TIMEOUT_TICKS,
            trade_log_capacity: DEFAULT_LOG_CAPACITY,
            credit_retry_attempts: DEFAULT_CREDIT_RETRY_ATTEMPTS,
            persist: PersistConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on parse failure or out-of-range values.
    pub fn from_toml_str(toml_str: &str) -> TradeResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| TradeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file is unreadable or malformed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> TradeResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TradeError::InvalidConfig(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> TradeResult<()> {
        if self.session_timeout_ticks == 0 {
            return Err(TradeError::InvalidConfig(
                "session_timeout_ticks must be nonzero".to_string(),
            ));
        }
        if self.trade_log_capacity == 0 {
            return Err(TradeError::InvalidConfig(
                "trade_log_capacity must be nonzero".to_string(),
            ));
        }
        if self.credit_retry_attempts == 0 {
            return Err(TradeError::InvalidConfig(
                "credit_retry_attempts must be nonzero".to_string(),
            ));
        }
        self.persist.validate()
    }
}
