//! Runtime settings
//!
//! Settings come from the environment with sensible defaults; there is no
//! config file. `STRATUS_REGION` falls back to the lowercase `region`
//! variable some deploy scripts already export.

pub mod error;

pub use error::{ConfigError, Result};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_ACCOUNT: &str = "000000000000";
const DEFAULT_STATE_PATH: &str = ".stratus/state.json";

/// Resolved runtime settings for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Region the pass runs against.
    pub region: String,

    /// Account id used when deriving identities.
    pub account: String,

    /// Where the simulated control plane persists its state.
    pub state_path: PathBuf,

    /// Retry tuning applied to transient control-plane failures.
    pub retry: RetryTuning,
}

/// Backoff tuning, in milliseconds so it can come straight from env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryTuning {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub budget_ms: u64,
}

impl Default for RetryTuning {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            budget_ms: 300_000,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            retry: RetryTuning::default(),
        }
    }
}

impl Settings {
    /// Resolve settings from the environment.
    pub fn from_env() -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(region) = env_any(&["STRATUS_REGION", "region", "REGION"]) {
            settings.region = region;
        }
        if let Ok(account) = std::env::var("STRATUS_ACCOUNT") {
            settings.account = account;
        }
        if let Ok(path) = std::env::var("STRATUS_STATE_PATH") {
            settings.state_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var("STRATUS_RETRY_BUDGET_MS") {
            settings.retry.budget_ms =
                raw.parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        var: "STRATUS_RETRY_BUDGET_MS".to_string(),
                        value: raw,
                    })?;
        }
        Ok(settings)
    }
}

fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|value| !value.is_empty())
}
