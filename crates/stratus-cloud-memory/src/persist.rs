//! JSON persistence for the in-memory control plane
//!
//! The CLI keeps the simulated account in a versioned `state.json`; the
//! previous file is moved to a backup before every save.

use crate::cloud::{MemoryCloud, State};
use crate::error::{PersistError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use stratus_cloud::Env;
use tokio::fs;

const STATE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StateFile {
    version: u32,
    updated_at: DateTime<Utc>,
    env: Env,
    state: State,
}

impl MemoryCloud {
    /// Load a persisted control plane, or start fresh with `default_env`
    /// when the file does not exist yet.
    pub async fn load(path: &Path, default_env: Env) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "state file not found, starting fresh");
            return Ok(Self::new(default_env));
        }
        let content = fs::read_to_string(path).await?;
        let file: StateFile = serde_json::from_str(&content)?;
        if file.version > STATE_VERSION {
            return Err(PersistError::Version {
                found: file.version,
                supported: STATE_VERSION,
            });
        }
        tracing::debug!(
            resources = file.state.resources.len(),
            "loaded control-plane state"
        );
        Ok(Self {
            env: file.env,
            state: Mutex::new(file.state),
        })
    }

    /// Save the control plane, keeping the previous file as a backup.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await?;
        }

        let content = {
            let state = self.state.lock().unwrap();
            let file = StateFile {
                version: STATE_VERSION,
                updated_at: Utc::now(),
                env: self.env.clone(),
                state: state.clone(),
            };
            serde_json::to_string_pretty(&file)?
        };

        if path.exists() {
            let backup = path.with_extension("json.backup");
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(path, &backup).await?;
            tracing::debug!("created state backup");
        }

        fs::write(path, content).await?;
        Ok(())
    }
}
