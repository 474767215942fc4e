use serde::{Deserialize, Serialize};

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkerConfig {
    /// Consumer identity; derived from hostname when empty.
    pub worker_id: String,
    /// Wipe a request's staging directory before re-processing it.
    pub reset_staging: bool,
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        // worker_id may be empty (auto-derived); nothing else to check yet
        Ok(())
    }
}
