use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Crawl staging and fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Root under which per-request staging directories are created.
    pub data_root: PathBuf,
    /// Base url the fetch executor resolves search paths against; the
    /// worker falls back to a no-op executor when unset.
    pub base_url: Option<String>,
    pub request_timeout_seconds: u64,
}

impl CrawlerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("data_root must not be empty"));
        }

        if let Some(base_url) = &self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(anyhow::anyhow!("base_url must be an http(s) url"));
            }
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!(
                "request_timeout_seconds must be greater than 0"
            ));
        }

        Ok(())
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            base_url: None,
            request_timeout_seconds: 60,
        }
    }
}
