mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.base_url.trim().is_empty() {
            bail!("embedding.base_url must not be empty");
        }
        if self.embedding.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        if self.embedding.dimensions == 0 {
            bail!("embedding.dimensions must be greater than 0");
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be greater than 0");
        }
        if self.qdrant.url.trim().is_empty() {
            bail!("qdrant.url must not be empty");
        }
        if self.qdrant.collection.trim().is_empty() {
            bail!("qdrant.collection must not be empty");
        }
        if self.chunker.max_size == 0 {
            bail!("chunker.max_size must be greater than 0");
        }
        if self.chunker.overlap >= self.chunker.max_size {
            bail!(
                "chunker.overlap ({}) must be less than chunker.max_size ({})",
                self.chunker.overlap,
                self.chunker.max_size
            );
        }
        if self.watch.url.trim().is_empty() {
            bail!("watch.url must not be empty");
        }
        if self.watch.base_interval_ms == 0 {
            bail!("watch.base_interval_ms must be greater than 0");
        }
        Ok(())
    }
}
