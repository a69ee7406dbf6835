mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use coderag_index::IndexerConfig;
use coderag_index::chunker::ChunkerConfig;
use coderag_index::scanner::{IgnoreSet, ScanOptions};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting configuration fails [`Config::validate`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error naming the first nonsensical value.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.index.max_chunk_size == 0 {
            bail!("index.max_chunk_size must be greater than zero");
        }
        if !(0.0..1.0).contains(&self.index.overlap_ratio) {
            bail!(
                "index.overlap_ratio must be in [0, 1), got {}",
                self.index.overlap_ratio
            );
        }
        if self.index.batch_size == 0 {
            bail!("index.batch_size must be greater than zero");
        }
        if self.index.parallelism == 0 {
            bail!("index.parallelism must be greater than zero");
        }
        if self.timeouts.embedding_seconds == 0 || self.timeouts.llm_seconds == 0 {
            bail!("timeouts must be greater than zero");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            bail!(
                "retrieval.min_score must be in [-1, 1], got {}",
                self.retrieval.min_score
            );
        }
        if self.generation.max_tokens == 0 {
            bail!("generation.max_tokens must be greater than zero");
        }
        self.ignore_set().context("invalid ignore pattern")?;
        Ok(())
    }

    /// Active ignore patterns: the configured list (or the defaults) plus `extra_ignore`.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern is not a valid glob.
    pub fn ignore_set(&self) -> coderag_index::Result<IgnoreSet> {
        match &self.index.ignore {
            Some(patterns) => {
                let mut all = patterns.clone();
                all.extend(self.index.extra_ignore.iter().cloned());
                IgnoreSet::new(&all)
            }
            None => IgnoreSet::with_extra(&self.index.extra_ignore),
        }
    }

    /// # Errors
    ///
    /// Returns an error if any ignore pattern is not a valid glob.
    pub fn indexer_config(&self) -> coderag_index::Result<IndexerConfig> {
        Ok(IndexerConfig {
            chunker: ChunkerConfig {
                max_chunk_size: self.index.max_chunk_size,
                overlap_ratio: self.index.overlap_ratio,
            },
            scan: ScanOptions {
                ignore: Arc::new(self.ignore_set()?),
                respect_gitignore: self.index.respect_gitignore,
                max_file_bytes: self.index.max_file_bytes,
            },
            parallelism: self.index.parallelism,
        })
    }

    #[must_use]
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.embedding_seconds)
    }

    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.llm_seconds)
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.retrieval.cache_ttl_secs)
    }

    #[must_use]
    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.index.watch_debounce_ms)
    }
}
