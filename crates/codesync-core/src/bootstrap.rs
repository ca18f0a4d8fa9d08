//! Application bootstrap: config resolution, embedder/store/service construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use codesync_embed::OpenAiEmbedder;
use codesync_store::QdrantStore;

use crate::config::Config;
use crate::service::CodeSearchService;

/// Priority: CLI `--config` > `CODESYNC_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODESYNC_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// Load and validate the configuration.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or a value is invalid.
pub fn load_config(cli: Option<&Path>) -> anyhow::Result<Config> {
    let path = resolve_config_path(cli);
    let config = Config::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn create_embedder(config: &Config) -> anyhow::Result<OpenAiEmbedder> {
    let api_key = config
        .embedding
        .api_key
        .as_ref()
        .map(|k| k.expose().to_owned())
        .unwrap_or_default();
    OpenAiEmbedder::new(
        api_key,
        config.embedding.base_url.clone(),
        config.embedding.model.clone(),
        Duration::from_secs(config.embedding.timeout_secs),
    )
    .context("failed to build embedding client")
}

/// # Errors
///
/// Returns an error if the Qdrant client cannot be created.
pub fn create_store(config: &Config) -> anyhow::Result<QdrantStore> {
    QdrantStore::new(&config.qdrant.url, config.embedding.dimensions)
        .with_context(|| format!("failed to create qdrant client for {}", config.qdrant.url))
}

/// # Errors
///
/// Returns an error if the store or the embedding client cannot be created.
pub fn build_service(config: &Config) -> anyhow::Result<CodeSearchService<OpenAiEmbedder>> {
    let store = Arc::new(create_store(config)?);
    let embedder = Arc::new(create_embedder(config)?);
    tracing::info!(
        qdrant = %config.qdrant.url,
        embedding = %config.embedding.base_url,
        model = %config.embedding.model,
        "service initialized"
    );
    Ok(CodeSearchService::new(
        store,
        embedder,
        config.indexer_config(),
    ))
}
