//! HTTP client for `/embeddings` endpoints.

use std::time::Duration;

use crate::error::EmbedError;

/// Local CPU-backed servers may take minutes on a large batch.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the client used for embedding calls.
///
/// Redirects are not followed; a redirect surfaces as a status error.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn embedding_client(request_timeout: Duration) -> Result<reqwest::Client, EmbedError> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .user_agent(concat!("codesync-embed/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    Ok(client)
}
