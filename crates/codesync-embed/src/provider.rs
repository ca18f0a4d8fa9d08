use crate::error::EmbedError;

/// Source of dense embeddings.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts in one request.
    ///
    /// The output has exactly one vector per input, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    /// The batch either succeeds as a whole or fails as a whole.
    fn embed_dense(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, EmbedError>> + Send;
}
