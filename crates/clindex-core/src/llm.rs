//! Embedding and chat provider boundaries.
//!
//! The pipeline never talks to an LLM transport directly. It consumes
//! two narrow async traits, [`Embedder`] and [`ChatProvider`], awaited
//! only at the documented suspension points (chunk embedding, topic
//! scoring, value normalization). Cancellation propagates by dropping
//! the future.
//!
//! Transport-class failures are retried with exponential backoff via
//! [`with_retry`]; each attempt is bounded by the configured timeout.
//! When an embedding call is exhausted the caller downgrades to a zero
//! vector, which every scorer treats as "no semantic evidence" rather
//! than an error.
//!
//! [`HashEmbedder`] is a deterministic lexical pseudo-embedder used in
//! tests and offline runs; it clusters by word overlap, not meaning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system` or `user`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Embedding provider boundary.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Vector dimensionality of this provider.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts. The default implementation loops; providers
    /// with a batch endpoint should override.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Chat provider boundary. Only the value normalizer calls this.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send a conversation, receive the assistant's text.
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;
}

/// A zero vector of the given dimensionality, the "unavailable" signal
/// downstream scorers fall back on.
#[must_use]
pub fn zero_vector(dimensions: usize) -> Vec<f32> {
    vec![0.0; dimensions]
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 on dimensionality mismatch or zero magnitude, so a zero
/// vector (the "unavailable" signal) never contributes evidence.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += f64::from(x) * f64::from(y);
        norm_a += f64::from(x) * f64::from(x);
        norm_b += f64::from(y) * f64::from(y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Run an async operation with per-attempt timeout and exponential
/// backoff.
///
/// Only transport-class errors ([`Error::is_recoverable`]) are retried;
/// everything else propagates immediately, HTTP status errors included.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>> + Send,
{
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);
    let attempts = config.attempts.max(1);

    let mut last_err = Error::Other(format!("{op_name}: no attempts made"));
    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{op_name} exceeded {}s",
                config.timeout_secs
            ))),
        };
        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_recoverable() && attempt < attempts => {
                warn!(op = op_name, attempt, error = %err, "retrying after transport error");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(max_delay);
                last_err = err;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err)
}

/// Embed a text, degrading to a zero vector when the provider is
/// exhausted. The warning ends up in the run's warning list via the
/// caller.
pub async fn embed_or_zero(
    embedder: &dyn Embedder,
    config: &RetryConfig,
    text: &str,
) -> (Vec<f32>, Option<String>) {
    match with_retry(config, "embed", || embedder.embed(text)).await {
        Ok(vector) => (vector, None),
        Err(err) => {
            let warning = format!("Embedding unavailable, using zero vector: {err}");
            warn!("{warning}");
            (zero_vector(embedder.dimensions()), Some(warning))
        }
    }
}

/// Deterministic lexical pseudo-embedder.
///
/// Hashes words (primary signal) and character trigrams (secondary) into
/// a fixed-size vector normalized to unit length. Similar wording yields
/// similar vectors; meaning plays no part.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Default dimensionality for offline runs.
    pub const DEFAULT_DIMENSIONS: usize = 256;

    /// Create an embedder with the given dimensionality.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash64(s: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        hasher.finish()
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn generate(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c.is_whitespace() {
                    c.to_lowercase().next().unwrap_or(c)
                } else {
                    ' '
                }
            })
            .collect();

        for word in normalized.split_whitespace() {
            let hash = Self::hash64(word);
            let idx = (hash as usize) % self.dimensions;
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            let magnitude = 1.0 + ((hash >> 16) & 0xFF) as f32 / 255.0;
            vector[idx] += sign * magnitude;
        }

        let chars: Vec<char> = normalized.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let hash = Self::hash64(&trigram);
            let idx = (hash as usize) % self.dimensions;
            let sign = if (hash >> 32) & 1 == 0 { 0.5 } else { -0.5 };
            vector[idx] += sign;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate(text))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        // Dimension mismatch and zero vectors score 0.
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hash_embedder_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(HashEmbedder::DEFAULT_DIMENSIONS);
        let a = embedder.embed("informed consent obtained").await.unwrap();
        let b = embedder.embed("informed consent obtained").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 256);
        let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_embedder_clusters_by_overlap() {
        let embedder = HashEmbedder::new(256);
        let base = embedder.embed("the quick brown fox").await.unwrap();
        let near = embedder.embed("the quick brown dog").await.unwrap();
        let far = embedder.embed("completely unrelated words").await.unwrap();
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn test_hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(64);
        let vector = embedder.embed("").await.unwrap();
        assert!(vector.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_with_retry_retries_recoverable_then_succeeds() {
        let config = RetryConfig {
            attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
            timeout_secs: 5,
        };
        let calls = AtomicU32::new(0);
        let result = with_retry(&config, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Timeout("transient".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_permanent_errors() {
        let config = RetryConfig::default();
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retry(&config, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::LlmUnavailable("401 unauthorized".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhaustion_returns_last_error() {
        let config = RetryConfig {
            attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 1,
            timeout_secs: 5,
        };
        let result: Result<u32> = with_retry(&config, "test", || async {
            Err(Error::Timeout("still down".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_embed_or_zero_degrades() {
        struct Failing;
        #[async_trait]
        impl Embedder for Failing {
            fn dimensions(&self) -> usize {
                8
            }
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                Err(Error::EmbeddingUnavailable("down".into()))
            }
        }
        let config = RetryConfig {
            attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            timeout_secs: 1,
        };
        let (vector, warning) = embed_or_zero(&Failing, &config, "text").await;
        assert_eq!(vector, vec![0.0; 8]);
        assert!(warning.unwrap().contains("zero vector"));
    }
}
