use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::KnowledgeSettings;
use crate::errors::{KnowledgeError, KnowledgeResult};
use deuce_core::config::EmbeddingProvider;

/// Dimension used by the hash embedder when none is configured.
pub const DEFAULT_HASH_DIM: usize = 256;

/// Turns text into fixed-size vectors.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Identifies the vector space: two embedders with the same fingerprint
    /// produce comparable vectors. Persisted snapshots record it.
    fn fingerprint(&self) -> String {
        self.name().to_string()
    }

    /// Embed a batch of inputs, one vector per input, in order.
    async fn embed_batch(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>>;

    /// Embed a single input.
    async fn embed_one(&self, input: &str) -> KnowledgeResult<Vec<f32>> {
        self.embed_batch(&[input.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| KnowledgeError::Embedding("embedding response missing vectors".into()))
    }
}

/// Build the embedder selected in settings.
pub fn embedder_from_settings(settings: &KnowledgeSettings) -> Arc<dyn Embedder> {
    match settings.embedding_provider {
        EmbeddingProvider::Ollama => Arc::new(EmbeddingClient::new(settings)),
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(
            settings.embedding_dim.unwrap_or(DEFAULT_HASH_DIM),
        )),
    }
}

/// Ollama `/api/embed` client.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    expected_dim: Option<usize>,
    batch_size: usize,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(settings: &KnowledgeSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            base_url: settings.embedding_url.trim_end_matches('/').to_string(),
            model: settings.embedding_model.clone(),
            expected_dim: settings.embedding_dim,
            batch_size: settings.embedding_batch.max(1),
            client,
        }
    }

    async fn embed_request(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: EmbedResponse = response.json().await?;
        let vectors = match (payload.embeddings, payload.embedding) {
            (Some(embeddings), _) => embeddings,
            (None, Some(embedding)) => vec![embedding],
            (None, None) => {
                return Err(KnowledgeError::Embedding(
                    "embedding response missing vectors".to_string(),
                ));
            }
        };

        if vectors.len() != inputs.len() {
            return Err(KnowledgeError::Embedding(format!(
                "expected {} vectors, got {}",
                inputs.len(),
                vectors.len()
            )));
        }
        if let Some(expected) = self.expected_dim
            && let Some(bad) = vectors.iter().find(|v| v.len() != expected)
        {
            return Err(KnowledgeError::EmbeddingDimMismatch {
                expected,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }
}

#[async_trait::async_trait]
impl Embedder for EmbeddingClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn fingerprint(&self) -> String {
        match self.expected_dim {
            Some(dim) => format!("ollama/{}/{dim}", self.model),
            None => format!("ollama/{}", self.model),
        }
    }

    async fn embed_batch(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            out.extend(self.embed_request(batch).await?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase word (and each adjacent word pair) is hashed into a signed
/// bucket; the result is L2-normalised. Texts sharing vocabulary land close
/// together, which is enough for offline runs and tests.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1)
            .map(|w| w.to_lowercase())
            .collect();

        for word in &words {
            self.accumulate(&mut vector, word, 1.0);
        }
        for pair in words.windows(2) {
            self.accumulate(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        l2_normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dim as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait::async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn fingerprint(&self) -> String {
        format!("hash/{}", self.dim)
    }

    async fn embed_batch(&self, inputs: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|input| self.embed_text(input)).collect())
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed_one("kidney function and eGFR").await.unwrap();
        let b = embedder.embed_one("kidney function and eGFR").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_the_vector_space() {
        assert_eq!(HashEmbedder::new(64).fingerprint(), "hash/64");
        assert_ne!(HashEmbedder::new(64).fingerprint(), HashEmbedder::new(128).fingerprint());

        let settings = KnowledgeSettings {
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dim: Some(768),
            ..Default::default()
        };
        assert_eq!(
            EmbeddingClient::new(&settings).fingerprint(),
            "ollama/nomic-embed-text/768"
        );
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_text("what lowers cholesterol");
        let related = embedder.embed_text("diet and exercise lower cholesterol levels");
        let unrelated = embedder.embed_text("ovulation happens mid cycle");
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new(16);
        let v = embedder.embed_text("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }
}
