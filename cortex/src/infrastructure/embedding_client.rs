// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Client
//!
//! Provides the embedding providers shipped with the crate.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `EmbeddingProvider`
//!
//! `HashingEmbeddingProvider` is a deterministic feature-hashing model: every
//! lowercase token and adjacent token pair is hashed with SHA-256 into one of
//! `dimensions` buckets, and the result is L2-normalised. Identical text always
//! yields an identical vector (cosine 1.0), and texts sharing vocabulary score
//! proportionally. It stands in for a sentence-transformers service
//! (384 dimensions, matching all-MiniLM-L6-v2).
//!
//! `CachedEmbeddingProvider` wraps any provider with a content-hash keyed
//! cache bounded by TTL and capacity.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::{content_hash, EmbeddingConfig, EmbeddingProvider, StoreError};

/// Deterministic bag-of-tokens embedding
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    /// Synchronous core, also used by snapshot tooling
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let tokens = Self::tokens(text);

        for token in &tokens {
            let (index, sign) = self.bucket(token);
            vector[index] += sign;
        }
        for pair in tokens.windows(2) {
            let (index, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[index] += 0.5 * sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(EmbeddingConfig::default().dimensions)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

/// TTL + capacity bounded cache in front of another provider
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl CachedEmbeddingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, ttl: Duration, capacity: usize) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(inner: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(inner, Duration::from_secs(config.cache_ttl_seconds), config.cache_capacity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        let hit = self.entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() <= self.ttl {
                Some(entry.vector.clone())
            } else {
                None
            }
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.inserted_at.elapsed() > self.ttl);
        }
        hit
    }

    fn evict(&self) {
        if self.entries.len() <= self.capacity {
            return;
        }
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);

        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let key = content_hash(text);
        if let Some(vector) = self.lookup(&key) {
            debug!(key = %&key[..12], "Embedding cache hit");
            return Ok(vector);
        }

        let vector = self.inner.embed(text).await?;
        self.entries.insert(
            key,
            CacheEntry {
                vector: vector.clone(),
                inserted_at: Instant::now(),
            },
        );
        self.evict();
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Cosine similarity clamped to `[0.0, 1.0]`. Mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    ((dot_product / (magnitude_a * magnitude_b)) as f64).clamp(0.0, 1.0)
}
