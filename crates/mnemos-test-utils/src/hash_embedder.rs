// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedding adapter for tests.
//!
//! Hashes each lowercased token into a bucket of a fixed-dimension
//! vector and L2-normalizes, so texts sharing tokens land close in
//! cosine space without any model on disk.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use mnemos_core::types::{EmbeddingInput, EmbeddingOutput};
use mnemos_core::{EmbeddingAdapter, MnemosError};

/// Embedding dimension used by the hash embedder.
pub const HASH_EMBEDDER_DIMS: usize = 64;

/// Deterministic token-bucket embedder.
#[derive(Debug, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn embed_text(text: &str) -> Vec<f32> {
        let mut vec = vec![0.0_f32; HASH_EMBEDDER_DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % HASH_EMBEDDER_DIMS;
            vec[bucket] += 1.0;
        }
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingAdapter for HashEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemosError> {
        let embeddings = input
            .texts
            .iter()
            .map(|t| Self::embed_text(t))
            .collect::<Vec<_>>();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: HASH_EMBEDDER_DIMS,
        })
    }
}
