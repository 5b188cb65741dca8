// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid search building blocks: vector BLOB codecs, cosine
//! similarity, FTS query sanitization, and reciprocal rank fusion.

use std::collections::HashMap;

/// RRF constant per research literature.
const RRF_K: f32 = 60.0;

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// For L2-normalized vectors this is the dot product.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Build a safe FTS5 MATCH expression from free text.
///
/// Free text can contain FTS5 syntax (quotes, minus, NEAR) that would
/// raise a parse error; each alphanumeric token is quoted and the
/// tokens OR-ed. Returns None when the text has no searchable tokens.
pub fn fts_query(text: &str) -> Option<String> {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// Reciprocal Rank Fusion: merge two ranked lists into a single ranking.
///
/// RRF score for document d = sum(1 / (k + rank_i)) over the lists
/// containing d, with k = 60. Both inputs are ordered most-relevant
/// first (BM25 scores arrive already ordered by `ORDER BY bm25()`).
pub fn reciprocal_rank_fusion(
    lexical_results: &[(String, f64)],
    vector_results: &[(String, f32)],
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    for (rank, (id, _)) in lexical_results.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
    }
    for (rank, (id, _)) in vector_results.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f32 + 1.0);
    }

    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let original = vec![0.1_f32, 0.2, 0.3, -0.5, 1.0];
        let blob = vec_to_blob(&original);
        assert_eq!(blob.len(), original.len() * 4);
        let recovered = blob_to_vec(&blob);
        for (a, b) in original.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn cosine_identical_normalized() {
        let v: Vec<f32> = vec![0.5773, 0.5773, 0.5773];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 0.01);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < f32::EPSILON);
    }

    #[test]
    fn fts_query_quotes_tokens() {
        assert_eq!(
            fts_query("big deadline!").as_deref(),
            Some("\"big\" OR \"deadline\"")
        );
    }

    #[test]
    fn fts_query_strips_operators() {
        let q = fts_query("NEAR(\"x\") - phrase").unwrap();
        assert!(!q.contains('('));
        assert!(q.contains("\"NEAR\""));
    }

    #[test]
    fn fts_query_empty_input() {
        assert!(fts_query("").is_none());
        assert!(fts_query("!!! ???").is_none());
    }

    #[test]
    fn rrf_overlapping_lists() {
        let lexical = vec![("d1".to_string(), -5.0f64), ("d3".to_string(), -3.0f64)];
        let vector = vec![("d1".to_string(), 0.9f32), ("d2".to_string(), 0.8f32)];

        let fused = reciprocal_rank_fusion(&lexical, &vector);
        assert_eq!(fused[0].0, "d1");

        let expected_d1 = 2.0 / 61.0;
        assert!((fused[0].1 - expected_d1).abs() < 0.001);

        let d2 = fused.iter().find(|(id, _)| id == "d2").unwrap().1;
        let d3 = fused.iter().find(|(id, _)| id == "d3").unwrap().1;
        assert!((d2 - d3).abs() < 0.001, "rank-1 singles should tie");
    }

    #[test]
    fn rrf_disjoint_lists() {
        let lexical = vec![("a".to_string(), -5.0f64)];
        let vector = vec![("b".to_string(), 0.9f32)];
        let fused = reciprocal_rank_fusion(&lexical, &vector);
        assert_eq!(fused.len(), 2);
        let a = fused.iter().find(|(id, _)| id == "a").unwrap().1;
        let b = fused.iter().find(|(id, _)| id == "b").unwrap().1;
        assert!((a - b).abs() < 0.001);
    }

    #[test]
    fn rrf_empty_lists() {
        let fused = reciprocal_rank_fusion(&[], &[]);
        assert!(fused.is_empty());
    }
}
