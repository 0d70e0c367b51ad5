//! Relevance scoring shared by the memory backends.
//!
//! Cosine similarity when both sides have an embedding of the same
//! dimension, otherwise the fraction of distinct query tokens found in the
//! item's content. The two scales are not comparable; callers only get a
//! ranking signal.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::model::{MemoryHit, MemoryItem};

/// Cosine similarity, or `None` when the vectors cannot be compared.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Some(0.0);
    }
    Some((dot / denom) as f32)
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{4E00}'..='\u{9FFF}'
        | '\u{AC00}'..='\u{D7AF}'
        | '\u{F900}'..='\u{FAFF}')
}

/// Lowercased word tokens. Each CJK character is a token of its own since
/// those scripts do not separate words with spaces.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Fraction of distinct query tokens present in `content`, in `[0, 1]`.
pub fn lexical_overlap(query: &str, content: &str) -> f32 {
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens: HashSet<String> = tokenize(content).into_iter().collect();
    let matched = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    matched as f32 / query_tokens.len() as f32
}

/// Score one item against a query, preferring embeddings when both exist.
pub fn score_item(query: &str, query_embedding: Option<&[f32]>, item: &MemoryItem) -> f32 {
    query_embedding
        .zip(item.embedding.as_deref())
        .and_then(|(q, e)| cosine_similarity(q, e))
        .unwrap_or_else(|| lexical_overlap(query, &item.content))
}

/// Drop hits below `min_score`, sort by descending score and keep `top_k`.
///
/// Ties keep their input order, so callers feeding items oldest-first get a
/// deterministic result.
pub fn rank(mut hits: Vec<MemoryHit>, top_k: usize, min_score: f32) -> Vec<MemoryHit> {
    hits.retain(|hit| hit.score >= min_score);
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let score = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).unwrap();
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_rejects_dimension_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
    }

    #[test]
    fn tokenize_splits_words_and_cjk_characters() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
        assert_eq!(tokenize("喜欢简洁 answers"), vec!["喜", "欢", "简", "洁", "answers"]);
    }

    #[test]
    fn lexical_overlap_counts_distinct_query_tokens() {
        assert_eq!(lexical_overlap("red red apple", "a red car"), 0.5);
        assert_eq!(lexical_overlap("", "anything"), 0.0);
        assert_eq!(lexical_overlap("apple pie", "APPLE pie recipe"), 1.0);
    }

    #[test]
    fn rank_filters_sorts_and_truncates() {
        let hit = |id: &str, score: f32| MemoryHit {
            id: id.to_string(),
            content: String::new(),
            metadata: Default::default(),
            score,
        };
        let ranked = rank(
            vec![hit("a", 0.2), hit("b", 0.9), hit("c", 0.5), hit("d", 0.7)],
            2,
            0.3,
        );
        let ids: Vec<_> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }
}
