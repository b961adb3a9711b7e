//! Deterministic string similarity used by title and author lookup.

use std::collections::BTreeSet;

use crate::config::MatchConfig;

/// Similarity between two normalized strings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Weighted combination in [0, 1]
    pub score: f64,
    /// Character-level Levenshtein distance
    pub distance: usize,
}

/// Two distinct tokens whose edit ratio reaches this count as a partial overlap.
const TOKEN_FUZZ_RATIO: f64 = 0.75;

/// Order-insensitive token overlap.
///
/// Jaccard index of the two token sets, where a token without an exact
/// counterpart may still pair with a close spelling on the other side
/// (weighted by how close it is). Pairing walks both sides in sorted order.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let left: BTreeSet<&str> = a.split_whitespace().collect();
    let right: BTreeSet<&str> = b.split_whitespace().collect();

    if left.is_empty() && right.is_empty() {
        return 1.0;
    }

    let mut shared = left.intersection(&right).count() as f64;
    let mut unpaired: Vec<&str> = right.difference(&left).copied().collect();

    for token in left.difference(&right) {
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in unpaired.iter().enumerate() {
            let ratio = strsim::normalized_levenshtein(token, candidate);
            if ratio >= TOKEN_FUZZ_RATIO && best.map_or(true, |(_, r)| ratio > r) {
                best = Some((idx, ratio));
            }
        }
        if let Some((idx, ratio)) = best {
            shared += ratio;
            unpaired.remove(idx);
        }
    }

    let union = (left.len() + right.len()) as f64 - shared;
    shared / union
}

/// Score two already-normalized strings.
pub fn compare(a: &str, b: &str, config: &MatchConfig) -> Similarity {
    let distance = strsim::levenshtein(a, b);
    let edit_ratio = strsim::normalized_levenshtein(a, b);
    let token_ratio = token_set_similarity(a, b);

    let total_weight = config.token_weight + config.edit_weight;
    let score = if total_weight > 0.0 {
        (config.token_weight * token_ratio + config.edit_weight * edit_ratio) / total_weight
    } else {
        edit_ratio
    };

    Similarity {
        score: score.clamp(0.0, 1.0),
        distance,
    }
}

/// Best similarity over every pair of forms.
///
/// A higher score wins; equal scores prefer the smaller edit distance.
pub fn best_of(queries: &[String], targets: &[String], config: &MatchConfig) -> Option<Similarity> {
    queries
        .iter()
        .flat_map(|q| targets.iter().map(move |t| compare(q, t, config)))
        .fold(None, |best: Option<Similarity>, current| match best {
            Some(b) if b.score > current.score => Some(b),
            Some(b) if b.score == current.score && b.distance <= current.distance => Some(b),
            _ => Some(current),
        })
}
