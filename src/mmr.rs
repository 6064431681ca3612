//! Maximal Marginal Relevance (MMR) re-ranking.
//!
//! MMR picks results one at a time, scoring each remaining candidate by
//!
//! ```text
//! λ × sim(query, doc) − (1 − λ) × max(sim(doc, selected))
//! ```
//!
//! so a candidate that nearly duplicates an already selected chunk loses to
//! a slightly less relevant but different one.
//!
//! - λ = 1.0: pure relevance (plain top-k)
//! - λ = 0.5: balanced
//! - λ = 0.0: pure diversity

use crate::embedding::cosine_similarity;

/// Select up to `k` candidates by MMR.
///
/// `candidates` are embedding vectors; the returned indices point into that
/// slice, in selection order (most valuable first). Ties go to the earlier
/// candidate, so feeding candidates sorted by similarity keeps the ordering
/// stable.
pub fn mmr_select(query: &[f32], candidates: &[&[f32]], k: usize, lambda: f32) -> Vec<usize> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let k = k.min(candidates.len());
    let lambda = lambda.clamp(0.0, 1.0);

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(candidates[idx], candidates[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_inputs() {
        assert!(mmr_select(&[1.0, 0.0], &[], 5, 0.5).is_empty());
        let c = vec![1.0f32, 0.0];
        assert!(mmr_select(&[1.0, 0.0], &[&c], 0, 0.5).is_empty());
    }

    #[test]
    fn test_k_capped_by_candidates() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        let picked = mmr_select(&[1.0, 0.0], &[&a, &b], 10, 0.5);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_pure_relevance_is_top_k() {
        let a = vec![0.9f32, 0.1];
        let b = vec![1.0f32, 0.0];
        let c = vec![0.0f32, 1.0];
        let picked = mmr_select(&[1.0, 0.0], &[&a, &b, &c], 2, 1.0);
        assert_eq!(picked, vec![1, 0]);
    }

    #[test]
    fn test_duplicate_is_demoted() {
        let query = vec![1.0f32, 1.0, 0.0];
        let best = vec![1.0f32, 0.8, 0.0];
        let duplicate = vec![1.0f32, 0.8, 0.0];
        let different = vec![0.2f32, 1.0, 0.0];
        let picked = mmr_select(&query, &[&best, &duplicate, &different], 2, 0.5);
        assert_eq!(picked[0], 0);
        assert_eq!(picked[1], 2, "diverse candidate should beat the duplicate");
    }

    #[test]
    fn test_first_pick_is_most_relevant() {
        let query = vec![0.0f32, 1.0];
        let a = vec![1.0f32, 0.0];
        let b = vec![0.1f32, 1.0];
        let picked = mmr_select(&query, &[&a, &b], 1, 0.3);
        assert_eq!(picked, vec![1]);
    }
}
