//! Rarity Scoring
//!
//! Inverse-frequency rarity over a collection's trait dataset.
//!
//! ## Algorithm
//!
//! 1. Count every `(trait type, trait value)` pair across the collection.
//!    A missing value counts as the literal `"None"`.
//! 2. `weight = item_count / frequency`, so a value held by every item weighs
//!    1 and a value held by a single item weighs `item_count`.
//! 3. An item's score is the plain sum of its trait weights. Items with more
//!    traits are not normalized by trait count; changing that would reorder
//!    every existing ranking.
//! 4. Rank 1 is the highest score. Ties keep input order (stable sort), so
//!    ranks are always exactly `1..=N`.
//!
//! Output keeps the input order; only score and rank are attached.

pub mod traits;

pub use traits::{trait_catalog, trait_rarity_percent, TraitSummary, TraitValueCount};

use crate::collection::{NftRecord, ScoredNft};
use crate::telemetry::{self, PerformanceTimer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Score and rank `items`. Pure, deterministic and total.
pub fn score(items: &[NftRecord]) -> Vec<ScoredNft> {
    if items.is_empty() {
        return Vec::new();
    }
    let timer = PerformanceTimer::new("rarity_score");

    let frequency = trait_frequencies(items);
    let total = items.len() as f64;

    let scores: Vec<f64> = items
        .iter()
        .map(|nft| {
            nft.traits
                .iter()
                .map(|t| {
                    let count = frequency
                        .get(&(t.trait_type.as_str(), t.value_key()))
                        .copied()
                        .unwrap_or(1);
                    total / count as f64
                })
                .sum()
        })
        .collect();

    // Stable sort on a copy of the indices: ties keep input order
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ranks = vec![0u32; items.len()];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = position as u32 + 1;
    }

    debug!(
        "Scored {} items over {} distinct trait values",
        items.len(),
        frequency.len()
    );
    timer.log_if_slow(50);

    items
        .iter()
        .zip(scores)
        .zip(ranks)
        .map(|((nft, rarity_score), rank)| ScoredNft {
            record: nft.clone(),
            rarity_score,
            rarity_rank: Some(rank),
        })
        .collect()
}

/// Occurrence count for every `(type, stringified value)` pair
fn trait_frequencies(items: &[NftRecord]) -> HashMap<(&str, Cow<'_, str>), usize> {
    let mut frequency: HashMap<(&str, Cow<'_, str>), usize> = HashMap::new();
    for nft in items {
        for t in &nft.traits {
            *frequency
                .entry((t.trait_type.as_str(), t.value_key()))
                .or_insert(0) += 1;
        }
    }
    frequency
}

/// Single-entry memo for `score`, keyed by a dataset generation.
///
/// The owner bumps the generation on every mutation of the item set. A new
/// generation always recomputes, even when the content happens to be
/// identical to the cached one; equal generations never recompute. Content
/// is never compared.
#[derive(Debug, Default)]
pub struct RarityCache {
    entry: Option<(u64, Arc<Vec<ScoredNft>>)>,
}

impl RarityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores for `items` at `generation`, computing them on a miss
    pub fn get_or_score(&mut self, generation: u64, items: &[NftRecord]) -> Arc<Vec<ScoredNft>> {
        if let Some((cached_generation, scored)) = &self.entry {
            if *cached_generation == generation {
                telemetry::record_rarity_cache(true);
                return Arc::clone(scored);
            }
        }

        telemetry::record_rarity_cache(false);
        let scored = Arc::new(score(items));
        self.entry = Some((generation, Arc::clone(&scored)));
        scored
    }

    pub fn cached_generation(&self) -> Option<u64> {
        self.entry.as_ref().map(|(generation, _)| *generation)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Trait;

    fn nft(id: u64, traits: &[(&str, &str)]) -> NftRecord {
        NftRecord::new(format!("0x{:x}", id), id.to_string(), format!("#{}", id))
            .with_traits(traits.iter().map(|(k, v)| Trait::new(*k, *v)))
    }

    fn blue_red_collection() -> Vec<NftRecord> {
        vec![
            nft(1, &[("Background", "Blue"), ("Body", "Robot")]),
            nft(2, &[("Background", "Blue"), ("Body", "Robot")]),
            nft(3, &[("Background", "Red"), ("Body", "Robot")]),
            nft(4, &[("Background", "Blue"), ("Body", "Robot")]),
            nft(5, &[("Background", "Blue"), ("Body", "Robot")]),
        ]
    }

    #[test]
    fn test_blue_red_scenario() {
        let scored = score(&blue_red_collection());

        let red = &scored[2];
        assert_eq!(red.rarity_score, 6.0);
        assert_eq!(red.rarity_rank, Some(1));

        let blue_ranks: Vec<_> = [0, 1, 3, 4]
            .iter()
            .map(|&i| {
                assert_eq!(scored[i].rarity_score, 2.25);
                scored[i].rarity_rank.unwrap()
            })
            .collect();
        // Ties are broken by input order
        assert_eq!(blue_ranks, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_output_preserves_input_order() {
        let items = blue_red_collection();
        let scored = score(&items);
        let ids: Vec<_> = scored.iter().map(|s| s.token_id()).collect();
        let expected: Vec<_> = items.iter().map(|n| n.token_id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_weight_bounds() {
        let items: Vec<_> = (1..=4)
            .map(|i| {
                let unique = format!("u{}", i);
                nft(i, &[("Shared", "yes"), ("Unique", unique.as_str())])
            })
            .collect();
        let scored = score(&items);
        // Shared by all weighs 1, held by one of four weighs 4
        for s in &scored {
            assert_eq!(s.rarity_score, 1.0 + 4.0);
        }
    }

    #[test]
    fn test_ranks_are_a_permutation_even_with_ties() {
        let items: Vec<_> = (1..=7).map(|i| nft(i, &[("Same", "x")])).collect();
        let scored = score(&items);
        let mut ranks: Vec<u32> = scored.iter().map(|s| s.rarity_rank.unwrap()).collect();
        assert_eq!(ranks, (1..=7).collect::<Vec<u32>>());
        ranks.sort_unstable();
        ranks.dedup();
        assert_eq!(ranks.len(), 7);
    }

    #[test]
    fn test_deterministic() {
        let items = blue_red_collection();
        assert_eq!(score(&items), score(&items));
    }

    #[test]
    fn test_missing_value_counted_as_none() {
        let items = vec![
            NftRecord::new("0x1", "1", "a").with_trait(Trait::missing("Hat")),
            NftRecord::new("0x2", "2", "b").with_trait(Trait::new("Hat", "None")),
            NftRecord::new("0x3", "3", "c").with_trait(Trait::new("Hat", "Cap")),
        ];
        let scored = score(&items);
        assert_eq!(scored[0].rarity_score, 1.5);
        assert_eq!(scored[1].rarity_score, 1.5);
        assert_eq!(scored[2].rarity_score, 3.0);
    }

    #[test]
    fn test_scores_sum_without_trait_count_normalization() {
        let items = vec![
            nft(1, &[("A", "x"), ("B", "y"), ("C", "z")]),
            nft(2, &[("A", "x")]),
        ];
        let scored = score(&items);
        assert_eq!(scored[0].rarity_score, 1.0 + 2.0 + 2.0);
        assert_eq!(scored[1].rarity_score, 1.0);
        assert_eq!(scored[0].rarity_rank, Some(1));
    }

    #[test]
    fn test_numeric_values_compare_stringified() {
        let items = vec![
            NftRecord::new("0x1", "1", "a").with_trait(Trait::new("Level", 3i64)),
            NftRecord::new("0x2", "2", "b").with_trait(Trait::new("Level", "3")),
        ];
        let scored = score(&items);
        assert_eq!(scored[0].rarity_score, 1.0);
        assert_eq!(scored[1].rarity_score, 1.0);
    }

    #[test]
    fn test_empty_and_traitless_inputs() {
        assert!(score(&[]).is_empty());
        let scored = score(&[NftRecord::new("0x1", "1", "bare")]);
        assert_eq!(scored[0].rarity_score, 0.0);
        assert_eq!(scored[0].rarity_rank, Some(1));
    }

    #[test]
    fn test_cache_keyed_by_generation_not_content() {
        let items = blue_red_collection();
        let mut cache = RarityCache::new();

        let first = cache.get_or_score(1, &items);
        let again = cache.get_or_score(1, &items);
        assert!(Arc::ptr_eq(&first, &again));

        // Same content, new generation: recomputed, equal result
        let bumped = cache.get_or_score(2, &items);
        assert!(!Arc::ptr_eq(&first, &bumped));
        assert_eq!(*first, *bumped);
        assert_eq!(cache.cached_generation(), Some(2));

        cache.invalidate();
        assert_eq!(cache.cached_generation(), None);
    }
}
