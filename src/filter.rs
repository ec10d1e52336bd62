//! Filter/Sort Pipeline
//!
//! Derives the visible list from the scored collection. Stages run in a
//! fixed order, each narrowing the previous stage's output:
//!
//! 1. favorites (when `favorites_only`)
//! 2. traits: OR within a trait type, AND across trait types
//! 3. search: trimmed, case-insensitive substring of name or either token id
//! 4. stable sort by `sort_key`

use crate::collection::ScoredNft;
use crate::error::Error;
use crate::favorites::Favorites;
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Sort order of the derived list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    /// Ascending rarity rank, unranked items last
    Rarity,
    /// Ascending numeric token id
    #[default]
    TokenId,
    /// Name, falling back to the decimal token id
    Name,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rarity" => Ok(SortKey::Rarity),
            "tokenid" | "token_id" | "id" => Ok(SortKey::TokenId),
            "name" => Ok(SortKey::Name),
            other => Err(Error::bad_request(format!("Unknown sort key: {}", other))),
        }
    }
}

/// User-controlled filter and sort configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    /// Trait type -> selected values. A type is present only while it has
    /// at least one selected value.
    pub trait_filters: BTreeMap<String, BTreeSet<String>>,
    pub search_text: String,
    pub sort_key: SortKey,
    pub favorites_only: bool,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `value` for `trait_type`, or deselect it if already selected.
    /// Returns whether the value is selected afterwards.
    pub fn toggle_trait_filter(&mut self, trait_type: &str, value: &str) -> bool {
        if let Some(selected) = self.trait_filters.get_mut(trait_type) {
            if selected.remove(value) {
                if selected.is_empty() {
                    self.trait_filters.remove(trait_type);
                }
                return false;
            }
            selected.insert(value.to_string());
            return true;
        }

        self.trait_filters
            .entry(trait_type.to_string())
            .or_default()
            .insert(value.to_string());
        true
    }

    /// Drop every trait selection; search, sort and favorites are kept
    pub fn clear_filters(&mut self) {
        self.trait_filters.clear();
    }

    /// Back to the initial empty configuration
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_selected(&self, trait_type: &str, value: &str) -> bool {
        self.trait_filters
            .get(trait_type)
            .is_some_and(|selected| selected.contains(value))
    }

    /// Number of selected trait values across all types
    pub fn active_filter_count(&self) -> usize {
        self.trait_filters.values().map(BTreeSet::len).sum()
    }
}

/// Run the pipeline over `items`. Pure given its inputs.
pub fn derive<F>(items: &[ScoredNft], filters: &FilterState, favorites: &F) -> Vec<ScoredNft>
where
    F: Favorites + ?Sized,
{
    let query = filters.search_text.trim().to_lowercase();

    let mut result: Vec<ScoredNft> = items
        .iter()
        .filter(|nft| !filters.favorites_only || favorites.is_favorite(nft.token_id()))
        .filter(|nft| matches_traits(nft, &filters.trait_filters))
        .filter(|nft| query.is_empty() || matches_search(nft, &query))
        .cloned()
        .collect();

    sort_items(&mut result, filters.sort_key);
    result
}

fn matches_traits(nft: &ScoredNft, trait_filters: &BTreeMap<String, BTreeSet<String>>) -> bool {
    trait_filters
        .iter()
        .filter(|(_, selected)| !selected.is_empty())
        .all(|(trait_type, selected)| {
            nft.record
                .traits
                .iter()
                .any(|t| &t.trait_type == trait_type && selected.contains(t.value_key().as_ref()))
        })
}

/// `query` must already be trimmed and lowercased
fn matches_search(nft: &ScoredNft, query: &str) -> bool {
    let record = &nft.record;
    record.name.to_lowercase().contains(query)
        || record.token_id_numeric.contains(query)
        || record.token_id.to_lowercase().contains(query)
}

/// Stable sort; equal keys keep the incoming order
pub fn sort_items(items: &mut [ScoredNft], key: SortKey) {
    match key {
        SortKey::Rarity => {
            items.sort_by_key(|nft| (nft.rarity_rank.is_none(), nft.rarity_rank));
        }
        SortKey::TokenId => {
            // Ids that do not parse as decimals go last
            items.sort_by_cached_key(|nft| match nft.record.numeric_id() {
                Some(id) => (false, id),
                None => (true, U256::zero()),
            });
        }
        SortKey::Name => {
            items.sort_by(|a, b| compare_names(a.record.display_name(), b.record.display_name()));
        }
    }
}

/// Case-insensitive order; names equal ignoring case fall back to byte order
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
