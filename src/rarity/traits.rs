//! Trait statistics for filter panels and detail views

use crate::collection::NftRecord;
use crate::filter::compare_names;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// All values seen for one trait type, most common first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitSummary {
    pub trait_type: String,
    pub values: Vec<TraitValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitValueCount {
    pub value: String,
    pub count: usize,
}

/// Share of items (in percent) holding `trait_type = trait_value`.
///
/// An item with the same trait repeated is counted once.
pub fn trait_rarity_percent<T: AsRef<NftRecord>>(
    items: &[T],
    trait_type: &str,
    trait_value: &str,
) -> f64 {
    if items.is_empty() {
        return 0.0;
    }

    let holders = items
        .iter()
        .filter(|nft| {
            nft.as_ref()
                .traits
                .iter()
                .any(|t| t.trait_type == trait_type && t.value_key() == trait_value)
        })
        .count();

    holders as f64 / items.len() as f64 * 100.0
}

/// Every trait type (alphabetical, ignoring case) with its values and occurrence counts
pub fn trait_catalog<T: AsRef<NftRecord>>(items: &[T]) -> Vec<TraitSummary> {
    let mut by_type: BTreeMap<&str, HashMap<String, usize>> = BTreeMap::new();
    for nft in items {
        for t in &nft.as_ref().traits {
            *by_type
                .entry(t.trait_type.as_str())
                .or_default()
                .entry(t.value_key().into_owned())
                .or_insert(0) += 1;
        }
    }

    let mut summaries: Vec<TraitSummary> = by_type
        .into_iter()
        .map(|(trait_type, counts)| {
            let mut values: Vec<TraitValueCount> = counts
                .into_iter()
                .map(|(value, count)| TraitValueCount { value, count })
                .collect();
            values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            TraitSummary {
                trait_type: trait_type.to_string(),
                values,
            }
        })
        .collect();
    summaries.sort_by(|a, b| compare_names(&a.trait_type, &b.trait_type));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Trait;

    fn items() -> Vec<NftRecord> {
        vec![
            NftRecord::new("0x1", "1", "a")
                .with_trait(Trait::new("Eyes", "Laser"))
                .with_trait(Trait::new("Background", "Blue")),
            NftRecord::new("0x2", "2", "b")
                .with_trait(Trait::new("Eyes", "Sleepy"))
                .with_trait(Trait::new("Background", "Blue")),
            NftRecord::new("0x3", "3", "c")
                .with_trait(Trait::new("Eyes", "Laser"))
                .with_trait(Trait::new("Eyes", "Laser"))
                .with_trait(Trait::missing("Background")),
            NftRecord::new("0x4", "4", "d").with_trait(Trait::new("Eyes", "Zombie")),
        ]
    }

    #[test]
    fn test_trait_rarity_percent() {
        let items = items();
        assert_eq!(trait_rarity_percent(&items, "Eyes", "Laser"), 50.0);
        assert_eq!(trait_rarity_percent(&items, "Background", "None"), 25.0);
        assert_eq!(trait_rarity_percent(&items, "Eyes", "Missing"), 0.0);
        assert_eq!(trait_rarity_percent::<NftRecord>(&[], "Eyes", "Laser"), 0.0);
    }

    #[test]
    fn test_catalog_sorted_by_type_then_count() {
        let catalog = trait_catalog(&items());
        let types: Vec<_> = catalog.iter().map(|s| s.trait_type.as_str()).collect();
        assert_eq!(types, vec!["Background", "Eyes"]);

        let eyes = &catalog[1].values;
        assert_eq!(eyes[0], TraitValueCount { value: "Laser".to_string(), count: 3 });
        // Equal counts fall back to value order
        assert_eq!(eyes[1].value, "Sleepy");
        assert_eq!(eyes[2].value, "Zombie");

        let background = &catalog[0].values;
        assert_eq!(background[0].value, "Blue");
        assert_eq!(background[1].value, "None");
    }

    #[test]
    fn test_catalog_type_order_ignores_case() {
        let items = vec![NftRecord::new("0x1", "1", "a")
            .with_trait(Trait::new("mouth", "Grin"))
            .with_trait(Trait::new("Hat", "Cap"))
            .with_trait(Trait::new("accessory", "Chain"))];
        let catalog = trait_catalog(&items);
        let types: Vec<_> = catalog.iter().map(|s| s.trait_type.as_str()).collect();
        assert_eq!(types, vec!["accessory", "Hat", "mouth"]);
    }
}
