//! Collection Module
//!
//! Incrementally loads an NFT collection from a paged indexer and keeps the
//! accumulated, de-duplicated, rarity-scored item set for one active address.
//!
//! ## Architecture
//!
//! 1. **Address** - canonical contract address validation
//! 2. **Retry** - bounded exponential backoff shared by every fetch
//! 3. **State** - the per-session `CollectionState` and its invariants
//! 4. **Loader** - the load / load-more / clear state machine

pub mod address;
pub mod loader;
pub mod retry;
pub mod state;

pub use address::validate_address;
pub use loader::{CollectionLoader, CollectionView};
pub use retry::{with_retry, RetryPolicy};
pub use state::{CollectionSnapshot, CollectionState, LoadError, Phase};

use crate::error::{Error, Result};
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Value used in place of a missing trait value, so absence is countable
pub const MISSING_TRAIT_VALUE: &str = "None";

/// Raw trait value as delivered by the indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraitValue {
    Text(String),
    Number(serde_json::Number),
}

impl std::fmt::Display for TraitValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraitValue::Text(s) => f.write_str(s),
            TraitValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for TraitValue {
    fn from(value: &str) -> Self {
        TraitValue::Text(value.to_string())
    }
}

impl From<String> for TraitValue {
    fn from(value: String) -> Self {
        TraitValue::Text(value)
    }
}

impl From<i64> for TraitValue {
    fn from(value: i64) -> Self {
        TraitValue::Number(value.into())
    }
}

impl From<u64> for TraitValue {
    fn from(value: u64) -> Self {
        TraitValue::Number(value.into())
    }
}

/// A categorical attribute attached to an NFT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trait {
    #[serde(rename = "type")]
    pub trait_type: String,
    #[serde(default)]
    pub value: Option<TraitValue>,
}

impl Trait {
    pub fn new(trait_type: impl Into<String>, value: impl Into<TraitValue>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: Some(value.into()),
        }
    }

    /// A trait whose value the indexer did not provide
    pub fn missing(trait_type: impl Into<String>) -> Self {
        Self {
            trait_type: trait_type.into(),
            value: None,
        }
    }

    /// Stringified value used for counting and filtering
    pub fn value_key(&self) -> Cow<'_, str> {
        match &self.value {
            Some(TraitValue::Text(s)) => Cow::Borrowed(s.as_str()),
            Some(TraitValue::Number(n)) => Cow::Owned(n.to_string()),
            None => Cow::Borrowed(MISSING_TRAIT_VALUE),
        }
    }
}

/// One NFT as returned by the collection fetch collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftRecord {
    /// Canonical id (lowercase `0x` hex), unique within a collection
    pub token_id: String,
    /// Decimal form of the same id
    pub token_id_numeric: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub traits: Vec<Trait>,
}

impl NftRecord {
    pub fn new(
        token_id: impl Into<String>,
        token_id_numeric: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            token_id_numeric: token_id_numeric.into(),
            name: name.into(),
            image_url: None,
            traits: Vec::new(),
        }
    }

    /// Build a record from a raw upstream id (decimal or `0x` hex)
    pub fn from_raw_token_id(raw: &str, name: impl Into<String>) -> Result<Self> {
        let id = parse_token_id(raw)?;
        Ok(Self::new(canonical_token_id(id), id.to_string(), name))
    }

    pub fn with_trait(mut self, t: Trait) -> Self {
        self.traits.push(t);
        self
    }

    pub fn with_traits(mut self, traits: impl IntoIterator<Item = Trait>) -> Self {
        self.traits.extend(traits);
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Name for display and name sorting; falls back to the decimal id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.token_id_numeric
        } else {
            &self.name
        }
    }

    /// Numeric value of the decimal id, if it parses
    pub fn numeric_id(&self) -> Option<U256> {
        U256::from_dec_str(self.token_id_numeric.trim()).ok()
    }
}

/// An NFT annotated with its rarity score and rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredNft {
    #[serde(flatten)]
    pub record: NftRecord,
    pub rarity_score: f64,
    /// 1 = rarest. `None` only for items that never went through the scorer
    #[serde(default)]
    pub rarity_rank: Option<u32>,
}

impl ScoredNft {
    pub fn token_id(&self) -> &str {
        &self.record.token_id
    }
}

impl AsRef<NftRecord> for NftRecord {
    fn as_ref(&self) -> &NftRecord {
        self
    }
}

impl AsRef<NftRecord> for ScoredNft {
    fn as_ref(&self) -> &NftRecord {
        &self.record
    }
}

/// Collection-level metadata reported by the indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    pub address: String,
    pub name: String,
    pub symbol: Option<String>,
    pub total_supply: Option<u64>,
    pub floor_price: Option<f64>,
    pub floor_currency: Option<String>,
    pub description: Option<String>,
    pub network: String,
}

/// One page of results from the fetch collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPage {
    pub items: Vec<NftRecord>,
    /// Continuation token; `None` means no more pages
    pub next: Option<String>,
    pub total_count: Option<u64>,
    #[serde(default)]
    pub metadata: Option<CollectionMetadata>,
}

impl CollectionPage {
    /// Total count hint: explicit count first, then the metadata supply
    pub fn count_hint(&self) -> Option<u64> {
        self.total_count
            .or_else(|| self.metadata.as_ref().and_then(|m| m.total_supply))
    }
}

/// Parse a token id given either in decimal or as `0x` hex
pub fn parse_token_id(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() => U256::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => U256::from_dec_str(raw).ok(),
    };
    parsed.ok_or_else(|| Error::invalid_format(format!("Invalid token id: {}", raw)))
}

/// Canonical lowercase hex form of a token id
pub fn canonical_token_id(id: U256) -> String {
    format!("0x{:x}", id)
}
