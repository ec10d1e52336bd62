//! NFT collection engine library crate
//!
//! Re-exports core modules for the binary, integration tests and external use.

pub mod api;
pub mod collection;
pub mod config;
pub mod error;
pub mod export;
pub mod favorites;
pub mod fetch;
pub mod filter;
pub mod rarity;
pub mod telemetry;

// Re-export commonly used types
pub use collection::{
    CollectionLoader, CollectionMetadata, CollectionPage, CollectionSnapshot, CollectionView,
    NftRecord, Phase, RetryPolicy, ScoredNft, Trait, TraitValue,
};
pub use config::Config;
pub use error::{Error, Result};
pub use favorites::{FavoriteSet, Favorites};
pub use fetch::{AlchemyFetcher, CollectionFetcher};
pub use filter::{derive, FilterState, SortKey};
pub use rarity::{score, RarityCache};
