//! Collection fetch collaborators
//!
//! The loader only depends on [`CollectionFetcher`]; the indexer protocol
//! behind it is opaque. [`alchemy::AlchemyFetcher`] is the production
//! implementation.

pub mod alchemy;

pub use alchemy::AlchemyFetcher;

use crate::collection::CollectionPage;
use crate::error::Result;
use async_trait::async_trait;

/// Paged source of NFT records for a contract address
#[async_trait]
pub trait CollectionFetcher: Send + Sync {
    /// Fetch one page. `cursor` is `None` for the first page and otherwise
    /// the `next` token of the previous page.
    async fn fetch_page(&self, address: &str, cursor: Option<&str>) -> Result<CollectionPage>;

    /// Identifier used in logs
    fn source_id(&self) -> &'static str {
        "indexer"
    }
}

#[async_trait]
impl<T: CollectionFetcher + ?Sized> CollectionFetcher for std::sync::Arc<T> {
    async fn fetch_page(&self, address: &str, cursor: Option<&str>) -> Result<CollectionPage> {
        (**self).fetch_page(address, cursor).await
    }

    fn source_id(&self) -> &'static str {
        (**self).source_id()
    }
}
