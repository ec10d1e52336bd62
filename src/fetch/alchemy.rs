//! Alchemy NFT API v3 adapter
//!
//! - `getNFTsForContract` for pages of NFTs (`pageKey` → `startToken`)
//! - `getContractMetadata` on the first page for name and total supply

use super::CollectionFetcher;
use crate::collection::address::parse_address;
use crate::collection::{
    canonical_token_id, parse_token_id, CollectionMetadata, CollectionPage, NftRecord, Trait,
    TraitValue,
};
use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use ethers_core::utils::to_checksum;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NftsResponse {
    #[serde(default)]
    nfts: Vec<AlchemyNft>,
    page_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlchemyNft {
    token_id: String,
    name: Option<String>,
    image: Option<AlchemyImage>,
    raw: Option<AlchemyRaw>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlchemyImage {
    cached_url: Option<String>,
    thumbnail_url: Option<String>,
    original_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlchemyRaw {
    /// Token metadata is whatever the contract serves; parsed leniently
    metadata: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    name: Option<String>,
    image: Option<String>,
    #[serde(default)]
    attributes: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractMetadataResponse {
    name: Option<String>,
    symbol: Option<String>,
    total_supply: Option<String>,
    open_sea_metadata: Option<OpenSeaMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSeaMetadata {
    floor_price: Option<f64>,
    collection_name: Option<String>,
    description: Option<String>,
}

/// Fetches collection pages from the Alchemy NFT API
#[derive(Clone)]
pub struct AlchemyFetcher {
    client: Client,
    base_url: String,
    network: String,
    page_size: u32,
    configured: bool,
}

impl AlchemyFetcher {
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config {
                message: "Failed to build HTTP client".into(),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            network: config.network.clone(),
            page_size: config.page_size,
            configured: config.api_key.is_some() || config.base_url.is_some(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(status.as_u16(), body));
        }

        Ok(response.json::<T>().await?)
    }

    async fn fetch_nfts(
        &self,
        address: &str,
        cursor: Option<&str>,
    ) -> Result<(Vec<NftRecord>, Option<String>)> {
        let limit = self.page_size.to_string();
        let mut query = vec![
            ("contractAddress", address),
            ("withMetadata", "true"),
            ("limit", limit.as_str()),
        ];
        if let Some(cursor) = cursor {
            query.push(("startToken", cursor));
        }

        let response: NftsResponse = self.get_json("getNFTsForContract", &query).await?;
        let items = response
            .nfts
            .into_iter()
            .filter_map(|nft| match map_nft(nft) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping NFT with unusable data: {}", e);
                    None
                }
            })
            .collect();

        Ok((items, response.page_key.filter(|k| !k.is_empty())))
    }

    async fn fetch_metadata(&self, address: &str) -> Result<CollectionMetadata> {
        let response: ContractMetadataResponse = self
            .get_json("getContractMetadata", &[("contractAddress", address)])
            .await?;
        let opensea = response.open_sea_metadata;

        Ok(CollectionMetadata {
            address: to_checksum(&parse_address(address)?, None),
            name: response
                .name
                .filter(|n| !n.is_empty())
                .or_else(|| opensea.as_ref().and_then(|o| o.collection_name.clone()))
                .unwrap_or_else(|| "Unknown Collection".to_string()),
            symbol: response.symbol,
            total_supply: response.total_supply.and_then(|s| s.trim().parse().ok()),
            floor_price: opensea.as_ref().and_then(|o| o.floor_price),
            floor_currency: opensea
                .as_ref()
                .and_then(|o| o.floor_price)
                .map(|_| "ETH".to_string()),
            description: opensea.and_then(|o| o.description),
            network: self.network.clone(),
        })
    }
}

#[async_trait]
impl CollectionFetcher for AlchemyFetcher {
    #[instrument(skip(self), fields(source = "alchemy"))]
    async fn fetch_page(&self, address: &str, cursor: Option<&str>) -> Result<CollectionPage> {
        if !self.configured {
            return Err(Error::NotConfigured {
                service: "ALCHEMY_API_KEY",
            });
        }

        let (items, next) = self.fetch_nfts(address, cursor).await?;

        // Metadata is only needed once per collection and is best-effort
        let metadata = match cursor {
            Some(_) => None,
            None => match self.fetch_metadata(address).await {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!("Collection metadata unavailable for {}: {}", address, e);
                    None
                }
            },
        };

        debug!(
            "Fetched {} NFTs for {} (more pages: {})",
            items.len(),
            address,
            next.is_some()
        );

        Ok(CollectionPage {
            items,
            next,
            total_count: None,
            metadata,
        })
    }

    fn source_id(&self) -> &'static str {
        "alchemy"
    }
}

fn map_nft(nft: AlchemyNft) -> Result<NftRecord> {
    let id = parse_token_id(&nft.token_id)?;
    let decimal = id.to_string();

    let raw = nft
        .raw
        .and_then(|r| r.metadata)
        .and_then(|m| serde_json::from_value::<RawMetadata>(m).ok())
        .unwrap_or_default();
    let image = nft.image.unwrap_or_default();

    let name = nft
        .name
        .filter(|n| !n.is_empty())
        .or(raw.name.filter(|n| !n.is_empty()))
        .unwrap_or_else(|| format!("#{}", decimal));

    let image_url = image
        .cached_url
        .or(image.thumbnail_url)
        .or(image.original_url)
        .or(raw.image)
        .filter(|u| !u.is_empty());

    let mut record = NftRecord::new(canonical_token_id(id), decimal, name)
        .with_traits(raw.attributes.iter().filter_map(map_attribute));
    record.image_url = image_url;
    Ok(record)
}

/// Attributes without a `trait_type` are dropped; `null` values count as missing
fn map_attribute(attr: &Value) -> Option<Trait> {
    let trait_type = attr.get("trait_type")?.as_str()?;
    let value = match attr.get("value")? {
        Value::Null => None,
        Value::String(s) => Some(TraitValue::Text(s.clone())),
        Value::Number(n) => Some(TraitValue::Number(n.clone())),
        Value::Bool(b) => Some(TraitValue::Text(b.to_string())),
        _ => return None,
    };
    Some(Trait {
        trait_type: trait_type.to_string(),
        value,
    })
}
