//! JSON and CSV export of a derived NFT list

use crate::collection::{CollectionMetadata, ScoredNft};
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::str::FromStr;

const CSV_HEADER: &str = "Token ID,Name,Rarity Rank,Rarity Score,Image URL,Traits";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::bad_request(format!("Unsupported export format: {}", other))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    collection: Option<&'a CollectionMetadata>,
    nfts: &'a [ScoredNft],
    exported_at: String,
}

/// Pretty-printed JSON document with the collection block and the items
pub fn to_json(
    items: &[ScoredNft],
    metadata: Option<&CollectionMetadata>,
    exported_at: DateTime<Utc>,
) -> Result<String> {
    let document = JsonExport {
        collection: metadata,
        nfts: items,
        exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// CSV with a plain header row and fully quoted data rows
pub fn to_csv(items: &[ScoredNft]) -> String {
    let mut lines = Vec::with_capacity(items.len() + 1);
    lines.push(CSV_HEADER.to_string());

    for nft in items {
        let record = &nft.record;
        let traits = record
            .traits
            .iter()
            .map(|t| format!("{}:{}", t.trait_type, t.value_key()))
            .collect::<Vec<_>>()
            .join("; ");
        let rank = nft.rarity_rank.map(|r| r.to_string()).unwrap_or_default();
        let score = format!("{:.2}", nft.rarity_score);

        let row = [
            record.token_id_numeric.as_str(),
            record.name.as_str(),
            rank.as_str(),
            score.as_str(),
            record.image_url.as_deref().unwrap_or(""),
            traits.as_str(),
        ];
        lines.push(row.iter().map(|cell| quote(cell)).collect::<Vec<_>>().join(","));
    }

    lines.join("\n")
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

/// `<name with non-alphanumerics as _>_<unix millis>.<ext>`
pub fn file_name(collection_name: &str, format: ExportFormat, now: DateTime<Utc>) -> String {
    let safe: String = collection_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_{}.{}", safe, now.timestamp_millis(), format.extension())
}
