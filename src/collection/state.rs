//! Per-session collection state
//!
//! `CollectionState` owns the accumulated records for one active address.
//! Records are only mutated through methods that bump the items generation,
//! so anything derived from them (rarity scores) can be keyed on it.

use super::{CollectionMetadata, CollectionPage, NftRecord};
use crate::error::Error;
use serde::Serialize;
use std::collections::HashSet;

/// Loader phase. `LoadingInitial` and `LoadingMore` mean a fetch is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Idle,
    LoadingInitial,
    LoadingMore,
    Error,
}

impl Phase {
    pub fn is_in_flight(self) -> bool {
        matches!(self, Phase::LoadingInitial | Phase::LoadingMore)
    }
}

/// User-facing failure of the last operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadError {
    pub message: String,
    /// Whether a manual retry is offered
    pub can_retry: bool,
}

impl From<&Error> for LoadError {
    fn from(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            can_retry: err.is_retryable(),
        }
    }
}

/// Render-ready summary of the collection state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    pub address: Option<String>,
    pub phase: Phase,
    pub loaded_count: usize,
    pub total_count_hint: Option<u64>,
    pub has_more: bool,
    pub retry_count: u32,
    pub error: Option<LoadError>,
    pub metadata: Option<CollectionMetadata>,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionState {
    pub address: Option<String>,
    records: Vec<NftRecord>,
    pub continuation_token: Option<String>,
    pub total_count_hint: Option<u64>,
    pub metadata: Option<CollectionMetadata>,
    pub phase: Phase,
    pub retry_count: u32,
    pub error: Option<LoadError>,
    epoch: u64,
    generation: u64,
}

impl CollectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated records, unique by `token_id`, in arrival order
    pub fn records(&self) -> &[NftRecord] {
        &self.records
    }

    /// Request epoch; bumped whenever a fetch starts or the state is cleared
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Items generation; bumped on every change to `records`
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_more(&self) -> bool {
        self.address.is_some() && self.continuation_token.is_some()
    }

    /// Reset for a fresh load of `address` and enter `LoadingInitial`.
    /// Returns the epoch the fetch must present when it completes.
    pub fn begin_initial(&mut self, address: String) -> u64 {
        self.clear_data();
        self.address = Some(address);
        self.phase = Phase::LoadingInitial;
        self.epoch += 1;
        self.epoch
    }

    /// Enter `LoadingMore` if there is a next page and nothing in flight.
    /// Returns `(epoch, address, continuation_token)` for the fetch.
    pub fn begin_more(&mut self) -> Option<(u64, String, String)> {
        if self.phase.is_in_flight() {
            return None;
        }
        let address = self.address.clone()?;
        let token = self.continuation_token.clone()?;

        self.phase = Phase::LoadingMore;
        self.error = None;
        self.retry_count = 0;
        self.epoch += 1;
        Some((self.epoch, address, token))
    }

    /// True if a response issued under `epoch` may still be applied
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.phase.is_in_flight()
    }

    /// Store the first page. Returns the number of duplicates dropped.
    pub fn apply_initial(&mut self, page: CollectionPage) -> usize {
        let hint = page.count_hint();
        let dropped = self.replace_records(page.items);
        self.continuation_token = page.next;
        self.total_count_hint = hint;
        self.metadata = page.metadata;
        self.phase = Phase::Idle;
        dropped
    }

    /// Merge a follow-up page; existing entries win over incoming duplicates.
    /// Returns the number of duplicates dropped.
    pub fn apply_more(&mut self, page: CollectionPage) -> usize {
        let hint = page
            .total_count
            .or(self.total_count_hint)
            .or_else(|| page.metadata.as_ref().and_then(|m| m.total_supply));
        let dropped = self.merge_records(page.items);
        self.continuation_token = page.next;
        self.total_count_hint = hint;
        if self.metadata.is_none() {
            self.metadata = page.metadata;
        }
        self.phase = Phase::Idle;
        dropped
    }

    /// Record a failed operation; loaded data is kept
    pub fn fail(&mut self, err: &Error) {
        self.error = Some(LoadError::from(err));
        self.phase = Phase::Error;
    }

    /// Clear the error; data stays
    pub fn dismiss_error(&mut self) {
        self.error = None;
        if self.phase == Phase::Error {
            self.phase = Phase::Idle;
        }
    }

    /// Back to the empty initial state. Any in-flight response becomes stale.
    pub fn clear(&mut self) {
        self.clear_data();
        self.address = None;
        self.phase = Phase::Idle;
        self.epoch += 1;
    }

    pub fn snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            address: self.address.clone(),
            phase: self.phase,
            loaded_count: self.records.len(),
            total_count_hint: self.total_count_hint,
            has_more: self.has_more(),
            retry_count: self.retry_count,
            error: self.error.clone(),
            metadata: self.metadata.clone(),
        }
    }

    fn clear_data(&mut self) {
        if !self.records.is_empty() {
            self.records.clear();
            self.generation += 1;
        }
        self.continuation_token = None;
        self.total_count_hint = None;
        self.metadata = None;
        self.retry_count = 0;
        self.error = None;
    }

    fn replace_records(&mut self, incoming: Vec<NftRecord>) -> usize {
        self.records.clear();
        self.merge_records(incoming)
    }

    fn merge_records(&mut self, incoming: Vec<NftRecord>) -> usize {
        let (merged, dropped) = merge_unique(std::mem::take(&mut self.records), incoming);
        self.records = merged;
        self.generation += 1;
        dropped
    }
}

/// Append `incoming` to `current`, keeping the first occurrence of each
/// `token_id`. Returns the merged list and how many entries were dropped.
pub fn merge_unique(current: Vec<NftRecord>, incoming: Vec<NftRecord>) -> (Vec<NftRecord>, usize) {
    let mut seen: HashSet<String> = current.iter().map(|r| r.token_id.clone()).collect();
    let mut merged = current;
    let mut dropped = 0;

    merged.reserve(incoming.len());
    for record in incoming {
        if seen.insert(record.token_id.clone()) {
            merged.push(record);
        } else {
            dropped += 1;
        }
    }

    (merged, dropped)
}
