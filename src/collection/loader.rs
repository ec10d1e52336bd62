//! Collection loader
//!
//! Drives `CollectionState` through its phases:
//!
//! ```text
//! Idle ──load──▶ LoadingInitial ──▶ Idle (data) | Error
//! Idle (data) ──more──▶ LoadingMore ──▶ Idle (data) | Error
//! ```
//!
//! While a fetch is in flight (including its backoff waits) every other
//! load request is a no-op. `clear_collection` is always allowed; it bumps
//! the request epoch so the in-flight response is discarded on arrival.
//!
//! Operations never return errors. Failures are stored on the state and
//! surfaced through [`CollectionLoader::snapshot`].

use super::address::{format_address, validate_address};
use super::retry::{with_retry, RetryPolicy};
use super::state::{CollectionSnapshot, CollectionState, Phase};
use super::{CollectionPage, ScoredNft};
use crate::error::Result;
use crate::favorites::Favorites;
use crate::fetch::CollectionFetcher;
use crate::filter::{self, FilterState};
use crate::rarity::traits::{trait_catalog, TraitSummary};
use crate::rarity::RarityCache;
use crate::telemetry;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Derived list plus the summary counts a renderer needs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionView {
    pub items: Vec<ScoredNft>,
    pub shown_count: usize,
    pub loaded_count: usize,
    pub total_count_hint: Option<u64>,
    pub active_filter_count: usize,
    pub has_more: bool,
    pub phase: Phase,
}

#[derive(Debug, Default)]
struct Session {
    state: CollectionState,
    filters: FilterState,
    rarity: RarityCache,
}

impl Session {
    /// Scores for the current records; recomputed only after they change
    fn scored(&mut self) -> Arc<Vec<ScoredNft>> {
        self.rarity
            .get_or_score(self.state.generation(), self.state.records())
    }
}

/// One collection session over a fetch collaborator
pub struct CollectionLoader<F> {
    fetcher: F,
    policy: RetryPolicy,
    session_id: Uuid,
    session: Mutex<Session>,
}

impl<F: CollectionFetcher> CollectionLoader<F> {
    pub fn new(fetcher: F, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            policy,
            session_id: Uuid::new_v4(),
            session: Mutex::new(Session::default()),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    // The lock is never held across an await, so a poisoned guard only
    // means a panic mid-update of plain data.
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate `address`, reset the session and fetch the first page
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn load_collection(&self, address: &str) {
        let (epoch, address) = {
            let mut session = self.lock();
            if session.state.phase.is_in_flight() {
                debug!("Fetch already in flight, ignoring load");
                return;
            }

            let address = match validate_address(address) {
                Ok(address) => address,
                Err(e) => {
                    debug!("Rejected address: {}", e);
                    session.state.fail(&e);
                    return;
                }
            };

            session.filters.reset();
            session.rarity.invalidate();
            (session.state.begin_initial(address.clone()), address)
        };

        info!(
            "🔍 Loading collection {} via {}",
            format_address(&address),
            self.fetcher.source_id()
        );
        let result = self.fetch_with_retry(epoch, &address, None).await;

        let mut session = self.lock();
        if !session.state.is_current(epoch) {
            telemetry::record_stale_response();
            debug!("Discarding stale first page for {}", address);
            return;
        }

        match result {
            Ok(page) => {
                let dropped = session.state.apply_initial(page);
                log_merge(dropped);
                info!(
                    "✅ Loaded {} NFTs for {} (more pages: {})",
                    session.state.records().len(),
                    address,
                    session.state.has_more()
                );
            }
            Err(e) => {
                warn!("Failed to load collection {}: {}", address, e);
                session.state.fail(&e);
            }
        }
    }

    /// Fetch and merge the next page; no-op without a next page or while busy
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn load_more(&self) {
        let next = self.lock().state.begin_more();
        let Some((epoch, address, cursor)) = next else {
            debug!("Nothing to load or fetch in flight, ignoring load more");
            return;
        };

        let result = self.fetch_with_retry(epoch, &address, Some(&cursor)).await;

        let mut session = self.lock();
        if !session.state.is_current(epoch) {
            telemetry::record_stale_response();
            debug!("Discarding stale page for {}", address);
            return;
        }

        match result {
            Ok(page) => {
                let dropped = session.state.apply_more(page);
                log_merge(dropped);
                debug!(
                    "Merged page for {}, {} NFTs loaded",
                    address,
                    session.state.records().len()
                );
            }
            Err(e) => {
                warn!("Failed to load next page for {}: {}", address, e);
                session.state.fail(&e);
            }
        }
    }

    /// Re-issue the failed operation if its error was retryable
    pub async fn retry(&self) {
        let target = {
            let session = self.lock();
            let state = &session.state;
            match &state.error {
                // A failed first page leaves no continuation token behind
                Some(err) if err.can_retry && state.phase == Phase::Error => state
                    .address
                    .clone()
                    .map(|a| (a, state.continuation_token.is_none())),
                _ => None,
            }
        };

        match target {
            Some((address, true)) => self.load_collection(&address).await,
            Some((_, false)) => self.load_more().await,
            None => debug!("No retryable error, ignoring retry"),
        }
    }

    /// Drop the error; loaded data is kept
    pub fn dismiss_error(&self) {
        self.lock().state.dismiss_error();
    }

    /// Reset to the empty state. Safe while a fetch is in flight.
    pub fn clear_collection(&self) {
        let mut session = self.lock();
        session.state.clear();
        session.filters.reset();
        session.rarity.invalidate();
        debug!(session = %self.session_id, "Collection cleared");
    }

    pub fn snapshot(&self) -> CollectionSnapshot {
        self.lock().state.snapshot()
    }

    /// Scored items in arrival order
    pub fn items(&self) -> Arc<Vec<ScoredNft>> {
        self.lock().scored()
    }

    pub fn filters(&self) -> FilterState {
        self.lock().filters.clone()
    }

    /// Mutate the filter state; returns the updated state
    pub fn update_filters(&self, update: impl FnOnce(&mut FilterState)) -> FilterState {
        let mut session = self.lock();
        update(&mut session.filters);
        session.filters.clone()
    }

    pub fn toggle_trait_filter(&self, trait_type: &str, value: &str) -> bool {
        self.lock().filters.toggle_trait_filter(trait_type, value)
    }

    pub fn clear_filters(&self) {
        self.lock().filters.clear_filters();
    }

    /// Run the filter/sort pipeline over the current items
    pub fn view<V: Favorites + ?Sized>(&self, favorites: &V) -> CollectionView {
        let (scored, filters, snapshot) = {
            let mut session = self.lock();
            (session.scored(), session.filters.clone(), session.state.snapshot())
        };

        let items = filter::derive(&scored, &filters, favorites);
        CollectionView {
            shown_count: items.len(),
            items,
            loaded_count: snapshot.loaded_count,
            total_count_hint: snapshot.total_count_hint,
            active_filter_count: filters.active_filter_count(),
            has_more: snapshot.has_more,
            phase: snapshot.phase,
        }
    }

    pub fn trait_catalog(&self) -> Vec<TraitSummary> {
        trait_catalog(self.lock().state.records())
    }

    async fn fetch_with_retry(
        &self,
        epoch: u64,
        address: &str,
        cursor: Option<&str>,
    ) -> Result<CollectionPage> {
        let operation = if cursor.is_some() {
            "load_more"
        } else {
            "load_collection"
        };
        let fetcher = &self.fetcher;

        with_retry(
            self.policy,
            operation,
            move |_attempt| fetcher.fetch_page(address, cursor),
            |_err, attempt| {
                let mut session = self.lock();
                if session.state.is_current(epoch) {
                    session.state.retry_count = attempt;
                }
            },
        )
        .await
    }
}

fn log_merge(dropped: usize) {
    if dropped > 0 {
        debug!("Dropped {} duplicate NFTs while merging", dropped);
        telemetry::record_duplicates_dropped(dropped);
    }
}
