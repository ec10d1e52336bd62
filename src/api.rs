//! HTTP API Server for one collection session
//!
//! Exposes the loader, filter state, favorites and export to a frontend.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::collection::{CollectionLoader, CollectionSnapshot, CollectionView};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::export::{self, ExportFormat};
use crate::favorites::FavoriteSet;
use crate::fetch::CollectionFetcher;
use crate::filter::{FilterState, SortKey};
use crate::rarity::traits::{trait_rarity_percent, TraitSummary};

pub type SharedFetcher = Arc<dyn CollectionFetcher>;

/// Shared application state
pub struct AppState {
    pub loader: CollectionLoader<SharedFetcher>,
    pub favorites: RwLock<FavoriteSet>,
    /// Where favorites are persisted; `None` keeps them in memory only
    pub favorites_path: Option<PathBuf>,
}

impl AppState {
    pub fn new(loader: CollectionLoader<SharedFetcher>, favorites_path: Option<PathBuf>) -> Self {
        let favorites = favorites_path
            .as_deref()
            .map(FavoriteSet::load)
            .unwrap_or_default();
        Self {
            loader,
            favorites: RwLock::new(favorites),
            favorites_path,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub address: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemsQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Deserialize)]
pub struct TraitToggleRequest {
    pub trait_type: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct TraitToggleResponse {
    pub selected: bool,
    pub filters: FilterState,
}

/// Partial filter update; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct FilterUpdate {
    pub search_text: Option<String>,
    pub sort_key: Option<String>,
    pub favorites_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TraitRarityQuery {
    pub trait_type: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct TraitRarityResponse {
    pub trait_type: String,
    pub value: String,
    pub percent: f64,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub token_id: String,
    pub favorite: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_export_format")]
    pub format: String,
}

fn default_export_format() -> String {
    "json".to_string()
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub session: String,
}

/// Build the router with CORS, tracing and timeout layers
pub fn router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Collection lifecycle
        .route(
            "/api/v1/collection",
            get(get_snapshot).post(load_collection).delete(clear_collection),
        )
        .route("/api/v1/collection/more", post(load_more))
        .route("/api/v1/collection/retry", post(retry))
        .route("/api/v1/collection/dismiss", post(dismiss_error))
        .route("/api/v1/collection/items", get(get_items))
        // Filters
        .route(
            "/api/v1/filters",
            get(get_filters).put(update_filters).delete(clear_filters),
        )
        .route("/api/v1/filters/traits", post(toggle_trait))
        // Trait analytics
        .route("/api/v1/traits", get(get_traits))
        .route("/api/v1/traits/rarity", get(get_trait_rarity))
        // Favorites
        .route("/api/v1/favorites", get(list_favorites))
        .route("/api/v1/favorites/:token_id", post(toggle_favorite))
        // Export
        .route("/api/v1/export", get(export_items))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
        .with_state(state);

    if config.cors_enabled {
        app.layer(cors_layer(&config.cors_origins))
    } else {
        app
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Start the API server; returns once `shutdown` resolves and connections drain
pub async fn start_server(
    state: Arc<AppState>,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting collection API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        session: state.loader.session_id().to_string(),
    })
}

async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<CollectionSnapshot> {
    Json(state.loader.snapshot())
}

/// Load a collection. Fetch failures are reported in the snapshot, not as
/// an error status.
async fn load_collection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoadRequest>,
) -> Json<CollectionSnapshot> {
    state.loader.load_collection(&req.address).await;
    Json(state.loader.snapshot())
}

async fn clear_collection(State(state): State<Arc<AppState>>) -> Json<CollectionSnapshot> {
    state.loader.clear_collection();
    Json(state.loader.snapshot())
}

async fn load_more(State(state): State<Arc<AppState>>) -> Json<CollectionSnapshot> {
    state.loader.load_more().await;
    Json(state.loader.snapshot())
}

async fn retry(State(state): State<Arc<AppState>>) -> Json<CollectionSnapshot> {
    state.loader.retry().await;
    Json(state.loader.snapshot())
}

async fn dismiss_error(State(state): State<Arc<AppState>>) -> Json<CollectionSnapshot> {
    state.loader.dismiss_error();
    Json(state.loader.snapshot())
}

/// Derived list. `offset`/`limit` page through it; counts describe the whole list.
async fn get_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ItemsQuery>,
) -> Json<CollectionView> {
    let mut view = {
        let favorites = state.favorites.read().await;
        state.loader.view(&*favorites)
    };

    let end = query
        .limit
        .map_or(view.items.len(), |limit| query.offset.saturating_add(limit));
    view.items = view
        .items
        .into_iter()
        .skip(query.offset)
        .take(end.saturating_sub(query.offset))
        .collect();
    Json(view)
}

async fn get_filters(State(state): State<Arc<AppState>>) -> Json<FilterState> {
    Json(state.loader.filters())
}

async fn update_filters(
    State(state): State<Arc<AppState>>,
    Json(update): Json<FilterUpdate>,
) -> Result<Json<FilterState>> {
    let sort_key = update
        .sort_key
        .as_deref()
        .map(str::parse::<SortKey>)
        .transpose()?;

    let filters = state.loader.update_filters(|filters| {
        if let Some(search_text) = update.search_text {
            filters.search_text = search_text;
        }
        if let Some(sort_key) = sort_key {
            filters.sort_key = sort_key;
        }
        if let Some(favorites_only) = update.favorites_only {
            filters.favorites_only = favorites_only;
        }
    });
    Ok(Json(filters))
}

async fn clear_filters(State(state): State<Arc<AppState>>) -> Json<FilterState> {
    state.loader.clear_filters();
    Json(state.loader.filters())
}

async fn toggle_trait(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TraitToggleRequest>,
) -> Result<Json<TraitToggleResponse>> {
    if req.trait_type.trim().is_empty() {
        return Err(Error::bad_request("trait_type must not be empty"));
    }
    let selected = state.loader.toggle_trait_filter(&req.trait_type, &req.value);
    Ok(Json(TraitToggleResponse {
        selected,
        filters: state.loader.filters(),
    }))
}

async fn get_traits(State(state): State<Arc<AppState>>) -> Json<Vec<TraitSummary>> {
    Json(state.loader.trait_catalog())
}

async fn get_trait_rarity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TraitRarityQuery>,
) -> Json<TraitRarityResponse> {
    let items = state.loader.items();
    let percent = trait_rarity_percent(items.as_slice(), &query.trait_type, &query.value);
    Json(TraitRarityResponse {
        trait_type: query.trait_type,
        value: query.value,
        percent,
    })
}

async fn list_favorites(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let favorites = state.favorites.read().await;
    Json(favorites.iter().map(str::to_string).collect())
}

/// Toggle a favorite and persist the set.
///
/// Holds the write guard until the file is written; saves land in toggle order.
async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    Path(token_id): Path<String>,
) -> Result<Json<FavoriteResponse>> {
    let mut favorites = state.favorites.write().await;
    let favorite = favorites.toggle(&token_id);

    if let Some(path) = state.favorites_path.clone() {
        let snapshot = favorites.clone();
        tokio::task::spawn_blocking(move || snapshot.save(&path))
            .await
            .map_err(Error::internal)??;
    }
    drop(favorites);

    Ok(Json(FavoriteResponse { token_id, favorite }))
}

/// Export the derived list as a file download; 404 when no collection is loaded
async fn export_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let format: ExportFormat = query.format.parse()?;
    let snapshot = state.loader.snapshot();
    if snapshot.address.is_none() {
        return Err(Error::not_found(
            "collection",
            state.loader.session_id().to_string(),
        ));
    }

    let view = {
        let favorites = state.favorites.read().await;
        state.loader.view(&*favorites)
    };
    let now = chrono::Utc::now();

    let body = match format {
        ExportFormat::Json => export::to_json(&view.items, snapshot.metadata.as_ref(), now)?,
        ExportFormat::Csv => export::to_csv(&view.items),
    };

    let name = snapshot
        .metadata
        .as_ref()
        .map(|m| m.name.clone())
        .or(snapshot.address)
        .unwrap_or_else(|| "collection".to_string());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        export::file_name(&name, format, now)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionPage, NftRecord, RetryPolicy, Trait};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    const ADDR: &str = "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d";

    struct FixedFetcher;

    #[async_trait]
    impl CollectionFetcher for FixedFetcher {
        async fn fetch_page(&self, _address: &str, cursor: Option<&str>) -> Result<CollectionPage> {
            let ids: &[u64] = if cursor.is_some() { &[3] } else { &[1, 2] };
            Ok(CollectionPage {
                items: ids
                    .iter()
                    .map(|id| {
                        NftRecord::new(format!("0x{:x}", id), id.to_string(), format!("Ape {}", id))
                            .with_trait(Trait::new("Fur", if *id == 1 { "Gold" } else { "Brown" }))
                    })
                    .collect(),
                next: cursor.is_none().then(|| "p2".to_string()),
                total_count: Some(3),
                metadata: None,
            })
        }
    }

    fn app(favorites_path: Option<PathBuf>) -> Router {
        let loader: CollectionLoader<SharedFetcher> =
            CollectionLoader::new(Arc::new(FixedFetcher), RetryPolicy::new(1, Duration::ZERO));
        let config = ApiConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
            request_timeout: Duration::from_secs(5),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            metrics_port: 0,
        };
        router(Arc::new(AppState::new(loader, favorites_path)), &config)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(None), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "healthy");
    }

    #[tokio::test]
    async fn test_load_filter_and_page_through_items() {
        let app = app(None);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/collection",
            Some(serde_json::json!({ "address": ADDR })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let snapshot = json(&body);
        assert_eq!(snapshot["loadedCount"], 2);
        assert_eq!(snapshot["hasMore"], true);

        let (_, body) = send(&app, "POST", "/api/v1/collection/more", None).await;
        assert_eq!(json(&body)["loadedCount"], 3);

        let (_, body) = send(
            &app,
            "POST",
            "/api/v1/filters/traits",
            Some(serde_json::json!({ "trait_type": "Fur", "value": "Brown" })),
        )
        .await;
        assert_eq!(json(&body)["selected"], true);

        let (_, body) = send(&app, "GET", "/api/v1/collection/items?limit=1", None).await;
        let view = json(&body);
        assert_eq!(view["shownCount"], 2);
        assert_eq!(view["activeFilterCount"], 1);
        assert_eq!(view["items"].as_array().unwrap().len(), 1);
        assert_eq!(view["items"][0]["tokenIdNumeric"], "2");
    }

    #[tokio::test]
    async fn test_invalid_address_reported_in_snapshot() {
        let (status, body) = send(
            &app(None),
            "POST",
            "/api/v1/collection",
            Some(serde_json::json!({ "address": "0x123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let snapshot = json(&body);
        assert_eq!(snapshot["phase"], "error");
        assert_eq!(snapshot["error"]["canRetry"], false);
    }

    #[tokio::test]
    async fn test_unknown_sort_key_is_bad_request() {
        let (status, body) = send(
            &app(None),
            "PUT",
            "/api/v1/filters",
            Some(serde_json::json!({ "sort_key": "price" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&body)["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_favorites_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        let app = app(Some(path.clone()));

        let (status, body) = send(&app, "POST", "/api/v1/favorites/0x2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["favorite"], true);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"["0x2"]"#);

        send(&app, "POST", "/api/v1/collection", Some(serde_json::json!({ "address": ADDR }))).await;
        send(&app, "PUT", "/api/v1/filters", Some(serde_json::json!({ "favorites_only": true }))).await;
        let (_, body) = send(&app, "GET", "/api/v1/collection/items", None).await;
        assert_eq!(json(&body)["items"][0]["tokenId"], "0x2");
        assert_eq!(json(&body)["shownCount"], 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_favorite_toggles_persist_final_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        let app = app(Some(path.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let app = app.clone();
                tokio::spawn(async move {
                    send(&app, "POST", &format!("/api/v1/favorites/0x{:x}", i % 4), None).await
                })
            })
            .collect();
        for task in tasks {
            let (status, _) = task.await.unwrap();
            assert_eq!(status, StatusCode::OK);
        }

        // Every id was toggled an even number of times
        let (_, body) = send(&app, "GET", "/api/v1/favorites", None).await;
        assert_eq!(json(&body), serde_json::json!([]));
        let saved: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(saved.is_empty(), "{:?}", saved);
    }

    #[tokio::test]
    async fn test_export_without_collection_is_not_found() {
        let (status, body) = send(&app(None), "GET", "/api/v1/export?format=csv", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json(&body)["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_csv_export_download() {
        let app = app(None);
        send(&app, "POST", "/api/v1/collection", Some(serde_json::json!({ "address": ADDR }))).await;

        let (status, body) = send(&app, "GET", "/api/v1/export?format=csv", None).await;
        assert_eq!(status, StatusCode::OK);
        let csv = String::from_utf8(body).unwrap();
        assert!(csv.starts_with("Token ID,Name,Rarity Rank"));
        assert_eq!(csv.lines().count(), 3);

        let (status, _) = send(&app, "GET", "/api/v1/export?format=xml", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trait_rarity_percent() {
        let app = app(None);
        send(&app, "POST", "/api/v1/collection", Some(serde_json::json!({ "address": ADDR }))).await;

        let (_, body) = send(&app, "GET", "/api/v1/traits/rarity?trait_type=Fur&value=Gold", None).await;
        assert_eq!(json(&body)["percent"], 50.0);

        let (_, body) = send(&app, "GET", "/api/v1/traits", None).await;
        assert_eq!(json(&body)[0]["values"][0]["value"], "Brown");
    }
}
