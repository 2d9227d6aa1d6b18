//! The server module exposes pages, the location list, CSV export and image
//! classification over a small JSON HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use llm::LLMProvider;
use log::{error, info, warn};
use rate_guard::StdTokenBucket;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::constants::MAX_IMAGE_BYTES;
use crate::error::{ParseError, VisionError, WikiError};
use crate::export::write_csv;
use crate::locations::{LocationReader, LocationRecord};
use crate::parse::{Assembler, InjectId, ResolveImageUrls};
use crate::table::extract_table;
use crate::vision::{VisionContext, classify_image, classify_image_with_gate, prepare_image};
use crate::wiki::WikiClient;

/// Models backing `POST /api/set_items`.
pub struct VisionModels {
    pub model: Box<dyn LLMProvider>,
    pub gate_model: Option<Box<dyn LLMProvider>>,
    pub rate_limiter: Option<StdTokenBucket>,
}

impl VisionModels {
    fn context(&self) -> VisionContext<'_> {
        VisionContext {
            model: self.model.as_ref(),
            gate_model: self
                .gate_model
                .as_ref()
                .map(|model| model.as_ref() as &dyn llm::chat::ChatProvider),
            rate_limiter: self.rate_limiter.as_ref(),
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub wiki: WikiClient,
    /// The wiki's `index.php`, base of resolved image URLs.
    pub index_url: Url,
    /// Page holding the table of all locations.
    pub list_page: String,
    /// `None` disables image classification.
    pub vision: Option<VisionModels>,
}

#[derive(Debug, Error)]
enum ApiError {
    #[error(transparent)]
    Wiki(#[from] WikiError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Vision(#[from] VisionError),
    #[error("image classification is not configured")]
    VisionDisabled,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Wiki(WikiError::PageNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Wiki(_) => StatusCode::BAD_GATEWAY,
            ApiError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Vision(VisionError::ImageTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Vision(VisionError::UnsupportedImage) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Vision(_) => StatusCode::BAD_GATEWAY,
            ApiError::VisionDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/get", get(get_page))
        .route("/api/search", get(search))
        .route("/api/export", get(export_csv))
        .route("/api/set_items", post(set_items))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024 * 1024))
        .with_state(state)
}

/// Binds `host:port` and serves the API until the process is stopped.
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener cannot be bound.
pub async fn run_server(host: &str, port: u16, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context(format!("Invalid address: {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Unable to bind {addr}"))?;

    info!("Starting server on http://{addr}");
    axum::serve(listener, router(Arc::new(state))).await?;

    Ok(())
}

/// `GET /api/health`
async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    poi: Option<String>,
}

/// `GET /api/get`
///
/// Without `poi` returns the location list, with `poi` the structured page.
async fn get_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let Some(poi) = query.poi.filter(|poi| !poi.trim().is_empty()) else {
        let wikitext = state.wiki.fetch_wikitext(&state.list_page).await?;
        let records: Vec<LocationRecord> = LocationReader::new(&wikitext)
            .filter_map(|record| {
                record
                    .map_err(|e| warn!("Skipping location record: {e}"))
                    .ok()
            })
            .collect();
        return Ok(Json(json!({ "data": records })));
    };

    let wikitext = state.wiki.fetch_wikitext(&poi).await?;
    let assembly = Assembler::new()
        .with_hook(InjectId { id: poi.clone() })
        .with_hook(ResolveImageUrls {
            index_url: state.index_url.clone(),
        })
        .assemble(&wikitext);

    if assembly.errors.is_empty() {
        return Ok(Json(json!({ "data": assembly.document })));
    }

    let errors: Vec<String> = assembly
        .errors
        .iter()
        .map(|e| {
            error!("Page '{poi}': {e}");
            e.to_string()
        })
        .collect();
    Ok(Json(json!({ "data": assembly.document, "errors": errors })))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
}

/// `GET /api/search?q=`
async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let hits = state.wiki.search(&query.q).await?;
    Ok(Json(json!({ "data": hits })))
}

/// `GET /api/export?poi=`
async fn export_csv(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Response, ApiError> {
    let page = query.poi.unwrap_or_else(|| state.list_page.clone());
    let wikitext = state.wiki.fetch_wikitext(&page).await?;
    let table = extract_table(&wikitext)?;

    let mut csv = Vec::new();
    write_csv(&mut csv, &table).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response())
}

#[derive(Debug, Deserialize)]
struct ClassifyQuery {
    #[serde(default = "enabled")]
    bbox: bool,
    #[serde(default = "enabled")]
    gate: bool,
}

fn enabled() -> bool {
    true
}

/// `POST /api/set_items`
///
/// Multipart form with an `image` file and an optional `locationId`.
async fn set_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClassifyQuery>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let vision = state.vision.as_ref().ok_or(ApiError::VisionDisabled)?;

    let mut image = None;
    let mut location_id = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                image = Some(bytes.to_vec());
            }
            Some("locationId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                location_id = Some(text);
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("missing 'image' field".to_owned()))?;
    let image = prepare_image(image)?;
    info!(
        "Classifying image for location {}",
        location_id.as_deref().unwrap_or("<unknown>")
    );

    let ctx = vision.context();
    let report = if query.gate {
        classify_image_with_gate(&image, query.bbox, &ctx).await?
    } else {
        classify_image(&image, query.bbox, &ctx).await?
    };

    Ok(Json(json!({ "data": report, "locationId": location_id })))
}
