//! Document session endpoints
//!
//! - Open, reload and close sessions
//! - Page geometry
//! - Full-page, tile and preview renders (raw RGBA bodies)

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Path, Query, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::document::{
    PageRequest, PixelBuffer, ScaledRequest, SessionSummary, TileRequest,
};
use crate::error::{AppError, Result};
use crate::state::AppState;

const PASSWORD_HEADER: &str = "x-document-password";

/// Response for session list
#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

/// Open / reload response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResponse {
    pub id: String,
    pub page_count: usize,
}

/// Close response
#[derive(Serialize)]
pub struct CloseResponse {
    pub id: String,
    pub closed: bool,
}

/// Viewport update body
#[derive(Debug, Deserialize)]
pub struct ViewportRequest {
    /// Clears the viewport when absent
    pub width: Option<f64>,
}

/// Query parameters for full-page rendering
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub width: u32,
    pub height: u32,
}

/// Query parameters for tile rendering
#[derive(Debug, Deserialize)]
pub struct TileQuery {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

/// Query parameters for preview rendering
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

pub fn router(max_document_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_documents).post(open_generated))
        .route(
            "/:id",
            post(open_document).put(reload_document).delete(close_document),
        )
        .route("/:id/widths", get(page_widths))
        .route("/:id/heights", get(page_heights))
        .route("/:id/viewport", put(set_viewport))
        .route("/:id/pages/:page", get(render_page))
        .route("/:id/pages/:page/tile", get(render_tile))
        .route("/:id/pages/:page/image", get(render_image))
        .layer(DefaultBodyLimit::max(max_document_bytes))
}

/// List open sessions
async fn list_documents(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.registry().sessions();
    let total = sessions.len();
    Json(SessionListResponse { sessions, total })
}

/// Open a document under a generated session id
async fn open_generated(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<OpenResponse>)> {
    let id = uuid::Uuid::new_v4().to_string();
    open(&state, id, &headers, body?).await
}

/// Open a document under a caller-chosen session id
async fn open_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<OpenResponse>)> {
    open(&state, id, &headers, body?).await
}

async fn open(
    state: &AppState,
    id: String,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<OpenResponse>)> {
    if body.is_empty() {
        return Err(AppError::BadRequest("request body must contain the document".into()));
    }
    tracing::debug!(session_id = %id, bytes = body.len(), "Opening document");

    let page_count = state
        .registry()
        .open(&id, body.to_vec(), password(headers)?)
        .await?;

    Ok((StatusCode::CREATED, Json(OpenResponse { id, page_count })))
}

/// Replace the content of an open session
async fn reload_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<OpenResponse>> {
    let body = body?;
    if body.is_empty() {
        return Err(AppError::BadRequest("request body must contain the document".into()));
    }

    let page_count = state
        .registry()
        .reload(&id, body.to_vec(), password(&headers)?)
        .await?;

    Ok(Json(OpenResponse { id, page_count }))
}

/// Close a session
async fn close_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<CloseResponse> {
    let closed = state.registry().close(&id).await;
    Json(CloseResponse { id, closed })
}

async fn page_widths(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<f64>>> {
    Ok(Json(state.dispatcher().pages_width(&id).await?))
}

async fn page_heights(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<f64>>> {
    Ok(Json(state.dispatcher().pages_height(&id).await?))
}

async fn set_viewport(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: std::result::Result<Json<ViewportRequest>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(body) = body?;
    state.registry().set_viewport(&id, body.width)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Render a whole page into `width` x `height`
async fn render_page(
    State(state): State<AppState>,
    path: std::result::Result<Path<(String, usize)>, PathRejection>,
    query: std::result::Result<Query<PageQuery>, QueryRejection>,
) -> Result<Response> {
    let Path((id, page)) = path?;
    let Query(query) = query?;
    let request = PageRequest {
        page,
        width: query.width,
        height: query.height,
    };
    let buffer = state.dispatcher().render_page(&id, request).await?;
    Ok(pixel_response(buffer))
}

/// Render a sub-rectangle of a page
async fn render_tile(
    State(state): State<AppState>,
    path: std::result::Result<Path<(String, usize)>, PathRejection>,
    query: std::result::Result<Query<TileQuery>, QueryRejection>,
) -> Result<Response> {
    let Path((id, page)) = path?;
    let Query(query) = query?;
    let request = TileRequest {
        page,
        x: query.x,
        y: query.y,
        width: query.width,
        height: query.height,
        scale: query.scale,
    };
    let buffer = state.dispatcher().render_tile(&id, request).await?;
    Ok(pixel_response(buffer))
}

/// Render a whole page at a preview scale
async fn render_image(
    State(state): State<AppState>,
    path: std::result::Result<Path<(String, usize)>, PathRejection>,
    query: std::result::Result<Query<ImageQuery>, QueryRejection>,
) -> Result<Response> {
    let Path((id, page)) = path?;
    let Query(query) = query?;
    let request = ScaledRequest {
        page,
        scale: query.scale,
    };
    let buffer = state.dispatcher().render_scaled(&id, request).await?;
    Ok(pixel_response(buffer))
}

/// Password from the request headers. Any UTF-8 is accepted, not just
/// visible ASCII.
fn password(headers: &HeaderMap) -> Result<Option<String>> {
    headers
        .get(PASSWORD_HEADER)
        .map(|value| {
            std::str::from_utf8(value.as_bytes())
                .map(str::to_string)
                .map_err(|_| AppError::BadRequest(format!("{} must be valid UTF-8", PASSWORD_HEADER)))
        })
        .transpose()
}

fn pixel_response(buffer: PixelBuffer) -> Response {
    let width = HeaderValue::from(buffer.width());
    let height = HeaderValue::from(buffer.height());
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (HeaderName::from_static("x-image-width"), width),
            (HeaderName::from_static("x-image-height"), height),
            (HeaderName::from_static("x-pixel-format"), HeaderValue::from_static("rgba8")),
        ],
        buffer.into_data(),
    )
        .into_response()
}
