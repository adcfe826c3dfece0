//! JSON-over-HTTP API for a [`Library`].
//!
//! Reads are open. Writes need an `Authorization` header equal to the
//! configured key; with no key configured, every write is refused.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use thiserror::Error;

use crate::library::{Library, SearchResult};
use crate::see_also::SeeAlsoError;
use crate::song::{SongFilter, SongMeta};
use crate::store::StoreError;

pub const API_ARTISTS: &str = "/api/v0/artists";
pub const API_SONGS: &str = "/api/v0/songs";
pub const API_CHORDS: &str = "/api/v0/chords";
pub const API_SEE_ALSO: &str = "/api/v0/see-also";
pub const API_RANDOM: &str = "/api/v0/random";
pub const API_SEARCH: &str = "/api/v0/search";
pub const API_REINDEX: &str = "/api/v0/reindex";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    library: Arc<Library>,
    auth_key: Option<Arc<str>>,
    search_limit: usize,
}

impl AppState {
    pub fn new(library: Arc<Library>, auth_key: Option<String>, search_limit: usize) -> Self {
        if auth_key.is_none() {
            log::warn!("No auth key configured; all write requests will be refused");
        }
        Self {
            library,
            auth_key: auth_key.map(Arc::from),
            search_limit,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    NotFound(String),
    #[error("internal server error")]
    Internal,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::NotFound(format!("song {id:?} not found")),
            StoreError::AlreadyExists(_) | StoreError::InvalidId(_) => {
                ApiError::BadRequest(e.to_string())
            }
            other => {
                log::error!("Store error: {other}");
                ApiError::Internal
            }
        }
    }
}

impl From<SeeAlsoError> for ApiError {
    fn from(e: SeeAlsoError) -> Self {
        log::error!("See-also error: {e}");
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, [(CONTENT_TYPE, TEXT_PLAIN)], self.to_string()).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the API router over `state`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(API_ARTISTS, get(list_artists))
        .route(
            API_SONGS,
            get(get_songs).post(new_song).put(update_song).delete(delete_song),
        )
        .route(API_CHORDS, get(get_chords).put(update_chords))
        .route(API_SEE_ALSO, get(see_also))
        .route(API_RANDOM, get(random_song))
        .route(API_SEARCH, get(search))
        .route(API_REINDEX, post(reindex))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Server now running at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    log::info!("{method} {path} -> {}", response.status().as_u16());
    response
}

/// Run a store call on the blocking pool.
async fn blocking<T, E, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Library) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let library = Arc::clone(&state.library);
    match tokio::task::spawn_blocking(move || f(&library)).await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => {
            log::error!("Blocking task failed: {e}");
            Err(ApiError::Internal)
        }
    }
}

fn authorise(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.auth_key.as_deref() else {
        return Err(ApiError::Unauthorized);
    };
    match headers.get(AUTHORIZATION) {
        Some(given) if given.as_bytes() == expected.as_bytes() => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value.ok_or_else(|| ApiError::BadRequest(format!("required param {name:?} not provided")))
}

fn parse_meta(body: &[u8]) -> ApiResult<SongMeta> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("parsing body: {e}")))
}

#[derive(Deserialize)]
struct IdParam {
    id: Option<String>,
}

#[derive(Deserialize)]
struct ArtistParam {
    artist: Option<String>,
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

async fn list_artists(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    blocking(&state, |lib| lib.list_artists()).await.map(Json)
}

async fn get_songs(
    State(state): State<AppState>,
    Query(filter): Query<SongFilter>,
) -> ApiResult<Json<Vec<SongMeta>>> {
    blocking(&state, move |lib| lib.find_songs(&filter)).await.map(Json)
}

async fn new_song(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SongMeta>)> {
    authorise(&state, &headers)?;
    let meta = parse_meta(&body)?;
    let created = blocking(&state, move |lib| lib.create_song(meta)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_song(
    State(state): State<AppState>,
    Query(params): Query<IdParam>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<SongMeta>> {
    authorise(&state, &headers)?;
    let id = required(params.id, "id")?;
    let meta = parse_meta(&body)?;
    blocking(&state, move |lib| lib.update_song(&id, meta)).await.map(Json)
}

async fn delete_song(
    State(state): State<AppState>,
    Query(params): Query<IdParam>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    authorise(&state, &headers)?;
    let id = required(params.id, "id")?;
    blocking(&state, move |lib| lib.delete_song(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_chords(
    State(state): State<AppState>,
    Query(params): Query<IdParam>,
) -> ApiResult<impl IntoResponse> {
    let id = required(params.id, "id")?;
    let chords = blocking(&state, move |lib| lib.get_chords(&id)).await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], chords))
}

async fn update_chords(
    State(state): State<AppState>,
    Query(params): Query<IdParam>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    authorise(&state, &headers)?;
    let id = required(params.id, "id")?;
    let chords = blocking(&state, move |lib| lib.set_chords(&id, &body)).await?;
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], chords))
}

async fn see_also(
    State(state): State<AppState>,
    Query(params): Query<ArtistParam>,
) -> ApiResult<Json<Vec<String>>> {
    let artist = required(params.artist, "artist")?;
    blocking(&state, move |lib| lib.related_artists(&artist)).await.map(Json)
}

async fn random_song(State(state): State<AppState>) -> ApiResult<Json<SongMeta>> {
    blocking(&state, |lib| lib.random_song())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no songs in catalog".to_string()))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    let query = required(params.q, "q")?;
    let limit = params.limit.unwrap_or(state.search_limit);
    blocking(&state, move |lib| lib.search(&query, limit)).await.map(Json)
}

async fn reindex(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    authorise(&state, &headers)?;
    let indexed = blocking(&state, |lib| lib.reindex()).await?;
    Ok(Json(serde_json::json!({ "indexed": indexed })))
}
