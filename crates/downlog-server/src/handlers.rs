//! HTTP request handlers for the log API.

use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::Method;
use axum::response::Response;
use downlog_core::{
    FetchError, FetchResult, LogCategory, MAX_BODY_BYTES, MatchedEntry, SelectionKey, estimate_size,
    selector,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stream::stream_archive;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status message.
    pub status: String,
    /// Served category names.
    pub categories: Vec<String>,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Handle GET /api/health - liveness and served categories.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        categories: state
            .categories()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Step of a fetch request, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Checking method, body and selector.
    Validating,
    /// Walking the category root.
    Searching,
    /// Building and streaming the archive.
    Archiving,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => write!(f, "validating"),
            Self::Searching => write!(f, "searching"),
            Self::Archiving => write!(f, "archiving"),
        }
    }
}

/// Handle `{prefix}/api/{category}` - stream the selected logs as a zip.
///
/// Registered for every method so that non-POST requests get the JSON
/// `method_not_allowed` error rather than the router's empty 405.
pub async fn fetch_logs(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    method: Method,
    body: Body,
) -> Result<Response, ApiError> {
    let mut stage = Stage::Validating;
    let result = fetch(&state, &category, &method, body, &mut stage).await;

    if let Err(err) = &result {
        if err.is_client_error() {
            warn!(category = %category, stage = %stage, error = %err, "request rejected");
        } else {
            error!(category = %category, stage = %stage, error = %err, "request failed");
        }
    }
    result.map_err(ApiError::from)
}

async fn fetch(
    state: &AppState,
    name: &str,
    method: &Method,
    body: Body,
    stage: &mut Stage,
) -> FetchResult<Response> {
    let category = state
        .categories()
        .get(name)
        .cloned()
        .ok_or_else(|| FetchError::UnknownCategory(name.to_string()))?;

    selector::check_method(method.as_str())?;
    let body = read_body(body).await?;
    let key = selector::validate(method.as_str(), &body, category.kind())?;
    debug!(category = %name, key = %key, stage = %stage, "request validated");

    *stage = Stage::Searching;
    let entries = resolve(category.clone(), key.clone(), state.download_limit()).await?;
    info!(
        category = %name,
        key = %key,
        stage = %stage,
        entries = entries.len(),
        "selection resolved"
    );

    *stage = Stage::Archiving;
    let filename = format!("{name}-{key}.zip");
    stream_archive(category.archive_builder(), entries, &filename)
        .await
        .map_err(|ApiError(err)| err)
}

/// Read the request body, refusing anything over [`MAX_BODY_BYTES`].
async fn read_body(body: Body) -> FetchResult<Bytes> {
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(FetchError::PayloadTooLarge {
                limit: MAX_BODY_BYTES,
            })
        }
        Err(err) => Err(FetchError::invalid_json(format!("failed to read body: {err}"))),
    }
}

/// Resolve entries and enforce the download limit on the blocking pool.
async fn resolve(
    category: LogCategory,
    key: SelectionKey,
    limit: Option<u64>,
) -> FetchResult<Vec<MatchedEntry>> {
    tokio::task::spawn_blocking(move || {
        let entries = category.resolve(&key)?;
        if let Some(limit) = limit {
            let size = estimate_size(&entries)?;
            if size > limit {
                return Err(FetchError::DownloadTooLarge { size, limit });
            }
        }
        Ok(entries)
    })
    .await
    .map_err(|e| FetchError::Internal(format!("search task failed: {e}")))?
}
