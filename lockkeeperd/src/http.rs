//! HTTP surface over [`lockkeeper_core::LockRegistry`].
//!
//! Three verbs on a single `/lock` resource: acquire, enumerate, release.
//! The core is synchronous, so handlers that must block hand the call off
//! to `spawn_blocking` rather than holding a Tokio worker thread hostage
//! for the duration of a multi-name acquire.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use lockkeeper_core::{LockError, LockMode, LockRegistry};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LockRegistry>,
    pub max_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/lock", post(lock).get(enumerate).delete(unlock))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct LockQuery {
    names: String,
    #[serde(rename = "type", default = "default_mode")]
    mode: String,
    timeout: Option<u64>,
}

fn default_mode() -> String {
    "key".to_string()
}

/// Clamps a requested timeout (seconds) to `[1, max]`; an absent or
/// out-of-range value falls back to the configured maximum.
fn clamp_timeout(requested: Option<u64>, max: Duration) -> Duration {
    let max_secs = max.as_secs().max(1);
    match requested {
        Some(secs) if secs >= 1 && secs <= max_secs => Duration::from_secs(secs),
        _ => max,
    }
}

async fn lock(
    State(state): State<AppState>,
    Query(query): Query<LockQuery>,
) -> (StatusCode, String) {
    let names: Vec<String> = query
        .names
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mode = match LockMode::parse(&query.mode) {
        Ok(mode) => mode,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()),
    };

    let timeout = clamp_timeout(query.timeout, state.max_timeout);
    let registry = state.registry.clone();

    let result = tokio::task::spawn_blocking(move || registry.lock(mode, &names, timeout))
        .await
        .expect("lock task panicked");

    match result {
        Ok(id) => {
            info!(lease_id = id, mode = mode.as_str(), "lock acquired");
            (StatusCode::OK, id.to_string())
        }
        Err(LockError::Timeout) => {
            warn!(mode = mode.as_str(), "lock timed out");
            (StatusCode::REQUEST_TIMEOUT, LockError::Timeout.to_string())
        }
        Err(err) => (StatusCode::BAD_REQUEST, err.to_string()),
    }
}

async fn enumerate(State(state): State<AppState>) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    let registry = state.registry.clone();
    let dump = tokio::task::spawn_blocking(move || registry.enumerate())
        .await
        .expect("enumerate task panicked");
    (StatusCode::OK, [("content-type", "text/plain")], dump)
}

#[derive(Debug, Deserialize)]
struct UnlockQuery {
    id: Option<u64>,
}

async fn unlock(State(state): State<AppState>, Query(query): Query<UnlockQuery>) -> (StatusCode, String) {
    let Some(id) = query.id else {
        return (StatusCode::BAD_REQUEST, "missing id".to_string());
    };
    let registry = state.registry.clone();
    tokio::task::spawn_blocking(move || registry.unlock(id))
        .await
        .expect("unlock task panicked");
    info!(lease_id = id, "lock released");
    (StatusCode::OK, String::new())
}
