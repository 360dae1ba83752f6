use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::{Mutex, RwLock};
use std::{collections::{HashMap, HashSet}, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    catalog::OptionList,
    error::{ApiError, GenerationError},
    history::HistoryStore,
    models::{GenerateRequest, GenerateResponse, GenerationRecord},
    orchestrator::Orchestrator,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub history: Arc<HistoryStore>,
    pub latest: Arc<RwLock<HashMap<String, GenerateResponse>>>,
    pub in_flight: Arc<Mutex<HashSet<String>>>,
    pub persist_results: bool,
    pub generation_timeout: Duration,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, persist_results: bool, generation_timeout: Duration) -> Self {
        Self {
            orchestrator,
            history: Arc::default(),
            latest: Arc::default(),
            in_flight: Arc::default(),
            persist_results,
            generation_timeout,
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/backgrounds", get(list_backgrounds))
        .route("/api/generate", post(generate_photoshoot))
        .route("/api/history/:user_id", get(get_history))
        .route("/api/latest/:user_id", get(get_latest))
        .route("/api/storage/*path", get(get_stored_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

/// Marks a user as having a generation outstanding until dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    user_id: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<Mutex<HashSet<String>>>, user_id: &str) -> Option<Self> {
        if !in_flight.lock().insert(user_id.to_string()) {
            return None;
        }
        Some(Self { in_flight: in_flight.clone(), user_id: user_id.to_string() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.user_id);
    }
}

pub async fn list_models(State(state): State<AppState>) -> Json<OptionList> {
    Json(state.orchestrator.catalog().model_listing())
}

pub async fn list_backgrounds(State(state): State<AppState>) -> Json<OptionList> {
    Json(state.orchestrator.catalog().background_listing())
}

pub async fn generate_photoshoot(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    if body.user_id.trim().is_empty() {
        return Err(GenerationError::Precondition("user_id is required".into()).into());
    }
    let _guard = InFlightGuard::acquire(&state.in_flight, &body.user_id).ok_or_else(|| {
        tracing::warn!(user = %body.user_id, "Rejected generation while another is in progress");
        ApiError::Busy
    })?;

    tracing::info!("🚀 Generating photoshoot for user: {}", body.user_id);

    let generation = state.orchestrator.generate_by_ids(
        &body.user_image,
        &body.model_id,
        &body.background_id,
        body.product_details.as_ref(),
    );
    let image = tokio::time::timeout(state.generation_timeout, generation)
        .await
        .map_err(|_| {
            GenerationError::Transport(format!("generation timed out after {}s", state.generation_timeout.as_secs_f32()))
        })??;

    let record = if state.persist_results {
        Some(state.history.save(&body.user_id, &image)?)
    } else {
        None
    };

    let response = GenerateResponse {
        mime_type: image.mime_type,
        image_base64: image.data,
        record,
    };
    state.latest.write().insert(body.user_id.clone(), response.clone());
    tracing::info!("✅ Photoshoot ready for user: {}", body.user_id);
    Ok(Json(response))
}

pub async fn get_history(Path(user_id): Path<String>, State(state): State<AppState>) -> Json<Vec<GenerationRecord>> {
    Json(state.history.list_for_user(&user_id))
}

pub async fn get_latest(Path(user_id): Path<String>, State(state): State<AppState>) -> Result<Json<GenerateResponse>, ApiError> {
    state.latest.read().get(&user_id).cloned().map(Json).ok_or(ApiError::NotFound)
}

pub async fn get_stored_image(Path(path): Path<String>, State(state): State<AppState>) -> Response {
    let Some(object) = state.history.object(&path) else {
        return ApiError::NotFound.into_response();
    };
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&object.mime_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    (StatusCode::OK, headers, object.bytes).into_response()
}
