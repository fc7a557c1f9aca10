use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::bayes::CityScore;
use crate::engine::{CitySummary, Classification, Engine, SnapshotInfo};
use crate::error::InputError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/rank", post(rank))
        .route("/classify", post(classify))
        .route("/cities", get(list_cities))
        .route("/cities/{name}", get(city_summary))
        .route("/cities/{name}/features", get(city_features))
        .route("/cities/{name}/explain", get(city_explain))
        .route("/debug/snapshot", get(debug_snapshot))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Input errors as JSON: 404 for an unknown city (with the closest
/// configured name when there is one), 400 for everything else.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    error: &'static str,
    reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl ApiError {
    fn from_input(engine: &Engine, err: InputError) -> Self {
        let (status, suggestion) = match &err {
            InputError::UnknownCity(name) => (
                StatusCode::NOT_FOUND,
                engine.cities().suggest(name).map(str::to_string),
            ),
            _ => (StatusCode::BAD_REQUEST, None),
        };
        warn!(target: "api", kind = err.kind(), status = status.as_u16(), "request rejected");
        Self {
            status,
            body: ErrorBody {
                error: err.kind(),
                reason: err.to_string(),
                suggestion,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn respond<T>(engine: &Engine, r: Result<T, InputError>) -> ApiResult<T> {
    r.map(Json).map_err(|e| ApiError::from_input(engine, e))
}

#[derive(serde::Deserialize)]
struct TextReq {
    text: String,
}

async fn rank(
    State(state): State<AppState>,
    Json(body): Json<TextReq>,
) -> ApiResult<Vec<CityScore>> {
    respond(&state.engine, state.engine.rank_cities(&body.text))
}

async fn classify(
    State(state): State<AppState>,
    Json(body): Json<TextReq>,
) -> ApiResult<Classification> {
    respond(&state.engine, state.engine.classify(&body.text))
}

#[derive(serde::Serialize)]
struct CityOut {
    name: String,
    latitude: f64,
    longitude: f64,
}

async fn list_cities(State(state): State<AppState>) -> Json<Vec<CityOut>> {
    let out = state
        .engine
        .cities()
        .iter()
        .map(|c| CityOut {
            name: c.name.clone(),
            latitude: c.latitude,
            longitude: c.longitude,
        })
        .collect();
    Json(out)
}

async fn city_summary(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<CitySummary> {
    respond(&state.engine, state.engine.city_summary(&name))
}

#[derive(Debug, serde::Serialize)]
struct WordsOut {
    city: String,
    words: Vec<String>,
}

async fn city_features(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<WordsOut> {
    let engine = &state.engine;
    let r = engine.rank_features(&name).and_then(|words| {
        let city = engine.cities().require(&name)?.name.clone();
        Ok(WordsOut { city, words })
    });
    respond(engine, r)
}

#[derive(serde::Deserialize)]
struct ExplainQuery {
    #[serde(default)]
    text: String,
}

async fn city_explain(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<ExplainQuery>,
) -> ApiResult<WordsOut> {
    let engine = &state.engine;
    let r = engine.top_words_in_text(&name, &q.text).and_then(|words| {
        let city = engine.cities().require(&name)?.name.clone();
        Ok(WordsOut { city, words })
    });
    respond(engine, r)
}

async fn debug_snapshot(State(state): State<AppState>) -> Json<SnapshotInfo> {
    Json(state.engine.snapshot_info())
}
