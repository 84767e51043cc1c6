use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::model::{ForestModel, PredictionInput};
use crate::telemetry::{StatsSnapshot, TelemetryStore};

#[derive(Clone)]
pub struct ApiState {
    pub model: Option<Arc<ForestModel>>,
    pub template: Arc<String>,
    pub telemetry: Arc<TelemetryStore>,
}

#[derive(Debug, Deserialize)]
pub struct PredictForm {
    storage_temperature: Option<String>,
    storage_duration: Option<String>,
    texture: Option<String>,
    microbial_load: Option<String>,
    weight_loss: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    model_loaded: bool,
    stats: StatsSnapshot,
}

#[derive(Debug, Error)]
enum PredictError {
    #[error("Invalid input: {0}. Please ensure all fields are filled correctly.")]
    InvalidInput(String),
    #[error("Error: Model not loaded.")]
    ModelUnavailable,
    #[error("An error occurred during prediction: {0}")]
    Prediction(String),
}

impl PredictError {
    fn status(&self) -> StatusCode {
        match self {
            PredictError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PredictError::ModelUnavailable | PredictError::Prediction(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub async fn serve(
    addr: String,
    cors_origin: String,
    state: ApiState,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state, &cors_origin);

    let addr: SocketAddr = addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: ApiState, cors_origin: &str) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/predict", post(predict))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors_layer(cors_origin))
}

async fn index(State(state): State<ApiState>) -> Html<String> {
    Html(state.template.as_ref().clone())
}

async fn predict(
    State(state): State<ApiState>,
    Form(form): Form<PredictForm>,
) -> (StatusCode, String) {
    state.telemetry.record_request().await;

    match run_prediction(&state, form) {
        Ok(prediction) => {
            state.telemetry.record_prediction().await;
            (
                StatusCode::OK,
                format!("Predicted Shelf Life: {:.2} days", prediction),
            )
        }
        Err(error) => {
            if error.status() == StatusCode::BAD_REQUEST {
                state.telemetry.record_rejected_input().await;
            } else {
                state.telemetry.record_failed_prediction().await;
            }
            (error.status(), error.to_string())
        }
    }
}

async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let model_loaded = state.model.is_some();
    let status = if model_loaded { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        model_loaded,
        stats: state.telemetry.snapshot_stats().await,
    })
}

fn run_prediction(state: &ApiState, form: PredictForm) -> Result<f64, PredictError> {
    let model = state.model.as_ref().ok_or(PredictError::ModelUnavailable)?;

    let input = PredictionInput {
        storage_temperature: strict_float("storage_temperature", form.storage_temperature)?,
        storage_duration: strict_int("storage_duration", form.storage_duration)?,
        texture: lenient_float("texture", form.texture)?,
        microbial_load: lenient_float("microbial_load", form.microbial_load)?,
        weight_loss: strict_float("weight_loss", form.weight_loss)?,
    };

    model
        .predict(&input)
        .map_err(|error| PredictError::Prediction(error.to_string()))
}

fn strict_float(name: &str, value: Option<String>) -> Result<f64, PredictError> {
    let raw = required(name, value)?;
    raw.trim().parse::<f64>().map_err(|_| {
        PredictError::InvalidInput(format!("could not convert '{}' to a number for {}", raw, name))
    })
}

fn strict_int(name: &str, value: Option<String>) -> Result<i64, PredictError> {
    let raw = required(name, value)?;
    raw.trim().parse::<i64>().map_err(|_| {
        PredictError::InvalidInput(format!(
            "could not convert '{}' to an integer for {}",
            raw, name
        ))
    })
}

fn lenient_float(name: &str, value: Option<String>) -> Result<f64, PredictError> {
    let raw = required(name, value)?;
    match raw.trim().parse::<f64>() {
        Ok(parsed) => Ok(parsed),
        Err(_) => {
            warn!("could not convert {} '{}' to a number, using 0.0", name, raw);
            Ok(0.0)
        }
    }
}

fn required(name: &str, value: Option<String>) -> Result<String, PredictError> {
    value.ok_or_else(|| PredictError::InvalidInput(format!("missing field {}", name)))
}

fn cors_layer(allowed: &str) -> CorsLayer {
    let mut cors = if allowed.trim() == "*" {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = allowed
            .split(',')
            .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    cors = cors.allow_methods([Method::GET, Method::POST]);
    cors.allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}
