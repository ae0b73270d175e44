use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::pipeline::{AnalyzeError, Pipeline};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_args(&opts.table, &opts.oracle)?;
    match pipeline.source().load() {
        Ok(table) => tracing::info!(
            path = %pipeline.source().path().display(),
            rows = table.len(),
            "reference table ready"
        ),
        Err(err) => tracing::warn!(
            error = %err,
            "reference table unavailable; analyze will fail until it is fixed"
        ),
    }

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analyze", post(api_analyze))
        .route("/api/stats", get(api_stats))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    scenario: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

async fn api_analyze(
    State(st): State<AppState>,
    req: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let scenario = match req {
        Ok(Json(req)) => req.scenario.unwrap_or_default(),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable analyze body");
            String::new()
        }
    };
    match st.pipeline.analyze(&scenario).await {
        Ok(analysis) => Json(analysis).into_response(),
        Err(err @ AnalyzeError::EmptyScenario) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            tracing::warn!(error = %err, "analysis failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    table_path: String,
    table_rows: Option<usize>,
    suggest_model: String,
    validate_model: String,
}

async fn api_stats(State(st): State<AppState>) -> impl IntoResponse {
    let source = st.pipeline.source();
    Json(StatsResponse {
        table_path: source.path().display().to_string(),
        table_rows: source.load().ok().map(|t| t.len()),
        suggest_model: st.pipeline.suggest_settings().model.clone(),
        validate_model: st.pipeline.validate_settings().model.clone(),
    })
}
