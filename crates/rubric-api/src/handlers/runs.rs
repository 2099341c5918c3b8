use crate::error::ApiError;
use crate::ApiState;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use rubric_core::model::{BaselineTestRun, ModelResponse, RunConfig};
use serde::Deserialize;

pub async fn create_run(
    State(state): State<ApiState>,
    Json(config): Json<RunConfig>,
) -> Result<Json<BaselineTestRun>, ApiError> {
    let run_id = state.store.create_run(&config)?;
    tracing::info!(run_id, agent_type = %config.agent_type, model = %config.model, "run created");
    Ok(Json(state.store.get_run(run_id)?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RunListParams {
    pub agent_type: Option<String>,
}

pub async fn list_runs(
    State(state): State<ApiState>,
    Query(params): Query<RunListParams>,
) -> Result<Json<Vec<BaselineTestRun>>, ApiError> {
    Ok(Json(state.store.list_runs(params.agent_type.as_deref())?))
}

/// Transition `pending -> running` synchronously (so a non-pending run
/// is a 409 before the caller sees success), then execute the run in a
/// background task; the client polls for completion.
pub async fn start_run(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<BaselineTestRun>, ApiError> {
    state.store.start_run(id)?;
    // snapshot before spawning so the response always shows `running`
    let run = state.store.get_run(id)?;

    let runner = state.runner();
    tokio::spawn(async move {
        if let Err(e) = runner.run_started(id).await {
            tracing::error!(run_id = id, error = %e, "run execution failed");
        }
    });

    Ok(Json(run))
}

pub async fn run_results(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ModelResponse>>, ApiError> {
    // 404 for an unknown run, empty list for a run with no responses yet
    state.store.get_run(id)?;
    Ok(Json(state.store.list_responses_for_run(id)?))
}
