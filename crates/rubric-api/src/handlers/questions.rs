use crate::error::ApiError;
use crate::ApiState;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use rubric_core::corpus::Corpus;
use rubric_core::model::{BaselineQuestion, ModelResponse, QuestionPatch};
use rubric_core::projection::{project, ResultRow, RowFilter};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub search: Option<String>,
    pub difficulty: Option<String>,
    pub state: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
}

/// Filterable projection rows for the dashboard table. An unknown
/// agent degrades to an empty list rather than a hard failure.
pub async fn baseline_results(
    State(state): State<ApiState>,
    Path(agent_type): Path<String>,
    Query(params): Query<FilterParams>,
) -> Result<Json<Vec<ResultRow>>, ApiError> {
    let questions = state.store.list_questions(&agent_type, false)?;
    if questions.is_empty() {
        tracing::warn!(%agent_type, "no baseline questions for agent");
    }
    let responses = state.store.list_responses_for_agent(&agent_type)?;
    let rows = project(&questions, &responses, &state.policy());

    let filter = RowFilter::new(
        params.search,
        params.difficulty,
        params.state,
        params.model,
        params.category,
    );
    Ok(Json(filter.apply(rows)))
}

pub async fn get_corpus(
    State(state): State<ApiState>,
    Path(agent_type): Path<String>,
) -> Result<Json<Corpus>, ApiError> {
    Ok(Json(state.store.export_corpus(&agent_type)?))
}

/// Full corpus replace. The raw body is parsed before anything is
/// written; malformed JSON is a 400 and the stored corpus is unchanged.
pub async fn replace_corpus(
    State(state): State<ApiState>,
    Path(agent_type): Path<String>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let corpus = Corpus::from_json_str(&body, &agent_type)?;
    corpus.validate(&agent_type)?;
    let replaced = state.store.replace_corpus(&corpus)?;
    Ok(Json(json!({
        "agent_type": agent_type,
        "questions": replaced,
        "fingerprint": corpus.fingerprint()?,
    })))
}

pub async fn update_question(
    State(state): State<ApiState>,
    Path((agent_type, id)): Path<(String, i64)>,
    Json(patch): Json<QuestionPatch>,
) -> Result<Json<BaselineQuestion>, ApiError> {
    let question = state.store.update_question_fields(&agent_type, id, &patch)?;
    Ok(Json(question))
}

/// One run-executor invocation outside any run record.
pub async fn test_question(
    State(state): State<ApiState>,
    Path((agent_type, id, model)): Path<(String, i64, String)>,
) -> Result<Json<ModelResponse>, ApiError> {
    let response = state.runner().test_question(&agent_type, id, &model).await?;
    Ok(Json(response))
}
