use crate::error::ApiError;
use crate::ApiState;
use axum::extract::{Path, State};
use axum::response::Json;
use rubric_core::grading::{GradeMode, HumanGradeInput};
use rubric_core::model::ModelResponse;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct HumanGradePatch {
    pub grade: f64,
    pub graded_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub improved_response: Option<String>,
    /// Version the grader read; a concurrent write in between turns
    /// this into a 409 instead of a silent overwrite.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Human-grade overlay write: the whole overlay is replaced in one
/// transaction.
pub async fn patch_result(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(patch): Json<HumanGradePatch>,
) -> Result<Json<ModelResponse>, ApiError> {
    let response = state.gradebook().record_human_grade(
        id,
        HumanGradeInput {
            grade: patch.grade,
            graded_by: patch.graded_by,
            notes: patch.notes,
            improved_response: patch.improved_response,
        },
        patch.expected_version,
    )?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct AiGradeRequest {
    pub response_id: i64,
    #[serde(default)]
    pub mode: Option<GradeMode>,
}

pub async fn ai_grade(
    State(state): State<ApiState>,
    Json(req): Json<AiGradeRequest>,
) -> Result<Json<ModelResponse>, ApiError> {
    let response = state
        .grader
        .grade_response(req.response_id, req.mode.unwrap_or_default())
        .await?;
    Ok(Json(response))
}
