use crate::error::{Error, Result};
use crate::model::{AiGrade, HumanGrade};
use crate::projection::ResultRow;
use crate::storage::store::Store;
use serde::{Deserialize, Serialize};

/// Configuration constants for grade reconciliation. These are policy,
/// not business logic: thresholds come from the service config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradingPolicy {
    pub max_score: f64,
    /// Agreement below this flags the response for review.
    pub review_threshold: f64,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            max_score: 100.0,
            review_threshold: 0.7,
        }
    }
}

/// Pure agreement function: 1.0 when the two signals coincide, 0.0 at
/// maximal divergence.
pub fn grading_agreement(ai: f64, human: f64, max_score: f64) -> f64 {
    1.0 - (ai - human).abs() / max_score
}

/// Out-of-range scores are rejected, never clamped.
pub fn validate_grade(grade: f64, max_score: f64) -> Result<()> {
    if !grade.is_finite() || grade < 0.0 || grade > max_score {
        return Err(Error::validation(
            "grade",
            format!("grade {} out of range 0..={}", grade, max_score),
        ));
    }
    Ok(())
}

/// What happens to a displaced AI grade on re-grading. Product intent
/// is still open, so both paths are real and separately tested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeMode {
    #[default]
    Overwrite,
    /// Journal the displaced grade into grade_history before replacing.
    Append,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HumanGradeInput {
    pub grade: f64,
    pub graded_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub improved_response: Option<String>,
}

/// Grading aggregator: the single writer for both grading signals.
#[derive(Clone)]
pub struct GradeBook {
    store: Store,
    policy: GradingPolicy,
}

impl GradeBook {
    pub fn new(store: Store, policy: GradingPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &GradingPolicy {
        &self.policy
    }

    /// Replace the AI grade of a response. Idempotent per mode: the
    /// prior grade is either discarded (`Overwrite`) or journaled
    /// (`Append`). A pending response becomes successful once graded;
    /// the human overlay is never touched.
    pub fn record_ai_grade(
        &self,
        response_id: i64,
        grade: f64,
        confidence: f64,
        reasoning: &str,
        mode: GradeMode,
    ) -> Result<crate::model::ModelResponse> {
        validate_grade(grade, self.policy.max_score)?;
        let response = self.store.get_response(response_id)?;

        let displaced = match (mode, response.grading.ai()) {
            (GradeMode::Append, Some(prior)) => Some((
                "ai",
                prior.grade,
                serde_json::to_value(prior)?,
            )),
            _ => None,
        };

        let ai = AiGrade {
            grade,
            confidence,
            reasoning: reasoning.to_string(),
            graded_at: chrono::Utc::now().to_rfc3339(),
        };
        let grading = response.grading.clone().with_ai(ai);
        let new_status = match response.status {
            crate::model::ResponseStatus::Pending => Some(crate::model::ResponseStatus::Success),
            _ => None,
        };
        self.store
            .update_grading(response_id, None, &grading, new_status, displaced)
    }

    /// Replace the entire human overlay as one transaction. When
    /// `expected_version` is given, a concurrent write in between is
    /// rejected as stale instead of silently winning.
    pub fn record_human_grade(
        &self,
        response_id: i64,
        input: HumanGradeInput,
        expected_version: Option<i64>,
    ) -> Result<crate::model::ModelResponse> {
        validate_grade(input.grade, self.policy.max_score)?;
        if input.graded_by.trim().is_empty() {
            return Err(Error::validation("graded_by", "grader identity is required"));
        }
        let response = self.store.get_response(response_id)?;
        let human = HumanGrade {
            grade: input.grade,
            graded_by: input.graded_by,
            notes: input.notes,
            improved_response: input.improved_response,
            graded_at: chrono::Utc::now().to_rfc3339(),
        };
        let grading = response.grading.clone().with_human(human);
        self.store
            .update_grading(response_id, expected_version, &grading, None, None)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub total_cost: f64,
    pub avg_response_time_ms: f64,
    pub avg_grade: f64,
    pub test_count: u32,
}

/// Aggregate per-model metrics over projection rows.
///
/// Placeholder rows and responses with neither cost nor timing are
/// excluded; an empty qualifying set yields all zeros, never NaN.
pub fn compute_model_metrics(rows: &[ResultRow], model: &str) -> ModelMetrics {
    let qualifying: Vec<&ResultRow> = rows
        .iter()
        .filter(|r| r.model == model)
        .filter(|r| !r.is_placeholder())
        .filter(|r| r.response.cost.unwrap_or(0.0) > 0.0 || r.response.response_time_ms.is_some())
        .collect();

    if qualifying.is_empty() {
        return ModelMetrics::default();
    }

    let total_cost: f64 = qualifying
        .iter()
        .filter_map(|r| r.response.cost)
        .sum();

    let timings: Vec<f64> = qualifying
        .iter()
        .filter_map(|r| r.response.response_time_ms)
        .map(|ms| ms as f64)
        .collect();
    let avg_response_time_ms = if timings.is_empty() {
        0.0
    } else {
        timings.iter().sum::<f64>() / timings.len() as f64
    };

    let grades: Vec<f64> = qualifying
        .iter()
        .filter_map(|r| r.response.effective_grade)
        .collect();
    let avg_grade = if grades.is_empty() {
        0.0
    } else {
        grades.iter().sum::<f64>() / grades.len() as f64
    };

    ModelMetrics {
        total_cost,
        avg_response_time_ms,
        avg_grade,
        test_count: qualifying.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_is_a_pure_function_of_its_inputs() {
        assert_eq!(grading_agreement(90.0, 90.0, 100.0), 1.0);
        assert_eq!(grading_agreement(40.0, 85.0, 100.0), 0.55);
        assert_eq!(grading_agreement(85.0, 40.0, 100.0), 0.55);
        assert_eq!(grading_agreement(0.0, 100.0, 100.0), 0.0);
    }

    #[test]
    fn out_of_range_grades_are_rejected_not_clamped() {
        assert!(validate_grade(0.0, 100.0).is_ok());
        assert!(validate_grade(100.0, 100.0).is_ok());
        assert!(validate_grade(-0.1, 100.0).is_err());
        assert!(validate_grade(100.1, 100.0).is_err());
        assert!(validate_grade(f64::NAN, 100.0).is_err());
    }

    #[test]
    fn divergent_grades_fall_below_the_review_threshold() {
        let policy = GradingPolicy::default();
        let agreement = grading_agreement(40.0, 85.0, policy.max_score);
        assert!(agreement < policy.review_threshold);

        let agreement = grading_agreement(80.0, 85.0, policy.max_score);
        assert!(agreement >= policy.review_threshold);
    }

    #[test]
    fn metrics_over_empty_set_are_all_zero() {
        let metrics = compute_model_metrics(&[], "gpt-4o");
        assert_eq!(metrics, ModelMetrics::default());
    }
}
