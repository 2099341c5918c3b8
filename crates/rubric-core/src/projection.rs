use crate::grading::GradingPolicy;
use crate::model::{
    BaselineQuestion, Difficulty, GradingState, ModelResponse, ResponseStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Synthetic model label for questions with no recorded response.
pub const NO_RUN_MODEL: &str = "No test run";

const NO_RUN_ANSWER: &str =
    "No test has been run for this question yet. Start a test run or trigger a single-question test to populate this row.";

/// One display row: a question denormalized against one response (or
/// the synthetic placeholder). Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub question_id: i64,
    pub question: String,
    pub expected_answer: String,
    pub category: String,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub model: String,
    pub response: ResponseView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseView {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
    pub answer: String,
    pub confidence: f64,
    pub status: ResponseStatus,
    pub grading: GradingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_grade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading_agreement: Option<f64>,
    pub requires_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl ResultRow {
    pub fn is_placeholder(&self) -> bool {
        self.response.id.is_none()
    }

    fn from_response(q: &BaselineQuestion, r: &ModelResponse, policy: &GradingPolicy) -> Self {
        ResultRow {
            question_id: q.id,
            question: q.question.clone(),
            expected_answer: q.expected_answer.clone(),
            category: q.category.clone(),
            difficulty: q.difficulty,
            state: q.state.clone(),
            model: r.model.clone(),
            response: ResponseView {
                id: Some(r.id),
                run_id: r.run_id,
                answer: r.answer.clone(),
                confidence: r.confidence,
                status: r.status,
                grading: r.grading.clone(),
                grade: r.grading.ai().map(|a| a.grade),
                human_grade: r.grading.human().map(|h| h.grade),
                effective_grade: r.effective_grade(),
                grading_agreement: r.grading.agreement(policy.max_score),
                requires_review: r.requires_review(policy),
                response_time_ms: r.response_time_ms,
                cost: r.cost,
                version: Some(r.version),
            },
        }
    }

    fn placeholder(q: &BaselineQuestion) -> Self {
        ResultRow {
            question_id: q.id,
            question: q.question.clone(),
            expected_answer: q.expected_answer.clone(),
            category: q.category.clone(),
            difficulty: q.difficulty,
            state: q.state.clone(),
            model: NO_RUN_MODEL.to_string(),
            response: ResponseView {
                id: None,
                run_id: None,
                answer: NO_RUN_ANSWER.to_string(),
                confidence: 0.0,
                status: ResponseStatus::Pending,
                grading: GradingState::Ungraded,
                grade: None,
                human_grade: None,
                effective_grade: None,
                grading_agreement: None,
                requires_review: false,
                response_time_ms: None,
                cost: None,
                version: None,
            },
        }
    }
}

/// Flatten the nested question/response structure into display rows.
///
/// Every question yields `max(1, responses)` rows: a question without
/// responses gets exactly one synthetic "No test run" row, so the
/// projection of a non-empty question set is never empty and counting
/// logic downstream needs no absent-data special case.
pub fn project(
    questions: &[BaselineQuestion],
    responses: &[ModelResponse],
    policy: &GradingPolicy,
) -> Vec<ResultRow> {
    let mut by_question: BTreeMap<i64, Vec<&ModelResponse>> = BTreeMap::new();
    for r in responses {
        by_question.entry(r.question_id).or_default().push(r);
    }

    let mut rows = Vec::new();
    for q in questions {
        match by_question.get(&q.id) {
            Some(rs) if !rs.is_empty() => {
                for r in rs {
                    rows.push(ResultRow::from_response(q, r, policy));
                }
            }
            _ => rows.push(ResultRow::placeholder(q)),
        }
    }
    rows
}

/// Conjunctive filter over projection rows; every set dimension must
/// match, and an unset dimension (or the literal "all") is a wildcard.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub search: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub state: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
}

impl RowFilter {
    pub fn new(
        search: Option<String>,
        difficulty: Option<String>,
        state: Option<String>,
        model: Option<String>,
        category: Option<String>,
    ) -> Self {
        Self {
            search: wildcard(search).filter(|s| !s.trim().is_empty()),
            difficulty: wildcard(difficulty).and_then(|d| Difficulty::parse(&d)),
            state: wildcard(state),
            model: wildcard(model),
            category: wildcard(category),
        }
    }

    pub fn matches(&self, row: &ResultRow) -> bool {
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let hit = row.question.to_lowercase().contains(&needle)
                || row.expected_answer.to_lowercase().contains(&needle)
                || row.response.answer.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        if let Some(difficulty) = self.difficulty {
            if row.difficulty != difficulty {
                return false;
            }
        }
        if let Some(state) = &self.state {
            if row.state.as_deref() != Some(state.as_str()) {
                return false;
            }
        }
        if let Some(model) = &self.model {
            if &row.model != model {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &row.category != category {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, rows: Vec<ResultRow>) -> Vec<ResultRow> {
        rows.into_iter().filter(|r| self.matches(r)).collect()
    }
}

fn wildcard(v: Option<String>) -> Option<String> {
    v.filter(|s| s != "all")
}
