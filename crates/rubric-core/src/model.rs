use serde::{Deserialize, Serialize};

use crate::grading::GradingPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(Difficulty::Basic),
            "intermediate" => Some(Difficulty::Intermediate),
            "advanced" => Some(Difficulty::Advanced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Basic => "basic",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

/// A benchmark prompt with a known expected answer. Identity is
/// `(agent_type, id)`; edits bump `last_updated` and never reuse ids.
/// Questions are archived, never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineQuestion {
    pub id: i64,
    pub question: String,
    pub expected_answer: String,
    pub category: String,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub last_updated: String,
}

/// Partial update for the editor layer. Absent fields are untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl QuestionPatch {
    pub fn is_empty(&self) -> bool {
        self.question.is_none()
            && self.expected_answer.is_none()
            && self.category.is_none()
            && self.difficulty.is_none()
            && self.state.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiGrade {
    pub grade: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub graded_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanGrade {
    pub grade: f64,
    pub graded_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_response: Option<String>,
    pub graded_at: String,
}

/// Grading progress as a tagged union rather than a bag of optional
/// fields, so "has this been reviewed" is a type-level fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GradingState {
    Ungraded,
    AiGraded {
        ai: AiGrade,
    },
    HumanReviewed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ai: Option<AiGrade>,
        human: HumanGrade,
    },
}

impl Default for GradingState {
    fn default() -> Self {
        GradingState::Ungraded
    }
}

impl GradingState {
    pub fn ai(&self) -> Option<&AiGrade> {
        match self {
            GradingState::Ungraded => None,
            GradingState::AiGraded { ai } => Some(ai),
            GradingState::HumanReviewed { ai, .. } => ai.as_ref(),
        }
    }

    pub fn human(&self) -> Option<&HumanGrade> {
        match self {
            GradingState::HumanReviewed { human, .. } => Some(human),
            _ => None,
        }
    }

    /// Derived distance between the two grading signals, present only
    /// when both exist. Never stored, so it cannot go stale.
    pub fn agreement(&self, max_score: f64) -> Option<f64> {
        if max_score <= 0.0 {
            return None;
        }
        let ai = self.ai()?;
        let human = self.human()?;
        Some(crate::grading::grading_agreement(
            ai.grade,
            human.grade,
            max_score,
        ))
    }

    /// Replace the AI portion, preserving any human overlay.
    pub fn with_ai(self, ai: AiGrade) -> Self {
        match self {
            GradingState::Ungraded | GradingState::AiGraded { .. } => {
                GradingState::AiGraded { ai }
            }
            GradingState::HumanReviewed { human, .. } => GradingState::HumanReviewed {
                ai: Some(ai),
                human,
            },
        }
    }

    /// Replace the human overlay entirely, preserving the AI grade.
    pub fn with_human(self, human: HumanGrade) -> Self {
        let ai = match self {
            GradingState::Ungraded => None,
            GradingState::AiGraded { ai } => Some(ai),
            GradingState::HumanReviewed { ai, .. } => ai,
        };
        GradingState::HumanReviewed { ai, human }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Pending,
    Error,
}

impl ResponseStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => ResponseStatus::Success,
            "pending" => ResponseStatus::Pending,
            _ => ResponseStatus::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => "success",
            ResponseStatus::Pending => "pending",
            ResponseStatus::Error => "error",
        }
    }
}

/// One model answer for one question under one run configuration.
///
/// `version` is the optimistic-concurrency token: every grading write
/// increments it, and a writer may assert the version it read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
    pub agent_type: String,
    pub question_id: i64,
    pub model: String,
    pub answer: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    pub status: ResponseStatus,
    pub grading: GradingState,
    pub version: i64,
}

impl ModelResponse {
    /// The single queryable signal: human grade when present, else AI.
    pub fn effective_grade(&self) -> Option<f64> {
        self.grading
            .human()
            .map(|h| h.grade)
            .or_else(|| self.grading.ai().map(|a| a.grade))
    }

    pub fn requires_review(&self, policy: &GradingPolicy) -> bool {
        if self.status == ResponseStatus::Error {
            return true;
        }
        match self.grading.agreement(policy.max_score) {
            Some(agreement) => agreement < policy.review_threshold,
            None => false,
        }
    }
}

/// The tuple a model is evaluated under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub agent_type: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub rag_enabled: bool,
    #[serde(default)]
    pub tools_enabled: bool,
    #[serde(default)]
    pub kb_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => RunStatus::Pending,
            "running" => RunStatus::Running,
            "completed" => RunStatus::Completed,
            _ => RunStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Derived exclusively from the run's own responses, populated at the
/// terminal transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunAggregates {
    pub total_questions: u32,
    pub successful_tests: u32,
    pub failed_tests: u32,
    pub avg_accuracy: f64,
    pub avg_confidence: f64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineTestRun {
    pub id: i64,
    #[serde(flatten)]
    pub config: RunConfig,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregates: Option<RunAggregates>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}
