use crate::config::{GraderConfig, TrackerConfig};
use crate::error::{Error, Result};
use crate::grading::{GradeBook, GradeMode, GradingPolicy};
use crate::model::{AiGrade, BaselineQuestion, ModelResponse, ResponseStatus};
use crate::providers::llm::{fake::FakeClient, openai::OpenAiClient, ModelClient};
use crate::storage::store::Store;
use std::sync::Arc;

/// Scores an answer against the expected baseline answer and records
/// the result as the AI grading signal.
#[derive(Clone)]
pub struct GraderService {
    config: GraderConfig,
    store: Store,
    client: Option<Arc<dyn ModelClient>>,
    policy: GradingPolicy,
}

impl GraderService {
    pub fn new(
        config: GraderConfig,
        store: Store,
        client: Option<Arc<dyn ModelClient>>,
        policy: GradingPolicy,
    ) -> Self {
        Self {
            config,
            store,
            client,
            policy,
        }
    }

    pub fn from_config(cfg: &TrackerConfig, store: Store) -> Result<Self> {
        let grader = &cfg.grader;
        let client: Option<Arc<dyn ModelClient>> = match grader.provider.as_str() {
            "heuristic" => None,
            "fake" => Some(Arc::new(FakeClient::canned(
                grader.model.clone().unwrap_or_else(|| "fake-grader".into()),
                r#"{"grade": 85.0, "confidence": 90.0, "reasoning": "fake verdict"}"#,
            ))),
            "openai" => {
                let model = grader
                    .model
                    .clone()
                    .ok_or_else(|| Error::Config("grader.model required for openai".into()))?;
                Some(Arc::new(OpenAiClient::from_env(
                    model,
                    grader.temperature,
                    grader.max_tokens,
                )?))
            }
            other => {
                return Err(Error::Config(format!("unknown grader provider '{}'", other)));
            }
        };
        Ok(Self::new(grader.clone(), store, client, cfg.policy()))
    }

    pub fn policy(&self) -> GradingPolicy {
        self.policy
    }

    /// Produce an AI grade for one answer. The heuristic provider is
    /// deterministic and offline; LLM providers sample `samples` times
    /// and average, behind an md5-keyed cache.
    pub async fn grade(&self, question: &BaselineQuestion, answer: &str) -> Result<AiGrade> {
        if self.config.provider == "heuristic" {
            return Ok(heuristic_grade(
                &question.expected_answer,
                answer,
                self.policy.max_score,
            ));
        }

        let client = self.client.as_ref().ok_or_else(|| {
            Error::Config("grader enabled but no client configured".into())
        })?;

        let key = self.cache_key(question, answer);
        if !self.config.refresh {
            if let Some(payload) = self.store.grader_cache_get(&key)? {
                if let Ok(grade) = serde_json::from_value::<AiGrade>(payload) {
                    return Ok(grade);
                }
            }
        }

        let prompt = rubric_prompt(question, answer, self.policy.max_score);
        let samples = self.config.samples.max(1);
        let mut verdicts = Vec::new();
        for _ in 0..samples {
            let output = client.complete(&prompt, None).await?;
            if let Some(v) = parse_verdict(&output.text, self.policy.max_score) {
                verdicts.push(v);
            }
        }
        if verdicts.is_empty() {
            return Err(Error::Provider(
                "grader returned no parseable verdict".into(),
            ));
        }

        let n = verdicts.len() as f64;
        let grade = AiGrade {
            grade: verdicts.iter().map(|v| v.grade).sum::<f64>() / n,
            confidence: verdicts.iter().map(|v| v.confidence).sum::<f64>() / n,
            reasoning: verdicts
                .first()
                .map(|v| v.reasoning.clone())
                .unwrap_or_default(),
            graded_at: chrono::Utc::now().to_rfc3339(),
        };

        self.store.grader_cache_put(
            &key,
            &self.config.provider,
            client.model_name(),
            &serde_json::to_value(&grade)?,
        )?;

        Ok(grade)
    }

    /// Grade a stored response and record the result. A grader failure
    /// flips the response to `error` without touching prior grade
    /// fields; the flagged-for-review signal falls out of the status.
    pub async fn grade_response(
        &self,
        response_id: i64,
        mode: GradeMode,
    ) -> Result<ModelResponse> {
        let response = self.store.get_response(response_id)?;
        let question = self
            .store
            .get_question(&response.agent_type, response.question_id)?;

        match self.grade(&question, &response.answer).await {
            Ok(ai) => {
                let book = GradeBook::new(self.store.clone(), self.policy);
                book.record_ai_grade(response_id, ai.grade, ai.confidence, &ai.reasoning, mode)
            }
            Err(e) => {
                tracing::warn!(response_id, error = %e, "AI grading failed");
                self.store
                    .set_response_status(response_id, ResponseStatus::Error)?;
                self.store.get_response(response_id)
            }
        }
    }

    fn cache_key(&self, question: &BaselineQuestion, answer: &str) -> String {
        let input = format!(
            "{}\n{}\n{}",
            question.question, question.expected_answer, answer
        );
        let input_hash = format!("{:x}", md5::compute(&input));
        let raw = format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.config.provider,
            self.config.model.as_deref().unwrap_or(""),
            self.config.temperature,
            self.config.max_tokens,
            self.config.samples,
            self.policy.max_score,
            input_hash
        );
        format!("{:x}", md5::compute(raw))
    }
}

/// Deterministic lexical grade: normalized Levenshtein similarity of
/// the answer to the expected answer, scaled to the score range.
pub fn heuristic_grade(expected: &str, answer: &str, max_score: f64) -> AiGrade {
    let similarity = strsim::normalized_levenshtein(
        expected.trim().to_lowercase().as_str(),
        answer.trim().to_lowercase().as_str(),
    );
    AiGrade {
        grade: similarity * max_score,
        // exact computation, so confidence is nominal
        confidence: 100.0,
        reasoning: format!("lexical similarity {:.2} to expected answer", similarity),
        graded_at: chrono::Utc::now().to_rfc3339(),
    }
}

struct Verdict {
    grade: f64,
    confidence: f64,
    reasoning: String,
}

fn rubric_prompt(question: &BaselineQuestion, answer: &str, max_score: f64) -> String {
    format!(
        "You are grading a model answer against an expected baseline answer.\n\
         Question: {}\n\
         Expected answer: {}\n\
         Model answer: {}\n\
         Respond with only a JSON object: {{\"grade\": <0-{max}>, \"confidence\": <0-100>, \"reasoning\": \"<one sentence>\"}}.\n\
         Grade on factual agreement with the expected answer.",
        question.question,
        question.expected_answer,
        answer,
        max = max_score
    )
}

/// Lenient extraction: take the outermost JSON object in the raw
/// completion. Samples with no object or an out-of-range grade are
/// discarded rather than clamped.
fn parse_verdict(text: &str, max_score: f64) -> Option<Verdict> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let grade = value.get("grade").and_then(|v| v.as_f64())?;
    if !grade.is_finite() || grade < 0.0 || grade > max_score {
        return None;
    }
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    Some(Verdict {
        grade,
        confidence,
        reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Difficulty;

    fn question() -> BaselineQuestion {
        BaselineQuestion {
            id: 1,
            question: "What temperature range is used for ethanol winterization?".into(),
            expected_answer: "Between -20C and -40C for 12 to 24 hours.".into(),
            category: "extraction".into(),
            difficulty: Difficulty::Basic,
            state: None,
            tags: vec![],
            archived: false,
            last_updated: String::new(),
        }
    }

    #[test]
    fn heuristic_grade_is_deterministic_and_in_range() {
        let q = question();
        let a = heuristic_grade(&q.expected_answer, "Between -20C and -40C for 12 to 24 hours.", 100.0);
        assert!((a.grade - 100.0).abs() < 1e-9);

        let b = heuristic_grade(&q.expected_answer, "I have no idea.", 100.0);
        assert!(b.grade < a.grade);
        assert!(b.grade >= 0.0);

        let c = heuristic_grade(&q.expected_answer, "I have no idea.", 100.0);
        assert_eq!(b.grade, c.grade);
    }

    #[test]
    fn verdict_parsing_is_lenient_but_range_checked() {
        let v = parse_verdict(
            "Sure! Here is my verdict: {\"grade\": 72.5, \"confidence\": 88, \"reasoning\": \"mostly right\"} hope that helps",
            100.0,
        )
        .unwrap();
        assert_eq!(v.grade, 72.5);
        assert_eq!(v.confidence, 88.0);
        assert_eq!(v.reasoning, "mostly right");

        assert!(parse_verdict("no json here", 100.0).is_none());
        assert!(parse_verdict("{\"grade\": 140.0}", 100.0).is_none());
        assert!(parse_verdict("{\"confidence\": 10}", 100.0).is_none());
    }
}
