use crate::error::{Error, Result};
use crate::grader::GraderService;
use crate::grading::{GradeBook, GradeMode};
use crate::model::{
    BaselineQuestion, BaselineTestRun, GradingState, ModelResponse, ResponseStatus, RunAggregates,
    RunConfig, RunStatus,
};
use crate::providers::llm::ModelClient;
use crate::storage::store::{NewResponse, Store};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub parallel: usize,
    pub timeout_seconds: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            parallel: 4,
            timeout_seconds: 30,
        }
    }
}

/// Drives one `BaselineTestRun` through its lifecycle: every active
/// question for the run's agent is answered by the model client under
/// bounded parallelism, each answer is AI-graded, and the run is
/// finalized with aggregates derived from its own responses only.
#[derive(Clone)]
pub struct Runner {
    pub store: Store,
    pub client: Arc<dyn ModelClient>,
    pub grader: GraderService,
    pub settings: RunSettings,
}

impl Runner {
    /// `pending -> running -> {completed, failed}` in one call.
    pub async fn execute_run(&self, run_id: i64) -> Result<BaselineTestRun> {
        self.store.start_run(run_id)?;
        self.run_started(run_id).await
    }

    /// Continue a run that has already transitioned to `running`.
    pub async fn run_started(&self, run_id: i64) -> Result<BaselineTestRun> {
        let run = self.store.get_run(run_id)?;
        if run.status != RunStatus::Running {
            return Err(Error::conflict(format!(
                "run {} is not running (status: {})",
                run_id,
                run.status.as_str()
            )));
        }

        let questions = self.store.list_questions(&run.config.agent_type, false)?;
        tracing::info!(
            run_id,
            agent_type = %run.config.agent_type,
            model = %run.config.model,
            questions = questions.len(),
            "executing run"
        );

        let parallel = self.settings.parallel.max(1);
        let sem = Arc::new(Semaphore::new(parallel));
        let mut handles = Vec::new();

        for q in questions {
            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| Error::Provider(format!("semaphore closed: {e}")))?;
            let this = self.clone();
            let cfg = run.config.clone();
            let h = tokio::spawn(async move {
                let _permit = permit;
                this.eval_question(Some(run_id), &cfg, &q).await
            });
            handles.push(h);
        }

        for h in handles {
            match h.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(run_id, error = %e, "question evaluation failed"),
                Err(e) => tracing::warn!(run_id, error = %e, "evaluation task panicked"),
            }
        }

        let responses = self.store.list_responses_for_run(run_id)?;
        let aggregates = aggregate(&responses);
        // Failed only on total executor outage; partial errors complete
        // with per-response error statuses flagged for review.
        let status = if !responses.is_empty() && aggregates.successful_tests == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self.store.finalize_run(run_id, status, &aggregates)?;
        self.store.get_run(run_id)
    }

    /// The single-question path behind `POST .../test/{model}`.
    pub async fn test_question(
        &self,
        agent_type: &str,
        question_id: i64,
        model: &str,
    ) -> Result<ModelResponse> {
        let question = self.store.get_question(agent_type, question_id)?;
        let cfg = RunConfig {
            agent_type: agent_type.to_string(),
            model: model.to_string(),
            state: None,
            rag_enabled: false,
            tools_enabled: false,
            kb_enabled: false,
            custom_prompt: None,
        };
        self.eval_question(None, &cfg, &question).await
    }

    async fn eval_question(
        &self,
        run_id: Option<i64>,
        cfg: &RunConfig,
        question: &BaselineQuestion,
    ) -> Result<ModelResponse> {
        let context = build_context(cfg);
        let context_ref = if context.is_empty() {
            None
        } else {
            Some(context.as_slice())
        };

        let started = std::time::Instant::now();
        let call = self.client.complete(&question.question, context_ref);
        let outcome = timeout(Duration::from_secs(self.settings.timeout_seconds), call).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return self.record_error(run_id, cfg, question, elapsed_ms, &e.to_string());
            }
            Err(_) => {
                let msg = format!(
                    "provider timed out after {}s",
                    self.settings.timeout_seconds
                );
                return self.record_error(run_id, cfg, question, elapsed_ms, &msg);
            }
        };

        let response = self.store.insert_response(&NewResponse {
            run_id,
            agent_type: cfg.agent_type.clone(),
            question_id: question.id,
            model: cfg.model.clone(),
            answer: output.text.clone(),
            confidence: output.confidence(),
            response_time_ms: Some(elapsed_ms),
            cost: output.cost(),
            status: ResponseStatus::Pending,
            grading: GradingState::Ungraded,
        })?;

        // Grading failure leaves the answer in place with status=error.
        match self.grader.grade(question, &output.text).await {
            Ok(ai) => {
                let book = GradeBook::new(self.store.clone(), self.grader.policy());
                book.record_ai_grade(
                    response.id,
                    ai.grade,
                    ai.confidence,
                    &ai.reasoning,
                    GradeMode::Overwrite,
                )
            }
            Err(e) => {
                tracing::warn!(response_id = response.id, error = %e, "AI grading failed");
                self.store
                    .set_response_status(response.id, ResponseStatus::Error)?;
                self.store.get_response(response.id)
            }
        }
    }

    fn record_error(
        &self,
        run_id: Option<i64>,
        cfg: &RunConfig,
        question: &BaselineQuestion,
        elapsed_ms: u64,
        message: &str,
    ) -> Result<ModelResponse> {
        tracing::warn!(
            question_id = question.id,
            model = %cfg.model,
            error = message,
            "provider call failed"
        );
        self.store.insert_response(&NewResponse {
            run_id,
            agent_type: cfg.agent_type.clone(),
            question_id: question.id,
            model: cfg.model.clone(),
            answer: format!("error: {message}"),
            confidence: 0.0,
            response_time_ms: Some(elapsed_ms),
            cost: None,
            status: ResponseStatus::Error,
            grading: GradingState::Ungraded,
        })
    }
}

/// Fold the run configuration into provider context lines.
pub fn build_context(cfg: &RunConfig) -> Vec<String> {
    let mut context = Vec::new();
    if let Some(prompt) = &cfg.custom_prompt {
        context.push(prompt.clone());
    }
    if let Some(state) = &cfg.state {
        context.push(format!("Answer for the jurisdiction of {state}."));
    }
    if cfg.kb_enabled {
        context.push("Ground the answer in the curated knowledge base.".into());
    }
    if cfg.rag_enabled {
        context.push("Retrieved reference passages are available.".into());
    }
    if cfg.tools_enabled {
        context.push("Domain calculation tools are available.".into());
    }
    context
}

/// Aggregates over exactly one run's responses.
pub fn aggregate(responses: &[ModelResponse]) -> RunAggregates {
    let total = responses.len() as u32;
    let successful = responses
        .iter()
        .filter(|r| r.status == ResponseStatus::Success)
        .count() as u32;
    let failed = responses
        .iter()
        .filter(|r| r.status == ResponseStatus::Error)
        .count() as u32;

    let grades: Vec<f64> = responses
        .iter()
        .filter(|r| r.status == ResponseStatus::Success)
        .filter_map(|r| r.effective_grade())
        .collect();
    let avg_accuracy = if grades.is_empty() {
        0.0
    } else {
        grades.iter().sum::<f64>() / grades.len() as f64
    };

    let confidences: Vec<f64> = responses
        .iter()
        .filter(|r| r.status == ResponseStatus::Success)
        .map(|r| r.confidence)
        .collect();
    let avg_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    let timings: Vec<f64> = responses
        .iter()
        .filter_map(|r| r.response_time_ms)
        .map(|ms| ms as f64)
        .collect();
    let avg_response_time_ms = if timings.is_empty() {
        0.0
    } else {
        timings.iter().sum::<f64>() / timings.len() as f64
    };

    RunAggregates {
        total_questions: total,
        successful_tests: successful,
        failed_tests: failed,
        avg_accuracy,
        avg_confidence,
        avg_response_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GradingState;

    fn response(status: ResponseStatus, grade: Option<f64>) -> ModelResponse {
        let grading = match grade {
            Some(g) => GradingState::AiGraded {
                ai: crate::model::AiGrade {
                    grade: g,
                    confidence: 90.0,
                    reasoning: String::new(),
                    graded_at: String::new(),
                },
            },
            None => GradingState::Ungraded,
        };
        ModelResponse {
            id: 1,
            run_id: Some(1),
            agent_type: "science".into(),
            question_id: 1,
            model: "m".into(),
            answer: "a".into(),
            confidence: 60.0,
            response_time_ms: Some(1000),
            cost: None,
            status,
            grading,
            version: 1,
        }
    }

    #[test]
    fn aggregates_over_empty_set_are_zeroed() {
        assert_eq!(aggregate(&[]), RunAggregates::default());
    }

    #[test]
    fn aggregates_split_success_and_error() {
        let rows = vec![
            response(ResponseStatus::Success, Some(90.0)),
            response(ResponseStatus::Success, Some(70.0)),
            response(ResponseStatus::Error, None),
        ];
        let agg = aggregate(&rows);
        assert_eq!(agg.total_questions, 3);
        assert_eq!(agg.successful_tests, 2);
        assert_eq!(agg.failed_tests, 1);
        assert!((agg.avg_accuracy - 80.0).abs() < 1e-9);
        assert!((agg.avg_confidence - 60.0).abs() < 1e-9);
    }

    #[test]
    fn context_reflects_the_run_configuration() {
        let cfg = RunConfig {
            agent_type: "compliance".into(),
            model: "gpt-4o".into(),
            state: Some("CO".into()),
            rag_enabled: true,
            tools_enabled: false,
            kb_enabled: false,
            custom_prompt: Some("Be terse.".into()),
        };
        let context = build_context(&cfg);
        assert_eq!(context.len(), 3);
        assert_eq!(context[0], "Be terse.");
        assert!(context[1].contains("CO"));
    }
}
