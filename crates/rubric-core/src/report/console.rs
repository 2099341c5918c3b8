use crate::grading::GradingPolicy;
use crate::model::{BaselineTestRun, ModelResponse, ResponseStatus};

pub fn print_run_summary(run: &BaselineTestRun, responses: &[ModelResponse], policy: &GradingPolicy) {
    eprintln!(
        "\nRun #{} [{}] {} — {} questions",
        run.id,
        run.config.agent_type,
        run.config.model,
        responses.len()
    );

    for r in responses {
        let duration = r
            .response_time_ms
            .map(|d| format!("({:.1}s)", d as f64 / 1000.0))
            .unwrap_or_default();
        match r.status {
            ResponseStatus::Success => {
                let grade = r
                    .effective_grade()
                    .map(|g| format!("{:.0}/{:.0}", g, policy.max_score))
                    .unwrap_or_else(|| "ungraded".into());
                let review = if r.requires_review(policy) {
                    "  [review]"
                } else {
                    ""
                };
                eprintln!("✅ q{:<5} {}  {}{}", r.question_id, grade, duration, review);
            }
            ResponseStatus::Pending => {
                eprintln!("⏳ q{:<5} pending {}", r.question_id, duration);
            }
            ResponseStatus::Error => {
                eprintln!("💥 q{:<5} ERROR: {}", r.question_id, r.answer);
            }
        }
    }

    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match &run.aggregates {
        Some(agg) => eprintln!(
            "Summary: {} ok, {} failed of {} — avg grade {:.1}, avg confidence {:.1}, avg latency {:.0}ms",
            agg.successful_tests,
            agg.failed_tests,
            agg.total_questions,
            agg.avg_accuracy,
            agg.avg_confidence,
            agg.avg_response_time_ms
        ),
        None => eprintln!("Summary: run not finalized (status: {})", run.status.as_str()),
    }
}
