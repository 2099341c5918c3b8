use rubric_core::config::GraderConfig;
use rubric_core::corpus::Corpus;
use rubric_core::engine::runner::{RunSettings, Runner};
use rubric_core::error::Error;
use rubric_core::grader::GraderService;
use rubric_core::grading::GradingPolicy;
use rubric_core::model::{
    BaselineQuestion, Difficulty, ResponseStatus, RunConfig, RunStatus,
};
use rubric_core::providers::llm::fake::FakeClient;
use rubric_core::providers::llm::ModelClient;
use rubric_core::storage::store::Store;
use std::sync::Arc;

fn seeded_store() -> Store {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let questions = (1..=3)
        .map(|id| BaselineQuestion {
            id,
            question: format!("Question {id}?"),
            expected_answer: "The expected answer.".into(),
            category: "compliance".into(),
            difficulty: Difficulty::Basic,
            state: None,
            tags: vec![],
            archived: false,
            last_updated: String::new(),
        })
        .collect();
    store
        .replace_corpus(&Corpus::new("compliance", questions))
        .unwrap();
    store
}

fn runner(store: &Store, client: Arc<dyn ModelClient>) -> Runner {
    let grader = GraderService::new(
        GraderConfig::default(), // heuristic: offline and deterministic
        store.clone(),
        None,
        GradingPolicy::default(),
    );
    Runner {
        store: store.clone(),
        client,
        grader,
        settings: RunSettings::default(),
    }
}

fn run_config() -> RunConfig {
    RunConfig {
        agent_type: "compliance".into(),
        model: "fake-model".into(),
        state: None,
        rag_enabled: false,
        tools_enabled: false,
        kb_enabled: false,
        custom_prompt: None,
    }
}

#[tokio::test]
async fn run_completes_with_graded_responses_and_aggregates() {
    let store = seeded_store();
    let client = Arc::new(FakeClient::canned(
        "fake-model".into(),
        "The expected answer.",
    ));
    let runner = runner(&store, client);

    let run_id = store.create_run(&run_config()).unwrap();
    let run = runner.execute_run(run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());
    let agg = run.aggregates.unwrap();
    assert_eq!(agg.total_questions, 3);
    assert_eq!(agg.successful_tests, 3);
    assert_eq!(agg.failed_tests, 0);
    // canned answer matches expected exactly -> full marks
    assert!((agg.avg_accuracy - 100.0).abs() < 1e-9);

    let responses = store.list_responses_for_run(run_id).unwrap();
    assert_eq!(responses.len(), 3);
    for r in &responses {
        assert_eq!(r.status, ResponseStatus::Success);
        assert!(r.grading.ai().is_some());
        assert!(r.response_time_ms.is_some());
    }
}

#[tokio::test]
async fn total_provider_outage_fails_the_run() {
    let store = seeded_store();
    let client = Arc::new(FakeClient::failing("fake-model".into()));
    let runner = runner(&store, client);

    let run_id = store.create_run(&run_config()).unwrap();
    let run = runner.execute_run(run_id).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    let agg = run.aggregates.unwrap();
    assert_eq!(agg.successful_tests, 0);
    assert_eq!(agg.failed_tests, 3);

    let policy = GradingPolicy::default();
    for r in store.list_responses_for_run(run_id).unwrap() {
        assert_eq!(r.status, ResponseStatus::Error);
        assert!(r.grading.ai().is_none());
        assert!(r.requires_review(&policy));
    }
}

#[tokio::test]
async fn terminal_runs_cannot_be_restarted_in_place() {
    let store = seeded_store();
    let client = Arc::new(FakeClient::new("fake-model".into()));
    let runner = runner(&store, client);

    let run_id = store.create_run(&run_config()).unwrap();
    runner.execute_run(run_id).await.unwrap();

    let err = runner.execute_run(run_id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // restart means a new run record
    let second = store.create_run(&run_config()).unwrap();
    assert_ne!(second, run_id);
}

#[tokio::test]
async fn single_question_test_records_a_standalone_response() {
    let store = seeded_store();
    let client = Arc::new(FakeClient::canned("gpt-4o".into(), "The expected answer."));
    let runner = runner(&store, client);

    let response = runner
        .test_question("compliance", 2, "gpt-4o")
        .await
        .unwrap();
    assert_eq!(response.run_id, None);
    assert_eq!(response.question_id, 2);
    assert_eq!(response.model, "gpt-4o");
    assert_eq!(response.status, ResponseStatus::Success);
    assert!(response.grading.ai().is_some());

    let err = runner
        .test_question("compliance", 999, "gpt-4o")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
