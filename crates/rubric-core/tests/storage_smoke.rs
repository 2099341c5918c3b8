use rubric_core::corpus::Corpus;
use rubric_core::engine::runner::aggregate;
use rubric_core::error::Error;
use rubric_core::model::{
    BaselineQuestion, Difficulty, GradingState, QuestionPatch, ResponseStatus, RunConfig,
    RunStatus,
};
use rubric_core::storage::store::{NewResponse, Store};
use tempfile::tempdir;

fn question(id: i64) -> BaselineQuestion {
    BaselineQuestion {
        id,
        question: format!("Question {id}?"),
        expected_answer: "Expected.".into(),
        category: "compliance".into(),
        difficulty: Difficulty::Intermediate,
        state: Some("CA".into()),
        tags: vec!["seed".into()],
        archived: false,
        last_updated: String::new(),
    }
}

fn run_config() -> RunConfig {
    RunConfig {
        agent_type: "compliance".into(),
        model: "gpt-4o".into(),
        state: Some("CA".into()),
        rag_enabled: true,
        tools_enabled: false,
        kb_enabled: true,
        custom_prompt: None,
    }
}

fn pending_response(store: &Store, run_id: i64, question_id: i64) -> i64 {
    store
        .insert_response(&NewResponse {
            run_id: Some(run_id),
            agent_type: "compliance".into(),
            question_id,
            model: "gpt-4o".into(),
            answer: "An answer.".into(),
            confidence: 70.0,
            response_time_ms: Some(900),
            cost: Some(0.003),
            status: ResponseStatus::Pending,
            grading: GradingState::Ungraded,
        })
        .unwrap()
        .id
}

#[test]
fn store_lifecycle_on_disk() -> rubric_core::error::Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("rubric.db");

    let store = Store::open(&db_path)?;
    store.init_schema()?;

    store.replace_corpus(&Corpus::new("compliance", vec![question(1), question(2)]))?;
    let listed = store.list_questions("compliance", false)?;
    assert_eq!(listed.len(), 2);
    assert!(!listed[0].last_updated.is_empty());

    // editor layer: partial update bumps last_updated, keeps id
    let before = store.get_question("compliance", 1)?;
    let updated = store.update_question_fields(
        "compliance",
        1,
        &QuestionPatch {
            question: Some("Rephrased question 1?".into()),
            difficulty: Some(Difficulty::Advanced),
            ..Default::default()
        },
    )?;
    assert_eq!(updated.id, 1);
    assert_eq!(updated.question, "Rephrased question 1?");
    assert_eq!(updated.difficulty, Difficulty::Advanced);
    assert_eq!(updated.expected_answer, before.expected_answer);

    // archival, never hard deletion
    store.archive_question("compliance", 2)?;
    assert_eq!(store.list_questions("compliance", false)?.len(), 1);
    assert_eq!(store.list_questions("compliance", true)?.len(), 2);

    // run lifecycle
    let run_id = store.create_run(&run_config())?;
    assert_eq!(store.get_run(run_id)?.status, RunStatus::Pending);

    store.start_run(run_id)?;
    assert_eq!(store.get_run(run_id)?.status, RunStatus::Running);

    // no transition back to pending: a second start conflicts
    let err = store.start_run(run_id).unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // completion refused while a child response is pending
    let response_id = pending_response(&store, run_id, 1);
    let responses = store.list_responses_for_run(run_id)?;
    let err = store
        .finalize_run(run_id, RunStatus::Completed, &aggregate(&responses))
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    store.set_response_status(response_id, ResponseStatus::Success)?;
    let responses = store.list_responses_for_run(run_id)?;
    store.finalize_run(run_id, RunStatus::Completed, &aggregate(&responses))?;

    let run = store.get_run(run_id)?;
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.completed_at.is_some());
    let agg = run.aggregates.expect("aggregates at terminal transition");
    assert_eq!(agg.total_questions, 1);
    assert_eq!(agg.successful_tests, 1);

    // terminal runs are immutable
    let err = store
        .finalize_run(run_id, RunStatus::Failed, &agg)
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    Ok(())
}

#[test]
fn missing_rows_are_not_found_errors() {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();

    assert!(matches!(
        store.get_question("compliance", 404).unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        store.get_run(404).unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        store.get_response(404).unwrap_err(),
        Error::NotFound { .. }
    ));

    // unknown agent degrades to an empty list, not an error
    assert!(store.list_questions("nope", false).unwrap().is_empty());
    assert!(store.list_responses_for_agent("nope").unwrap().is_empty());
}
