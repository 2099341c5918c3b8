use rubric_core::config::GraderConfig;
use rubric_core::corpus::Corpus;
use rubric_core::error::Error;
use rubric_core::grader::GraderService;
use rubric_core::grading::{GradeBook, GradeMode, GradingPolicy, HumanGradeInput};
use rubric_core::model::{
    BaselineQuestion, Difficulty, GradingState, ResponseStatus,
};
use rubric_core::providers::llm::fake::FakeClient;
use rubric_core::storage::store::{NewResponse, Store};
use std::sync::Arc;

fn seeded_store() -> (Store, i64) {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    store
        .replace_corpus(&Corpus::new(
            "science",
            vec![BaselineQuestion {
                id: 1,
                question: "What solvent is used for winterization?".into(),
                expected_answer: "Ethanol.".into(),
                category: "extraction".into(),
                difficulty: Difficulty::Basic,
                state: None,
                tags: vec![],
                archived: false,
                last_updated: String::new(),
            }],
        ))
        .unwrap();

    let response = store
        .insert_response(&NewResponse {
            run_id: None,
            agent_type: "science".into(),
            question_id: 1,
            model: "gpt-4o".into(),
            answer: "Ethanol.".into(),
            confidence: 70.0,
            response_time_ms: Some(500),
            cost: Some(0.002),
            status: ResponseStatus::Pending,
            grading: GradingState::Ungraded,
        })
        .unwrap();
    (store, response.id)
}

fn book(store: &Store) -> GradeBook {
    GradeBook::new(store.clone(), GradingPolicy::default())
}

#[test]
fn ai_grade_overwrite_leaves_no_residue() {
    let (store, id) = seeded_store();
    let book = book(&store);

    let first = book
        .record_ai_grade(id, 60.0, 80.0, "first pass", GradeMode::Overwrite)
        .unwrap();
    assert_eq!(first.status, ResponseStatus::Success);
    assert_eq!(first.grading.ai().unwrap().grade, 60.0);
    assert_eq!(first.version, 2);

    let second = book
        .record_ai_grade(id, 75.0, 85.0, "second pass", GradeMode::Overwrite)
        .unwrap();
    assert_eq!(second.grading.ai().unwrap().grade, 75.0);
    assert_eq!(second.version, 3);
    assert!(store.list_grade_history(id).unwrap().is_empty());
}

#[test]
fn ai_grade_append_journals_the_displaced_grade() {
    let (store, id) = seeded_store();
    let book = book(&store);

    book.record_ai_grade(id, 60.0, 80.0, "first pass", GradeMode::Append)
        .unwrap();
    // nothing displaced yet
    assert!(store.list_grade_history(id).unwrap().is_empty());

    book.record_ai_grade(id, 75.0, 85.0, "second pass", GradeMode::Append)
        .unwrap();
    let history = store.list_grade_history(id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source, "ai");
    assert_eq!(history[0].grade, 60.0);
}

#[test]
fn human_overlay_is_replaced_whole_and_preserves_ai_grade() {
    let (store, id) = seeded_store();
    let book = book(&store);

    book.record_ai_grade(id, 40.0, 80.0, "harsh", GradeMode::Overwrite)
        .unwrap();
    let graded = book
        .record_human_grade(
            id,
            HumanGradeInput {
                grade: 85.0,
                graded_by: "reviewer@formul8.ai".into(),
                notes: Some("model was right".into()),
                improved_response: None,
            },
            None,
        )
        .unwrap();

    assert_eq!(graded.grading.ai().unwrap().grade, 40.0);
    let human = graded.grading.human().unwrap();
    assert_eq!(human.grade, 85.0);
    assert_eq!(human.notes.as_deref(), Some("model was right"));

    // divergence 45/100 -> agreement 0.55 -> below default threshold
    let agreement = graded.grading.agreement(100.0).unwrap();
    assert!((agreement - 0.55).abs() < 1e-9);
    assert!(graded.requires_review(&GradingPolicy::default()));

    // a second overlay replaces notes entirely, not field-by-field
    let regraded = book
        .record_human_grade(
            id,
            HumanGradeInput {
                grade: 42.0,
                graded_by: "lead@formul8.ai".into(),
                notes: None,
                improved_response: Some("Ethanol at -40C.".into()),
            },
            None,
        )
        .unwrap();
    let human = regraded.grading.human().unwrap();
    assert_eq!(human.grade, 42.0);
    assert!(human.notes.is_none());
    assert!(!regraded.requires_review(&GradingPolicy::default()));
}

#[test]
fn stale_version_writes_are_rejected() {
    let (store, id) = seeded_store();
    let book = book(&store);

    let current = store.get_response(id).unwrap();
    // a concurrent grader lands first
    book.record_human_grade(
        id,
        HumanGradeInput {
            grade: 80.0,
            graded_by: "first@formul8.ai".into(),
            notes: None,
            improved_response: None,
        },
        Some(current.version),
    )
    .unwrap();

    // our write still carries the version we read
    let err = book
        .record_human_grade(
            id,
            HumanGradeInput {
                grade: 30.0,
                graded_by: "second@formul8.ai".into(),
                notes: None,
                improved_response: None,
            },
            Some(current.version),
        )
        .unwrap_err();
    assert!(matches!(err, Error::StaleVersion { .. }));

    // losing write left no trace
    let after = store.get_response(id).unwrap();
    assert_eq!(after.grading.human().unwrap().grade, 80.0);
}

#[test]
fn out_of_range_and_missing_target_writes_are_rejected() {
    let (store, id) = seeded_store();
    let book = book(&store);

    let err = book
        .record_ai_grade(id, 101.0, 80.0, "", GradeMode::Overwrite)
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let err = book
        .record_human_grade(
            9999,
            HumanGradeInput {
                grade: 50.0,
                graded_by: "reviewer@formul8.ai".into(),
                notes: None,
                improved_response: None,
            },
            None,
        )
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    // rejected writes consumed no version
    assert_eq!(store.get_response(id).unwrap().version, 1);
}

#[tokio::test]
async fn grader_failure_sets_error_status_without_touching_grades() {
    let (store, id) = seeded_store();
    let book = book(&store);
    book.record_ai_grade(id, 66.0, 80.0, "prior", GradeMode::Overwrite)
        .unwrap();

    let grader = GraderService::new(
        GraderConfig {
            provider: "fake".into(),
            ..Default::default()
        },
        store.clone(),
        Some(Arc::new(FakeClient::failing("fake-grader".into()))),
        GradingPolicy::default(),
    );

    let response = grader.grade_response(id, GradeMode::Overwrite).await.unwrap();
    assert_eq!(response.status, ResponseStatus::Error);
    // prior grade fields untouched
    assert_eq!(response.grading.ai().unwrap().grade, 66.0);
    assert!(response.requires_review(&GradingPolicy::default()));
}

#[tokio::test]
async fn heuristic_grader_grades_a_stored_response() {
    let (store, id) = seeded_store();

    let grader = GraderService::new(
        GraderConfig::default(),
        store.clone(),
        None,
        GradingPolicy::default(),
    );
    let response = grader.grade_response(id, GradeMode::Overwrite).await.unwrap();

    assert_eq!(response.status, ResponseStatus::Success);
    let ai = response.grading.ai().unwrap();
    // exact lexical match with the expected answer
    assert!((ai.grade - 100.0).abs() < 1e-9);
}
