use axum::routing::{get, patch, post, put};
use axum::Router;
use rubric_core::config::TrackerConfig;
use rubric_core::engine::runner::{RunSettings, Runner};
use rubric_core::grader::GraderService;
use rubric_core::grading::{GradeBook, GradingPolicy};
use rubric_core::providers::llm::{client_from_config, ModelClient};
use rubric_core::storage::store::Store;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod handlers;

/// Shared state: one store, one run-executor client, one grader.
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub config: TrackerConfig,
    pub client: Arc<dyn ModelClient>,
    pub grader: GraderService,
}

impl ApiState {
    pub fn policy(&self) -> GradingPolicy {
        self.config.policy()
    }

    pub fn gradebook(&self) -> GradeBook {
        GradeBook::new(self.store.clone(), self.policy())
    }

    pub fn runner(&self) -> Runner {
        Runner {
            store: self.store.clone(),
            client: self.client.clone(),
            grader: self.grader.clone(),
            settings: RunSettings {
                parallel: self.config.settings.parallel.unwrap_or(4),
                timeout_seconds: self.config.settings.timeout_seconds.unwrap_or(30),
            },
        }
    }
}

pub fn build_state(config: TrackerConfig) -> anyhow::Result<ApiState> {
    let store = Store::open(&config.db)?;
    store.init_schema()?;
    let client = client_from_config(&config.provider)?;
    let grader = GraderService::from_config(&config, store.clone())?;
    Ok(ApiState {
        store,
        config,
        client,
        grader,
    })
}

/// All endpoints consumed by the baseline-testing front end.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health_check))
        .route(
            "/api/agents/{agent_type}/baseline-results",
            get(handlers::questions::baseline_results),
        )
        .route(
            "/api/agents/{agent_type}/baseline-json",
            get(handlers::questions::get_corpus).put(handlers::questions::replace_corpus),
        )
        .route(
            "/api/agents/{agent_type}/baseline-questions/{id}",
            put(handlers::questions::update_question),
        )
        .route(
            "/api/agents/{agent_type}/baseline-questions/{id}/test/{model}",
            post(handlers::questions::test_question),
        )
        .route(
            "/api/baseline-testing/runs",
            post(handlers::runs::create_run).get(handlers::runs::list_runs),
        )
        .route(
            "/api/baseline-testing/runs/{id}/start",
            post(handlers::runs::start_run),
        )
        .route(
            "/api/baseline-testing/runs/{id}/results",
            get(handlers::runs::run_results),
        )
        .route(
            "/api/baseline-testing/results/{id}",
            patch(handlers::grading::patch_result),
        )
        .route(
            "/api/baseline-testing/ai-grade",
            post(handlers::grading::ai_grade),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(config: TrackerConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = build_state(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("rubric API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
