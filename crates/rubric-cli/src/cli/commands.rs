use super::args::{
    Cli, Command, ExportArgs, GradeArgs, ImportArgs, InitArgs, ReportArgs, RunArgs, ServeArgs,
};
use anyhow::Context;
use rubric_core::config::{load_config, write_sample_config, TrackerConfig};
use rubric_core::corpus::Corpus;
use rubric_core::engine::runner::{RunSettings, Runner};
use rubric_core::grader::GraderService;
use rubric_core::grading::{compute_model_metrics, GradeBook, GradingPolicy, HumanGradeInput};
use rubric_core::model::{RunConfig, RunStatus};
use rubric_core::projection::{project, NO_RUN_MODEL};
use rubric_core::providers::llm::client_from_config;
use rubric_core::report::console;
use rubric_core::storage::store::Store;
use std::collections::BTreeSet;
use std::path::Path;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const TEST_FAILURES: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Serve(args) => serve(args).await,
        Command::Import(args) => import(args),
        Command::Export(args) => export(args),
        Command::Run(args) => run(args).await,
        Command::Grade(args) => grade(args),
        Command::Report(args) => report(args),
        Command::Init(args) => init(args),
        Command::Version => {
            println!("rubric {}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn load_or_default(path: &Path) -> anyhow::Result<TrackerConfig> {
    if path.exists() {
        Ok(load_config(path)?)
    } else {
        Ok(TrackerConfig::default())
    }
}

fn open_store(path: &Path) -> anyhow::Result<Store> {
    let store = Store::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    store.init_schema()?;
    Ok(store)
}

async fn serve(args: ServeArgs) -> anyhow::Result<i32> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rubric_api=info,rubric_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = load_or_default(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    rubric_api::serve(config).await?;
    Ok(exit_codes::OK)
}

fn import(args: ImportArgs) -> anyhow::Result<i32> {
    let corpus = Corpus::load(&args.file, &args.agent_type)?;
    corpus.validate(&args.agent_type)?;

    let store = open_store(&args.db)?;
    let replaced = store.replace_corpus(&corpus)?;
    println!(
        "imported {} questions for '{}' ({})",
        replaced,
        args.agent_type,
        corpus.fingerprint()?
    );
    Ok(exit_codes::OK)
}

fn export(args: ExportArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let corpus = store.export_corpus(&args.agent_type)?;
    match args.out {
        Some(path) => {
            corpus.save(&path)?;
            println!(
                "exported {} questions to {}",
                corpus.questions.len(),
                path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&corpus)?),
    }
    Ok(exit_codes::OK)
}

async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let config = load_or_default(&args.config)?;
    let store = open_store(&args.db)?;

    let client = client_from_config(&config.provider)?;
    let grader = GraderService::from_config(&config, store.clone())?;
    let runner = Runner {
        store: store.clone(),
        client,
        grader,
        settings: RunSettings {
            parallel: config.settings.parallel.unwrap_or(4),
            timeout_seconds: config.settings.timeout_seconds.unwrap_or(30),
        },
    };

    let run_config = RunConfig {
        agent_type: args.agent_type,
        model: args.model,
        state: args.state,
        rag_enabled: args.rag,
        tools_enabled: args.tools,
        kb_enabled: args.kb,
        custom_prompt: args.custom_prompt,
    };
    let run_id = store.create_run(&run_config)?;
    let run = runner.execute_run(run_id).await?;

    let responses = store.list_responses_for_run(run_id)?;
    console::print_run_summary(&run, &responses, &config.policy());

    let failed = run.status == RunStatus::Failed
        || run
            .aggregates
            .as_ref()
            .map(|a| a.failed_tests > 0)
            .unwrap_or(true);
    Ok(if failed {
        exit_codes::TEST_FAILURES
    } else {
        exit_codes::OK
    })
}

fn grade(args: GradeArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let book = GradeBook::new(store, GradingPolicy::default());
    let response = book.record_human_grade(
        args.response_id,
        HumanGradeInput {
            grade: args.grade,
            graded_by: args.graded_by,
            notes: args.notes,
            improved_response: args.improved_response,
        },
        args.expected_version,
    )?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(exit_codes::OK)
}

fn report(args: ReportArgs) -> anyhow::Result<i32> {
    let store = open_store(&args.db)?;
    let questions = store.list_questions(&args.agent_type, false)?;
    let responses = store.list_responses_for_agent(&args.agent_type)?;
    let rows = project(&questions, &responses, &GradingPolicy::default());

    let models: BTreeSet<String> = match args.model {
        Some(model) => BTreeSet::from([model]),
        None => rows
            .iter()
            .filter(|r| r.model != NO_RUN_MODEL)
            .map(|r| r.model.clone())
            .collect(),
    };

    if models.is_empty() {
        println!("no test results recorded for '{}'", args.agent_type);
        return Ok(exit_codes::OK);
    }

    for model in models {
        let metrics = compute_model_metrics(&rows, &model);
        println!(
            "{:<24} tests: {:<4} avg grade: {:>6.1}  avg latency: {:>7.0}ms  total cost: ${:.4}",
            model,
            metrics.test_count,
            metrics.avg_grade,
            metrics.avg_response_time_ms,
            metrics.total_cost
        );
    }
    Ok(exit_codes::OK)
}

fn init(args: InitArgs) -> anyhow::Result<i32> {
    write_sample_config(&args.config)?;
    println!("wrote {}", args.config.display());
    Ok(exit_codes::OK)
}
