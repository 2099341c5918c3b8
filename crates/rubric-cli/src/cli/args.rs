use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rubric",
    version,
    about = "Baseline Q&A evaluation and grading tracker"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP API server
    Serve(ServeArgs),
    /// Replace an agent's corpus from a JSON file
    Import(ImportArgs),
    /// Export an agent's corpus to JSON
    Export(ExportArgs),
    /// Execute a baseline test run and print the summary
    Run(RunArgs),
    /// Record a human grade for a response
    Grade(GradeArgs),
    /// Per-model metrics over an agent's results
    Report(ReportArgs),
    /// Write a sample rubric.yaml
    Init(InitArgs),
    Version,
}

#[derive(clap::Args, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "rubric.yaml", env = "RUBRIC_CONFIG")]
    pub config: PathBuf,

    /// Override the configured port
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(clap::Args, Clone)]
pub struct ImportArgs {
    /// Corpus JSON file (full document or bare question array)
    pub file: PathBuf,

    #[arg(long)]
    pub agent_type: String,

    #[arg(long, default_value = ".rubric/rubric.db", env = "RUBRIC_DB")]
    pub db: PathBuf,
}

#[derive(clap::Args, Clone)]
pub struct ExportArgs {
    #[arg(long)]
    pub agent_type: String,

    /// Output path; stdout when omitted
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long, default_value = ".rubric/rubric.db", env = "RUBRIC_DB")]
    pub db: PathBuf,
}

#[derive(clap::Args, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub agent_type: String,

    #[arg(long)]
    pub model: String,

    /// Jurisdiction tag for state-specific answers
    #[arg(long)]
    pub state: Option<String>,

    #[arg(long)]
    pub rag: bool,

    #[arg(long)]
    pub tools: bool,

    #[arg(long)]
    pub kb: bool,

    #[arg(long)]
    pub custom_prompt: Option<String>,

    #[arg(long, default_value = "rubric.yaml", env = "RUBRIC_CONFIG")]
    pub config: PathBuf,

    #[arg(long, default_value = ".rubric/rubric.db", env = "RUBRIC_DB")]
    pub db: PathBuf,
}

#[derive(clap::Args, Clone)]
pub struct GradeArgs {
    #[arg(long)]
    pub response_id: i64,

    #[arg(long)]
    pub grade: f64,

    /// Grader identity recorded with the overlay
    #[arg(long)]
    pub graded_by: String,

    #[arg(long)]
    pub notes: Option<String>,

    #[arg(long)]
    pub improved_response: Option<String>,

    /// Reject the write if the response changed since this version
    #[arg(long)]
    pub expected_version: Option<i64>,

    #[arg(long, default_value = ".rubric/rubric.db", env = "RUBRIC_DB")]
    pub db: PathBuf,
}

#[derive(clap::Args, Clone)]
pub struct ReportArgs {
    #[arg(long)]
    pub agent_type: String,

    /// Restrict to one model; all models when omitted
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, default_value = ".rubric/rubric.db", env = "RUBRIC_DB")]
    pub db: PathBuf,
}

#[derive(clap::Args, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "rubric.yaml")]
    pub config: PathBuf,
}
