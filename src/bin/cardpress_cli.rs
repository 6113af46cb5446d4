//! CardPress CLI
//!
//! Commands: print, next, validate, plan
//! Outputs JSON to stdout, logs to stderr
//! Returns 1 on failure, 2 on validation failure

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cardpress_core::{CardTemplate, Ledger, PipelineError, PrintPipeline, PrintRequest};

#[derive(Parser)]
#[command(name = "cardpress-cli")]
#[command(about = "CardPress CLI - tracked business card sheets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Template JSON file (built-in template when omitted)
    #[arg(short, long, global = true)]
    template: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render cards and record them in the ledger
    Print {
        /// Number of cards to issue
        #[arg(short, long, default_value_t = 10)]
        count: u32,

        /// Ledger CSV file
        #[arg(short, long, default_value = "card_ledger.csv")]
        ledger: PathBuf,

        /// Directory for the generated PDF
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Show the next card number the ledger would issue
    Next {
        #[arg(short, long, default_value = "card_ledger.csv")]
        ledger: PathBuf,
    },

    /// Validate the template
    Validate,

    /// Show page and slot placement without writing anything
    Plan {
        #[arg(short, long, default_value_t = 10)]
        count: usize,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_template(path: Option<&Path>) -> Result<CardTemplate, String> {
    match path {
        Some(p) => CardTemplate::load_from_file(p).map_err(|e| e.to_string()),
        None => Ok(CardTemplate::default()),
    }
}

fn emit(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => println!(r#"{{"success": false, "error": "{e}"}}"#),
    }
}

fn failure(message: impl std::fmt::Display) -> ExitCode {
    error!("{message}");
    emit(&serde_json::json!({ "success": false, "error": message.to_string() }));
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let template = match load_template(cli.template.as_deref()) {
        Ok(t) => t,
        Err(e) => return failure(format!("Failed to load template: {e}")),
    };
    let pipeline = PrintPipeline::new(template);

    match cli.command {
        Commands::Print { count, ledger, out_dir } => {
            let request = PrintRequest::new(count, ledger, out_dir);
            match pipeline.print(&request) {
                Ok(run) => {
                    emit(&serde_json::json!({ "success": true, "run": run }));
                    ExitCode::SUCCESS
                }
                Err(
                    e @ (PipelineError::ValidationFailed(_)
                    | PipelineError::EngineVersionMismatch(..)),
                ) => {
                    error!("{e}");
                    emit(&serde_json::json!({ "success": false, "error": e.to_string() }));
                    ExitCode::from(2)
                }
                Err(e) => failure(e),
            }
        }

        Commands::Next { ledger } => {
            // Peeking at a ledger that does not exist yet must not create it.
            let peeked = if ledger.exists() {
                Ledger::open(&ledger).and_then(|l| Ok((l.next_card_number()?, l.records().len())))
            } else {
                Ok((1, 0))
            };
            match peeked {
                Ok((next, records)) => {
                    emit(&serde_json::json!({
                        "ledger": ledger,
                        "records": records,
                        "next_card_number": next,
                        "next_tracking_url": pipeline.template().tracking_url(next),
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) => failure(e),
            }
        }

        Commands::Validate => {
            let result = pipeline.validate();
            emit(&serde_json::json!(result));
            if result.valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Plan { count } => {
            let pages = pipeline.plan(count);
            emit(&serde_json::json!({
                "cards": count,
                "slots_per_page": pipeline.template().sheet.slots_per_page(),
                "left_margin": pipeline.template().sheet.left_margin(),
                "pages": pages,
            }));
            ExitCode::SUCCESS
        }
    }
}
