use clap::{ArgAction, Parser, Subcommand};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use auth_resilience::config::ResilienceConfig;
use auth_resilience::context::AuthResilience;
use auth_resilience::error::{ClassifiedError, ErrorCategory, ErrorCode, RawFailure, Severity};
use auth_resilience::feedback::{ExecuteOptions, FeedbackHandlers};
use auth_resilience::logging::{init_logging, LogLevel};
use auth_resilience::metrics::{format_report, HealthSummary};

#[derive(Parser, Debug)]
#[command(name = "authres")]
#[command(version)]
#[command(about = "Classify authentication failures and exercise the retry pipeline")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Disable colors (also respects NO_COLOR environment variable)
    #[arg(long, global = true)]
    no_color: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify an error message or HTTP response
    Classify {
        /// Error text or response body
        text: String,

        /// HTTP status code of the failed response
        #[arg(long, short)]
        status: Option<u16>,

        /// Operation context to attach
        #[arg(long)]
        context: Option<String>,

        /// Print the classified error as JSON
        #[arg(long)]
        json: bool,
    },
    /// List error codes and their metadata
    Taxonomy {
        /// Only show codes in this category (e.g. NETWORK)
        #[arg(long)]
        category: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a scripted refresh through the retry pipeline
    Simulate {
        /// Comma-separated attempt outcomes: ok, timeout, offline, transport,
        /// expired, malformed, missing-token, invalid, locked, disabled,
        /// missing-fields, an HTTP status (e.g. 503), or free text
        #[arg(long, default_value = "timeout,timeout,ok", value_delimiter = ',')]
        script: Vec<String>,

        /// Operation name used as the single-flight key
        #[arg(long, default_value = "tokenRefresh")]
        operation: String,

        /// Override max retries
        #[arg(long)]
        max_retries: Option<u32>,

        /// Override the backoff base delay
        #[arg(long, value_name = "MS")]
        base_delay_ms: Option<u64>,

        /// Override the minimum spacing between attempts
        #[arg(long, value_name = "MS")]
        min_spacing_ms: Option<u64>,

        /// Number of concurrent callers sharing each attempt
        #[arg(long, default_value = "1")]
        callers: usize,

        /// Print the metrics report as JSON
        #[arg(long)]
        json: bool,
    },
}

mod exit_codes {
    use std::process::ExitCode;

    /// The simulated operation ended in a terminal error.
    pub fn operation_failed() -> ExitCode {
        ExitCode::from(1)
    }

    /// Bad input or configuration.
    pub fn usage() -> ExitCode {
        ExitCode::from(2)
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn severity(&self, text: &str, severity: Severity) -> String {
        if !self.enabled {
            return text.to_string();
        }
        match severity {
            Severity::High => text.red().bold().to_string(),
            Severity::Medium => text.yellow().bold().to_string(),
            Severity::Low => text.cyan().bold().to_string(),
        }
    }

    fn health(&self, summary: HealthSummary) -> String {
        let label = summary.as_str();
        if !self.enabled {
            return label.to_string();
        }
        match summary {
            HealthSummary::Excellent | HealthSummary::Good => label.green().to_string(),
            HealthSummary::Fair => label.yellow().to_string(),
            HealthSummary::Poor => label.red().to_string(),
            HealthSummary::NotEvaluated => label.dimmed().to_string(),
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.enabled {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match ResilienceConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error: {}", err);
                return exit_codes::usage();
            }
        },
        None => ResilienceConfig::default(),
    };

    let mut logging = config.logging_config();
    if cli.verbose > 0 {
        logging = logging.with_level(LogLevel::from(cli.verbose));
    } else if cli.config.is_none() {
        // Keep stdout/stderr quiet for plain invocations.
        logging = logging.with_level(LogLevel::Warn);
    }
    init_logging(logging);

    let palette = Palette {
        enabled: !cli.no_color && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        Commands::Classify {
            text,
            status,
            context,
            json,
        } => classify(&config, &palette, text, status, context, json),
        Commands::Taxonomy { category, json } => taxonomy(&palette, category, json),
        Commands::Simulate {
            script,
            operation,
            max_retries,
            base_delay_ms,
            min_spacing_ms,
            callers,
            json,
        } => {
            let mut config = config;
            if let Some(max_retries) = max_retries {
                config.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = base_delay_ms {
                config.base_delay_ms = base_delay_ms;
                config.max_delay_ms = config.max_delay_ms.max(base_delay_ms);
            }
            if let Some(min_spacing_ms) = min_spacing_ms {
                config.min_spacing_ms = min_spacing_ms;
            }
            if let Err(err) = config.validate() {
                eprintln!("Error: {}", err);
                return exit_codes::usage();
            }
            simulate(config, &palette, script, operation, callers.max(1), json).await
        }
    }
}

fn classify(
    config: &ResilienceConfig,
    palette: &Palette,
    text: String,
    status: Option<u16>,
    context: Option<String>,
    json: bool,
) -> ExitCode {
    let resilience = AuthResilience::from_config(config.clone());
    let raw = match status {
        Some(status) => RawFailure::http(status, text),
        None => RawFailure::Message(text),
    };
    let error = resilience.classify_error(raw, context.as_deref());

    if json {
        return print_json(&error);
    }
    print_classified(palette, &error);
    ExitCode::SUCCESS
}

fn print_classified(palette: &Palette, error: &ClassifiedError) {
    println!(
        "{} {}",
        palette.severity(error.code().as_str(), error.severity()),
        palette.dim(&format!("({})", error.category()))
    );
    println!("  {}", error.message());
    println!("  {}", error.user_message());
    println!(
        "  severity: {}  retryable: {}  recoverable: {}",
        error.severity(),
        yes_no(error.is_retryable()),
        yes_no(error.is_recoverable())
    );
    if let Some(context) = error.context() {
        println!("  context: {}", context);
    }
    if !error.suggested_actions().is_empty() {
        println!("  suggested actions:");
        for action in error.suggested_actions() {
            println!("    - {}", action);
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaxonomyEntry {
    code: ErrorCode,
    category: ErrorCategory,
    #[serde(flatten)]
    metadata: &'static auth_resilience::error::ErrorMetadata,
}

fn taxonomy(palette: &Palette, category: Option<String>, json: bool) -> ExitCode {
    let categories: Vec<ErrorCategory> = match category {
        Some(name) => match name.parse::<ErrorCategory>() {
            Ok(category) => vec![category],
            Err(err) => {
                eprintln!("Error: {}", err);
                return exit_codes::usage();
            }
        },
        None => ErrorCategory::ALL.to_vec(),
    };

    let entries: Vec<TaxonomyEntry> = categories
        .iter()
        .flat_map(|category| category.codes())
        .map(|code| TaxonomyEntry {
            code,
            category: code.category(),
            metadata: code.metadata(),
        })
        .collect();

    if json {
        return print_json(&entries);
    }

    let mut current = None;
    for entry in &entries {
        if current != Some(entry.category) {
            println!("{}", entry.category);
            current = Some(entry.category);
        }
        println!(
            "  {:<32} {:<6} retry={:<3} recover={:<3} {}",
            palette.severity(entry.code.as_str(), entry.metadata.severity),
            entry.metadata.severity,
            yes_no(entry.metadata.auto_retryable),
            yes_no(entry.metadata.recoverable),
            entry.metadata.title
        );
    }
    ExitCode::SUCCESS
}

/// Parses one script step. `None` means success.
fn parse_step(step: &str) -> Option<RawFailure> {
    let step = step.trim();
    match step.to_ascii_lowercase().as_str() {
        "ok" | "success" => None,
        "timeout" => Some(RawFailure::timeout("simulated timeout")),
        "offline" => Some(RawFailure::Offline),
        "transport" => Some(RawFailure::transport("connection reset by peer")),
        "expired" => Some(RawFailure::ExpiredToken),
        "malformed" => Some(RawFailure::MalformedToken("simulated payload".to_string())),
        "missing-token" => Some(RawFailure::MissingToken),
        "invalid" => Some(RawFailure::InvalidCredentials("simulated".to_string())),
        "locked" => Some(RawFailure::AccountLocked),
        "disabled" => Some(RawFailure::AccountDisabled),
        "missing-fields" => Some(RawFailure::MissingFields(vec!["email".to_string()])),
        other => match other.parse::<u16>() {
            Ok(status) => Some(RawFailure::http(status, "")),
            Err(_) => Some(RawFailure::Message(step.to_string())),
        },
    }
}

async fn simulate(
    config: ResilienceConfig,
    palette: &Palette,
    script: Vec<String>,
    operation: String,
    callers: usize,
    json: bool,
) -> ExitCode {
    let resilience = AuthResilience::from_config(config);
    let steps: Arc<Mutex<Vec<Option<RawFailure>>>> = Arc::new(Mutex::new(
        script.iter().rev().map(|step| parse_step(step)).collect(),
    ));

    let task = {
        let steps = Arc::clone(&steps);
        move || {
            let next = steps
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                match next {
                    Some(Some(failure)) => Err(failure),
                    Some(None) => Ok(()),
                    None => Err(RawFailure::Message("script exhausted".to_string())),
                }
            }
        }
    };

    let quiet = json;
    let handlers = FeedbackHandlers::all(move |event| {
        if !quiet {
            println!("{}", event);
        }
    });

    let runs = (0..callers).map(|_| {
        resilience.execute_with_feedback(
            &operation,
            task.clone(),
            ExecuteOptions::new().with_handlers(handlers.clone()),
        )
    });
    let results = futures::future::join_all(runs).await;

    let report = resilience.get_metrics_report();
    if json {
        if let Err(code) = write_json(&report) {
            return code;
        }
    } else {
        println!();
        print!("{}", format_report(&report));
        println!();
        println!("Health: {}", palette.health(report.summary));
    }

    match results.into_iter().find_map(Result::err) {
        Some(error) => {
            if !json {
                eprintln!("Error: {}", error);
                for action in error.suggested_actions() {
                    eprintln!("  - {}", action);
                }
            }
            exit_codes::operation_failed()
        }
        None => ExitCode::SUCCESS,
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn write_json<T: Serialize>(value: &T) -> Result<(), ExitCode> {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => {
            println!("{}", rendered);
            Ok(())
        }
        Err(err) => {
            eprintln!("Error: failed to serialize output: {}", err);
            Err(ExitCode::FAILURE)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match write_json(value) {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
