mod config;
mod constants;
mod delivery;
mod dispatch;
mod error;
mod helpers;
mod history;
mod llm;
mod message;
mod orchestrator;
mod prompt;
mod recipients;
mod smtp;
mod state;
mod stats;
mod traits;
mod weather;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, Instrument};

use crate::config::Config;
use crate::error::AppError;
use crate::orchestrator::{run_prediction, RunSummary};
use crate::state::{Secrets, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "snowday", about = "Snow day predictor and notifier", version)]
struct Args {
    /// Path to the YAML settings file
    #[arg(long, default_value = "snowday.yml", env = "SNOWDAY_CONFIG")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "SNOWDAY_LOG_FORMAT")]
    log_format: LogFormat,

    /// weatherapi.com API key
    #[arg(long, env = "WEATHERAPI_KEY", hide_env_values = true)]
    weather_api_key: String,

    /// Language model API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// Address predictions are sent from
    #[arg(long, env = "SENDER_EMAIL")]
    sender_email: Option<String>,

    /// SMTP password (app password) for the sender
    #[arg(long, env = "SENDER_EMAIL_PASSWORD", hide_env_values = true)]
    sender_password: Option<String>,

    /// Bearer token for the sign-up form responses API
    #[arg(long, env = "GOOGLE_FORMS_TOKEN", hide_env_values = true)]
    forms_token: Option<String>,

    /// Force testing mode: testing recipients only, sent regardless of the verdict
    #[arg(long)]
    testing: bool,

    /// Predict and record, but do not send anything
    #[arg(long)]
    dry_run: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("snowday=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run(args: Args) -> Result<RunSummary, AppError> {
    let mut config = Config::load(&args.config)?;
    config.testing_mode |= args.testing;
    info!(
        school = %config.school.name,
        zip = %config.zip_code,
        testing = config.testing_mode,
        dry_run = args.dry_run,
        "Starting snow day prediction"
    );

    let secrets = Secrets {
        weather_api_key: args.weather_api_key,
        llm_api_key: args.openai_api_key,
        sender_email: args.sender_email,
        sender_password: args.sender_password,
        forms_token: args.forms_token,
    };
    let state = State::build(config, secrets, args.dry_run)?;
    run_prediction(&state).await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_format);

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id);

    match run(args).instrument(span.clone()).await {
        Ok(summary) => {
            let _enter = span.enter();
            match &summary.report {
                Some(report) => info!(
                    delivered = report.delivered,
                    failed = report.failed,
                    "Run complete"
                ),
                None => info!(should_send = summary.should_send, "Run complete, nothing sent"),
            }
        }
        Err(e) => {
            let _enter = span.enter();
            error!("Run failed: {e}");
            std::process::exit(1);
        }
    }
}
