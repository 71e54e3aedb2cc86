//! Outreach CLI.
//!
//! Reads leads from Airtable, writes messages with Anthropic, sends them
//! over SMTP and files ClickUp follow-ups, then prints the campaign
//! summary.

use anyhow::Context;
use clap::Parser;
use outreach::adapters::http::{
    build_client, AirtableLeadSource, AnthropicMessageGenerator, ClickUpTaskCreator,
};
use outreach::adapters::smtp::SmtpEmailSender;
use outreach::adapters::Adapters;
use outreach::campaign::CampaignOrchestrator;
use outreach::config::{CampaignSettings, Credentials};
use outreach::events::LoggingEventSink;
use outreach::observability::{init_tracing, LogFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "outreach")]
#[command(about = "Run a lead outreach campaign")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: CampaignSettings,

    #[command(flatten)]
    credentials: Credentials,

    /// Emit logs as JSON lines
    #[arg(long, env = "OUTREACH_JSON_LOGS", default_value_t = false)]
    json_logs: bool,

    /// Also append logs to this file (e.g. outreach_agent.log)
    #[arg(long, env = "OUTREACH_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log per-attempt retry detail
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Print the report as JSON instead of the text summary
    #[arg(long, default_value_t = false)]
    report_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Text };
    if let Err(e) = init_tracing(format, cli.verbose, cli.log_file.as_deref()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Campaign failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.credentials.validate()?;
    let options = cli.settings.to_options()?;
    let credentials = cli.credentials;

    let client = build_client(options.call_timeout)?;
    let sender = SmtpEmailSender::new(
        credentials.smtp_settings(&options.content.client.name, options.call_timeout),
    )?;
    let adapters = Adapters::new(
        Arc::new(AirtableLeadSource::new(
            client.clone(),
            credentials.airtable_api_key,
            credentials.airtable_base_id,
            credentials.airtable_table_name,
        )),
        Arc::new(AnthropicMessageGenerator::new(client.clone(), credentials.anthropic_api_key)),
        Arc::new(sender),
        Arc::new(ClickUpTaskCreator::new(client, credentials.clickup_api_key, credentials.clickup_list_id)),
    );

    info!(
        client = %options.content.client.name,
        concurrency = options.concurrency,
        "Starting outreach campaign"
    );

    let orchestrator =
        CampaignOrchestrator::new(adapters, options).with_event_sink(Arc::new(LoggingEventSink::debug()));

    let cancel = orchestrator.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling campaign");
            cancel.cancel("interrupted");
        }
    });

    let outcome = orchestrator.run().await?;

    if cli.report_json {
        let json = serde_json::to_string_pretty(&outcome.report).context("failed to encode report")?;
        println!("{json}");
    } else {
        print!("{}", outcome.report);
    }

    info!(
        run_id = %outcome.report.run_id,
        retries = outcome.retry_stats.retries,
        "Campaign complete"
    );
    Ok(())
}
