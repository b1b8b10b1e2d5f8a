use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::cli::output::{to_json, OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::auth::{self, CredentialSource};
use crate::core::config::{FetchFailurePolicy, ReportEnv, Settings};
use crate::core::cost::pipeline;
use crate::core::cost::query::{self, CostQuery, FetchOutcome};
use crate::core::models::cost::{CostTable, UsageDate};
use crate::core::slack::{blocks, webhook};
use crate::core::window::QueryWindow;

/// How the invocation continues after the cost query.
#[derive(Debug)]
enum Continuation {
    Report(CostTable<UsageDate>),
    Alert(anyhow::Error),
}

fn settle(outcome: FetchOutcome, policy: FetchFailurePolicy) -> Result<Continuation> {
    match outcome {
        FetchOutcome::Complete(table) => Ok(Continuation::Report(table)),
        FetchOutcome::Degraded { table, error } => match policy {
            FetchFailurePolicy::Alert => Ok(Continuation::Alert(error)),
            FetchFailurePolicy::Abort => Err(error.context("Cost query failed")),
            FetchFailurePolicy::Report => {
                tracing::warn!(
                    error = %format!("{:#}", error),
                    rows = table.row_count(),
                    "Cost query failed, reporting partial data"
                );
                Ok(Continuation::Report(table))
            }
        },
    }
}

pub fn http_client(settings: &Settings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.http_timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// Load settings and run one invocation.
pub async fn run(dry_run: bool, opts: &OutputOptions) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    execute(&settings, dry_run, opts).await
}

/// One scheduled invocation: fetch, rank, normalize, total, render, deliver.
pub async fn execute(settings: &Settings, dry_run: bool, opts: &OutputOptions) -> Result<()> {
    let issues = settings.validate();
    if !issues.is_empty() {
        anyhow::bail!("Invalid settings: {}", issues.join("; "));
    }
    let env = ReportEnv::from_env()?;
    let client = http_client(settings)?;
    let window = QueryWindow::trailing(
        Utc::now().date_naive(),
        settings.report.start_days_ago,
        settings.report.end_days_ago,
    );

    tracing::info!(
        subscription = %env.subscription_id,
        from = %window.from_timestamp(),
        to = %window.to_timestamp(),
        "Querying Azure cost data"
    );

    let credential = CredentialSource::from_env();
    let outcome = match auth::acquire_token(&credential).await {
        Ok(token) => {
            let query = CostQuery {
                endpoint: &env.management_endpoint,
                subscription_id: &env.subscription_id,
                token: &token,
                window: &window,
            };
            query::fetch(&client, &query).await
        }
        Err(error) => {
            tracing::error!(error = %format!("{:#}", error), "Azure authentication failed");
            FetchOutcome::Degraded {
                table: CostTable::default(),
                error,
            }
        }
    };

    deliver(&client, settings, &env, &window, outcome, dry_run, opts).await
}

async fn deliver(
    client: &reqwest::Client,
    settings: &Settings,
    env: &ReportEnv,
    window: &QueryWindow,
    outcome: FetchOutcome,
    dry_run: bool,
    opts: &OutputOptions,
) -> Result<()> {
    match settle(outcome, settings.on_fetch_error)? {
        Continuation::Report(table) => {
            let report = pipeline::build_report(table)?;
            let payload = blocks::build_payload(
                &env.slack_channel,
                &settings.slack,
                blocks::render_report(&report, &settings.report),
            );

            if dry_run {
                match opts.format {
                    OutputFormat::Text => println!(
                        "{}",
                        renderer::render_report(&report, window, &settings.report, opts.use_color)
                    ),
                    OutputFormat::Json => println!("{}", to_json(&payload, opts.pretty)?),
                }
                return Ok(());
            }

            webhook::post(client, &env.slack_webhook, &payload).await?;
            tracing::info!(days = report.len(), "Cost report delivered");
            Ok(())
        }
        Continuation::Alert(error) => {
            let payload = blocks::build_payload(
                &env.slack_channel,
                &settings.slack,
                blocks::render_fetch_failure(window, &error, &settings.report),
            );

            if dry_run {
                match opts.format {
                    OutputFormat::Text => println!(
                        "{}",
                        renderer::render_fetch_failure(window, &error, opts.use_color)
                    ),
                    OutputFormat::Json => println!("{}", to_json(&payload, opts.pretty)?),
                }
            } else if let Err(post_error) =
                webhook::post(client, &env.slack_webhook, &payload).await
            {
                tracing::error!(
                    error = %format!("{:#}", error),
                    "Cost query failed and the alert could not be posted"
                );
                return Err(post_error.context(format!(
                    "Failed to post alert for cost query failure ({:#})",
                    error
                )));
            }
            Err(error.context("Cost query failed, alert sent instead of report"))
        }
    }
}
