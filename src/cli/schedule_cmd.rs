use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::cli::output::OutputOptions;
use crate::cli::run_cmd;
use crate::core::config::{ReportEnv, Settings};

/// How late a wake-up may be before it is reported as past due.
const PAST_DUE_TOLERANCE_SECS: i64 = 60;

/// Next occurrence of `run_at` (UTC) strictly after `now`.
pub fn next_fire(now: DateTime<Utc>, run_at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(run_at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

pub fn is_past_due(scheduled: DateTime<Utc>, fired: DateTime<Utc>) -> bool {
    fired - scheduled > Duration::seconds(PAST_DUE_TOLERANCE_SECS)
}

/// Check everything a scheduled run needs before waiting for the first fire.
fn preflight<F>(settings: &Settings, lookup: F) -> Result<NaiveTime>
where
    F: Fn(&str) -> Option<String>,
{
    let issues = settings.validate();
    if !issues.is_empty() {
        anyhow::bail!("Invalid settings: {}", issues.join("; "));
    }
    ReportEnv::from_lookup(lookup)?;
    settings.schedule.run_at_time().with_context(|| {
        format!(
            "Invalid schedule.run_at '{}' (must be HH:MM)",
            settings.schedule.run_at
        )
    })
}

/// Run the report once a day at the configured time until interrupted.
pub async fn run(opts: &OutputOptions) -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    let run_at = preflight(&settings, |name| std::env::var(name).ok())?;
    tracing::info!(run_at = %run_at, "Scheduler started");

    loop {
        let now = Utc::now();
        let scheduled = next_fire(now, run_at);
        tracing::info!(next_run = %scheduled, "Waiting for next scheduled report");

        let wait = (scheduled - now).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping scheduler");
                return Ok(());
            }
        }

        let fired = Utc::now();
        if is_past_due(scheduled, fired) {
            tracing::warn!(scheduled = %scheduled, fired = %fired, "The timer is past due");
        }
        tracing::info!(at = %fired, "Scheduled cost report triggered");

        if let Err(e) = run_cmd::execute(&settings, false, opts).await {
            tracing::error!(error = %format!("{:#}", e), "Scheduled cost report failed");
        }
    }
}
