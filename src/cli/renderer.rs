use chrono::NaiveDate;
use colored::{control, ColoredString, Colorize};

use crate::core::config::ReportSettings;
use crate::core::formatter::{format_cost, format_display_date, format_signed_delta};
use crate::core::models::cost::{CostTable, TOTAL_DAILY_COST_LABEL};
use crate::core::window::QueryWindow;

/// Render a report as a colored (or plain) terminal preview.
///
/// Layout:
/// ```text
///  Azure Daily Cost Report (2024-01-01 to 2024-01-03)
///
///  01/01/2024  Total Daily Cost 15.00€
///    rg-a                            10.00€
///    rg-b                             5.00€
///
///  02/01/2024  Total Daily Cost 20.00€  +5.00€ ▲
///    rg-a                            14.00€
///    rg-b                             6.00€
/// ```
pub fn render_report(
    report: &CostTable<NaiveDate>,
    window: &QueryWindow,
    settings: &ReportSettings,
    use_color: bool,
) -> String {
    control::set_override(use_color);
    let symbol = settings.currency_symbol.as_str();

    let mut lines: Vec<String> = Vec::new();
    let header = format!(" {} ({})", settings.title, window.describe());
    lines.push(header.bold().to_string());

    if report.is_empty() {
        lines.push(String::new());
        lines.push(format!("  {}", "No cost data was returned for this period.".dimmed()));
        return lines.join("\n");
    }

    let name_width = report
        .days
        .iter()
        .flat_map(|d| d.top_groups(settings.top_groups))
        .map(|g| g.resource_group.chars().count())
        .max()
        .unwrap_or(0)
        .max(24);

    let mut previous_total: Option<f64> = None;
    for day in &report.days {
        let total = day.total_or_zero();
        lines.push(String::new());

        let mut summary = format!(
            " {}  {} {}",
            format_display_date(&day.date).cyan(),
            TOTAL_DAILY_COST_LABEL,
            format_cost(total, symbol).bold()
        );
        if let Some(previous) = previous_total {
            summary.push_str(&format!("  {}", color_delta(total - previous, symbol)));
        }
        lines.push(summary);

        for group in day.top_groups(settings.top_groups) {
            lines.push(format!(
                "   {:<width$} {:>10}",
                group.resource_group,
                format_cost(group.cost, symbol),
                width = name_width
            ));
        }
        let hidden = day.groups.len().saturating_sub(settings.top_groups);
        if hidden > 0 {
            lines.push(format!("   {}", format!("… {} more", hidden).dimmed()));
        }

        previous_total = Some(total);
    }

    lines.join("\n")
}

/// Terminal version of the alert posted when the cost query fails.
pub fn render_fetch_failure(window: &QueryWindow, error: &anyhow::Error, use_color: bool) -> String {
    control::set_override(use_color);
    format!(
        " {}\n  {}",
        format!("Cost data for {} could not be retrieved", window.describe()).bold(),
        format!("{:#}", error).red()
    )
}

/// Increase in red with ▲, decrease in green with ▼.
fn color_delta(diff: f64, symbol: &str) -> ColoredString {
    let text = format_signed_delta(diff, symbol);
    if diff >= 0.0 {
        format!("{} ▲", text).red()
    } else {
        format!("{} ▼", text).green()
    }
}
