use chrono::NaiveDate;

use crate::core::config::{ReportSettings, SlackSettings};
use crate::core::formatter::{delta_marker, format_cost, format_display_date, format_signed_delta};
use crate::core::models::cost::CostTable;
use crate::core::models::message::{Block, Text, WebhookPayload};
use crate::core::window::QueryWindow;

/// Render the report as Slack blocks.
///
/// Layout: header, divider, then per day a summary section (date, total and,
/// after the first day, the difference to the previous day), a section
/// listing the top resource groups, and a divider.
pub fn render_report(report: &CostTable<NaiveDate>, settings: &ReportSettings) -> Vec<Block> {
    let symbol = settings.currency_symbol.as_str();
    let mut blocks = vec![Block::header(settings.title.as_str()), Block::Divider];

    if report.is_empty() {
        blocks.push(Block::text_section("_No cost data was returned for this period._"));
        return blocks;
    }

    let mut previous_total: Option<f64> = None;
    for day in &report.days {
        let total = day.total_or_zero();
        let mut fields = vec![
            Text::mrkdwn(format!("*Date*: {}", format_display_date(&day.date))),
            Text::mrkdwn(format!("*Total Cost*: {}", format_cost(total, symbol))),
        ];
        if let Some(previous) = previous_total {
            let diff = total - previous;
            fields.push(Text::mrkdwn(format!(
                "*Daily Difference*: {} {}",
                format_signed_delta(diff, symbol),
                delta_marker(diff)
            )));
        }
        blocks.push(Block::fields_section(fields));

        let group_lines: String = day
            .top_groups(settings.top_groups)
            .iter()
            .map(|g| format!("{}: {} \n", g.resource_group, format_cost(g.cost, symbol)))
            .collect();
        blocks.push(Block::text_section(format!(
            "*Top {} Resource Group Costs:*\n{}",
            settings.top_groups, group_lines
        )));

        blocks.push(Block::Divider);
        previous_total = Some(total);
    }

    blocks
}

/// Blocks posted instead of a report when the cost query failed.
pub fn render_fetch_failure(
    window: &QueryWindow,
    error: &anyhow::Error,
    settings: &ReportSettings,
) -> Vec<Block> {
    vec![
        Block::header(settings.title.as_str()),
        Block::Divider,
        Block::text_section(format!(
            ":warning: Cost data for {} could not be retrieved, so no report was produced.\n```{:#}```",
            window.describe(),
            error
        )),
    ]
}

pub fn build_payload(channel: &str, slack: &SlackSettings, blocks: Vec<Block>) -> WebhookPayload {
    WebhookPayload {
        channel: channel.to_string(),
        username: slack.username.clone(),
        icon_emoji: slack.icon_emoji.clone(),
        blocks,
    }
}
