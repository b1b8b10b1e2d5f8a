use anyhow::{Context, Result};

use crate::core::models::message::WebhookPayload;

/// Post the payload to a Slack incoming webhook.
///
/// Any non-2xx response is an error carrying the status and response body.
pub async fn post(client: &reqwest::Client, webhook_url: &str, payload: &WebhookPayload) -> Result<()> {
    let response = client
        .post(webhook_url)
        .json(payload)
        .send()
        .await
        .context("Failed to send request to Slack webhook")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!(
            "Request to Slack returned an error {}, the response is:\n{}",
            status.as_u16(),
            body
        );
    }

    tracing::info!(
        channel = %payload.channel,
        blocks = payload.blocks.len(),
        "Posted message to Slack"
    );
    Ok(())
}
