use serde::{Deserialize, Serialize};

/// Slack Block Kit text object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Text {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl Text {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: Text,
    },
    Divider,
    Section {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<Text>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Text>,
    },
}

impl Block {
    pub fn header(text: impl Into<String>) -> Self {
        Self::Header {
            text: Text::plain(text),
        }
    }

    pub fn text_section(text: impl Into<String>) -> Self {
        Self::Section {
            text: Some(Text::mrkdwn(text)),
            fields: Vec::new(),
        }
    }

    pub fn fields_section(fields: Vec<Text>) -> Self {
        Self::Section { text: None, fields }
    }

    #[cfg(test)]
    pub fn is_divider(&self) -> bool {
        matches!(self, Self::Divider)
    }
}

/// Body posted to a Slack incoming webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub channel: String,
    pub username: String,
    pub icon_emoji: String,
    pub blocks: Vec<Block>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_serializes_with_plain_text() {
        let value = serde_json::to_value(Block::header("Report")).unwrap();
        assert_eq!(
            value,
            json!({"type": "header", "text": {"type": "plain_text", "text": "Report"}})
        );
    }

    #[test]
    fn divider_serializes_as_type_only() {
        let value = serde_json::to_value(Block::Divider).unwrap();
        assert_eq!(value, json!({"type": "divider"}));
    }

    #[test]
    fn fields_section_omits_text() {
        let block = Block::fields_section(vec![Text::mrkdwn("*Date*: 01/01/2024")]);
        let value = serde_json::to_value(block).unwrap();
        assert_eq!(
            value,
            json!({"type": "section", "fields": [{"type": "mrkdwn", "text": "*Date*: 01/01/2024"}]})
        );
    }

    #[test]
    fn text_section_omits_fields() {
        let value = serde_json::to_value(Block::text_section("hello")).unwrap();
        assert_eq!(
            value,
            json!({"type": "section", "text": {"type": "mrkdwn", "text": "hello"}})
        );
    }

    #[test]
    fn payload_field_names() {
        let payload = WebhookPayload {
            channel: "#costs".to_string(),
            username: "Cost Report Bot".to_string(),
            icon_emoji: ":money_with_wings:".to_string(),
            blocks: vec![Block::Divider],
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["channel"], "#costs");
        assert_eq!(value["username"], "Cost Report Bot");
        assert_eq!(value["icon_emoji"], ":money_with_wings:");
        assert_eq!(value["blocks"][0]["type"], "divider");
    }
}
