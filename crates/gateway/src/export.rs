//! Conversation history export.

use falcon_core::memory::ConversationTurn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn render(&self, turns: &[ConversationTurn]) -> Result<String, serde_json::Error> {
        match self {
            Self::Csv => Ok(to_csv(turns)),
            Self::Json => serde_json::to_string_pretty(turns),
        }
    }
}

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(turns: &[ConversationTurn]) -> String {
    let mut out = String::from("id,timestamp,user_message,assistant_response\n");
    for turn in turns {
        out.push_str(&format!(
            "{},{},{},{}\n",
            turn.id,
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            csv_field(&turn.user_message),
            csv_field(turn.assistant_response.as_deref().unwrap_or_default()),
        ));
    }
    out
}
