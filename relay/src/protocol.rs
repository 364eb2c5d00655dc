use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestRequest {
    #[serde(default)]
    pub text: String,
}

/// What a suggestion engine produces for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub corrected_text: String,
    pub replies: Vec<String>,
    pub similar_phrases: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Completion,
    Substitution,
}

impl SuggestionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionSource::Completion => "completion",
            SuggestionSource::Substitution => "substitution",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    #[serde(flatten)]
    pub suggestion: Suggestion,
    pub original_text: String,
    pub success: bool,
    pub characters_processed: usize,
    pub source: SuggestionSource,
    pub first_reply: String,
    pub display_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SuggestResponse {
    pub fn new(original_text: String, suggestion: Suggestion, source: SuggestionSource) -> Self {
        let first_reply = suggestion.replies.first().cloned().unwrap_or_default();
        let display_text = render_display_text(&original_text, &suggestion);
        Self {
            characters_processed: original_text.chars().count(),
            original_text,
            success: true,
            source,
            first_reply,
            display_text,
            suggestion,
            note: None,
        }
    }
}

/// Multi-line summary meant to be shown as-is by the phone shortcut.
fn render_display_text(original: &str, suggestion: &Suggestion) -> String {
    let mut out = format!(
        "📤 Original: {original}\n\n✅ Corrected: {}\n\n💬 Reply Options:",
        suggestion.corrected_text
    );
    for reply in &suggestion.replies {
        out.push_str("\n• ");
        out.push_str(reply);
    }
    if !suggestion.similar_phrases.is_empty() {
        out.push_str("\n\n🔄 Similar Phrases:");
        for phrase in &suggestion.similar_phrases {
            out.push_str("\n• ");
            out.push_str(phrase);
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub success: bool,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            success: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub credential_configured: bool,
    pub backend: String,
    pub endpoints: BTreeMap<String, String>,
    pub usage: String,
}

pub const SERVICE_NAME: &str = "English Assistant API";

impl HealthResponse {
    pub fn new(credential_configured: bool, backend: &str) -> Self {
        let status = if credential_configured {
            "healthy"
        } else {
            "warning_no_key"
        };
        let endpoints = [
            ("POST /suggest", "Get replies + corrections"),
            ("POST /improve", "Alias of /suggest"),
            ("GET /health", "This health check"),
            ("GET /test", "Example response"),
            ("GET /", "Usage page"),
        ]
        .into_iter()
        .map(|(route, description)| (route.to_string(), description.to_string()))
        .collect();

        Self {
            status: status.to_string(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            credential_configured,
            backend: backend.to_string(),
            endpoints,
            usage: r#"Send POST to /suggest with {"text": "your message"}"#.to_string(),
        }
    }
}

/// Fixed payload served by `GET /test`; never touches an engine.
pub fn example_response() -> SuggestResponse {
    let suggestion = Suggestion {
        corrected_text: "Hello, can't meet today, sorry.".to_string(),
        replies: vec![
            "No worries! Maybe tomorrow? 😊".to_string(),
            "Got it, thanks for letting me know!".to_string(),
            "Okay, another time then!".to_string(),
        ],
        similar_phrases: vec![
            "Hi, unavailable today".to_string(),
            "Hey, busy today".to_string(),
        ],
    };
    let mut response = SuggestResponse::new(
        "helo cant meet today sorry".to_string(),
        suggestion,
        SuggestionSource::Substitution,
    );
    response.note = Some("This is a static example. Real API calls will vary.".to_string());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_suggest_request_without_text() {
        let request: SuggestRequest = serde_json::from_str("{}").unwrap();
        assert!(request.text.is_empty());
    }

    #[test]
    fn suggest_response_is_flat_camel_case() {
        let response = SuggestResponse::new(
            "hi".to_string(),
            Suggestion {
                corrected_text: "Hi".to_string(),
                replies: vec!["a".into(), "b".into(), "c".into()],
                similar_phrases: vec!["Hi!".into()],
            },
            SuggestionSource::Completion,
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["correctedText"], "Hi");
        assert_eq!(value["originalText"], "hi");
        assert_eq!(value["firstReply"], "a");
        assert_eq!(value["charactersProcessed"], 2);
        assert_eq!(value["source"], "completion");
        assert_eq!(value["replies"].as_array().unwrap().len(), 3);
        assert!(value.get("note").is_none());
    }

    #[test]
    fn display_text_lists_replies() {
        let example = example_response();
        assert!(example.display_text.starts_with("📤 Original: helo cant meet today sorry"));
        assert!(example.display_text.contains("• Okay, another time then!"));
        assert!(example.display_text.contains("🔄 Similar Phrases:"));
    }

    #[test]
    fn health_status_tracks_credential() {
        assert_eq!(HealthResponse::new(true, "completion").status, "healthy");
        assert_eq!(HealthResponse::new(false, "completion").status, "warning_no_key");
    }
}
