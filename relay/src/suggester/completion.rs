use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::protocol::{Suggestion, SuggestionSource};
use crate::suggester::{GenerationError, SuggestionEngine};

/// Greedy: first `{` through last `}`, across newlines.
pub(crate) const JSON_SPAN_PATTERN: &str = r"(?s)\{.*\}";

const SYSTEM_PROMPT: &str =
    "Return ONLY valid JSON with correctedText, replies, similarPhrases keys.";

/// Client for an OpenAI-style chat-completions endpoint.
pub struct CompletionSuggester {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
    json_span: Regex,
}

impl CompletionSuggester {
    pub fn new(config: &ModelConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .secret()
            .ok_or(GenerationError::MissingCredential)?
            .to_string();

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: Client::builder().build()?,
            json_span: Regex::new(JSON_SPAN_PATTERN)?,
        })
    }

    fn build_prompt(&self, text: &str) -> String {
        format!(
            r#"TEXT: "{text}"

Return a JSON object with these EXACT keys:
1. "correctedText": the text rewritten with correct spelling, grammar and punctuation
2. "replies": an array of exactly 3 short, casual reply options
3. "similarPhrases": an array of 2 alternative ways to say the same thing

Example for "helo cant meet today":
{{"correctedText": "Hello, can't meet today", "replies": ["No worries! Maybe tomorrow? 😊", "Got it, thanks for letting me know!", "Okay, another time then!"], "similarPhrases": ["Hi, unavailable today", "Hey, busy today"]}}

Keep it CLEAN and SIMPLE."#
        )
    }

    async fn complete(
        &self,
        system: &str,
        user: String,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let payload = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|error| GenerationError::InvalidJson(error.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(GenerationError::EmptyCompletion)
    }

    /// Sends a minimal completion to check that the credential is accepted.
    pub async fn verify(&self) -> Result<(), GenerationError> {
        self.complete("Reply with OK.", "test".to_string(), 5).await.map(|_| ())
    }
}

/// First `{` through last `}` of the model's reply, if any.
pub(crate) fn extract_json_object<'a>(pattern: &Regex, raw: &'a str) -> Option<&'a str> {
    pattern.find(raw).map(|found| found.as_str())
}

pub(crate) fn parse_suggestion(pattern: &Regex, raw: &str) -> Result<Suggestion, GenerationError> {
    let span = extract_json_object(pattern, raw).ok_or(GenerationError::NoJsonObject)?;
    let payload: ModelPayload = serde_json::from_str(span)
        .map_err(|error| GenerationError::InvalidJson(error.to_string()))?;

    let mut missing = Vec::new();
    if payload.corrected_text.is_none() {
        missing.push("correctedText");
    }
    if payload.replies.is_none() {
        missing.push("replies");
    }
    if payload.similar_phrases.is_none() {
        missing.push("similarPhrases");
    }
    let (Some(corrected_text), Some(replies), Some(similar_phrases)) =
        (payload.corrected_text, payload.replies, payload.similar_phrases)
    else {
        return Err(GenerationError::MissingKeys(missing));
    };

    let replies: Vec<String> = replies
        .into_iter()
        .map(|reply| reply.trim().to_string())
        .filter(|reply| !reply.is_empty())
        .take(3)
        .collect();
    if replies.len() < 3 {
        return Err(GenerationError::TooFewReplies(replies.len()));
    }

    Ok(Suggestion {
        corrected_text: corrected_text.trim().to_string(),
        replies,
        similar_phrases: similar_phrases
            .into_iter()
            .map(|phrase| phrase.trim().to_string())
            .filter(|phrase| !phrase.is_empty())
            .collect(),
    })
}

#[async_trait]
impl SuggestionEngine for CompletionSuggester {
    async fn suggest(&self, text: &str) -> Result<Suggestion, GenerationError> {
        let raw = self
            .complete(SYSTEM_PROMPT, self.build_prompt(text), self.max_tokens)
            .await?;
        parse_suggestion(&self.json_span, &raw)
    }

    fn source(&self) -> SuggestionSource {
        SuggestionSource::Completion
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPayload {
    #[serde(default, alias = "corrected_text")]
    corrected_text: Option<String>,
    #[serde(default, alias = "suggested_replies")]
    replies: Option<Vec<String>>,
    #[serde(default, alias = "similar_phrases")]
    similar_phrases: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use axum::{http::StatusCode, routing::post, Json, Router};

    fn span_pattern() -> Regex {
        Regex::new(JSON_SPAN_PATTERN).unwrap()
    }

    fn model_config(api_base: String) -> ModelConfig {
        ModelConfig {
            api_base,
            api_key: Credential::new("sk-test"),
            ..ModelConfig::default()
        }
    }

    async fn spawn_upstream(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let raw = "Sure! Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```\nEnjoy.";
        assert_eq!(
            extract_json_object(&span_pattern(), raw),
            Some("{\"a\": {\"b\": 1}}")
        );
    }

    #[test]
    fn no_braces_means_no_object() {
        assert_eq!(extract_json_object(&span_pattern(), "I cannot help with that."), None);
        assert!(matches!(
            parse_suggestion(&span_pattern(), "plain words"),
            Err(GenerationError::NoJsonObject)
        ));
    }

    #[test]
    fn parses_complete_payload() {
        let raw = r#"{"correctedText": " Hello, can't meet today ", "replies": ["a", "b", "c", "d"], "similarPhrases": ["x", " "]}"#;
        let suggestion = parse_suggestion(&span_pattern(), raw).unwrap();
        assert_eq!(suggestion.corrected_text, "Hello, can't meet today");
        assert_eq!(suggestion.replies, vec!["a", "b", "c"]);
        assert_eq!(suggestion.similar_phrases, vec!["x"]);
    }

    #[test]
    fn accepts_snake_case_keys() {
        let raw = r#"{"corrected_text": "Hi", "suggested_replies": ["a", "b", "c"], "similar_phrases": []}"#;
        let suggestion = parse_suggestion(&span_pattern(), raw).unwrap();
        assert_eq!(suggestion.corrected_text, "Hi");
    }

    #[test]
    fn reports_missing_keys() {
        let raw = r#"{"replies": ["a", "b", "c"]}"#;
        match parse_suggestion(&span_pattern(), raw) {
            Err(GenerationError::MissingKeys(keys)) => {
                assert_eq!(keys, vec!["correctedText", "similarPhrases"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_short_reply_list() {
        let raw = r#"{"correctedText": "Hi", "replies": ["a", ""], "similarPhrases": []}"#;
        assert!(matches!(
            parse_suggestion(&span_pattern(), raw),
            Err(GenerationError::TooFewReplies(1))
        ));
    }

    #[test]
    fn rejects_broken_json() {
        assert!(matches!(
            parse_suggestion(&span_pattern(), "{correctedText: nope}"),
            Err(GenerationError::InvalidJson(_))
        ));
    }

    #[test]
    fn requires_credential() {
        assert!(matches!(
            CompletionSuggester::new(&ModelConfig::default()),
            Err(GenerationError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn suggests_from_upstream_reply() {
        let content = r#"Here: {"correctedText": "Hello, can't meet today", "replies": ["No worries!", "Got it!", "Another time!"], "similarPhrases": ["Busy today"]}"#;
        let base = spawn_upstream(StatusCode::OK, chat_body(content)).await;
        let suggester = CompletionSuggester::new(&model_config(base)).unwrap();

        let suggestion = suggester.suggest("helo cant meet today").await.unwrap();
        assert_eq!(suggestion.corrected_text, "Hello, can't meet today");
        assert_eq!(suggestion.replies.len(), 3);
        assert!(suggester.verify().await.is_ok());
    }

    #[tokio::test]
    async fn surfaces_upstream_status() {
        let base = spawn_upstream(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({"error": {"message": "bad key"}}),
        )
        .await;
        let suggester = CompletionSuggester::new(&model_config(base)).unwrap();

        match suggester.suggest("hi").await {
            Err(GenerationError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
