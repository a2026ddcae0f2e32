//! Chat-completions transport.
//!
//! One HTTP client against an OpenAI-compatible endpoint: Bearer auth,
//! forced JSON output, optional image part, 60 s deadline and rate-limit
//! retries with parsed back-off hints.

use crate::error::{LlmError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 60;
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

static RETRY_AFTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"in ([\d.]+)(m|s)").expect("valid retry-after regex"));

/// Token usage reported by one API call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    /// Prompt tokens consumed
    pub prompt_tokens: u64,
    /// Completion tokens generated
    pub completion_tokens: u64,
}

/// User-turn content: text, optionally with a screenshot attached.
#[derive(Debug, Clone)]
pub enum UserContent {
    /// Plain text prompt
    Text(String),
    /// Text plus a full-page PNG screenshot (base64, no data-URL prefix)
    TextWithImage {
        /// The prompt text
        text: String,
        /// Base64-encoded PNG bytes
        png_base64: String,
    },
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Parse the back-off hint from a 429 body ("Please try again in 20s" /
/// "in 1.5m"). Returns seconds.
#[must_use]
pub fn parse_retry_after(body: &str) -> Option<f64> {
    let captures = RETRY_AFTER_RE.captures(body)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    let seconds = match captures.get(2)?.as_str() {
        "m" => value * 60.0,
        _ => value,
    };
    Some(seconds + 2.0)
}

/// Extract the first JSON object from model output, tolerating wrapping
/// prose.
///
/// # Errors
/// Returns [`LlmError::Parse`] when no object can be recovered.
pub fn parse_json_content(content: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(content) {
        if value.is_object() {
            return Ok(value);
        }
    }
    if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&content[start..=end]) {
                if value.is_object() {
                    return Ok(value);
                }
            }
        }
    }
    let preview: String = content.chars().take(200).collect();
    Err(LlmError::Parse(format!("not a JSON object: {preview}")))
}

/// Chat-completions client bound to one model.
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl ChatClient {
    /// Create a client for the given API key and model.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created or the key is a
    /// placeholder.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() || api_key.starts_with("YOUR_") || api_key.starts_with("sk-your") {
            return Err(LlmError::InvalidApiKey(
                "API key not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(LlmError::Network)?;
        Ok(Self {
            http,
            api_key,
            model: model.into(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        })
    }

    /// Override the endpoint (tests, compatible gateways).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// The model this client is bound to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_payload(&self, system: &str, content: &UserContent) -> Value {
        let user_message = match content {
            UserContent::Text(text) => json!({ "role": "user", "content": text }),
            UserContent::TextWithImage { text, png_base64 } => json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": text },
                    { "type": "image_url", "image_url": {
                        "url": format!("data:image/png;base64,{png_base64}"),
                        "detail": "high"
                    }}
                ]
            }),
        };
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                user_message
            ],
            "max_tokens": 1000,
            "temperature": 0.1,
            "response_format": { "type": "json_object" }
        })
    }

    /// Send one prompt and return the model's JSON object plus usage.
    ///
    /// Retries 429s up to 3 times honouring the body's back-off hint.
    /// 401/403 and quota exhaustion surface as fatal errors.
    ///
    /// # Errors
    /// Returns the mapped transport or parse error.
    pub async fn chat_json(&self, system: &str, content: &UserContent) -> Result<(Value, Usage)> {
        let payload = self.build_payload(system, content);
        let mut retries = 0u32;

        loop {
            let response = self
                .http
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        LlmError::Timeout {
                            seconds: REQUEST_TIMEOUT_SECS,
                        }
                    } else {
                        LlmError::Network(e)
                    }
                })?;

            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();

            match status {
                200 => return Self::parse_success_body(&body),
                429 => {
                    if body.contains("exceeded your current quota") {
                        return Err(LlmError::QuotaExceeded(truncate(&body, 200)));
                    }
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(LlmError::RateLimitExceeded(truncate(&body, 200)));
                    }
                    let wait = parse_retry_after(&body).unwrap_or(f64::from(10 * retries));
                    tracing::warn!(
                        "Rate limited (retry {retries}/{MAX_RATE_LIMIT_RETRIES}), waiting {wait:.0}s"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                }
                401 => return Err(LlmError::InvalidApiKey(truncate(&body, 200))),
                403 => return Err(LlmError::AccessDenied(truncate(&body, 200))),
                status => {
                    return Err(LlmError::Api {
                        status,
                        message: truncate(&body, 200),
                    })
                }
            }
        }
    }

    fn parse_success_body(body: &str) -> Result<(Value, Usage)> {
        let response: ApiResponse = serde_json::from_str(body)
            .map_err(|e| LlmError::Parse(format!("invalid API response: {e}")))?;
        let usage = response.usage.map_or(Usage::default(), |u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;
        let value = parse_json_content(&content)?;
        Ok((value, usage))
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(
            parse_retry_after("Rate limit reached. Please try again in 20s."),
            Some(22.0)
        );
        assert_eq!(
            parse_retry_after("Please try again in 1.5m."),
            Some(92.0)
        );
        assert_eq!(parse_retry_after("try later"), None);
    }

    #[test]
    fn test_parse_json_content_plain() {
        let value = parse_json_content(r#"{"action": "complete"}"#).expect("parse");
        assert_eq!(value["action"], "complete");
    }

    #[test]
    fn test_parse_json_content_wrapped() {
        let value =
            parse_json_content("Here you go: {\"action\": \"click\"} hope that helps").expect("parse");
        assert_eq!(value["action"], "click");
    }

    #[test]
    fn test_parse_json_content_garbage() {
        assert!(parse_json_content("no json here").is_err());
        assert!(parse_json_content("[1,2,3]").is_err());
    }

    #[test]
    fn test_placeholder_keys_rejected() {
        assert!(ChatClient::new("", "gpt-4o-mini").is_err());
        assert!(ChatClient::new("sk-your-key-here", "gpt-4o-mini").is_err());
        assert!(ChatClient::new("YOUR_KEY", "gpt-4o-mini").is_err());
        assert!(ChatClient::new("sk-real", "gpt-4o-mini").is_ok());
    }

    #[test]
    fn test_payload_shape() {
        let client = ChatClient::new("sk-test", "gpt-4o-mini").expect("client");
        let payload = client.build_payload("sys", &UserContent::Text("hello".into()));
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["max_tokens"], 1000);
        assert_eq!(payload["response_format"]["type"], "json_object");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_payload_with_image() {
        let client = ChatClient::new("sk-test", "gpt-4o-mini").expect("client");
        let payload = client.build_payload(
            "sys",
            &UserContent::TextWithImage {
                text: "look".into(),
                png_base64: "QUJD".into(),
            },
        );
        let parts = payload["messages"][1]["content"]
            .as_array()
            .expect("multipart content");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .expect("url")
            .starts_with("data:image/png;base64,QUJD"));
        assert_eq!(parts[1]["image_url"]["detail"], "high");
    }

    #[test]
    fn test_parse_success_body() {
        let body = r#"{
            "choices": [{"message": {"content": "{\"action\": \"fill_field\"}"}}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20}
        }"#;
        let (value, usage) = ChatClient::parse_success_body(body).expect("parse");
        assert_eq!(value["action"], "fill_field");
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.completion_tokens, 20);
    }
}
