//! OpenRouter-compatible chat completion client.

use crate::config::Settings;
use anyhow::{anyhow, Context, Result};
use fxforge_core::ports::{CompletionOptions, ModelClient, PortFuture};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Rate limit retry configuration
pub const MAX_RETRIES: u32 = 3;
pub const INITIAL_BACKOFF_MS: u64 = 2000;
pub const BACKOFF_MULTIPLIER: u64 = 2;
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

/// Truncate a string for display (Unicode-safe)
fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

/// Structured output with a JSON schema
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<JsonSchemaWrapper>,
}

#[derive(Serialize)]
struct JsonSchemaWrapper {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Can be null when the provider refuses or errors
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenRouter error body (can come with a 200 status for upstream errors)
#[derive(Deserialize)]
struct OpenRouterError {
    error: OpenRouterApiError,
}

#[derive(Deserialize)]
struct OpenRouterApiError {
    message: String,
    #[serde(default)]
    code: Option<i32>,
}

/// Extract a retry-after hint from an error body, if any.
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    if let Some(pos) = text_lower.find("retry") {
        let after_retry = &text_lower[pos..];
        for word in after_retry.split_whitespace().skip(1).take(5) {
            if let Ok(secs) = word.trim_matches(|c: char| !c.is_numeric()).parse::<u64>() {
                if secs > 0 && secs < 300 {
                    return Some(secs);
                }
            }
        }
    }
    None
}

fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let ms = INITIAL_BACKOFF_MS.saturating_mul(factor);
    (ms / 1000).max(1)
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn map_timeout_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        anyhow!("Model request timed out. Please try again.")
    } else if err.is_connect() {
        anyhow!("Could not connect to the model service. Check your network and try again.")
    } else {
        err.into()
    }
}

/// Create a configured HTTP client for model requests
fn create_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))
}

fn build_request(model: &str, prompt: &str, options: &CompletionOptions) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &options.system {
        messages.push(Message {
            role: "system".to_string(),
            content: system.clone(),
        });
    }
    messages.push(Message {
        role: "user".to_string(),
        content: prompt.to_string(),
    });

    let response_format = options.json_schema.as_ref().map(|schema| ResponseFormat {
        format_type: "json_schema".to_string(),
        json_schema: Some(JsonSchemaWrapper {
            name: schema.name.clone(),
            strict: true,
            schema: schema.schema.clone(),
        }),
    });

    ChatRequest {
        model: model.to_string(),
        messages,
        max_tokens: options.max_tokens,
        stream: false,
        response_format,
    }
}

/// Pull the first choice's text out of a completion body.
fn parse_completion(text: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(text).context("Failed to parse model response")?;
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| anyhow!("Model returned no choices"))?;

    if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(anyhow!("Model refused the request: {}", truncate_str(&refusal, MAX_ERROR_CONTENT_LEN)));
    }
    match message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(anyhow!("Model returned empty content")),
    }
}

pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: create_http_client(REQUEST_TIMEOUT_SECS)?,
            api_key: api_key.into(),
            model: model.into(),
            url: url.into(),
        })
    }

    /// Client for `model` using the configured key and endpoint.
    pub fn from_settings(settings: &Settings, model: &str) -> Result<Self> {
        let api_key = settings
            .openrouter_api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY is not set"))?;
        Self::new(api_key, model, settings.openrouter_url.clone())
    }

    /// Send a request with automatic retry on transient failures.
    ///
    /// Retries network errors, 429 (honouring a retry-after hint), 5xx, and
    /// provider errors that arrive with a 200 status.
    async fn send_with_retry<T: Serialize>(&self, request_body: &T) -> Result<String> {
        let mut last_error = String::new();
        let mut retry_count = 0;

        while retry_count <= MAX_RETRIES {
            let response = match self
                .http
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("HTTP-Referer", "https://github.com/fxforge/fxforge")
                .header("X-Title", "fxforge")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(request_body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    last_error = err.to_string();
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        tracing::warn!(model = %self.model, retry_count, error = %err, "model request failed, retrying");
                        tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                        continue;
                    }
                    return Err(map_timeout_error(err));
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(err) => {
                    last_error = err.to_string();
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                        continue;
                    }
                    return Err(map_timeout_error(err));
                }
            };

            if status.is_success() {
                if let Ok(err_resp) = serde_json::from_str::<OpenRouterError>(&text) {
                    let is_retryable = err_resp
                        .error
                        .code
                        .map(|c| c >= 500 || c == 429)
                        .unwrap_or(true);

                    if is_retryable && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                        continue;
                    }

                    return Err(anyhow!(
                        "OpenRouter error: {}",
                        sanitize_api_response(&err_resp.error.message)
                    ));
                }

                return Ok(text);
            }

            last_error = sanitize_api_response(&text);

            if status.as_u16() == 429 && retry_count < MAX_RETRIES {
                retry_count += 1;
                let retry_after = parse_retry_after(&text).unwrap_or_else(|| backoff_secs(retry_count));
                tracing::warn!(model = %self.model, retry_after, "rate limited, backing off");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            if status.is_server_error() && retry_count < MAX_RETRIES {
                retry_count += 1;
                tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                continue;
            }

            let error_msg = match status.as_u16() {
                401 => "Invalid API key. Check OPENROUTER_API_KEY.".to_string(),
                429 => format!(
                    "Rate limited by OpenRouter after {} retries. Try again in a few minutes.",
                    retry_count
                ),
                500..=599 => format!(
                    "OpenRouter server error ({}). The service may be temporarily unavailable.",
                    status
                ),
                _ => format!("API error {}: {}", status, sanitize_api_response(&text)),
            };
            return Err(anyhow!("{}", error_msg));
        }

        Err(anyhow!("{}", last_error))
    }
}

impl ModelClient for OpenRouterClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete<'a>(&'a self, prompt: &'a str, options: &'a CompletionOptions) -> PortFuture<'a, String> {
        Box::pin(async move {
            let request = build_request(&self.model, prompt, options);
            tracing::debug!(
                model = %self.model,
                structured = request.response_format.is_some(),
                max_tokens = request.max_tokens,
                "model request"
            );
            let text = self.send_with_retry(&request).await?;
            parse_completion(&text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_without_schema() {
        let options = CompletionOptions::default().with_system("be terse").with_max_tokens(512);
        let value = serde_json::to_value(build_request("m/one", "hello", &options)).unwrap();
        assert_eq!(value["model"], "m/one");
        assert_eq!(value["max_tokens"], 512);
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hello");
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn test_request_with_schema_is_strict() {
        let schema = json!({"type": "object"});
        let options = CompletionOptions::default().with_schema("plugin_spec", schema.clone());
        let value = serde_json::to_value(build_request("m", "p", &options)).unwrap();
        assert_eq!(value["messages"].as_array().unwrap().len(), 1);
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["name"], "plugin_spec");
        assert_eq!(value["response_format"]["json_schema"]["strict"], true);
        assert_eq!(value["response_format"]["json_schema"]["schema"], schema);
    }

    #[test]
    fn test_parse_completion_content() {
        let body = r#"{"choices":[{"message":{"content":"```cpp\nx\n```"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "```cpp\nx\n```");
    }

    #[test]
    fn test_parse_completion_empty_is_an_error() {
        for body in [
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
            r#"{"choices":[]}"#,
        ] {
            assert!(parse_completion(body).is_err(), "{body}");
        }
    }

    #[test]
    fn test_parse_completion_refusal() {
        let body = r#"{"choices":[{"message":{"content":null,"refusal":"not allowed"}}]}"#;
        let err = parse_completion(body).unwrap_err();
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("Please retry after 12 seconds"), Some(12));
        assert_eq!(parse_retry_after("rate limited"), None);
        assert_eq!(parse_retry_after("retry in 900 seconds"), None);
    }

    #[test]
    fn test_backoff_grows() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(3), 8);
    }

    #[test]
    fn test_sanitize_redacts_keys() {
        assert_eq!(
            sanitize_api_response("invalid key sk-or-v1-abc"),
            "(response details redacted - may contain sensitive data)"
        );
        assert_eq!(sanitize_api_response("model not found"), "model not found");
        assert_eq!(sanitize_api_response(&"é".repeat(500)).chars().count(), MAX_ERROR_CONTENT_LEN);
    }

    #[test]
    fn test_error_body_shape() {
        let parsed: OpenRouterError =
            serde_json::from_str(r#"{"error":{"message":"upstream down","code":502}}"#).unwrap();
        assert_eq!(parsed.error.code, Some(502));
        assert_eq!(parsed.error.message, "upstream down");
    }

    #[test]
    fn test_from_settings_needs_key() {
        assert!(OpenRouterClient::from_settings(&Settings::default(), "m").is_err());
        let settings = Settings {
            openrouter_api_key: Some("sk-or-test".into()),
            ..Settings::default()
        };
        let client = OpenRouterClient::from_settings(&settings, "vendor/model").unwrap();
        assert_eq!(client.name(), "vendor/model");
    }
}
