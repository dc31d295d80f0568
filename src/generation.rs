//! Answer generation over an OpenAI-compatible chat-completions API.
//!
//! The default endpoint is Groq (`llama-3.1-8b-instant`, temperature 0.2);
//! any server speaking `POST {base_url}/chat/completions` works. Nothing here
//! retries: a failed generation surfaces immediately as
//! [`RagError::GenerationFailed`] with a [`GenerationErrorKind`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::error::{GenerationErrorKind, RagError, Result};

/// Turns a grounded prompt into an answer.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a reply to `prompt`, with `system` as the system message.
    async fn generate(&self, prompt: &str, system: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    /// Build a client from configuration, reading the credential from the
    /// environment variable named by `api_key_env`.
    ///
    /// A missing or empty credential is an error: the assistant cannot answer
    /// anything without it.
    pub fn from_config(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "{} environment variable not set; the generation provider needs a credential",
                    config.api_key_env
                )
            })?;

        Self::new(
            &config.base_url,
            api_key,
            config.model.clone(),
            config.temperature,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl GenerationClient for ChatCompletionsClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, system: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, model = %self.model, "generation request failed");
            return Err(classify_failure(status.as_u16(), &text, &self.model));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            RagError::generation(
                GenerationErrorKind::ModelUnavailable,
                format!("unreadable completion response: {}", e),
            )
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                RagError::generation(
                    GenerationErrorKind::ModelUnavailable,
                    "completion response contained no message",
                )
            })
    }
}

fn transport_error(err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::generation(GenerationErrorKind::Timeout, "generation request timed out")
    } else {
        RagError::generation(
            GenerationErrorKind::ModelUnavailable,
            format!("cannot reach generation provider: {}", err),
        )
    }
}

/// Pull `error.message` (and `error.code`) out of an error payload.
fn provider_error(body: &str) -> Option<(String, Option<String>)> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    let message = error.get("message")?.as_str()?.to_string();
    let code = error
        .get("code")
        .and_then(|c| c.as_str())
        .map(str::to_string);
    Some((message, code))
}

/// Map an unsuccessful HTTP response to a generation error.
///
/// The provider's own `error.message` is used when the body is parseable,
/// otherwise the raw body. Decommissioned or unknown models get a fixed
/// explanation instead.
pub(crate) fn classify_failure(status: u16, body: &str, model: &str) -> RagError {
    let parsed = provider_error(body);
    let code = parsed.as_ref().and_then(|(_, c)| c.as_deref());

    let model_gone = status == 404
        || matches!(code, Some("model_decommissioned") | Some("model_not_found"));
    if model_gone {
        return RagError::generation(
            GenerationErrorKind::ModelUnavailable,
            format!(
                "the model '{}' has been decommissioned or does not exist; \
                 update generation.model to a currently supported model",
                model
            ),
        );
    }

    let message = match parsed {
        Some((message, _)) => message,
        None if body.trim().is_empty() => format!("provider returned HTTP {}", status),
        None => body.trim().to_string(),
    };

    let kind = match status {
        429 => GenerationErrorKind::RateLimited,
        408 | 504 => GenerationErrorKind::Timeout,
        400 | 401 | 403 | 413 | 422 => GenerationErrorKind::InvalidRequest,
        _ => GenerationErrorKind::ModelUnavailable,
    };
    RagError::generation(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(err: RagError) -> GenerationErrorKind {
        match err {
            RagError::GenerationFailed { kind, .. } => kind,
            other => panic!("not a generation error: {other:?}"),
        }
    }

    #[test]
    fn test_rate_limit_uses_provider_message() {
        let body = r#"{"error":{"message":"Rate limit reached for model","type":"tokens"}}"#;
        let err = classify_failure(429, body, "llama-3.1-8b-instant");
        assert!(err.to_string().contains("Rate limit reached for model"));
        assert_eq!(kind_of(err), GenerationErrorKind::RateLimited);
    }

    #[test]
    fn test_decommissioned_model_gets_fixed_message() {
        let body = r#"{"error":{"message":"The model `llama3-8b-8192` has been decommissioned","code":"model_decommissioned"}}"#;
        let err = classify_failure(400, body, "llama3-8b-8192");
        assert!(err.to_string().contains("update generation.model"));
        assert_eq!(kind_of(err), GenerationErrorKind::ModelUnavailable);
    }

    #[test]
    fn test_unparseable_body_is_surfaced_raw() {
        let err = classify_failure(502, "upstream exploded", "m");
        assert!(err.to_string().contains("upstream exploded"));
        assert_eq!(kind_of(err), GenerationErrorKind::ModelUnavailable);
    }

    #[test]
    fn test_bad_request_is_invalid() {
        let body = r#"{"error":{"message":"messages: too long"}}"#;
        assert_eq!(
            kind_of(classify_failure(400, body, "m")),
            GenerationErrorKind::InvalidRequest
        );
    }

    #[test]
    fn test_from_config_requires_credential() {
        let config = GenerationConfig {
            api_key_env: "SURIEL_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        };
        let err = ChatCompletionsClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("SURIEL_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
