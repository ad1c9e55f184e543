//! Minimal chat-completions client shared by the vision gateway and the
//! delegated compliance evaluator.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("unable to reach {0}")]
    Connection(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("http client error: {0}")]
    Http(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Response(String),
}

/// Settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

/// Options for one structured completion.
#[derive(Debug, Clone)]
pub struct StructuredRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user_content: Value,
    pub schema_name: &'a str,
    pub schema: Value,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    response_format: Value,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| LlmError::Http(err.to_string()))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key,
            timeout: settings.timeout,
            http,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Run a chat completion constrained to `schema` and return the raw JSON text.
    pub async fn complete_structured(
        &self,
        request: StructuredRequest<'_>,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: request.model,
            messages: vec![
                json!({ "role": "system", "content": request.system }),
                json!({ "role": "user", "content": request.user_content }),
            ],
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema,
                }
            }),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut builder = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_connect() {
                LlmError::Connection(self.base_url.clone())
            } else if err.is_timeout() {
                LlmError::Timeout(self.timeout)
            } else {
                LlmError::Http(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Response(err.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Response("completion had no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = LlmClient::new(LlmSettings {
            base_url: "https://api.example.test/v1/".to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
        })
        .expect("client builds");
        assert_eq!(client.base_url, "https://api.example.test/v1");
        assert!(!client.is_configured());
    }

    #[test]
    fn chat_response_content_is_extracted() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"{\"ok\":true}"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).expect("response parses");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"ok\":true}")
        );
    }
}
