//! Chat-completions client for the rewrite step.

use super::{instruction_payload, RewriteError, Rewriter, SYSTEM_PROMPT};
use crate::model::ExtractedContent;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-5-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Blocking chat-completions rewriter.
#[derive(Debug)]
pub struct OpenAiRewriter {
    client: reqwest::blocking::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiRewriter {
    pub fn builder(api_key: impl Into<String>) -> OpenAiRewriterBuilder {
        OpenAiRewriterBuilder {
            api_key: api_key.into(),
            api_base: None,
            model: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

impl Rewriter for OpenAiRewriter {
    fn preflight(&self) -> Result<(), RewriteError> {
        if self.api_key.trim().is_empty() {
            return Err(RewriteError::MissingCredential {
                hint: "set OPENAI_API_KEY".to_string(),
            });
        }
        Ok(())
    }

    fn rewrite(&self, content: &ExtractedContent) -> Result<String, RewriteError> {
        self.preflight()?;
        let payload = instruction_payload(content);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &payload,
                },
            ],
        };
        tracing::debug!(model = %self.model, html_len = content.html.len(), "sending rewrite request");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.trim())
            .json(&request)
            .send()
            .map_err(RewriteError::transport)?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(RewriteError::transport)?;
        let markdown = interpret_response(status, &body)?;
        tracing::info!(chars = markdown.chars().count(), "markdown conversion complete");
        Ok(markdown)
    }
}

/// Map an HTTP status and body to markdown or a [RewriteError].
fn interpret_response(status: u16, body: &str) -> Result<String, RewriteError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", status));
        return Err(match status {
            401 | 403 => RewriteError::Auth { message },
            _ if message.contains("API key") => RewriteError::Auth { message },
            _ => RewriteError::service(message),
        });
    }
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| RewriteError::service(format!("unreadable response: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|s| !s.trim().is_empty())
        .ok_or(RewriteError::EmptyResult)
}

/// Builder for [OpenAiRewriter].
#[derive(Debug)]
pub struct OpenAiRewriterBuilder {
    api_key: String,
    api_base: Option<String>,
    model: Option<String>,
    timeout_secs: u64,
}

impl OpenAiRewriterBuilder {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Request timeout in seconds. Default 300.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<OpenAiRewriter, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;
        Ok(OpenAiRewriter {
            client,
            api_key: self.api_key,
            api_base: self
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_returns_first_choice_content() -> Result<(), RewriteError> {
        let body = r##"{"choices":[{"message":{"role":"assistant","content":"# Title\n\nBody"}}]}"##;
        assert_eq!(interpret_response(200, body)?, "# Title\n\nBody");
        Ok(())
    }

    #[test]
    fn missing_or_blank_content_is_empty_result() {
        assert!(matches!(
            interpret_response(200, r#"{"choices":[]}"#),
            Err(RewriteError::EmptyResult)
        ));
        assert!(matches!(
            interpret_response(200, r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(RewriteError::EmptyResult)
        ));
        assert!(matches!(
            interpret_response(200, r#"{"choices":[{"message":{"content":"  \n"}}]}"#),
            Err(RewriteError::EmptyResult)
        ));
    }

    #[test]
    fn unauthorized_is_auth_error_with_service_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided: sk-xxx","type":"invalid_request_error"}}"#;
        match interpret_response(401, body) {
            Err(RewriteError::Auth { message }) => assert!(message.contains("Incorrect API key")),
            other => panic!("expected Auth, got {:?}", other),
        }
    }

    #[test]
    fn other_failures_are_service_errors() {
        match interpret_response(500, "gateway exploded") {
            Err(RewriteError::Service { message, source }) => {
                assert_eq!(message, "HTTP 500");
                assert!(source.is_none());
            }
            other => panic!("expected Service, got {:?}", other),
        }
        assert!(matches!(
            interpret_response(200, "not json"),
            Err(RewriteError::Service { .. })
        ));
    }

    #[test]
    fn blank_key_fails_preflight() -> Result<(), reqwest::Error> {
        let rewriter = OpenAiRewriter::builder("  ").build()?;
        assert!(matches!(
            rewriter.preflight(),
            Err(RewriteError::MissingCredential { .. })
        ));
        let rewriter = OpenAiRewriter::builder("sk-test").build()?;
        assert!(rewriter.preflight().is_ok());
        Ok(())
    }

    #[test]
    fn builder_defaults_and_endpoint() -> Result<(), reqwest::Error> {
        let rewriter = OpenAiRewriter::builder("k")
            .api_base("http://localhost:8080/v1/")
            .build()?;
        assert_eq!(rewriter.model(), DEFAULT_MODEL);
        assert_eq!(rewriter.endpoint(), "http://localhost:8080/v1/chat/completions");
        Ok(())
    }
}
