//! Rewrite collaborator: turns extracted page HTML into restricted markdown.

pub mod openai;

pub use openai::{OpenAiRewriter, OpenAiRewriterBuilder};

use crate::model::ExtractedContent;
use thiserror::Error;

/// System message sent with every rewrite request.
pub const SYSTEM_PROMPT: &str =
    "You are an expert at converting HTML to clean, readable Markdown format.";

const INSTRUCTIONS: &str = "You are a content converter. Convert the following HTML content into clean, well-formatted Markdown.

Instructions:
- Extract only the main article content, ignore navigation, headers, footers, ads, etc.
- Preserve headings, paragraphs, lists, links, and emphasis
- Remove any HTML tags not needed for content
- Format code blocks properly if present
- Keep images with their alt text
- Output only the Markdown, no additional commentary";

/// Errors from the rewrite service.
///
/// `Auth`, `EmptyResult` and `Service` are the service's own failure kinds. Transport
/// failures are `Service` with the underlying error as source. `MissingCredential` is raised
/// before any request is made.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("No API key configured for the rewrite service ({hint}).")]
    MissingCredential { hint: String },

    #[error("Invalid API key for the rewrite service: {message}")]
    Auth { message: String },

    #[error("No markdown content received from the rewrite service.")]
    EmptyResult,

    #[error("Rewrite service failed: {message}")]
    Service {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },
}

impl RewriteError {
    pub fn service(message: impl Into<String>) -> Self {
        RewriteError::Service {
            message: message.into(),
            source: None,
        }
    }

    /// The request never produced a usable response.
    pub fn transport(source: reqwest::Error) -> Self {
        let message = if source.is_timeout() {
            "request timed out".to_string()
        } else {
            "could not reach the service".to_string()
        };
        RewriteError::Service {
            message,
            source: Some(source),
        }
    }
}

/// Anything that can rewrite extracted content into restricted markdown.
pub trait Rewriter {
    /// Checked before any page is rendered. Fails when the service cannot be used at all.
    fn preflight(&self) -> Result<(), RewriteError> {
        Ok(())
    }

    fn rewrite(&self, content: &ExtractedContent) -> Result<String, RewriteError>;
}

/// User message for `content`: the instructions followed by the extracted HTML.
pub fn instruction_payload(content: &ExtractedContent) -> String {
    format!("{}\n\nHTML Content:\n{}", INSTRUCTIONS, content.html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_ends_with_extracted_html() {
        let content = ExtractedContent {
            html: "<p>Body</p>".to_string(),
            text: "Body".to_string(),
        };
        let payload = instruction_payload(&content);
        assert!(payload.starts_with("You are a content converter."));
        assert!(payload.contains("Keep images with their alt text"));
        assert!(payload.ends_with("HTML Content:\n<p>Body</p>"));
    }

    #[test]
    fn error_messages_are_human_readable() {
        assert_eq!(
            RewriteError::EmptyResult.to_string(),
            "No markdown content received from the rewrite service."
        );
        let auth = RewriteError::Auth {
            message: "Incorrect API key provided".into(),
        };
        assert!(auth.to_string().starts_with("Invalid API key"));
    }

    #[test]
    fn plain_service_error_has_no_source() {
        use std::error::Error;
        let e = RewriteError::service("HTTP 502");
        assert_eq!(e.to_string(), "Rewrite service failed: HTTP 502");
        assert!(e.source().is_none());
    }
}
