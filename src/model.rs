//! Data carried between pipeline stages.
//!
//! Every value here lives for a single run: the request is built once from user
//! input, the extracted content and the assembled document are produced and
//! consumed by the stages in order, and nothing is cached between runs.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Container extension appended to the sanitized title.
pub const ARTIFACT_EXTENSION: &str = "epub";

/// Malformed request input. Raised before any stage runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Title cannot be empty.")]
    EmptyTitle,

    #[error("Author name cannot be empty.")]
    EmptyAuthor,

    #[error("Invalid URL: {input}: {reason}. Expected e.g. https://example.com/article")]
    InvalidUrl { input: String, reason: String },

    /// A collaborator cannot run at all, e.g. the rewrite credential is missing.
    #[error("Precondition failed: {0}")]
    Precondition(String),
}

/// What the user asked for: article metadata and where to find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRequest {
    pub title: String,
    pub author: String,
    pub url: String,
}

impl ArticleRequest {
    /// Build a request from raw input. Title, author and URL are trimmed; the URL must be absolute.
    pub fn new(
        title: impl AsRef<str>,
        author: impl AsRef<str>,
        url: impl AsRef<str>,
    ) -> Result<Self, ValidationError> {
        let request = Self {
            title: title.as_ref().trim().to_string(),
            author: author.as_ref().trim().to_string(),
            url: url.as_ref().trim().to_string(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the invariants. Requests built with struct syntax are re-checked by the pipeline.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.author.trim().is_empty() {
            return Err(ValidationError::EmptyAuthor);
        }
        Url::parse(self.url.trim()).map_err(|e| ValidationError::InvalidUrl {
            input: self.url.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Region of the rendered page chosen as the article body.
///
/// `text` is the inner text of exactly the markup in `html`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub html: String,
    pub text: String,
}

/// Final structure handed to the packaging collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledDocument {
    pub title: String,
    pub author: String,
    #[serde(rename = "bodyHtml")]
    pub body_html: String,
    /// Origin URL, used as the package identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// File name for the artifact of `title`: every non-alphanumeric character becomes `_`, lower-cased.
pub fn artifact_file_name(title: &str) -> String {
    let base: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.{}", base, ARTIFACT_EXTENSION)
}
