//! articlepub: turn a web article into an EPUB.
//!
//! Render the page, locate the article body, rewrite it to restricted markdown, normalize
//! that to XHTML and package it.

pub mod cli;
pub mod config;
pub mod epub;
pub mod locate;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod rewrite;

// Re-exports for CLI and consumers.
pub use epub::{EpubPackager, EpubVersion, Packager, PackagingError};
pub use locate::{locate, locate_html};
pub use model::{ArticleRequest, AssembledDocument, ExtractedContent, ValidationError};
pub use normalize::normalize;
pub use pipeline::{Pipeline, PipelineError, RunState, Stage, StageError};
#[cfg(feature = "chrome")]
pub use render::ChromeBrowser;
pub use render::{Browser, HttpBrowser, NavigationError, RenderOptions, Renderer, Session};
pub use rewrite::{OpenAiRewriter, RewriteError, Rewriter};
