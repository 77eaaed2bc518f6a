//! Orchestrator: render, locate, rewrite, normalize, package.
//!
//! Stages run strictly in sequence and none is retried here. The first failure ends the run
//! with a [PipelineError] naming the stage; nothing is written to disk unless packaging
//! succeeds. A [Pipeline] keeps no state between runs.

use crate::epub::{Packager, PackagingError};
use crate::locate::locate;
use crate::model::{artifact_file_name, ArticleRequest, AssembledDocument, ValidationError};
use crate::normalize::normalize;
use crate::render::{Browser, NavigationError, RenderOptions, Renderer};
use crate::rewrite::{RewriteError, Rewriter};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "epub";

/// Pipeline stage. `Idle` covers request validation and preflight checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Rendering,
    Locating,
    Rewriting,
    Normalizing,
    Packaging,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Idle => "setup",
            Stage::Rendering => "rendering",
            Stage::Locating => "locating",
            Stage::Rewriting => "rewriting",
            Stage::Normalizing => "normalizing",
            Stage::Packaging => "packaging",
            Stage::Done => "done",
        })
    }
}

/// Observable state of a run. `Failed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Stage(Stage),
    Failed { stage: Stage, cause: String },
}

/// Cause of a failed stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),
}

/// A run that ended in [RunState::Failed].
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    fn at(stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Reports transitions to the observer and remembers the current stage.
struct Progress<'o> {
    observer: &'o dyn Fn(&RunState),
    stage: Stage,
}

impl<'o> Progress<'o> {
    fn new(observer: &'o dyn Fn(&RunState)) -> Self {
        observer(&RunState::Stage(Stage::Idle));
        Self {
            observer,
            stage: Stage::Idle,
        }
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(from = %self.stage, to = %stage, "stage transition");
        self.stage = stage;
        (self.observer)(&RunState::Stage(stage));
    }

    fn fail(&self, error: &PipelineError) {
        (self.observer)(&RunState::Failed {
            stage: error.stage,
            cause: error.source.to_string(),
        });
    }
}

/// The article-to-EPUB pipeline over borrowed collaborators.
pub struct Pipeline<'a> {
    browser: &'a dyn Browser,
    rewriter: &'a dyn Rewriter,
    packager: &'a dyn Packager,
    render_options: RenderOptions,
    output_dir: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        rewriter: &'a dyn Rewriter,
        packager: &'a dyn Packager,
    ) -> Self {
        Self {
            browser,
            rewriter,
            packager,
            render_options: RenderOptions::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }

    pub fn render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options;
        self
    }

    /// Directory the artifact is written into. Default `epub`.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Where a run for `request` would write its artifact.
    pub fn artifact_path(&self, request: &ArticleRequest) -> PathBuf {
        artifact_path(&self.output_dir, request)
    }

    /// Run the pipeline and return the artifact location.
    pub fn run(&self, request: &ArticleRequest) -> Result<PathBuf, PipelineError> {
        self.run_with(request, &|_| {})
    }

    /// Like [Pipeline::run], reporting every state transition to `observer`.
    pub fn run_with(
        &self,
        request: &ArticleRequest,
        observer: &dyn Fn(&RunState),
    ) -> Result<PathBuf, PipelineError> {
        let mut progress = Progress::new(observer);
        match self.execute(request, &mut progress) {
            Ok(path) => {
                progress.enter(Stage::Done);
                Ok(path)
            }
            Err(e) => {
                tracing::error!(stage = %e.stage, error = %e.source, "run failed");
                progress.fail(&e);
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        request: &ArticleRequest,
        progress: &mut Progress<'_>,
    ) -> Result<PathBuf, PipelineError> {
        request
            .validate()
            .map_err(|e| PipelineError::at(Stage::Idle, e))?;
        self.rewriter.preflight().map_err(|e| {
            PipelineError::at(Stage::Idle, ValidationError::Precondition(e.to_string()))
        })?;

        progress.enter(Stage::Rendering);
        let page = Renderer::new(self.browser, self.render_options)
            .render(request.url.trim())
            .map_err(|e| PipelineError::at(Stage::Rendering, e))?;

        progress.enter(Stage::Locating);
        let content = locate(&page);
        page.close();

        progress.enter(Stage::Rewriting);
        let markdown = self
            .rewriter
            .rewrite(&content)
            .map_err(|e| PipelineError::at(Stage::Rewriting, e))?;

        progress.enter(Stage::Normalizing);
        let body_html = normalize(&markdown);

        progress.enter(Stage::Packaging);
        let document = AssembledDocument {
            title: request.title.trim().to_string(),
            author: request.author.trim().to_string(),
            body_html,
            source_url: Some(request.url.trim().to_string()),
        };
        let path = self.artifact_path(request);
        self.packager
            .package(&document, &path)
            .map_err(|e| PipelineError::at(Stage::Packaging, e))?;
        Ok(path)
    }
}

fn artifact_path(output_dir: &Path, request: &ArticleRequest) -> PathBuf {
    output_dir.join(artifact_file_name(request.title.trim()))
}
