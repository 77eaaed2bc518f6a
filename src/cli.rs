//! CLI parsing and orchestration. Parses args, merges config, runs the article pipeline and maps errors to exit codes.

use crate::config::{self, Config};
use crate::epub::{EpubPackager, EpubVersion};
use crate::model::{ArticleRequest, ValidationError};
use crate::pipeline::{Pipeline, PipelineError, RunState, Stage, DEFAULT_OUTPUT_DIR};
use crate::render::{
    Browser, HttpBrowser, RenderOptions, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_SETTLE,
};
use crate::rewrite::OpenAiRewriter;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the rewrite service credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{var} not found in environment variables. Set it to your OpenAI API key, e.g. {var}=sk-...")]
    MissingCredential { var: &'static str },

    #[error("{0}")]
    Request(#[from] ValidationError),

    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

impl CliRunError {
    /// Every failure exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_)
            | CliRunError::MissingCredential { .. }
            | CliRunError::Request(_)
            | CliRunError::Pipeline(_) => 1,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "articlepub")]
#[command(about = "Turn a web article into an EPUB")]
#[command(
    after_help = "Requires OPENAI_API_KEY in the environment. Config file keys (output_dir, user_agent, renderer, chrome_executable, no_sandbox, navigation_timeout_secs, settle_millis, model, api_base, epub_version, ncx, toc_page) are read from ./articlepub.toml or the user config dir. CLI flags override config."
)]
pub struct Args {
    /// Article title (also names the output file).
    #[arg(long)]
    pub title: String,

    /// Author name.
    #[arg(long)]
    pub author: String,

    /// Article URL (absolute, e.g. https://example.com/article).
    #[arg(long)]
    pub url: String,

    /// Output directory. Default: ./epub
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Generate EPUB 2 instead of EPUB 3.
    #[arg(long)]
    pub epub_2: bool,

    /// Include toc.ncx in EPUB 3 output for legacy readers.
    #[arg(long)]
    pub ncx: bool,

    /// Insert a visible table-of-contents page.
    #[arg(long)]
    pub toc_page: bool,

    /// Navigation timeout per attempt in seconds (default 60).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Pause after the page loads, in milliseconds (default 2000).
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Chat model for the rewrite step (default gpt-5-mini).
    #[arg(long)]
    pub model: Option<String>,

    /// HTTP User-Agent for page loads (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Rendering engine. Default: chrome when built with it, else http.
    #[arg(long, value_enum)]
    pub renderer: Option<Engine>,

    /// Chrome or Chromium binary for the chrome renderer.
    #[arg(long)]
    pub chrome_path: Option<PathBuf>,

    /// Run Chromium without its sandbox (e.g. as root in a container).
    #[arg(long)]
    pub no_sandbox: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and full error chain.
    #[arg(long)]
    pub verbose: bool,
}

/// Page rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Headless Chromium; runs page scripts.
    Chrome,
    /// Plain HTTP fetch of the served document.
    Http,
}

impl Engine {
    fn default_for_build() -> Self {
        if cfg!(feature = "chrome") {
            Engine::Chrome
        } else {
            Engine::Http
        }
    }
}

/// Effective settings after merging flags, config and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub render: RenderOptions,
    pub engine: Engine,
    pub chrome_executable: Option<PathBuf>,
    pub sandbox: bool,
    pub user_agent: Option<String>,
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub packager: EpubPackager,
}

fn parse_epub_version(s: &str) -> Result<EpubVersion, String> {
    match s.trim().to_lowercase().as_str() {
        "3" | "epub3" => Ok(EpubVersion::Epub3),
        "2" | "epub2" => Ok(EpubVersion::Epub2),
        _ => Err(format!(
            "Invalid epub_version value: '{}'. Use \"3\" or \"2\".",
            s
        )),
    }
}

fn parse_engine(s: &str) -> Result<Engine, String> {
    Engine::from_str(s.trim(), true).map_err(|_| {
        format!(
            "Invalid renderer value: '{}'. Use \"chrome\" or \"http\".",
            s
        )
    })
}

/// Flags win over config; config wins over built-in defaults.
pub fn resolve_settings(args: &Args, config: Option<&Config>) -> Result<Settings, String> {
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| config.and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let navigation_timeout = args
        .timeout
        .or_else(|| config.and_then(|c| c.navigation_timeout_secs))
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT);
    let settle = args
        .settle_ms
        .or_else(|| config.and_then(|c| c.settle_millis))
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_SETTLE);
    let version = if args.epub_2 {
        EpubVersion::Epub2
    } else {
        match config.and_then(|c| c.epub_version.as_deref()) {
            Some(v) => parse_epub_version(v)?,
            None => EpubVersion::Epub3,
        }
    };
    let engine = match (args.renderer, config.and_then(|c| c.renderer.as_deref())) {
        (Some(engine), _) => engine,
        (None, Some(name)) => parse_engine(name)?,
        (None, None) => Engine::default_for_build(),
    };
    Ok(Settings {
        output_dir,
        render: RenderOptions {
            navigation_timeout,
            settle,
        },
        engine,
        chrome_executable: args
            .chrome_path
            .clone()
            .or_else(|| config.and_then(|c| c.chrome_executable.clone())),
        sandbox: !(args.no_sandbox || config.and_then(|c| c.no_sandbox).unwrap_or(false)),
        user_agent: args
            .user_agent
            .clone()
            .or_else(|| config.and_then(|c| c.user_agent.clone())),
        model: args
            .model
            .clone()
            .or_else(|| config.and_then(|c| c.model.clone())),
        api_base: config.and_then(|c| c.api_base.clone()),
        packager: EpubPackager {
            version,
            include_ncx: args.ncx || config.and_then(|c| c.ncx).unwrap_or(false),
            include_toc_page: args.toc_page || config.and_then(|c| c.toc_page).unwrap_or(false),
        },
    })
}

fn build_browser(settings: &Settings) -> Result<Box<dyn Browser>, CliRunError> {
    match settings.engine {
        Engine::Http => {
            let mut browser = HttpBrowser::builder();
            if let Some(ua) = settings.user_agent.clone() {
                browser = browser.user_agent(ua);
            }
            Ok(Box::new(browser.build()))
        }
        Engine::Chrome => chrome_browser(settings),
    }
}

#[cfg(feature = "chrome")]
fn chrome_browser(settings: &Settings) -> Result<Box<dyn Browser>, CliRunError> {
    let mut browser = crate::render::ChromeBrowser::builder().sandbox(settings.sandbox);
    if let Some(path) = settings.chrome_executable.clone() {
        browser = browser.executable(path);
    }
    if let Some(ua) = settings.user_agent.clone() {
        browser = browser.user_agent(ua);
    }
    Ok(Box::new(browser.build()))
}

#[cfg(not(feature = "chrome"))]
fn chrome_browser(_: &Settings) -> Result<Box<dyn Browser>, CliRunError> {
    Err(CliRunError::InvalidInput(
        "This build has no chrome renderer. Rebuild with --features chrome or use --renderer http."
            .to_string(),
    ))
}

fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::Idle => "Checking article details",
        Stage::Rendering => "Opening page and loading content",
        Stage::Locating => "Extracting article content",
        Stage::Rewriting => "Converting content to Markdown",
        Stage::Normalizing => "Converting Markdown to HTML",
        Stage::Packaging => "Generating EPUB file",
        Stage::Done => "EPUB file created",
    }
}

fn spinner(quiet: bool) -> Option<indicatif::ProgressBar> {
    if quiet {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::default_spinner()
            .template("{spinner} {msg} ({elapsed})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

/// Entry point for the CLI. `api_key` is the value of [API_KEY_ENV], if set.
pub fn run(args: &Args, api_key: Option<String>) -> Result<PathBuf, CliRunError> {
    let api_key = api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(CliRunError::MissingCredential { var: API_KEY_ENV })?;

    let request = ArticleRequest::new(&args.title, &args.author, &args.url)?;

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;
    let settings = resolve_settings(args, config.as_ref()).map_err(CliRunError::InvalidInput)?;

    let browser = build_browser(&settings)?;

    let mut rewriter = OpenAiRewriter::builder(api_key);
    if let Some(model) = settings.model.clone() {
        rewriter = rewriter.model(model);
    }
    if let Some(base) = settings.api_base.clone() {
        rewriter = rewriter.api_base(base);
    }
    let rewriter = rewriter
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let pipeline = Pipeline::new(browser.as_ref(), &rewriter, &settings.packager)
        .render_options(settings.render)
        .output_dir(settings.output_dir.clone());

    let progress = spinner(args.quiet);
    let observer = |state: &RunState| {
        if let Some(pb) = &progress {
            match state {
                RunState::Stage(stage) => pb.set_message(stage_message(*stage)),
                RunState::Failed { stage, .. } => pb.abandon_with_message(format!(
                    "Failed while {}",
                    stage_message(*stage).to_lowercase()
                )),
            }
        }
    };
    let result = pipeline.run_with(&request, &observer);
    if let Some(pb) = &progress {
        if result.is_ok() {
            pb.finish_with_message(stage_message(Stage::Done));
        }
    }
    let path = result?;

    if !args.quiet {
        eprintln!("Wrote {}", path.display());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec![
            "articlepub",
            "--title",
            "Test Post",
            "--author",
            "Jane Doe",
            "--url",
            "https://example.test/a",
        ];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_without_config() -> Result<(), String> {
        let s = resolve_settings(&args(&[]), None)?;
        assert_eq!(s.output_dir, PathBuf::from("epub"));
        assert_eq!(s.render.navigation_timeout, Duration::from_secs(60));
        assert_eq!(s.render.settle, Duration::from_millis(2000));
        assert_eq!(s.packager, EpubPackager::default());
        assert!(s.model.is_none());
        Ok(())
    }

    #[test]
    fn config_overrides_defaults_and_flags_override_config() -> Result<(), String> {
        let config: Config = toml::from_str(
            r#"
            output_dir = "books"
            navigation_timeout_secs = 30
            settle_millis = 100
            model = "from-config"
            epub_version = "2"
            "#,
        )
        .map_err(|e| e.to_string())?;
        let s = resolve_settings(&args(&[]), Some(&config))?;
        assert_eq!(s.output_dir, PathBuf::from("books"));
        assert_eq!(s.render.navigation_timeout, Duration::from_secs(30));
        assert_eq!(s.render.settle, Duration::from_millis(100));
        assert_eq!(s.model.as_deref(), Some("from-config"));
        assert_eq!(s.packager.version, EpubVersion::Epub2);

        let s = resolve_settings(
            &args(&["-o", "out", "--timeout", "5", "--settle-ms", "0", "--model", "flag"]),
            Some(&config),
        )?;
        assert_eq!(s.output_dir, PathBuf::from("out"));
        assert_eq!(s.render.navigation_timeout, Duration::from_secs(5));
        assert_eq!(s.render.settle, Duration::ZERO);
        assert_eq!(s.model.as_deref(), Some("flag"));
        Ok(())
    }

    #[test]
    fn bad_epub_version_in_config_is_rejected() -> Result<(), toml::de::Error> {
        let config: Config = toml::from_str(r#"epub_version = "4""#)?;
        assert!(resolve_settings(&args(&[]), Some(&config)).is_err());
        Ok(())
    }

    #[test]
    fn parse_epub_version_values() {
        assert_eq!(parse_epub_version("3"), Ok(EpubVersion::Epub3));
        assert_eq!(parse_epub_version("EPUB2"), Ok(EpubVersion::Epub2));
        assert!(parse_epub_version("x").is_err());
    }

    #[test]
    fn renderer_resolution() -> Result<(), String> {
        let s = resolve_settings(&args(&[]), None)?;
        assert_eq!(s.engine, Engine::default_for_build());
        assert!(s.sandbox);

        let config: Config = toml::from_str(
            r#"
            renderer = "HTTP"
            chrome_executable = "/usr/bin/chromium"
            no_sandbox = true
            "#,
        )
        .map_err(|e| e.to_string())?;
        let s = resolve_settings(&args(&[]), Some(&config))?;
        assert_eq!(s.engine, Engine::Http);
        assert_eq!(s.chrome_executable, Some(PathBuf::from("/usr/bin/chromium")));
        assert!(!s.sandbox);

        let s = resolve_settings(
            &args(&["--renderer", "chrome", "--chrome-path", "/opt/chrome"]),
            Some(&config),
        )?;
        assert_eq!(s.engine, Engine::Chrome);
        assert_eq!(s.chrome_executable, Some(PathBuf::from("/opt/chrome")));
        Ok(())
    }

    #[test]
    fn unknown_renderer_in_config_is_rejected() -> Result<(), toml::de::Error> {
        let config: Config = toml::from_str(r#"renderer = "webkit""#)?;
        let err = resolve_settings(&args(&[]), Some(&config)).unwrap_err();
        assert!(err.contains("Invalid renderer value: 'webkit'"));
        Ok(())
    }

    #[test]
    fn http_engine_builds_without_a_browser_install() {
        let s = resolve_settings(&args(&["--renderer", "http"]), None);
        assert!(matches!(s.map(|s| build_browser(&s).is_ok()), Ok(true)));
    }

    #[test]
    fn packaging_flags() -> Result<(), String> {
        let s = resolve_settings(&args(&["--epub-2", "--ncx", "--toc-page"]), None)?;
        assert_eq!(s.packager.version, EpubVersion::Epub2);
        assert!(s.packager.include_ncx);
        assert!(s.packager.include_toc_page);
        Ok(())
    }

    #[test]
    fn missing_key_fails_before_anything_else() {
        let result = run(&args(&["-q"]), None);
        assert!(matches!(result, Err(CliRunError::MissingCredential { .. })));
        let result = run(&args(&["-q"]), Some("   ".to_string()));
        assert!(matches!(result, Err(CliRunError::MissingCredential { .. })));
    }

    #[test]
    fn invalid_url_is_a_request_error() {
        let a = Args::parse_from([
            "articlepub",
            "--title",
            "T",
            "--author",
            "A",
            "--url",
            "not a url",
        ]);
        let result = run(&a, Some("sk-test".to_string()));
        assert!(matches!(
            result,
            Err(CliRunError::Request(ValidationError::InvalidUrl { .. }))
        ));
    }

    #[test]
    fn every_failure_exits_with_one() {
        assert_eq!(CliRunError::InvalidInput("x".into()).exit_code(), 1);
        assert_eq!(
            CliRunError::MissingCredential { var: API_KEY_ENV }.exit_code(),
            1
        );
        assert_eq!(
            CliRunError::Request(ValidationError::EmptyTitle).exit_code(),
            1
        );
    }

    #[test]
    fn missing_credential_message_names_variable() {
        let msg = CliRunError::MissingCredential { var: API_KEY_ENV }.to_string();
        assert!(msg.starts_with("OPENAI_API_KEY not found"));
    }
}
