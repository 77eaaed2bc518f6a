//! Optional TOML settings. `./articlepub.toml` wins over `<config dir>/articlepub/config.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Directory the EPUB is written into. Relative to CWD. Default `epub`.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent used when loading pages.
    pub user_agent: Option<String>,
    /// Rendering engine: "chrome" (default when built with it) or "http".
    pub renderer: Option<String>,
    /// Chrome or Chromium binary for the chrome renderer.
    pub chrome_executable: Option<PathBuf>,
    /// Run Chromium without its sandbox (needed as root in containers).
    pub no_sandbox: Option<bool>,
    /// Timeout for each navigation attempt, in seconds (default 60).
    pub navigation_timeout_secs: Option<u64>,
    /// Pause after navigation before the page is read, in milliseconds (default 2000).
    pub settle_millis: Option<u64>,
    /// Chat model used for the rewrite step.
    pub model: Option<String>,
    /// Base URL of the chat-completions API, e.g. https://api.openai.com/v1.
    pub api_base: Option<String>,
    /// "3" (default) or "2".
    pub epub_version: Option<String>,
    /// Include toc.ncx in EPUB 3 output.
    pub ncx: Option<bool>,
    /// Insert a visible table-of-contents page (default false).
    pub toc_page: Option<bool>,
}

/// Candidate config files, most specific first.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("articlepub.toml"));
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("articlepub").join("config.toml"));
    }
    paths
}

/// Load the first existing file from [search_paths]. No file at all is `Ok(None)`.
pub fn load_config() -> Result<Option<Config>, String> {
    load_first(&search_paths())
}

/// Parse the first of `paths` that exists. A present but unreadable or malformed file is an error.
pub fn load_first(paths: &[PathBuf]) -> Result<Option<Config>, String> {
    let Some(path) = paths.iter().find(|p| p.is_file()) else {
        return Ok(None);
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
    let config = toml::from_str::<Config>(&raw)
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let c: Config = toml::from_str("").unwrap();
        assert!(c.output_dir.is_none());
        assert!(c.user_agent.is_none());
        assert!(c.renderer.is_none());
        assert!(c.chrome_executable.is_none());
        assert!(c.no_sandbox.is_none());
        assert!(c.navigation_timeout_secs.is_none());
        assert!(c.settle_millis.is_none());
        assert!(c.model.is_none());
        assert!(c.api_base.is_none());
        assert!(c.epub_version.is_none());
        assert!(c.ncx.is_none());
        assert!(c.toc_page.is_none());
    }

    #[test]
    fn parse_full_config() {
        let s = r#"
            output_dir = "books"
            user_agent = "Custom/1.0"
            renderer = "http"
            chrome_executable = "/usr/bin/chromium"
            no_sandbox = true
            navigation_timeout_secs = 30
            settle_millis = 500
            model = "gpt-4o-mini"
            api_base = "http://localhost:8080/v1"
            epub_version = "2"
            ncx = true
            toc_page = true
        "#;
        let c: Config = toml::from_str(s).unwrap();
        assert_eq!(c.output_dir.as_deref(), Some(std::path::Path::new("books")));
        assert_eq!(c.user_agent.as_deref(), Some("Custom/1.0"));
        assert_eq!(c.renderer.as_deref(), Some("http"));
        assert_eq!(
            c.chrome_executable.as_deref(),
            Some(std::path::Path::new("/usr/bin/chromium"))
        );
        assert_eq!(c.no_sandbox, Some(true));
        assert_eq!(c.navigation_timeout_secs, Some(30));
        assert_eq!(c.settle_millis, Some(500));
        assert_eq!(c.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(c.api_base.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(c.epub_version.as_deref(), Some("2"));
        assert_eq!(c.ncx, Some(true));
        assert_eq!(c.toc_page, Some(true));
    }

    #[test]
    fn parse_partial_config() {
        let c: Config = toml::from_str("settle_millis = 0").unwrap();
        assert_eq!(c.settle_millis, Some(0));
        assert!(c.output_dir.is_none());
        assert!(c.model.is_none());
    }

    #[test]
    fn invalid_toml_errors() {
        assert!(toml::from_str::<Config>("output_dir = [").is_err());
    }

    #[test]
    fn load_first_skips_missing_files() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("nope.toml");
        let present = dir.path().join("config.toml");
        std::fs::write(&present, "model = \"local\"")?;
        let c = load_first(&[missing.clone(), present]).unwrap().unwrap();
        assert_eq!(c.model.as_deref(), Some("local"));
        assert!(load_first(&[missing]).unwrap().is_none());
        Ok(())
    }

    #[test]
    fn load_first_reports_malformed_file() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("articlepub.toml");
        std::fs::write(&path, "ncx = maybe")?;
        let err = load_first(&[path]).unwrap_err();
        assert!(err.starts_with("Invalid config"));
        Ok(())
    }
}
