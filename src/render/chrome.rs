//! Headless Chromium backend over the DevTools protocol.
//!
//! Every session launches its own browser process, so cookies and storage never leak between
//! runs. Page scripts execute. Navigation completes when `document.readyState` satisfies the
//! requested [WaitUntil]: `interactive` for DOM content loaded, `complete` for load.
//!
//! The engine is async; each session owns a small tokio runtime and blocks on it.

use super::{Browser, PageSnapshot, Session, SessionError, WaitUntil};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser as CdpBrowser, BrowserConfig, Page};
use futures::StreamExt;
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// Interval between `document.readyState` checks while a navigation is in flight.
const READY_POLL: Duration = Duration::from_millis(100);

/// Launches a headless Chromium per session.
#[derive(Debug, Clone)]
pub struct ChromeBrowser {
    executable: Option<PathBuf>,
    user_agent: Option<String>,
    sandbox: bool,
}

impl ChromeBrowser {
    /// Browser found on the usual install paths, sandbox on.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ChromeBrowserBuilder {
        ChromeBrowserBuilder::default()
    }

    fn config(&self) -> Result<BrowserConfig, SessionError> {
        let mut config = BrowserConfig::builder();
        if let Some(path) = &self.executable {
            config = config.chrome_executable(path);
        }
        if !self.sandbox {
            config = config.no_sandbox();
        }
        if let Some(ua) = &self.user_agent {
            config = config.arg(format!("--user-agent={}", ua));
        }
        config.build().map_err(|reason| SessionError::Launch { reason })
    }
}

impl Default for ChromeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl Browser for ChromeBrowser {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError> {
        let config = self.config()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(launch_error)?;

        let (browser, mut handler) = runtime
            .block_on(CdpBrowser::launch(config))
            .map_err(launch_error)?;
        let events = runtime.spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match runtime.block_on(browser.new_page("about:blank")) {
            Ok(page) => page,
            Err(e) => {
                runtime.block_on(shutdown(browser));
                events.abort();
                return Err(launch_error(e));
            }
        };
        tracing::debug!(executable = ?self.executable, "chromium session opened");

        Ok(Box::new(ChromeSession {
            runtime,
            browser: Some(browser),
            page: Some(page),
            events: Some(events),
        }))
    }
}

/// Builder for [ChromeBrowser].
#[derive(Debug)]
pub struct ChromeBrowserBuilder {
    executable: Option<PathBuf>,
    user_agent: Option<String>,
    sandbox: bool,
}

impl Default for ChromeBrowserBuilder {
    fn default() -> Self {
        Self {
            executable: None,
            user_agent: None,
            sandbox: true,
        }
    }
}

impl ChromeBrowserBuilder {
    /// Path to the Chrome or Chromium binary. If not set, the usual install locations are searched.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Disable the sandbox, needed when running as root in containers.
    pub fn sandbox(mut self, enabled: bool) -> Self {
        self.sandbox = enabled;
        self
    }

    pub fn build(self) -> ChromeBrowser {
        ChromeBrowser {
            executable: self.executable,
            user_agent: self.user_agent,
            sandbox: self.sandbox,
        }
    }
}

/// One browser process with a single tab.
pub struct ChromeSession {
    runtime: Runtime,
    browser: Option<CdpBrowser>,
    page: Option<Page>,
    events: Option<JoinHandle<()>>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, SessionError> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::Backend("session already closed".to_string()))
    }
}

impl Session for ChromeSession {
    fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        tracing::debug!(url, %wait_until, "navigating");
        let page = self.page()?;
        let attempt = self.runtime.block_on(tokio::time::timeout(timeout, async {
            let navigated = page
                .execute(NavigateParams::new(url))
                .await
                .map_err(backend_error)?;
            if let Some(reason) = navigated.result.error_text.as_deref() {
                return Err(SessionError::Backend(format!(
                    "navigation to {} failed: {}",
                    url, reason
                )));
            }
            wait_for_ready_state(page, wait_until).await;
            Ok::<(), SessionError>(())
        }));
        match attempt {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    fn snapshot(&mut self) -> Result<PageSnapshot, SessionError> {
        let page = self.page()?;
        let html = self
            .runtime
            .block_on(page.content())
            .map_err(backend_error)?;
        Ok(PageSnapshot { html })
    }

    fn close(&mut self) {
        let page = self.page.take();
        let browser = self.browser.take();
        self.runtime.block_on(async move {
            drop(page);
            if let Some(browser) = browser {
                shutdown(browser).await;
            }
        });
        if let Some(events) = self.events.take() {
            events.abort();
        }
    }
}

/// Poll until the current document reaches `wait_until`. Evaluation errors while the old
/// document is torn down are expected and retried; the caller bounds the wait.
async fn wait_for_ready_state(page: &Page, wait_until: WaitUntil) {
    loop {
        match page.evaluate("document.readyState").await {
            Ok(result) => match result.into_value::<String>() {
                Ok(state) if wait_until.satisfied_by(&state) => return,
                Ok(state) => tracing::trace!(%state, "document not ready"),
                Err(e) => tracing::trace!(error = %e, "unreadable readyState"),
            },
            Err(e) => tracing::trace!(error = %e, "readyState check failed"),
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

async fn shutdown(mut browser: CdpBrowser) {
    if let Err(e) = browser.close().await {
        tracing::warn!(error = %e, "chromium did not close cleanly");
    }
    if let Err(e) = browser.wait().await {
        tracing::warn!(error = %e, "waiting for chromium to exit failed");
    }
}

fn launch_error(e: impl Display) -> SessionError {
    SessionError::Launch {
        reason: e.to_string(),
    }
}

fn backend_error(e: impl Display) -> SessionError {
    SessionError::Backend(e.to_string())
}
