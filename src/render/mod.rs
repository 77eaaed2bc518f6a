//! Page rendering: open a session, navigate with one fallback attempt, settle, snapshot.
//!
//! The engine sits behind the [Browser] and [Session] traits. With the `chrome` feature,
//! `chrome::ChromeBrowser` drives headless Chromium and runs page scripts; [http::HttpBrowser]
//! is a lighter backend that only fetches the served document.
//! A [RenderedPage] owns its session and releases it exactly once, either through
//! [RenderedPage::close] or when dropped.

#[cfg(feature = "chrome")]
pub mod chrome;
mod error;
pub mod http;

#[cfg(feature = "chrome")]
pub use chrome::{ChromeBrowser, ChromeBrowserBuilder};
pub use error::{NavigationError, SessionError};
pub use http::{HttpBrowser, HttpBrowserBuilder};

use std::fmt;
use std::time::Duration;

/// Default navigation timeout per attempt.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
/// Default pause after navigation so deferred page mutations can land.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(2000);

/// Condition under which a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// Initial markup parsed.
    DomContentLoaded,
    /// All sub-resources loaded.
    Load,
}

impl WaitUntil {
    /// Whether a document whose `document.readyState` is `ready_state` meets this condition.
    pub fn satisfied_by(self, ready_state: &str) -> bool {
        match self {
            WaitUntil::DomContentLoaded => matches!(ready_state, "interactive" | "complete"),
            WaitUntil::Load => ready_state == "complete",
        }
    }
}

impl fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitUntil::DomContentLoaded => f.write_str("domcontentloaded"),
            WaitUntil::Load => f.write_str("load"),
        }
    }
}

/// Markup of the loaded document at the moment it was captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    pub html: String,
}

/// One isolated rendering context (a browser tab, or an HTTP client with its own cookie jar).
pub trait Session {
    fn navigate(&mut self, url: &str, wait_until: WaitUntil, timeout: Duration)
        -> Result<(), SessionError>;

    /// Bounded wait after navigation. The default sleeps for `period`.
    fn settle(&mut self, period: Duration) {
        if !period.is_zero() {
            std::thread::sleep(period);
        }
    }

    fn snapshot(&mut self) -> Result<PageSnapshot, SessionError>;

    /// Release the context. Called exactly once per session by [RenderedPage] or the renderer.
    fn close(&mut self);
}

/// Rendering engine able to open sessions.
pub trait Browser {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError>;
}

/// Timing knobs for [Renderer].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Timeout applied to each navigation attempt.
    pub navigation_timeout: Duration,
    /// Fixed delay between successful navigation and the snapshot.
    pub settle: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// Holds a session and closes it once, whichever way the owner goes away.
struct SessionGuard {
    session: Box<dyn Session>,
    released: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn Session>) -> Self {
        Self {
            session,
            released: false,
        }
    }

    fn session_mut(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.session.close();
            tracing::debug!("rendering session closed");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// A loaded page plus the session that produced it.
pub struct RenderedPage {
    url: String,
    snapshot: PageSnapshot,
    guard: SessionGuard,
}

impl RenderedPage {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Full document markup captured after settling.
    pub fn html(&self) -> &str {
        &self.snapshot.html
    }

    /// Release the session now instead of at drop.
    pub fn close(mut self) {
        self.guard.release();
    }
}

impl fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedPage")
            .field("url", &self.url)
            .field("html_len", &self.snapshot.html.len())
            .field("released", &self.guard.released)
            .finish()
    }
}

/// Loads URLs through a [Browser] with the navigation-retry policy.
pub struct Renderer<'a> {
    browser: &'a dyn Browser,
    options: RenderOptions,
}

impl<'a> Renderer<'a> {
    pub fn new(browser: &'a dyn Browser, options: RenderOptions) -> Self {
        Self { browser, options }
    }

    /// Load `url` and return the settled page.
    ///
    /// Tries [WaitUntil::DomContentLoaded] first, then exactly one more attempt under
    /// [WaitUntil::Load] with the same timeout. The URL is assumed valid and absolute.
    pub fn render(&self, url: &str) -> Result<RenderedPage, NavigationError> {
        let session = self
            .browser
            .open_session()
            .map_err(NavigationError::Launch)?;
        let mut guard = SessionGuard::new(session);

        navigate_with_fallback(guard.session_mut(), url, self.options.navigation_timeout)?;
        guard.session_mut().settle(self.options.settle);
        let snapshot = guard
            .session_mut()
            .snapshot()
            .map_err(|source| NavigationError::Snapshot {
                url: url.to_string(),
                source,
            })?;
        tracing::info!(url, bytes = snapshot.html.len(), "page loaded");

        Ok(RenderedPage {
            url: url.to_string(),
            snapshot,
            guard,
        })
    }
}

fn navigate_with_fallback(
    session: &mut dyn Session,
    url: &str,
    timeout: Duration,
) -> Result<(), NavigationError> {
    match session.navigate(url, WaitUntil::DomContentLoaded, timeout) {
        Ok(()) => Ok(()),
        Err(first) => {
            tracing::warn!(url, error = %first, "navigation failed; retrying with {}", WaitUntil::Load);
            session
                .navigate(url, WaitUntil::Load, timeout)
                .map_err(|source| NavigationError::Load {
                    url: url.to_string(),
                    source,
                })
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBrowser;
    use super::*;

    fn quick() -> RenderOptions {
        RenderOptions {
            navigation_timeout: Duration::from_secs(5),
            settle: Duration::ZERO,
        }
    }

    #[test]
    fn first_attempt_success_skips_fallback() -> Result<(), NavigationError> {
        let browser = FakeBrowser::serving("<html><body>ok</body></html>");
        let page = Renderer::new(&browser, quick()).render("https://example.test/a")?;
        assert_eq!(page.html(), "<html><body>ok</body></html>");
        assert_eq!(page.url(), "https://example.test/a");
        assert_eq!(browser.log.borrow().attempts, vec![WaitUntil::DomContentLoaded]);
        assert_eq!(browser.log.borrow().closed, 0);
        page.close();
        assert_eq!(browser.log.borrow().closed, 1);
        Ok(())
    }

    #[test]
    fn retries_under_load_when_dom_content_loaded_fails() -> Result<(), NavigationError> {
        let browser =
            FakeBrowser::serving("<body>late</body>").failing_on(&[WaitUntil::DomContentLoaded]);
        let page = Renderer::new(&browser, quick()).render("https://example.test/a")?;
        assert!(page.html().contains("late"));
        assert_eq!(
            browser.log.borrow().attempts,
            vec![WaitUntil::DomContentLoaded, WaitUntil::Load]
        );
        drop(page);
        assert_eq!(browser.log.borrow().closed, 1);
        Ok(())
    }

    #[test]
    fn both_attempts_failing_is_navigation_error_and_session_closed_once() {
        let browser = FakeBrowser::serving("<body/>")
            .failing_on(&[WaitUntil::DomContentLoaded, WaitUntil::Load]);
        let result = Renderer::new(&browser, quick()).render("https://example.test/a");
        match result {
            Err(NavigationError::Load { url, source }) => {
                assert_eq!(url, "https://example.test/a");
                assert!(source.to_string().contains("load never reached"));
            }
            other => panic!("expected NavigationError::Load, got {:?}", other),
        }
        let log = browser.log.borrow();
        assert_eq!(log.attempts.len(), 2);
        assert_eq!(log.opened, 1);
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn explicit_close_then_drop_releases_once() -> Result<(), NavigationError> {
        let browser = FakeBrowser::serving("<body/>");
        let page = Renderer::new(&browser, quick()).render("https://example.test/")?;
        page.close();
        assert_eq!(browser.log.borrow().closed, 1);
        Ok(())
    }

    #[test]
    fn settle_period_is_passed_to_session() -> Result<(), NavigationError> {
        let browser = FakeBrowser::serving("<body/>");
        let options = RenderOptions {
            settle: Duration::from_millis(1500),
            ..quick()
        };
        let _page = Renderer::new(&browser, options).render("https://example.test/")?;
        assert_eq!(browser.log.borrow().settled, vec![Duration::from_millis(1500)]);
        Ok(())
    }

    #[test]
    fn launch_failure_opens_nothing() {
        let mut browser = FakeBrowser::serving("<body/>");
        browser.fail_launch = true;
        let result = Renderer::new(&browser, quick()).render("https://example.test/");
        assert!(matches!(result, Err(NavigationError::Launch(_))));
        assert_eq!(browser.log.borrow().opened, 0);
        assert_eq!(browser.log.borrow().closed, 0);
    }

    #[test]
    fn wait_conditions_follow_ready_state() {
        assert!(!WaitUntil::DomContentLoaded.satisfied_by("loading"));
        assert!(WaitUntil::DomContentLoaded.satisfied_by("interactive"));
        assert!(WaitUntil::DomContentLoaded.satisfied_by("complete"));
        assert!(!WaitUntil::Load.satisfied_by("interactive"));
        assert!(WaitUntil::Load.satisfied_by("complete"));
    }

    #[test]
    fn default_options_match_documented_values() {
        let o = RenderOptions::default();
        assert_eq!(o.navigation_timeout, Duration::from_secs(60));
        assert_eq!(o.settle, Duration::from_secs(2));
    }
}
