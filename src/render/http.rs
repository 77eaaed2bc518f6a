//! Blocking HTTP rendering backend. Each session gets its own client and cookie jar.
//!
//! Scripts are not executed, so both completion conditions fetch the document the same
//! way; a failed attempt is still retried under the fallback condition by the renderer.

use super::{Browser, PageSnapshot, Session, SessionError, WaitUntil};
use reqwest::Url;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; articlepub/0.1; +https://github.com/articlepub)";
const MAX_REDIRECTS: usize = 10;

/// Opens [HttpSession]s configured with a User-Agent and redirect limit.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    user_agent: String,
    max_redirects: usize,
}

impl HttpBrowser {
    /// Browser with the default User-Agent.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HttpBrowserBuilder {
        HttpBrowserBuilder::default()
    }
}

impl Default for HttpBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl Browser for HttpBrowser {
    fn open_session(&self) -> Result<Box<dyn Session>, SessionError> {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(self.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .build()
            .map_err(|e| SessionError::Launch {
                reason: e.to_string(),
            })?;
        tracing::debug!(user_agent = %self.user_agent, "http session opened");
        Ok(Box::new(HttpSession {
            client: Some(client),
            document: None,
        }))
    }
}

/// Builder for [HttpBrowser].
#[derive(Debug, Default)]
pub struct HttpBrowserBuilder {
    user_agent: Option<String>,
    max_redirects: Option<usize>,
}

impl HttpBrowserBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Maximum redirects followed per navigation. Default 10.
    pub fn max_redirects(mut self, n: usize) -> Self {
        self.max_redirects = Some(n);
        self
    }

    pub fn build(self) -> HttpBrowser {
        HttpBrowser {
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            max_redirects: self.max_redirects.unwrap_or(MAX_REDIRECTS),
        }
    }
}

/// One HTTP "tab": the client (dropped on close) and the last loaded document.
pub struct HttpSession {
    client: Option<reqwest::blocking::Client>,
    document: Option<String>,
}

impl HttpSession {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, SessionError> {
        let client = self.client.as_ref().ok_or_else(|| {
            SessionError::Backend("session already closed".to_string())
        })?;
        let parsed = Url::parse(url).map_err(|e| SessionError::Backend(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SessionError::UnsupportedScheme {
                url: url.to_string(),
                scheme: parsed.scheme().to_string(),
            });
        }
        let response = client
            .get(parsed)
            .timeout(timeout)
            .send()
            .map_err(|e| classify(url, timeout, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.text().map_err(|e| {
            if e.is_timeout() {
                classify(url, timeout, e)
            } else {
                SessionError::BodyRead {
                    url: url.to_string(),
                    source: e,
                }
            }
        })
    }
}

fn classify(url: &str, timeout: Duration, e: reqwest::Error) -> SessionError {
    if e.is_timeout() {
        SessionError::Timeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        SessionError::Network {
            url: url.to_string(),
            source: e,
        }
    }
}

impl Session for HttpSession {
    fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        tracing::debug!(url, %wait_until, "navigating");
        let html = self.fetch(url, timeout)?;
        self.document = Some(html);
        Ok(())
    }

    fn snapshot(&mut self) -> Result<PageSnapshot, SessionError> {
        self.document
            .clone()
            .map(|html| PageSnapshot { html })
            .ok_or(SessionError::NotLoaded)
    }

    fn close(&mut self) {
        self.client = None;
        self.document = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_scheme_is_rejected_without_network() -> Result<(), SessionError> {
        let mut session = HttpBrowser::new().open_session()?;
        let result = session.navigate(
            "ftp://example.test/file",
            WaitUntil::DomContentLoaded,
            Duration::from_secs(1),
        );
        match result {
            Err(SessionError::UnsupportedScheme { scheme, .. }) => assert_eq!(scheme, "ftp"),
            other => panic!("expected UnsupportedScheme, got {:?}", other),
        }
        session.close();
        Ok(())
    }

    #[test]
    fn snapshot_before_navigation_is_not_loaded() -> Result<(), SessionError> {
        let mut session = HttpBrowser::new().open_session()?;
        assert!(matches!(session.snapshot(), Err(SessionError::NotLoaded)));
        Ok(())
    }

    #[test]
    fn navigate_after_close_fails() -> Result<(), SessionError> {
        let mut session = HttpBrowser::new().open_session()?;
        session.close();
        let result = session.navigate(
            "https://example.test/",
            WaitUntil::Load,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(SessionError::Backend(_))));
        Ok(())
    }

    #[test]
    fn builder_overrides_user_agent() {
        let browser = HttpBrowser::builder()
            .user_agent("Custom/1.0")
            .max_redirects(3)
            .build();
        assert_eq!(browser.user_agent, "Custom/1.0");
        assert_eq!(browser.max_redirects, 3);
    }
}
