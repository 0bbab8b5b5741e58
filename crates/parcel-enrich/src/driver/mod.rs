//! Page driver abstraction over a controllable browser session.
//!
//! Defines the [`PageDriver`] and [`DriverFactory`] traits. Nothing above this
//! module touches browser-specific APIs: the navigator and extractor only see
//! locators, element handles, and conditions.

pub mod chromium;
pub mod fixture;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default polling interval for [`PageDriver::wait_for_any`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Errors raised by driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A wait or browser command exceeded its deadline.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// The locator did not resolve to a usable element.
    #[error("element not found: {locator}")]
    ElementNotFound { locator: String },

    /// The element handle belongs to a page that has since been replaced.
    #[error("stale element handle (page generation {handle}, current {current})")]
    StaleElement { handle: u64, current: u64 },

    /// The element exists but could not be clicked or typed into.
    #[error("element not interactable: {reason}")]
    NotInteractable { reason: String },

    /// Navigation to a URL failed.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The browser session is dead; every later call will fail too.
    #[error("browser session lost: {0}")]
    Session(String),

    /// The browser could not be started.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Any other protocol-level failure.
    #[error("driver protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether the session itself is unusable (as opposed to a page-level miss).
    pub fn is_session_fault(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

/// Convenience result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// How to find elements: a CSS selector, optionally narrowed to elements whose
/// whitespace-normalized text contains `text` (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: Some(text.into()),
        }
    }

    /// Whether an element's text satisfies the text filter, if any.
    pub fn matches_text(&self, element_text: &str) -> bool {
        match &self.text {
            None => true,
            Some(needle) => {
                let haystack = normalize_text(element_text).to_lowercase();
                haystack.contains(&normalize_text(needle).to_lowercase())
            }
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} ~ {text:?}", self.css),
            None => write!(f, "{}", self.css),
        }
    }
}

/// Observable page condition used by [`PageDriver::wait_for_any`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// At least one visible element matches.
    Present(Locator),
    /// No visible element matches.
    Absent(Locator),
    /// The current URL contains the substring (case-insensitive).
    UrlContains(String),
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present(loc) => write!(f, "present({loc})"),
            Self::Absent(loc) => write!(f, "absent({loc})"),
            Self::UrlContains(s) => write!(f, "url contains {s:?}"),
        }
    }
}

/// Opaque handle to an element found on the current page.
///
/// Handles are invalidated by navigation; using one afterwards yields
/// [`DriverError::StaleElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub generation: u64,
    pub index: usize,
}

/// A single controllable browser session.
///
/// Every operation is bounded by a timeout; none may block indefinitely.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to a URL and wait for the load to settle.
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// All visible elements matching the locator, in document order.
    async fn find_all(&mut self, locator: &Locator) -> DriverResult<Vec<ElementHandle>>;

    /// Click an element, scrolling it into view or dispatching a synthetic
    /// click if a plain click is rejected.
    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    /// Replace the contents of an input element with `text`.
    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// Whitespace-normalized text content of an element.
    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String>;

    /// An attribute value of an element.
    async fn attribute(&mut self, element: &ElementHandle, name: &str)
        -> DriverResult<Option<String>>;

    async fn current_url(&mut self) -> DriverResult<String>;

    /// Visible text of the whole page.
    async fn page_text(&mut self) -> DriverResult<String>;

    /// Serialized DOM of the current page.
    async fn page_html(&mut self) -> DriverResult<String>;

    /// Release the session. Errors are informational only.
    async fn close(self: Box<Self>) -> DriverResult<()>;

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// First visible element matching the locator.
    async fn find(&mut self, locator: &Locator) -> DriverResult<Option<ElementHandle>> {
        Ok(self.find_all(locator).await?.into_iter().next())
    }

    /// Evaluate a condition once against the current page.
    async fn check(&mut self, condition: &Condition) -> DriverResult<bool> {
        match condition {
            Condition::Present(loc) => Ok(self.find(loc).await?.is_some()),
            Condition::Absent(loc) => Ok(self.find(loc).await?.is_none()),
            Condition::UrlContains(needle) => Ok(self
                .current_url()
                .await?
                .to_lowercase()
                .contains(&needle.to_lowercase())),
        }
    }

    /// Poll until one of `conditions` holds, returning its index.
    ///
    /// Conditions are evaluated in order on every poll, so earlier entries win
    /// ties. Fails with [`DriverError::Timeout`] once `timeout` has elapsed.
    async fn wait_for_any(
        &mut self,
        conditions: &[Condition],
        timeout: Duration,
    ) -> DriverResult<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            for (i, condition) in conditions.iter().enumerate() {
                if self.check(condition).await? {
                    return Ok(i);
                }
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                let what = conditions
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" | ");
                return Err(DriverError::Timeout {
                    what,
                    after: timeout,
                });
            }
            let pause = self.poll_interval().min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }

    /// Poll until `condition` holds.
    async fn wait_until(&mut self, condition: &Condition, timeout: Duration) -> DriverResult<()> {
        self.wait_for_any(std::slice::from_ref(condition), timeout)
            .await
            .map(|_| ())
    }
}

/// Creates fresh browser sessions; used to rebuild a dead session.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>>;
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
