//! Chromium-backed page driver using chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    normalize_text, DriverError, DriverFactory, DriverResult, ElementHandle, Locator, PageDriver,
};

/// Environment variable overriding the browser binary location.
pub const CHROMIUM_PATH_ENV: &str = "PARCEL_ENRICH_CHROMIUM_PATH";

/// Rendered with a box and not hidden by `visibility`.
const IS_VISIBLE_JS: &str = "function() { \
    const style = getComputedStyle(this); \
    return !!(this.offsetWidth || this.offsetHeight || this.getClientRects().length) \
        && style.visibility !== 'hidden'; }";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. Explicit override
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.parcel-enrich/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".parcel-enrich/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".parcel-enrich/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![home.join(".parcel-enrich/chromium/chrome-linux64/chrome")]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Browser launch settings.
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// Upper bound for any single browser command.
    pub command_timeout: Duration,
    /// Upper bound for a page load.
    pub navigation_timeout: Duration,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            command_timeout: Duration::from_secs(15),
            navigation_timeout: Duration::from_secs(45),
        }
    }
}

/// Launches one Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumFactory {
    options: ChromiumOptions,
}

impl ChromiumFactory {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>> {
        Ok(Box::new(ChromiumDriver::launch(&self.options).await?))
    }
}

/// A single Chromium tab driven over CDP.
pub struct ChromiumDriver {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    elements: Vec<Element>,
    generation: u64,
    options: ChromiumOptions,
}

impl ChromiumDriver {
    /// Launch a browser process and open a blank tab.
    pub async fn launch(options: &ChromiumOptions) -> DriverResult<Self> {
        let executable = options
            .executable
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                DriverError::Launch(format!("Chromium not found; set {CHROMIUM_PATH_ENV}"))
            })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .request_timeout(options.command_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--window-size=1366,900");
        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| DriverError::Launch(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(format!("failed to launch Chromium: {e}")))?;

        // The handler drives the CDP connection; when it ends the session is dead.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(format!("failed to open tab: {e}")))?;

        Ok(Self {
            browser,
            handler,
            page,
            elements: Vec::new(),
            generation: 0,
            options: options.clone(),
        })
    }

    fn ensure_alive(&self) -> DriverResult<()> {
        if self.handler.is_finished() {
            return Err(DriverError::Session("CDP connection closed".into()));
        }
        Ok(())
    }

    fn element(&self, handle: &ElementHandle) -> DriverResult<&Element> {
        self.ensure_alive()?;
        if handle.generation != self.generation {
            return Err(DriverError::StaleElement {
                handle: handle.generation,
                current: self.generation,
            });
        }
        self.elements
            .get(handle.index)
            .ok_or_else(|| DriverError::ElementNotFound {
                locator: format!("handle #{}", handle.index),
            })
    }

    /// Drop handles from the previous page.
    fn invalidate(&mut self) {
        self.elements.clear();
        self.generation += 1;
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> DriverResult<T>
    where
        F: std::future::Future<Output = Result<T, CdpError>>,
    {
        let after = self.options.command_timeout;
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(DriverError::Timeout {
                what: what.to_string(),
                after,
            }),
        }
    }

    async fn eval_string(&self, script: &str) -> DriverResult<String> {
        let result = self.bounded("evaluate", self.page.evaluate(script)).await?;
        result
            .into_value::<String>()
            .map_err(|e| DriverError::Protocol(format!("failed to convert JS result: {e:?}")))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.ensure_alive()?;
        self.invalidate();
        let after = self.options.navigation_timeout;
        match tokio::time::timeout(after, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                let _ = tokio::time::timeout(after, self.page.wait_for_navigation()).await;
                Ok(())
            }
            Ok(Err(e)) => match classify(e) {
                DriverError::Session(reason) => Err(DriverError::Session(reason)),
                other => Err(DriverError::Navigation {
                    url: url.to_string(),
                    reason: other.to_string(),
                }),
            },
            Err(_) => Err(DriverError::Timeout {
                what: format!("navigation to {url}"),
                after,
            }),
        }
    }

    async fn find_all(&mut self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        self.ensure_alive()?;
        let found = match self
            .bounded("find_elements", self.page.find_elements(locator.css.as_str()))
            .await
        {
            Ok(found) => found,
            Err(DriverError::ElementNotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut handles = Vec::new();
        for element in found {
            if locator.text.is_some() {
                let text = self
                    .bounded("inner_text", element.inner_text())
                    .await?
                    .unwrap_or_default();
                if !locator.matches_text(&text) {
                    continue;
                }
            }
            let shown = self
                .bounded("visibility", element.call_js_fn(IS_VISIBLE_JS, false))
                .await?
                .result
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if !shown {
                continue;
            }
            handles.push(ElementHandle {
                generation: self.generation,
                index: self.elements.len(),
            });
            self.elements.push(element);
        }
        Ok(handles)
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let el = self.element(element)?;
        let _ = tokio::time::timeout(self.options.command_timeout, el.scroll_into_view()).await;
        let plain = tokio::time::timeout(self.options.command_timeout, el.click()).await;
        match plain {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(CdpError::Ws(e))) => Err(DriverError::Session(e.to_string())),
            _ => {
                // Overlays and zero-size boxes reject real clicks; dispatch a DOM click instead.
                warn!("native click rejected, dispatching synthetic click");
                self.bounded(
                    "synthetic click",
                    el.call_js_fn("function() { this.click(); }", false),
                )
                .await
                .map(|_| ())
                .map_err(|e| match e {
                    DriverError::Session(reason) => DriverError::Session(reason),
                    other => DriverError::NotInteractable {
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let el = self.element(element)?;
        self.bounded(
            "clear input",
            el.call_js_fn("function() { this.focus(); this.value = ''; }", false),
        )
        .await?;
        self.bounded("focus", el.click()).await?;
        self.bounded("type", el.type_str(text)).await?;
        Ok(())
    }

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        let el = self.element(element)?;
        let text = self.bounded("inner_text", el.inner_text()).await?;
        Ok(normalize_text(&text.unwrap_or_default()))
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let el = self.element(element)?;
        self.bounded("attribute", el.attribute(name)).await
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.ensure_alive()?;
        Ok(self
            .bounded("url", self.page.url())
            .await?
            .map(|u| u.to_string())
            .unwrap_or_default())
    }

    async fn page_text(&mut self) -> DriverResult<String> {
        self.ensure_alive()?;
        let text = self
            .eval_string("document.body ? document.body.innerText : ''")
            .await?;
        Ok(normalize_text(&text))
    }

    async fn page_html(&mut self) -> DriverResult<String> {
        self.ensure_alive()?;
        self.bounded("content", self.page.content()).await
    }

    async fn close(mut self: Box<Self>) -> DriverResult<()> {
        self.elements.clear();
        let _ = tokio::time::timeout(self.options.command_timeout, self.browser.close()).await;
        let _ = tokio::time::timeout(self.options.command_timeout, self.browser.wait()).await;
        self.handler.abort();
        Ok(())
    }
}

/// Map a CDP error onto the driver taxonomy.
fn classify(err: CdpError) -> DriverError {
    match err {
        CdpError::Ws(e) => DriverError::Session(e.to_string()),
        CdpError::ChannelSendError(_) => DriverError::Session("command channel closed".into()),
        CdpError::NoResponse => DriverError::Session("no response from browser".into()),
        CdpError::NotFound => DriverError::ElementNotFound {
            locator: "(cdp)".into(),
        },
        CdpError::Timeout => DriverError::Timeout {
            what: "CDP request".into(),
            after: Duration::ZERO,
        },
        other => DriverError::Protocol(other.to_string()),
    }
}
