//! In-memory page driver backed by static HTML pages.
//!
//! Replays a recorded site without a browser. Interaction is driven by plain
//! HTML plus a few `data-*` attributes:
//!
//! - `href` on a clicked element navigates (resolved against the current URL).
//! - `data-remove="<css>"` hides every element matching the selector (modal dismissal).
//! - `data-reveal="<css>"` un-hides `data-hidden` elements matching the selector.
//! - `data-search="<css>"` submits the text typed into the matching input; the
//!   query is routed through [`FixtureSite::route_search`].
//!
//! Elements carrying `data-hidden` (or inside one) are invisible until revealed.
//! [`Tripwire`]s let tests kill a session when a URL is reached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{
    normalize_text, DriverError, DriverFactory, DriverResult, ElementHandle, Locator, PageDriver,
};

const NOT_FOUND_PAGE: &str = "<html><body><h1>Not Found</h1></body></html>";

/// A recorded site: pages by absolute URL plus search routing.
#[derive(Debug, Clone, Default)]
pub struct FixtureSite {
    pages: HashMap<String, String>,
    searches: HashMap<String, String>,
    no_results_url: Option<String>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page. The URL is normalized through [`Url`].
    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(canonical_url(url), html.into());
        self
    }

    /// Route a search query (case/whitespace-insensitive) to a result URL.
    pub fn search(mut self, query: &str, target_url: &str) -> Self {
        self.searches
            .insert(search_key(query), canonical_url(target_url));
        self
    }

    /// URL shown for queries without a route.
    pub fn no_results(mut self, url: &str) -> Self {
        self.no_results_url = Some(canonical_url(url));
        self
    }

    pub fn route_search(&self, query: &str) -> Option<&str> {
        self.searches
            .get(&search_key(query))
            .or(self.no_results_url.as_ref())
            .map(String::as_str)
    }

    fn html_for(&self, url: &str) -> &str {
        self.pages
            .get(&canonical_url(url))
            .map(String::as_str)
            .unwrap_or(NOT_FOUND_PAGE)
    }
}

/// Kills the session that reaches a URL containing `url_contains`, for the
/// next `remaining` sessions that reach it.
#[derive(Debug, Clone)]
pub struct Tripwire {
    pub url_contains: String,
    pub remaining: usize,
}

/// Factory handing out [`FixtureDriver`]s over a shared site.
#[derive(Debug, Clone)]
pub struct FixtureFactory {
    site: Arc<FixtureSite>,
    tripwires: Arc<Mutex<Vec<Tripwire>>>,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    max_launches: Option<usize>,
    poll_interval: Duration,
}

impl FixtureFactory {
    pub fn new(site: FixtureSite) -> Self {
        Self {
            site: Arc::new(site),
            tripwires: Arc::new(Mutex::new(Vec::new())),
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            max_launches: None,
            poll_interval: Duration::from_millis(2),
        }
    }

    pub fn with_tripwire(self, url_contains: &str, remaining: usize) -> Self {
        if let Ok(mut wires) = self.tripwires.lock() {
            wires.push(Tripwire {
                url_contains: url_contains.to_string(),
                remaining,
            });
        }
        self
    }

    /// Refuse to launch more than `max` sessions.
    pub fn with_max_launches(mut self, max: usize) -> Self {
        self.max_launches = Some(max);
        self
    }

    /// Number of sessions launched so far.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of sessions closed so far, dead ones included.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn driver(&self) -> FixtureDriver {
        FixtureDriver {
            site: Arc::clone(&self.site),
            tripwires: Arc::clone(&self.tripwires),
            url: "about:blank".to_string(),
            html: String::new(),
            generation: 0,
            removed: Vec::new(),
            revealed: Vec::new(),
            typed: HashMap::new(),
            dead: false,
            closes: Arc::clone(&self.closes),
            poll_interval: self.poll_interval,
        }
    }
}

#[async_trait]
impl DriverFactory for FixtureFactory {
    async fn launch(&self) -> DriverResult<Box<dyn PageDriver>> {
        let launched = self.launches.fetch_add(1, Ordering::SeqCst);
        if self.max_launches.is_some_and(|max| launched >= max) {
            return Err(DriverError::Launch(format!(
                "fixture launch limit reached ({launched})"
            )));
        }
        Ok(Box::new(self.driver()))
    }
}

/// Driver over a [`FixtureSite`].
#[derive(Debug)]
pub struct FixtureDriver {
    site: Arc<FixtureSite>,
    tripwires: Arc<Mutex<Vec<Tripwire>>>,
    url: String,
    html: String,
    generation: u64,
    removed: Vec<String>,
    revealed: Vec<String>,
    typed: HashMap<usize, String>,
    dead: bool,
    closes: Arc<AtomicUsize>,
    poll_interval: Duration,
}

impl FixtureDriver {
    fn ensure_alive(&self) -> DriverResult<()> {
        if self.dead {
            return Err(DriverError::Session("fixture session was killed".into()));
        }
        Ok(())
    }

    fn load(&mut self, url: &str) -> DriverResult<()> {
        self.ensure_alive()?;
        let url = canonical_url(url);
        if self.trip(&url) {
            self.dead = true;
            return Err(DriverError::Session(format!("tripwire fired at {url}")));
        }
        self.html = self.site.html_for(&url).to_string();
        self.url = url;
        self.generation += 1;
        self.removed.clear();
        self.revealed.clear();
        self.typed.clear();
        Ok(())
    }

    fn trip(&self, url: &str) -> bool {
        let Ok(mut wires) = self.tripwires.lock() else {
            return false;
        };
        for wire in wires.iter_mut() {
            if wire.remaining > 0 && url.contains(&wire.url_contains) {
                wire.remaining -= 1;
                return true;
            }
        }
        false
    }

    fn resolve(&self, href: &str) -> String {
        Url::parse(&self.url)
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }

    fn check_handle(&self, handle: &ElementHandle) -> DriverResult<()> {
        self.ensure_alive()?;
        if handle.generation != self.generation {
            return Err(DriverError::StaleElement {
                handle: handle.generation,
                current: self.generation,
            });
        }
        Ok(())
    }

    /// Snapshot of an element's attributes and text, taken from a fresh parse.
    fn snapshot(&self, handle: &ElementHandle) -> DriverResult<ElementSnapshot> {
        self.check_handle(handle)?;
        let doc = Html::parse_document(&self.html);
        let el = document_elements(&doc)
            .into_iter()
            .nth(handle.index)
            .ok_or_else(|| DriverError::ElementNotFound {
                locator: format!("#{}", handle.index),
            })?;
        Ok(ElementSnapshot {
            attrs: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            text: element_text(&el),
            visible: self.is_visible(&el),
        })
    }

    fn is_visible(&self, el: &ElementRef<'_>) -> bool {
        let removed = parse_selectors(&self.removed);
        let revealed = parse_selectors(&self.revealed);
        let mut node = Some(*el);
        while let Some(current) = node {
            if removed.iter().any(|s| s.matches(&current)) {
                return false;
            }
            if current.value().attr("data-hidden").is_some()
                && !revealed.iter().any(|s| s.matches(&current))
            {
                return false;
            }
            node = current.parent().and_then(ElementRef::wrap);
        }
        true
    }
}

struct ElementSnapshot {
    attrs: HashMap<String, String>,
    text: String,
    visible: bool,
}

#[async_trait]
impl PageDriver for FixtureDriver {
    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        let target = self.resolve(url);
        self.load(&target)
    }

    async fn find_all(&mut self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        self.ensure_alive()?;
        let selector = Selector::parse(&locator.css).map_err(|_| {
            DriverError::Protocol(format!("invalid selector: {}", locator.css))
        })?;
        let doc = Html::parse_document(&self.html);
        let all = document_elements(&doc);
        let mut found = Vec::new();
        for el in doc.select(&selector) {
            if !self.is_visible(&el) || !locator.matches_text(&element_text(&el)) {
                continue;
            }
            if let Some(index) = all.iter().position(|e| e.id() == el.id()) {
                found.push(ElementHandle {
                    generation: self.generation,
                    index,
                });
            }
        }
        Ok(found)
    }

    async fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let snap = self.snapshot(element)?;
        if !snap.visible {
            return Err(DriverError::NotInteractable {
                reason: "element is hidden".into(),
            });
        }
        if let Some(css) = snap.attrs.get("data-remove") {
            self.removed.push(css.clone());
        }
        if let Some(css) = snap.attrs.get("data-reveal") {
            self.revealed.push(css.clone());
        }
        if let Some(input_css) = snap.attrs.get("data-search") {
            let query = match self.find(&Locator::css(input_css.clone())).await? {
                Some(input) => self.typed.get(&input.index).cloned().unwrap_or_default(),
                None => String::new(),
            };
            if let Some(target) = self.site.route_search(&query).map(str::to_string) {
                return self.load(&target);
            }
            return Ok(());
        }
        if let Some(href) = snap.attrs.get("href") {
            if !href.starts_with('#') && !href.starts_with("javascript:") {
                let target = self.resolve(href);
                return self.load(&target);
            }
        }
        Ok(())
    }

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let snap = self.snapshot(element)?;
        if !snap.visible {
            return Err(DriverError::NotInteractable {
                reason: "input is hidden".into(),
            });
        }
        self.typed.insert(element.index, text.to_string());
        Ok(())
    }

    async fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        if let Some(typed) = self.typed.get(&element.index) {
            self.check_handle(element)?;
            return Ok(typed.clone());
        }
        Ok(self.snapshot(element)?.text)
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> DriverResult<Option<String>> {
        Ok(self.snapshot(element)?.attrs.get(name).cloned())
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        self.ensure_alive()?;
        Ok(self.url.clone())
    }

    async fn page_text(&mut self) -> DriverResult<String> {
        self.ensure_alive()?;
        let doc = Html::parse_document(&self.html);
        Ok(element_text(&doc.root_element()))
    }

    async fn page_html(&mut self) -> DriverResult<String> {
        self.ensure_alive()?;
        Ok(self.html.clone())
    }

    async fn close(self: Box<Self>) -> DriverResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.ensure_alive()
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Every element of the document in pre-order; indices are handle indices.
fn document_elements(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect()
}

fn element_text(el: &ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn parse_selectors(list: &[String]) -> Vec<Selector> {
    list.iter().filter_map(|css| Selector::parse(css).ok()).collect()
}

fn canonical_url(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn search_key(query: &str) -> String {
    normalize_text(query).to_lowercase()
}
