//! Navigation state machine: home → jurisdiction → application → consent →
//! search → (disambiguation) → detail page.
//!
//! Each transition tries a primary strategy, then its declared fallbacks, and
//! only then reports [`NavigationState::Failed`]. Transitions never retry
//! themselves; a dead session surfaces as [`SessionFault`] and the batch
//! runner decides what happens next.

mod transitions;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use url::Url;

use crate::driver::{normalize_text, Condition, DriverResult, ElementHandle, PageDriver};
use crate::error::{FailureReason, SessionFault};
use crate::profile::{ProfileError, SiteProfile};
use crate::record::RowContext;

/// Upper bound on transitions per row. The state graph is acyclic, so a
/// healthy run needs at most six.
const MAX_TRANSITIONS: usize = 8;

/// Where a row currently is in the site flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationState {
    Home,
    JurisdictionSelected,
    AppEntered,
    ConsentCleared,
    SearchPanelOpen,
    ResultsAmbiguous,
    Detail,
    Failed(FailureReason),
}

impl NavigationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Detail | Self::Failed(_))
    }

    /// Reason reported when the transition out of this state fails.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Home => Some(FailureReason::JurisdictionNotFound),
            Self::JurisdictionSelected => Some(FailureReason::AppEntryUnresolved),
            Self::AppEntered => None,
            Self::ConsentCleared => Some(FailureReason::SearchPanelUnavailable),
            Self::SearchPanelOpen => Some(FailureReason::NoResults),
            Self::ResultsAmbiguous => Some(FailureReason::AmbiguousResultUnresolvable),
            Self::Detail | Self::Failed(_) => None,
        }
    }
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "home"),
            Self::JurisdictionSelected => write!(f, "jurisdiction-selected"),
            Self::AppEntered => write!(f, "app-entered"),
            Self::ConsentCleared => write!(f, "consent-cleared"),
            Self::SearchPanelOpen => write!(f, "search-panel-open"),
            Self::ResultsAmbiguous => write!(f, "results-ambiguous"),
            Self::Detail => write!(f, "detail"),
            Self::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

/// Drives a [`PageDriver`] through the site flow for one row at a time.
///
/// Holds only the site profile and a jurisdiction → application identifier
/// cache; all per-row state lives in [`RowContext`].
pub struct Navigator {
    profile: Arc<SiteProfile>,
    app_id_pattern: Regex,
    app_ids: HashMap<String, String>,
}

impl Navigator {
    pub fn new(profile: Arc<SiteProfile>) -> Result<Self, ProfileError> {
        let app_id_pattern = Regex::new(&profile.app_id_pattern)
            .map_err(|e| ProfileError::Invalid(format!("app_id_pattern: {e}")))?;
        Ok(Self {
            profile,
            app_id_pattern,
            app_ids: HashMap::new(),
        })
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    /// Seed the application identifier for a jurisdiction.
    pub fn remember_app_id(&mut self, jurisdiction: &str, app_id: impl Into<String>) {
        self.app_ids
            .entry(jurisdiction_key(jurisdiction))
            .or_insert_with(|| app_id.into());
    }

    /// Cached application identifier for a jurisdiction.
    pub fn cached_app_id(&self, jurisdiction: &str) -> Option<&str> {
        self.app_ids
            .get(&jurisdiction_key(jurisdiction))
            .map(String::as_str)
    }

    /// Run the state machine from the home page to a terminal state.
    ///
    /// Returns `Ok(Detail)` with the driver positioned on the detail page,
    /// `Ok(Failed(reason))` when the row must be abandoned, or `Err` when the
    /// session died.
    pub async fn drive(
        &mut self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
    ) -> Result<NavigationState, SessionFault> {
        if ctx.is_blank() {
            return Ok(NavigationState::Failed(FailureReason::MissingInput));
        }

        let mut state = self.enter_home(driver, ctx).await?;
        for _ in 0..MAX_TRANSITIONS {
            if state.is_terminal() {
                break;
            }
            let next = match state {
                NavigationState::Home => self.select_jurisdiction(driver, ctx).await?,
                NavigationState::JurisdictionSelected => self.enter_app(driver, ctx).await?,
                NavigationState::AppEntered => self.clear_consent(driver, ctx).await?,
                NavigationState::ConsentCleared => self.open_search_panel(driver, ctx).await?,
                NavigationState::SearchPanelOpen => self.submit_search(driver, ctx).await?,
                NavigationState::ResultsAmbiguous => self.pick_first_result(driver, ctx).await?,
                NavigationState::Detail | NavigationState::Failed(_) => state,
            };
            ctx.last_url = soften(ctx, "current url", driver.current_url().await)?;
            tracing::debug!(
                from = %state,
                to = %next,
                url = ctx.last_url.as_deref().unwrap_or(""),
                "navigation transition"
            );
            state = next;
        }

        if state.is_terminal() {
            Ok(state)
        } else {
            tracing::warn!(state = %state, "transition limit reached");
            let reason = state
                .failure_reason()
                .unwrap_or(FailureReason::SearchPanelUnavailable);
            Ok(NavigationState::Failed(reason))
        }
    }

    /// Record an application identifier found in `text`, returning it.
    fn capture_app_id(&mut self, ctx: &mut RowContext, text: &str) -> Option<String> {
        let id = self
            .app_id_pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())?;
        ctx.set_app_id(id.clone());
        self.remember_app_id(&ctx.jurisdiction, id.clone());
        Some(id)
    }

    /// Click an element and wait for `ready`. If the click is rejected or the
    /// page never becomes ready, navigate straight to the element's href and
    /// wait again. Returns whether `ready` was observed.
    async fn activate(
        &self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
        element: ElementHandle,
        ready: &[Condition],
        what: &str,
    ) -> Result<bool, SessionFault> {
        let href = soften(ctx, what, driver.attribute(&element, "href").await)?.flatten();
        let base = soften(ctx, what, driver.current_url().await)?;

        if soften(ctx, what, driver.click(&element).await)?.is_some()
            && self.await_ready(driver, ctx, ready, what).await?
        {
            return Ok(true);
        }

        let Some(target) = href
            .filter(|h| is_navigable_href(h))
            .and_then(|h| resolve_href(base.as_deref(), &h))
        else {
            return Ok(false);
        };
        tracing::warn!(step = what, %target, "click did not land, following href");
        if soften(ctx, what, driver.navigate(&target).await)?.is_none() {
            return Ok(false);
        }
        self.await_ready(driver, ctx, ready, what).await
    }

    async fn await_ready(
        &self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
        ready: &[Condition],
        what: &str,
    ) -> Result<bool, SessionFault> {
        if ready.is_empty() {
            return Ok(true);
        }
        let waited = driver
            .wait_for_any(ready, self.profile.step_timeout())
            .await;
        Ok(soften(ctx, what, waited)?.is_some())
    }
}

/// Split a driver result: session faults propagate, anything else becomes a
/// note on the row and `None`.
fn soften<T>(
    ctx: &mut RowContext,
    what: &str,
    result: DriverResult<T>,
) -> Result<Option<T>, SessionFault> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_session_fault() => Err(SessionFault(e)),
        Err(e) => {
            tracing::debug!(step = what, error = %e, "driver miss");
            ctx.note(format!("{what}: {e}"));
            Ok(None)
        }
    }
}

fn jurisdiction_key(name: &str) -> String {
    normalize_text(name).to_lowercase()
}

fn is_navigable_href(href: &str) -> bool {
    let href = href.trim();
    !href.is_empty() && !href.starts_with('#') && !href.to_lowercase().starts_with("javascript:")
}

fn resolve_href(base: Option<&str>, href: &str) -> Option<String> {
    match base.and_then(|b| Url::parse(b).ok()) {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}
