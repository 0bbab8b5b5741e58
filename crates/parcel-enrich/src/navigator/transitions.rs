//! One method per transition of the navigation state machine.

use crate::driver::{Condition, Locator, PageDriver};
use crate::error::{FailureReason, SessionFault};
use crate::record::RowContext;

use super::{soften, NavigationState, Navigator};

type Step = Result<NavigationState, SessionFault>;

const NO_RESULTS: NavigationState = NavigationState::Failed(FailureReason::NoResults);

impl Navigator {
    /// Load the home page and pre-select the region.
    pub(super) async fn enter_home(&mut self, driver: &mut dyn PageDriver, ctx: &mut RowContext) -> Step {
        let home = self.profile.home_url.clone();
        if soften(ctx, "home", driver.navigate(&home).await)?.is_none() {
            return Ok(NavigationState::Failed(FailureReason::HomeUnreachable));
        }
        self.select_region(driver, ctx).await?;
        Ok(NavigationState::Home)
    }

    /// Region pre-selection. Misses are notes; the jurisdiction step decides.
    async fn select_region(
        &mut self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
    ) -> Result<(), SessionFault> {
        let Some(region) = self.profile.region_name.clone() else {
            return Ok(());
        };
        let profile = self.profile.clone();

        if let Some(Some(input)) = soften(ctx, "region", driver.find(&profile.region_input).await)? {
            soften(ctx, "region", driver.click(&input).await)?;
            soften(ctx, "region", driver.type_text(&input, &region).await)?;
        }
        let option = Locator::with_text(profile.region_options.clone(), region.clone());
        let shown = driver
            .wait_until(&Condition::Present(option.clone()), profile.probe_timeout())
            .await;
        if soften(ctx, "region", shown)?.is_none() {
            tracing::warn!(%region, "region option not found, continuing");
            return Ok(());
        }
        if let Some(Some(el)) = soften(ctx, "region", driver.find(&option).await)? {
            soften(ctx, "region", driver.click(&el).await)?;
        }
        Ok(())
    }

    /// Home → JurisdictionSelected: dropdown option first, then any link
    /// carrying the jurisdiction name.
    pub(super) async fn select_jurisdiction(
        &mut self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
    ) -> Step {
        let profile = self.profile.clone();
        let name = ctx.jurisdiction.clone();
        let ready = [
            Condition::Present(profile.app_quick_link.clone()),
            Condition::Present(Locator::css(profile.app_links.clone())),
        ];

        if let Some(Some(input)) =
            soften(ctx, "jurisdiction", driver.find(&profile.jurisdiction_input).await)?
        {
            soften(ctx, "jurisdiction", driver.click(&input).await)?;
            soften(ctx, "jurisdiction", driver.type_text(&input, &name).await)?;
        }

        let option = Locator::with_text(profile.jurisdiction_options.clone(), name.clone());
        let shown = driver
            .wait_until(&Condition::Present(option.clone()), profile.probe_timeout())
            .await;
        if soften(ctx, "jurisdiction option", shown)?.is_some() {
            if let Some(Some(el)) = soften(ctx, "jurisdiction option", driver.find(&option).await)? {
                if !self
                    .activate(driver, ctx, el, &ready, "jurisdiction option")
                    .await?
                {
                    ctx.note("jurisdiction option: application links not shown");
                }
                return Ok(NavigationState::JurisdictionSelected);
            }
        }

        tracing::warn!(jurisdiction = %name, "no dropdown option, trying links");
        let link = Locator::with_text(profile.jurisdiction_links.clone(), name.clone());
        if let Some(Some(el)) = soften(ctx, "jurisdiction link", driver.find(&link).await)? {
            self.activate(driver, ctx, el, &ready, "jurisdiction link")
                .await?;
            return Ok(NavigationState::JurisdictionSelected);
        }

        Ok(NavigationState::Failed(FailureReason::JurisdictionNotFound))
    }

    /// JurisdictionSelected → AppEntered: quick-link, then identifier link,
    /// then a URL constructed from a captured identifier.
    pub(super) async fn enter_app(&mut self, driver: &mut dyn PageDriver, ctx: &mut RowContext) -> Step {
        let profile = self.profile.clone();
        let ready = [Condition::UrlContains(profile.app_url_marker.clone())];
        let id_links = Locator::css(profile.app_links.clone());
        let origin = soften(ctx, "app links", driver.current_url().await)?;

        // Capture identifiers from every application link on the page.
        let links = soften(ctx, "app links", driver.find_all(&id_links).await)?.unwrap_or_default();
        for link in &links {
            if let Some(Some(href)) = soften(ctx, "app links", driver.attribute(link, "href").await)? {
                if self.capture_app_id(ctx, &href).is_some() {
                    break;
                }
            }
        }

        if let Some(Some(el)) = soften(ctx, "quick link", driver.find(&profile.app_quick_link).await)? {
            if self.activate(driver, ctx, el, &ready, "quick link").await? {
                return self.app_entered(driver, ctx).await;
            }
        }

        tracing::warn!(jurisdiction = %ctx.jurisdiction, "quick link failed, trying identifier link");
        self.return_to(driver, ctx, origin.as_deref()).await?;
        if let Some(Some(el)) = soften(ctx, "app link", driver.find(&id_links).await)? {
            if self.activate(driver, ctx, el, &ready, "app link").await? {
                return self.app_entered(driver, ctx).await;
            }
        }

        let app_id = ctx
            .app_id()
            .map(str::to_string)
            .or_else(|| self.cached_app_id(&ctx.jurisdiction).map(str::to_string));
        if let Some(app_id) = app_id {
            let url = profile.app_url(&app_id);
            tracing::warn!(%url, "falling back to constructed application URL");
            if soften(ctx, "app url", driver.navigate(&url).await)?.is_some()
                && self.await_ready(driver, ctx, &ready, "app url").await?
            {
                return self.app_entered(driver, ctx).await;
            }
        }

        Ok(NavigationState::Failed(FailureReason::AppEntryUnresolved))
    }

    /// Navigate back to `origin` if a failed attempt left the page.
    async fn return_to(
        &self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
        origin: Option<&str>,
    ) -> Result<(), SessionFault> {
        let Some(origin) = origin else {
            return Ok(());
        };
        let here = soften(ctx, "return", driver.current_url().await)?;
        if here.as_deref() != Some(origin) {
            soften(ctx, "return", driver.navigate(origin).await)?;
        }
        Ok(())
    }

    async fn app_entered(&mut self, driver: &mut dyn PageDriver, ctx: &mut RowContext) -> Step {
        if let Some(url) = soften(ctx, "app url", driver.current_url().await)? {
            self.capture_app_id(ctx, &url);
        }
        Ok(NavigationState::AppEntered)
    }

    /// AppEntered → ConsentCleared. A missing dialog is a pass-through.
    pub(super) async fn clear_consent(
        &mut self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
    ) -> Step {
        let profile = self.profile.clone();
        let dialog = Condition::Present(profile.consent_dialog.clone());
        let shown = driver.wait_until(&dialog, profile.probe_timeout()).await;
        if soften(ctx, "consent", shown)?.is_none() {
            return Ok(NavigationState::ConsentCleared);
        }

        match soften(ctx, "consent", driver.find(&profile.consent_accept).await)? {
            Some(Some(accept)) => {
                soften(ctx, "consent", driver.click(&accept).await)?;
                let gone = Condition::Absent(profile.consent_dialog.clone());
                let waited = driver.wait_until(&gone, profile.step_timeout()).await;
                if soften(ctx, "consent", waited)?.is_none() {
                    tracing::warn!("consent dialog still visible after accepting");
                }
            }
            _ => ctx.note("consent: accept control not found"),
        }
        Ok(NavigationState::ConsentCleared)
    }

    /// ConsentCleared → SearchPanelOpen, expanding collapsed sections.
    pub(super) async fn open_search_panel(
        &mut self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
    ) -> Step {
        let profile = self.profile.clone();
        let input = Condition::Present(profile.search_input.clone());

        let visible = driver.wait_until(&input, profile.probe_timeout()).await;
        if soften(ctx, "search panel", visible)?.is_some() {
            return Ok(NavigationState::SearchPanelOpen);
        }

        for expander in &profile.search_expanders {
            let Some(Some(el)) = soften(ctx, "search expander", driver.find(expander).await)? else {
                continue;
            };
            tracing::debug!(%expander, "expanding search section");
            soften(ctx, "search expander", driver.click(&el).await)?;
            let opened = driver.wait_until(&input, profile.probe_timeout()).await;
            if soften(ctx, "search expander", opened)?.is_some() {
                return Ok(NavigationState::SearchPanelOpen);
            }
        }

        Ok(NavigationState::Failed(FailureReason::SearchPanelUnavailable))
    }

    /// SearchPanelOpen → Detail | ResultsAmbiguous.
    pub(super) async fn submit_search(
        &mut self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
    ) -> Step {
        let profile = self.profile.clone();

        let Some(Some(input)) = soften(ctx, "search", driver.find(&profile.search_input).await)? else {
            return Ok(NO_RESULTS);
        };
        let address = ctx.address.clone();
        if soften(ctx, "search", driver.type_text(&input, &address).await)?.is_none() {
            return Ok(NO_RESULTS);
        }

        let mut submitted = false;
        for submit in &profile.search_submits {
            if let Some(Some(el)) = soften(ctx, "search submit", driver.find(submit).await)? {
                if soften(ctx, "search submit", driver.click(&el).await)?.is_some() {
                    submitted = true;
                    break;
                }
            }
        }
        if !submitted {
            ctx.note("search submit: no control accepted the click");
            return Ok(NO_RESULTS);
        }

        let outcomes = [
            Condition::Present(profile.detail_marker.clone()),
            Condition::Present(profile.result_links.clone()),
            Condition::Present(profile.no_results.clone()),
        ];
        let seen = driver
            .wait_for_any(&outcomes, profile.step_timeout())
            .await;
        match soften(ctx, "search results", seen)? {
            Some(0) => Ok(NavigationState::Detail),
            Some(1) => Ok(NavigationState::ResultsAmbiguous),
            _ => Ok(NO_RESULTS),
        }
    }

    /// ResultsAmbiguous → Detail via the first candidate.
    pub(super) async fn pick_first_result(
        &mut self,
        driver: &mut dyn PageDriver,
        ctx: &mut RowContext,
    ) -> Step {
        let profile = self.profile.clone();
        let rows = soften(ctx, "results", driver.find_all(&profile.results_rows).await)?
            .map_or(0, |r| r.len());
        tracing::debug!(candidates = rows, "disambiguating by first result");

        let ready = [Condition::Present(profile.detail_marker.clone())];
        if let Some(Some(first)) = soften(ctx, "results", driver.find(&profile.result_links).await)? {
            if self.activate(driver, ctx, first, &ready, "first result").await? {
                return Ok(NavigationState::Detail);
            }
        }
        Ok(NavigationState::Failed(
            FailureReason::AmbiguousResultUnresolvable,
        ))
    }
}
