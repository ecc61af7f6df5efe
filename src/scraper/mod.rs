//! Session-bound extraction from queue-times.com calendar pages.
//!
//! One [`SessionExtractor`] owns one browser session: it logs in once, then
//! visits one park/date calendar page at a time and reads each ride panel's
//! chart. A date whose panels never render is skipped; a panel without a ride
//! link, chart or park series is skipped on its own.

pub mod browser;
pub mod cleaner;
pub mod pacing;
pub mod parsers;
pub mod webdriver;

#[cfg(test)]
pub mod fake;

use crate::config::{Credentials, ScraperConfig};
use crate::error::{BrowserError, ConfigError, IngestError};
use crate::models::RideSeries;
use crate::pipeline::{Outcome, SkipReason};
use chrono::NaiveDate;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use self::browser::Browser;
use self::pacing::{PaceStep, PacingPolicy};
use self::parsers::{panel_to_series, parse_panels, PANEL_SCRIPT};

// ── Selectors ─────────────────────────────────────────────────────────────────

const CONSENT_BUTTON: &str = "a.cmpboxbtn.cmpboxbtnyes";
const EMAIL_INPUT: &str = "#user_email";
const PASSWORD_INPUT: &str = "#user_password";
const SUBMIT_BUTTON: &str = "input[type=\"submit\"]";
const PAGE_BODY: &str = "body";
const RIDE_PANEL: &str = ".panel";

// ── Session state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    NavigatingDate,
    AwaitingContent,
    Extracting,
    DateComplete,
    SessionClosed,
    AuthFailed,
}

impl SessionState {
    /// States from which a new date may be started.
    fn ready(self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::DateComplete)
    }
}

/// Timeouts the extractor needs, lifted out of [`ScraperConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Waits {
    pub consent: Duration,
    pub login: Duration,
    pub content: Duration,
}

impl From<&ScraperConfig> for Waits {
    fn from(c: &ScraperConfig) -> Self {
        Self {
            consent: Duration::from_secs(c.consent_wait_secs),
            login: Duration::from_secs(c.login_wait_secs),
            content: Duration::from_secs(c.content_wait_secs),
        }
    }
}

// ── Extractor ─────────────────────────────────────────────────────────────────

pub struct SessionExtractor<B: Browser, P: PacingPolicy> {
    browser: B,
    pacing: P,
    site: Url,
    waits: Waits,
    state: SessionState,
}

impl<B: Browser, P: PacingPolicy> SessionExtractor<B, P> {
    pub fn new(browser: B, pacing: P, site: Url, waits: Waits) -> Self {
        Self {
            browser,
            pacing,
            site,
            waits,
            state: SessionState::Unauthenticated,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn browser(&self) -> &B {
        &self.browser
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {:?} → {:?}", self.state, next);
        self.state = next;
    }

    async fn pause(&self, step: PaceStep) {
        let delay = self.pacing.next_delay(step);
        if !delay.is_zero() {
            debug!("Pacing {:?}: {:.2?}", step, delay);
            sleep(delay).await;
        }
    }

    fn site_path(&self, path: &str) -> Result<Url, ConfigError> {
        self.site
            .join(path)
            .map_err(|_| ConfigError::InvalidUrl(format!("{}{}", self.site, path)))
    }

    /// Calendar page for one park and day, e.g. `/parks/4/calendar/2024/10/30`.
    pub fn calendar_url(&self, park_id: &str, date: NaiveDate) -> Result<Url, ConfigError> {
        self.site_path(&format!("/parks/{}/calendar/{}", park_id, date.format("%Y/%m/%d")))
    }

    // ── Authentication ────────────────────────────────────────────────────────

    /// Log in once. Any failure leaves the session in `AuthFailed`.
    pub async fn authenticate(&mut self, creds: &Credentials) -> Result<(), IngestError> {
        if self.state != SessionState::Unauthenticated {
            return Err(IngestError::Auth(format!("cannot authenticate from {:?}", self.state)));
        }
        self.transition(SessionState::Authenticating);
        info!("Logging in as {}", creds.username);

        match self.login_flow(creds).await {
            Ok(()) => {
                self.transition(SessionState::Authenticated);
                info!("Login completed");
                Ok(())
            }
            Err(e) => {
                self.transition(SessionState::AuthFailed);
                Err(e)
            }
        }
    }

    async fn login_flow(&mut self, creds: &Credentials) -> Result<(), IngestError> {
        let auth = |what: &str, e: BrowserError| IngestError::Auth(format!("{}: {}", what, e));

        let login_url = self.site_path("/users/sign_in")?;
        self.browser
            .goto(login_url.as_str())
            .await
            .map_err(|e| auth("login page", e))?;
        self.pause(PaceStep::AfterNavigation).await;

        self.accept_cookies().await.map_err(|e| auth("cookie consent", e))?;

        self.type_paced(EMAIL_INPUT, &creds.username)
            .await
            .map_err(|e| auth("username", e))?;
        self.pause(PaceStep::BetweenFields).await;
        self.type_paced(PASSWORD_INPUT, &creds.password)
            .await
            .map_err(|e| auth("password", e))?;
        self.pause(PaceStep::BeforeSubmit).await;

        self.browser
            .click(SUBMIT_BUTTON)
            .await
            .map_err(|e| auth("submit", e))?;

        let rendered = self
            .browser
            .wait_for(PAGE_BODY, self.waits.login)
            .await
            .map_err(|e| auth("post-login page", e))?;
        if !rendered {
            return Err(IngestError::Auth(format!(
                "post-login page did not render within {:?}",
                self.waits.login
            )));
        }

        let landed = self
            .browser
            .current_url()
            .await
            .map_err(|e| auth("post-login url", e))?;
        if !self.on_site(&landed) {
            return Err(IngestError::Auth(format!("login redirected off-site to {}", landed)));
        }
        debug!("Post-login URL: {}", landed);

        self.pause(PaceStep::AfterLogin).await;
        Ok(())
    }

    /// Same host as the configured site, or a subdomain of it.
    fn on_site(&self, url: &str) -> bool {
        let Some(expected) = self.site.host_str() else { return false };
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .is_some_and(|h| h == expected || h.ends_with(&format!(".{}", expected)))
    }

    /// The consent banner is optional; not seeing it is fine.
    async fn accept_cookies(&mut self) -> Result<(), BrowserError> {
        if self.browser.wait_for(CONSENT_BUTTON, self.waits.consent).await? {
            debug!("Cookie consent found, accepting");
            self.browser.click(CONSENT_BUTTON).await?;
            self.pause(PaceStep::AfterConsent).await;
        } else {
            debug!("No cookie consent prompt");
        }
        Ok(())
    }

    async fn type_paced(&mut self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.browser.send_keys(selector, ch.encode_utf8(&mut buf)).await?;
            self.pause(PaceStep::Keystroke).await;
        }
        Ok(())
    }

    // ── Extraction ────────────────────────────────────────────────────────────

    /// Extract every ride's raw samples for one park/day.
    ///
    /// Never fails the run: timeouts become `Skipped`, browser or script
    /// errors become `Failed` for this date only.
    pub async fn extract_for_date(&mut self, park_id: &str, date: NaiveDate) -> Outcome<Vec<RideSeries>> {
        if !self.state.ready() {
            return Outcome::Failed(IngestError::Extraction(format!(
                "session not ready for extraction ({:?})",
                self.state
            )));
        }

        let outcome = match self.extract_inner(park_id, date).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_timeout() => {
                warn!("Timed out loading park {} on {}: {}", park_id, date, e);
                Outcome::Skipped(SkipReason::NavigationTimeout)
            }
            Err(e) => Outcome::Failed(IngestError::Extraction(e.to_string())),
        };
        self.transition(SessionState::DateComplete);
        outcome
    }

    async fn extract_inner(
        &mut self,
        park_id: &str,
        date: NaiveDate,
    ) -> Result<Outcome<Vec<RideSeries>>, BrowserError> {
        let url = match self.calendar_url(park_id, date) {
            Ok(url) => url,
            Err(e) => return Ok(Outcome::Failed(e.into())),
        };

        self.transition(SessionState::NavigatingDate);
        info!("Processing {}", url);
        self.browser.goto(url.as_str()).await?;
        self.pause(PaceStep::AfterNavigation).await;

        self.transition(SessionState::AwaitingContent);
        if !self.browser.wait_for(RIDE_PANEL, self.waits.content).await? {
            warn!(
                "No ride panels for park {} on {} within {:?}",
                park_id, date, self.waits.content
            );
            return Ok(Outcome::Skipped(SkipReason::NoPanels));
        }

        self.transition(SessionState::Extracting);
        let raw = self.browser.evaluate(PANEL_SCRIPT).await?;
        let panels = parse_panels(raw)
            .map_err(|e| BrowserError::Script(format!("unexpected panel payload: {}", e)))?;

        let mut rides = Vec::with_capacity(panels.len());
        for (i, panel) in panels.iter().enumerate() {
            match panel_to_series(panel) {
                Ok(series) => {
                    debug!(
                        "Ride {} ({}): {} points",
                        series.ride_id,
                        series.ride_name,
                        series.samples.len()
                    );
                    rides.push(series);
                }
                Err(skip) => warn!("Park {} on {}: skipping panel {}: {}", park_id, date, i, skip),
            }
        }

        info!("Extracted {} of {} rides for park {} on {}", rides.len(), panels.len(), park_id, date);
        Ok(Outcome::Ok(rides))
    }

    /// End the browser session. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == SessionState::SessionClosed {
            return;
        }
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser session cleanly: {}", e);
        }
        self.transition(SessionState::SessionClosed);
    }
}
