//! Scripted [`Browser`] for tests: canned selectors, per-date panel payloads
//! and a log of every call made.

use super::browser::Browser;
use crate::error::BrowserError;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Goto(String),
    CurrentUrl,
    WaitFor(String),
    Click(String),
    Keys(String, String),
    Evaluate,
    Close,
}

#[derive(Debug, Default)]
pub struct FakeBrowser {
    pub calls: Vec<FakeCall>,
    selectors: HashSet<String>,
    landing_url: Option<String>,
    location: String,
    pages: HashMap<NaiveDate, Value>,
    failing: HashSet<NaiveDate>,
    empty_dates: HashSet<NaiveDate>,
    slow_dates: HashSet<NaiveDate>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// A site where login works and every page renders panels.
    pub fn logged_in() -> Self {
        Self::new().with_selector("body").with_selector(".panel")
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selectors.insert(selector.to_string());
        self
    }

    /// Pretend every navigation lands on `url`.
    pub fn with_url(mut self, url: &str) -> Self {
        self.landing_url = Some(url.to_string());
        self
    }

    pub fn clear_selector(&mut self, selector: &str) {
        self.selectors.remove(selector);
    }

    pub fn page_panels(&mut self, date: NaiveDate, panels: Value) {
        self.pages.insert(date, panels);
    }

    pub fn fail_script_for(&mut self, date: NaiveDate) {
        self.failing.insert(date);
    }

    /// Calendar page for `date` never renders its panels.
    pub fn no_panels_on(&mut self, date: NaiveDate) {
        self.empty_dates.insert(date);
    }

    /// Navigating to the calendar page for `date` times out.
    pub fn timeout_on(&mut self, date: NaiveDate) {
        self.slow_dates.insert(date);
    }

    pub fn visited_dates(&self) -> Vec<NaiveDate> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                FakeCall::Goto(url) => date_from_url(url),
                _ => None,
            })
            .collect()
    }

    /// Panel payload shaped like the page script's output, labels on `date`.
    pub fn panel(date: NaiveDate, ride_id: &str, name: &str, points: &[(&str, u32)]) -> Value {
        let labels: Vec<String> = points
            .iter()
            .map(|(t, _)| format!("{} {}", date.format("%Y-%m-%d"), t))
            .collect();
        let data: Vec<u32> = points.iter().map(|(_, q)| *q).collect();
        json!({
            "href": format!("/parks/4/rides/{}", ride_id),
            "name": name,
            "has_chart": true,
            "labels": labels,
            "datasets": [
                { "label": "Reported by users", "data": data },
                { "label": "Reported by park", "data": data }
            ]
        })
    }

    fn current_date(&self) -> Option<NaiveDate> {
        date_from_url(&self.location)
    }
}

/// `…/calendar/2024/10/30` → 2024-10-30
fn date_from_url(url: &str) -> Option<NaiveDate> {
    let (_, tail) = url.split_once("/calendar/")?;
    NaiveDate::parse_from_str(tail.trim_end_matches('/'), "%Y/%m/%d").ok()
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        self.calls.push(FakeCall::Goto(url.to_string()));
        self.location = url.to_string();
        if self.current_date().is_some_and(|d| self.slow_dates.contains(&d)) {
            return Err(BrowserError::Timeout(Duration::from_secs(30)));
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        self.calls.push(FakeCall::CurrentUrl);
        Ok(self.landing_url.clone().unwrap_or_else(|| self.location.clone()))
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<bool, BrowserError> {
        self.calls.push(FakeCall::WaitFor(selector.to_string()));
        if selector == ".panel" && self.current_date().is_some_and(|d| self.empty_dates.contains(&d)) {
            return Ok(false);
        }
        Ok(self.selectors.contains(selector))
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        self.calls.push(FakeCall::Click(selector.to_string()));
        Ok(())
    }

    async fn send_keys(&mut self, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.calls.push(FakeCall::Keys(selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<Value, BrowserError> {
        self.calls.push(FakeCall::Evaluate);
        let date = self.current_date();
        if date.is_some_and(|d| self.failing.contains(&d)) {
            return Err(BrowserError::Script("Chart is not defined".into()));
        }
        Ok(date
            .and_then(|d| self.pages.get(&d).cloned())
            .unwrap_or_else(|| json!([])))
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.calls.push(FakeCall::Close);
        Ok(())
    }
}
