//! Minimal W3C WebDriver client (chromedriver / geckodriver) over reqwest.

use super::browser::Browser;
use crate::config::ScraperConfig;
use crate::error::BrowserError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// How far a failed request got, as far as repeating it is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendFailure {
    /// Never reached the driver.
    NotConnected,
    /// May have been written before the connection broke.
    InFlight,
    Other,
}

impl SendFailure {
    fn of(e: &BrowserError) -> Self {
        match e {
            BrowserError::Transport(e) if e.is_timeout() => SendFailure::Other,
            BrowserError::Transport(e) if e.is_connect() => SendFailure::NotConnected,
            BrowserError::Transport(e) if e.is_request() => SendFailure::InFlight,
            _ => SendFailure::Other,
        }
    }
}

/// Commands like typing a key or clicking must not run twice, so a request
/// that may already have reached the driver is only repeated for GET/DELETE.
fn should_retry(method: &Method, failure: SendFailure) -> bool {
    match failure {
        SendFailure::NotConnected => true,
        SendFailure::InFlight => *method == Method::GET || *method == Method::DELETE,
        SendFailure::Other => false,
    }
}

pub struct WebDriverBrowser {
    http: reqwest::Client,
    endpoint: String,
    session_id: Option<String>,
    timeout: Duration,
    poll_interval: Duration,
    max_retries: usize,
}

impl WebDriverBrowser {
    /// Start a new browser session on the configured driver.
    pub async fn launch(config: &ScraperConfig) -> Result<Self, BrowserError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let mut browser = Self {
            http,
            endpoint: config.webdriver_url.trim_end_matches('/').to_string(),
            session_id: None,
            timeout,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(10)),
            max_retries: config.max_retries,
        };

        let mut args = vec!["--window-size=1280,1024"];
        if config.headless {
            args.push("--headless=new");
        }
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let url = format!("{}/session", browser.endpoint);
        let value = browser.send(Method::POST, &url, Some(caps)).await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Payload(format!("no sessionId in {}", value)))?;

        debug!("WebDriver session {} started", id);
        browser.session_id = Some(id.to_string());
        Ok(browser)
    }

    fn session_url(&self, path: &str) -> Result<String, BrowserError> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| BrowserError::Payload("session already closed".into()))?;
        Ok(format!("{}/session/{}{}", self.endpoint, id, path))
    }

    /// One request, retried only where repeating it is harmless.
    async fn send(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value, BrowserError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(100)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.max_retries);

        RetryIf::spawn(
            strategy,
            || self.send_once(method.clone(), url, body.as_ref()),
            |e: &BrowserError| {
                let retry = should_retry(&method, SendFailure::of(e));
                if retry {
                    warn!("WebDriver {} {} failed, retrying: {}", method, url, e);
                }
                retry
            },
        )
        .await
    }

    async fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, BrowserError> {
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Err(BrowserError::Timeout(self.timeout)),
            Err(e) => return Err(e.into()),
        };
        let status = resp.status();
        let mut payload: Value = resp.json().await?;
        let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(value);
        }

        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
        let message = value.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
        Err(match error.as_str() {
            "javascript error" => BrowserError::Script(message),
            "timeout" | "script timeout" => BrowserError::RemoteTimeout(message),
            "no such element" => BrowserError::NoSuchElement(message),
            _ => BrowserError::Protocol { error, message },
        })
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<String>, BrowserError> {
        let url = self.session_url("/elements")?;
        let value = self
            .send(Method::POST, &url, Some(json!({ "using": "css selector", "value": selector })))
            .await?;
        let ids = value
            .as_array()
            .map(|els| {
                els.iter()
                    .filter_map(|el| el.get(ELEMENT_KEY).and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn find_element(&self, selector: &str) -> Result<String, BrowserError> {
        self.find_elements(selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BrowserError::NoSuchElement(selector.to_string()))
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to {}", url);
        let endpoint = self.session_url("/url")?;
        self.send(Method::POST, &endpoint, Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        let endpoint = self.session_url("/url")?;
        let value = self.send(Method::GET, &endpoint, None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BrowserError::Payload(format!("url is not a string: {}", value)))
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.find_elements(selector).await?.is_empty() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let el = self.find_element(selector).await?;
        let endpoint = self.session_url(&format!("/element/{}/click", el))?;
        self.send(Method::POST, &endpoint, Some(json!({}))).await?;
        Ok(())
    }

    async fn send_keys(&mut self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let el = self.find_element(selector).await?;
        let endpoint = self.session_url(&format!("/element/{}/value", el))?;
        self.send(Method::POST, &endpoint, Some(json!({ "text": text }))).await?;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        let endpoint = self.session_url("/execute/sync")?;
        self.send(Method::POST, &endpoint, Some(json!({ "script": script, "args": [] })))
            .await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };
        let endpoint = format!("{}/session/{}", self.endpoint, id);
        self.send(Method::DELETE, &endpoint, None).await?;
        debug!("WebDriver session {} closed", id);
        Ok(())
    }
}
