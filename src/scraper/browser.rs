use crate::error::BrowserError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// The few browser capabilities the extractor relies on.
///
/// Production talks W3C WebDriver; tests script a fake. Everything here is a
/// network round trip in the real implementation.
#[async_trait]
pub trait Browser: Send {
    async fn goto(&mut self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// `Ok(false)` when nothing matched `selector` before `timeout`.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool, BrowserError>;

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;

    async fn send_keys(&mut self, selector: &str, text: &str) -> Result<(), BrowserError>;

    /// Run a read-only script in the page and return what it returns.
    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}
