//! Error taxonomy for an ingestion run.
//!
//! Only [`IngestError::is_fatal`] kinds stop a run; everything else is caught
//! at the date (or ride) boundary and folded into the run summary.

use chrono::NaiveDate;
use std::time::Duration;
use thiserror::Error;

/// Problems with the configured window, parks or credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} {value:?}: expected YYYY/MM/DD or YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },

    #[error("end_date {end} is before start_date {start}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("exclude_months contains {0}, months must be 1-12")]
    InvalidMonth(u32),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid base_url {0:?}")]
    InvalidUrl(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Failures talking to the remote browser.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("webdriver timed out: {0}")]
    RemoteTimeout(String),

    #[error("no element matches {0:?}")]
    NoSuchElement(String),

    #[error("webdriver returned {error}: {message}")]
    Protocol { error: String, message: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected webdriver payload: {0}")]
    Payload(String),
}

impl BrowserError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::Timeout(_) | BrowserError::RemoteTimeout(_))
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("store initialisation failed: {0}")]
    StoreInit(String),

    #[error("browser session unavailable: {0}")]
    Session(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("persistence failed for park {park_id} on {date}: {message}")]
    Persistence {
        park_id: String,
        date: NaiveDate,
        message: String,
    },
}

impl IngestError {
    /// Run-scoped errors abort the whole run; the rest are per-date.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Config(_)
                | IngestError::Auth(_)
                | IngestError::StoreInit(_)
                | IngestError::Session(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_match_run_scope() {
        assert!(IngestError::Auth("wrong domain".into()).is_fatal());
        assert!(IngestError::Config(ConfigError::InvalidMonth(13)).is_fatal());
        assert!(IngestError::StoreInit("locked".into()).is_fatal());
        assert!(!IngestError::Extraction("script".into()).is_fatal());
        assert!(
            !IngestError::Persistence {
                park_id: "4".into(),
                date: NaiveDate::from_ymd_opt(2024, 10, 30).unwrap(),
                message: "constraint".into(),
            }
            .is_fatal()
        );
    }
}
