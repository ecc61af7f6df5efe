//! Run orchestrator: ties planner → extractor → aligner → storage together.
//!
//! ## Failure model
//!
//! Configuration, store initialisation, browser launch and login failures end
//! the run. Everything after login is scoped to one park/date: a timeout,
//! broken page, empty alignment or failed batch is logged, tallied in the
//! [`RunSummary`] and the run moves on to the next date.

use crate::aligner::align;
use crate::config::{AppConfig, Credentials};
use crate::error::IngestError;
use crate::models::RideSeries;
use crate::planner::plan_dates;
use crate::scraper::browser::Browser;
use crate::scraper::pacing::{PacingPolicy, RandomPacing};
use crate::scraper::webdriver::WebDriverBrowser;
use crate::scraper::{SessionExtractor, Waits};
use crate::storage::{Repository, RunTotals};
use chrono::NaiveDate;
use std::fmt;
use tracing::{debug, error, info, info_span, warn, Instrument};

// ── Per-step results ──────────────────────────────────────────────────────────

/// Result of one unit of work that is allowed to be skipped.
#[derive(Debug)]
pub enum Outcome<T> {
    Ok(T),
    Skipped(SkipReason),
    Failed(IngestError),
}

impl<T> Outcome<T> {
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => f(v),
            Outcome::Skipped(r) => Outcome::Skipped(r),
            Outcome::Failed(e) => Outcome::Failed(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The calendar page rendered no ride panels in time.
    NoPanels,
    /// The page or a script call timed out.
    NavigationTimeout,
    /// Rides were found but none had a sample near any grid slot.
    EmptyAlignment,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NoPanels => "no ride panels",
            SkipReason::NavigationTimeout => "navigation timeout",
            SkipReason::EmptyAlignment => "nothing aligned",
        };
        f.write_str(s)
    }
}

/// What got written for one park/date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredBatch {
    pub rides: usize,
    pub new_rides: usize,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateStatus {
    Stored(StoredBatch),
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DateReport {
    pub park_id: String,
    pub date: NaiveDate,
    pub status: DateStatus,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub parks_processed: usize,
    pub parks_failed: usize,
    pub dates_planned: usize,
    pub dates_stored: usize,
    pub dates_skipped: usize,
    pub dates_failed: usize,
    pub samples_inserted: usize,
    pub rides_registered: usize,
    pub reports: Vec<DateReport>,
}

impl RunSummary {
    fn record(&mut self, park_id: &str, date: NaiveDate, outcome: Outcome<StoredBatch>) {
        let status = match outcome {
            Outcome::Ok(batch) => {
                self.dates_stored += 1;
                self.samples_inserted += batch.samples;
                self.rides_registered += batch.new_rides;
                DateStatus::Stored(batch)
            }
            Outcome::Skipped(reason) => {
                self.dates_skipped += 1;
                DateStatus::Skipped(reason)
            }
            Outcome::Failed(e) => {
                self.dates_failed += 1;
                DateStatus::Failed(e.to_string())
            }
        };
        self.reports.push(DateReport { park_id: park_id.to_string(), date, status });
    }

    pub fn totals(&self) -> RunTotals {
        RunTotals {
            dates_stored: self.dates_stored,
            dates_skipped: self.dates_skipped,
            dates_failed: self.dates_failed,
            samples_inserted: self.samples_inserted,
        }
    }

    #[cfg(test)]
    pub fn status_of(&self, park_id: &str, date: NaiveDate) -> Option<&DateStatus> {
        self.reports
            .iter()
            .find(|r| r.park_id == park_id && r.date == date)
            .map(|r| &r.status)
    }
}

// ── Ingestor ──────────────────────────────────────────────────────────────────

/// Holds the run's one browser session and one store connection.
pub struct Ingestor<B: Browser, P: PacingPolicy> {
    extractor: SessionExtractor<B, P>,
    repo: Repository,
    run_id: Option<i64>,
}

impl<B: Browser, P: PacingPolicy> Ingestor<B, P> {
    pub fn new(extractor: SessionExtractor<B, P>, repo: Repository) -> Self {
        Self { extractor, repo, run_id: None }
    }

    /// Log in, then ingest every planned date of every park, in order.
    /// The browser session is closed on every path out of here.
    pub async fn run(
        &mut self,
        creds: &Credentials,
        park_ids: &[String],
        candidates: &[NaiveDate],
    ) -> Result<RunSummary, IngestError> {
        self.run_id = match self.repo.begin_ingest_run() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Could not open run log entry: {:#}", e);
                None
            }
        };

        if let Err(e) = self.extractor.authenticate(creds).await {
            error!("Login failed, aborting run: {}", e);
            self.extractor.close().await;
            self.finish_run(&RunSummary::default(), Some(&e.to_string()));
            return Err(e);
        }

        let mut summary = RunSummary::default();
        for park_id in park_ids.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            let span = info_span!("park", park_id = %park_id);
            self.ingest_park(park_id, candidates, &mut summary)
                .instrument(span)
                .await;
        }

        self.extractor.close().await;
        self.finish_run(&summary, None);
        info!(
            "Run complete: {} stored | {} skipped | {} failed | {} samples | {} new rides",
            summary.dates_stored,
            summary.dates_skipped,
            summary.dates_failed,
            summary.samples_inserted,
            summary.rides_registered,
        );
        Ok(summary)
    }

    /// Release the store connection.
    pub fn close(self) {
        if let Err(e) = self.repo.close() {
            warn!("{:#}", e);
        }
    }

    fn finish_run(&self, summary: &RunSummary, error: Option<&str>) {
        let Some(run_id) = self.run_id else { return };
        if let Err(e) = self.repo.finish_ingest_run(run_id, summary.totals(), error) {
            warn!("Could not close run log entry {}: {:#}", run_id, e);
        }
    }

    async fn ingest_park(&mut self, park_id: &str, candidates: &[NaiveDate], summary: &mut RunSummary) {
        let existing = match self.repo.existing_dates(park_id) {
            Ok(existing) => existing,
            Err(e) => {
                // without the dedup set every date would be re-ingested
                error!("Could not read stored dates for park {}, skipping park: {:#}", park_id, e);
                summary.parks_failed += 1;
                return;
            }
        };

        let planned = plan_dates(candidates, &existing);
        info!(
            "Processing {} new dates for park {} ({} already stored)",
            planned.len(),
            park_id,
            candidates.len() - planned.len()
        );
        summary.parks_processed += 1;
        summary.dates_planned += planned.len();

        for date in planned {
            let outcome = self.ingest_date(park_id, date).await;
            summary.record(park_id, date, outcome);
        }
    }

    async fn ingest_date(&mut self, park_id: &str, date: NaiveDate) -> Outcome<StoredBatch> {
        let outcome = self
            .extractor
            .extract_for_date(park_id, date)
            .await
            .and_then(|rides| self.persist(park_id, date, &rides));

        if let Outcome::Failed(e) = &outcome {
            error!("Park {} on {}: {}", park_id, date, e);
        }
        outcome
    }

    /// Align each ride, then register rides and append the date's batch.
    fn persist(&self, park_id: &str, date: NaiveDate, rides: &[RideSeries]) -> Outcome<StoredBatch> {
        let mut present = Vec::with_capacity(rides.len());
        let mut batch = Vec::new();
        for ride in rides {
            let aligned = align(date, park_id, &ride.samples);
            if aligned.is_empty() {
                debug!("Ride {}: no samples within tolerance of the grid", ride.ride_id);
                continue;
            }
            present.push(ride);
            batch.extend(aligned);
        }

        if batch.is_empty() {
            info!("No aligned samples for park {} on {}, nothing stored", park_id, date);
            return Outcome::Skipped(SkipReason::EmptyAlignment);
        }

        let failed = |e: anyhow::Error| -> Outcome<StoredBatch> {
            Outcome::Failed(IngestError::Persistence {
                park_id: park_id.to_string(),
                date,
                message: format!("{:#}", e),
            })
        };

        let mut new_rides = 0;
        for ride in &present {
            match self.repo.upsert_ride_metadata(&ride.ride_id, park_id, &ride.ride_name) {
                Ok(inserted) => new_rides += inserted as usize,
                Err(e) => return failed(e),
            }
        }

        match self.repo.append_aligned_samples(date, park_id, &batch) {
            Ok(samples) => {
                info!(
                    "Stored {} samples across {} rides for park {} on {}",
                    samples,
                    present.len(),
                    park_id,
                    date
                );
                Outcome::Ok(StoredBatch { rides: present.len(), new_rides, samples })
            }
            Err(e) => failed(e),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Full production run against the live site.
    pub async fn run(&self) -> Result<RunSummary, IngestError> {
        // all configuration problems surface before any network activity
        let candidates = self.config.validate()?;
        let creds = Credentials::from_env()?;
        let site = self.config.site_url()?;

        let repo = Repository::open(&self.config.storage.db_path)
            .map_err(|e| IngestError::StoreInit(format!("{:#}", e)))?;
        if self.config.storage.run_migrations {
            repo.run_migrations()
                .map_err(|e| IngestError::StoreInit(format!("{:#}", e)))?;
        }

        let browser = WebDriverBrowser::launch(&self.config.scraper)
            .await
            .map_err(|e| IngestError::Session(e.to_string()))?;
        info!("Browser session started via {}", self.config.scraper.webdriver_url);

        let extractor = SessionExtractor::new(
            browser,
            RandomPacing::new(&self.config.pacing),
            site,
            Waits::from(&self.config.scraper),
        );

        let mut ingestor = Ingestor::new(extractor, repo);
        let result = ingestor
            .run(&creds, &self.config.ingest.park_ids, &candidates)
            .await;
        ingestor.close();
        result
    }
}
