use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// ── Raw extraction ────────────────────────────────────────────────────────────

/// One site-reported point, as read from a ride's chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSample {
    pub ride_id: String,
    pub timestamp: NaiveDateTime,
    pub queue_time: u32,
    pub is_closed: bool,
}

impl RawSample {
    /// A reported wait of zero minutes means the ride was closed.
    pub fn new(ride_id: impl Into<String>, timestamp: NaiveDateTime, queue_time: u32) -> Self {
        Self {
            ride_id: ride_id.into(),
            timestamp,
            queue_time,
            is_closed: queue_time == 0,
        }
    }
}

/// Everything read from one panel on a calendar page.
#[derive(Debug, Clone, PartialEq)]
pub struct RideSeries {
    pub ride_id: String,
    pub ride_name: String,
    pub samples: Vec<RawSample>,
}

// ── Persisted shapes ──────────────────────────────────────────────────────────

/// A sample snapped onto the 15-minute grid; one row of `queue_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedSample {
    pub date: NaiveDate,
    pub ride_id: String,
    pub park_id: String,
    pub time_of_day: NaiveTime,
    pub queue_time: u32,
    pub is_closed: bool,
}

impl AlignedSample {
    /// Grid slot as stored, e.g. `"09:45"`.
    pub fn slot_label(&self) -> String {
        self.time_of_day.format("%H:%M").to_string()
    }
}

/// Flattened `queue_data ⋈ park_info` row used by `export`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub date: String,
    pub park_id: String,
    pub ride_id: String,
    pub ride_name: String,
    pub time_of_day: String,
    pub queue_time: i64,
    pub is_closed: bool,
}

/// Per-park coverage shown by `stats`.
#[derive(Debug, Clone)]
pub struct ParkCoverage {
    pub park_id: String,
    pub rides: i64,
    pub days: i64,
    pub first: Option<String>,
    pub last: Option<String>,
}
