use crate::models::{AlignedSample, ExportRow, ParkCoverage};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS queue_data_id_seq START 1;

CREATE TABLE IF NOT EXISTS queue_data (
    id          BIGINT PRIMARY KEY DEFAULT nextval('queue_data_id_seq'),
    date        TEXT    NOT NULL,
    ride_id     TEXT    NOT NULL CHECK (ride_id <> ''),
    time_of_day TEXT    NOT NULL,
    queue_time  INTEGER NOT NULL,
    -- 0 open, 1 closed
    is_closed   INTEGER NOT NULL CHECK (is_closed IN (0, 1))
);

CREATE TABLE IF NOT EXISTS park_info (
    ride_id     TEXT NOT NULL,
    park_id     TEXT NOT NULL,
    ride_name   TEXT,
    PRIMARY KEY (ride_id, park_id)
);

CREATE SEQUENCE IF NOT EXISTS ingest_runs_id_seq START 1;

CREATE TABLE IF NOT EXISTS ingest_runs (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('ingest_runs_id_seq'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    dates_stored        INTEGER DEFAULT 0,
    dates_skipped       INTEGER DEFAULT 0,
    dates_failed        INTEGER DEFAULT 0,
    samples_inserted    INTEGER DEFAULT 0,
    error               VARCHAR
);

-- stores created before the error column existed
ALTER TABLE ingest_runs ADD COLUMN IF NOT EXISTS error VARCHAR;

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_queue_ride_date ON queue_data (ride_id, date);
CREATE INDEX IF NOT EXISTS idx_park_info_park  ON park_info (park_id);
"#;

/// Dates are stored as ISO text so they sort lexically.
fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Final tallies written to `ingest_runs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunTotals {
    pub dates_stored: usize,
    pub dates_skipped: usize,
    pub dates_failed: usize,
    pub samples_inserted: usize,
}

/// Most recent `ingest_runs` row, as shown by `stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastRun {
    pub status: String,
    pub error: Option<String>,
}

// ── Repository ────────────────────────────────────────────────────────────────

/// Sole owner of the durable store.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    /// Release the connection, surfacing any close error.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("Failed to close DuckDB")
    }

    // ── Ride metadata ─────────────────────────────────────────────────────────

    /// Insert-or-ignore. Returns `true` only when a new row was written.
    pub fn upsert_ride_metadata(&self, ride_id: &str, park_id: &str, ride_name: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO park_info (ride_id, park_id, ride_name) VALUES (?, ?, ?)",
                params![ride_id, park_id, ride_name],
            )
            .with_context(|| format!("upsert park_info {} / {}", park_id, ride_id))?;

        if n > 0 {
            debug!("Registered ride {} ({}) for park {}", ride_id, ride_name, park_id);
        }
        Ok(n > 0)
    }

    #[cfg(test)]
    pub fn ride_count(&self, park_id: &str) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM park_info WHERE park_id = ?")?;
        Ok(s.query_row(params![park_id], |r| r.get(0))?)
    }

    // ── Queue samples ─────────────────────────────────────────────────────────

    /// Append one date's batch for a park. All rows commit together or none do.
    pub fn append_aligned_samples(
        &self,
        date: NaiveDate,
        park_id: &str,
        samples: &[AlignedSample],
    ) -> Result<usize> {
        if samples.is_empty() { return Ok(0); }

        let day = date_key(date);
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO queue_data (date, ride_id, time_of_day, queue_time, is_closed)
                   VALUES (?, ?, ?, ?, ?)"#,
            )?;
            for s in samples {
                stmt.execute(params![
                    day,
                    s.ride_id,
                    s.slot_label(),
                    s.queue_time as i64,
                    s.is_closed as i32,
                ])
                .with_context(|| {
                    format!("insert {} {} {} for park {}", day, s.ride_id, s.slot_label(), park_id)
                })?;
            }
        }
        // dropping an uncommitted transaction rolls it back
        tx.commit()?;
        Ok(samples.len())
    }

    /// Distinct dates that already have samples for rides of `park_id`.
    pub fn existing_dates(&self, park_id: &str) -> Result<HashSet<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT DISTINCT q.date
               FROM queue_data q
               JOIN park_info p ON q.ride_id = p.ride_id
               WHERE p.park_id = ?"#,
        )?;
        let raw: Vec<String> = stmt
            .query_map(params![park_id], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        let mut dates = HashSet::with_capacity(raw.len());
        for s in raw {
            match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Ok(d) => { dates.insert(d); }
                Err(e) => warn!("Ignoring unparsable stored date {:?}: {}", s, e),
            }
        }
        debug!("Park {} has {} stored dates", park_id, dates.len());
        Ok(dates)
    }

    pub fn sample_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM queue_data")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Read side for stats / export ──────────────────────────────────────────

    pub fn park_coverage(&self) -> Result<Vec<ParkCoverage>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT p.park_id,
                      COUNT(DISTINCT p.ride_id),
                      COUNT(DISTINCT q.date),
                      MIN(q.date),
                      MAX(q.date)
               FROM park_info p
               LEFT JOIN queue_data q ON q.ride_id = p.ride_id
               GROUP BY p.park_id
               ORDER BY p.park_id"#,
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ParkCoverage {
                    park_id: r.get(0)?,
                    rides: r.get(1)?,
                    days: r.get(2)?,
                    first: r.get(3)?,
                    last: r.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn export_rows(&self, park_id: Option<&str>) -> Result<Vec<ExportRow>> {
        let filter = if park_id.is_some() { "WHERE p.park_id = ?" } else { "" };
        let sql = format!(
            r#"SELECT q.date, p.park_id, q.ride_id, p.ride_name, q.time_of_day, q.queue_time, q.is_closed
               FROM queue_data q
               JOIN park_info p ON q.ride_id = p.ride_id
               {}
               ORDER BY p.park_id, q.date, q.ride_id, q.time_of_day"#,
            filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let map_row = |r: &duckdb::Row<'_>| -> duckdb::Result<ExportRow> {
            Ok(ExportRow {
                date: r.get(0)?,
                park_id: r.get(1)?,
                ride_id: r.get(2)?,
                ride_name: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                time_of_day: r.get(4)?,
                queue_time: r.get(5)?,
                is_closed: r.get::<_, i32>(6)? != 0,
            })
        };
        let rows = match park_id {
            Some(id) => stmt.query_map(params![id], map_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    // ── Run log ───────────────────────────────────────────────────────────────

    pub fn begin_ingest_run(&self) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO ingest_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_ingest_run(&self, run_id: i64, totals: RunTotals, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            r#"UPDATE ingest_runs SET
               finished_at = ?, status = ?, error = ?,
               dates_stored = ?, dates_skipped = ?, dates_failed = ?, samples_inserted = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                error,
                totals.dates_stored as i64,
                totals.dates_skipped as i64,
                totals.dates_failed as i64,
                totals.samples_inserted as i64,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_run(&self) -> Result<Option<LastRun>> {
        let mut s = self
            .conn
            .prepare("SELECT status, error FROM ingest_runs ORDER BY id DESC LIMIT 1")?;
        let run = s
            .query_map([], |r| Ok(LastRun { status: r.get(0)?, error: r.get(1)? }))?
            .next()
            .transpose()?;
        Ok(run)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
