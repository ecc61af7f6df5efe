use super::cleaner::{normalise_ride_name, parse_label, parse_queue_value, ride_id_from_href};
use crate::models::{RawSample, RideSeries};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Dataset that carries the park's own wait times.
pub const PARK_SERIES: &str = "Reported by park";

/// Read-only page script: one entry per `.panel` with its link and chart data.
/// Labels are formatted in page-local time so the grid matches the park's day.
pub const PANEL_SCRIPT: &str = r#"
return (function () {
    const pad = (n) => String(n).padStart(2, '0');
    const fmt = (label) => {
        const d = new Date(label);
        if (isNaN(d.getTime())) return String(label);
        return `${d.getFullYear()}-${pad(d.getMonth() + 1)}-${pad(d.getDate())} ` +
               `${pad(d.getHours())}:${pad(d.getMinutes())}:${pad(d.getSeconds())}`;
    };
    return Array.from(document.querySelectorAll('.panel')).map((panel) => {
        const link = panel.querySelector('h2 a');
        const canvas = panel.querySelector('canvas');
        const chart = (canvas && window.Chart && Chart.getChart) ? Chart.getChart(canvas) : null;
        return {
            href: link ? link.getAttribute('href') : null,
            name: link ? link.textContent : null,
            has_chart: !!chart,
            labels: chart ? chart.data.labels.map(fmt) : [],
            datasets: chart
                ? chart.data.datasets.map((ds) => ({ label: ds.label || null, data: ds.data }))
                : [],
        };
    });
})();
"#;

// ── Payload ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PanelPayload {
    pub href: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub has_chart: bool,
    #[serde(default)]
    pub labels: Vec<Value>,
    #[serde(default)]
    pub datasets: Vec<DatasetPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetPayload {
    pub label: Option<String>,
    #[serde(default)]
    pub data: Vec<Value>,
}

/// Why a single panel was left out of a date's extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelSkip {
    NoRideId,
    NoChart { ride_id: String },
    NoParkSeries { ride_id: String },
}

impl fmt::Display for PanelSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelSkip::NoRideId => write!(f, "panel has no identifiable ride link"),
            PanelSkip::NoChart { ride_id } => write!(f, "ride {} has no chart", ride_id),
            PanelSkip::NoParkSeries { ride_id } => {
                write!(f, "ride {} has no {:?} dataset", ride_id, PARK_SERIES)
            }
        }
    }
}

/// Decode the script's return value. A non-array result is a script failure.
pub fn parse_panels(value: Value) -> Result<Vec<PanelPayload>, serde_json::Error> {
    serde_json::from_value(value)
}

/// Turn one panel into a ride series. Unusable points are dropped, unusable
/// panels are reported so the caller can skip just that ride.
pub fn panel_to_series(panel: &PanelPayload) -> Result<RideSeries, PanelSkip> {
    let ride_id = panel
        .href
        .as_deref()
        .and_then(ride_id_from_href)
        .ok_or(PanelSkip::NoRideId)?;

    if !panel.has_chart {
        return Err(PanelSkip::NoChart { ride_id });
    }

    let series = panel
        .datasets
        .iter()
        .find(|ds| {
            ds.label
                .as_deref()
                .is_some_and(|l| l.trim().eq_ignore_ascii_case(PARK_SERIES))
        })
        .ok_or_else(|| PanelSkip::NoParkSeries { ride_id: ride_id.clone() })?;

    let mut samples = Vec::with_capacity(panel.labels.len());
    let mut dropped = 0usize;
    for (i, label) in panel.labels.iter().enumerate() {
        let ts = label.as_str().and_then(parse_label);
        // a point missing from the park series counts as closed, like a null one
        let queue = series.data.get(i).map_or(Some(0), parse_queue_value);
        match (ts, queue) {
            (Some(ts), Some(q)) => samples.push(RawSample::new(ride_id.clone(), ts, q)),
            (None, _) => {
                warn!("Ride {}: unparsable chart label {}", ride_id, label);
                dropped += 1;
            }
            (Some(_), None) => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("Ride {}: dropped {} of {} points", ride_id, dropped, panel.labels.len());
    }

    let ride_name = panel
        .name
        .as_deref()
        .map(normalise_ride_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(RideSeries { ride_id, ride_name, samples })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn panel(v: Value) -> PanelPayload {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn well_formed_panel_becomes_series() {
        let p = panel(json!({
            "href": "/parks/4/rides/101",
            "name": " Space Mountain ",
            "has_chart": true,
            "labels": ["2024-10-30 10:02:00", "2024-10-30 10:18:00", "2024-10-30 10:33:00"],
            "datasets": [
                {"label": "Reported by users", "data": [40, 45, 50]},
                {"label": "Reported by park", "data": [5, 0, null]}
            ]
        }));

        let s = panel_to_series(&p).unwrap();
        assert_eq!(s.ride_id, "101");
        assert_eq!(s.ride_name, "Space Mountain");
        assert_eq!(s.samples.len(), 3);
        assert_eq!(s.samples[0].queue_time, 5);
        assert!(!s.samples[0].is_closed);
        assert!(s.samples[1].is_closed);
        assert_eq!(s.samples[2].queue_time, 0);
        assert!(s.samples[2].is_closed);
    }

    #[test]
    fn null_and_missing_park_values_read_as_closed() {
        let p = panel(json!({
            "href": "/parks/4/rides/101", "name": "Space Mountain", "has_chart": true,
            "labels": ["2024-10-30 09:00:00", "2024-10-30 09:15:00", "2024-10-30 09:30:00"],
            "datasets": [{"label": "Reported by park", "data": [null, 10]}]
        }));
        let s = panel_to_series(&p).unwrap();
        let points: Vec<(String, u32, bool)> = s
            .samples
            .iter()
            .map(|r| (r.timestamp.format("%H:%M:%S").to_string(), r.queue_time, r.is_closed))
            .collect();
        assert_eq!(
            points,
            vec![
                ("09:00:00".to_string(), 0, true),
                ("09:15:00".to_string(), 10, false),
                ("09:30:00".to_string(), 0, true),
            ]
        );
    }

    #[test]
    fn series_label_match_is_case_insensitive() {
        let p = panel(json!({
            "href": "/parks/4/rides/7", "name": "Tea Cups", "has_chart": true,
            "labels": ["2024-10-30 10:00:00"],
            "datasets": [{"label": "reported by park", "data": [10]}]
        }));
        assert_eq!(panel_to_series(&p).unwrap().samples.len(), 1);
    }

    #[test]
    fn broken_panels_name_their_reason() {
        let no_link = panel(json!({"href": null, "has_chart": true}));
        assert_eq!(panel_to_series(&no_link), Err(PanelSkip::NoRideId));

        let no_chart = panel(json!({"href": "/parks/4/rides/9", "has_chart": false}));
        assert_eq!(panel_to_series(&no_chart), Err(PanelSkip::NoChart { ride_id: "9".into() }));

        let no_series = panel(json!({
            "href": "/parks/4/rides/9", "has_chart": true,
            "labels": ["2024-10-30 10:00:00"],
            "datasets": [{"label": "Reported by users", "data": [3]}]
        }));
        assert_eq!(
            panel_to_series(&no_series),
            Err(PanelSkip::NoParkSeries { ride_id: "9".into() })
        );
    }

    #[test]
    fn non_array_result_is_an_error() {
        assert!(parse_panels(json!({"oops": true})).is_err());
        assert!(parse_panels(json!([])).unwrap().is_empty());
    }
}
