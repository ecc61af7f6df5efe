//! Date-range planning: which calendar days still need ingesting for a park.

use crate::error::ConfigError;
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;
use tracing::debug;

const DATE_FORMATS: [&str; 2] = ["%Y/%m/%d", "%Y-%m-%d"];

/// Parse a configured date. Accepts the site's `YYYY/MM/DD` and ISO dates.
pub fn parse_config_date(field: &'static str, value: &str) -> Result<NaiveDate, ConfigError> {
    let s = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| ConfigError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

/// Every date in `[start, end]` whose month is not excluded, ascending.
pub fn generate_date_range(
    start: &str,
    end: &str,
    exclude_months: &[u32],
) -> Result<Vec<NaiveDate>, ConfigError> {
    let start = parse_config_date("start_date", start)?;
    let end = parse_config_date("end_date", end)?;

    if end < start {
        return Err(ConfigError::InvertedRange { start, end });
    }
    if let Some(&m) = exclude_months.iter().find(|m| !(1..=12).contains(*m)) {
        return Err(ConfigError::InvalidMonth(m));
    }

    let dates: Vec<NaiveDate> = start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !exclude_months.contains(&d.month()))
        .collect();

    debug!("Generated {} dates from {} to {}", dates.len(), start, end);
    Ok(dates)
}

/// Drop the dates a park already has. Order of `candidates` is preserved.
pub fn plan_dates(candidates: &[NaiveDate], existing: &HashSet<NaiveDate>) -> Vec<NaiveDate> {
    candidates
        .iter()
        .copied()
        .filter(|d| !existing.contains(d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn inclusive_ascending_range() {
        let dates = generate_date_range("2024/10/29", "2024/11/02", &[]).unwrap();
        assert_eq!(
            dates,
            vec![d(2024, 10, 29), d(2024, 10, 30), d(2024, 10, 31), d(2024, 11, 1), d(2024, 11, 2)]
        );
    }

    #[test]
    fn single_day_range() {
        let dates = generate_date_range("2024-02-29", "2024-02-29", &[]).unwrap();
        assert_eq!(dates, vec![d(2024, 2, 29)]);
    }

    #[test]
    fn excluded_months_are_dropped() {
        let dates = generate_date_range("2024/12/30", "2025/02/02", &[1]).unwrap();
        assert_eq!(
            dates,
            vec![d(2024, 12, 30), d(2024, 12, 31), d(2025, 2, 1), d(2025, 2, 2)]
        );
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn every_month_excluded_is_empty_not_error() {
        let all: Vec<u32> = (1..=12).collect();
        assert!(generate_date_range("2024/01/01", "2024/12/31", &all).unwrap().is_empty());
    }

    #[test]
    fn inverted_range_is_config_error() {
        let err = generate_date_range("2024/11/02", "2024/10/29", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvertedRange { .. }));
    }

    #[test]
    fn malformed_dates_are_config_errors() {
        for (start, end) in [("2024/13/01", "2024/12/01"), ("yesterday", "2024/12/01"), ("2024/01/01", "")] {
            let err = generate_date_range(start, end, &[]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidDate { .. }), "{start} {end}");
        }
    }

    #[test]
    fn out_of_range_month_is_rejected() {
        let err = generate_date_range("2024/01/01", "2024/01/02", &[0]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMonth(0)));
    }

    #[test]
    fn planned_dates_skip_existing() {
        let candidates = generate_date_range("2024/10/28", "2024/11/01", &[]).unwrap();
        let existing: HashSet<_> = [d(2024, 10, 30), d(2023, 1, 1)].into_iter().collect();

        let planned = plan_dates(&candidates, &existing);

        assert_eq!(planned, vec![d(2024, 10, 28), d(2024, 10, 29), d(2024, 10, 31), d(2024, 11, 1)]);
        assert!(planned.iter().all(|p| !existing.contains(p)));
    }
}
