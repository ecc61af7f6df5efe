use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Chart labels as the page script formats them, plus the shapes Chart.js
/// hands back when a label slips through unformatted.
/// "2024-10-30 10:02:00" | "2024-10-30T10:02:00+01:00" | "Wed Oct 30 2024 10:02:00 GMT+0100 (CET)"
pub fn parse_label(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    // park-local wall clock is what the grid is about, so keep the local part
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_local());
    }
    // JS Date.toString(): the first 24 chars are "Www Mmm dd yyyy hh:mm:ss"
    if let Some(head) = s.get(..24) {
        if let Ok(ts) = NaiveDateTime::parse_from_str(head, "%a %b %d %Y %H:%M:%S") {
            return Some(ts);
        }
    }

    None
}

/// Reported wait in whole minutes. The park series leaves a point null while
/// the ride is down, so null reads as 0 (closed). Negative or non-numeric → `None`.
pub fn parse_queue_value(v: &Value) -> Option<u32> {
    let n = match v {
        Value::Null => return Some(0),
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() || n < 0.0 || n > u32::MAX as f64 {
        return None;
    }
    Some(n.round() as u32)
}

/// Ride id is the last path segment of the panel link.
/// "/parks/4/rides/101" → "101" | "https://…/rides/101/?tab=x" → "101"
pub fn ride_id_from_href(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next()?;
    path.split('/')
        .rev()
        .map(str::trim)
        .find(|seg| !seg.is_empty())
        .map(str::to_string)
}

pub fn normalise_ride_name(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 30).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("2024-10-30 10:02:00"), Some(ts(10, 2, 0)));
        assert_eq!(parse_label("2024-10-30T10:02:05"), Some(ts(10, 2, 5)));
        assert_eq!(parse_label("2024-10-30T10:02:00+01:00"), Some(ts(10, 2, 0)));
        assert_eq!(
            parse_label("Wed Oct 30 2024 10:02:00 GMT+0100 (Central European Standard Time)"),
            Some(ts(10, 2, 0))
        );
        assert_eq!(parse_label("10:02"), None);
        assert_eq!(parse_label(""), None);
    }

    #[test]
    fn test_parse_queue_value() {
        assert_eq!(parse_queue_value(&json!(15)), Some(15));
        assert_eq!(parse_queue_value(&json!(0)), Some(0));
        assert_eq!(parse_queue_value(&json!(12.6)), Some(13));
        assert_eq!(parse_queue_value(&json!("20")), Some(20));
        assert_eq!(parse_queue_value(&json!(-5)), None);
        assert_eq!(parse_queue_value(&Value::Null), Some(0));
        assert_eq!(parse_queue_value(&json!("n/a")), None);
        assert_eq!(parse_queue_value(&json!(true)), None);
    }

    #[test]
    fn test_ride_id_from_href() {
        assert_eq!(ride_id_from_href("/parks/4/rides/101").as_deref(), Some("101"));
        assert_eq!(ride_id_from_href("https://queue-times.com/parks/4/rides/101/?x=1").as_deref(), Some("101"));
        assert_eq!(ride_id_from_href("/"), None);
        assert_eq!(ride_id_from_href(""), None);
    }

    #[test]
    fn test_normalise_ride_name() {
        assert_eq!(normalise_ride_name("  Space \n Mountain "), "Space Mountain");
    }
}
