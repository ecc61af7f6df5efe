//! Snap irregular chart samples onto the fixed 15-minute grid.
//!
//! For every grid point between the floored first sample and the ceiled last
//! sample, the nearest raw sample represents the slot if it lies within half a
//! grid step. Equal distances resolve to the earlier sample. Slots with no
//! sample in tolerance are dropped; nothing is interpolated. Only grid points
//! on the calendar `date` itself become slots, so a ceiling that rolls past
//! midnight never shows up as that day's `00:00`.

use crate::models::{AlignedSample, RawSample};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

const GRID_MINUTES: i64 = 15;

fn grid_step() -> TimeDelta {
    TimeDelta::minutes(GRID_MINUTES)
}

/// Half a grid step: 7 minutes 30 seconds.
fn tolerance() -> TimeDelta {
    TimeDelta::seconds(GRID_MINUTES * 60 / 2)
}

/// Round down to the enclosing grid boundary.
pub fn floor_to_grid(ts: NaiveDateTime) -> NaiveDateTime {
    let minute = ts.minute() - ts.minute() % GRID_MINUTES as u32;
    let since_midnight = TimeDelta::hours(ts.hour() as i64) + TimeDelta::minutes(minute as i64);
    ts.date().and_time(NaiveTime::MIN) + since_midnight
}

/// Round up to the next grid boundary; boundaries map to themselves.
pub fn ceil_to_grid(ts: NaiveDateTime) -> NaiveDateTime {
    let floor = floor_to_grid(ts);
    if floor == ts { floor } else { floor + grid_step() }
}

/// Grid points in `[floor(first), ceil(last)]`, inclusive.
fn grid_points(first: NaiveDateTime, last: NaiveDateTime) -> impl Iterator<Item = NaiveDateTime> {
    let end = ceil_to_grid(last);
    std::iter::successors(Some(floor_to_grid(first)), |p| Some(*p + grid_step()))
        .take_while(move |p| *p <= end)
}

/// Align one ride's samples for one calendar `date` of `park_id`.
pub fn align(date: NaiveDate, park_id: &str, raw: &[RawSample]) -> Vec<AlignedSample> {
    let mut sorted: Vec<&RawSample> = raw.iter().collect();
    sorted.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then(a.queue_time.cmp(&b.queue_time))
            .then(a.is_closed.cmp(&b.is_closed))
    });

    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };

    grid_points(first.timestamp, last.timestamp)
        .filter(|point| point.date() == date)
        .filter_map(|point| {
            // min_by_key keeps the first of equal minima, i.e. the earlier sample
            let nearest = sorted
                .iter()
                .min_by_key(|s| (s.timestamp - point).abs())?;
            if (nearest.timestamp - point).abs() > tolerance() {
                return None;
            }
            Some(AlignedSample {
                date,
                ride_id: nearest.ride_id.clone(),
                park_id: park_id.to_string(),
                time_of_day: point.time(),
                queue_time: nearest.queue_time,
                is_closed: nearest.is_closed,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, 30).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, s).unwrap()
    }

    fn sample(h: u32, m: u32, s: u32, q: u32) -> RawSample {
        RawSample::new("101", at(h, m, s), q)
    }

    fn slots(out: &[AlignedSample]) -> Vec<(String, u32)> {
        out.iter().map(|a| (a.slot_label(), a.queue_time)).collect()
    }

    #[test]
    fn nearest_sample_fills_each_slot() {
        let out = align(day(), "4", &[sample(10, 2, 0, 5), sample(10, 18, 0, 9)]);
        assert_eq!(slots(&out), vec![("10:00".into(), 5), ("10:15".into(), 9)]);
        assert!(out.iter().all(|a| a.date == day() && a.park_id == "4" && a.ride_id == "101"));
    }

    #[test]
    fn slot_beyond_tolerance_is_dropped() {
        let out = align(day(), "4", &[sample(10, 0, 0, 5), sample(10, 30, 0, 9)]);
        assert_eq!(slots(&out), vec![("10:00".into(), 5), ("10:30".into(), 9)]);
        assert!(!out.iter().any(|a| a.slot_label() == "10:15"));
    }

    #[test]
    fn exact_tolerance_is_kept_and_ties_go_earlier() {
        let out = align(day(), "4", &[sample(10, 22, 30, 9), sample(10, 7, 30, 5)]);
        let at_1015 = out.iter().find(|a| a.slot_label() == "10:15").unwrap();
        assert_eq!(at_1015.queue_time, 5);
    }

    #[test]
    fn input_order_does_not_matter() {
        let samples = vec![
            sample(9, 1, 12, 10),
            sample(9, 14, 0, 0),
            sample(9, 29, 59, 15),
            sample(9, 52, 0, 20),
            sample(9, 52, 0, 25),
            sample(10, 7, 30, 30),
        ];
        let expected = align(day(), "4", &samples);

        let mut reversed = samples.clone();
        reversed.reverse();
        assert_eq!(align(day(), "4", &reversed), expected);

        let mut rotated = samples.clone();
        rotated.rotate_left(2);
        assert_eq!(align(day(), "4", &rotated), expected);
    }

    #[test]
    fn closed_flag_follows_selected_sample() {
        let out = align(day(), "4", &[sample(9, 14, 0, 0), sample(9, 31, 0, 12)]);
        assert_eq!(out[0].time_of_day, NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert!(out[0].is_closed);
        assert!(!out[1].is_closed);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(align(day(), "4", &[]).is_empty());
    }

    #[test]
    fn single_sample_yields_at_most_one_slot() {
        let out = align(day(), "4", &[sample(10, 8, 0, 7)]);
        assert_eq!(slots(&out), vec![("10:15".into(), 7)]);

        let out = align(day(), "4", &[sample(13, 0, 0, 7)]);
        assert_eq!(slots(&out), vec![("13:00".into(), 7)]);
    }

    #[test]
    fn ceiling_rolls_over_the_hour() {
        assert_eq!(ceil_to_grid(at(10, 53, 0)), at(11, 0, 0));
        assert_eq!(ceil_to_grid(at(10, 45, 0)), at(10, 45, 0));
        assert_eq!(ceil_to_grid(at(10, 45, 1)), at(11, 0, 0));
        assert_eq!(floor_to_grid(at(10, 59, 59)), at(10, 45, 0));

        let out = align(day(), "4", &[sample(10, 40, 0, 3), sample(10, 56, 0, 8)]);
        assert_eq!(slots(&out), vec![("10:45".into(), 3), ("11:00".into(), 8)]);
    }

    #[test]
    fn ceiling_past_midnight_stays_off_the_day() {
        let late = at(23, 56, 0);
        let next = day().succ_opt().unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(ceil_to_grid(late), next);

        let out = align(day(), "4", &[sample(9, 0, 0, 10), RawSample::new("101", late, 0)]);
        assert_eq!(slots(&out), vec![("09:00".into(), 10)]);
        assert!(!out.iter().any(|a| a.slot_label() == "00:00"));

        let out = align(day(), "4", &[sample(23, 50, 0, 4)]);
        assert_eq!(slots(&out), vec![("23:45".into(), 4)]);
    }

    #[test]
    fn samples_from_another_day_yield_nothing() {
        let other = day().succ_opt().unwrap().and_hms_opt(10, 0, 0).unwrap();
        assert!(align(day(), "4", &[RawSample::new("101", other, 5)]).is_empty());
    }

    #[test]
    fn full_day_never_exceeds_grid() {
        let samples: Vec<RawSample> = (0..24 * 12)
            .map(|i| RawSample::new("101", at(0, 0, 0) + TimeDelta::minutes(5 * i), (i % 60) as u32))
            .collect();
        let out = align(day(), "4", &samples);
        assert_eq!(out.len(), 96);
        let labels: HashSet<String> = out.iter().map(|a| a.slot_label()).collect();
        assert_eq!(labels.len(), 96);
        assert_eq!(out[0].queue_time, 0);
    }
}
