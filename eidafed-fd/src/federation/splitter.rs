//! Time-window segmentation
//!
//! Bounds the span any single backend leg covers.

use chrono::{DateTime, Duration, Utc};
use eidafed_common::TimeWindow;

/// Split `[start, end)` into contiguous windows no longer than `max`.
///
/// The last window is clipped to `end`. An empty or inverted interval, or a
/// non-positive `max`, yields no windows.
pub fn split_window(start: DateTime<Utc>, end: DateTime<Utc>, max: Duration) -> Vec<TimeWindow> {
    if start >= end || max <= Duration::zero() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = cursor
            .checked_add_signed(max)
            .map_or(end, |t| t.min(end));
        windows.push(TimeWindow::new(cursor, next));
        cursor = next;
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, d, 0, 0, 0).unwrap()
    }

    fn assert_partition(
        windows: &[TimeWindow],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max: Duration,
    ) {
        assert_eq!(windows.first().map(|w| w.start), Some(start));
        assert_eq!(windows.last().map(|w| w.end), Some(end));
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "windows must be contiguous");
        }
        for w in windows {
            assert!(!w.is_empty());
            assert!(w.end - w.start <= max);
        }
    }

    #[test]
    fn test_exact_multiple() {
        let windows = split_window(day(1), day(15), Duration::days(7));
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], TimeWindow::new(day(1), day(8)));
        assert_eq!(windows[1], TimeWindow::new(day(8), day(15)));
    }

    #[test]
    fn test_last_window_is_clipped() {
        let windows = split_window(day(1), day(20), Duration::days(7));
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2], TimeWindow::new(day(15), day(20)));
        assert_partition(&windows, day(1), day(20), Duration::days(7));
    }

    #[test]
    fn test_short_interval_is_single_window() {
        let windows = split_window(day(1), day(2), Duration::days(7));
        assert_eq!(windows, vec![TimeWindow::new(day(1), day(2))]);
    }

    #[test]
    fn test_empty_and_inverted_intervals() {
        assert!(split_window(day(3), day(3), Duration::days(7)).is_empty());
        assert!(split_window(day(4), day(3), Duration::days(7)).is_empty());
        assert!(split_window(day(1), day(3), Duration::zero()).is_empty());
    }

    #[test]
    fn test_partition_holds_for_odd_lengths() {
        let start = Utc.with_ymd_and_hms(2001, 3, 4, 5, 6, 7).unwrap();
        for hours in [1, 23, 169, 1000, 5000] {
            for max_hours in [1, 5, 24, 168] {
                let end = start + Duration::hours(hours);
                let max = Duration::hours(max_hours);
                let windows = split_window(start, end, max);
                assert_partition(&windows, start, end, max);
                let expected = (hours + max_hours - 1) / max_hours;
                assert_eq!(windows.len() as i64, expected);
            }
        }
    }
}
