//! Timeline builder - turns move-in dates into residence intervals

use crate::domain::{ProximityError, ResidenceEntry, ResidenceInterval, Result};
use chrono::NaiveDate;

/// Close an open-ended sequence at the present date.
///
/// Returns `rows` followed by a copy of the last row re-dated to `today`.
/// The extra row only bounds the final real row; it is never a row of its own.
pub fn close_at_present<T: Clone>(
    rows: &[T],
    today: NaiveDate,
    redate: impl Fn(&mut T, NaiveDate),
) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len() + 1);
    out.extend_from_slice(rows);
    if let Some(last) = rows.last() {
        let mut terminal = last.clone();
        redate(&mut terminal, today);
        out.push(terminal);
    }
    out
}

/// Reject empty input, non-increasing dates and move-ins after `today`
pub fn validate_entries(entries: &[ResidenceEntry], today: NaiveDate) -> Result<()> {
    let Some(last) = entries.last() else {
        return Err(ProximityError::InvalidTimeline("no residence entries".to_string()));
    };

    if let Some(pair) = entries.windows(2).find(|w| w[1].start_date <= w[0].start_date) {
        return Err(ProximityError::InvalidTimeline(format!(
            "start dates must be strictly increasing: {} ({}) follows {} ({})",
            pair[1].start_date, pair[1].location_key, pair[0].start_date, pair[0].location_key
        )));
    }

    if last.start_date > today {
        return Err(ProximityError::InvalidTimeline(format!(
            "latest start date {} is after today {}",
            last.start_date, today
        )));
    }

    Ok(())
}

/// Build one interval per entry; the last one ends on `today`.
///
/// Each interval runs from its entry's start date up to (not including) the
/// next entry's start date, so intervals chain without gaps or overlaps.
pub fn build_timeline(entries: &[ResidenceEntry], today: NaiveDate) -> Result<Vec<ResidenceInterval>> {
    validate_entries(entries, today)?;

    let bounded = close_at_present(entries, today, |entry, date| entry.start_date = date);

    Ok(bounded
        .windows(2)
        .map(|w| ResidenceInterval {
            location_key: w[0].location_key.clone(),
            start_date: w[0].start_date,
            end_date: w[1].start_date,
            duration_days: (w[1].start_date - w[0].start_date).num_days(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_close_at_present_appends_redated_copy() {
        let rows = vec![(date(2020, 1, 1), 1), (date(2020, 6, 1), 2)];
        let closed = close_at_present(&rows, date(2020, 12, 1), |row, d| row.0 = d);
        assert_eq!(closed.len(), 3);
        assert_eq!(closed[2], (date(2020, 12, 1), 2));
        assert_eq!(&closed[..2], rows.as_slice());
    }

    #[test]
    fn test_close_at_present_empty() {
        let rows: Vec<(NaiveDate, u8)> = vec![];
        assert!(close_at_present(&rows, date(2020, 1, 1), |row, d| row.0 = d).is_empty());
    }

    #[test]
    fn test_two_entries() {
        let entries = vec![
            ResidenceEntry::new("AB1", date(2020, 1, 1)),
            ResidenceEntry::new("CD2", date(2020, 6, 1)),
        ];
        let timeline = build_timeline(&entries, date(2020, 12, 1)).unwrap();

        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].location_key, "AB1");
        assert_eq!(timeline[0].end_date, date(2020, 6, 1));
        assert_eq!(timeline[0].duration_days, 152);
        assert_eq!(timeline[1].location_key, "CD2");
        assert_eq!(timeline[1].end_date, date(2020, 12, 1));
        assert_eq!(timeline[1].duration_days, 183);
    }

    #[test]
    fn test_single_entry_runs_to_today() {
        let entries = vec![ResidenceEntry::new("AB1", date(2024, 2, 28))];
        let timeline = build_timeline(&entries, date(2024, 3, 1)).unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].end_date, date(2024, 3, 1));
        assert_eq!(timeline[0].duration_days, 2);
    }

    #[test]
    fn test_moved_in_today_has_zero_duration() {
        let entries = vec![ResidenceEntry::new("AB1", date(2024, 3, 1))];
        let timeline = build_timeline(&entries, date(2024, 3, 1)).unwrap();
        assert_eq!(timeline[0].duration_days, 0);
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            build_timeline(&[], date(2024, 3, 1)),
            Err(ProximityError::InvalidTimeline(_))
        ));
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let entries = vec![
            ResidenceEntry::new("AB1", date(2020, 1, 1)),
            ResidenceEntry::new("CD2", date(2020, 1, 1)),
        ];
        assert!(matches!(
            build_timeline(&entries, date(2020, 12, 1)),
            Err(ProximityError::InvalidTimeline(_))
        ));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let entries = vec![
            ResidenceEntry::new("AB1", date(2020, 6, 1)),
            ResidenceEntry::new("CD2", date(2020, 1, 1)),
        ];
        assert!(build_timeline(&entries, date(2020, 12, 1)).is_err());
    }

    #[test]
    fn test_future_move_in_rejected() {
        let entries = vec![ResidenceEntry::new("AB1", date(2030, 1, 1))];
        let err = build_timeline(&entries, date(2020, 12, 1)).unwrap_err();
        assert_eq!(err.kind(), "invalid_timeline");
    }

    proptest! {
        #[test]
        fn prop_intervals_chain_and_cover(
            gaps in proptest::collection::vec(1i64..400, 0..20),
            tail in 0i64..400,
        ) {
            let first = date(1990, 1, 1);
            let mut starts = vec![first];
            for gap in &gaps {
                let next = *starts.last().unwrap() + chrono::Duration::days(*gap);
                starts.push(next);
            }
            let today = *starts.last().unwrap() + chrono::Duration::days(tail);
            let entries: Vec<ResidenceEntry> = starts
                .iter()
                .enumerate()
                .map(|(i, d)| ResidenceEntry::new(format!("K{i}"), *d))
                .collect();

            let timeline = build_timeline(&entries, today).unwrap();

            prop_assert_eq!(timeline.len(), entries.len());
            for pair in timeline.windows(2) {
                prop_assert_eq!(pair[0].end_date, pair[1].start_date);
            }
            prop_assert!(timeline.iter().all(|i| i.duration_days >= 0));
            let total: i64 = timeline.iter().map(|i| i.duration_days).sum();
            prop_assert_eq!(total, (today - first).num_days());
        }
    }
}
