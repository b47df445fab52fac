use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

// The daily bulletin for day D is published around 17:30 site-local time.
// The exchange operates on Abidjan time (UTC+0), so the UTC instant is used
// directly.
const PUBLISH_CUTOFF_HOUR: u32 = 17;
const PUBLISH_CUTOFF_MINUTE: u32 = 30;

/// Resolves which calendar date's bulletin should exist for a reference
/// instant: before the 17:30 cutoff the previous day's, and weekend dates
/// roll back to the preceding Friday. The result is always Monday-Friday.
pub fn resolve_report_date(reference: DateTime<Utc>) -> NaiveDate {
    let cutoff_reached = (reference.hour(), reference.minute())
        >= (PUBLISH_CUTOFF_HOUR, PUBLISH_CUTOFF_MINUTE);

    let mut date = reference.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    while is_weekend(date) {
        date = date - Duration::days(1);
    }

    date
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn same_day_after_cutoff_on_weekday() {
        // 2026-01-07 is Wednesday.
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 17, 30, 0).unwrap();
        assert_eq!(
            resolve_report_date(now),
            NaiveDate::from_ymd_opt(2026, 1, 7).unwrap()
        );
    }

    #[test]
    fn previous_day_before_cutoff() {
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 17, 29, 59).unwrap();
        assert_eq!(
            resolve_report_date(now),
            NaiveDate::from_ymd_opt(2026, 1, 6).unwrap()
        );
    }

    #[test]
    fn monday_morning_rolls_back_to_friday() {
        // 2026-01-05 is Monday; candidate Sunday rolls back to Friday 01-02.
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        assert_eq!(
            resolve_report_date(now),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
        );
    }

    #[test]
    fn saturday_rolls_back_to_friday() {
        // 2026-01-03 is Saturday. After cutoff the candidate is Saturday
        // itself; before cutoff it is already Friday.
        let evening = Utc.with_ymd_and_hms(2026, 1, 3, 20, 0, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2026, 1, 3, 8, 0, 0).unwrap();
        let friday = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        assert_eq!(resolve_report_date(evening), friday);
        assert_eq!(resolve_report_date(morning), friday);
    }

    #[test]
    fn sunday_rolls_back_to_friday() {
        let now = Utc.with_ymd_and_hms(2026, 1, 4, 18, 0, 0).unwrap();
        assert_eq!(
            resolve_report_date(now),
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()
        );
    }
}
