use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

/// Computes `now` shifted back by `months` whole calendar months, clamping
/// the day-of-month if the target month is shorter (e.g. Mar 31 − 1mo →
/// Feb 28/29, never Mar 3). This is the age-cap horizon: a set assigned
/// strictly before the returned instant is eligible for age-based eviction.
///
/// Calendar-month shift, not a fixed 30-day window — documented here so the
/// convention doesn't drift between call sites.
pub fn months_ago(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let total_months_back = months as i32;
    let mut year = now.year();
    let mut month = now.month() as i32 - total_months_back;
    while month <= 0 {
        month += 12;
        year -= 1;
    }
    let month = month as u32;

    let last_day = days_in_month(year, month);
    let day = now.day().min(last_day);

    Utc.with_ymd_and_hms(
        year,
        month,
        day,
        now.hour(),
        now.minute(),
        now.second(),
    )
    .single()
    .unwrap_or(now)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).single();
    let first_of_this = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single();
    match (first_of_this, first_of_next) {
        (Some(this), Some(next)) => (next - this).num_days() as u32,
        _ => 28,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn shifts_back_whole_months() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let horizon = months_ago(now, 2);
        assert_eq!(horizon, Utc.with_ymd_and_hms(2026, 5, 28, 12, 0, 0).unwrap());
    }

    #[test]
    fn clamps_day_for_shorter_target_month() {
        let now = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        let horizon = months_ago(now, 1);
        assert_eq!(horizon, Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn wraps_across_year_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let horizon = months_ago(now, 2);
        assert_eq!(horizon, Utc.with_ymd_and_hms(2025, 11, 15, 0, 0, 0).unwrap());
    }
}
