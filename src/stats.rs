use crate::models::Frequency;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeSet;

/// Verified items needed in one calendar week for the weekly champion badge.
pub const WEEKLY_TARGET: usize = 15;
/// Number of weekly challenge sets in the rotation.
pub const CHALLENGE_ROTATION: i64 = 4;

/// First day of the platform; week 1 of the challenge rotation starts here.
pub fn platform_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default()
}

/// Consecutive days ending today that appear in `dates`. A missing today
/// yields zero.
pub fn current_streak(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = dates.into_iter().collect();
    let mut streak = 0;
    let mut cursor = today;
    while days.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

/// Items dated between the most recent Sunday and today, inclusive.
pub fn weekly_progress(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> usize {
    let start = week_start(today);
    dates
        .into_iter()
        .filter(|date| *date >= start && *date <= today)
        .count()
}

/// Index of the active challenge set: whole weeks since the platform epoch,
/// modulo the rotation length.
pub fn challenge_week_index(today: NaiveDate) -> usize {
    let days = (today - platform_epoch()).num_days();
    days.div_euclid(7).rem_euclid(CHALLENGE_ROTATION) as usize
}

/// One-based number of the Sunday-started week containing `today`, counted
/// from the week containing the platform epoch.
pub fn calendar_week_number(today: NaiveDate) -> u32 {
    let weeks = (week_start(today) - week_start(platform_epoch()))
        .num_days()
        .div_euclid(7);
    (weeks + 1).max(1) as u32
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// Streak of a personal habit measured in its own period: days, Sunday
/// weeks or calendar months, ending with the period that contains today.
pub fn period_streak(dates: &[NaiveDate], today: NaiveDate, frequency: Frequency) -> u32 {
    match frequency {
        Frequency::Daily => current_streak(dates.iter().copied(), today),
        Frequency::Weekly => {
            let weeks: BTreeSet<NaiveDate> = dates.iter().map(|date| week_start(*date)).collect();
            let mut streak = 0;
            let mut cursor = week_start(today);
            while weeks.contains(&cursor) {
                streak += 1;
                cursor -= Duration::weeks(1);
            }
            streak
        }
        Frequency::Monthly => {
            let months: BTreeSet<i32> = dates.iter().map(|date| month_ordinal(*date)).collect();
            let mut streak = 0;
            let mut cursor = month_ordinal(today);
            while months.contains(&cursor) {
                streak += 1;
                cursor -= 1;
            }
            streak
        }
    }
}

fn month_ordinal(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn streak_stops_at_first_gap() {
        let today = day(2026, 3, 10);
        let dates = [0, 1, 2, 4].map(|offset| today - Duration::days(offset));
        assert_eq!(current_streak(dates, today), 3);
    }

    #[test]
    fn streak_requires_activity_today() {
        let today = day(2026, 3, 10);
        let dates = [1, 2, 3].map(|offset| today - Duration::days(offset));
        assert_eq!(current_streak(dates, today), 0);
        assert_eq!(current_streak(Vec::new(), today), 0);
    }

    #[test]
    fn streak_counts_duplicate_dates_once() {
        let today = day(2026, 3, 10);
        let dates = vec![today, today, today - Duration::days(1)];
        assert_eq!(current_streak(dates, today), 2);
    }

    #[test]
    fn challenge_index_rotates_every_four_weeks() {
        let epoch = platform_epoch();
        assert_eq!(challenge_week_index(epoch), 0);
        assert_eq!(challenge_week_index(epoch + Duration::days(6)), 0);
        assert_eq!(challenge_week_index(epoch + Duration::days(7)), 1);
        assert_eq!(challenge_week_index(epoch + Duration::days(21)), 3);
        assert_eq!(challenge_week_index(epoch + Duration::days(28)), 0);
        assert_eq!(challenge_week_index(epoch - Duration::days(1)), 3);
    }

    #[test]
    fn week_starts_on_sunday() {
        // 2026-03-11 is a Wednesday.
        assert_eq!(week_start(day(2026, 3, 11)), day(2026, 3, 8));
        assert_eq!(week_start(day(2026, 3, 8)), day(2026, 3, 8));
    }

    #[test]
    fn weekly_progress_counts_current_week_only() {
        let today = day(2026, 3, 11);
        let dates = vec![
            day(2026, 3, 7),
            day(2026, 3, 8),
            day(2026, 3, 8),
            day(2026, 3, 11),
            day(2026, 3, 12),
        ];
        assert_eq!(weekly_progress(dates, today), 3);
    }

    #[test]
    fn calendar_week_number_is_one_based() {
        let epoch = platform_epoch();
        assert_eq!(calendar_week_number(epoch), 1);
        // 2025-01-05 is the first Sunday after the epoch.
        assert_eq!(calendar_week_number(day(2025, 1, 5)), 2);
        assert_eq!(calendar_week_number(day(2025, 1, 11)), 2);
    }

    #[test]
    fn weekly_and_monthly_streaks_use_their_period() {
        let today = day(2026, 3, 11);
        let weekly = [day(2026, 3, 9), day(2026, 3, 2), day(2026, 2, 17)];
        assert_eq!(period_streak(&weekly, today, Frequency::Weekly), 2);

        let monthly = [day(2026, 3, 1), day(2026, 2, 28), day(2026, 1, 5), day(2025, 11, 1)];
        assert_eq!(period_streak(&monthly, today, Frequency::Monthly), 3);

        let daily = [today, day(2026, 3, 10)];
        assert_eq!(period_streak(&daily, today, Frequency::Daily), 2);
    }
}
