//! Unit tests for business-hours aware expiry calculation.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::America::Los_Angeles;
use securitybot::time_budget::{expires_at, expires_at_naive, BusinessCalendar};

fn calendar() -> BusinessCalendar {
    BusinessCalendar::new(10, 18, Los_Angeles)
}

/// Local Los Angeles wall-clock time as UTC.
fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Los_Angeles
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

#[test]
fn sum_inside_business_hours_is_unchanged() {
    // 2024-06-12 is a Wednesday.
    let start = local(2024, 6, 12, 11, 0);
    assert_eq!(
        expires_at(start, Duration::hours(2), &calendar()),
        start + Duration::hours(2)
    );
}

#[test]
fn overflow_past_closing_carries_into_next_morning() {
    let start = local(2024, 6, 12, 17, 0);
    let end = expires_at(start, Duration::hours(2), &calendar());
    assert_eq!(end, local(2024, 6, 13, 11, 0));
}

#[test]
fn friday_evening_overflow_skips_the_weekend() {
    // 2024-06-14 is a Friday; twenty minutes remain after closing.
    let start = local(2024, 6, 14, 17, 50);
    let end = expires_at(start, Duration::minutes(30), &calendar());
    assert_eq!(end, local(2024, 6, 17, 10, 20));
}

#[test]
fn weekend_start_waits_for_monday() {
    let start = local(2024, 6, 15, 12, 0);
    let end = expires_at(start, Duration::minutes(30), &calendar());
    assert_eq!(end, local(2024, 6, 17, 10, 30));
}

#[test]
fn after_hours_start_measures_overflow_from_closing() {
    // 20:45 is two hours forty-five past the 18:00 closing.
    let start = local(2024, 6, 12, 20, 0);
    let end = expires_at(start, Duration::minutes(45), &calendar());
    assert_eq!(end, local(2024, 6, 13, 12, 45));
}

#[test]
fn start_shortly_after_closing_keeps_the_gap() {
    let start = local(2024, 6, 12, 19, 0);
    let end = expires_at(start, Duration::hours(2), &calendar());
    assert_eq!(end, local(2024, 6, 13, 13, 0));
}

#[test]
fn saturday_evening_overflow_lands_on_monday() {
    let start = local(2024, 6, 15, 19, 0);
    let end = expires_at(start, Duration::minutes(30), &calendar());
    assert_eq!(end, local(2024, 6, 17, 11, 30));
}

#[test]
fn early_morning_start_counts_from_opening() {
    let start = local(2024, 6, 12, 6, 15);
    let end = expires_at(start, Duration::hours(1), &calendar());
    assert_eq!(end, local(2024, 6, 12, 11, 0));
}

#[test]
fn long_duration_is_not_stretched_when_it_lands_in_hours() {
    let start = local(2024, 6, 12, 11, 0);
    let end = expires_at(start, Duration::hours(30), &calendar());
    assert_eq!(end, local(2024, 6, 13, 17, 0));
}

#[test]
fn overflow_across_dst_change_uses_local_opening() {
    // US clocks spring forward on Sunday 2024-03-10.
    let start = local(2024, 3, 8, 17, 30);
    let end = expires_at(start, Duration::hours(1), &calendar());
    assert_eq!(end, local(2024, 3, 11, 10, 30));
}

#[test]
fn naive_start_is_read_as_utc() {
    let naive = NaiveDate::from_ymd_opt(2024, 6, 12)
        .unwrap()
        .and_hms_opt(19, 0, 0)
        .unwrap();
    let duration = Duration::minutes(30);
    assert_eq!(
        expires_at_naive(naive, duration, &calendar()),
        expires_at(naive.and_utc(), duration, &calendar())
    );
    // 19:00 UTC is 12:00 in Los Angeles, inside business hours.
    assert_eq!(
        expires_at_naive(naive, duration, &calendar()),
        naive.and_utc() + duration
    );
}

#[test]
fn business_hours_follow_the_calendar_timezone() {
    let utc_calendar = BusinessCalendar::new(10, 18, chrono_tz::Tz::UTC);
    let at = Utc.with_ymd_and_hms(2024, 6, 12, 11, 0, 0).single().unwrap();

    assert!(utc_calendar.is_business_hours(at));
    // 04:00 in Los Angeles.
    assert!(!calendar().is_business_hours(at));
}
