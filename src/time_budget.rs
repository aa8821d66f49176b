//! Business-hours aware expiry calculation.
//!
//! Escalation and backoff timers must not lapse while nobody is at work.
//! [`expires_at`] adds a duration to a start instant and, when the result
//! lands outside business hours, carries the overflow past the start
//! day's closing time into the next business morning (skipping weekends).
//!
//! Only a single wraparound is computed. Durations longer than one
//! business day are not stretched further; keep TTLs within normal
//! operational ranges.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Timelike, Utc, Weekday,
};
use chrono_tz::Tz;

/// Longest run of consecutive non-business days the search will skip.
const MAX_SKIPPED_DAYS: u32 = 7;

/// Opening hours and time zone that define when timers may expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCalendar {
    opening_hour: u32,
    closing_hour: u32,
    timezone: Tz,
}

impl BusinessCalendar {
    /// Build a calendar open `opening_hour..closing_hour`, Monday to Friday.
    #[must_use]
    pub fn new(opening_hour: u32, closing_hour: u32, timezone: Tz) -> Self {
        Self {
            opening_hour,
            closing_hour,
            timezone,
        }
    }

    /// First business hour (inclusive).
    #[must_use]
    pub fn opening_hour(&self) -> u32 {
        self.opening_hour
    }

    /// Closing hour (exclusive).
    #[must_use]
    pub fn closing_hour(&self) -> u32 {
        self.closing_hour
    }

    /// Local time zone of the calendar.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Whether `at` falls on a weekday between opening and closing hour,
    /// evaluated in the calendar's local time.
    #[must_use]
    pub fn is_business_hours(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.timezone);
        let weekday = !matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        weekday && self.opening_hour <= local.hour() && local.hour() < self.closing_hour
    }

    /// The instant at which `hour` begins on the local calendar `date`.
    fn at_local(&self, date: NaiveDate, hour: u32) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour));
        match self.timezone.from_local_datetime(&naive) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            // Wall clock skipped by a DST jump; it resumes an hour later.
            LocalResult::None => self
                .timezone
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
                .map_or_else(|| naive.and_utc(), |dt| dt.with_timezone(&Utc)),
        }
    }

    /// First opening instant on `date` or a later business day.
    fn next_opening_from(&self, date: NaiveDate) -> DateTime<Utc> {
        let mut day = date;
        let mut candidate = self.at_local(day, self.opening_hour);
        for _ in 0..MAX_SKIPPED_DAYS {
            if self.is_business_hours(candidate) {
                break;
            }
            day = day.succ_opt().unwrap_or(day);
            candidate = self.at_local(day, self.opening_hour);
        }
        candidate
    }
}

/// Compute when a timer started at `start` and lasting `duration` expires.
///
/// If `start + duration` is inside business hours it is returned as-is.
/// Otherwise the time that overflowed past closing on the start day is
/// added to the next business day's opening instant.
///
/// The overflow is always measured from the start day's closing time, so
/// a timer started after closing also carries the time between closing
/// and its start.
///
/// When the sum lands *before* closing on the start day but outside
/// business hours (a timer started before opening or on a weekend), there
/// is no overflow; the whole duration is counted from the next business
/// opening instead.
#[must_use]
pub fn expires_at(
    start: DateTime<Utc>,
    duration: Duration,
    calendar: &BusinessCalendar,
) -> DateTime<Utc> {
    let end = start + duration;
    if calendar.is_business_hours(end) {
        return end;
    }

    let start_day = start.with_timezone(&calendar.timezone).date_naive();
    let closing = calendar.at_local(start_day, calendar.closing_hour);
    let overflow = end - closing;

    if overflow < Duration::zero() {
        let opening = calendar.next_opening_from(start_day);
        let from = if opening > start { opening } else { start };
        return from + duration;
    }

    let next_day = start_day.succ_opt().unwrap_or(start_day);
    calendar.next_opening_from(next_day) + overflow
}

/// [`expires_at`] for a start time without an offset, read as UTC.
#[must_use]
pub fn expires_at_naive(
    start: NaiveDateTime,
    duration: Duration,
    calendar: &BusinessCalendar,
) -> DateTime<Utc> {
    expires_at(start.and_utc(), duration, calendar)
}
