//! Date handling: the request offset, an injectable clock and Finnish labels.

use std::sync::Mutex;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

/// Which day a menu request is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateOffset {
    Today,
    Tomorrow,
}

impl DateOffset {
    pub fn days(self) -> i64 {
        match self {
            DateOffset::Today => 0,
            DateOffset::Tomorrow => 1,
        }
    }
}

/// Source of "now". The offset of the returned time is the bot's fixed
/// timezone; every calendar computation uses it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

const HELSINKI_STANDARD_SECS: i32 = 2 * 3600;

/// The bot's timezone: a standard UTC offset, optionally with EU summer time
/// (one hour ahead from the last Sunday of March to the last Sunday of
/// October, switching at 01:00 UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BotTimezone {
    standard: FixedOffset,
    eu_summer_time: bool,
}

impl BotTimezone {
    pub fn new(standard: FixedOffset, eu_summer_time: bool) -> Self {
        Self {
            standard,
            eu_summer_time,
        }
    }

    /// `None` when the offset is out of range.
    pub fn from_minutes(standard_minutes: i32, eu_summer_time: bool) -> Option<Self> {
        let standard = FixedOffset::east_opt(standard_minutes.checked_mul(60)?)?;
        Some(Self::new(standard, eu_summer_time))
    }

    /// Europe/Helsinki.
    pub fn helsinki() -> Self {
        let standard = FixedOffset::east_opt(HELSINKI_STANDARD_SECS).unwrap_or(Utc.fix());
        Self::new(standard, true)
    }

    pub fn offset_at(&self, at: DateTime<Utc>) -> FixedOffset {
        if !(self.eu_summer_time && is_eu_summer_time(at)) {
            return self.standard;
        }
        FixedOffset::east_opt(self.standard.local_minus_utc() + 3600).unwrap_or(self.standard)
    }
}

impl Default for BotTimezone {
    fn default() -> Self {
        Self::helsinki()
    }
}

fn is_eu_summer_time(at: DateTime<Utc>) -> bool {
    let year = at.year();
    match (switch_instant(year, 3), switch_instant(year, 10)) {
        (Some(start), Some(end)) => start <= at && at < end,
        _ => false,
    }
}

/// 01:00 UTC on the last Sunday of `month` (March or October, both 31 days).
fn switch_instant(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let last = NaiveDate::from_ymd_opt(year, month, 31)?;
    let sunday = last - Duration::days(i64::from(last.weekday().num_days_from_sunday()));
    Some(sunday.and_hms_opt(1, 0, 0)?.and_utc())
}

/// Wall clock in the configured [`BotTimezone`], independent of the host's.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock {
    tz: BotTimezone,
}

impl SystemClock {
    pub fn new(tz: BotTimezone) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let now = Utc::now();
        now.with_timezone(&self.tz.offset_at(now))
    }
}

/// Clock that only moves when told to. Used by tests and dry runs.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Helsinki winter time (UTC+2) at the given local wall-clock time.
    pub fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> Option<Self> {
        let tz = FixedOffset::east_opt(2 * 3600)?;
        let now = tz.with_ymd_and_hms(y, m, d, hh, mm, 0).single()?;
        Some(Self::new(now))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Calendar day the request targets.
pub fn target_date(clock: &dyn Clock, offset: DateOffset) -> NaiveDate {
    clock.today() + Duration::days(offset.days())
}

/// Cache key: the *current* calendar date plus the offset flag.
pub fn date_key(today: NaiveDate, offset: DateOffset) -> String {
    format!("{}/{}", today.format("%Y-%m-%d"), offset.days())
}

/// Lower-case Finnish weekday name ("maanantai", ...).
pub fn weekday_fi(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "maanantai",
        Weekday::Tue => "tiistai",
        Weekday::Wed => "keskiviikko",
        Weekday::Thu => "torstai",
        Weekday::Fri => "perjantai",
        Weekday::Sat => "lauantai",
        Weekday::Sun => "sunnuntai",
    }
}

/// Finnish short date as printed by the upstream sites: `19.10.`
pub fn short_date(date: NaiveDate) -> String {
    format!("{}.{}.", date.day(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_key_separates_today_and_tomorrow() {
        let d = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(date_key(d, DateOffset::Today), "2026-10-19/0");
        assert_eq!(date_key(d, DateOffset::Tomorrow), "2026-10-19/1");
    }

    #[test]
    fn target_date_rolls_over_month_end() {
        let clock = ManualClock::at(2026, 10, 31, 11, 0).unwrap();
        assert_eq!(
            target_date(&clock, DateOffset::Tomorrow),
            NaiveDate::from_ymd_opt(2026, 11, 1).unwrap()
        );
    }

    #[test]
    fn weekday_and_short_date_labels() {
        let d = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(weekday_fi(d.weekday()), "maanantai");
        assert_eq!(short_date(d), "19.10.");
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at(2026, 10, 19, 23, 30).unwrap();
        clock.advance(Duration::hours(1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
    }

    fn utc(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, hh, mm, 0).unwrap()
    }

    #[test]
    fn helsinki_switches_to_summer_time_at_eu_boundaries() {
        let tz = BotTimezone::helsinki();
        let hours = |at: DateTime<Utc>| tz.offset_at(at).local_minus_utc() / 3600;
        assert_eq!(hours(utc(2026, 1, 15, 12, 0)), 2);
        assert_eq!(hours(utc(2026, 3, 29, 0, 59)), 2);
        assert_eq!(hours(utc(2026, 3, 29, 1, 0)), 3);
        assert_eq!(hours(utc(2026, 7, 1, 12, 0)), 3);
        assert_eq!(hours(utc(2026, 10, 25, 0, 59)), 3);
        assert_eq!(hours(utc(2026, 10, 25, 1, 0)), 2);
        assert_eq!(hours(utc(2026, 10, 19, 8, 45)), 2);
    }

    #[test]
    fn fixed_timezone_ignores_summer_time() {
        let tz = BotTimezone::from_minutes(-90, false).unwrap();
        assert_eq!(tz.offset_at(utc(2026, 7, 1, 12, 0)).local_minus_utc(), -90 * 60);
        assert!(BotTimezone::from_minutes(30 * 60, false).is_none());
    }

    #[test]
    fn system_clock_reports_its_configured_offset() {
        let clock = SystemClock::new(BotTimezone::from_minutes(5 * 60, false).unwrap());
        assert_eq!(clock.now().offset().local_minus_utc(), 5 * 3600);
    }

    #[test]
    fn late_evening_utc_is_already_tomorrow_in_helsinki() {
        let at = utc(2026, 10, 19, 22, 30);
        let local = at.with_timezone(&BotTimezone::helsinki().offset_at(at));
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
    }
}
