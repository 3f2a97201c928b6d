//! Standard 5-field cron expressions (min hour dom mon dow).
//!
//! Supports `*`, lists, ranges and steps. Day-of-week accepts 0-7 with both 0
//! and 7 meaning Sunday.

use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::{Error, Result};

#[derive(Clone, Debug)]
pub struct CronExpr {
    source: String,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

#[derive(Clone, Debug)]
struct CronField {
    lo: u32,
    hi: u32,
    wildcard: bool,
    allowed: Vec<bool>, // index = value
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let parts = expr.split_whitespace().collect::<Vec<_>>();
        let [minute, hour, dom, month, dow] = parts.as_slice() else {
            return Err(Error::Config(format!(
                "cron {expr:?}: expected 5 fields, got {}",
                parts.len()
            )));
        };

        Ok(Self {
            source: parts.join(" "),
            minute: CronField::parse(minute, 0, 59, false)?,
            hour: CronField::parse(hour, 0, 23, false)?,
            day_of_month: CronField::parse(dom, 1, 31, false)?,
            month: CronField::parse(month, 1, 12, false)?,
            day_of_week: CronField::parse(dow, 0, 6, true)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> bool {
        if !self.minute.contains(dt.minute())
            || !self.hour.contains(dt.hour())
            || !self.month.contains(dt.month())
        {
            return false;
        }

        // If both DOM and DOW are restricted, either may match.
        let dom_match = self.day_of_month.contains(dt.day());
        let dow_match = self
            .day_of_week
            .contains(dt.weekday().num_days_from_sunday());

        match (self.day_of_month.wildcard, self.day_of_week.wildcard) {
            (true, true) => true,
            (true, false) => dow_match,
            (false, true) => dom_match,
            (false, false) => dom_match || dow_match,
        }
    }

    /// First matching minute strictly after `now`.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let mut t = now.clone() + chrono::Duration::minutes(1);
        t = t.with_second(0)?.with_nanosecond(0)?;

        // One leap year of minutes bounds impossible expressions like "0 0 31 2 *".
        for _ in 0..366usize * 24 * 60 {
            if self.matches(&t) {
                return Some(t);
            }
            t += chrono::Duration::minutes(1);
        }
        None
    }
}

impl CronField {
    fn parse(raw: &str, lo: u32, hi: u32, sunday_as_seven: bool) -> Result<Self> {
        let mut allowed = vec![false; (hi + 1) as usize];

        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (base, step) = match part.split_once('/') {
                Some((base, step)) => {
                    let step: u32 = step
                        .trim()
                        .parse()
                        .map_err(|_| Error::Config(format!("cron: invalid step in {part:?}")))?;
                    if step == 0 {
                        return Err(Error::Config("cron: step must be > 0".to_string()));
                    }
                    (base.trim(), step)
                }
                None => (part, 1),
            };

            let (start, end) = if base == "*" {
                (lo, hi)
            } else if let Some((a, b)) = base.split_once('-') {
                (
                    parse_value(a.trim(), sunday_as_seven)?,
                    parse_value(b.trim(), sunday_as_seven)?,
                )
            } else {
                let v = parse_value(base, sunday_as_seven)?;
                if part.contains('/') {
                    (v, hi)
                } else {
                    (v, v)
                }
            };

            let (start, end) = (start.max(lo), end.min(hi));
            if start > end {
                return Err(Error::Config(format!("cron: invalid range {base:?}")));
            }

            let mut v = start;
            while v <= end {
                allowed[v as usize] = true;
                v += step;
            }
        }

        let wildcard = (lo..=hi).all(|v| allowed[v as usize]);
        Ok(Self {
            lo,
            hi,
            wildcard,
            allowed,
        })
    }

    fn contains(&self, v: u32) -> bool {
        v >= self.lo && v <= self.hi && self.allowed.get(v as usize).copied().unwrap_or(false)
    }
}

fn parse_value(s: &str, sunday_as_seven: bool) -> Result<u32> {
    let v: u32 = s
        .parse()
        .map_err(|_| Error::Config(format!("cron: invalid number {s:?}")))?;
    Ok(if sunday_as_seven && v == 7 { 0 } else { v })
}
