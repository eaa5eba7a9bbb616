// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! 5-field cron expression parser and next-fire computation.
//!
//! Fields: minute (0-59), hour (0-23), day-of-month (1-31), month (1-12 or
//! `jan`..`dec`), day-of-week (0-7 or `sun`..`sat`, both 0 and 7 meaning
//! Sunday). Supports `*`, `?`, ranges `a-b`, lists `a,b,c`, and steps
//! `x/n` (including `*/n`). Day-of-month and day-of-week combine per Vixie
//! cron: when both are restricted, a day matches if *either* does.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike};
use nightjar_core::NightjarError;

/// A parsed cron expression. Field values are bitmasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: u64,
    hour: u64,
    dom: u64,
    month: u64,
    dow: u64,
    dom_star: bool,
    dow_star: bool,
    source: String,
}

struct Bounds {
    min: u32,
    max: u32,
    names: &'static [(&'static str, u32)],
}

const MINUTE_BOUNDS: Bounds = Bounds { min: 0, max: 59, names: &[] };
const HOUR_BOUNDS: Bounds = Bounds { min: 0, max: 23, names: &[] };
const DOM_BOUNDS: Bounds = Bounds { min: 1, max: 31, names: &[] };
const MONTH_BOUNDS: Bounds = Bounds {
    min: 1,
    max: 12,
    names: &[
        ("jan", 1), ("feb", 2), ("mar", 3), ("apr", 4), ("may", 5), ("jun", 6),
        ("jul", 7), ("aug", 8), ("sep", 9), ("oct", 10), ("nov", 11), ("dec", 12),
    ],
};
const DOW_BOUNDS: Bounds = Bounds {
    min: 0,
    max: 7,
    names: &[
        ("sun", 0), ("mon", 1), ("tue", 2), ("wed", 3), ("thu", 4), ("fri", 5), ("sat", 6),
    ],
};

impl CronSchedule {
    /// Parse a 5-field expression.
    pub fn parse(expr: &str) -> Result<Self, NightjarError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(NightjarError::Schedule("empty cron expression".into()));
        }
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(NightjarError::Schedule(format!(
                "expected 5 fields, found {}",
                fields.len()
            )));
        }

        let (minute, _) = parse_field(fields[0], &MINUTE_BOUNDS, false)
            .map_err(|e| NightjarError::Schedule(format!("invalid minute field: {e}")))?;
        let (hour, _) = parse_field(fields[1], &HOUR_BOUNDS, false)
            .map_err(|e| NightjarError::Schedule(format!("invalid hour field: {e}")))?;
        let (dom, dom_star) = parse_field(fields[2], &DOM_BOUNDS, false)
            .map_err(|e| NightjarError::Schedule(format!("invalid day-of-month field: {e}")))?;
        let (month, _) = parse_field(fields[3], &MONTH_BOUNDS, false)
            .map_err(|e| NightjarError::Schedule(format!("invalid month field: {e}")))?;
        let (dow, dow_star) = parse_field(fields[4], &DOW_BOUNDS, true)
            .map_err(|e| NightjarError::Schedule(format!("invalid day-of-week field: {e}")))?;

        Ok(CronSchedule {
            minute,
            hour,
            dom,
            month,
            dow,
            dom_star,
            dow_star,
            source: expr.to_string(),
        })
    }

    /// The source expression as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compute the next fire time strictly after `t`, at minute
    /// granularity. Returns `None` when no match exists within five years.
    pub fn next<Tz: TimeZone>(&self, t: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = t.timezone();

        // Round up to the next whole minute.
        let mut t = t.clone()
            + Duration::seconds(60 - i64::from(t.second()))
            - Duration::nanoseconds(i64::from(t.nanosecond()));
        let mut added = false;
        let year_limit = t.year() + 5;

        'wrap: loop {
            if t.year() > year_limit {
                return None;
            }

            while !has_bit(self.month, t.month()) {
                if !added {
                    added = true;
                    t = start_of_month(&tz, &t)?;
                }
                t = add_month(&tz, &t)?;
                if t.month() == 1 {
                    continue 'wrap;
                }
            }

            while !self.day_matches(&t) {
                if !added {
                    added = true;
                    t = start_of_day(&tz, &t)?;
                }
                t = t + Duration::days(1);
                // A DST transition can land the day-step off midnight.
                // Re-anchor to the nearest day boundary.
                if t.hour() != 0 {
                    let hour = t.hour();
                    if hour > 12 {
                        t = t + Duration::hours(i64::from(24 - hour));
                    } else {
                        t = t - Duration::hours(i64::from(hour));
                    }
                }
                if t.day() == 1 {
                    continue 'wrap;
                }
            }

            while !has_bit(self.hour, t.hour()) {
                if !added {
                    added = true;
                    t = start_of_hour(&tz, &t)?;
                }
                t = t + Duration::hours(1);
                if t.hour() == 0 {
                    continue 'wrap;
                }
            }

            while !has_bit(self.minute, t.minute()) {
                if !added {
                    added = true;
                    t = t.clone() - Duration::seconds(i64::from(t.second()));
                }
                t = t + Duration::minutes(1);
                if t.minute() == 0 {
                    continue 'wrap;
                }
            }

            return Some(t);
        }
    }

    fn day_matches<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> bool {
        let dom_match = has_bit(self.dom, t.day());
        let dow_match = has_bit(self.dow, t.weekday().num_days_from_sunday());
        if self.dom_star || self.dow_star {
            dom_match && dow_match
        } else {
            dom_match || dow_match
        }
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(field: &str, bounds: &Bounds, is_dow: bool) -> Result<(u64, bool), String> {
    let mut bits = 0u64;
    let mut has_star = false;
    for part in field.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err("empty segment".into());
        }
        let (b, star) = parse_segment(part, bounds, is_dow)?;
        bits |= b;
        has_star = has_star || star;
    }
    if bits == 0 {
        return Err("no values".into());
    }
    Ok((bits, has_star))
}

fn parse_segment(seg: &str, bounds: &Bounds, is_dow: bool) -> Result<(u64, bool), String> {
    let (base, step) = match seg.split_once('/') {
        Some((base, step_part)) => {
            if step_part.contains('/') {
                return Err(format!("too many '/' in {seg:?}"));
            }
            let n: u32 = step_part
                .parse()
                .map_err(|_| format!("bad step {step_part:?}"))?;
            if n == 0 {
                return Err("step must be > 0".into());
            }
            (base, Some(n))
        }
        None => (seg, None),
    };

    let (start, end, star) = if base == "*" || base == "?" {
        (bounds.min, bounds.max, step.is_none())
    } else if let Some((left, right)) = base.split_once('-') {
        if right.contains('-') {
            return Err(format!("bad range {base:?}"));
        }
        let start = parse_value(left, bounds)?;
        let end = parse_value(right, bounds)?;
        (start, end, false)
    } else {
        let val = parse_value(base, bounds)?;
        let end = if step.is_some() { bounds.max } else { val };
        (val, end, false)
    };

    if start < bounds.min || start > bounds.max {
        return Err(format!("value {start} out of range"));
    }
    if end < bounds.min || end > bounds.max {
        return Err(format!("value {end} out of range"));
    }
    if end < start {
        return Err("range start > end".into());
    }

    Ok((build_bits(start, end, step.unwrap_or(1), is_dow), star))
}

fn parse_value(s: &str, bounds: &Bounds) -> Result<u32, String> {
    let s = s.trim();
    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }
    let lower = s.to_ascii_lowercase();
    for (name, value) in bounds.names {
        if *name == lower {
            return Ok(*value);
        }
    }
    Err(format!("bad value {s:?}"))
}

fn build_bits(start: u32, end: u32, step: u32, is_dow: bool) -> u64 {
    let mut bits = 0u64;
    let mut v = start;
    while v <= end {
        // Day-of-week 7 aliases Sunday.
        let idx = if is_dow && v == 7 { 0 } else { v };
        bits |= 1 << idx;
        v += step;
    }
    bits
}

fn has_bit(bits: u64, value: u32) -> bool {
    value <= 63 && bits & (1 << value) != 0
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: chrono::NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&naive).latest())
}

fn start_of_month<Tz: TimeZone>(tz: &Tz, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let naive = NaiveDate::from_ymd_opt(t.year(), t.month(), 1)?.and_hms_opt(0, 0, 0)?;
    resolve_local(tz, naive)
}

fn add_month<Tz: TimeZone>(tz: &Tz, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    let naive = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    resolve_local(tz, naive)
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let naive = NaiveDate::from_ymd_opt(t.year(), t.month(), t.day())?.and_hms_opt(0, 0, 0)?;
    resolve_local(tz, naive)
}

fn start_of_hour<Tz: TimeZone>(tz: &Tz, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let naive = NaiveDate::from_ymd_opt(t.year(), t.month(), t.day())?
        .and_hms_opt(t.hour(), 0, 0)?;
    resolve_local(tz, naive)
}
