/*
 * Copyright 2020 Actyx AG
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
//! Serde adapter for durations in time-span notation
//!
//! The persisted documents store durations as `[-][d.]hh:mm:ss[.fffffff]`, where the
//! optional fraction has seven digits (ticks of 100ns). The day component is only
//! written when non-zero, as is the fraction:
//!
//! ```rust
//! use chrono::Duration;
//! use machine_time_tracker::timespan::TimeSpan;
//!
//! let d = Duration::hours(26) + Duration::milliseconds(500);
//! assert_eq!(TimeSpan(d).to_string(), "1.02:00:00.5000000");
//! ```
//!
//! Use it on struct fields with `#[serde(with = "crate::timespan")]`.
use anyhow::{anyhow, bail, ensure, Result};
use chrono::Duration;
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
use std::fmt;

const NANOS_PER_TICK: i64 = 100;
const SECONDS_PER_DAY: i64 = 86_400;
/// largest day count a time span can hold
const MAX_DAYS: i64 = 10_675_199;

/// Display wrapper rendering a duration in time-span notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan(pub Duration);

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < Duration::zero();
        let abs = if negative { -self.0 } else { self.0 };
        let secs = abs.num_seconds();
        let ticks = (abs - Duration::seconds(secs))
            .num_nanoseconds()
            .unwrap_or(0)
            / NANOS_PER_TICK;

        if negative {
            f.write_str("-")?;
        }
        let days = secs / SECONDS_PER_DAY;
        if days > 0 {
            write!(f, "{}.", days)?;
        }
        let rem = secs % SECONDS_PER_DAY;
        write!(f, "{:02}:{:02}:{:02}", rem / 3600, rem % 3600 / 60, rem % 60)?;
        if ticks > 0 {
            write!(f, ".{:07}", ticks)?;
        }
        Ok(())
    }
}

/// Truncate a duration to whole ticks of 100ns, the resolution of the text form
///
/// Truncates towards zero, as formatting does, so `parse(&TimeSpan(d).to_string())`
/// gives back exactly `whole_ticks(d)`.
pub fn whole_ticks(d: Duration) -> Duration {
    let secs = Duration::seconds(d.num_seconds());
    let nanos = (d - secs).num_nanoseconds().unwrap_or(0);
    secs + Duration::nanoseconds(nanos / NANOS_PER_TICK * NANOS_PER_TICK)
}

fn number(field: &str, s: &str) -> Result<i64> {
    ensure!(
        !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()),
        "invalid {} component `{}`",
        field,
        s
    );
    s.parse::<i64>()
        .map_err(|e| anyhow!("invalid {} component `{}`: {}", field, s, e))
}

/// Parse a duration from time-span notation
///
/// Accepts everything [`TimeSpan`](struct.TimeSpan.html) writes, plus a bare day count
/// (`"3"`) and fractions with fewer than seven digits.
pub fn parse(s: &str) -> Result<Duration> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let parts = body.split(':').collect::<Vec<_>>();
    let (days, hours, minutes, seconds, fraction) = match parts.as_slice() {
        [days] => (number("day", days)?, 0, 0, 0, 0),
        [head, minutes, seconds] => {
            let (days, hours) = match head.split_once('.') {
                Some((d, h)) => (number("day", d)?, number("hour", h)?),
                None => (0, number("hour", head)?),
            };
            let (seconds, fraction) = match seconds.split_once('.') {
                Some((secs, frac)) => {
                    ensure!(frac.len() <= 7, "fraction `{}` exceeds seven digits", frac);
                    let ticks = number("fraction", frac)? * 10_i64.pow(7 - frac.len() as u32);
                    (number("second", secs)?, ticks)
                }
                None => (number("second", seconds)?, 0),
            };
            (days, hours, number("minute", minutes)?, seconds, fraction)
        }
        _ => bail!("`{}` is not a time span", s),
    };
    ensure!(days <= MAX_DAYS, "days out of range in `{}`", s);
    ensure!(hours < 24, "hours out of range in `{}`", s);
    ensure!(minutes < 60, "minutes out of range in `{}`", s);
    ensure!(seconds < 60, "seconds out of range in `{}`", s);

    let total_secs = days
        .checked_mul(SECONDS_PER_DAY)
        .and_then(|d| d.checked_add(hours * 3600 + minutes * 60 + seconds))
        .ok_or_else(|| anyhow!("`{}` overflows", s))?;
    let d = Duration::seconds(total_secs) + Duration::nanoseconds(fraction * NANOS_PER_TICK);
    Ok(if negative { -d } else { d })
}

pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&TimeSpan(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(D::Error::custom)
}
