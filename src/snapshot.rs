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
//! Quantities of machine usage
use crate::timespan::whole_ticks;
use chrono::Duration;
use derive_more::{Add, AddAssign};
use serde::{Deserialize, Serialize};

/// A quantity of machine usage over some time window
///
/// Depending on context this is either a cumulative total (since the machine was
/// installed) or a window (one calendar day). All fields are signed: a window computed
/// from two cumulative values may come out negative when the host's counters were reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Add, AddAssign, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSnapshot {
    #[serde(with = "crate::timespan")]
    pub power_on_time: Duration,
    #[serde(with = "crate::timespan")]
    pub pump_on_time: Duration,
    pub stroke: i64,
    pub parts_done: i64,
}

impl TimeSnapshot {
    pub fn zero() -> Self {
        Self {
            power_on_time: Duration::zero(),
            pump_on_time: Duration::zero(),
            stroke: 0,
            parts_done: 0,
        }
    }

    /// True if no component is negative
    pub fn is_non_negative(&self) -> bool {
        self.power_on_time >= Duration::zero()
            && self.pump_on_time >= Duration::zero()
            && self.stroke >= 0
            && self.parts_done >= 0
    }
}

impl Default for TimeSnapshot {
    fn default() -> Self {
        Self::zero()
    }
}

/// Component-wise difference `a - b`
///
/// Only meaningful when both operands are cumulative values counted from the same
/// origin; the result is the window between them, not a cumulative value.
pub fn subtract(a: &TimeSnapshot, b: &TimeSnapshot) -> TimeSnapshot {
    TimeSnapshot {
        power_on_time: a.power_on_time - b.power_on_time,
        pump_on_time: a.pump_on_time - b.pump_on_time,
        stroke: a.stroke - b.stroke,
        parts_done: a.parts_done - b.parts_done,
    }
}

/// The cumulative counters a machine reports about itself
///
/// These lack the parts count, which is maintained by the production ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LiveCounters {
    pub power_on_time: Duration,
    pub pump_on_time: Duration,
    pub stroke: i64,
}

impl LiveCounters {
    /// The reading as a snapshot, with durations cut to what the documents can hold
    pub fn with_parts(self, parts_done: i64) -> TimeSnapshot {
        TimeSnapshot {
            power_on_time: whole_ticks(self.power_on_time),
            pump_on_time: whole_ticks(self.pump_on_time),
            stroke: self.stroke,
            parts_done,
        }
    }
}

impl From<&TimeSnapshot> for LiveCounters {
    fn from(s: &TimeSnapshot) -> Self {
        Self {
            power_on_time: s.power_on_time,
            pump_on_time: s.pump_on_time,
            stroke: s.stroke,
        }
    }
}

#[cfg(test)]
pub(crate) fn snap(power_h: i64, pump_h: i64, stroke: i64, parts: i64) -> TimeSnapshot {
    TimeSnapshot {
        power_on_time: Duration::hours(power_h),
        pump_on_time: Duration::hours(pump_h),
        stroke,
        parts_done: parts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn must_subtract_componentwise() {
        let delta = subtract(&snap(12, 5, 520, 23), &snap(10, 4, 500, 20));
        assert_eq!(delta, snap(2, 1, 20, 3));
        assert!(delta.is_non_negative());

        let reset = subtract(&snap(1, 0, 10, 0), &snap(10, 4, 500, 20));
        assert_eq!(reset, snap(-9, -4, -490, -20));
        assert!(!reset.is_non_negative());
    }

    #[test]
    fn must_add_windows() {
        let mut total = TimeSnapshot::zero();
        total += snap(2, 1, 20, 3);
        total += snap(1, 0, 5, 1);
        assert_eq!(total, snap(3, 1, 25, 4));
        assert_eq!(snap(1, 1, 1, 1) + snap(1, 1, 1, 1), snap(2, 2, 2, 2));
    }

    #[test]
    fn must_use_document_field_names() {
        let value = serde_json::to_value(&snap(5, 2, 100, 0)).unwrap();
        assert_eq!(
            value,
            json!({
                "powerOnTime": "05:00:00",
                "pumpOnTime": "02:00:00",
                "stroke": 100,
                "partsDone": 0
            })
        );
        let back: TimeSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snap(5, 2, 100, 0));
    }

    #[test]
    fn must_attach_parts_to_live_counters() {
        let live = LiveCounters::from(&snap(5, 2, 100, 77));
        assert_eq!(live.with_parts(0), snap(5, 2, 100, 0));
    }

    #[test]
    fn live_readings_keep_only_whole_ticks() {
        let live = LiveCounters {
            power_on_time: Duration::hours(5) + Duration::nanoseconds(1_234),
            pump_on_time: Duration::nanoseconds(99),
            stroke: 3,
        };
        let s = live.with_parts(1);
        assert_eq!(s.power_on_time, Duration::hours(5) + Duration::nanoseconds(1_200));
        assert_eq!(s.pump_on_time, Duration::zero());

        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(serde_json::from_str::<TimeSnapshot>(&json).unwrap(), s);
    }
}
