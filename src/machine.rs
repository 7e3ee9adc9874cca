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
//! Machine usage: an all-time total plus one usage window per calendar day
//!
//! The host reports cumulative counters (power-on time, pump-on time, strokes) that keep
//! growing for the lifetime of the machine. The stored [`MachineState`](struct.MachineState.html)
//! splits this into days. On every save the state is reconciled with the live reading:
//!
//! 1. everything before today is `total − today’s window`; this part is frozen,
//! 2. the new total takes power, pump and strokes from the live counters and the parts
//!    count from the frozen part plus today’s completions,
//! 3. today’s window is the new total minus the frozen part, and replaces the existing
//!    entry for today or is appended as a new one.
//!
//! The first reconciliation after midnight thus finds no entry for the new day and
//! starts one, leaving yesterday’s window as it was last written apart from its parts
//! count, which [`close_day`](struct.MachineState.html#method.close_day) brings up to
//! the day’s final number of completions. Counters that went
//! backwards (e.g. a replaced controller) yield negative windows, which are kept.
use crate::db::Document;
use crate::snapshot::{subtract, LiveCounters, TimeSnapshot};
use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Usage on one calendar day
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub data: TimeSnapshot,
}

/// The persisted machine-time document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineState {
    pub total: TimeSnapshot,
    pub daily_logs: Vec<DailyRecord>,
}

impl Document for MachineState {
    fn document_name() -> &'static str {
        "machine_time"
    }
}

impl MachineState {
    /// State of a machine seen for the first time
    ///
    /// The total starts at whatever the live counters read right now, not at zero, and
    /// today’s window is empty.
    pub fn fresh_install(live: LiveCounters, today: NaiveDate) -> Self {
        Self {
            total: live.with_parts(0),
            daily_logs: vec![DailyRecord {
                date: today,
                data: TimeSnapshot::zero(),
            }],
        }
    }

    /// Drop repeated days from a loaded document, keeping the first entry of each
    pub fn dedup_days(mut self) -> Self {
        let before = self.daily_logs.len();
        self.daily_logs = self
            .daily_logs
            .into_iter()
            .unique_by(|record| record.date)
            .collect();
        if self.daily_logs.len() != before {
            warn!(
                dropped = before - self.daily_logs.len(),
                "machine-time document lists some days more than once"
            );
        }
        self
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DailyRecord> {
        self.daily_logs.iter().find(|record| record.date == date)
    }

    /// Usage accrued on all days strictly before `today`
    pub fn total_excluding(&self, today: NaiveDate) -> TimeSnapshot {
        let today_usage = self
            .day(today)
            .map(|record| record.data)
            .unwrap_or_default();
        subtract(&self.total, &today_usage)
    }

    /// Sum of all daily windows
    pub fn history_sum(&self) -> TimeSnapshot {
        self.daily_logs
            .iter()
            .fold(TimeSnapshot::zero(), |sum, record| sum + record.data)
    }

    /// Set the final parts count of a past day, adjusting the total by the difference
    ///
    /// The other fields of the day’s window stay as last written. A day without an entry
    /// gets one holding only its parts.
    pub fn close_day(&mut self, date: NaiveDate, parts_done: i64) {
        if let Some(record) = self.daily_logs.iter_mut().find(|record| record.date == date) {
            let late = parts_done - record.data.parts_done;
            record.data.parts_done = parts_done;
            self.total.parts_done += late;
            if late != 0 {
                debug!(%date, late, "parts completed after the day's last save");
            }
        } else {
            self.daily_logs.push(DailyRecord {
                date,
                data: TimeSnapshot {
                    parts_done,
                    ..TimeSnapshot::zero()
                },
            });
            self.total.parts_done += parts_done;
            debug!(%date, parts_done, "closed a day that was never saved");
        }
    }

    /// Merge a live reading into the total and today’s window
    ///
    /// `parts_today` is the number of parts completed today; the live counters do not
    /// track parts themselves.
    pub fn reconcile(&mut self, live: LiveCounters, parts_today: i64, today: NaiveDate) {
        let before_today = self.total_excluding(today);
        let total = live.with_parts(before_today.parts_done + parts_today);
        let usage = subtract(&total, &before_today);
        if !usage.is_non_negative() {
            warn!(?usage, %today, "live counters are behind the stored history");
        }

        match self.daily_logs.iter_mut().find(|record| record.date == today) {
            Some(record) => record.data = usage,
            None => self.daily_logs.push(DailyRecord {
                date: today,
                data: usage,
            }),
        }
        self.total = total;
        trace!(?total, ?usage, days = self.daily_logs.len(), "reconciled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::snap;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, d).unwrap()
    }

    fn live(power_h: i64, pump_h: i64, stroke: i64) -> LiveCounters {
        LiveCounters::from(&snap(power_h, pump_h, stroke, 0))
    }

    #[test]
    fn fresh_install_starts_at_live_reading() {
        let state = MachineState::fresh_install(live(5, 2, 100), day(1));
        assert_eq!(state.total, snap(5, 2, 100, 0));
        assert_eq!(
            state.daily_logs,
            vec![DailyRecord {
                date: day(1),
                data: TimeSnapshot::zero()
            }]
        );

        let mut again = state.clone();
        again.reconcile(live(5, 2, 100), 0, day(1));
        assert_eq!(again, state);
    }

    #[test]
    fn reconciles_against_previous_days() {
        let mut state = MachineState {
            total: snap(11, 4, 510, 21),
            daily_logs: vec![
                DailyRecord {
                    date: day(1),
                    data: snap(10, 4, 500, 20),
                },
                DailyRecord {
                    date: day(2),
                    data: snap(1, 0, 10, 1),
                },
            ],
        };
        assert_eq!(state.total_excluding(day(2)), snap(10, 4, 500, 20));

        state.reconcile(live(12, 5, 520), 3, day(2));
        assert_eq!(state.total, snap(12, 5, 520, 23));
        assert_eq!(state.day(day(2)).unwrap().data, snap(2, 1, 20, 3));
        assert_eq!(state.daily_logs.len(), 2);
        assert_eq!(state.history_sum(), state.total);
    }

    #[test]
    fn repeated_reconcile_is_stable() {
        let mut state = MachineState::fresh_install(live(5, 2, 100), day(1));
        state.reconcile(live(6, 2, 130), 2, day(1));
        let once = state.clone();
        state.reconcile(live(6, 2, 130), 2, day(1));
        assert_eq!(state, once);
        assert_eq!(state.day(day(1)).unwrap().data, snap(1, 0, 30, 2));
    }

    #[test]
    fn midnight_starts_a_new_day() {
        let mut state = MachineState::fresh_install(live(5, 2, 100), day(1));
        state.reconcile(live(8, 3, 160), 4, day(1));
        let yesterday = *state.day(day(1)).unwrap();

        state.reconcile(live(9, 3, 170), 1, day(2));
        assert_eq!(state.daily_logs.len(), 2);
        assert_eq!(*state.day(day(1)).unwrap(), yesterday);
        let today = state.day(day(2)).unwrap().data;
        assert_eq!(today, snap(1, 0, 10, 1));
        assert!(today.is_non_negative());
        assert_eq!(state.total, snap(9, 3, 170, 5));
        assert_eq!(state.daily_logs[1].date, day(2));
    }

    #[test]
    fn late_parts_are_booked_on_their_day() {
        let mut state = MachineState::fresh_install(live(5, 2, 100), day(1));
        state.reconcile(live(8, 3, 160), 4, day(1));
        let window = state.day(day(1)).unwrap().data;

        state.close_day(day(1), 6);
        assert_eq!(state.day(day(1)).unwrap().data, TimeSnapshot { parts_done: 6, ..window });
        assert_eq!(state.total.parts_done, 6);

        state.reconcile(live(9, 3, 170), 1, day(2));
        assert_eq!(state.total, snap(9, 3, 170, 7));
        assert_eq!(state.day(day(2)).unwrap().data, snap(1, 0, 10, 1));

        // closing again with the same count changes nothing
        let settled = state.clone();
        state.close_day(day(1), 6);
        assert_eq!(state, settled);
    }

    #[test]
    fn unsaved_day_is_closed_with_parts_only() {
        let mut state = MachineState::fresh_install(live(5, 2, 100), day(1));
        state.close_day(day(2), 3);
        assert_eq!(state.daily_logs.len(), 2);
        assert_eq!(state.day(day(2)).unwrap().data, snap(0, 0, 0, 3));
        assert_eq!(state.total, snap(5, 2, 100, 3));
    }

    #[test]
    fn counter_reset_keeps_negative_window() {
        let mut state = MachineState {
            total: snap(10, 4, 500, 20),
            daily_logs: vec![DailyRecord {
                date: day(1),
                data: snap(10, 4, 500, 20),
            }],
        };
        state.reconcile(live(1, 0, 10), 0, day(2));
        assert_eq!(state.day(day(2)).unwrap().data, snap(-9, -4, -490, 0));
        assert_eq!(state.total, snap(1, 0, 10, 20));
    }

    #[test]
    fn keeps_insertion_order() {
        let mut state = MachineState {
            total: snap(3, 0, 0, 0),
            daily_logs: vec![
                DailyRecord {
                    date: day(5),
                    data: snap(1, 0, 0, 0),
                },
                DailyRecord {
                    date: day(3),
                    data: snap(2, 0, 0, 0),
                },
            ],
        };
        state.reconcile(live(4, 0, 0), 0, day(3));
        assert_eq!(
            state.daily_logs.iter().map(|r| r.date).collect::<Vec<_>>(),
            vec![day(5), day(3)]
        );
        assert_eq!(state.day(day(3)).unwrap().data, snap(3, 0, 0, 0));
    }

    #[test]
    fn drops_repeated_days() {
        let record = |d, h| DailyRecord {
            date: day(d),
            data: snap(h, 0, 0, 0),
        };
        let state = MachineState {
            total: snap(3, 0, 0, 0),
            daily_logs: vec![record(1, 1), record(2, 2), record(1, 7)],
        }
        .dedup_days();
        assert_eq!(state.daily_logs, vec![record(1, 1), record(2, 2)]);
    }

    #[test]
    fn document_layout() {
        let state = MachineState::fresh_install(live(5, 2, 100), day(1));
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({
                "total": {
                    "powerOnTime": "05:00:00",
                    "pumpOnTime": "02:00:00",
                    "stroke": 100,
                    "partsDone": 0
                },
                "dailyLogs": [{
                    "date": "2020-06-01",
                    "data": {
                        "powerOnTime": "00:00:00",
                        "pumpOnTime": "00:00:00",
                        "stroke": 0,
                        "partsDone": 0
                    }
                }]
            })
        );
    }
}
