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
//! Per-part production statistics
//!
//! The ledger follows the program events of a single machine. There is one "current part"
//! slot: starting a program selects the part, stopping it banks the time since the start,
//! completing it banks the time once more and books one finished unit together with all
//! banked time onto that part’s statistic.
//!
//! Starting a *different* part discards time banked for the previous one that was never
//! completed, i.e. an abandoned run does not show up in any statistic.
use crate::{db::Document, timespan::whole_ticks};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Lifetime statistics of one part
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartStat {
    pub time_taken: Duration,
    pub parts_done: u64,
}

impl Default for PartStat {
    fn default() -> Self {
        Self {
            time_taken: Duration::zero(),
            parts_done: 0,
        }
    }
}

/// One entry of the production document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    pub part_name: String,
    #[serde(with = "crate::timespan")]
    pub time_taken: Duration,
    pub parts_done: u64,
}

impl Document for Vec<PartRecord> {
    fn document_name() -> &'static str {
        "production"
    }
}

/// Program notifications delivered by the host
///
/// The quantity is accepted for compatibility with hosts that send it, but not used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProductionEvent {
    #[serde(rename_all = "camelCase")]
    ProgramStarted {
        program: String,
        #[serde(default)]
        quantity: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    ProgramStopped {
        program: String,
        #[serde(default)]
        quantity: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    ProgramCompleted {
        program: String,
        #[serde(default)]
        quantity: Option<u32>,
    },
}

impl ProductionEvent {
    pub fn program(&self) -> &str {
        match self {
            ProductionEvent::ProgramStarted { program, .. }
            | ProductionEvent::ProgramStopped { program, .. }
            | ProductionEvent::ProgramCompleted { program, .. } => program,
        }
    }
}

/// Number of parts completed per calendar day
///
/// Counts the current day. When the date moves on, the final count of the previous day
/// is kept aside until [`take_closed`](#method.take_closed) hands it out, so that
/// completions shortly before midnight still reach that day’s statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DailyCounter {
    date: Option<NaiveDate>,
    count: i64,
    closed: BTreeMap<NaiveDate, i64>,
}

impl DailyCounter {
    pub fn seeded(date: NaiveDate, count: i64) -> Self {
        Self {
            date: Some(date),
            count,
            closed: BTreeMap::new(),
        }
    }

    fn roll_to(&mut self, today: NaiveDate) {
        if let Some(date) = self.date {
            if date == today {
                return;
            }
            self.closed.insert(date, self.count);
        }
        self.date = Some(today);
        self.count = 0;
    }

    pub fn increment(&mut self, today: NaiveDate) {
        self.roll_to(today);
        self.count += 1;
    }

    /// Completions counted on the given day; zero for any day the counter is not on
    pub fn on(&self, day: NaiveDate) -> i64 {
        if self.date == Some(day) {
            self.count
        } else {
            0
        }
    }

    /// Move on to `today` and hand out the final counts of all days before it
    pub fn take_closed(&mut self, today: NaiveDate) -> BTreeMap<NaiveDate, i64> {
        self.roll_to(today);
        std::mem::take(&mut self.closed)
    }
}

#[derive(Debug)]
pub struct ProductionLedger {
    parts: BTreeMap<String, PartStat>,
    current: Option<String>,
    started_at: Option<NaiveDateTime>,
    accrued: Duration,
    completed: DailyCounter,
}

impl Default for ProductionLedger {
    fn default() -> Self {
        Self {
            parts: BTreeMap::new(),
            current: None,
            started_at: None,
            accrued: Duration::zero(),
            completed: DailyCounter::default(),
        }
    }
}

impl ProductionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the statistics from a production document
    ///
    /// Repeated part names are merged by adding them up.
    pub fn from_records(records: Vec<PartRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            let stat = ledger.parts.entry(record.part_name).or_default();
            stat.time_taken = stat.time_taken + record.time_taken;
            stat.parts_done += record.parts_done;
        }
        ledger
    }

    /// The production document, ordered by part name
    pub fn to_records(&self) -> Vec<PartRecord> {
        self.parts
            .iter()
            .map(|(name, stat)| PartRecord {
                part_name: name.clone(),
                time_taken: stat.time_taken,
                parts_done: stat.parts_done,
            })
            .collect()
    }

    pub fn part(&self, name: &str) -> Option<&PartStat> {
        self.parts.get(name)
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &PartStat)> {
        self.parts.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn current_part(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Time banked for the current part that has not been booked by a completion yet
    pub fn accrued(&self) -> Duration {
        self.accrued
    }

    /// Parts completed on the given day, as far as this ledger has seen them
    pub fn completed_on(&self, day: NaiveDate) -> i64 {
        self.completed.on(day)
    }

    /// Final part counts of days before `today` that were not handed out yet
    pub fn take_closed_days(&mut self, today: NaiveDate) -> BTreeMap<NaiveDate, i64> {
        self.completed.take_closed(today)
    }

    /// Continue counting a day’s completions from a persisted value
    pub fn seed_completed(&mut self, day: NaiveDate, count: i64) {
        self.completed = DailyCounter::seeded(day, count);
    }

    pub fn apply(&mut self, event: &ProductionEvent, now: NaiveDateTime) {
        match event {
            ProductionEvent::ProgramStarted { program, .. } => self.program_started(program, now),
            ProductionEvent::ProgramStopped { program, .. } => self.program_stopped(program, now),
            ProductionEvent::ProgramCompleted { program, .. } => {
                self.program_completed(program, now)
            }
        }
    }

    pub fn program_started(&mut self, name: &str, now: NaiveDateTime) {
        if self.current.as_deref() != Some(name) {
            if self.accrued != Duration::zero() {
                debug!(
                    previous = ?self.current,
                    accrued_ms = self.accrued.num_milliseconds(),
                    "part switch, dropping accrued time"
                );
            }
            self.accrued = Duration::zero();
            self.current = Some(name.to_owned());
        }
        self.started_at = Some(now);
    }

    pub fn program_stopped(&mut self, name: &str, now: NaiveDateTime) {
        self.bank(name, now);
    }

    pub fn program_completed(&mut self, name: &str, now: NaiveDateTime) {
        self.bank(name, now);
        let accrued = std::mem::replace(&mut self.accrued, Duration::zero());
        let stat = self.parts.entry(name.to_owned()).or_default();
        stat.time_taken = stat.time_taken + accrued;
        stat.parts_done += 1;
        self.started_at = Some(now);
        self.completed.increment(now.date());
        debug!(
            part = name,
            parts_done = stat.parts_done,
            accrued_ms = accrued.num_milliseconds(),
            "part completed"
        );
    }

    fn bank(&mut self, name: &str, now: NaiveDateTime) {
        match self.started_at {
            Some(start) => self.accrued = self.accrued + whole_ticks(now - start),
            None => warn!(part = name, "program event without a preceding start"),
        }
    }
}
