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
//! What the tracker needs from its host: live machine counters and a wall clock
use crate::snapshot::{LiveCounters, TimeSnapshot};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::sync::Mutex;

/// The host's live view of the machine
///
/// The counters are cumulative and monotonically increasing while the host runs. They are
/// trusted as ground truth for power-on time, pump-on time and strokes.
pub trait MachineStatus: Send + Sync {
    fn counters(&self) -> LiveCounters;

    /// Seed the live counters with a previously persisted total
    ///
    /// Called once after loading an existing machine-time document, so that a host whose
    /// counters start at zero on every boot continues counting from the stored total.
    fn restore(&self, _total: &TimeSnapshot) {}
}

/// Source of wall-clock time, in the machine's local time zone
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock(Mutex<NaiveDateTime>);

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self(Mutex::new(start))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Counters held in memory, set by whoever owns them
///
/// Useful for hosts that poll the machine themselves, and for simulations.
#[derive(Debug)]
pub struct SharedCounters(Mutex<LiveCounters>);

impl SharedCounters {
    pub fn new(counters: LiveCounters) -> Self {
        Self(Mutex::new(counters))
    }

    pub fn set(&self, counters: LiveCounters) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = counters;
    }

    pub fn update(&self, f: impl FnOnce(&mut LiveCounters)) {
        f(&mut self.0.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

impl MachineStatus for SharedCounters {
    fn counters(&self) -> LiveCounters {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn restore(&self, total: &TimeSnapshot) {
        self.set(LiveCounters::from(total));
    }
}

impl<T: MachineStatus + ?Sized> MachineStatus for std::sync::Arc<T> {
    fn counters(&self) -> LiveCounters {
        (**self).counters()
    }
    fn restore(&self, total: &TimeSnapshot) {
        (**self).restore(total)
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

#[cfg(test)]
pub(crate) fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, 0))
        .unwrap()
}
