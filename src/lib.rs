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
//! Production and machine usage statistics that survive restarts
//!
//! A machine on the shop-floor runs programs, each producing one part. This library keeps
//! two kinds of statistics about it:
//!
//!  - per part: how much time was spent producing it and how many units were completed
//!    (see [`production`](production/index.html)),
//!  - per machine: power-on time, pump-on time, strokes and parts produced, as an all-time
//!    total and broken down by calendar day (see [`machine`](machine/index.html)).
//!
//! The host feeds in program events and provides the machine’s live cumulative counters;
//! the [`Tracker`](tracker/struct.Tracker.html) turns these into JSON documents that are
//! written periodically by a [`FlushDriver`](runner/struct.FlushDriver.html):
//!
//! ```rust
//! use machine_time_tracker::{
//!     db::MemoryStore,
//!     snapshot::LiveCounters,
//!     status::{SharedCounters, SystemClock},
//!     tracker::Tracker,
//! };
//! use chrono::Duration;
//!
//! let counters = SharedCounters::new(LiveCounters {
//!     power_on_time: Duration::hours(5),
//!     pump_on_time: Duration::hours(2),
//!     stroke: 100,
//! });
//! let tracker = Tracker::open(MemoryStore::new(), counters, SystemClock)?;
//!
//! tracker.program_started("bracket-7")?;
//! tracker.program_completed("bracket-7")?;
//! tracker.save()?;
//!
//! assert_eq!(tracker.machine_state()?.total.parts_done, 1);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Hosts that want the complete lifecycle (settings file, JSON files in a storage
//! directory, periodic flushing on a tokio runtime) use [`Service`](runner/struct.Service.html).

pub mod db;
pub mod machine;
pub mod production;
pub mod runner;
pub mod settings;
pub mod snapshot;
pub mod status;
pub mod timespan;
pub mod tracker;
