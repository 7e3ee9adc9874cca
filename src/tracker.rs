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
//! The aggregator tying production ledger, machine state and storage together
use crate::{
    db::{Document, DocumentStore, DocumentStoreExt},
    machine::MachineState,
    production::{PartRecord, PartStat, ProductionEvent, ProductionLedger},
    status::{Clock, MachineStatus, SystemClock},
};
use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

struct Inner<S> {
    store: S,
    ledger: ProductionLedger,
    machine: MachineState,
}

/// Production and machine usage statistics of one machine
///
/// All state sits behind a single lock: program events, saves and reads are serialized
/// against each other, and documents are written while the lock is held. Nothing inside
/// the lock waits on anything but the store.
pub struct Tracker<S, M, C = SystemClock> {
    inner: Mutex<Inner<S>>,
    status: M,
    clock: C,
}

/// Load a document, treating anything unreadable as absent
fn load_or_fresh<D: Document, S: DocumentStore>(store: &mut S) -> Option<D> {
    match store.load::<D>() {
        Ok(doc) => doc,
        Err(e) => {
            warn!(
                document = D::document_name(),
                "starting from scratch: {:#}",
                e
            );
            None
        }
    }
}

impl<S: DocumentStore, M: MachineStatus, C: Clock> Tracker<S, M, C> {
    /// Load the persisted statistics, or start a fresh install
    ///
    /// An existing machine-time document seeds the live status with its total. Without one
    /// the total starts from the current live reading and is persisted right away; if
    /// that write fails the next save tries again.
    pub fn open(mut store: S, status: M, clock: C) -> Result<Self> {
        let mut ledger = match load_or_fresh::<Vec<PartRecord>, _>(&mut store) {
            Some(records) => ProductionLedger::from_records(records),
            None => ProductionLedger::new(),
        };

        let today = clock.today();
        let machine = match load_or_fresh::<MachineState, _>(&mut store) {
            Some(state) => {
                status.restore(&state.total);
                state.dedup_days()
            }
            None => {
                let state = MachineState::fresh_install(status.counters(), today);
                info!(total = ?state.total, %today, "fresh install");
                if let Err(e) = store.store(&state) {
                    warn!("cannot persist fresh install yet: {:#}", e);
                }
                state
            }
        };
        if let Some(record) = machine.day(today) {
            ledger.seed_completed(today, record.data.parts_done);
        }

        info!(
            store = store.name(),
            parts = ledger.parts().count(),
            days = machine.daily_logs.len(),
            "tracker opened"
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                store,
                ledger,
                machine,
            }),
            status,
            clock,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<S>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("tracker state lock poisoned"))
    }

    pub fn program_started(&self, program: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ledger.program_started(program, self.clock.now());
        Ok(())
    }

    pub fn program_stopped(&self, program: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ledger.program_stopped(program, self.clock.now());
        Ok(())
    }

    pub fn program_completed(&self, program: &str) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ledger.program_completed(program, self.clock.now());
        Ok(())
    }

    pub fn handle(&self, event: &ProductionEvent) -> Result<()> {
        let mut inner = self.lock()?;
        inner.ledger.apply(event, self.clock.now());
        Ok(())
    }

    /// Persist the production document, then reconcile and persist the machine state
    #[instrument(skip(self), level = "trace")]
    pub fn save(&self) -> Result<()> {
        let mut guard = self.lock()?;
        let Inner {
            store,
            ledger,
            machine,
        } = &mut *guard;

        store.store(&ledger.to_records())?;

        let today = self.clock.today();
        for (date, parts_done) in ledger.take_closed_days(today) {
            machine.close_day(date, parts_done);
        }
        machine.reconcile(self.status.counters(), ledger.completed_on(today), today);
        store.store(machine)?;

        debug!(
            parts = ledger.parts().count(),
            days = machine.daily_logs.len(),
            "saved"
        );
        Ok(())
    }

    pub fn part(&self, name: &str) -> Result<Option<PartStat>> {
        Ok(self.lock()?.ledger.part(name).copied())
    }

    pub fn production(&self) -> Result<Vec<PartRecord>> {
        Ok(self.lock()?.ledger.to_records())
    }

    /// The machine state as of the last save
    pub fn machine_state(&self) -> Result<MachineState> {
        Ok(self.lock()?.machine.clone())
    }
}

/// Something the flush driver can save periodically
pub trait Flush: Send + Sync + 'static {
    fn flush(&self) -> Result<()>;
}

impl<S, M, C> Flush for Tracker<S, M, C>
where
    S: DocumentStore + 'static,
    M: MachineStatus + 'static,
    C: Clock + 'static,
{
    fn flush(&self) -> Result<()> {
        self.save()
    }
}
