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
//! Periodic flushing and the service lifecycle
//!
//! A [`FlushDriver`](struct.FlushDriver.html) saves its target at a fixed interval until
//! it is stopped. The [`Service`](struct.Service.html) bundles settings, file storage,
//! tracker and driver into the initialize/uninitialize pair a host calls at startup
//! and shutdown.
use crate::{
    db::FileStore,
    settings::LoadedSettings,
    status::{Clock, MachineStatus, SystemClock},
    tracker::{Flush, Tracker},
};
use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{runtime::Handle, sync::oneshot, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};

enum TickStream {
    Tick,
    Stop,
}

/// What a flush driver did during its lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    pub saved: usize,
    pub failed: usize,
}

/// A task saving its target periodically
///
/// The sleep towards the next tick only starts after the previous save has finished, so
/// saves never overlap however long they take. A failed save is logged and the driver
/// carries on with the next tick. Dropping the driver without calling
/// [`stop`](#method.stop) also ends the task, after the save in progress if any.
pub struct FlushDriver {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<FlushStats>,
}

impl FlushDriver {
    pub fn spawn<T: Flush>(
        handle: &Handle,
        target: Arc<T>,
        every: Duration,
        name: impl Into<String>,
    ) -> Self {
        let (stop, stopped) = oneshot::channel();
        let task = handle.spawn(run_flush_loop(target, every, stopped, name.into()));
        Self {
            stop: Some(stop),
            task,
        }
    }

    /// Stop the driver for good and wait for a running save to finish
    pub async fn stop(mut self) -> Result<FlushStats> {
        if let Some(stop) = self.stop.take() {
            // the task may be gone already, in which case there is nobody to tell
            let _ = stop.send(());
        }
        (&mut self.task)
            .await
            .map_err(|e| anyhow!("flush task failed: {}", e))
    }
}

async fn run_flush_loop<T: Flush>(
    target: Arc<T>,
    every: Duration,
    stopped: oneshot::Receiver<()>,
    name: String,
) -> FlushStats {
    info!("{}: flushing every {:?}", name, every);

    let ticks = stream::unfold((), move |()| async move {
        sleep(every).await;
        Some((TickStream::Tick, ()))
    });
    let stop = stream::once(stopped).map(|_| TickStream::Stop);
    let mut input = stream::select(ticks, stop).boxed();

    let mut stats = FlushStats::default();
    while let Some(elem) = input.next().await {
        match elem {
            TickStream::Tick => {
                let target = target.clone();
                match tokio::task::spawn_blocking(move || target.flush()).await {
                    Ok(Ok(())) => {
                        stats.saved += 1;
                        debug!("{}:   saved ({} so far)", name, stats.saved);
                    }
                    Ok(Err(e)) => {
                        stats.failed += 1;
                        error!("{}:   save failed: {:#}", name, e);
                    }
                    Err(e) => {
                        stats.failed += 1;
                        error!("{}:   save did not complete: {}", name, e);
                    }
                }
            }
            TickStream::Stop => {
                info!(
                    saved = stats.saved,
                    failed = stats.failed,
                    "{}: flushing stopped",
                    name
                );
                break;
            }
        }
    }
    stats
}

/// The tracker as a host runs it: settings, JSON files and periodic flushing
pub struct Service<M, C = SystemClock> {
    tracker: Arc<Tracker<FileStore, M, C>>,
    settings: LoadedSettings,
    driver: FlushDriver,
}

impl<M: MachineStatus + 'static> Service<M> {
    pub fn initialize(
        settings_path: impl Into<PathBuf>,
        status: M,
        handle: &Handle,
    ) -> Result<Self> {
        Self::initialize_with_clock(settings_path, status, SystemClock, handle)
    }
}

impl<M: MachineStatus + 'static, C: Clock + 'static> Service<M, C> {
    /// Load settings and statistics, then start flushing
    pub fn initialize_with_clock(
        settings_path: impl Into<PathBuf>,
        status: M,
        clock: C,
        handle: &Handle,
    ) -> Result<Self> {
        let settings = LoadedSettings::load(settings_path);
        settings.settings.ensure_storage_location();

        let store = FileStore::new(&settings.settings.storage_location);
        let tracker = Arc::new(Tracker::open(store, status, clock)?);
        let driver = FlushDriver::spawn(
            handle,
            tracker.clone(),
            settings.settings.flush_interval(),
            "machine-time",
        );
        Ok(Self {
            tracker,
            settings,
            driver,
        })
    }

    pub fn tracker(&self) -> &Tracker<FileStore, M, C> {
        &self.tracker
    }

    pub fn settings(&self) -> &LoadedSettings {
        &self.settings
    }

    /// Stop flushing, write the settings file on a first run, and save one last time
    ///
    /// The final save’s error is returned; a failure to write the settings is only logged.
    pub async fn uninitialize(self) -> Result<()> {
        let stats = self.driver.stop().await?;
        debug!(?stats, "flush driver stopped");

        if let Err(e) = self.settings.persist_if_first_run() {
            warn!("cannot write settings: {:#}", e);
        }

        let tracker = self.tracker;
        tokio::task::spawn_blocking(move || tracker.save())
            .await
            .map_err(|e| anyhow!("final save did not complete: {}", e))??;
        info!("uninitialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        machine::MachineState,
        production::PartRecord,
        snapshot::{snap, LiveCounters},
        status::SharedCounters,
    };
    use std::{
        fs,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    #[derive(Default)]
    struct SlowTarget {
        running: AtomicBool,
        overlapped: AtomicBool,
        calls: AtomicUsize,
        fail: bool,
    }

    impl Flush for SlowTarget {
        fn flush(&self) -> Result<()> {
            if self.running.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(15));
            self.running.store(false, Ordering::SeqCst);
            if self.fail {
                Err(anyhow!("disk full"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn saves_never_overlap() {
        let target = Arc::new(SlowTarget::default());
        let driver = FlushDriver::spawn(
            &Handle::current(),
            target.clone(),
            Duration::from_millis(2),
            "test",
        );
        sleep(Duration::from_millis(150)).await;
        let stats = driver.stop().await.unwrap();

        assert!(stats.saved >= 2, "{:?}", stats);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.saved, target.calls.load(Ordering::SeqCst));
        assert!(!target.overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_saves_do_not_stop_the_driver() {
        let target = Arc::new(SlowTarget {
            fail: true,
            ..SlowTarget::default()
        });
        let driver = FlushDriver::spawn(
            &Handle::current(),
            target.clone(),
            Duration::from_millis(2),
            "test",
        );
        sleep(Duration::from_millis(150)).await;
        let stats = driver.stop().await.unwrap();

        assert_eq!(stats.saved, 0);
        assert!(stats.failed >= 2, "{:?}", stats);
    }

    #[tokio::test]
    async fn stopped_driver_stays_stopped() {
        let target = Arc::new(SlowTarget::default());
        let driver = FlushDriver::spawn(
            &Handle::current(),
            target.clone(),
            Duration::from_millis(2),
            "test",
        );
        let stats = driver.stop().await.unwrap();
        let calls = target.calls.load(Ordering::SeqCst);
        assert_eq!(stats.saved, calls);

        sleep(Duration::from_millis(30)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), calls);
    }

    fn read<T: serde::de::DeserializeOwned>(path: PathBuf) -> T {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn first_run_writes_settings_and_documents() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");
        let counters = Arc::new(SharedCounters::new(LiveCounters::from(&snap(5, 2, 100, 0))));

        let service =
            Service::initialize(&settings_path, counters.clone(), &Handle::current()).unwrap();
        assert!(service.settings().first_run);
        service.tracker().program_started("P1").unwrap();
        service.tracker().program_completed("P1").unwrap();
        counters.update(|c| c.stroke += 7);
        service.uninitialize().await.unwrap();

        assert!(settings_path.exists());
        let data = dir.path().join("machine-time");
        let production: Vec<PartRecord> = read(data.join("production.json"));
        assert_eq!(production.len(), 1);
        assert_eq!(production[0].part_name, "P1");
        assert_eq!(production[0].parts_done, 1);

        let machine: MachineState = read(data.join("machine_time.json"));
        assert_eq!(machine.total.stroke, 107);
        assert_eq!(machine.total.parts_done, 1);
        assert_eq!(machine.daily_logs.len(), 1);
        assert_eq!(machine.daily_logs[0].data.stroke, 7);
    }

    #[tokio::test]
    async fn configured_service_flushes_and_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");
        let data = dir.path().join("elsewhere");
        let custom = serde_json::json!({
            "storageLocation": data,
            "timeInterval": 5,
        })
        .to_string();
        fs::write(&settings_path, &custom).unwrap();

        let counters = Arc::new(SharedCounters::new(LiveCounters::from(&snap(1, 1, 1, 0))));
        let service =
            Service::initialize(&settings_path, counters.clone(), &Handle::current()).unwrap();
        assert!(!service.settings().first_run);
        service.tracker().program_completed("P9").unwrap();
        sleep(Duration::from_millis(100)).await;

        // the periodic flush has written the documents before shutdown
        let production: Vec<PartRecord> = read(data.join("production.json"));
        assert_eq!(production[0].part_name, "P9");

        service.uninitialize().await.unwrap();
        assert_eq!(fs::read_to_string(&settings_path).unwrap(), custom);
    }

    #[tokio::test]
    async fn restart_restores_counters() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");

        let counters = Arc::new(SharedCounters::new(LiveCounters::from(&snap(5, 2, 100, 0))));
        let service =
            Service::initialize(&settings_path, counters.clone(), &Handle::current()).unwrap();
        counters.update(|c| c.power_on_time = c.power_on_time + chrono::Duration::hours(1));
        service.uninitialize().await.unwrap();

        let rebooted = Arc::new(SharedCounters::new(LiveCounters::from(&snap(0, 0, 0, 0))));
        let service =
            Service::initialize(&settings_path, rebooted.clone(), &Handle::current()).unwrap();
        assert_eq!(rebooted.counters().with_parts(0), snap(6, 2, 100, 0));
        service.uninitialize().await.unwrap();
    }
}
