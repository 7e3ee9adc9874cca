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
use anyhow::Result;
use chrono::Duration;
use machine_time_tracker::{
    runner::Service,
    snapshot::LiveCounters,
    status::SharedCounters,
};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const PARTS: &[&str] = &["bracket-7", "hinge-12", "bracket-7", "cover-3"];

fn main() -> Result<()> {
    // settings file location, defaulting to the system temp directory
    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("machine-time-demo").join("settings.json"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(2)
        .enable_all()
        .build()?;

    // set up logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // a machine that has been running for a while already
    let counters = Arc::new(SharedCounters::new(LiveCounters {
        power_on_time: Duration::hours(120),
        pump_on_time: Duration::hours(80),
        stroke: 45_000,
    }));

    let service = Service::initialize(&settings_path, counters.clone(), runtime.handle())?;
    let storage = service.settings().settings.storage_location.clone();

    runtime.block_on(async {
        for part in PARTS {
            service.tracker().program_started(part)?;
            for _ in 0..5 {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                counters.update(|c| {
                    c.power_on_time = c.power_on_time + Duration::milliseconds(100);
                    c.pump_on_time = c.pump_on_time + Duration::milliseconds(80);
                    c.stroke += 3;
                });
            }
            service.tracker().program_completed(part)?;
        }
        service.uninitialize().await
    })?;

    for doc in &["production.json", "machine_time.json"] {
        let path = storage.join(doc);
        println!("--- {}\n{}", path.display(), std::fs::read_to_string(&path)?);
    }
    Ok(())
}
