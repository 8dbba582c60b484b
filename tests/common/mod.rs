//! Shared fixtures for the integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use strata::adapters::database::Backends;
use strata::adapters::memory::{MemorySource, MemoryStateStorage, MemoryWarehouse};
use strata::config::{parse_config, StrataConfig};
use strata::core::Engine;
use strata::domain::{EntityId, RawRecord};
use tokio::sync::watch;

/// Config over placeholder URLs with `export` as the `[export]` body
/// and `extra` appended verbatim
///
/// One-day windows, no inter-window delay and no cooldown unless `export`
/// sets them.
pub fn config(export: &str, extra: &str) -> StrataConfig {
    let mut export_body = String::from(export);
    for (key, value) in [
        ("chunk_days", "1"),
        ("inter_window_delay_ms", "0"),
        ("cooldown_seconds", "0"),
    ] {
        if !export.contains(key) {
            export_body.push_str(&format!("\n{key} = {value}"));
        }
    }

    let toml = format!(
        r#"
[source]
connection_string = "postgresql://recorder@localhost/homeassistant"
page_size = 100

[warehouse]
connection_string = "postgresql://strata@localhost/analytics"

[export]
{export_body}

[logging]
local_enabled = false

{extra}
"#
    );
    parse_config(&toml).expect("test config must parse")
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
}

pub fn hour(h: i64) -> DateTime<Utc> {
    t0() + Duration::hours(h)
}

/// One power reading per minute starting at `base`
pub fn minute_records(base: DateTime<Utc>, minutes: std::ops::Range<i64>) -> Vec<RawRecord> {
    minutes
        .map(|m| {
            RawRecord::new(
                EntityId::new("sensor.office_power").unwrap(),
                format!("{}", 100 + m % 50),
                base + Duration::minutes(m),
            )
        })
        .collect()
}

/// One temperature and one switch record per hour starting at `base`
pub fn hourly_records(base: DateTime<Utc>, hours: std::ops::Range<i64>) -> Vec<RawRecord> {
    hours
        .flat_map(|h| {
            let ts = base + Duration::hours(h);
            [
                RawRecord::new(
                    EntityId::new("sensor.living_room_temperature").unwrap(),
                    format!("{:.1}", 19.0 + (h % 5) as f64 * 0.5),
                    ts,
                ),
                RawRecord::new(
                    EntityId::new("switch.kitchen_kettle").unwrap(),
                    if h % 2 == 0 { "on" } else { "off" },
                    ts,
                ),
            ]
        })
        .collect()
}

/// An engine over in-memory backends that tests can poke at
pub struct Harness {
    pub engine: Arc<Engine>,
    pub source: Arc<MemorySource>,
    pub warehouse: Arc<MemoryWarehouse>,
    pub state: Arc<MemoryStateStorage>,
    pub shutdown: watch::Sender<bool>,
}

impl Harness {
    pub fn new(config: &StrataConfig, source: MemorySource) -> Self {
        Self::with_backends(
            config,
            Arc::new(source),
            Arc::new(MemoryWarehouse::new()),
            Arc::new(MemoryStateStorage::default()),
        )
    }

    /// Same backends, fresh engine and shutdown channel, like a process restart
    pub fn restart(&self, config: &StrataConfig) -> Self {
        Self::with_backends(
            config,
            self.source.clone(),
            self.warehouse.clone(),
            self.state.clone(),
        )
    }

    fn with_backends(
        config: &StrataConfig,
        source: Arc<MemorySource>,
        warehouse: Arc<MemoryWarehouse>,
        state: Arc<MemoryStateStorage>,
    ) -> Self {
        let backends = Backends {
            source: source.clone(),
            warehouse: warehouse.clone(),
            state: state.clone(),
        };
        let (shutdown, shutdown_rx) = watch::channel(false);
        let engine = Engine::new(backends, config, shutdown_rx).expect("engine must build");
        Self {
            engine: Arc::new(engine),
            source,
            warehouse,
            state,
            shutdown,
        }
    }
}
