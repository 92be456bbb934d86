// tests/common/mod.rs
//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam::channel::Receiver;

use gsr_core::calibration::GsrRange;
use gsr_core::cluster::{CalibratedValue, Channel, SampleCluster};
use gsr_core::config::{DeviceConfiguration, DeviceKind, SimulatorSettings, SystemConfig};
use gsr_core::error::GsrResult;
use gsr_core::hal::{DeviceEvent, DeviceInfo, DeviceLink, DeviceState, LinkCore};
use gsr_core::session::SessionEvent;
use gsr_core::utils::time::{SystemTimeProvider, TimeProvider};

pub const ADDRESS: &str = "00:06:66:12:34:56";
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Config with a fast, timer-less simulator
pub fn quiet_config() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.simulator = SimulatorSettings {
        connect_delay_ms: 1,
        timer_enabled: false,
        seed: Some(11),
        ..Default::default()
    };
    config
}

/// Device that delivers whatever clusters the test hands it
pub struct ScriptedDevice {
    core: LinkCore,
    hang_on_connect: bool,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemTimeProvider))
    }

    pub fn with_clock(clock: Arc<dyn TimeProvider>) -> Self {
        let info = DeviceInfo {
            address: String::new(),
            name: String::new(),
            kind: DeviceKind::Shimmer3,
            simulated: false,
        };
        Self {
            core: LinkCore::new("scripted_device", info, DeviceConfiguration::default(), clock),
            hang_on_connect: false,
        }
    }

    /// Connect never completes
    pub fn hanging() -> Self {
        Self {
            hang_on_connect: true,
            ..Self::new()
        }
    }

    /// Returns false when not streaming
    pub fn deliver(&self, cluster: SampleCluster) -> bool {
        if self.core.state() != DeviceState::Streaming {
            return false;
        }
        self.core.emit(DeviceEvent::Sample(cluster));
        true
    }

    pub fn deliver_resistance(&self, resistance_kohm: f64, range: GsrRange) -> bool {
        self.deliver(resistance_cluster(resistance_kohm, range))
    }
}

pub fn resistance_cluster(resistance_kohm: f64, range: GsrRange) -> SampleCluster {
    SampleCluster::new(0)
        .with(
            Channel::GsrResistance,
            CalibratedValue::calibrated(Channel::GsrResistance, resistance_kohm),
        )
        .with_range(range)
}

#[async_trait]
impl DeviceLink for ScriptedDevice {
    async fn connect(&self, address: &str, name: &str) -> GsrResult<()> {
        if !self.core.begin_connect(address, name)? {
            return Ok(());
        }
        if self.hang_on_connect {
            std::future::pending::<()>().await;
        }
        self.core.finish_connect();
        Ok(())
    }

    fn start_streaming(&self) -> GsrResult<()> {
        self.core.start_streaming()
    }

    fn stop_streaming(&self) -> GsrResult<()> {
        self.core.stop_streaming()
    }

    fn disconnect(&self) -> GsrResult<()> {
        self.core.disconnect();
        Ok(())
    }

    fn write_configuration_bytes(&self, bytes: &[u8]) {
        self.core.apply_configuration_bytes(bytes);
    }

    fn inquiry(&self) {
        self.core.emit(DeviceEvent::Inquiry(self.core.identity()));
    }

    fn state(&self) -> DeviceState {
        self.core.state()
    }

    fn configuration(&self) -> DeviceConfiguration {
        self.core.configuration()
    }

    fn info(&self) -> DeviceInfo {
        self.core.info()
    }

    fn take_events(&self) -> Option<Receiver<DeviceEvent>> {
        self.core.take_events()
    }
}

/// Next event matching `pred`, skipping the rest
pub fn wait_for<F>(rx: &Receiver<SessionEvent>, mut pred: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = rx.recv_timeout(remaining).expect("Timed out waiting for session event");
        if pred(&event) {
            return event;
        }
    }
}

/// Every event up to and including the first one matching `pred`
pub fn collect_until<F>(rx: &Receiver<SessionEvent>, mut pred: F) -> Vec<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = Instant::now() + EVENT_TIMEOUT;
    let mut events = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = rx.recv_timeout(remaining).expect("Timed out collecting session events");
        let done = pred(&event);
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Poll until `cond` holds or fail after the event timeout
pub fn eventually<F: FnMut() -> bool>(mut cond: F, what: &str) {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}
