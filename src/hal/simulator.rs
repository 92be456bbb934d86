//! Simulated GSR peripheral
//!
//! Produces raw ADC ticks from a slowly drifting skin-resistance model and
//! pushes them through the same calibration path as real hardware. With
//! the timer disabled, ticks only arrive through [`SimulatedDevice::inject`]
//! or [`SimulatedDevice::generate_tick`], which keeps tests deterministic.
//!
//! The ±5% ADC jitter of [`generate_simulated_adc`](crate::calibration::generate_simulated_adc)
//! applies to the whole count, range offset included. Near the offset that
//! is far wider than the signal: with the default skin model roughly half
//! of the ticks calibrate to zero and are rejected by the session, and most
//! of the rest come out at a few kΩ and are flagged. The simulator exercises
//! the acquisition and session plumbing; its values are not a physiological
//! signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::calibration::{generate_simulated_adc_with, select_optimal_range};
use crate::config::constants::device::DEFAULT_SAMPLING_RATE_HZ;
use crate::config::constants::hal::DEFAULT_EVENT_QUEUE_CAPACITY;
use crate::config::{DeviceConfiguration, GsrRangeSetting, SimulatorSettings, SystemConfig};
use crate::error::{GsrErrorBuilder, GsrResult};
use crate::hal::link::LinkCore;
use crate::hal::traits::DeviceLink;
use crate::hal::types::{DeviceEvent, DeviceIdentity, DeviceInfo, DeviceState, RawSample};
use crate::utils::time::{SystemTimeProvider, TimeProvider};

const COMPONENT: &str = "simulated_device";

/// Timer period for `rate_hz`. Non-finite or non-positive rates fall back
/// to the default rate.
fn tick_period(rate_hz: f64) -> Duration {
    let rate = if rate_hz.is_finite() && rate_hz > 0.0 {
        rate_hz
    } else {
        DEFAULT_SAMPLING_RATE_HZ
    };
    Duration::from_secs_f64(1.0 / rate)
}

struct SimulatorInner {
    core: LinkCore,
    settings: SimulatorSettings,
    rng: Mutex<StdRng>,
    stream_started: AtomicU64,
    running: AtomicBool,
}

impl SimulatorInner {
    fn target_resistance(&self, elapsed_ms: u64) -> f64 {
        let s = &self.settings;
        let drift = (elapsed_ms as f64 / s.drift_period_ms).cos() * s.drift_amplitude_kohm;
        let noise = self.rng.lock().gen::<f64>() * s.random_variation_kohm;
        s.baseline_resistance_kohm + drift + noise
    }

    fn tick(&self) -> bool {
        let now = self.core.now_millis();
        let elapsed = now.saturating_sub(self.stream_started.load(Ordering::Relaxed));
        let target = self.target_resistance(elapsed);

        let range = match self.core.configuration().gsr_range {
            GsrRangeSetting::Fixed(range) => range,
            GsrRangeSetting::Auto => select_optimal_range(target),
        };
        let adc_count = generate_simulated_adc_with(target, range, &mut *self.rng.lock());

        self.core.acquire(
            RawSample {
                adc_count,
                range,
                device_timestamp: elapsed,
            },
            None,
        )
    }
}

/// Simulated GSR peripheral
pub struct SimulatedDevice {
    inner: Arc<SimulatorInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedDevice {
    pub fn new(
        settings: SimulatorSettings,
        configuration: DeviceConfiguration,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self::with_queue_capacity(settings, configuration, clock, DEFAULT_EVENT_QUEUE_CAPACITY)
    }

    /// Like [`new`](Self::new) with an explicit sample queue capacity
    pub fn with_queue_capacity(
        settings: SimulatorSettings,
        configuration: DeviceConfiguration,
        clock: Arc<dyn TimeProvider>,
        queue_capacity: usize,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let info = DeviceInfo {
            address: String::new(),
            name: String::new(),
            kind: configuration.device_kind,
            simulated: true,
        };

        Self {
            inner: Arc::new(SimulatorInner {
                core: LinkCore::with_capacity(COMPONENT, info, configuration, clock, queue_capacity),
                settings,
                rng: Mutex::new(rng),
                stream_started: AtomicU64::new(0),
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Simulator described by the `simulator` and `device` config sections
    pub fn from_config(config: &SystemConfig) -> Self {
        Self::from_config_with_clock(config, Arc::new(SystemTimeProvider))
    }

    pub fn from_config_with_clock(config: &SystemConfig, clock: Arc<dyn TimeProvider>) -> Self {
        Self::with_queue_capacity(
            config.simulator.clone(),
            config.device_configuration(),
            clock,
            config.device.event_queue_capacity,
        )
    }

    pub fn with_identity(self, identity: DeviceIdentity) -> Self {
        self.inner.core.set_identity(identity);
        self
    }

    /// Push one raw tick through calibration. Returns false when the device
    /// is not streaming.
    pub fn inject(&self, raw: RawSample) -> bool {
        self.inner.core.acquire(raw, None)
    }

    /// Produce one tick from the skin model
    pub fn generate_tick(&self) -> bool {
        self.inner.tick()
    }

    pub fn samples_dispatched(&self) -> u64 {
        self.inner.core.samples_dispatched()
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.inner.core.dropped_ticks()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.inner.core.dropped_samples()
    }

    fn spawn_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let rate_hz = self.inner.core.configuration().sampling_rate_hz;
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            tracing::warn!(rate_hz, fallback = DEFAULT_SAMPLING_RATE_HZ, "unusable sampling rate");
        }

        self.inner.running.store(true, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        *worker = Some(std::thread::spawn(move || {
            tracing::debug!("simulator acquisition loop started");
            while inner.running.load(Ordering::SeqCst) {
                inner.tick();
                std::thread::sleep(tick_period(inner.core.configuration().sampling_rate_hz));
            }
            tracing::debug!("simulator acquisition loop stopped");
        }));
    }

    fn stop_worker(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[async_trait]
impl DeviceLink for SimulatedDevice {
    async fn connect(&self, address: &str, name: &str) -> GsrResult<()> {
        if !self.inner.core.begin_connect(address, name)? {
            return Ok(());
        }

        tokio::time::sleep(Duration::from_millis(self.inner.settings.connect_delay_ms)).await;

        if self.inner.core.finish_connect() {
            Ok(())
        } else {
            Err(self.inner.core.report(
                GsrErrorBuilder::new(COMPONENT, "connect").transport("connection attempt cancelled"),
            ))
        }
    }

    fn start_streaming(&self) -> GsrResult<()> {
        self.inner.core.start_streaming()?;
        self.inner
            .stream_started
            .store(self.inner.core.now_millis(), Ordering::Relaxed);
        if self.inner.settings.timer_enabled {
            self.spawn_worker();
        }
        Ok(())
    }

    fn stop_streaming(&self) -> GsrResult<()> {
        self.inner.core.stop_streaming()?;
        self.stop_worker();
        Ok(())
    }

    fn disconnect(&self) -> GsrResult<()> {
        self.stop_worker();
        self.inner.core.disconnect();
        Ok(())
    }

    fn write_configuration_bytes(&self, bytes: &[u8]) {
        self.inner.core.apply_configuration_bytes(bytes);
    }

    fn inquiry(&self) {
        let core = &self.inner.core;
        let state = core.state();
        if state.is_connected() {
            core.emit(DeviceEvent::Inquiry(core.identity()));
        } else {
            core.report(GsrErrorBuilder::new(COMPONENT, "inquiry").not_connected(state));
        }
    }

    fn state(&self) -> DeviceState {
        self.inner.core.state()
    }

    fn configuration(&self) -> DeviceConfiguration {
        self.inner.core.configuration()
    }

    fn info(&self) -> DeviceInfo {
        self.inner.core.info()
    }

    fn take_events(&self) -> Option<Receiver<DeviceEvent>> {
        self.inner.core.take_events()
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::GsrRange;
    use crate::error::ErrorKind;
    use crate::utils::time::MockTimeProvider;

    fn manual_device() -> SimulatedDevice {
        let settings = SimulatorSettings {
            connect_delay_ms: 1,
            timer_enabled: false,
            seed: Some(42),
            ..Default::default()
        };
        SimulatedDevice::new(
            settings,
            DeviceConfiguration::default(),
            Arc::new(MockTimeProvider::new(0)),
        )
    }

    #[tokio::test]
    async fn test_connection_state_management() {
        let device = manual_device();
        assert_eq!(device.state(), DeviceState::Disconnected);

        device.connect("00:06:66:00:00:01", "sim").await.unwrap();
        assert_eq!(device.state(), DeviceState::Connected);
        assert_eq!(device.info().name, "sim");

        device.start_streaming().unwrap();
        assert_eq!(device.state(), DeviceState::Streaming);

        device.stop_streaming().unwrap();
        assert_eq!(device.state(), DeviceState::Connected);

        device.disconnect().unwrap();
        assert_eq!(device.state(), DeviceState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let device = manual_device();
        let rx = device.take_events().unwrap();

        device.connect("00:06:66:00:00:01", "sim").await.unwrap();
        device.connect("00:06:66:00:00:01", "sim").await.unwrap();

        let statuses = rx
            .try_iter()
            .filter(|e| matches!(e, DeviceEvent::ConnectionStatus(_)))
            .count();
        assert_eq!(statuses, 1);
    }

    #[test]
    fn test_error_states() {
        let device = manual_device();
        let rx = device.take_events().unwrap();

        let err = device.start_streaming().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(device.state(), DeviceState::Disconnected);

        device.inquiry();
        device.write_configuration_bytes(&[]);
        assert_eq!(device.state(), DeviceState::Disconnected);
        assert_eq!(device.configuration(), DeviceConfiguration::default());

        let kinds: Vec<ErrorKind> = rx
            .try_iter()
            .filter_map(|e| match e {
                DeviceEvent::Error(err) => Some(err.kind()),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![ErrorKind::NotConnected, ErrorKind::NotConnected, ErrorKind::InvalidConfiguration]
        );
    }

    #[tokio::test]
    async fn test_inquiry_reports_identity() {
        let identity = DeviceIdentity {
            firmware_version: "0.16.0".to_string(),
            hardware_version: "3.1".to_string(),
            battery_level: 87,
        };
        let device = manual_device().with_identity(identity.clone());
        let rx = device.take_events().unwrap();

        device.connect("00:06:66:00:00:01", "sim").await.unwrap();
        device.inquiry();

        let reply = rx.try_iter().find_map(|e| match e {
            DeviceEvent::Inquiry(id) => Some(id),
            _ => None,
        });
        assert_eq!(reply, Some(identity));
    }

    #[tokio::test]
    async fn test_generated_ticks_follow_auto_range() {
        let device = manual_device();
        let rx = device.take_events().unwrap();
        device.connect("00:06:66:00:00:01", "sim").await.unwrap();
        device.start_streaming().unwrap();

        for _ in 0..10 {
            assert!(device.generate_tick());
        }

        let clusters: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                DeviceEvent::Sample(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(clusters.len(), 10);
        // mock clock never advances, so the model sits at baseline + drift peak
        assert!(clusters
            .iter()
            .all(|c| c.range() == Some(GsrRange::Range56kTo220k)));
        assert_eq!(device.samples_dispatched(), 10);
    }

    #[tokio::test]
    async fn test_timer_driven_streaming() {
        let settings = SimulatorSettings {
            connect_delay_ms: 1,
            seed: Some(1),
            ..Default::default()
        };
        let mut config = DeviceConfiguration::default();
        config.sampling_rate_hz = 1024.0;
        let device = SimulatedDevice::new(settings, config, Arc::new(SystemTimeProvider));
        let rx = device.take_events().unwrap();

        device.connect("00:06:66:00:00:01", "sim").await.unwrap();
        device.start_streaming().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        device.stop_streaming().unwrap();

        let dispatched = device.samples_dispatched();
        assert!(dispatched > 0);

        // no ticks after stop
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(device.samples_dispatched(), dispatched);

        let samples = rx
            .try_iter()
            .filter(|e| matches!(e, DeviceEvent::Sample(_)))
            .count() as u64;
        assert_eq!(samples, dispatched);
    }

    #[test]
    fn test_tick_period_guards_rate() {
        assert_eq!(tick_period(1000.0), Duration::from_millis(1));
        let fallback = Duration::from_secs_f64(1.0 / DEFAULT_SAMPLING_RATE_HZ);
        for rate in [0.0, -32.768, f64::NAN, f64::INFINITY] {
            assert_eq!(tick_period(rate), fallback);
        }
    }

    #[tokio::test]
    async fn test_zero_rate_keeps_timer_alive() {
        let settings = SimulatorSettings {
            connect_delay_ms: 1,
            seed: Some(5),
            ..Default::default()
        };
        let mut config = DeviceConfiguration::default();
        config.sampling_rate_hz = 0.0;
        let device = SimulatedDevice::new(settings, config, Arc::new(SystemTimeProvider));

        device.connect("00:06:66:00:00:01", "sim").await.unwrap();
        device.start_streaming().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while device.samples_dispatched() < 2 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(device.samples_dispatched() >= 2);
        device.stop_streaming().unwrap();
    }

    #[tokio::test]
    async fn test_configured_queue_capacity() {
        let mut config = SystemConfig::default();
        config.device.event_queue_capacity = 3;
        config.simulator.connect_delay_ms = 1;
        config.simulator.timer_enabled = false;
        let device = SimulatedDevice::from_config_with_clock(&config, Arc::new(MockTimeProvider::new(0)));
        let rx = device.take_events().unwrap();

        device.connect("00:06:66:00:00:01", "sim").await.unwrap();
        device.start_streaming().unwrap();
        let _ = rx.try_iter().count();

        let accepted = (0..5).filter(|_| device.generate_tick()).count();
        assert_eq!(accepted, 3);
        assert_eq!(device.dropped_samples(), 2);
    }

    #[tokio::test]
    async fn test_inject_respects_state() {
        let device = manual_device();
        let tick = RawSample {
            adc_count: 3000,
            range: GsrRange::Range56kTo220k,
            device_timestamp: 0,
        };
        assert!(!device.inject(tick));
        assert_eq!(device.dropped_ticks(), 1);

        device.connect("00:06:66:00:00:01", "sim").await.unwrap();
        device.start_streaming().unwrap();
        assert!(device.inject(tick));
    }
}
