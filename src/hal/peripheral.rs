// src/hal/peripheral.rs
//! Transport-backed GSR peripheral
//!
//! Identification queries run the transport's blocking `identify` on the
//! tokio blocking pool under [`tokio::time::timeout`]. The runtime seen at
//! `connect` is remembered, so `inquiry` also works when called from a
//! listener or another non-runtime thread.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::config::constants::hal::{DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_INQUIRY_TIMEOUT_MS};
use crate::config::{DeviceConfiguration, SystemConfig};
use crate::error::{GsrErrorBuilder, GsrResult};
use crate::hal::link::LinkCore;
use crate::hal::traits::DeviceLink;
use crate::hal::transport::{GsrTransport, RawSampleSink};
use crate::hal::types::{DeviceEvent, DeviceInfo, DeviceKind, DeviceState};
use crate::utils::time::{SystemTimeProvider, TimeProvider};

const COMPONENT: &str = "peripheral_device";

/// A real peripheral reached through a [`GsrTransport`]
pub struct PeripheralDevice {
    core: Arc<LinkCore>,
    transport: Arc<dyn GsrTransport>,
    inquiry_timeout: Duration,
    runtime: Mutex<Option<Handle>>,
}

impl PeripheralDevice {
    pub fn new(transport: Arc<dyn GsrTransport>, configuration: DeviceConfiguration) -> Self {
        Self::with_clock(transport, configuration, Arc::new(SystemTimeProvider))
    }

    pub fn with_clock(
        transport: Arc<dyn GsrTransport>,
        configuration: DeviceConfiguration,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self::build(transport, configuration, clock, DEFAULT_EVENT_QUEUE_CAPACITY)
    }

    /// Peripheral using the sensor setup, inquiry timeout and queue
    /// capacity of the `device` config section
    pub fn from_config(transport: Arc<dyn GsrTransport>, config: &SystemConfig) -> Self {
        Self::from_config_with_clock(transport, config, Arc::new(SystemTimeProvider))
    }

    pub fn from_config_with_clock(
        transport: Arc<dyn GsrTransport>,
        config: &SystemConfig,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self::build(
            transport,
            config.device_configuration(),
            clock,
            config.device.event_queue_capacity,
        )
        .with_inquiry_timeout(Duration::from_millis(config.device.inquiry_timeout_ms))
    }

    fn build(
        transport: Arc<dyn GsrTransport>,
        configuration: DeviceConfiguration,
        clock: Arc<dyn TimeProvider>,
        queue_capacity: usize,
    ) -> Self {
        let info = DeviceInfo {
            address: String::new(),
            name: String::new(),
            kind: configuration.device_kind,
            simulated: false,
        };
        Self {
            core: Arc::new(LinkCore::with_capacity(
                COMPONENT,
                info,
                configuration,
                clock,
                queue_capacity,
            )),
            transport,
            inquiry_timeout: Duration::from_millis(DEFAULT_INQUIRY_TIMEOUT_MS),
            runtime: Mutex::new(None),
        }
    }

    pub fn with_inquiry_timeout(mut self, timeout: Duration) -> Self {
        self.inquiry_timeout = timeout;
        self
    }

    pub fn kind(&self) -> DeviceKind {
        self.core.configuration().device_kind
    }

    pub fn inquiry_timeout(&self) -> Duration {
        self.inquiry_timeout
    }

    pub fn samples_dispatched(&self) -> u64 {
        self.core.samples_dispatched()
    }

    pub fn dropped_samples(&self) -> u64 {
        self.core.dropped_samples()
    }

    fn runtime(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.runtime.lock().clone())
    }
}

#[async_trait]
impl DeviceLink for PeripheralDevice {
    async fn connect(&self, address: &str, name: &str) -> GsrResult<()> {
        if !self.core.begin_connect(address, name)? {
            return Ok(());
        }
        if let Ok(handle) = Handle::try_current() {
            *self.runtime.lock() = Some(handle);
        }

        if let Err(e) = self.transport.open(address).await {
            self.core.abort_connect();
            return Err(self.core.report(e));
        }

        if !self.core.finish_connect() {
            let _ = self.transport.close();
            return Err(self.core.report(
                GsrErrorBuilder::new(COMPONENT, "connect").transport("connection attempt cancelled"),
            ));
        }

        // Push the current configuration so device and host agree
        let bytes = self.core.configuration().to_bytes();
        if let Err(e) = self.transport.write(&bytes) {
            self.core.report(e);
        }
        Ok(())
    }

    fn start_streaming(&self) -> GsrResult<()> {
        self.core.start_streaming()?;
        if let Err(e) = self.transport.start(RawSampleSink::new(Arc::clone(&self.core))) {
            let _ = self.core.stop_streaming();
            return Err(self.core.report(e));
        }
        Ok(())
    }

    fn stop_streaming(&self) -> GsrResult<()> {
        self.core.stop_streaming()?;
        self.transport.stop().map_err(|e| self.core.report(e))
    }

    fn disconnect(&self) -> GsrResult<()> {
        let previous = self.core.disconnect();
        if previous == DeviceState::Disconnected {
            return Ok(());
        }
        let stopped = self.transport.stop();
        let closed = self.transport.close();
        stopped.and(closed).map_err(|e| self.core.report(e))
    }

    fn write_configuration_bytes(&self, bytes: &[u8]) {
        if self.core.apply_configuration_bytes(bytes).is_some() {
            if let Err(e) = self.transport.write(bytes) {
                self.core.report(e);
            }
        }
    }

    fn inquiry(&self) {
        let state = self.core.state();
        if !state.is_connected() {
            self.core
                .report(GsrErrorBuilder::new(COMPONENT, "inquiry").not_connected(state));
            return;
        }

        let Some(runtime) = self.runtime() else {
            self.core.report(
                GsrErrorBuilder::new(COMPONENT, "inquiry").transport("no async runtime available"),
            );
            return;
        };

        let core = Arc::clone(&self.core);
        let transport = Arc::clone(&self.transport);
        let timeout = self.inquiry_timeout;

        runtime.spawn(async move {
            // A stalled identify holds its blocking-pool thread until the
            // transport returns; the reply is discarded after the timeout.
            let identify = tokio::task::spawn_blocking(move || transport.identify());
            match tokio::time::timeout(timeout, identify).await {
                Ok(Ok(Ok(identity))) => {
                    core.set_identity(identity.clone());
                    core.emit(DeviceEvent::Inquiry(identity));
                }
                Ok(Ok(Err(e))) => {
                    core.report(e);
                }
                Ok(Err(join_error)) => {
                    core.report(
                        GsrErrorBuilder::new(COMPONENT, "inquiry")
                            .transport(format!("identify task failed: {}", join_error)),
                    );
                }
                Err(_) => {
                    core.report(
                        GsrErrorBuilder::new(COMPONENT, "inquiry")
                            .timeout(timeout.as_millis() as u64),
                    );
                }
            }
        });
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

impl Drop for PeripheralDevice {
    fn drop(&mut self) {
        if self.core.state() != DeviceState::Disconnected {
            let _ = self.transport.stop();
            let _ = self.transport.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::GsrRange;
    use crate::error::{ErrorKind, GsrError};
    use crate::hal::transport::LoopbackTransport;
    use crate::hal::types::{DeviceIdentity, RawSample};
    use crossbeam::channel::{bounded, Sender};
    use std::time::Instant;

    /// Transport whose `identify` blocks until released or two seconds pass
    struct StalledTransport {
        release: Receiver<()>,
    }

    impl StalledTransport {
        fn new() -> (Self, Sender<()>) {
            let (tx, rx) = bounded(1);
            (Self { release: rx }, tx)
        }
    }

    #[async_trait]
    impl GsrTransport for StalledTransport {
        async fn open(&self, _address: &str) -> GsrResult<()> {
            Ok(())
        }

        fn close(&self) -> GsrResult<()> {
            Ok(())
        }

        fn write(&self, _bytes: &[u8]) -> GsrResult<()> {
            Ok(())
        }

        fn identify(&self) -> GsrResult<DeviceIdentity> {
            let _ = self.release.recv_timeout(Duration::from_secs(2));
            Ok(DeviceIdentity::default())
        }

        fn start(&self, _sink: RawSampleSink) -> GsrResult<()> {
            Ok(())
        }

        fn stop(&self) -> GsrResult<()> {
            Ok(())
        }
    }

    /// Await the first event matching `pred` without blocking the runtime
    async fn next_event<F>(rx: &Receiver<DeviceEvent>, within: Duration, mut pred: F) -> Option<DeviceEvent>
    where
        F: FnMut(&DeviceEvent) -> bool,
    {
        let deadline = Instant::now() + within;
        loop {
            if let Some(event) = rx.try_iter().find(|e| pred(e)) {
                return Some(event);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn device() -> (PeripheralDevice, Arc<LoopbackTransport>, Receiver<DeviceEvent>) {
        let transport = Arc::new(LoopbackTransport::new(DeviceIdentity {
            firmware_version: "0.16.0".to_string(),
            hardware_version: "3.0".to_string(),
            battery_level: 64,
        }));
        let device = PeripheralDevice::new(transport.clone(), DeviceConfiguration::default());
        let rx = device.take_events().unwrap();
        (device, transport, rx)
    }

    #[tokio::test]
    async fn test_connect_pushes_configuration() {
        let (device, transport, _rx) = device();
        device.connect("00:06:66:11:22:33", "shimmer").await.unwrap();

        assert!(transport.is_open());
        assert_eq!(transport.address().as_deref(), Some("00:06:66:11:22:33"));
        assert_eq!(transport.written(), vec![DeviceConfiguration::default().to_bytes().to_vec()]);
    }

    #[tokio::test]
    async fn test_failed_open_returns_to_disconnected() {
        let device = PeripheralDevice::new(
            Arc::new(LoopbackTransport::unreachable()),
            DeviceConfiguration::default(),
        );
        let rx = device.take_events().unwrap();

        let err = device.connect("00:06:66:11:22:33", "shimmer").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(device.state(), DeviceState::Disconnected);
        assert!(rx.try_iter().any(|e| matches!(e, DeviceEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_fed_samples_arrive_in_order() {
        let (device, transport, rx) = device();
        device.connect("00:06:66:11:22:33", "shimmer").await.unwrap();

        // not streaming yet
        let sample = |adc| RawSample {
            adc_count: adc,
            range: GsrRange::Range10kTo56k,
            device_timestamp: 0,
        };
        assert!(!transport.feed(sample(2400)));

        device.start_streaming().unwrap();
        for adc in [2400, 2410, 2420] {
            assert!(transport.feed(sample(adc)));
        }
        device.stop_streaming().unwrap();
        assert!(!transport.feed(sample(2430)));

        let raws: Vec<f64> = rx
            .try_iter()
            .filter_map(|e| match e {
                DeviceEvent::Sample(c) => c
                    .get(crate::cluster::Channel::GsrRaw, crate::cluster::Representation::Raw)
                    .map(|v| v.value),
                _ => None,
            })
            .collect();
        assert_eq!(raws, vec![2400.0, 2410.0, 2420.0]);
        assert_eq!(device.samples_dispatched(), 3);
    }

    #[tokio::test]
    async fn test_configuration_forwarded_only_when_applied() {
        let (device, transport, _rx) = device();
        device.connect("00:06:66:11:22:33", "shimmer").await.unwrap();

        device.write_configuration_bytes(&[1, 2, 3]);
        assert_eq!(transport.written().len(), 1);

        let mut config = DeviceConfiguration::default();
        config.sampling_rate_hz = 256.0;
        device.write_configuration_bytes(&config.to_bytes());
        assert_eq!(transport.written().len(), 2);
        assert_eq!(device.configuration().sampling_rate_hz, 256.0);
    }

    #[tokio::test]
    async fn test_inquiry_replies_asynchronously() {
        let (device, _transport, rx) = device();
        device.connect("00:06:66:11:22:33", "shimmer").await.unwrap();
        device.inquiry();

        let reply = next_event(&rx, Duration::from_secs(2), |e| matches!(e, DeviceEvent::Inquiry(_))).await;
        let Some(DeviceEvent::Inquiry(identity)) = reply else {
            panic!("no inquiry reply");
        };
        assert_eq!(identity.battery_level, 64);
        assert_eq!(device.core.identity(), identity);
    }

    #[tokio::test]
    async fn test_stalled_inquiry_times_out() {
        let (transport, release) = StalledTransport::new();
        let device = PeripheralDevice::new(Arc::new(transport), DeviceConfiguration::default())
            .with_inquiry_timeout(Duration::from_millis(50));
        let rx = device.take_events().unwrap();
        device.connect("00:06:66:11:22:33", "shimmer").await.unwrap();

        let started = Instant::now();
        device.inquiry();
        assert!(started.elapsed() < Duration::from_millis(25));

        let event = next_event(&rx, Duration::from_secs(1), |e| matches!(e, DeviceEvent::Error(_))).await;
        let Some(DeviceEvent::Error(err)) = event else {
            panic!("inquiry never failed");
        };
        assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(!rx.try_iter().any(|e| matches!(e, DeviceEvent::Inquiry(_))));
        assert_eq!(device.state(), DeviceState::Connected);

        drop(release);
    }

    #[tokio::test]
    async fn test_from_config_applies_device_section() {
        let mut config = SystemConfig::default();
        config.device.inquiry_timeout_ms = 40;
        config.device.event_queue_capacity = 1;
        config.device.sampling_rate_hz = 512.0;

        let (transport, release) = StalledTransport::new();
        let device = PeripheralDevice::from_config(Arc::new(transport), &config);
        assert_eq!(device.inquiry_timeout(), Duration::from_millis(40));
        assert_eq!(device.configuration().sampling_rate_hz, 512.0);

        let rx = device.take_events().unwrap();
        device.connect("00:06:66:11:22:33", "shimmer").await.unwrap();
        device.inquiry();

        let event = next_event(&rx, Duration::from_secs(1), |e| matches!(e, DeviceEvent::Error(_))).await;
        assert!(matches!(
            event,
            Some(DeviceEvent::Error(GsrError::ConnectionTimeout { timeout_ms: 40, .. }))
        ));

        // one undelivered sample fills the queue
        device.start_streaming().unwrap();
        let _ = rx.try_iter().count();
        let sink = RawSampleSink::new(Arc::clone(&device.core));
        let raw = RawSample {
            adc_count: 3162,
            range: GsrRange::Range56kTo220k,
            device_timestamp: 0,
        };
        assert!(sink.push(raw));
        assert!(!sink.push(raw));
        assert_eq!(device.dropped_samples(), 1);

        drop(release);
    }

    #[test]
    fn test_inquiry_without_runtime_is_reported() {
        let (device, _transport, rx) = device();
        device.core.begin_connect("00:06:66:11:22:33", "shimmer").unwrap();
        device.core.finish_connect();
        let _ = rx.try_iter().count();

        device.inquiry();
        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(&events[..], [DeviceEvent::Error(e)] if e.kind() == ErrorKind::Transport));
    }

    #[tokio::test]
    async fn test_disconnect_closes_transport() {
        let (device, transport, _rx) = device();
        device.connect("00:06:66:11:22:33", "shimmer").await.unwrap();
        device.start_streaming().unwrap();
        device.disconnect().unwrap();

        assert!(!transport.is_open());
        assert_eq!(device.state(), DeviceState::Disconnected);
    }
}
