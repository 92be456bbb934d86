// src/hal/link.rs
//! Connection state machine and sample dispatch shared by every device

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::calibration::{calibrate_to_resistance, resistance_to_conductance};
use crate::cluster::{CalibratedValue, Channel, Representation, SampleCluster, UNIT_COUNTS};
use crate::config::constants::device::{STATUS_CONNECTED, STATUS_DISCONNECTED};
use crate::config::constants::hal::DEFAULT_EVENT_QUEUE_CAPACITY;
use crate::config::DeviceConfiguration;
use crate::error::{GsrError, GsrErrorBuilder, GsrResult};
use crate::hal::types::{DeviceEvent, DeviceIdentity, DeviceInfo, DeviceState, RawSample};
use crate::utils::time::TimeProvider;

/// State, configuration and event channel of one device.
///
/// Every transition happens under the state lock, and events caused by a
/// transition are sent before the lock is released, so consumers observe
/// state changes and samples in the order they happened.
///
/// Samples are admitted only while fewer than `sample_capacity` events wait
/// in the queue; ticks beyond that are counted in
/// [`dropped_samples`](Self::dropped_samples). State, status and error
/// events are always queued, so a transition never blocks on a slow
/// consumer while the state lock is held.
pub struct LinkCore {
    component: &'static str,
    state: Mutex<DeviceState>,
    configuration: RwLock<DeviceConfiguration>,
    identity: RwLock<DeviceIdentity>,
    info: RwLock<DeviceInfo>,
    events_tx: Sender<DeviceEvent>,
    events_rx: Mutex<Option<Receiver<DeviceEvent>>>,
    clock: Arc<dyn TimeProvider>,
    sequence: AtomicU64,
    dropped_ticks: AtomicU64,
    sample_capacity: usize,
    dropped_samples: AtomicU64,
}

impl LinkCore {
    pub fn new(
        component: &'static str,
        info: DeviceInfo,
        configuration: DeviceConfiguration,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self::with_capacity(component, info, configuration, clock, DEFAULT_EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(
        component: &'static str,
        info: DeviceInfo,
        configuration: DeviceConfiguration,
        clock: Arc<dyn TimeProvider>,
        sample_capacity: usize,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            component,
            state: Mutex::new(DeviceState::Disconnected),
            configuration: RwLock::new(configuration),
            identity: RwLock::new(DeviceIdentity::default()),
            info: RwLock::new(info),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            clock,
            sequence: AtomicU64::new(0),
            dropped_ticks: AtomicU64::new(0),
            sample_capacity: sample_capacity.max(1),
            dropped_samples: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    pub fn configuration(&self) -> DeviceConfiguration {
        *self.configuration.read()
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity.read().clone()
    }

    pub fn set_identity(&self, identity: DeviceIdentity) {
        *self.identity.write() = identity;
    }

    pub fn info(&self) -> DeviceInfo {
        self.info.read().clone()
    }

    pub fn take_events(&self) -> Option<Receiver<DeviceEvent>> {
        self.events_rx.lock().take()
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Samples produced while streaming
    pub fn samples_dispatched(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Ticks that arrived while not streaming
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks.load(Ordering::Relaxed)
    }

    /// Ticks refused because the consumer fell behind
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }

    pub fn sample_capacity(&self) -> usize {
        self.sample_capacity
    }

    pub fn emit(&self, event: DeviceEvent) {
        // Consumer gone: nothing left to notify
        let _ = self.events_tx.send(event);
    }

    /// Log an error, push it to the consumer and hand it back
    pub fn report(&self, error: GsrError) -> GsrError {
        tracing::warn!(component = self.component, error = %error, "device error");
        self.emit(DeviceEvent::Error(error.clone()));
        error
    }

    fn set_state_locked(&self, state: &mut DeviceState, next: DeviceState) {
        let previous = *state;
        if previous != next {
            tracing::debug!(component = self.component, from = %previous, to = %next, "device state");
            *state = next;
            self.emit(DeviceEvent::StateChanged(next));
        }
    }

    /// Enter `Connecting`. Returns `Ok(false)` when already connected.
    pub fn begin_connect(&self, address: &str, name: &str) -> GsrResult<bool> {
        let mut state = self.state.lock();
        match *state {
            DeviceState::Connected | DeviceState::Streaming => Ok(false),
            DeviceState::Connecting => Err(self.report(
                GsrErrorBuilder::new(self.component, "connect")
                    .transport("connection attempt already in progress"),
            )),
            DeviceState::Disconnected => {
                {
                    let mut info = self.info.write();
                    info.address = address.to_string();
                    info.name = name.to_string();
                }
                self.set_state_locked(&mut state, DeviceState::Connecting);
                Ok(true)
            }
        }
    }

    /// Connecting -> Connected. Returns false if the attempt was abandoned
    /// in the meantime.
    pub fn finish_connect(&self) -> bool {
        let mut state = self.state.lock();
        if *state != DeviceState::Connecting {
            return false;
        }
        self.set_state_locked(&mut state, DeviceState::Connected);
        self.emit(DeviceEvent::ConnectionStatus(STATUS_CONNECTED.to_string()));
        tracing::info!(component = self.component, address = %self.info.read().address, "device connected");
        true
    }

    pub fn abort_connect(&self) {
        let mut state = self.state.lock();
        if *state == DeviceState::Connecting {
            self.set_state_locked(&mut state, DeviceState::Disconnected);
        }
    }

    /// Connected -> Streaming; already streaming is a no-op
    pub fn start_streaming(&self) -> GsrResult<()> {
        let mut state = self.state.lock();
        match *state {
            DeviceState::Connected => {
                self.set_state_locked(&mut state, DeviceState::Streaming);
                Ok(())
            }
            DeviceState::Streaming => Ok(()),
            other => Err(self.report(
                GsrErrorBuilder::new(self.component, "start_streaming").not_connected(other),
            )),
        }
    }

    /// Streaming -> Connected; already connected is a no-op
    pub fn stop_streaming(&self) -> GsrResult<()> {
        let mut state = self.state.lock();
        match *state {
            DeviceState::Streaming => {
                self.set_state_locked(&mut state, DeviceState::Connected);
                Ok(())
            }
            DeviceState::Connected => Ok(()),
            other => Err(self.report(
                GsrErrorBuilder::new(self.component, "stop_streaming").not_connected(other),
            )),
        }
    }

    /// Any state -> Disconnected. Returns the previous state.
    pub fn disconnect(&self) -> DeviceState {
        let mut state = self.state.lock();
        let previous = *state;
        if previous != DeviceState::Disconnected {
            self.set_state_locked(&mut state, DeviceState::Disconnected);
            if previous.is_connected() {
                self.emit(DeviceEvent::ConnectionStatus(STATUS_DISCONNECTED.to_string()));
            }
            tracing::info!(component = self.component, "device disconnected");
        }
        previous
    }

    /// Decode and apply configuration bytes. Returns the applied
    /// configuration, or `None` when the write was ignored.
    pub fn apply_configuration_bytes(&self, bytes: &[u8]) -> Option<DeviceConfiguration> {
        let parsed = match DeviceConfiguration::from_bytes(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.report(e);
                return None;
            }
        };

        let state = self.state.lock();
        if !state.is_connected() {
            self.report(
                GsrErrorBuilder::new(self.component, "write_configuration_bytes")
                    .not_connected(*state),
            );
            return None;
        }

        *self.configuration.write() = parsed;
        tracing::info!(component = self.component, configuration = %parsed, "configuration applied");
        Some(parsed)
    }

    /// Turn one raw tick into a [`SampleCluster`] and dispatch it.
    ///
    /// Ticks outside `Streaming`, or arriving while the queue is full, are
    /// counted and dropped. Domain-invalid counts still produce a cluster,
    /// with zero resistance/conductance.
    pub fn acquire(&self, raw: RawSample, payload: Option<Vec<u8>>) -> bool {
        let state = self.state.lock();
        if *state != DeviceState::Streaming {
            self.dropped_ticks.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let queued = self.events_tx.len();
        if queued >= self.sample_capacity {
            let dropped = self.dropped_samples.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 1000 == 0 {
                tracing::warn!(component = self.component, queued, dropped, "event queue full, dropping samples");
            }
            return false;
        }

        let resistance = calibrate_to_resistance(raw.adc_count, raw.range);
        let conductance = resistance_to_conductance(resistance);
        if resistance == 0.0 {
            tracing::trace!(adc = raw.adc_count, range = raw.range.index(), "adc below range offset");
        }

        let mut cluster = SampleCluster::new(self.clock.now_millis())
            .with(
                Channel::GsrRaw,
                CalibratedValue::new(raw.adc_count as f64, UNIT_COUNTS, Representation::Raw),
            )
            .with(Channel::GsrResistance, CalibratedValue::calibrated(Channel::GsrResistance, resistance))
            .with(Channel::GsrConductance, CalibratedValue::calibrated(Channel::GsrConductance, conductance))
            .with_range(raw.range);
        if let Some(payload) = payload {
            cluster = cluster.with_raw_payload(payload);
        }

        self.sequence.fetch_add(1, Ordering::Relaxed);
        self.emit(DeviceEvent::Sample(cluster));
        drop(state);
        true
    }
}

impl std::fmt::Debug for LinkCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkCore")
            .field("component", &self.component)
            .field("state", &self.state())
            .field("configuration", &self.configuration())
            .finish()
    }
}
