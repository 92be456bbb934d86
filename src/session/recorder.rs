// src/session/recorder.rs
//! Recording session orchestration
//!
//! A [`RecordingSession`] binds one [`DeviceLink`], timestamps and stores
//! every sample the link delivers while recording, accepts sync marks from
//! other capture modalities and reports progress to any number of
//! [`RecordingListener`]s.
//!
//! Three threads touch a session:
//!
//! - the caller, issuing control commands (`start_recording`,
//!   `trigger_sync_event`, `stop_recording`, ...)
//! - an ingest worker draining the device event channel
//! - a notifier draining the listener queue
//!
//! All session state sits behind one lock. Listener events are queued while
//! that lock is held, so they leave in the same order the mutations
//! happened, and are dispatched by the notifier after it is released.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::calibration::{
    compute_statistics, conductance_to_resistance, is_valid_reading, resistance_to_conductance,
    smooth, GsrStatistics,
};
use crate::cluster::{Channel, Representation, SampleCluster};
use crate::config::constants::device::{
    SIMULATED_DEVICE_ADDRESS, STATUS_CONNECTED, STATUS_DISCONNECTED,
};
use crate::config::SystemConfig;
use crate::error::{GsrError, GsrErrorBuilder, GsrResult};
use crate::hal::{DeviceEvent, DeviceIdentity, DeviceLink, DeviceState, SimulatedDevice};
use crate::session::listener::{RecordingListener, SessionEvent};
use crate::session::model::{GsrSample, Modality, SessionInfo, SessionStats, SyncMark};
use crate::utils::time::{generate_session_id, MonotonicStamp, SyncClock};
use crate::utils::validation::{validate_device_address, validate_session_id};

const COMPONENT: &str = "recording_session";

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Idle,
    Recording,
    /// Last session sealed; a new one may start under a different id
    Stopped,
}

/// Parameters for [`RecordingSession::start_recording_with`]
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    /// Generated from the configured prefix when `None` or empty
    pub session_id: Option<String>,
    pub participant_id: Option<String>,
    pub study_name: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl SessionRequest {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            ..Default::default()
        }
    }
}

struct SessionCore {
    phase: SessionPhase,
    device: Option<Arc<dyn DeviceLink>>,
    identity: Option<DeviceIdentity>,
    session: Option<SessionInfo>,
    samples: Vec<GsrSample>,
    next_index: u64,
    sample_stamp: MonotonicStamp,
    mark_stamp: MonotonicStamp,
}

impl SessionCore {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            device: None,
            identity: None,
            session: None,
            samples: Vec::new(),
            next_index: 0,
            sample_stamp: MonotonicStamp::new(),
            mark_stamp: MonotonicStamp::new(),
        }
    }

    /// Active session, only while recording
    fn recording(&mut self) -> Option<&mut SessionInfo> {
        match self.phase {
            SessionPhase::Recording => self.session.as_mut(),
            _ => None,
        }
    }
}

struct SessionShared {
    core: Mutex<SessionCore>,
    notify_tx: Sender<SessionEvent>,
    clock: SyncClock,
    config: SystemConfig,
}

impl SessionShared {
    fn notify(&self, event: SessionEvent) {
        // Notifier gone: session is being torn down
        let _ = self.notify_tx.send(event);
    }

    /// Log an error, queue it for `on_error` and hand it back
    fn fail(&self, error: GsrError) -> GsrError {
        tracing::warn!(component = COMPONENT, error = %error, "session error");
        if error.is_surfaced() {
            self.notify(SessionEvent::Error(error.clone()));
        }
        error
    }

    fn handle_device_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Sample(cluster) => self.ingest(&cluster),
            DeviceEvent::ConnectionStatus(status) => {
                let core = self.core.lock();
                if status == STATUS_CONNECTED {
                    self.notify(SessionEvent::DeviceConnected);
                } else if status == STATUS_DISCONNECTED {
                    if core.phase == SessionPhase::Recording {
                        tracing::warn!("device disconnected while recording");
                    }
                    self.notify(SessionEvent::DeviceDisconnected);
                } else {
                    tracing::debug!(status = %status, "unrecognized connection status");
                }
            }
            DeviceEvent::StateChanged(state) => {
                tracing::trace!(state = %state, "device state changed");
            }
            DeviceEvent::Inquiry(identity) => {
                let mut core = self.core.lock();
                if let Some(session) = core.recording() {
                    annotate_identity(session, &identity);
                }
                core.identity = Some(identity);
            }
            DeviceEvent::Error(error) => {
                let _core = self.core.lock();
                if error.is_surfaced() {
                    self.notify(SessionEvent::Error(error));
                }
            }
        }
    }

    fn ingest(&self, cluster: &SampleCluster) {
        let resistance = cluster
            .get(Channel::GsrResistance, Representation::Calibrated)
            .map(|v| v.value);
        let conductance = cluster
            .get(Channel::GsrConductance, Representation::Calibrated)
            .map(|v| v.value);

        let (resistance, conductance) = match (resistance, conductance) {
            (Some(r), Some(g)) => (r, g),
            (Some(r), None) => (r, resistance_to_conductance(r)),
            (None, Some(g)) => (conductance_to_resistance(g), g),
            (None, None) => {
                let g = cluster
                    .value_or_simulated(Channel::GsrConductance, Representation::Calibrated);
                (conductance_to_resistance(g), g)
            }
        };
        let raw_value = cluster
            .get(Channel::GsrRaw, Representation::Raw)
            .map(|v| v.value.clamp(0.0, u16::MAX as f64) as u16);

        let mut core = self.core.lock();
        let core = &mut *core;
        if core.phase != SessionPhase::Recording {
            tracing::trace!("sample outside recording dropped");
            return;
        }
        let Some(session) = core.session.as_mut() else {
            return;
        };

        // Also catches NaN
        if !(resistance > 0.0 && conductance > 0.0) {
            session.rejected_count += 1;
            tracing::warn!(
                resistance_kohm = resistance,
                conductance_us = conductance,
                raw = ?raw_value,
                "rejected non-positive reading"
            );
            return;
        }

        let is_valid = is_valid_reading(resistance, conductance);
        if !is_valid {
            session.flagged_count += 1;
        }
        session.sample_count += 1;
        session.has_gsr_data = true;

        let timestamp = core.sample_stamp.next(self.clock.now_millis());
        let sample = GsrSample {
            timestamp,
            utc_timestamp: self.clock.system_to_utc(timestamp),
            conductance,
            resistance,
            sample_index: core.next_index,
            session_id: session.session_id.clone(),
            raw_value,
            range: cluster.range(),
            is_valid,
        };
        core.next_index += 1;
        core.samples.push(sample.clone());
        self.notify(SessionEvent::SampleRecorded(sample));
    }
}

fn annotate_identity(session: &mut SessionInfo, identity: &DeviceIdentity) {
    let metadata = &mut session.metadata;
    metadata.insert("firmware_version".into(), identity.firmware_version.clone());
    metadata.insert("hardware_version".into(), identity.hardware_version.clone());
    metadata.insert("battery_level".into(), identity.battery_level.to_string());
}

struct IngestWorker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl IngestWorker {
    fn spawn(shared: Weak<SessionShared>, events: Receiver<DeviceEvent>) -> GsrResult<Self> {
        let (shutdown, shutdown_rx) = bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name("gsr-ingest".into())
            .spawn(move || {
                tracing::debug!("ingest worker started");
                loop {
                    select! {
                        recv(events) -> event => {
                            let Ok(event) = event else { break };
                            let Some(shared) = shared.upgrade() else { break };
                            shared.handle_device_event(event);
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                tracing::debug!("ingest worker stopped");
            })
            .map_err(|e| {
                GsrErrorBuilder::new(COMPONENT, "bind_device")
                    .transport(format!("failed to spawn ingest worker: {}", e))
            })?;
        Ok(Self { shutdown, handle })
    }

    fn stop(self) {
        drop(self.shutdown);
        if self.handle.thread().id() != std::thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

fn spawn_notifier(
    listeners: Arc<RwLock<Vec<Arc<dyn RecordingListener>>>>,
    rx: Receiver<SessionEvent>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        tracing::debug!("listener notifier started");
        for event in rx.iter() {
            let snapshot: Vec<Arc<dyn RecordingListener>> = listeners.read().clone();
            for listener in snapshot {
                let outcome = catch_unwind(AssertUnwindSafe(|| event.dispatch(listener.as_ref())));
                if outcome.is_err() {
                    tracing::error!("listener panicked during dispatch");
                }
            }
        }
        tracing::debug!("listener notifier stopped");
    })
}

/// One GSR recording session over a bound device
pub struct RecordingSession {
    shared: Arc<SessionShared>,
    listeners: Arc<RwLock<Vec<Arc<dyn RecordingListener>>>>,
    ingest: Mutex<Option<IngestWorker>>,
    _notifier: JoinHandle<()>,
}

impl RecordingSession {
    /// Session on the system clock, corrected by `session.utc_offset_ms`
    pub fn new(config: SystemConfig) -> Self {
        Self::with_clock(config, SyncClock::system())
    }

    /// Session over `config` and `clock`. Inconsistent configuration is
    /// logged rather than refused; devices fall back to safe values for
    /// unusable rates.
    pub fn with_clock(config: SystemConfig, clock: SyncClock) -> Self {
        if let Err(problems) = config.validate_consistency() {
            for problem in &problems {
                tracing::warn!(problem = %problem, "inconsistent session configuration");
            }
        }
        clock.set_utc_offset_ms(config.session.utc_offset_ms);

        let listeners: Arc<RwLock<Vec<Arc<dyn RecordingListener>>>> =
            Arc::new(RwLock::new(Vec::new()));
        let (notify_tx, notify_rx) = unbounded();
        let notifier = spawn_notifier(Arc::clone(&listeners), notify_rx);

        Self {
            shared: Arc::new(SessionShared {
                core: Mutex::new(SessionCore::new()),
                notify_tx,
                clock,
                config,
            }),
            listeners,
            ingest: Mutex::new(None),
            _notifier: notifier,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn RecordingListener>) {
        self.listeners.write().push(listener);
    }

    /// Returns false when the listener was not registered
    pub fn remove_listener(&self, listener: &Arc<dyn RecordingListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn clock(&self) -> &SyncClock {
        &self.shared.clock
    }

    pub fn config(&self) -> &SystemConfig {
        &self.shared.config
    }

    /// Attach a device and start consuming its events. Replaces any
    /// previously bound device; refused while recording.
    pub fn bind_device(&self, device: Arc<dyn DeviceLink>) -> GsrResult<()> {
        let shared = &self.shared;
        if shared.core.lock().phase == SessionPhase::Recording {
            return Err(shared.fail(
                GsrErrorBuilder::new(COMPONENT, "bind_device")
                    .session_state("cannot replace the device while recording"),
            ));
        }

        let events = device.take_events().ok_or_else(|| {
            shared.fail(
                GsrErrorBuilder::new(COMPONENT, "bind_device")
                    .invalid_configuration("device event stream already taken"),
            )
        })?;

        let mut ingest = self.ingest.lock();
        if let Some(previous) = ingest.take() {
            previous.stop();
        }
        *ingest = Some(
            IngestWorker::spawn(Arc::downgrade(shared), events).map_err(|e| shared.fail(e))?,
        );

        let info = device.info();
        tracing::info!(kind = ?info.kind, simulated = info.simulated, "device bound");
        let mut core = shared.core.lock();
        core.device = Some(device);
        core.identity = None;
        Ok(())
    }

    /// Validate the address, bind a device and connect within the
    /// configured timeout.
    ///
    /// Without an address the configured one is used, falling back to the
    /// simulator address. When no device has been bound a
    /// [`SimulatedDevice`] is created from the configuration.
    pub async fn initialize_device(&self, address: Option<&str>) -> GsrResult<()> {
        let shared = &self.shared;
        let address = address
            .map(str::to_string)
            .or_else(|| shared.config.device.address.clone())
            .unwrap_or_else(|| SIMULATED_DEVICE_ADDRESS.to_string());

        if let Err(e) = validate_device_address(&address) {
            return Err(shared.fail(
                GsrErrorBuilder::new(COMPONENT, "initialize_device")
                    .invalid_address(&address, &e.to_string()),
            ));
        }

        let bound = {
            let core = shared.core.lock();
            if core.phase == SessionPhase::Recording {
                return Err(shared.fail(
                    GsrErrorBuilder::new(COMPONENT, "initialize_device")
                        .session_state("device cannot be re-initialized while recording"),
                ));
            }
            core.device.clone()
        };

        let device = match bound {
            Some(device) => device,
            None => {
                let device: Arc<dyn DeviceLink> = Arc::new(SimulatedDevice::from_config_with_clock(
                    &shared.config,
                    shared.clock.provider(),
                ));
                self.bind_device(Arc::clone(&device))?;
                device
            }
        };

        let timeout_ms = shared.config.device.connection_timeout_ms;
        let name = shared.config.device.name.clone();
        tracing::info!(address = %address, timeout_ms, "connecting device");

        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            device.connect(&address, &name),
        )
        .await
        {
            Ok(Ok(())) => {
                device.inquiry();
                Ok(())
            }
            // Already reported by the device
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let _ = device.disconnect();
                Err(shared.fail(
                    GsrErrorBuilder::new(COMPONENT, "connect").timeout(timeout_ms),
                ))
            }
        }
    }

    /// Start recording under `session_id`, or a generated id when empty
    pub fn start_recording(&self, session_id: &str) -> GsrResult<SessionInfo> {
        self.start_recording_with(SessionRequest::new(session_id))
    }

    pub fn start_recording_with(&self, request: SessionRequest) -> GsrResult<SessionInfo> {
        let shared = &self.shared;
        let builder = || GsrErrorBuilder::new(COMPONENT, "start_recording");

        let session_id = match request.session_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_session_id(&shared.config.session.session_prefix),
        };
        if let Err(e) = validate_session_id(&session_id) {
            return Err(shared.fail(builder().session_state(e.to_string())));
        }

        let mut core = shared.core.lock();
        let core = &mut *core;

        match core.phase {
            SessionPhase::Recording => {
                return Err(shared.fail(builder().session_state("already recording")));
            }
            SessionPhase::Stopped => {
                if core.session.as_ref().map(|s| s.session_id.as_str()) == Some(session_id.as_str()) {
                    return Err(shared.fail(
                        builder().session_state(format!("session '{}' already recorded", session_id)),
                    ));
                }
            }
            SessionPhase::Idle => {}
        }

        let Some(device) = core.device.clone() else {
            return Err(shared.fail(builder().session_state("no device initialized")));
        };

        let start_time = shared.clock.now_millis();
        let mut session = SessionInfo::new(&session_id, start_time);
        session.participant_id = request
            .participant_id
            .or_else(|| shared.config.session.participant_id.clone());
        session.study_name = Some(
            request
                .study_name
                .unwrap_or_else(|| shared.config.session.study_name.clone()),
        );

        let info = device.info();
        session.metadata.insert("device_address".into(), info.address);
        session.metadata.insert("device_name".into(), info.name);
        session.metadata.insert("device_kind".into(), format!("{:?}", info.kind));
        session.metadata.insert("simulated".into(), info.simulated.to_string());
        session.metadata.insert(
            "sampling_rate_hz".into(),
            device.configuration().sampling_rate_hz.to_string(),
        );
        if let Some(identity) = &core.identity {
            annotate_identity(&mut session, identity);
        }
        session.metadata.extend(request.metadata);

        // The device reports its own failure through its event stream
        device.start_streaming()?;

        core.phase = SessionPhase::Recording;
        core.session = Some(session.clone());
        core.samples.clear();
        core.next_index = 0;
        core.sample_stamp = MonotonicStamp::new();
        core.mark_stamp = MonotonicStamp::new();

        tracing::info!(session_id = %session_id, "recording started");
        shared.notify(SessionEvent::RecordingStarted(session.clone()));
        Ok(session)
    }

    /// Append a sync mark stamped now
    pub fn trigger_sync_event(
        &self,
        event_type: &str,
        metadata: BTreeMap<String, String>,
    ) -> GsrResult<SyncMark> {
        let shared = &self.shared;
        let mut core = shared.core.lock();
        let core = &mut *core;

        let session = match (core.phase, core.session.as_mut()) {
            (SessionPhase::Recording, Some(session)) => session,
            _ => return Err(shared.fail(
                GsrErrorBuilder::new(COMPONENT, "trigger_sync_event")
                    .session_state(format!("cannot add sync mark '{}' while not recording", event_type)),
            )),
        };

        let timestamp = core.mark_stamp.next(shared.clock.now_millis());
        let mark = SyncMark {
            timestamp,
            utc_timestamp: shared.clock.system_to_utc(timestamp),
            event_type: event_type.to_string(),
            session_id: session.session_id.clone(),
            metadata,
        };
        session.sync_marks.push(mark.clone());

        tracing::debug!(event_type, timestamp, "sync mark recorded");
        shared.notify(SessionEvent::SyncMarkRecorded(mark.clone()));
        Ok(mark)
    }

    /// Seal the session and stop the device stream.
    ///
    /// Samples still queued behind the stop are discarded whole.
    pub fn stop_recording(&self) -> GsrResult<SessionInfo> {
        let shared = &self.shared;
        let mut core = shared.core.lock();
        let core = &mut *core;

        if core.phase != SessionPhase::Recording {
            return Err(shared.fail(
                GsrErrorBuilder::new(COMPONENT, "stop_recording").session_state("not recording"),
            ));
        }
        core.phase = SessionPhase::Stopped;

        // Never before the last stamp handed out
        let end_time = [core.sample_stamp.last(), core.mark_stamp.last()]
            .into_iter()
            .flatten()
            .fold(shared.clock.now_millis(), u64::max);
        let sealed = match core.session.as_mut() {
            Some(session) => {
                session.end_time = Some(end_time.max(session.start_time));
                session.clone()
            }
            None => {
                return Err(shared.fail(
                    GsrErrorBuilder::new(COMPONENT, "stop_recording")
                        .session_state("recording without a session record"),
                ));
            }
        };

        if let Some(device) = &core.device {
            if device.state() == DeviceState::Streaming {
                if let Err(e) = device.stop_streaming() {
                    tracing::warn!(error = %e, "failed to stop device stream");
                }
            }
        }

        tracing::info!(
            session_id = %sealed.session_id,
            samples = sealed.sample_count,
            flagged = sealed.flagged_count,
            rejected = sealed.rejected_count,
            sync_marks = sealed.sync_marks.len(),
            "recording stopped"
        );
        shared.notify(SessionEvent::RecordingStopped(sealed.clone()));
        Ok(sealed)
    }

    /// Record that another modality contributed data to this session
    pub fn mark_modality(&self, modality: Modality) -> GsrResult<()> {
        let shared = &self.shared;
        let mut core = shared.core.lock();
        match core.recording() {
            Some(session) => {
                session.set_modality(modality);
                Ok(())
            }
            None => Err(shared.fail(
                GsrErrorBuilder::new(COMPONENT, "mark_modality").session_state("not recording"),
            )),
        }
    }

    /// Ask the device for its identity; the reply lands in the session
    /// metadata once it arrives.
    pub fn request_device_info(&self) -> GsrResult<()> {
        let device = self.bound_device("request_device_info")?;
        device.inquiry();
        Ok(())
    }

    /// Forward configuration bytes to the device. Malformed buffers are
    /// reported through `on_error` by the device itself.
    pub fn write_device_configuration(&self, bytes: &[u8]) -> GsrResult<()> {
        let device = self.bound_device("write_device_configuration")?;
        device.write_configuration_bytes(bytes);
        Ok(())
    }

    /// Disconnect the bound device; refused while recording
    pub fn disconnect_device(&self) -> GsrResult<()> {
        let shared = &self.shared;
        let device = {
            let core = shared.core.lock();
            if core.phase == SessionPhase::Recording {
                return Err(shared.fail(
                    GsrErrorBuilder::new(COMPONENT, "disconnect_device")
                        .session_state("stop recording before disconnecting"),
                ));
            }
            core.device.clone()
        };
        match device {
            Some(device) => device.disconnect(),
            None => Ok(()),
        }
    }

    fn bound_device(&self, operation: &str) -> GsrResult<Arc<dyn DeviceLink>> {
        let shared = &self.shared;
        let device = shared.core.lock().device.clone();
        device.ok_or_else(|| {
            shared.fail(GsrErrorBuilder::new(COMPONENT, operation).session_state("no device initialized"))
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.core.lock().phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase() == SessionPhase::Recording
    }

    pub fn device_state(&self) -> Option<DeviceState> {
        self.shared.core.lock().device.as_ref().map(|d| d.state())
    }

    /// Current or last session record
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.shared.core.lock().session.clone()
    }

    pub fn session_stats(&self) -> Option<SessionStats> {
        let now = self.shared.clock.now_millis();
        self.shared.core.lock().session.as_ref().map(|s| s.stats(now))
    }

    /// Accepted samples of the current or last session, in index order
    pub fn samples(&self) -> Vec<GsrSample> {
        self.shared.core.lock().samples.clone()
    }

    pub fn sample_count(&self) -> usize {
        self.shared.core.lock().samples.len()
    }

    fn conductance_series(&self) -> Vec<f64> {
        self.shared
            .core
            .lock()
            .samples
            .iter()
            .map(|s| s.conductance)
            .collect()
    }

    /// Statistics over the accepted conductance log
    pub fn statistics(&self) -> GsrStatistics {
        compute_statistics(&self.conductance_series())
    }

    /// Conductance log smoothed with the configured window
    pub fn smoothed_conductance(&self) -> Vec<f64> {
        smooth(
            &self.conductance_series(),
            self.shared.config.calibration.smoothing_window,
        )
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(worker) = self.ingest.lock().take() {
            worker.stop();
        }
        let core = self.shared.core.lock();
        if let Some(device) = &core.device {
            if device.state() == DeviceState::Streaming {
                let _ = device.stop_streaming();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::GsrRange;
    use crate::cluster::CalibratedValue;
    use crate::config::SimulatorSettings;
    use crate::error::ErrorKind;
    use crate::hal::RawSample;
    use crate::session::listener::EventForwarder;
    use crate::utils::time::MockTimeProvider;

    fn quiet_config() -> SystemConfig {
        let mut config = SystemConfig::default();
        config.simulator = SimulatorSettings {
            connect_delay_ms: 1,
            timer_enabled: false,
            seed: Some(7),
            ..Default::default()
        };
        config
    }

    fn session_with_device() -> (RecordingSession, Arc<SimulatedDevice>, Arc<MockTimeProvider>) {
        let config = quiet_config();
        let time = Arc::new(MockTimeProvider::new(1_000));
        let session = RecordingSession::with_clock(config.clone(), SyncClock::new(time.clone()));
        let device = Arc::new(SimulatedDevice::new(
            config.simulator.clone(),
            config.device_configuration(),
            time.clone(),
        ));
        session.bind_device(device.clone()).unwrap();
        (session, device, time)
    }

    fn recv(rx: &Receiver<SessionEvent>) -> SessionEvent {
        rx.recv_timeout(Duration::from_secs(2)).expect("listener event")
    }

    #[test]
    fn test_start_requires_device() {
        let session = RecordingSession::new(quiet_config());
        let err = session.start_recording("S1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionState);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_invalid_address_is_reported() {
        let session = RecordingSession::new(quiet_config());
        let (forwarder, rx) = EventForwarder::channel();
        session.add_listener(Arc::new(forwarder));

        let err = session.initialize_device(Some("not-a-mac")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAddress);
        assert!(matches!(recv(&rx), SessionEvent::Error(e) if e.kind() == ErrorKind::InvalidAddress));
        assert!(session.device_state().is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_with_injected_samples() {
        let (session, device, time) = session_with_device();
        let (forwarder, rx) = EventForwarder::channel();
        session.add_listener(Arc::new(forwarder));

        session.initialize_device(None).await.unwrap();
        assert!(matches!(recv(&rx), SessionEvent::DeviceConnected));

        let started = session.start_recording("S1").unwrap();
        assert_eq!(started.start_time, 1_000);
        assert!(matches!(recv(&rx), SessionEvent::RecordingStarted(s) if s.session_id == "S1"));

        for adc in [3000u16, 3100, 3200] {
            time.advance_by(8);
            assert!(device.inject(RawSample {
                adc_count: adc,
                range: GsrRange::Range10kTo56k,
                device_timestamp: 0,
            }));
        }

        let mut indices = Vec::new();
        while indices.len() < 3 {
            if let SessionEvent::SampleRecorded(sample) = recv(&rx) {
                assert_eq!(sample.session_id, "S1");
                assert!(sample.resistance > 0.0);
                indices.push(sample.sample_index);
            }
        }
        assert_eq!(indices, vec![0, 1, 2]);

        time.advance_by(100);
        let info = session.stop_recording().unwrap();
        assert_eq!(info.sample_count, 3);
        assert!(info.end_time.unwrap() >= info.start_time);
        assert!(info.has_gsr_data);
        assert_eq!(device.state(), DeviceState::Connected);
        assert_eq!(session.phase(), SessionPhase::Stopped);
    }

    #[test]
    fn test_ingest_rejects_non_positive_readings() {
        let (session, device, _time) = session_with_device();
        let shared = &session.shared;
        {
            let mut core = shared.core.lock();
            core.phase = SessionPhase::Recording;
            core.session = Some(SessionInfo::new("S1", 0));
        }
        drop(device);

        let bad = SampleCluster::new(0)
            .with(Channel::GsrResistance, CalibratedValue::calibrated(Channel::GsrResistance, 0.0))
            .with(Channel::GsrConductance, CalibratedValue::calibrated(Channel::GsrConductance, 0.0));
        shared.ingest(&bad);

        let good = SampleCluster::new(0)
            .with(Channel::GsrResistance, CalibratedValue::calibrated(Channel::GsrResistance, 50.0));
        shared.ingest(&good);

        let info = session.session_info().unwrap();
        assert_eq!(info.rejected_count, 1);
        assert_eq!(info.sample_count, 1);
        let samples = session.samples();
        assert_eq!(samples[0].sample_index, 0);
        assert!((samples[0].conductance - 20.0).abs() < 1e-9);
        assert!(samples[0].is_valid);
    }

    #[test]
    fn test_ingest_flags_inconsistent_channels() {
        let (session, _device, _time) = session_with_device();
        let shared = &session.shared;
        {
            let mut core = shared.core.lock();
            core.phase = SessionPhase::Recording;
            core.session = Some(SessionInfo::new("S1", 0));
        }

        let cluster = SampleCluster::new(0)
            .with(Channel::GsrResistance, CalibratedValue::calibrated(Channel::GsrResistance, 50.0))
            .with(Channel::GsrConductance, CalibratedValue::calibrated(Channel::GsrConductance, 40.0));
        shared.ingest(&cluster);

        let info = session.session_info().unwrap();
        assert_eq!(info.sample_count, 1);
        assert_eq!(info.flagged_count, 1);
        assert!(!session.samples()[0].is_valid);
    }

    #[tokio::test]
    async fn test_sync_marks_require_recording() {
        let (session, _device, _time) = session_with_device();
        let err = session
            .trigger_sync_event("THERMAL_CAPTURE", BTreeMap::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionState);

        session.initialize_device(None).await.unwrap();
        session.start_recording("S1").unwrap();
        let first = session.trigger_sync_event("THERMAL_CAPTURE", BTreeMap::new()).unwrap();
        let second = session.trigger_sync_event("THERMAL_CAPTURE", BTreeMap::new()).unwrap();
        assert!(second.timestamp > first.timestamp);

        let info = session.stop_recording().unwrap();
        assert_eq!(info.sync_marks, vec![first, second]);
    }

    #[tokio::test]
    async fn test_stopped_session_needs_new_id() {
        let (session, _device, _time) = session_with_device();
        session.initialize_device(None).await.unwrap();
        session.start_recording("S1").unwrap();
        assert_eq!(
            session.start_recording("S2").unwrap_err().kind(),
            ErrorKind::SessionState
        );
        session.stop_recording().unwrap();

        assert!(session.start_recording("S1").is_err());
        let next = session.start_recording("S2").unwrap();
        assert_eq!(next.sample_count, 0);
        assert_eq!(session.sample_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_id_is_generated() {
        let (session, _device, _time) = session_with_device();
        session.initialize_device(None).await.unwrap();
        let info = session.start_recording("").unwrap();
        assert!(info.session_id.starts_with("GSR_"));
        assert_eq!(info.study_name.as_deref(), Some(session.config().session.study_name.as_str()));
    }

    #[tokio::test]
    async fn test_inquiry_lands_in_metadata() {
        let (session, device, _time) = session_with_device();
        drop(device);
        session.initialize_device(None).await.unwrap();
        session.start_recording("S1").unwrap();
        session.request_device_info().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            let info = session.session_info().unwrap();
            if info.metadata.contains_key("firmware_version") {
                assert_eq!(info.metadata["battery_level"], "100");
                break;
            }
            assert!(std::time::Instant::now() < deadline, "identity never arrived");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[tokio::test]
    async fn test_start_on_disconnected_device_fails() {
        let (session, _device, _time) = session_with_device();
        let (forwarder, rx) = EventForwarder::channel();
        session.add_listener(Arc::new(forwarder));

        let err = session.start_recording("S1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(session.phase(), SessionPhase::Idle);
        // Reported once, by the device
        assert!(matches!(recv(&rx), SessionEvent::Error(e) if e.kind() == ErrorKind::NotConnected));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[tokio::test]
    async fn test_disconnect_refused_while_recording() {
        let (session, _device, _time) = session_with_device();
        session.initialize_device(None).await.unwrap();
        session.start_recording("S1").unwrap();
        assert!(session.disconnect_device().is_err());
        session.stop_recording().unwrap();
        session.disconnect_device().unwrap();
        assert_eq!(session.device_state(), Some(DeviceState::Disconnected));
    }

    #[test]
    fn test_remove_listener() {
        let session = RecordingSession::new(quiet_config());
        let (forwarder, _rx) = EventForwarder::channel();
        let listener: Arc<dyn RecordingListener> = Arc::new(forwarder);
        session.add_listener(listener.clone());
        assert!(session.remove_listener(&listener));
        assert!(!session.remove_listener(&listener));
    }
}
