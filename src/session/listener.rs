// src/session/listener.rs
//! Host-facing listener protocol

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::error::GsrError;
use crate::session::model::{GsrSample, SessionInfo, SyncMark};

/// Push-only observer of a recording session.
///
/// Callbacks run on the session's notifier thread, never while session
/// state is locked, so a listener may call back into the session.
pub trait RecordingListener: Send + Sync {
    fn on_recording_started(&self, _session: &SessionInfo) {}
    fn on_recording_stopped(&self, _session: &SessionInfo) {}
    fn on_sample_recorded(&self, _sample: &GsrSample) {}
    fn on_sync_mark_recorded(&self, _mark: &SyncMark) {}
    fn on_error(&self, _error: &GsrError) {}
    fn on_device_connected(&self) {}
    fn on_device_disconnected(&self) {}
}

/// Listener callback as data
#[derive(Debug, Clone)]
pub enum SessionEvent {
    RecordingStarted(SessionInfo),
    RecordingStopped(SessionInfo),
    SampleRecorded(GsrSample),
    SyncMarkRecorded(SyncMark),
    Error(GsrError),
    DeviceConnected,
    DeviceDisconnected,
}

impl SessionEvent {
    pub fn dispatch(&self, listener: &dyn RecordingListener) {
        match self {
            SessionEvent::RecordingStarted(session) => listener.on_recording_started(session),
            SessionEvent::RecordingStopped(session) => listener.on_recording_stopped(session),
            SessionEvent::SampleRecorded(sample) => listener.on_sample_recorded(sample),
            SessionEvent::SyncMarkRecorded(mark) => listener.on_sync_mark_recorded(mark),
            SessionEvent::Error(error) => listener.on_error(error),
            SessionEvent::DeviceConnected => listener.on_device_connected(),
            SessionEvent::DeviceDisconnected => listener.on_device_disconnected(),
        }
    }
}

/// Listener that turns callbacks back into [`SessionEvent`]s on a channel
pub struct EventForwarder {
    tx: Sender<SessionEvent>,
}

impl EventForwarder {
    pub fn new(tx: Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }

    fn forward(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl RecordingListener for EventForwarder {
    fn on_recording_started(&self, session: &SessionInfo) {
        self.forward(SessionEvent::RecordingStarted(session.clone()));
    }

    fn on_recording_stopped(&self, session: &SessionInfo) {
        self.forward(SessionEvent::RecordingStopped(session.clone()));
    }

    fn on_sample_recorded(&self, sample: &GsrSample) {
        self.forward(SessionEvent::SampleRecorded(sample.clone()));
    }

    fn on_sync_mark_recorded(&self, mark: &SyncMark) {
        self.forward(SessionEvent::SyncMarkRecorded(mark.clone()));
    }

    fn on_error(&self, error: &GsrError) {
        self.forward(SessionEvent::Error(error.clone()));
    }

    fn on_device_connected(&self) {
        self.forward(SessionEvent::DeviceConnected);
    }

    fn on_device_disconnected(&self) {
        self.forward(SessionEvent::DeviceDisconnected);
    }
}
