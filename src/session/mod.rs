// src/session/mod.rs
//! Recording sessions: data model, listener protocol and the orchestrator

pub mod model;
pub mod listener;
pub mod recorder;

pub use model::{
    GsrSample, Modality, SessionInfo, SessionStats, SyncMark, SAMPLE_HEADER, SYNC_MARK_HEADER,
};
pub use listener::{EventForwarder, RecordingListener, SessionEvent};
pub use recorder::{RecordingSession, SessionPhase, SessionRequest};
