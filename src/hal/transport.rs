// src/hal/transport.rs
//! Transport boundary
//!
//! A [`GsrTransport`] moves bytes to and from a physical peripheral
//! (Bluetooth, USB, a replay file). It decodes its own wire format and
//! hands finished [`RawSample`]s to a [`RawSampleSink`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{GsrErrorBuilder, GsrResult};
use crate::hal::link::LinkCore;
use crate::hal::types::{DeviceIdentity, RawSample};

#[async_trait]
pub trait GsrTransport: Send + Sync {
    async fn open(&self, address: &str) -> GsrResult<()>;

    fn close(&self) -> GsrResult<()>;

    /// Send configuration bytes to the peripheral
    fn write(&self, bytes: &[u8]) -> GsrResult<()>;

    /// Blocking identification query
    fn identify(&self) -> GsrResult<DeviceIdentity>;

    /// Begin delivering samples into `sink`
    fn start(&self, sink: RawSampleSink) -> GsrResult<()>;

    fn stop(&self) -> GsrResult<()>;
}

/// Handle a transport pushes decoded samples into
#[derive(Clone)]
pub struct RawSampleSink {
    core: Arc<LinkCore>,
}

impl RawSampleSink {
    pub(crate) fn new(core: Arc<LinkCore>) -> Self {
        Self { core }
    }

    /// Returns false when the device is no longer streaming
    pub fn push(&self, sample: RawSample) -> bool {
        self.core.acquire(sample, None)
    }

    /// Push a sample together with the packet bytes it was decoded from
    pub fn push_with_payload(&self, sample: RawSample, payload: Vec<u8>) -> bool {
        self.core.acquire(sample, Some(payload))
    }
}

impl std::fmt::Debug for RawSampleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawSampleSink").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct LoopbackState {
    open: bool,
    address: Option<String>,
    sink: Option<RawSampleSink>,
    written: Vec<Vec<u8>>,
}

/// In-memory transport for replaying recorded counts and for tests
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    identity: DeviceIdentity,
    refuse_open: bool,
}

impl LoopbackTransport {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            state: Mutex::new(LoopbackState::default()),
            identity,
            refuse_open: false,
        }
    }

    /// A transport whose `open` always fails
    pub fn unreachable() -> Self {
        Self {
            refuse_open: true,
            ..Self::new(DeviceIdentity::default())
        }
    }

    /// Deliver one sample as if it came off the wire. Returns false when
    /// nobody is listening.
    pub fn feed(&self, sample: RawSample) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => sink.push(sample),
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn address(&self) -> Option<String> {
        self.state.lock().address.clone()
    }

    /// Every buffer passed to `write`, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(DeviceIdentity::default())
    }
}

#[async_trait]
impl GsrTransport for LoopbackTransport {
    async fn open(&self, address: &str) -> GsrResult<()> {
        if self.refuse_open {
            return Err(GsrErrorBuilder::new("loopback_transport", "open")
                .transport(format!("no peripheral at {}", address)));
        }
        let mut state = self.state.lock();
        state.open = true;
        state.address = Some(address.to_string());
        Ok(())
    }

    fn close(&self) -> GsrResult<()> {
        let mut state = self.state.lock();
        state.open = false;
        state.sink = None;
        Ok(())
    }

    fn write(&self, bytes: &[u8]) -> GsrResult<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(GsrErrorBuilder::new("loopback_transport", "write").transport("port closed"));
        }
        state.written.push(bytes.to_vec());
        Ok(())
    }

    fn identify(&self) -> GsrResult<DeviceIdentity> {
        if !self.is_open() {
            return Err(GsrErrorBuilder::new("loopback_transport", "identify").transport("port closed"));
        }
        Ok(self.identity.clone())
    }

    fn start(&self, sink: RawSampleSink) -> GsrResult<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(GsrErrorBuilder::new("loopback_transport", "start").transport("port closed"));
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&self) -> GsrResult<()> {
        self.state.lock().sink = None;
        Ok(())
    }
}
