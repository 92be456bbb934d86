// src/hal/traits.rs
//! Core HAL traits for GSR device abstraction

use async_trait::async_trait;
use crossbeam::channel::Receiver;

use crate::config::DeviceConfiguration;
use crate::error::GsrResult;
use crate::hal::types::{DeviceEvent, DeviceInfo, DeviceState};

/// One physical or simulated GSR peripheral.
///
/// Samples, status strings, inquiry replies and errors all arrive on a
/// single event channel, taken once by the consumer with
/// [`take_events`](DeviceLink::take_events). Control methods take `&self`
/// so a link can be shared between the session and its ingest worker.
///
/// Every `Err` a link returns has already been pushed as
/// [`DeviceEvent::Error`]; consumers must not report it a second time.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Disconnected -> Connecting -> Connected. No-op when already connected.
    async fn connect(&self, address: &str, name: &str) -> GsrResult<()>;

    /// Connected -> Streaming. Fails with `NotConnected` from
    /// `Disconnected`/`Connecting`, also reported as an error event.
    fn start_streaming(&self) -> GsrResult<()>;

    /// Streaming -> Connected
    fn stop_streaming(&self) -> GsrResult<()>;

    /// Any state -> Disconnected
    fn disconnect(&self) -> GsrResult<()>;

    /// Apply a 12-byte configuration. Never fails: malformed buffers are
    /// ignored and reported as an error event.
    fn write_configuration_bytes(&self, bytes: &[u8]);

    /// Request identification; the reply arrives as
    /// [`DeviceEvent::Inquiry`]. Does not block.
    fn inquiry(&self);

    fn state(&self) -> DeviceState;

    fn configuration(&self) -> DeviceConfiguration;

    fn info(&self) -> DeviceInfo;

    /// Hand out the event receiver. Returns `None` after the first call.
    fn take_events(&self) -> Option<Receiver<DeviceEvent>>;
}
