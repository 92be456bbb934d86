// src/hal/mod.rs
//! Hardware Abstraction Layer for GSR devices

pub mod traits;
pub mod types;
pub mod link;
pub mod simulator;
pub mod transport;
pub mod peripheral;


pub use traits::*;
pub use types::*;
pub use link::LinkCore;
pub use simulator::SimulatedDevice;
pub use transport::{GsrTransport, LoopbackTransport, RawSampleSink};
pub use peripheral::PeripheralDevice;
