//! A host-side protocol engine for a small hardware security device
//! connected over a serial link.
//!
//! The engine owns the serial stream, queues outgoing commands, parses the
//! inbound byte stream's status-byte framing (with escape-encoded output
//! payloads), enforces at-most-one in-flight exchange with FIFO ordering,
//! arbitrates multi-step command sequences via cooperative locks, and
//! reconnects on disconnect while correctly failing in-flight work.
//!
//! The physical serial port driver, the command catalogue, and payload
//! semantics are out of scope here — this crate speaks raw bytes in, raw
//! bytes (or a decoded output payload) out.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use keylink::EngineBuilder;
//!
//! let engine = EngineBuilder::new().port("/dev/ttyUSB0").build()?;
//! let reply = engine.send([0x1fu8, 0x00]).await?;
//! println!("{:?}", reply);
//! # Ok(())
//! # }
//! ```

mod builder;
mod config;
mod discovery;
mod engine;
mod error;
mod events;
mod lock;
mod payload;
mod queue;
mod transport;
mod wire;

pub use builder::EngineBuilder;
pub use config::EngineOptions;
pub use discovery::{enumerate_devices, DeviceInfo, DEVICE_PID, DEVICE_VID};
pub use engine::{EngineHandle, LockGuard};
pub use error::{DeviceErrorKind, Error, Result};
pub use events::Event;
pub use payload::IntoPayload;
pub use wire::{
    Reply, ESCAPE, LOCKED, OK, OUTPUT_BEGIN, OUTPUT_END, REJECTED, SEND_INPUT, WAIT_USER_CONFIRM,
};
