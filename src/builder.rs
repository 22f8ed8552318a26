//! Builder for opening a connection to the device (§4.8).
//!
//! The reference driver's [`crate::config`]-adjacent builder uses
//! type-state to distinguish serial/network, sync/async connection paths.
//! This driver has exactly one transport kind (serial) and one runtime
//! (async), so there is no compile-time-distinguished build path to encode
//! — a plain builder validating and defaulting options is the idiomatic
//! fit here.

use std::io;

use serial2_tokio::SerialPort;

use crate::config::EngineOptions;
use crate::engine::{self, EngineHandle, Opener};
use crate::transport;

/// Builds an [`EngineHandle`] connected to a named serial port.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    port_name: Option<String>,
    options: EngineOptions,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the OS serial port name (e.g. `/dev/ttyUSB0`, `COM3`).
    pub fn port(mut self, port_name: impl Into<String>) -> Self {
        self.port_name = Some(port_name.into());
        self
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.options.baud_rate = baud_rate;
        self
    }

    pub fn lock(mut self, lock: bool) -> Self {
        self.options.lock = lock;
        self
    }

    pub fn reconnect_interval_ms(mut self, ms: u64) -> Self {
        self.options.reconnect_interval_ms = ms;
        self
    }

    pub fn reject_on_locked(mut self, reject: bool) -> Self {
        self.options.reject_on_locked = reject;
        self
    }

    /// Loads options from historically-keyed configuration pairs,
    /// overriding any values already set on the builder (§3).
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Opens the serial port and spawns the engine task.
    pub fn build(self) -> io::Result<EngineHandle> {
        let port_name = self
            .port_name
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "port name not set"))?;
        let options = self.options;

        let opener: Opener<SerialPort> = {
            let port_name = port_name.clone();
            let options = options.clone();
            Box::new(move || transport::open_serial(&port_name, &options))
        };

        engine::spawn(opener, options)
    }
}
