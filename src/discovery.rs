//! One-shot USB device discovery (§4.7), independent of a running engine.

use std::io;

/// USB vendor ID the device enumerates under.
pub const DEVICE_VID: u16 = 0x10c4;
/// USB product ID the device enumerates under.
pub const DEVICE_PID: u16 = 0xea60;

/// One matching serial device, as reported by the platform's port
/// enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// OS-specific port name, suitable for passing to [`crate::EngineBuilder::port`].
    pub port_name: String,
    /// Serial number, when the platform's enumeration exposes one.
    pub serial_number: Option<String>,
}

/// Lists serial devices matching [`DEVICE_VID`]/[`DEVICE_PID`].
///
/// This is a thin, synchronous, fallible scan — it does not open a port or
/// construct an engine, mirroring the original driver's one-shot
/// `serialport.list()` pass over the host's device table.
pub fn enumerate_devices() -> io::Result<Vec<DeviceInfo>> {
    let ports = serialport::available_ports().map_err(|e| io::Error::other(e.to_string()))?;

    let mut matches = Vec::new();
    for port in ports {
        if let serialport::SerialPortType::UsbPort(info) = port.port_type {
            if info.vid == DEVICE_VID && info.pid == DEVICE_PID {
                matches.push(DeviceInfo {
                    port_name: port.port_name,
                    serial_number: info.serial_number,
                });
            }
        }
    }
    Ok(matches)
}
