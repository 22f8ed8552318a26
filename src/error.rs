//! Error taxonomy for the protocol engine.

use thiserror::Error;

/// Errors produced by the protocol engine and its public API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `send` was attempted while the transport is not open, or the transport
    /// closed out from under a dispatched exchange.
    #[error("device is not connected")]
    Disconnected,
    /// No inbound byte advanced the head exchange for the watchdog period.
    #[error("watchdog timeout waiting for device reply")]
    Watchdog,
    /// The exchange was dropped by `clear()` or `close()`.
    #[error("cleared by close() or clear()")]
    Cleared,
    /// The device reported itself PIN-locked and `reject_on_locked` is set.
    #[error("device is locked")]
    Locked,
    /// The first byte of a reply did not match any known status byte.
    #[error("unknown response byte: {0:#04x}")]
    UnknownResponse(u8),
    /// Retained for source fidelity with the original JavaScript driver,
    /// which type-checked `sequence`'s argument at runtime. Rust's type
    /// system rejects a non-future argument to `sequence` at compile time,
    /// so the engine itself never produces this variant.
    #[error("sequence() requires an async callback")]
    SequenceNotAsync,
    /// The device reported a named error status byte (246..255).
    #[error("device error: {0}")]
    Device(#[from] DeviceErrorKind),
    /// An I/O failure on the underlying transport, not otherwise classified.
    #[error("transport I/O error: {0}")]
    Io(String),
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Named device error statuses, wire bytes 246..=255.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    #[error("unknown command")]
    UnknownCommand,
    #[error("device not initialised")]
    NotInitialised,
    #[error("memory error")]
    MemoryError,
    #[error("application domain too long")]
    AppDomainTooLong,
    #[error("application domain invalid")]
    AppDomainInvalid,
    #[error("mnemonic too long")]
    MnemonicTooLong,
    #[error("mnemonic invalid")]
    MnemonicInvalid,
    #[error("mnemonic generation failed")]
    GenerateMnemonic,
    #[error("timed out waiting for user input")]
    InputTimeout,
    #[error("not implemented by device")]
    NotImplemented,
}

impl DeviceErrorKind {
    /// Maps a wire status byte in `246..=255` to its symbolic name.
    ///
    /// Returns `None` for any byte outside the device-error range.
    pub(crate) fn from_status_byte(byte: u8) -> Option<Self> {
        match byte {
            246 => Some(Self::UnknownCommand),
            247 => Some(Self::NotInitialised),
            248 => Some(Self::MemoryError),
            249 => Some(Self::AppDomainTooLong),
            250 => Some(Self::AppDomainInvalid),
            251 => Some(Self::MnemonicTooLong),
            252 => Some(Self::MnemonicInvalid),
            253 => Some(Self::GenerateMnemonic),
            254 => Some(Self::InputTimeout),
            255 => Some(Self::NotImplemented),
            _ => None,
        }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_range_is_exact() {
        assert!(DeviceErrorKind::from_status_byte(245).is_none());
        assert_eq!(
            DeviceErrorKind::from_status_byte(246),
            Some(DeviceErrorKind::UnknownCommand)
        );
        assert_eq!(
            DeviceErrorKind::from_status_byte(255),
            Some(DeviceErrorKind::NotImplemented)
        );
    }
}
