//! Status-byte vocabulary and the frame parser.
//!
//! The parser has no long-lived state of its own: its working state is the
//! scheduler's [`crate::engine::State`] plus the head exchange's
//! `prev_was_escape` flag and output buffer (see [`crate::queue::Exchange`]).
//! It is expressed here as a set of free functions over that borrowed state,
//! mirroring the original device's wire format rather than a generic codec.

use crate::error::{DeviceErrorKind, Error};

/// Device requests more input, proceed normally.
pub const OK: u8 = 1;
/// Device requests more input before it can reply.
pub const SEND_INPUT: u8 = 2;
/// The exchange was rejected by the user on-device.
pub const REJECTED: u8 = 3;
/// Start of an escape-encoded output payload.
pub const OUTPUT_BEGIN: u8 = 4;
/// End of an escape-encoded output payload.
pub const OUTPUT_END: u8 = 5;
/// Escapes the following payload byte so it is taken literally.
pub const ESCAPE: u8 = 6;
/// Device is waiting on the user to confirm or deny an action.
pub const WAIT_USER_CONFIRM: u8 = 10;
/// Device requires its PIN before it will proceed.
pub const LOCKED: u8 = 11;

/// First byte of the device-error status range (inclusive).
pub const DEVICE_ERROR_LOW: u8 = 246;
/// Last byte of the device-error status range (inclusive).
pub const DEVICE_ERROR_HIGH: u8 = 255;

/// Decoded terminal payload delivered to a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A bare terminal status byte (OK, SEND_INPUT, or REJECTED).
    Status(u8),
    /// A fully decoded output payload, framed by OUTPUT_BEGIN/OUTPUT_END.
    Payload(Vec<u8>),
}

/// What the scheduler should do after examining one status byte while
/// in the `Sending` state.
pub(crate) enum StatusOutcome {
    /// Complete the head exchange with a terminal status or error, then
    /// continue parsing `remainder` as a fresh reply (possibly empty).
    Complete {
        result: crate::error::Result<Reply>,
        remainder_start: usize,
    },
    /// Transition into `Reading`; continue parsing `remainder` as payload
    /// bytes within the same delivery.
    BeginOutput { remainder_start: usize },
    /// A non-terminal notification was observed (WAIT_USER_CONFIRM). The
    /// head stays in-flight; continue parsing the remainder as further
    /// status bytes. The watchdog should be disarmed for this tick.
    WaitUserConfirm { remainder_start: usize },
    /// The device reported LOCKED. Caller decides whether to fail every
    /// queued exchange (`reject_on_locked`) or treat the byte as consumed
    /// and continue parsing the remainder with the head still in-flight.
    Locked { remainder_start: usize },
}

/// Classifies `data[0]` against the status-byte vocabulary, per §4.1's
/// "Parse rules in Sending state".
pub(crate) fn classify_status(data: &[u8]) -> StatusOutcome {
    debug_assert!(!data.is_empty());
    let byte = data[0];
    match byte {
        OK | SEND_INPUT => StatusOutcome::Complete {
            result: Ok(Reply::Status(byte)),
            remainder_start: 1,
        },
        REJECTED => StatusOutcome::Complete {
            result: Ok(Reply::Status(byte)),
            remainder_start: 1,
        },
        OUTPUT_BEGIN => StatusOutcome::BeginOutput { remainder_start: 1 },
        WAIT_USER_CONFIRM => StatusOutcome::WaitUserConfirm { remainder_start: 1 },
        LOCKED => StatusOutcome::Locked { remainder_start: 1 },
        DEVICE_ERROR_LOW..=DEVICE_ERROR_HIGH => {
            let kind = DeviceErrorKind::from_status_byte(byte)
                .expect("byte is within the device-error range");
            StatusOutcome::Complete {
                result: Err(Error::Device(kind)),
                remainder_start: 1,
            }
        }
        other => StatusOutcome::Complete {
            result: Err(Error::UnknownResponse(other)),
            remainder_start: 1,
        },
    }
}

/// Outcome of feeding one byte to the payload decoder while `Reading`.
pub(crate) enum PayloadStep {
    /// Byte consumed, accumulation continues.
    Continue,
    /// OUTPUT_END observed: the payload in `buffer` is complete. Any bytes
    /// after this one in the same delivery are discarded, matching the
    /// original device framing.
    Done,
}

/// Applies one payload byte to `prev_was_escape`/`buffer`, per §4.1's
/// "Parse rules in Reading state".
pub(crate) fn feed_payload_byte(byte: u8, prev_was_escape: &mut bool, buffer: &mut Vec<u8>) -> PayloadStep {
    if *prev_was_escape {
        buffer.push(byte);
        *prev_was_escape = false;
        return PayloadStep::Continue;
    }
    match byte {
        ESCAPE => {
            *prev_was_escape = true;
            PayloadStep::Continue
        }
        OUTPUT_END => PayloadStep::Done,
        _ => {
            buffer.push(byte);
            PayloadStep::Continue
        }
    }
}

/// Escape-encodes a raw payload the way the device would frame it on the
/// wire: `OUTPUT_BEGIN, esc_encode(payload), OUTPUT_END`. Used by tests to
/// build scenario byte sequences without hand-escaping them.
#[cfg(test)]
pub(crate) fn encode_output_frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.push(OUTPUT_BEGIN);
    for &b in payload {
        if b == ESCAPE || b == OUTPUT_END {
            framed.push(ESCAPE);
        }
        framed.push(b);
    }
    framed.push(OUTPUT_END);
    framed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trip_law() {
        // Invariant 6: framing any byte sequence and decoding it back
        // through the payload decoder yields the original bytes.
        let payload: Vec<u8> = (0..=255u8).collect();
        let framed = encode_output_frame(&payload);
        assert_eq!(framed[0], OUTPUT_BEGIN);

        let mut prev_was_escape = false;
        let mut decoded = Vec::new();
        for &byte in &framed[1..] {
            match feed_payload_byte(byte, &mut prev_was_escape, &mut decoded) {
                PayloadStep::Continue => {}
                PayloadStep::Done => break,
            }
        }
        assert_eq!(decoded, payload);
    }

    #[test]
    fn s3_escaped_payload_bytes() {
        // S3: OUTPUT_BEGIN, ESC, OUTPUT_END, ESC, ESC, OUTPUT_END decodes to [0x05, 0x06]
        let frame = [OUTPUT_BEGIN, ESCAPE, OUTPUT_END, ESCAPE, ESCAPE, OUTPUT_END];
        let mut prev_was_escape = false;
        let mut decoded = Vec::new();
        for &byte in &frame[1..] {
            match feed_payload_byte(byte, &mut prev_was_escape, &mut decoded) {
                PayloadStep::Continue => {}
                PayloadStep::Done => break,
            }
        }
        assert_eq!(decoded, vec![0x05, 0x06]);
    }

    #[test]
    fn classify_status_terminal_bytes() {
        assert!(matches!(
            classify_status(&[OK]),
            StatusOutcome::Complete {
                result: Ok(Reply::Status(OK)),
                ..
            }
        ));
        assert!(matches!(
            classify_status(&[246]),
            StatusOutcome::Complete {
                result: Err(Error::Device(DeviceErrorKind::UnknownCommand)),
                ..
            }
        ));
    }

    #[test]
    fn s4_device_error_byte() {
        assert!(matches!(
            classify_status(&[0xFE]),
            StatusOutcome::Complete {
                result: Err(Error::Device(DeviceErrorKind::NotInitialised)),
                ..
            }
        ));
    }

    #[test]
    fn unknown_byte_is_unknown_response() {
        assert!(matches!(
            classify_status(&[200]),
            StatusOutcome::Complete {
                result: Err(Error::UnknownResponse(200)),
                ..
            }
        ));
    }
}
