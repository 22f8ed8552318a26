//! Input normalization for `send` (§4.6): a single integer byte, a string of
//! raw bytes, or a slice/array of integers or strings, all flatten to the
//! `Bytes` an exchange actually writes to the transport.

use bytes::{Bytes, BytesMut};

/// Converts caller-supplied command input into the raw byte sequence an
/// exchange writes to the wire.
pub trait IntoPayload {
    fn into_payload(self) -> Bytes;
}

impl IntoPayload for u8 {
    fn into_payload(self) -> Bytes {
        Bytes::copy_from_slice(&[self])
    }
}

impl IntoPayload for Bytes {
    fn into_payload(self) -> Bytes {
        self
    }
}

impl IntoPayload for &str {
    fn into_payload(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl IntoPayload for String {
    fn into_payload(self) -> Bytes {
        Bytes::from(self.into_bytes())
    }
}

/// A slice of integers or strings is concatenated (§4.6), one element's
/// payload after another. Covers `&[u8]`, `&[&str]`, `&[String]`, and so on
/// for any element type that itself normalizes to a payload.
impl<T: IntoPayload + Clone> IntoPayload for &[T] {
    fn into_payload(self) -> Bytes {
        let mut buf = BytesMut::new();
        for item in self {
            buf.extend_from_slice(&item.clone().into_payload());
        }
        buf.freeze()
    }
}

/// Same concatenation as the `&[T]` impl, for an owned `Vec` of elements
/// (e.g. `Vec<u8>`, `Vec<String>`).
impl<T: IntoPayload> IntoPayload for Vec<T> {
    fn into_payload(self) -> Bytes {
        let mut buf = BytesMut::new();
        for item in self {
            buf.extend_from_slice(&item.into_payload());
        }
        buf.freeze()
    }
}

/// Same concatenation as the `&[T]` impl, for an array literal (e.g.
/// `[0x1fu8, 0x00]`, `["alpha", "beta"]`).
impl<T: IntoPayload, const N: usize> IntoPayload for [T; N] {
    fn into_payload(self) -> Bytes {
        let mut buf = BytesMut::new();
        for item in self {
            buf.extend_from_slice(&item.into_payload());
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_becomes_one_byte_sequence() {
        assert_eq!(0x1fu8.into_payload(), Bytes::from_static(&[0x1f]));
    }

    #[test]
    fn str_is_raw_bytes() {
        assert_eq!("hi".into_payload(), Bytes::from_static(b"hi"));
    }

    #[test]
    fn array_literal_works() {
        assert_eq!([0x1f, 0x00].into_payload(), Bytes::from_static(&[0x1f, 0x00]));
    }

    #[test]
    fn byte_slice_is_concatenated() {
        let bytes: &[u8] = &[0x1f, 0x00, 0xab];
        assert_eq!(bytes.into_payload(), Bytes::from_static(&[0x1f, 0x00, 0xab]));
    }

    #[test]
    fn string_slice_is_concatenated() {
        let parts: &[&str] = &["al", "pha"];
        assert_eq!(parts.into_payload(), Bytes::from_static(b"alpha"));
    }

    #[test]
    fn vec_of_strings_is_concatenated() {
        let parts = vec!["al".to_string(), "pha".to_string()];
        assert_eq!(parts.into_payload(), Bytes::from_static(b"alpha"));
    }

    #[test]
    fn array_of_string_slices_is_concatenated() {
        assert_eq!(["al", "pha"].into_payload(), Bytes::from_static(b"alpha"));
    }
}
