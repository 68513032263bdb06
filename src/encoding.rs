//! Primitive wire codec.
//!
//! All multi-byte integers on the wire are big-endian. Strings and binary
//! data carry a 16-bit length prefix. The variable byte integer is
//! base-128 little-endian with bit 7 of each byte as a continuation flag,
//! at most four bytes (maximum value 268 435 455).

use crate::error::{MqttError, Result};

use bytes::{Buf, BufMut, Bytes};

pub const VARIABLE_INT_MAX: u32 = 268_435_455;

/// Encodes `value` as a variable byte integer.
pub fn encode_variable_int<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    if value > VARIABLE_INT_MAX {
        return Err(MqttError::MalformedPacket(format!(
            "Variable byte integer {value} exceeds maximum {VARIABLE_INT_MAX}"
        )));
    }

    let mut remaining = value;
    loop {
        let mut digit = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            digit |= 0x80;
        }
        buf.put_u8(digit);
        if remaining == 0 {
            return Ok(());
        }
    }
}

/// Decodes a variable byte integer, consuming 1-4 bytes.
pub fn decode_variable_int<B: Buf>(buf: &mut B) -> Result<u32> {
    let mut value: u32 = 0;
    let mut shift = 0u32;

    for _ in 0..4 {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Insufficient data for variable byte integer".to_string(),
            ));
        }

        let digit = buf.get_u8();
        value |= u32::from(digit & 0x7F) << shift;

        if digit & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }

    Err(MqttError::MalformedPacket(
        "Variable byte integer exceeds four bytes".to_string(),
    ))
}

/// Number of bytes `encode_variable_int` produces for `value`.
#[must_use]
pub fn variable_int_len(value: u32) -> usize {
    match value {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encodes a UTF-8 string with its 16-bit length prefix.
pub fn encode_string<B: BufMut>(buf: &mut B, value: &str) -> Result<()> {
    let len =
        u16::try_from(value.len()).map_err(|_| MqttError::StringTooLong(value.len()))?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Decodes a length-prefixed UTF-8 string, reading exactly the advertised
/// length.
pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    let data = decode_binary(buf)?;
    String::from_utf8(data.to_vec())
        .map_err(|_| MqttError::MalformedPacket("String is not valid UTF-8".to_string()))
}

#[must_use]
pub fn string_len(value: &str) -> usize {
    2 + value.len()
}

/// Encodes binary data with its 16-bit length prefix.
pub fn encode_binary<B: BufMut>(buf: &mut B, value: &[u8]) -> Result<()> {
    let len =
        u16::try_from(value.len()).map_err(|_| MqttError::StringTooLong(value.len()))?;
    buf.put_u16(len);
    buf.put_slice(value);
    Ok(())
}

/// Decodes length-prefixed binary data.
pub fn decode_binary<B: Buf>(buf: &mut B) -> Result<Bytes> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Insufficient data for length prefix".to_string(),
        ));
    }

    let len = usize::from(buf.get_u16());
    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Length prefix claims {len} bytes but only {} remain",
            buf.remaining()
        )));
    }

    Ok(buf.copy_to_bytes(len))
}

#[must_use]
pub fn binary_len(value: &[u8]) -> usize {
    2 + value.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    fn round_trip_variable_int(value: u32) -> (Vec<u8>, u32) {
        let mut buf = BytesMut::new();
        encode_variable_int(&mut buf, value).unwrap();
        let encoded = buf.to_vec();
        let decoded = decode_variable_int(&mut buf).unwrap();
        (encoded, decoded)
    }

    #[test]
    fn test_variable_int_boundaries() {
        // Canonical sizes at every boundary of the 1-4 byte encodings.
        for (value, len) in [
            (0u32, 1usize),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_151, 3),
            (2_097_152, 4),
            (268_435_455, 4),
        ] {
            let (encoded, decoded) = round_trip_variable_int(value);
            assert_eq!(encoded.len(), len, "wrong length for {value}");
            assert_eq!(decoded, value);
            assert_eq!(variable_int_len(value), len);
        }
    }

    #[test]
    fn test_variable_int_encode_overflow() {
        let mut buf = BytesMut::new();
        assert!(encode_variable_int(&mut buf, 268_435_456).is_err());
    }

    #[test]
    fn test_variable_int_decode_five_byte_continuation() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0xFF, 0xFF, 0x01][..]);
        assert!(decode_variable_int(&mut buf).is_err());
    }

    #[test]
    fn test_variable_int_decode_truncated() {
        let mut buf = BytesMut::from(&[0x80][..]);
        assert!(decode_variable_int(&mut buf).is_err());
    }

    #[test]
    fn test_string_round_trip() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "sensors/1/temp").unwrap();
        assert_eq!(buf.len(), string_len("sensors/1/temp"));
        assert_eq!(decode_string(&mut buf).unwrap(), "sensors/1/temp");
    }

    #[test]
    fn test_empty_string_is_legal() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "").unwrap();
        assert_eq!(buf.len(), 2);
        assert_eq!(decode_string(&mut buf).unwrap(), "");
    }

    #[test]
    fn test_string_too_long() {
        let long = "x".repeat(65_536);
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_string(&mut buf, &long),
            Err(MqttError::StringTooLong(65_536))
        ));
    }

    #[test]
    fn test_binary_short_claim_rejected() {
        // Length prefix claims more bytes than remain.
        let mut buf = BytesMut::from(&[0x00, 0x05, 0x01, 0x02][..]);
        assert!(decode_binary(&mut buf).is_err());
    }

    #[test]
    fn test_string_invalid_utf8_rejected() {
        let mut buf = BytesMut::from(&[0x00, 0x02, 0xC3, 0x28][..]);
        assert!(decode_string(&mut buf).is_err());
    }

    proptest! {
        #[test]
        fn prop_variable_int_round_trip(value in 0u32..=VARIABLE_INT_MAX) {
            let (encoded, decoded) = round_trip_variable_int(value);
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(encoded.len(), variable_int_len(value));
        }

        #[test]
        fn prop_string_round_trip(s in "\\PC{0,256}") {
            let mut buf = BytesMut::new();
            encode_string(&mut buf, &s).unwrap();
            prop_assert_eq!(buf.len(), string_len(&s));
            prop_assert_eq!(decode_string(&mut buf).unwrap(), s);
        }

        #[test]
        fn prop_binary_round_trip(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut buf = BytesMut::new();
            encode_binary(&mut buf, &data).unwrap();
            prop_assert_eq!(buf.len(), binary_len(&data));
            prop_assert_eq!(decode_binary(&mut buf).unwrap().to_vec(), data);
        }
    }
}
