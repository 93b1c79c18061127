use super::*;

fn roundtrip<T: Encode + Decode + PartialEq + std::fmt::Debug>(value: T) {
    let bytes = encode_to_vec(&value).expect("encode");
    let (decoded, consumed) = decode_from_slice::<T>(&bytes).expect("decode");
    assert_eq!(consumed, bytes.len());
    assert_eq!(decoded, value);
}

#[test]
fn primitives_roundtrip() {
    roundtrip(0u8);
    roundtrip(255u8);
    roundtrip(0u32);
    roundtrip(u32::MAX);
    roundtrip(0u64);
    roundtrip(u64::MAX);
    roundtrip(i64::MIN);
    roundtrip(i64::MAX);
    roundtrip(true);
    roundtrip(false);
}

#[test]
fn integers_are_big_endian() {
    let bytes = encode_to_vec(&0x01_02_03_04u32).unwrap();
    assert_eq!(bytes, vec![0x01, 0x02, 0x03, 0x04]);

    let bytes = encode_to_vec(&1i64).unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 1]);
}

#[test]
fn strings_roundtrip_multibyte_utf8() {
    roundtrip("hello".to_string());
    roundtrip(String::new());
    roundtrip("héllo wörld 🎉".to_string());
}

#[test]
fn bytes_roundtrip() {
    roundtrip(Vec::<u8>::new());
    roundtrip(vec![1u8, 2, 3, 4, 5]);
}

#[test]
fn option_roundtrip() {
    roundtrip(Some(42u32));
    roundtrip(None::<u32>);
    roundtrip(Some("value".to_string()));
    roundtrip(None::<String>);
}

#[test]
fn decode_rejects_truncated_buffer() {
    let err = u32::decode_from(&[1, 2]).unwrap_err();
    assert!(matches!(err, CodecError::UnexpectedEof { .. }));
}

#[test]
fn decode_rejects_invalid_bool() {
    let err = bool::decode_from(&[2]).unwrap_err();
    assert!(matches!(err, CodecError::InvalidBool(2)));
}

#[test]
fn decode_rejects_invalid_utf8() {
    let mut buf = Vec::new();
    3u32.encode_to(&mut buf).unwrap();
    buf.extend_from_slice(&[0xFF, 0xFE, 0xFD]);
    let err = String::decode_from(&buf).unwrap_err();
    assert!(matches!(err, CodecError::InvalidUtf8(_)));
}

#[test]
fn decode_rejects_oversized_length_prefix() {
    let mut buf = Vec::new();
    (MAX_BYTE_LEN + 1).encode_to(&mut buf).unwrap();
    let err = Vec::<u8>::decode_from(&buf).unwrap_err();
    assert!(matches!(err, CodecError::LengthOverflow(_)));
}

#[test]
fn sequential_decode_advances_offset() {
    let mut buf = Vec::new();
    1u32.encode_to(&mut buf).unwrap();
    2u32.encode_to(&mut buf).unwrap();
    let (a, n1) = u32::decode_from(&buf).unwrap();
    let (b, n2) = u32::decode_from(&buf[n1..]).unwrap();
    assert_eq!(a, 1);
    assert_eq!(b, 2);
    assert_eq!(n1 + n2, buf.len());
}
