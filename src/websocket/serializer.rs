//! WebSocket frame serialization

use bytes::{BufMut, Bytes, BytesMut};

use crate::models::Frame;
use crate::websocket::mask::apply_mask;
use crate::websocket::parser::{LENGTH_16, LENGTH_64};

/// Number of header bytes needed for a payload of `payload_len` bytes
pub(crate) fn header_len(payload_len: usize, masked: bool) -> usize {
    let length_field = match payload_len {
        0..=125 => 0,
        126..=0xFFFF => 2,
        _ => 8,
    };
    2 + length_field + if masked { 4 } else { 0 }
}

/// Append the wire encoding of `frame` to `dst`
///
/// When `mask_key` is set the MASK bit is raised, the key written and the
/// payload XOR-masked; the frame itself keeps its plain payload.
pub fn encode_frame(frame: &Frame, mask_key: Option<[u8; 4]>, dst: &mut BytesMut) {
    let payload = frame.payload();
    dst.reserve(header_len(payload.len(), mask_key.is_some()) + payload.len());

    let fin = if frame.fin() { 0x80 } else { 0x00 };
    dst.put_u8(fin | frame.frame_type().opcode());

    let mask_bit = if mask_key.is_some() { 0x80 } else { 0x00 };
    match payload.len() {
        len @ 0..=125 => dst.put_u8(mask_bit | len as u8),
        len @ 126..=0xFFFF => {
            dst.put_u8(mask_bit | LENGTH_16);
            dst.put_u16(len as u16);
        }
        len => {
            dst.put_u8(mask_bit | LENGTH_64);
            dst.put_u64(len as u64);
        }
    }

    match mask_key {
        Some(key) => {
            dst.put_slice(&key);
            let start = dst.len();
            dst.put_slice(payload);
            apply_mask(&mut dst[start..], key, 0);
        }
        None => dst.put_slice(payload),
    }
}

/// Serialize a single frame into its own buffer
pub fn serialize(frame: &Frame, mask_key: Option<[u8; 4]>) -> Bytes {
    let mut dst = BytesMut::new();
    encode_frame(frame, mask_key, &mut dst);
    dst.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CloseReason, FrameType};

    #[test]
    fn serializes_unmasked_text() {
        let bytes = serialize(&Frame::text("Hello"), None);
        assert_eq!(&bytes[..], &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn serializes_masked_text_with_given_key() {
        let bytes = serialize(&Frame::text("Hello"), Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(
            &bytes[..],
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn serializes_close_with_code() {
        let bytes = serialize(&Frame::close(&CloseReason::normal()), None);
        assert_eq!(&bytes[..], &[0x88, 0x02, 0x03, 0xe8]);
    }

    #[test]
    fn uses_extended_lengths() {
        let medium = serialize(&Frame::binary(vec![7u8; 300]), None);
        assert_eq!(&medium[..4], &[0x82, 0x7E, 0x01, 0x2C]);
        assert_eq!(medium.len(), 4 + 300);

        let large = serialize(&Frame::binary(vec![7u8; 70_000]), None);
        assert_eq!(&large[..2], &[0x82, 0x7F]);
        assert_eq!(&large[2..10], &70_000u64.to_be_bytes());
        assert_eq!(large.len(), 10 + 70_000);
    }

    #[test]
    fn non_final_fragment_clears_fin() {
        let frame = Frame::new(FrameType::Text, false, b"part".to_vec());
        let bytes = serialize(&frame, None);
        assert_eq!(bytes[0], 0x01);
    }

    #[test]
    fn header_len_accounts_for_mask() {
        assert_eq!(header_len(5, false), 2);
        assert_eq!(header_len(5, true), 6);
        assert_eq!(header_len(126, false), 4);
        assert_eq!(header_len(65_536, true), 14);
    }
}
