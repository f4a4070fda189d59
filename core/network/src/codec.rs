use std::io;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Every gossip message carries its topic as a fixed-size leading payload
/// (§6), so recipients can dispatch before touching the variable-length
/// body.
pub const TOPIC_SIZE: usize = 16;

fn pad_len(payload_len: usize) -> usize {
    (4 - payload_len % 4) % 4
}

pub fn pad_topic(topic: &str) -> [u8; TOPIC_SIZE] {
    let mut buf = [0u8; TOPIC_SIZE];
    let bytes = topic.as_bytes();
    let len = bytes.len().min(TOPIC_SIZE);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

pub fn unpad_topic(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or_else(|| buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// The framed `TransportData` message of §4.B:
///
/// ```text
/// uint32_le  num_payloads
/// for each payload:
///   uint32_le  payload_size
///   byte[]     payload_bytes
///   byte[pad]  zero padding to 4-byte boundary
/// ```
///
/// `num_payloads == 0` is a keep-alive. A decoded gossip message is exactly
/// two payloads: the padded topic, then the message body.
#[derive(Debug, Default)]
pub struct TransportCodec;

impl Decoder for TransportCodec {
    type Item = Vec<Bytes>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let num_payloads = LittleEndian::read_u32(&src[0..4]) as usize;

        let mut offset = 4;
        let mut payloads = Vec::with_capacity(num_payloads);
        for _ in 0..num_payloads {
            if src.len() < offset + 4 {
                return Ok(None);
            }
            let len = LittleEndian::read_u32(&src[offset..offset + 4]) as usize;
            offset += 4;
            let pad = pad_len(len);
            if src.len() < offset + len + pad {
                return Ok(None);
            }
            payloads.push(Bytes::copy_from_slice(&src[offset..offset + len]));
            offset += len + pad;
        }

        src.advance(offset);
        Ok(Some(payloads))
    }
}

impl Encoder for TransportCodec {
    type Item = Vec<Bytes>;
    type Error = io::Error;

    fn encode(&mut self, item: Vec<Bytes>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u32_le(item.len() as u32);
        for payload in item {
            dst.put_u32_le(payload.len() as u32);
            dst.extend_from_slice(&payload);
            dst.extend(std::iter::repeat(0u8).take(pad_len(payload.len())));
        }
        Ok(())
    }
}

pub fn keep_alive_frame() -> Vec<Bytes> {
    Vec::new()
}

pub fn encode_message(topic: &str, data: Bytes) -> Vec<Bytes> {
    vec![Bytes::copy_from_slice(&pad_topic(topic)), data]
}

pub fn decode_message(mut payloads: Vec<Bytes>) -> Option<(String, Bytes)> {
    if payloads.len() != 2 {
        return None;
    }
    let data = payloads.pop().unwrap();
    let topic_bytes = payloads.pop().unwrap();
    Some((unpad_topic(&topic_bytes), data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_to_bytes(item: Vec<Bytes>) -> BytesMut {
        let mut dst = BytesMut::new();
        TransportCodec::default().encode(item, &mut dst).unwrap();
        dst
    }

    #[test]
    fn keep_alive_frame_is_four_bytes_of_zero() {
        let encoded = encode_to_bytes(keep_alive_frame());
        assert_eq!(encoded.len(), 4);
        assert_eq!(&encoded[..], &[0u8, 0, 0, 0]);
    }

    #[test]
    fn round_trips_topic_and_message() {
        let frame = encode_message("block-commit", Bytes::from_static(b"hello"));
        let mut encoded = encode_to_bytes(frame);
        let decoded = TransportCodec::default()
            .decode(&mut encoded)
            .unwrap()
            .unwrap();
        let (topic, data) = decode_message(decoded).unwrap();
        assert_eq!(topic, "block-commit");
        assert_eq!(data, Bytes::from_static(b"hello"));
    }

    #[test]
    fn decode_returns_none_on_partial_frame() {
        let frame = encode_message("sync", Bytes::from_static(b"payload"));
        let mut encoded = encode_to_bytes(frame);
        encoded.truncate(encoded.len() - 2);
        assert!(TransportCodec::default().decode(&mut encoded).unwrap().is_none());
    }

    #[test]
    fn payload_is_padded_to_four_byte_boundary() {
        let frame = encode_message("t", Bytes::from_static(b"123"));
        let encoded = encode_to_bytes(frame);
        // 4 (num_payloads) + 4+16 (topic, already 16 => no pad) + 4+3+1 (pad)
        assert_eq!(encoded.len(), 4 + 4 + 16 + 4 + 3 + 1);
    }
}
