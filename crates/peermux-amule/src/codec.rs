//! EC frame and tagged-value-tree codec.
//!
//! A frame is an 8-byte header (`flags: u32`, `payload_len: u32`, network
//! order) followed by `opcode: u8`, `tag_count: u16`, and the tag tree.
//! Each tag carries a 15-bit name (shifted left one bit on the wire, low
//! bit flags nested children), a value-type byte, and a 32-bit length
//! covering the nested block plus the value bytes. Unknown value types are
//! preserved byte-for-byte so the codec never drops data, and
//! `encode(decode(x)) == x` holds for every valid frame.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{EcError, EcResult};
use crate::tags::{FLAGS_DEFAULT, value_type};

/// Upper bound on a single frame's payload.
const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Typed tag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcValue {
    /// Unsigned 8-bit integer.
    U8(u8),
    /// Unsigned 16-bit integer.
    U16(u16),
    /// Unsigned 32-bit integer.
    U32(u32),
    /// Unsigned 64-bit integer.
    U64(u64),
    /// UTF-8 string (NUL-terminated on the wire).
    String(String),
    /// IPv4 endpoint.
    Ipv4 {
        /// Address octets.
        ip: [u8; 4],
        /// TCP/UDP port.
        port: u16,
    },
    /// 16-byte ED2K hash.
    Hash([u8; 16]),
    /// Opaque bytes under the custom type.
    Custom(Vec<u8>),
    /// Bytes under a type this codec does not know; preserved raw.
    Unknown {
        /// Original type byte.
        type_id: u8,
        /// Raw value bytes.
        bytes: Vec<u8>,
    },
}

impl EcValue {
    const fn type_id(&self) -> u8 {
        match self {
            Self::U8(_) => value_type::U8,
            Self::U16(_) => value_type::U16,
            Self::U32(_) => value_type::U32,
            Self::U64(_) => value_type::U64,
            Self::String(_) => value_type::STRING,
            Self::Ipv4 { .. } => value_type::IPV4,
            Self::Hash(_) => value_type::HASH16,
            Self::Custom(_) => value_type::CUSTOM,
            Self::Unknown { type_id, .. } => *type_id,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) => 4,
            Self::U64(_) => 8,
            Self::String(s) => s.len() + 1,
            Self::Ipv4 { .. } => 6,
            Self::Hash(_) => 16,
            Self::Custom(bytes) | Self::Unknown { bytes, .. } => bytes.len(),
        }
    }

    fn write(&self, dst: &mut BytesMut) {
        match self {
            Self::U8(v) => dst.put_u8(*v),
            Self::U16(v) => dst.put_u16(*v),
            Self::U32(v) => dst.put_u32(*v),
            Self::U64(v) => dst.put_u64(*v),
            Self::String(s) => {
                dst.put_slice(s.as_bytes());
                dst.put_u8(0);
            }
            Self::Ipv4 { ip, port } => {
                dst.put_slice(ip);
                dst.put_u16(*port);
            }
            Self::Hash(hash) => dst.put_slice(hash),
            Self::Custom(bytes) | Self::Unknown { bytes, .. } => dst.put_slice(bytes),
        }
    }

    fn read(type_id: u8, bytes: &[u8]) -> EcResult<Self> {
        let exact = |want: usize| {
            if bytes.len() == want {
                Ok(())
            } else {
                Err(EcError::frame(format!(
                    "value type {type_id:#04x} expects {want} bytes, got {}",
                    bytes.len()
                )))
            }
        };
        match type_id {
            value_type::U8 => {
                exact(1)?;
                Ok(Self::U8(bytes[0]))
            }
            value_type::U16 => {
                exact(2)?;
                Ok(Self::U16(u16::from_be_bytes([bytes[0], bytes[1]])))
            }
            value_type::U32 => {
                exact(4)?;
                let mut buf = [0_u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Self::U32(u32::from_be_bytes(buf)))
            }
            value_type::U64 => {
                exact(8)?;
                let mut buf = [0_u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Self::U64(u64::from_be_bytes(buf)))
            }
            value_type::STRING => {
                let Some((&0, body)) = bytes.split_last() else {
                    return Err(EcError::frame("string value lacks NUL terminator"));
                };
                let text = std::str::from_utf8(body)
                    .map_err(|_| EcError::frame("string value is not UTF-8"))?;
                Ok(Self::String(text.to_string()))
            }
            value_type::IPV4 => {
                exact(6)?;
                let mut ip = [0_u8; 4];
                ip.copy_from_slice(&bytes[..4]);
                Ok(Self::Ipv4 {
                    ip,
                    port: u16::from_be_bytes([bytes[4], bytes[5]]),
                })
            }
            value_type::HASH16 => {
                exact(16)?;
                let mut hash = [0_u8; 16];
                hash.copy_from_slice(bytes);
                Ok(Self::Hash(hash))
            }
            value_type::CUSTOM => Ok(Self::Custom(bytes.to_vec())),
            other => Ok(Self::Unknown {
                type_id: other,
                bytes: bytes.to_vec(),
            }),
        }
    }
}

/// One node of the tagged value tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcTag {
    /// 15-bit tag name.
    pub name: u16,
    /// Tag value.
    pub value: EcValue,
    /// Nested child tags.
    pub children: Vec<EcTag>,
}

impl EcTag {
    /// Leaf tag constructor.
    #[must_use]
    pub const fn new(name: u16, value: EcValue) -> Self {
        Self {
            name,
            value,
            children: Vec::new(),
        }
    }

    /// Nested tag constructor.
    #[must_use]
    pub fn with_children(name: u16, value: EcValue, children: Vec<Self>) -> Self {
        Self {
            name,
            value,
            children,
        }
    }

    /// Shorthand for a string leaf.
    #[must_use]
    pub fn string(name: u16, value: impl Into<String>) -> Self {
        Self::new(name, EcValue::String(value.into()))
    }

    /// Shorthand for a u8 leaf.
    #[must_use]
    pub const fn u8(name: u16, value: u8) -> Self {
        Self::new(name, EcValue::U8(value))
    }

    /// Shorthand for a u32 leaf.
    #[must_use]
    pub const fn u32(name: u16, value: u32) -> Self {
        Self::new(name, EcValue::U32(value))
    }

    /// Shorthand for a u64 leaf.
    #[must_use]
    pub const fn u64(name: u16, value: u64) -> Self {
        Self::new(name, EcValue::U64(value))
    }

    /// Shorthand for a hash leaf.
    #[must_use]
    pub const fn hash(name: u16, value: [u8; 16]) -> Self {
        Self::new(name, EcValue::Hash(value))
    }

    /// Shorthand for a custom-bytes leaf.
    #[must_use]
    pub const fn custom(name: u16, bytes: Vec<u8>) -> Self {
        Self::new(name, EcValue::Custom(bytes))
    }

    /// First child with the given name.
    #[must_use]
    pub fn child(&self, name: u16) -> Option<&Self> {
        self.children.iter().find(|tag| tag.name == name)
    }

    /// Integer value widened to u64, across all integer widths.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match &self.value {
            EcValue::U8(v) => Some(u64::from(*v)),
            EcValue::U16(v) => Some(u64::from(*v)),
            EcValue::U32(v) => Some(u64::from(*v)),
            EcValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// String value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            EcValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Hash value.
    #[must_use]
    pub const fn as_hash(&self) -> Option<&[u8; 16]> {
        match &self.value {
            EcValue::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    /// Custom-bytes value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            EcValue::Custom(bytes) => Some(bytes),
            _ => None,
        }
    }

    fn encoded_len(&self) -> usize {
        // name + type + len + optional child block + value bytes.
        2 + 1 + 4 + self.children_block_len() + self.value.encoded_len()
    }

    fn children_block_len(&self) -> usize {
        if self.children.is_empty() {
            0
        } else {
            2 + self
                .children
                .iter()
                .map(EcTag::encoded_len)
                .sum::<usize>()
        }
    }

    fn write(&self, dst: &mut BytesMut) -> EcResult<()> {
        if self.name > 0x7fff {
            return Err(EcError::frame(format!(
                "tag name {:#06x} exceeds 15 bits",
                self.name
            )));
        }
        let has_children = u16::from(!self.children.is_empty());
        dst.put_u16((self.name << 1) | has_children);
        dst.put_u8(self.value.type_id());
        let len = self.children_block_len() + self.value.encoded_len();
        dst.put_u32(
            u32::try_from(len).map_err(|_| EcError::frame("tag length exceeds u32 range"))?,
        );
        if !self.children.is_empty() {
            dst.put_u16(
                u16::try_from(self.children.len())
                    .map_err(|_| EcError::frame("child count exceeds u16 range"))?,
            );
            for child in &self.children {
                child.write(dst)?;
            }
        }
        self.value.write(dst);
        Ok(())
    }

    fn read(src: &mut &[u8]) -> EcResult<Self> {
        let raw_name = take_u16(src)?;
        let type_id = take_u8(src)?;
        let len = take_u32(src)? as usize;
        if src.len() < len {
            return Err(EcError::frame(format!(
                "tag body wants {len} bytes, {} remain",
                src.len()
            )));
        }
        let (mut body, rest) = src.split_at(len);
        *src = rest;

        let mut children = Vec::new();
        if raw_name & 1 == 1 {
            let count = take_u16(&mut body)?;
            for _ in 0..count {
                children.push(Self::read(&mut body)?);
            }
        }
        let value = EcValue::read(type_id, body)?;
        Ok(Self {
            name: raw_name >> 1,
            value,
            children,
        })
    }
}

/// One decoded EC frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcFrame {
    /// Command or response opcode.
    pub opcode: u8,
    /// Top-level tags.
    pub tags: Vec<EcTag>,
}

impl EcFrame {
    /// Construct a frame.
    #[must_use]
    pub const fn new(opcode: u8, tags: Vec<EcTag>) -> Self {
        Self { opcode, tags }
    }

    /// First top-level tag with the given name.
    #[must_use]
    pub fn tag(&self, name: u16) -> Option<&EcTag> {
        self.tags.iter().find(|tag| tag.name == name)
    }

    /// All top-level tags with the given name.
    pub fn tags_named(&self, name: u16) -> impl Iterator<Item = &EcTag> {
        self.tags.iter().filter(move |tag| tag.name == name)
    }

    /// Encode the frame payload (opcode + tag tree), without the header.
    ///
    /// # Errors
    ///
    /// Returns an error when a tag violates wire limits.
    pub fn encode_payload(&self) -> EcResult<BytesMut> {
        let mut dst = BytesMut::new();
        dst.put_u8(self.opcode);
        dst.put_u16(
            u16::try_from(self.tags.len())
                .map_err(|_| EcError::frame("tag count exceeds u16 range"))?,
        );
        for tag in &self.tags {
            tag.write(&mut dst)?;
        }
        Ok(dst)
    }

    /// Decode a frame payload (opcode + tag tree), without the header.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload violates the wire grammar.
    pub fn decode_payload(mut payload: &[u8]) -> EcResult<Self> {
        let opcode = take_u8(&mut payload)?;
        let count = take_u16(&mut payload)?;
        let mut tags = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            tags.push(EcTag::read(&mut payload)?);
        }
        if !payload.is_empty() {
            return Err(EcError::frame(format!(
                "{} trailing bytes after tag tree",
                payload.len()
            )));
        }
        Ok(Self { opcode, tags })
    }
}

/// tokio-util codec framing EC payloads over a byte stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcCodec;

impl Decoder for EcCodec {
    type Item = EcFrame;
    type Error = EcError;

    fn decode(&mut self, src: &mut BytesMut) -> EcResult<Option<EcFrame>> {
        if src.len() < 8 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(EcError::frame(format!("frame length {len} exceeds cap")));
        }
        if src.len() < 8 + len {
            src.reserve(8 + len - src.len());
            return Ok(None);
        }
        src.advance(8);
        let payload = src.split_to(len);
        EcFrame::decode_payload(&payload).map(Some)
    }
}

impl Encoder<EcFrame> for EcCodec {
    type Error = EcError;

    fn encode(&mut self, frame: EcFrame, dst: &mut BytesMut) -> EcResult<()> {
        let payload = frame.encode_payload()?;
        dst.put_u32(FLAGS_DEFAULT);
        dst.put_u32(
            u32::try_from(payload.len())
                .map_err(|_| EcError::frame("payload exceeds u32 range"))?,
        );
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

fn take_u8(src: &mut &[u8]) -> EcResult<u8> {
    let (&first, rest) = src
        .split_first()
        .ok_or_else(|| EcError::frame("unexpected end of payload"))?;
    *src = rest;
    Ok(first)
}

fn take_u16(src: &mut &[u8]) -> EcResult<u16> {
    if src.len() < 2 {
        return Err(EcError::frame("unexpected end of payload"));
    }
    let (head, rest) = src.split_at(2);
    *src = rest;
    Ok(u16::from_be_bytes([head[0], head[1]]))
}

fn take_u32(src: &mut &[u8]) -> EcResult<u32> {
    if src.len() < 4 {
        return Err(EcError::frame("unexpected end of payload"));
    }
    let (head, rest) = src.split_at(4);
    *src = rest;
    Ok(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{op, tag};

    fn sample_frame() -> EcFrame {
        EcFrame::new(
            op::DLOAD_QUEUE,
            vec![EcTag::with_children(
                tag::ITEM,
                EcValue::Custom(Vec::new()),
                vec![
                    EcTag::hash(tag::ITEM_HASH, [0xab; 16]),
                    EcTag::string(tag::ITEM_NAME, "File.iso"),
                    EcTag::u64(tag::ITEM_SIZE_FULL, 1_048_576),
                    EcTag::u8(tag::ITEM_STATUS, 0),
                    EcTag::custom(tag::ITEM_PART_STATUS, vec![1, 1, 3]),
                ],
            )],
        )
    }

    #[test]
    fn payload_round_trip_is_identity() {
        let frame = sample_frame();
        let payload = frame.encode_payload().expect("encode");
        let decoded = EcFrame::decode_payload(&payload).expect("decode");
        assert_eq!(decoded, frame);
        let re_encoded = decoded.encode_payload().expect("re-encode");
        assert_eq!(re_encoded, payload);
    }

    #[test]
    fn unknown_value_types_are_preserved() {
        let frame = EcFrame::new(
            op::STATS,
            vec![EcTag::new(
                0x70,
                EcValue::Unknown {
                    type_id: 0x7f,
                    bytes: vec![1, 2, 3, 4],
                },
            )],
        );
        let payload = frame.encode_payload().expect("encode");
        let decoded = EcFrame::decode_payload(&payload).expect("decode");
        assert_eq!(decoded, frame);
        assert_eq!(decoded.encode_payload().expect("re-encode"), payload);
    }

    #[test]
    fn nested_lookup_helpers() {
        let frame = sample_frame();
        let item = frame.tag(tag::ITEM).expect("item tag");
        assert_eq!(
            item.child(tag::ITEM_NAME).and_then(EcTag::as_str),
            Some("File.iso")
        );
        assert_eq!(
            item.child(tag::ITEM_SIZE_FULL).and_then(EcTag::as_u64),
            Some(1_048_576)
        );
        assert_eq!(
            item.child(tag::ITEM_HASH).and_then(EcTag::as_hash),
            Some(&[0xab; 16])
        );
        assert!(item.child(tag::ITEM_GAP_STATUS).is_none());
    }

    #[test]
    fn integer_widths_widen_to_u64() {
        assert_eq!(EcTag::u8(1, 7).as_u64(), Some(7));
        assert_eq!(EcTag::new(1, EcValue::U16(7)).as_u64(), Some(7));
        assert_eq!(EcTag::u32(1, 7).as_u64(), Some(7));
        assert_eq!(EcTag::u64(1, 7).as_u64(), Some(7));
        assert_eq!(EcTag::string(1, "7").as_u64(), None);
    }

    #[test]
    fn truncated_payload_is_a_frame_error() {
        let frame = sample_frame();
        let payload = frame.encode_payload().expect("encode");
        let truncated = &payload[..payload.len() - 3];
        assert!(EcFrame::decode_payload(truncated).is_err());
    }

    #[test]
    fn stream_codec_frames_and_reassembles() {
        let frame = sample_frame();
        let mut codec = EcCodec;
        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).expect("encode");

        // Feed the bytes in two chunks; the decoder must wait for the rest.
        let split_at = buf.len() / 2;
        let mut partial = BytesMut::from(&buf[..split_at]);
        assert!(codec.decode(&mut partial).expect("partial decode").is_none());
        partial.extend_from_slice(&buf[split_at..]);
        let decoded = codec
            .decode(&mut partial)
            .expect("full decode")
            .expect("frame");
        assert_eq!(decoded, frame);
        assert!(partial.is_empty());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut codec = EcCodec;
        let mut buf = BytesMut::new();
        buf.put_u32(FLAGS_DEFAULT);
        buf.put_u32(u32::MAX);
        buf.put_slice(&[0; 16]);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn string_requires_nul_and_utf8() {
        // String tag whose body lacks the NUL terminator.
        let mut payload = BytesMut::new();
        payload.put_u8(op::STATS);
        payload.put_u16(1);
        payload.put_u16(tag::MESSAGE << 1);
        payload.put_u8(crate::tags::value_type::STRING);
        payload.put_u32(2);
        payload.put_slice(b"ab");
        assert!(EcFrame::decode_payload(&payload).is_err());
    }
}
