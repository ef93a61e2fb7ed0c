use bytes::{BufMut, Bytes, BytesMut};

/// Marker prepended to every relayed chunk unless configured otherwise (ASCII `a`).
pub const DEFAULT_MARKER: u8 = b'a';

/// Builds the outbound form of one inbound chunk: the marker byte followed by
/// the chunk verbatim. There is no length field or delimiter.
pub fn tag(marker: u8, payload: &[u8]) -> Bytes {
    let mut message = BytesMut::with_capacity(payload.len() + 1);
    message.put_u8(marker);
    message.extend_from_slice(payload);
    message.freeze()
}
