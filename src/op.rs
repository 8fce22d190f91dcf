//! L3 (OP) packet parsing.
//!
//! OP is the fragment-layer protocol: a fixed 5-byte header followed by a
//! payload. Complete L4 datagrams are chopped into a sequence of OP
//! fragments by the ground station and put back together by
//! [`crate::defrag::Defragmenter`].

use crate::error::{Error, Result};

const HEADER_LEN: usize = 5;

/// Fragment carries an intermediate slice of a multi-fragment datagram.
pub const FRAG_DATA_CONT: u8 = 0xc3;
/// Fragment carries the final slice of a datagram (or the whole datagram,
/// if it's also fragment 0).
pub const FRAG_DATA_FINAL: u8 = 0x3c;
/// Fragment carries packet-level FEC parity for the current datagram.
pub const FRAG_FEC: u8 = 0x69;

/// A parsed L3 (OP) packet.
#[derive(Debug, Clone)]
pub struct OpPacket<'a> {
    /// Payload length plus four (see [`OpPacket::payload`]).
    pub length: u8,
    /// Fragment type: [`FRAG_DATA_CONT`], [`FRAG_DATA_FINAL`], or [`FRAG_FEC`].
    pub fragment_type: u8,
    /// Carousel this fragment belongs to.
    pub carousel_id: u8,
    /// Zero-based index of the last fragment in the current datagram.
    pub last_fragment: u8,
    /// Zero-based index of this fragment.
    pub fragment_index: u8,
    /// Fragment payload, `length - 4` bytes.
    pub payload: &'a [u8],
}

impl<'a> OpPacket<'a> {
    /// Parse an OP packet from `data`.
    ///
    /// Fails with [`Error::MalformedShort`] if fewer than 5 bytes remain.
    /// If `data` is shorter than the header declares, the payload is
    /// truncated to what's available rather than failing; upstream length
    /// checks (at L4) are expected to catch the resulting short read.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::MalformedShort {
                got: data.len(),
                want: HEADER_LEN,
            });
        }
        let length = data[0];
        let fragment_type = data[1];
        let carousel_id = data[2];
        let last_fragment = data[3];
        let fragment_index = data[4];
        let payload_len = (length as usize).saturating_sub(4);
        let available = data.len() - HEADER_LEN;
        let payload = &data[HEADER_LEN..HEADER_LEN + payload_len.min(available)];
        Ok(Self {
            length,
            fragment_type,
            carousel_id,
            last_fragment,
            fragment_index,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(length: u8, ftype: u8, carousel: u8, last: u8, idx: u8, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![length, ftype, carousel, last, idx];
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn parses_header_and_payload() {
        let buf = make(4 + 3, FRAG_DATA_CONT, 7, 2, 1, b"abc");
        let p = OpPacket::parse(&buf).unwrap();
        assert_eq!(p.fragment_type, FRAG_DATA_CONT);
        assert_eq!(p.carousel_id, 7);
        assert_eq!(p.last_fragment, 2);
        assert_eq!(p.fragment_index, 1);
        assert_eq!(p.payload, b"abc");
    }

    #[test]
    fn too_short_header_fails() {
        let buf = [1, 2, 3, 4];
        assert!(matches!(
            OpPacket::parse(&buf),
            Err(Error::MalformedShort { got: 4, want: 5 })
        ));
    }

    #[test]
    fn truncated_payload_is_silently_clamped() {
        let buf = make(4 + 10, FRAG_DATA_CONT, 0, 0, 0, b"short");
        let p = OpPacket::parse(&buf).unwrap();
        assert_eq!(p.payload, b"short");
    }
}
