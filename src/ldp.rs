//! L4 (LDP) datagram parsing and construction.
//!
//! LDP packs a type and length into a 4-byte header, followed by a
//! payload, followed by a 4-byte CRC-32/MPEG-2 trailer covering the whole
//! datagram including the trailer itself (which is why a valid datagram
//! always checksums to a residue of zero).

use crate::crc::crc32_mpeg2;
use crate::error::{Error, Result};

const HEADER_LEN: usize = 4;
const TRAILER_LEN: usize = 4;

/// A parsed, CRC-verified L4 (LDP) datagram.
#[derive(Debug, Clone)]
pub struct LdpPacket<'a> {
    /// The datagram type, used by [`crate::router::Router`] to dispatch.
    pub ldp_type: u8,
    /// Opaque payload bytes, `data[4 .. length - 4)`.
    pub payload: &'a [u8],
}

impl<'a> LdpPacket<'a> {
    /// Parse and CRC-check an LDP datagram out of `data`.
    ///
    /// Trailing bytes beyond the declared `length` are permitted and
    /// ignored (the underlying carrier may pad datagrams).
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(Error::MalformedShort {
                got: data.len(),
                want: HEADER_LEN + TRAILER_LEN,
            });
        }
        let header = u32::from_be_bytes(data[0..4].try_into().unwrap());
        let ldp_type = (header >> 24) as u8;
        let length = (header & 0x00FF_FFFF) as usize;
        if length > data.len() || length < HEADER_LEN + TRAILER_LEN {
            return Err(Error::MalformedLength {
                length,
                available: data.len(),
            });
        }
        if crc32_mpeg2(&data[..length]) != 0 {
            return Err(Error::MalformedCRC);
        }
        let payload = &data[HEADER_LEN..length - TRAILER_LEN];
        Ok(Self { ldp_type, payload })
    }

    /// Build a complete, correctly-checksummed LDP datagram.
    ///
    /// Mainly useful for tests and for any future transmit-side tooling;
    /// the receiver itself only ever parses datagrams.
    #[must_use]
    pub fn build(ldp_type: u8, payload: &[u8]) -> Vec<u8> {
        let length = HEADER_LEN + payload.len() + TRAILER_LEN;
        let header = ((ldp_type as u32) << 24) | (length as u32 & 0x00FF_FFFF);
        let mut out = Vec::with_capacity(length);
        out.extend_from_slice(&header.to_be_bytes());
        out.extend_from_slice(payload);
        let crc = crc32_mpeg2(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = b"hello outernet";
        let datagram = LdpPacket::build(0x69, payload);
        let parsed = LdpPacket::parse(&datagram).unwrap();
        assert_eq!(parsed.ldp_type, 0x69);
        assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn bit_flip_in_payload_fails_crc() {
        let mut datagram = LdpPacket::build(0x18, b"some data block");
        let idx = HEADER_LEN;
        datagram[idx] ^= 0x01;
        assert!(matches!(
            LdpPacket::parse(&datagram),
            Err(Error::MalformedCRC)
        ));
    }

    #[test]
    fn too_short_fails() {
        assert!(matches!(
            LdpPacket::parse(&[1, 2, 3]),
            Err(Error::MalformedShort { .. })
        ));
    }

    #[test]
    fn length_beyond_buffer_fails() {
        // header claims length 100 but buffer is short.
        let mut data = vec![0x69, 0x00, 0x00, 100];
        data.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            LdpPacket::parse(&data),
            Err(Error::MalformedLength { .. })
        ));
    }

    #[test]
    fn length_too_small_for_header_and_trailer_fails_without_panicking() {
        // length field claims 6, which is less than header+trailer (8); must
        // be rejected rather than underflow the payload slice bounds.
        let mut data = vec![0x69, 0x00, 0x00, 6];
        data.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            LdpPacket::parse(&data),
            Err(Error::MalformedLength { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut datagram = LdpPacket::build(0x81, b"tlv");
        datagram.extend_from_slice(&[0xAA; 5]);
        let parsed = LdpPacket::parse(&datagram).unwrap();
        assert_eq!(parsed.payload, b"tlv");
    }
}
