//! Ethernet envelope stripping.
//!
//! Every carrier (multicast UDP or the replayed line-framed log) yields raw
//! frames that begin with a 14-byte Ethernet-style header: destination MAC,
//! source MAC, big-endian ethertype. Valid ground-station traffic is
//! broadcast (`FF:FF:FF:FF:FF:FF`) with ethertype `0x8FFF`, but that check
//! is diagnostic only — frames with any other dest/ethertype are still
//! forwarded into the L3 parser.

/// Broadcast destination MAC used by the ground station.
pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];
/// Ethertype used by the ground station.
pub const GROUND_STATION_ETHERTYPE: u16 = 0x8fff;

const HEADER_LEN: usize = 14;

/// Strips the 14-byte Ethernet envelope off carrier frames, logging the
/// ground station's source MAC the first time it's seen or when it
/// changes.
#[derive(Default)]
pub struct EthernetStripper {
    last_src: Option<[u8; 6]>,
}

impl EthernetStripper {
    /// Create a new stripper with no source MAC observed yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip the envelope off `frame`, returning the L3 payload.
    ///
    /// Returns `None` (and logs) if `frame` is shorter than 14 bytes.
    pub fn strip<'a>(&mut self, frame: &'a [u8]) -> Option<&'a [u8]> {
        if frame.len() < HEADER_LEN {
            log::warn!(
                "Ethernet frame too short ({} < {HEADER_LEN} bytes), dropping",
                frame.len()
            );
            return None;
        }
        let dst = &frame[0..6];
        let src: [u8; 6] = frame[6..12].try_into().expect("slice is 6 bytes");
        let ethertype = u16::from_be_bytes([frame[12], frame[13]]);

        if dst != BROADCAST_MAC || ethertype != GROUND_STATION_ETHERTYPE {
            log::debug!(
                "non-canonical frame: dst={} ethertype={ethertype:#06x}",
                format_mac(dst)
            );
        }
        if self.last_src != Some(src) {
            log::info!("receiving from ground station MAC {}", format_mac(&src));
            self.last_src = Some(src);
        }
        Some(&frame[HEADER_LEN..])
    }
}

fn format_mac(mac: &[u8]) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(dst: [u8; 6], src: [u8; 6], ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&dst);
        v.extend_from_slice(&src);
        v.extend_from_slice(&ethertype.to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn strips_header_on_canonical_frame() {
        let mut s = EthernetStripper::new();
        let f = frame(BROADCAST_MAC, [1, 2, 3, 4, 5, 6], GROUND_STATION_ETHERTYPE, b"payload");
        assert_eq!(s.strip(&f), Some(&b"payload"[..]));
    }

    #[test]
    fn non_canonical_frame_still_forwarded() {
        let mut s = EthernetStripper::new();
        let f = frame([1; 6], [1, 2, 3, 4, 5, 6], 0x0800, b"payload");
        assert_eq!(s.strip(&f), Some(&b"payload"[..]));
    }

    #[test]
    fn short_frame_is_dropped() {
        let mut s = EthernetStripper::new();
        let short = vec![0u8; 13];
        assert_eq!(s.strip(&short), None);
    }
}
