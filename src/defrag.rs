//! L3 defragmentation: reassembling whole L4 datagrams out of a stream of
//! OP fragments, invoking packet-level FEC recovery when fragments were
//! lost in transit.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::frag_fec;
use crate::op::{FRAG_DATA_CONT, FRAG_DATA_FINAL, FRAG_FEC, OpPacket};

/// Accumulator for the in-flight fragments of one carousel id.
#[derive(Default)]
struct PartialDatagram {
    /// Fragment index -> payload. Indices `0..frag_count` are data,
    /// `frag_count..frag_count+fec_count` are FEC.
    fragments: HashMap<usize, Vec<u8>>,
    frag_recv: usize,
    fec_recv: usize,
    frag_size: Option<usize>,
    frag_count: Option<usize>,
    fec_count: Option<usize>,
    /// Expected index of the next data fragment.
    next_index: usize,
}

impl PartialDatagram {
    fn is_complete(&self) -> bool {
        match self.frag_count {
            Some(frag_count) => self.frag_recv + self.fec_recv >= frag_count,
            None => false,
        }
    }

    fn insert_data(&mut self, index: usize, payload: &[u8]) {
        if self.fragments.contains_key(&index) {
            return; // duplicate, ignore
        }
        self.fragments.insert(index, payload.to_vec());
        self.frag_recv += 1;
    }

    fn insert_fec(&mut self, index: usize, payload: &[u8]) {
        if self.fragments.contains_key(&index) {
            return; // duplicate, ignore
        }
        self.fragments.insert(index, payload.to_vec());
        self.fec_recv += 1;
    }

    fn decode(&self) -> Result<Vec<u8>> {
        let frag_count = self.frag_count.expect("decode called before frag_count known");
        if self.frag_recv == frag_count {
            let mut out = Vec::new();
            for i in 0..frag_count {
                out.extend_from_slice(
                    self.fragments
                        .get(&i)
                        .expect("frag_recv counts guarantee every data index present"),
                );
            }
            return Ok(out);
        }

        let fec_count = self.fec_count.unwrap_or(0);
        let frag_size = self.frag_size.unwrap_or(0);
        let n = frag_count + fec_count;
        frag_fec::recover(frag_count, n, frag_size, &self.fragments)
    }
}

/// Groups OP fragments by carousel id and reassembles L4 datagrams.
#[derive(Default)]
pub struct Defragmenter {
    partials: HashMap<u8, PartialDatagram>,
    /// Carousel ids seen at least once, purely to avoid re-logging the
    /// same "new carousel" message on every fragment.
    seen: HashSet<u8>,
}

impl Defragmenter {
    /// Create a new, empty defragmenter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one OP fragment. Returns a complete L4 datagram if this
    /// fragment completed one, `None` otherwise.
    pub fn push(&mut self, packet: &OpPacket<'_>) -> Option<Vec<u8>> {
        match packet.fragment_type {
            FRAG_DATA_FINAL | FRAG_DATA_CONT => self.push_data(packet),
            FRAG_FEC => self.push_fec(packet),
            other => {
                log::debug!("unknown OP fragment type {other:#04x}, dropping");
                None
            }
        }
    }

    fn push_data(&mut self, packet: &OpPacket<'_>) -> Option<Vec<u8>> {
        if packet.fragment_type == FRAG_DATA_FINAL && packet.fragment_index == 0 {
            return Some(packet.payload.to_vec());
        }

        if self.seen.insert(packet.carousel_id) {
            log::debug!("new carousel id {}", packet.carousel_id);
        }

        let partial = self.partials.entry(packet.carousel_id).or_default();
        let fragment_index = packet.fragment_index as usize;

        if fragment_index < partial.next_index {
            log::debug!(
                "carousel {}: retrograde fragment index {} < {}, resetting",
                packet.carousel_id,
                fragment_index,
                partial.next_index
            );
            *partial = PartialDatagram::default();
        }

        if partial.frag_size.is_none() {
            partial.frag_size = Some(packet.length as usize - 4);
        }
        if partial.frag_count.is_none() {
            partial.frag_count = Some(packet.last_fragment as usize + 1);
        }
        let frag_count = partial.frag_count.expect("just set above");
        if fragment_index >= frag_count {
            log::debug!(
                "carousel {}: fragment index {} out of range for frag_count {}, dropping",
                packet.carousel_id,
                fragment_index,
                frag_count
            );
            return None;
        }
        partial.next_index = fragment_index + 1;
        partial.insert_data(fragment_index, packet.payload);

        if packet.fragment_type == FRAG_DATA_FINAL && partial.is_complete() {
            return self.finish(packet.carousel_id);
        }
        None
    }

    fn push_fec(&mut self, packet: &OpPacket<'_>) -> Option<Vec<u8>> {
        let Some(partial) = self.partials.get_mut(&packet.carousel_id) else {
            log::debug!(
                "FEC fragment for unseen carousel {}, dropping",
                packet.carousel_id
            );
            return None;
        };
        if partial.frag_size.is_none() {
            log::debug!(
                "FEC fragment for carousel {} before any data fragment, dropping",
                packet.carousel_id
            );
            return None;
        }
        if partial.fec_count.is_none() {
            partial.fec_count = Some(packet.last_fragment as usize + 1);
        }
        let index = partial.frag_count.expect("frag_size implies frag_count") + packet.fragment_index as usize;
        partial.insert_fec(index, packet.payload);

        if partial.is_complete() {
            return self.finish(packet.carousel_id);
        }
        None
    }

    fn finish(&mut self, carousel_id: u8) -> Option<Vec<u8>> {
        let partial = self.partials.remove(&carousel_id)?;
        match partial.decode() {
            Ok(datagram) => Some(datagram),
            Err(e) => {
                log::warn!("carousel {carousel_id}: packet FEC decode failed: {e}");
                None
            }
        }
    }
}
