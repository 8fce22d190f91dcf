//! LDP (L4) dispatch by type.
//!
//! Per the specification's design note, dispatch is a closed-set lookup
//! rather than open-ended dynamic registration: a dense table of 256 slots,
//! one per possible `type` byte. Several types may share one handler (the
//! file service registers itself under five of them), so slots hold shared,
//! interior-mutable handles rather than owning their handler outright —
//! there are no concurrent agents in this pipeline (see the specification's
//! concurrency model), so `Rc<RefCell<_>>` is sufficient and avoids the
//! locking a multi-threaded design would need.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ldp::LdpPacket;

/// Something that can handle a routed LDP payload.
///
/// `ldp_type` is passed through so one handler can serve several types
/// (the file service distinguishes description/data/FEC/signaling packets
/// this way).
pub trait LdpHandler {
    /// Handle one payload of the given type.
    fn handle(&mut self, ldp_type: u8, payload: &[u8]);
}

type HandlerSlot = Rc<RefCell<dyn LdpHandler>>;

/// Dispatches parsed LDP datagrams to registered per-type handlers.
pub struct Router {
    handlers: Vec<Option<HandlerSlot>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create an empty router; every type is initially unregistered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: (0..=u8::MAX).map(|_| None).collect(),
        }
    }

    /// Register `handler` for `ldp_type`. A later registration for the same
    /// type overwrites an earlier one.
    pub fn register(&mut self, ldp_type: u8, handler: HandlerSlot) {
        self.handlers[ldp_type as usize] = Some(handler);
    }

    /// Dispatch a parsed datagram to its handler, or log if none is
    /// registered for its type.
    pub fn route(&self, packet: &LdpPacket<'_>) {
        match &self.handlers[packet.ldp_type as usize] {
            Some(handler) => handler.borrow_mut().handle(packet.ldp_type, packet.payload),
            None => log::debug!("no handler registered for LDP type {:#04x}", packet.ldp_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Vec<(u8, Vec<u8>)>,
    }

    impl LdpHandler for Recorder {
        fn handle(&mut self, ldp_type: u8, payload: &[u8]) {
            self.seen.push((ldp_type, payload.to_vec()));
        }
    }

    #[test]
    fn dispatches_to_registered_handler() {
        let mut router = Router::new();
        let recorder = Rc::new(RefCell::new(Recorder { seen: Vec::new() }));
        router.register(0x69, recorder.clone());
        let datagram = LdpPacket::build(0x69, b"hello");
        let parsed = LdpPacket::parse(&datagram).unwrap();
        router.route(&parsed);
        assert_eq!(recorder.borrow().seen, vec![(0x69, b"hello".to_vec())]);
    }

    #[test]
    fn one_handler_can_serve_multiple_types() {
        let mut router = Router::new();
        let recorder = Rc::new(RefCell::new(Recorder { seen: Vec::new() }));
        router.register(0x42, recorder.clone());
        router.register(0x5a, recorder.clone());
        for t in [0x42u8, 0x5a] {
            let datagram = LdpPacket::build(t, b"x");
            router.route(&LdpPacket::parse(&datagram).unwrap());
        }
        assert_eq!(recorder.borrow().seen.len(), 2);
    }

    #[test]
    fn unregistered_type_is_a_noop() {
        let router = Router::new();
        let datagram = LdpPacket::build(0x18, b"x");
        router.route(&LdpPacket::parse(&datagram).unwrap()); // must not panic
    }

    #[test]
    fn later_registration_overwrites_earlier() {
        let mut router = Router::new();
        let first = Rc::new(RefCell::new(Recorder { seen: Vec::new() }));
        let second = Rc::new(RefCell::new(Recorder { seen: Vec::new() }));
        router.register(0x81, first.clone());
        router.register(0x81, second.clone());
        let datagram = LdpPacket::build(0x81, b"x");
        router.route(&LdpPacket::parse(&datagram).unwrap());
        assert!(first.borrow().seen.is_empty());
        assert_eq!(second.borrow().seen.len(), 1);
    }
}
