#![warn(missing_docs)]
/*! Receiver library for a one-way satellite data-carousel broadcast
service.

A ground station repeatedly broadcasts a carousel of files (and a
time signal) as Ethernet-framed datagrams on a multicast group. This
crate reassembles that broadcast back into files:

```text
  [ Carrier: multicast UDP / line-framed log replay ]
                      ↓
         [ Ethernet envelope stripper ]
                      ↓
            [ L3 (OP) fragment parser ]
                      ↓
     [ L3 defragmenter (+ packet-level FEC) ]
                      ↓
          [ L4 (LDP) datagram parser (CRC) ]
                      ↓
                  [ Router ]
                 ↙         ↘
      [ File service ]  [ Time service ]
```

Every stage is a synchronous push-style transducer; there is no
threading or async inside the pipeline (see [`crate::router`] for why
that makes `Rc<RefCell<_>>` the right tool for dispatch). [`op`] and
[`ldp`] parse the two wire layers; [`defrag`] and [`frag_fec`] handle
fragment loss; [`ldp`]'s CRC plus [`file_service`]'s SHA-256 gate
guarantee a delivered file matches what was announced; [`ldpc`]
provides the deterministic parity-check construction the file service
uses to repair missing blocks.
*/

/// CRC-32/MPEG-2 checksum used by the L4 (LDP) layer.
pub mod crc;
/// L3 defragmentation and packet-level (Reed-Solomon) FEC recovery.
pub mod defrag;
/// Ethernet envelope stripping.
pub mod ethernet;
/// Error taxonomy shared across the crate.
pub mod error;
/// File service: announce, accumulate, repair, verify, deliver.
pub mod file_service;
/// Packet-level (fragment) FEC recovery.
pub mod frag_fec;
/// Input carriers: multicast UDP and line-framed log replay.
pub mod carrier;
/// Line-framed (KISS-style) deframing.
pub mod kiss;
/// L4 (LDP) datagram parsing.
pub mod ldp;
/// Deterministic LDPC parity-check matrix construction.
pub mod ldpc;
/// L3 (OP) fragment parsing.
pub mod op;
/// LDP dispatch by type.
pub mod router;
/// Time-broadcast TLV decoding.
pub mod time_service;
/// File descriptor XML parsing.
pub mod xml;

pub use error::{Error, Result};
