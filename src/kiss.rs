//! Line-framed (KISS-style) carrier.
//!
//! Deframes a byte stream using the standard TNC conventions:
//! <https://en.wikipedia.org/wiki/KISS_(amateur_radio_protocol)>. `FEND`
//! delimits frames; `FESC`/`TFEND`/`TFESC` escape literal `FEND`/`FESC`
//! bytes inside a frame. A frame's first byte carries a type nibble in its
//! low 4 bits; only frames whose low nibble is zero are emitted, and that
//! leading byte is stripped before the frame is handed onward. This is used
//! only to replay a previously captured raw-frame log file in place of a
//! live multicast feed.

const KISS_FEND: u8 = 0xc0;
const KISS_FESC: u8 = 0xdb;
const KISS_TFEND: u8 = 0xdc;
const KISS_TFESC: u8 = 0xdd;

/// Deframes a byte stream pushed incrementally, yielding complete frames.
#[derive(Default)]
pub struct LineDeframer {
    pdu: Vec<u8>,
    transpose: bool,
}

impl LineDeframer {
    /// Create a new, empty deframer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning the frames completed by it, in
    /// stream order. A completed frame whose leading byte's low nibble is
    /// nonzero is discarded rather than emitted.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &c in data {
            if c == KISS_FEND {
                if let Some((&first, rest)) = self.pdu.split_first() {
                    if first & 0x0f == 0 {
                        frames.push(rest.to_vec());
                    }
                }
                self.pdu.clear();
                self.transpose = false;
            } else if self.transpose {
                match c {
                    KISS_TFEND => self.pdu.push(KISS_FEND),
                    KISS_TFESC => self.pdu.push(KISS_FESC),
                    _ => {} // invalid escape sequence; drop the byte
                }
                self.transpose = false;
            } else if c == KISS_FESC {
                self.transpose = true;
            } else {
                self.pdu.push(c);
            }
        }
        frames
    }
}

/// Escape a KISS data stream, framing `payload` behind a leading type
/// nibble (low 4 bits of `type_nibble`), `FEND`-delimited.
#[must_use]
pub fn frame(type_nibble: u8, payload: &[u8]) -> Vec<u8> {
    // Add some capacity to leave room for escaped bytes.
    let mut out = Vec::with_capacity((3 + payload.len()) * 110 / 100);
    out.push(KISS_FEND);
    escape_into(&mut out, type_nibble & 0x0f);
    for &b in payload {
        escape_into(&mut out, b);
    }
    out.push(KISS_FEND);
    out
}

fn escape_into(out: &mut Vec<u8>, b: u8) {
    match b {
        KISS_FEND => out.extend([KISS_FESC, KISS_TFEND]),
        KISS_FESC => out.extend([KISS_FESC, KISS_TFESC]),
        other => out.push(other),
    }
}
