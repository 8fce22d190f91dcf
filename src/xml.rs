//! File descriptor parsing.
//!
//! Announcements (LDP type `0x69`) carry a minimal XML body describing one
//! file. Per the design note in the specification this deliberately is not
//! a general XML reader: it collects the text content of the root's direct
//! children by tag name and ignores everything else (attributes, nesting,
//! namespaces). Unknown or extra children are silently ignored.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{Error, Result};

/// The packet-level FEC scheme declared for a file, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fec {
    /// `ldpc:k=..,n=..,N1=..[,seed=..]`.
    Ldpc {
        /// Number of data symbols (columns), equal to the file's block count.
        k: usize,
        /// Total symbols (data + parity).
        n: usize,
        /// Rounds of the matrix-construction algorithm per column.
        n1: usize,
        /// PRNG seed. Defaults to 1 if absent from the spec string.
        seed: u64,
    },
    /// Any `fec` value not recognized as `ldpc:`. Reconstruction proceeds
    /// as though no FEC were declared.
    Unsupported(String),
}

impl Fec {
    /// Parse a `fec` attribute value.
    pub fn parse(spec: &str) -> Result<Self> {
        let Some(rest) = spec.strip_prefix("ldpc:") else {
            return Ok(Fec::Unsupported(spec.to_string()));
        };
        let mut k = None;
        let mut n = None;
        let mut n1 = None;
        let mut seed = 1u64;
        for kv in rest.split(',') {
            let kv = kv.trim();
            if kv.is_empty() {
                continue;
            }
            let Some((key, value)) = kv.split_once('=') else {
                return Err(Error::InvalidFecSpec(spec.to_string()));
            };
            let parse_usize = |v: &str| {
                v.parse::<usize>()
                    .map_err(|_| Error::InvalidFecSpec(spec.to_string()))
            };
            match key.trim() {
                "k" => k = Some(parse_usize(value)?),
                "n" => n = Some(parse_usize(value)?),
                "N1" => n1 = Some(parse_usize(value)?),
                "seed" => {
                    seed = value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| Error::InvalidFecSpec(spec.to_string()))?;
                }
                _ => {} // ignore unknown keys
            }
        }
        let (Some(k), Some(n), Some(n1)) = (k, n, n1) else {
            return Err(Error::InvalidFecSpec(spec.to_string()));
        };
        Ok(Fec::Ldpc { k, n, n1, seed })
    }
}

/// A file announced by a type-`0x69` LDP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Carousel-wide unique file id.
    pub id: u32,
    /// Path the file is written at, relative to the output directory.
    pub path: String,
    /// Hex-encoded SHA-256 of the assembled file (case preserved as sent).
    pub hash: String,
    /// Total assembled size in bytes.
    pub size: u64,
    /// Size of each block except (possibly) the last.
    pub block_size: u64,
    /// `ceil(size / block_size)`.
    pub blocks: u64,
    /// Declared block-level FEC scheme, if any.
    pub fec: Option<Fec>,
}

impl FileDescriptor {
    /// Parse a file descriptor out of an XML body.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let children = direct_children(xml)?;
        let field = |name: &'static str| {
            children
                .get(name)
                .cloned()
                .ok_or(Error::MissingXmlField(name))
        };
        let parse_u32 = |name: &'static str, text: &str| {
            text.parse::<u32>().map_err(|_| Error::MissingXmlField(name))
        };
        let parse_u64 = |name: &'static str, text: &str| {
            text.parse::<u64>().map_err(|_| Error::MissingXmlField(name))
        };

        let id = parse_u32("id", &field("id")?)?;
        let path = field("path")?;
        let hash = field("hash")?;
        let size = parse_u64("size", &field("size")?)?;
        let block_size = parse_u64("block_size", &field("block_size")?)?;
        if block_size == 0 {
            return Err(Error::MissingXmlField("block_size"));
        }
        let blocks = size.div_ceil(block_size).max(1);
        let fec = match children.get("fec") {
            Some(spec) => Some(Fec::parse(spec)?),
            None => None,
        };

        Ok(Self {
            id,
            path,
            hash,
            size,
            block_size,
            blocks,
            fec,
        })
    }
}

/// Collect the text content of the root element's direct children, keyed
/// by tag name. Nested elements and attributes are ignored entirely.
fn direct_children(xml: &[u8]) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut children = HashMap::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 2 {
                    current = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
            }
            Ok(Event::Empty(_)) => {
                // Self-closing child with no text content; nothing to record.
            }
            Ok(Event::Text(t)) => {
                if let Some(name) = &current {
                    let text = t
                        .unescape()
                        .map_err(|_| Error::MissingXmlField("xml"))?
                        .into_owned();
                    children.insert(name.clone(), text);
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    current = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(_) => return Err(Error::MissingXmlField("xml")),
            _ => {}
        }
        buf.clear();
    }
    Ok(children)
}
