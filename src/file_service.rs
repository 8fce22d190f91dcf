//! The file service: announcement, block accumulation, LDPC repair,
//! SHA-256 verification, and atomic delivery of carousel files.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::ldpc;
use crate::router::{LdpHandler, Router};
use crate::xml::{Fec, FileDescriptor};

/// LDP type: file description (announcement).
pub const TYPE_FILE_DESCRIPTION: u8 = 0x69;
/// LDP type: file data block.
pub const TYPE_FILE_DATA: u8 = 0x18;
/// LDP type: file FEC block.
pub const TYPE_FILE_FEC: u8 = 0xff;
/// LDP type: file signaling (reserved/no-op).
pub const TYPE_SIGNALING_A: u8 = 0x42;
/// LDP type: file signaling (reserved/no-op).
pub const TYPE_SIGNALING_B: u8 = 0x5a;

const BLOCK_HEADER_LEN: usize = 6; // u32 file_id + u16 block_number

/// Length of the per-announcement signature in bytes. The source carries
/// two candidate values (128 and 256); exposed as a constant rather than
/// hardwired so a deployment can override it (see the specification's
/// open question on signature length).
pub const DEFAULT_SIGNATURE_LEN: usize = 128;

/// One file's in-flight reconstruction state, owned by [`FileService`] and
/// referenced only by its stable file id (never by a back-pointer).
struct FileInProgress {
    desc: FileDescriptor,
    /// Certificate bytes from the announcement, retained but not verified.
    #[allow(dead_code)]
    cert: Vec<u8>,
    /// Signature bytes from the announcement, retained but not verified
    /// (verification remains a TODO, as in the source).
    #[allow(dead_code)]
    signature: Vec<u8>,
    data: Vec<Option<Vec<u8>>>,
    fec: Vec<Option<Vec<u8>>>,
    matrix: Option<Vec<Vec<usize>>>,
}

impl FileInProgress {
    fn new(desc: FileDescriptor, cert: Vec<u8>, signature: Vec<u8>) -> Self {
        let blocks = desc.blocks as usize;
        Self {
            desc,
            cert,
            signature,
            data: vec![None; blocks],
            fec: Vec::new(),
            matrix: None,
        }
    }

    /// Natural (unpadded) length of data block `idx`.
    fn block_len(&self, idx: usize) -> usize {
        let offset = idx as u64 * self.desc.block_size;
        self.desc.block_size.min(self.desc.size - offset) as usize
    }

    fn push_data(&mut self, block_number: usize, block: &[u8]) {
        let Some(slot) = self.data.get_mut(block_number) else {
            log::warn!(
                "file {}: data block {block_number} out of range (blocks={})",
                self.desc.path,
                self.data.len()
            );
            return;
        };
        if slot.is_some() {
            return; // already have this block; idempotent
        }
        *slot = Some(block.to_vec());
    }

    fn push_fec(&mut self, block_number: usize, block: &[u8]) {
        if self.fec.len() <= block_number {
            self.fec.resize(block_number + 1, None);
        }
        match &self.fec[block_number] {
            Some(existing) if existing == block => {} // duplicate, ignore
            Some(_) => {
                log::warn!(
                    "file {}: FEC block {block_number} replaced with different payload",
                    self.desc.path
                );
                self.fec[block_number] = Some(block.to_vec());
            }
            None => self.fec[block_number] = Some(block.to_vec()),
        }
    }

    fn data_filled(&self) -> usize {
        self.data.iter().filter(|b| b.is_some()).count()
    }

    fn fec_filled(&self) -> usize {
        self.fec.iter().filter(|b| b.is_some()).count()
    }

    fn all_data_filled(&self) -> bool {
        self.data.iter().all(Option::is_some)
    }

    /// Fully reconstructable, or enough data+FEC has arrived that a repair
    /// attempt might now succeed.
    fn possibly_reconstructable(&self) -> bool {
        self.all_data_filled() || self.data_filled() + self.fec_filled() >= self.data.len()
    }

    /// Iterated single-erasure XOR repair. Returns `true` once every data
    /// slot is filled, `false` if a pass made no progress.
    fn repair_ldpc(&mut self, k: usize, n: usize, n1: usize, seed: u64) -> bool {
        if self.matrix.is_none() {
            self.matrix = Some(ldpc::build_matrix(k, n, n1, seed));
        }
        let matrix = self.matrix.clone().expect("just built");
        let block_size = self.desc.block_size as usize;

        loop {
            let mut progressed = false;
            for (row_idx, row) in matrix.iter().enumerate() {
                let Some(Some(fec_bytes)) = self.fec.get(row_idx) else {
                    continue;
                };
                let missing: Vec<usize> = row
                    .iter()
                    .copied()
                    .filter(|&c| self.data.get(c).map(Option::is_none).unwrap_or(true))
                    .collect();
                if missing.len() != 1 {
                    continue;
                }
                let target = missing[0];
                let mut acc = fec_bytes.clone();
                acc.resize(block_size, 0xFF);
                for &c in row {
                    if c == target {
                        continue;
                    }
                    if let Some(Some(block)) = self.data.get(c) {
                        xor_padded_into(&mut acc, block, block_size);
                    }
                }
                acc.truncate(self.block_len(target));
                self.data[target] = Some(acc);
                progressed = true;
            }
            if self.all_data_filled() {
                return true;
            }
            if !progressed {
                return false;
            }
        }
    }

    /// Attempt full reconstruction: repair via LDPC if declared, assemble,
    /// verify length and hash. Leaves partial state untouched on failure.
    fn reconstruct(&mut self) -> Result<Vec<u8>> {
        if !self.all_data_filled() {
            match self.desc.fec.clone() {
                Some(Fec::Ldpc { k, n, n1, seed }) => {
                    if !self.repair_ldpc(k, n, n1, seed) {
                        return Err(Error::ReconstructionStalled {
                            missing: self.data.len() - self.data_filled(),
                        });
                    }
                }
                Some(Fec::Unsupported(_)) | None => {
                    return Err(Error::MissingBlocks {
                        missing: self.data.len() - self.data_filled(),
                        total: self.data.len(),
                    });
                }
            }
        }

        let mut out = Vec::with_capacity(self.desc.size as usize);
        for block in &self.data {
            out.extend_from_slice(block.as_ref().expect("all_data_filled checked above"));
        }
        if out.len() as u64 != self.desc.size {
            return Err(Error::SizeMismatch {
                got: out.len(),
                want: self.desc.size as usize,
            });
        }
        let digest = hex::encode(Sha256::digest(&out));
        if !digest.eq_ignore_ascii_case(&self.desc.hash) {
            return Err(Error::HashMismatch {
                path: self.desc.path.clone(),
            });
        }
        Ok(out)
    }
}

fn xor_padded_into(acc: &mut [u8], block: &[u8], block_size: usize) {
    for (i, b) in acc.iter_mut().enumerate() {
        let other = if i < block.len() { block[i] } else { 0xFF };
        *b ^= other;
    }
    debug_assert_eq!(acc.len(), block_size);
}

/// Registers for announcement, data, FEC, and signaling LDP types;
/// accumulates and reconstructs announced files.
pub struct FileService {
    files: std::collections::HashMap<u32, FileInProgress>,
    /// Most recently touched file id, re-resolved through `files` on every
    /// use rather than held as a pointer — gives a straggling file one more
    /// reconstruction attempt when the carousel rolls over to the next one.
    last_file: Option<u32>,
    output_dir: PathBuf,
    signature_len: usize,
}

impl FileService {
    /// Create a new file service writing reconstructed files under
    /// `output_dir`, using [`DEFAULT_SIGNATURE_LEN`] for announcements.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            files: std::collections::HashMap::new(),
            last_file: None,
            output_dir: output_dir.into(),
            signature_len: DEFAULT_SIGNATURE_LEN,
        }
    }

    /// Override the signature length assumed when splitting an
    /// announcement's certificate/signature/XML body.
    #[must_use]
    pub fn with_signature_len(mut self, signature_len: usize) -> Self {
        self.signature_len = signature_len;
        self
    }

    /// Register this service under all five file-service LDP types.
    pub fn register(service: &Rc<RefCell<Self>>, router: &mut Router) {
        for ldp_type in [
            TYPE_FILE_DESCRIPTION,
            TYPE_FILE_DATA,
            TYPE_FILE_FEC,
            TYPE_SIGNALING_A,
            TYPE_SIGNALING_B,
        ] {
            router.register(ldp_type, service.clone());
        }
    }

    fn handle_description(&mut self, payload: &[u8]) {
        if payload.len() < 2 {
            log::warn!("file service: description packet too short for cert_len");
            return;
        }
        let cert_len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        let sig_start = 2 + cert_len;
        let xml_start = sig_start + self.signature_len;
        if payload.len() < xml_start {
            log::warn!("file service: description packet too short for cert+signature");
            return;
        }
        let cert = payload[2..sig_start].to_vec();
        let signature = payload[sig_start..xml_start].to_vec();
        let xml = &payload[xml_start..];

        let desc = match FileDescriptor::parse(xml) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("file service: malformed announcement: {e}");
                return;
            }
        };
        log::info!(
            "file service: new file announced: {} ({} bytes, {} blocks)",
            desc.path,
            desc.size,
            desc.blocks
        );
        self.files
            .insert(desc.id, FileInProgress::new(desc, cert, signature));
    }

    fn handle_data(&mut self, payload: &[u8]) {
        let Some((file_id, block_number, block)) = parse_block_header(payload) else {
            return;
        };
        let Some(file) = self.files.get_mut(&file_id) else {
            log::debug!("file service: data block for unknown file id {file_id}");
            return;
        };
        file.push_data(block_number, block);
        self.maybe_reconstruct(file_id);
    }

    fn handle_fec(&mut self, payload: &[u8]) {
        let Some((file_id, block_number, block)) = parse_block_header(payload) else {
            return;
        };
        let Some(file) = self.files.get_mut(&file_id) else {
            log::debug!("file service: FEC block for unknown file id {file_id}");
            return;
        };
        file.push_fec(block_number, block);
        self.maybe_reconstruct(file_id);
    }

    /// Attempt reconstruction of `file_id` if a just-arrived data or FEC
    /// block made it possibly reconstructable, plus a retry of whichever
    /// file was last touched (the "last file" straggler mechanism — see
    /// the specification's file service design note).
    fn maybe_reconstruct(&mut self, file_id: u32) {
        let Some(file) = self.files.get(&file_id) else {
            return;
        };
        if !file.possibly_reconstructable() {
            return;
        }
        self.try_reconstruct(file_id);
        if let Some(last) = self.last_file {
            if last != file_id {
                self.try_reconstruct(last);
            }
        }
        self.last_file = Some(file_id);
    }

    /// Attempt to finish and write `file_id`. Returns whether it was
    /// written and removed from the map.
    fn try_reconstruct(&mut self, file_id: u32) -> bool {
        let Some(file) = self.files.get_mut(&file_id) else {
            return false;
        };
        match file.reconstruct() {
            Ok(bytes) => match write_atomic(&self.output_dir, &file.desc.path, &bytes) {
                Ok(()) => {
                    log::info!("file service: reconstructed {}", file.desc.path);
                    self.files.remove(&file_id);
                    if self.last_file == Some(file_id) {
                        self.last_file = None;
                    }
                    true
                }
                Err(e) => {
                    log::warn!("file service: {e}");
                    false
                }
            },
            Err(e) => {
                log::debug!("file service: file {file_id} not yet reconstructable: {e}");
                false
            }
        }
    }
}

impl LdpHandler for FileService {
    fn handle(&mut self, ldp_type: u8, payload: &[u8]) {
        match ldp_type {
            TYPE_FILE_DESCRIPTION => self.handle_description(payload),
            TYPE_FILE_DATA => self.handle_data(payload),
            TYPE_FILE_FEC => self.handle_fec(payload),
            TYPE_SIGNALING_A | TYPE_SIGNALING_B => {
                log::info!("file service: received signaling packet (not implemented)");
            }
            other => log::debug!("file service: unexpected LDP type {other:#04x}"),
        }
    }
}

fn parse_block_header(payload: &[u8]) -> Option<(u32, usize, &[u8])> {
    if payload.len() < BLOCK_HEADER_LEN {
        log::warn!("file service: block packet too short for header");
        return None;
    }
    let file_id = u32::from_be_bytes(payload[0..4].try_into().expect("4 bytes"));
    let block_number = u16::from_be_bytes(payload[4..6].try_into().expect("2 bytes")) as usize;
    Some((file_id, block_number, &payload[BLOCK_HEADER_LEN..]))
}

fn write_atomic(output_dir: &Path, relative: &str, bytes: &[u8]) -> Result<()> {
    let final_path = output_dir.join(relative);
    let map_err = |source: std::io::Error| Error::WriteFailure {
        path: final_path.display().to_string(),
        source,
    };
    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent).map_err(map_err)?;
    }
    let mut tmp_name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".partial");
    let tmp_path = final_path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, bytes).map_err(map_err)?;
    std::fs::rename(&tmp_path, &final_path).map_err(map_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldp::LdpPacket;

    fn descriptor_xml(id: u32, path: &str, hash: &str, size: u64, block_size: u64, fec: Option<&str>) -> Vec<u8> {
        let fec_elem = fec.map(|f| format!("<fec>{f}</fec>")).unwrap_or_default();
        format!(
            "<file><id>{id}</id><path>{path}</path><hash>{hash}</hash><size>{size}</size><block_size>{block_size}</block_size>{fec_elem}</file>"
        )
        .into_bytes()
    }

    fn announce_payload(xml: &[u8], signature_len: usize) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&0u16.to_be_bytes()); // no cert
        p.extend(std::iter::repeat(0u8).take(signature_len));
        p.extend_from_slice(xml);
        p
    }

    fn block_payload(file_id: u32, block_number: u16, block: &[u8]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&file_id.to_be_bytes());
        p.extend_from_slice(&block_number.to_be_bytes());
        p.extend_from_slice(block);
        p
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[test]
    fn announce_then_full_delivery_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Rc::new(RefCell::new(FileService::new(dir.path())));
        let mut router = Router::new();
        FileService::register(&svc, &mut router);

        let hash = sha256_hex(b"abc");
        let xml = descriptor_xml(7, "out.bin", &hash, 3, 2, None);
        let announce = announce_payload(&xml, DEFAULT_SIGNATURE_LEN);
        router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DESCRIPTION, &announce)).unwrap());

        let b0 = block_payload(7, 0, b"ab");
        router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DATA, &b0)).unwrap());
        assert!(!dir.path().join("out.bin").exists());

        let b1 = block_payload(7, 1, b"c");
        router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DATA, &b1)).unwrap());

        let written = std::fs::read(dir.path().join("out.bin")).unwrap();
        assert_eq!(written, b"abc");
        assert!(!svc.borrow().files.contains_key(&7));
    }

    #[test]
    fn partial_delivery_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Rc::new(RefCell::new(FileService::new(dir.path())));
        let mut router = Router::new();
        FileService::register(&svc, &mut router);

        let hash = sha256_hex(b"abc");
        let xml = descriptor_xml(1, "pending.bin", &hash, 3, 2, None);
        let announce = announce_payload(&xml, DEFAULT_SIGNATURE_LEN);
        router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DESCRIPTION, &announce)).unwrap());

        let b0 = block_payload(1, 0, b"ab");
        router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DATA, &b0)).unwrap());

        assert!(!dir.path().join("pending.bin").exists());
        assert!(svc.borrow().files.contains_key(&1));
    }

    #[test]
    fn ldpc_repair_recovers_missing_block_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Rc::new(RefCell::new(FileService::new(dir.path())));
        let mut router = Router::new();
        FileService::register(&svc, &mut router);

        // k=4, n=6, N1=1, seed=1: four 4-byte data blocks, two FEC rows.
        const K: usize = 4;
        const BLOCK_SIZE: u64 = 4;
        let blocks: [&[u8]; K] = [b"abcd", b"efgh", b"ijkl", b"mnop"];
        let content: Vec<u8> = blocks.concat();
        let hash = sha256_hex(&content);
        let xml = descriptor_xml(
            9,
            "repaired.bin",
            &hash,
            content.len() as u64,
            BLOCK_SIZE,
            Some("ldpc:k=4,n=6,N1=1,seed=1"),
        );
        let announce = announce_payload(&xml, DEFAULT_SIGNATURE_LEN);
        router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DESCRIPTION, &announce)).unwrap());

        let matrix = ldpc::build_matrix(K, 6, 1, 1);
        assert_eq!(matrix.len(), 2);

        // Withhold exactly one data block; every other data block, plus every
        // FEC row, gets delivered.
        let missing = matrix[0][0];
        for (c, block) in blocks.iter().enumerate() {
            if c != missing {
                let b = block_payload(9, c as u16, block);
                router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DATA, &b)).unwrap());
            }
        }
        for (row_idx, row) in matrix.iter().enumerate() {
            let mut fec = vec![0u8; BLOCK_SIZE as usize];
            for &c in row {
                for (i, b) in fec.iter_mut().enumerate() {
                    *b ^= blocks[c][i];
                }
            }
            let fec_packet = block_payload(9, row_idx as u16, &fec);
            router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_FEC, &fec_packet)).unwrap());
        }

        let written = std::fs::read(dir.path().join("repaired.bin")).unwrap();
        assert_eq!(written, content);
    }

    #[test]
    fn hash_mismatch_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Rc::new(RefCell::new(FileService::new(dir.path())));
        let mut router = Router::new();
        FileService::register(&svc, &mut router);

        let wrong_hash = sha256_hex(b"not-abc");
        let xml = descriptor_xml(3, "bad.bin", &wrong_hash, 3, 2, None);
        let announce = announce_payload(&xml, DEFAULT_SIGNATURE_LEN);
        router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DESCRIPTION, &announce)).unwrap());

        for (n, block) in [(0u16, b"ab".as_slice()), (1, b"c".as_slice())] {
            let b = block_payload(3, n, block);
            router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DATA, &b)).unwrap());
        }

        assert!(!dir.path().join("bad.bin").exists());
        assert!(svc.borrow().files.contains_key(&3));
    }

    #[test]
    fn idempotent_duplicate_block_push() {
        let mut file = FileInProgress::new(
            FileDescriptor::parse(&descriptor_xml(1, "p", "h", 4, 4, None)).unwrap(),
            Vec::new(),
            Vec::new(),
        );
        file.push_data(0, b"AAAA");
        file.push_data(0, b"BBBB"); // must not overwrite
        assert_eq!(file.data[0], Some(b"AAAA".to_vec()));
    }

    #[test]
    fn replacing_announcement_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Rc::new(RefCell::new(FileService::new(dir.path())));
        let mut router = Router::new();
        FileService::register(&svc, &mut router);

        let xml1 = descriptor_xml(5, "a.bin", &sha256_hex(b"xx"), 2, 2, None);
        router.route(&LdpPacket::parse(&LdpPacket::build(
            TYPE_FILE_DESCRIPTION,
            &announce_payload(&xml1, DEFAULT_SIGNATURE_LEN),
        )).unwrap());
        let b = block_payload(5, 0, b"xx");
        router.route(&LdpPacket::parse(&LdpPacket::build(TYPE_FILE_DATA, &b)).unwrap());
        assert!(dir.path().join("a.bin").exists());

        // Re-announce id 5 with different content before any blocks arrive.
        let xml2 = descriptor_xml(5, "b.bin", &sha256_hex(b"yy"), 2, 2, None);
        router.route(&LdpPacket::parse(&LdpPacket::build(
            TYPE_FILE_DESCRIPTION,
            &announce_payload(&xml2, DEFAULT_SIGNATURE_LEN),
        )).unwrap());
        assert!(svc.borrow().files.get(&5).unwrap().data.iter().all(Option::is_none));
    }
}
