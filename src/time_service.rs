//! Time broadcast decoding (LDP type `0x81`).
//!
//! The payload is a sequence of `desc_id (u8) | desc_len (u8) |
//! data[desc_len]` TLVs. Parsing stops as soon as fewer than 2 bytes remain
//! or a declared length would overrun the remaining payload, rather than
//! failing the whole datagram — a truncated trailing TLV is not an error
//! worth dropping the rest of the stream for.

use chrono::{DateTime, Utc};

use crate::router::LdpHandler;

/// Decodes and logs the time-broadcast TLV stream. Stateless beyond the
/// trait object it's registered under; kept as a struct so it composes
/// with [`crate::router::Router`] like every other handler.
#[derive(Default)]
pub struct TimeService;

impl TimeService {
    /// Create a new time service handler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LdpHandler for TimeService {
    fn handle(&mut self, _ldp_type: u8, payload: &[u8]) {
        let mut rest = payload;
        while rest.len() > 2 {
            let desc_id = rest[0];
            let desc_len = rest[1] as usize;
            if desc_len > rest.len() - 2 {
                break;
            }
            let data = &rest[2..2 + desc_len];
            rest = &rest[2 + desc_len..];
            match desc_id {
                0x01 => match std::str::from_utf8(data) {
                    Ok(server_id) => log::info!("time service: server id {server_id}"),
                    Err(_) => log::warn!("time service: server id descriptor is not valid UTF-8"),
                },
                0x02 if data.len() == 8 => {
                    let secs = u64::from_be_bytes(data.try_into().expect("checked len == 8"));
                    match server_time(secs) {
                        Some(t) => log::info!("time service: server time {t} UTC"),
                        None => log::warn!("time service: timestamp {secs} out of range"),
                    }
                }
                other => log::debug!("time service: unknown descriptor {other:#04x}, skipping"),
            }
        }
    }
}

fn server_time(unix_secs: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(unix_secs).ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_timestamp_tlv() {
        let mut ts = TimeService::new();
        let mut payload = vec![0x02u8, 8];
        payload.extend_from_slice(&1_451_606_400u64.to_be_bytes());
        ts.handle(0x81, &payload);
        // No panic and no stray state; the handler only logs.
        assert_eq!(
            server_time(1_451_606_400).unwrap().to_string(),
            "2016-01-01 00:00:00 UTC"
        );
    }

    #[test]
    fn decodes_server_id_tlv() {
        let mut ts = TimeService::new();
        let mut payload = vec![0x01u8, 5];
        payload.extend_from_slice(b"ares1");
        ts.handle(0x81, &payload);
    }

    #[test]
    fn stops_before_overrunning_truncated_trailing_tlv() {
        let mut ts = TimeService::new();
        // desc_len claims 10 bytes but only 2 remain.
        let payload = vec![0x01u8, 10, 0xAA, 0xBB];
        ts.handle(0x81, &payload); // must not panic
    }
}
