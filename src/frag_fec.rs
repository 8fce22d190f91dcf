//! Packet-level forward error correction.
//!
//! The L3 defragmenter uses this to recover a complete set of `k` data
//! fragments from any `k` of the `n = k + m` shares (data followed by
//! parity) it actually received. This is systematic Reed-Solomon erasure
//! coding over GF(256); the scheme is an external mathematical contract,
//! not something this crate reimplements, so we lean on
//! [`reed_solomon_erasure`] for it.

use std::collections::HashMap;

use reed_solomon_erasure::galois_8::ReedSolomon;

use crate::error::{Error, Result};

/// Recover the `k` data shares of a datagram from whichever of its `n`
/// total shares were actually received.
///
/// `shares` maps share index (`0..k` for data, `k..n` for parity) to the
/// bytes received for that share. Every present share is zero-padded up
/// to `frag_size` before decoding (the canonical Reed-Solomon shard size);
/// callers downstream tolerate the resulting trailing padding the same
/// way they tolerate any other carrier padding. Returns the `k` recovered
/// data shares concatenated in index order.
pub fn recover(k: usize, n: usize, frag_size: usize, shares: &HashMap<usize, Vec<u8>>) -> Result<Vec<u8>> {
    if shares.len() != k {
        return Err(Error::DecodeFailure {
            got: shares.len(),
            k,
        });
    }
    let parity = n - k;
    let rs = ReedSolomon::new(k, parity).map_err(|e| {
        log::warn!("packet FEC setup failed for k={k}, n={n}: {e}");
        Error::DecodeFailure {
            got: shares.len(),
            k,
        }
    })?;

    let mut option_shards: Vec<Option<Vec<u8>>> = (0..n)
        .map(|i| {
            shares.get(&i).map(|payload| {
                let mut padded = payload.clone();
                padded.resize(frag_size, 0);
                padded
            })
        })
        .collect();

    rs.reconstruct(&mut option_shards).map_err(|_| Error::DecodeFailure {
        got: shares.len(),
        k,
    })?;

    let mut out = Vec::with_capacity(k * frag_size);
    for shard in option_shards.into_iter().take(k) {
        out.extend(shard.expect("reconstruct fills every shard or errors"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_shares(k: usize, n: usize, frag_size: usize) -> Vec<Vec<u8>> {
        let parity = n - k;
        let mut data: Vec<Vec<u8>> = (0..k)
            .map(|i| (0..frag_size).map(|b| (i * 7 + b) as u8).collect())
            .collect();
        data.extend((0..parity).map(|_| vec![0u8; frag_size]));
        let rs = ReedSolomon::new(k, parity).unwrap();
        rs.encode(&mut data).unwrap();
        data
    }

    #[test]
    fn recovers_from_any_k_of_n_shares() {
        let (k, n, frag_size) = (4, 6, 16);
        let all = build_shares(k, n, frag_size);

        // Drop two shares (one data, one parity); keep exactly k.
        let mut shares = HashMap::new();
        for (i, s) in all.iter().enumerate() {
            if i == 1 || i == 5 {
                continue;
            }
            shares.insert(i, s.clone());
        }
        assert_eq!(shares.len(), k);

        let recovered = recover(k, n, frag_size, &shares).unwrap();
        let want: Vec<u8> = all[0..k].concat();
        assert_eq!(recovered, want);
    }

    #[test]
    fn fewer_than_k_shares_fails() {
        let (k, n, frag_size) = (4, 6, 16);
        let all = build_shares(k, n, frag_size);
        let mut shares = HashMap::new();
        for (i, s) in all.iter().enumerate().take(k - 1) {
            shares.insert(i, s.clone());
        }
        assert!(matches!(
            recover(k, n, frag_size, &shares),
            Err(Error::DecodeFailure { .. })
        ));
    }
}
