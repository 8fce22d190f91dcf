//! Deterministic LDPC parity-check matrix construction.
//!
//! The matrix is used to recover missing file data blocks by iterated
//! single-erasure XOR (see [`crate::file_service`]), not by belief
//! propagation. What matters here is that construction is a pure function
//! of `(k, n, N1, seed)`: the same parameters must always produce the same
//! matrix, since the ground station and the receiver build it independently
//! from the announcement's `fec` string.

/// Park-Miller minimal standard PRNG, matching the ground station's
/// generator bit for bit.
///
/// `next()` returns the raw post-update state; bounded draws are
/// `next() % n` (see the specification's discussion of the two candidate
/// draw shapes — this crate implements the one the deployed encoder uses).
pub struct ParkMiller {
    state: u64,
}

const MODULUS: u64 = 2_147_483_647; // 2^31 - 1
const MULTIPLIER: u64 = 16_807; // 7^5

impl ParkMiller {
    /// Seed the generator. The ground station defaults to seed `1`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed % MODULUS,
        }
    }

    /// Advance and return the next raw value in `[0, 2^31 - 1)`.
    pub fn next(&mut self) -> u32 {
        self.state = (MULTIPLIER * self.state) % MODULUS;
        self.state as u32
    }

    /// Draw a value uniformly-ish in `[0, n)`. `n` must be nonzero.
    pub fn bounded(&mut self, n: u32) -> u32 {
        self.next() % n
    }
}

/// Build the `n - k` parity-check rows of an LDPC code, each row a sorted
/// list of the data-column indices (`0..k`) it covers.
///
/// Deterministic: equal `(k, n, n1, seed)` always yields structurally equal
/// output. Every row has degree >= 2 on return.
#[must_use]
pub fn build_matrix(k: usize, n: usize, n1: usize, seed: u64) -> Vec<Vec<usize>> {
    assert!(n > k, "LDPC matrix needs n > k");
    let rows = n - k;
    let mut rng = ParkMiller::new(seed);

    // Helper table mapping slots 0..k*n1 to candidate rows, homogeneously.
    let total = k * n1;
    let mut u: Vec<usize> = (0..total).map(|h| h % rows).collect();
    let mut m: Vec<Vec<usize>> = vec![Vec::new(); rows];
    let mut t = 0usize;

    for j in 0..k {
        for _ in 0..n1 {
            let mut i = t;
            while i < total && m[u[i]].contains(&j) {
                i += 1;
            }
            if i < total {
                let chosen = loop {
                    let idx = t + rng.bounded((total - t) as u32) as usize;
                    if !m[u[idx]].contains(&j) {
                        break idx;
                    }
                };
                m[u[chosen]].push(j);
                u[chosen] = u[t];
                t += 1;
            } else if (0..rows).any(|r| !m[r].contains(&j)) {
                let row = loop {
                    let r = rng.bounded(rows as u32) as usize;
                    if !m[r].contains(&j) {
                        break r;
                    }
                };
                m[row].push(j);
            } else {
                // Every row already covers column j (only possible when N1
                // exceeds the row count): further rounds for this column
                // are no-ops rather than an unbounded search for a row that
                // doesn't exist.
                break;
            }
        }
    }

    for row in m.iter_mut() {
        if row.is_empty() {
            row.push(rng.bounded(k as u32) as usize);
        }
        if row.len() == 1 {
            let existing = row[0];
            let extra = loop {
                let j = rng.bounded(k as u32) as usize;
                if j != existing {
                    break j;
                }
            };
            row.push(extra);
        }
        row.sort_unstable();
    }

    m
}
