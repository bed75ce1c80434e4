//! A deterministic, non-cryptographic partitioner used to route bus messages
//! to a node and then to a worker inside that node.
//!
//! [`generate`] is the only entry point: it folds an arbitrary byte seed into
//! an 8-byte accumulator and reduces that accumulator modulo each of a list of
//! bucket counts. The same fold is reused for every modulus, so the outputs
//! are correlated with each other but each is independently uniform enough
//! for routing purposes. This is not a hash function chosen for avalanche or
//! collision resistance: it is the cheapest thing that is deterministic and
//! roughly uniform.

/// Computes one shard index per entry in `counts` from `seed`.
///
/// The seed is XOR-folded into an 8-byte accumulator (wrapping around every 8
/// bytes), then interpreted as a big-endian `u64`. Each output is that value
/// reduced modulo the corresponding count.
///
/// # Panics
///
/// Panics if any element of `counts` is zero.
///
/// # Examples
///
/// ```
/// use alarmdigest_sharding::generate;
///
/// let shards = generate(b"user-123", &[4, 16]);
/// assert_eq!(shards.len(), 2);
/// assert!(shards[0] < 4);
/// assert!(shards[1] < 16);
/// ```
pub fn generate(seed: &[u8], counts: &[u64]) -> Vec<u64> {
    let mut acc = [0u8; 8];
    for (i, byte) in seed.iter().enumerate() {
        acc[i % 8] ^= byte;
    }
    let pre = u64::from_be_bytes(acc);

    counts
        .iter()
        .map(|&count| {
            assert_ne!(count, 0, "shard count must be non-zero");
            pre % count
        })
        .collect()
}
