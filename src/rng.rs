use rand::{RngCore, SeedableRng};
use rand::rngs::SmallRng;

use crate::prelude::MAX_REQ_LEN;

/// Fills `buf` with pseudo-random bytes deterministic in `(template_index,
/// sibling_index)`: distinct templates and distinct siblings of the same
/// template always produce distinct payloads, while the same pair
/// reproduces the same bytes on every call. Cryptographic strength isn't
/// needed here — `SmallRng` (xoshiro-family) is a fast, non-cryptographic
/// generator, matching the original's own multiply-with-carry choice in
/// spirit.
pub fn fill_random_body(template_index: usize, sibling_index: u32, buf: &mut [u8]) {
    let seed = (template_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (sibling_index as u64);
    let mut rng = SmallRng::seed_from_u64(seed);
    rng.fill_bytes(buf);
}

/// Caps the buffer actually materialized for a chunked body at
/// `MAX_REQ_LEN`; larger logical sizes replay this buffer cyclically at
/// write time instead of allocating the full length up front.
pub fn buffer_capacity_for(size: usize) -> usize {
    size.min(MAX_REQ_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_seeds_yield_distinct_prefixes() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        fill_random_body(0, 0, &mut a);
        fill_random_body(0, 1, &mut b);
        assert_ne!(a, b);

        let mut c = [0u8; 16];
        fill_random_body(1, 0, &mut c);
        assert_ne!(a, c);
    }

    #[test]
    fn same_seed_is_deterministic() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        fill_random_body(5, 2, &mut a);
        fill_random_body(5, 2, &mut b);
        assert_eq!(a, b);
    }
}
