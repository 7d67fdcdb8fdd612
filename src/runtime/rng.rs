//! Seeded deterministic random source; every randomized decision in a
//! session draws from one of these so a run is fully reproducible.

use rand_chacha::ChaCha20Rng;
use rand_core::{OsRng, RngCore as _, SeedableRng as _};

/// The session seed. 32 bits so it fits in trace headers and error-map
/// buckets verbatim.
pub type Seed = u32;

#[derive(Debug)]
pub struct RngSource {
    seed: Seed,
    rng: ChaCha20Rng,
}

impl RngSource {
    pub fn new(seed: Seed) -> Self {
        let digest = blake3::hash(&seed.to_le_bytes());
        let mut seed32 = [0u8; 32];
        seed32.copy_from_slice(&digest.as_bytes()[..32]);
        Self {
            seed,
            rng: ChaCha20Rng::from_seed(seed32),
        }
    }

    pub fn seed(&self) -> Seed {
        self.seed
    }

    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Uniform draw in `[0, n)`. `n` must be non-zero.
    pub fn pick_u32(&mut self, n: u32) -> u32 {
        debug_assert!(n > 0, "pick_u32 from empty range");
        (self.rng.next_u64() % u64::from(n)) as u32
    }

    /// Uniform draw in the inclusive range `[min, max]`.
    pub fn pick_int32(&mut self, min: i32, max: i32) -> i32 {
        debug_assert!(min <= max, "pick_int32 with min > max");
        let span = (i64::from(max) - i64::from(min)) as u64 + 1;
        let off = self.rng.next_u64() % span;
        (i64::from(min) + off as i64) as i32
    }

    pub fn flip_coin(&mut self) -> bool {
        self.rng.next_u64() & 1 == 1
    }

    pub fn pick_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0, "pick_index from empty slice");
        (self.rng.next_u64() % len as u64) as usize
    }

    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.pick_index(items.len())]
    }

    /// Weighted index draw. Zero-weight entries are never picked; the total
    /// weight must be non-zero.
    pub fn pick_weighted(&mut self, weights: &[u32]) -> usize {
        let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
        debug_assert!(total > 0, "pick_weighted with zero total weight");
        let mut roll = self.rng.next_u64() % total;
        for (i, w) in weights.iter().enumerate() {
            let w = u64::from(*w);
            if roll < w {
                return i;
            }
            roll -= w;
        }
        weights.len() - 1
    }
}

/// Entropy-sourced seed for sessions started without `--seed`.
pub fn gen_seed() -> Seed {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    Seed::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = RngSource::new(42);
        let mut b = RngSource::new(42);
        for _ in 0..256 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = RngSource::new(1);
        let mut b = RngSource::new(2);
        let drew: Vec<u32> = (0..16).map(|_| a.next_u32()).collect();
        let other: Vec<u32> = (0..16).map(|_| b.next_u32()).collect();
        assert_ne!(drew, other);
    }

    #[test]
    fn pick_int32_stays_in_bounds() {
        let mut rng = RngSource::new(7);
        for _ in 0..1000 {
            let v = rng.pick_int32(-5, 17);
            assert!((-5..=17).contains(&v));
        }
        assert_eq!(rng.pick_int32(3, 3), 3);
    }

    #[test]
    fn pick_weighted_skips_zero_weights() {
        let mut rng = RngSource::new(9);
        for _ in 0..500 {
            let idx = rng.pick_weighted(&[0, 3, 0, 5]);
            assert!(idx == 1 || idx == 3);
        }
    }
}
