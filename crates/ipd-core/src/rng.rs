use serde::{Deserialize, Serialize};

/// Deterministic RNG used throughout the engine.
///
/// Intentionally simple and reproducible across platforms and toolchains —
/// the algorithm is fixed and recorded in the run manifest
/// (`environment.rng_algorithm`) so two runs of the same config always
/// produce byte-identical logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    seed: Option<u64>,
    state: u64,
}

/// Stable identifier for the RNG algorithm, recorded in the manifest.
pub const RNG_ALGORITHM: &str = "splitmix64-lcg";

impl DeterministicRng {
    /// Create a new RNG from an optional seed. `None` means nondeterministic:
    /// state is seeded from the current time, and `fork` will also yield
    /// nondeterministic children.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let state = match seed {
            Some(s) => s ^ 0x9E37_79B9_7F4A_7C15,
            None => nondeterministic_seed() ^ 0x9E37_79B9_7F4A_7C15,
        };
        Self { seed, state }
    }

    /// Convenience constructor for a deterministic seed.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    /// The seed this RNG was constructed with, if any.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Rebind this RNG to a fresh state from `seed`.
    pub fn reset(&mut self, seed: Option<u64>) {
        *self = Self::new(seed);
    }

    /// Derive a child RNG whose seed is a deterministic function of this
    /// RNG's seed and `suffix`: `parent_seed + suffix + 1`. When this RNG is
    /// nondeterministic, the child is nondeterministic too.
    #[must_use]
    pub fn fork(&self, suffix: u64) -> Self {
        match self.seed {
            Some(parent) => Self::from_seed(parent.wrapping_add(suffix).wrapping_add(1)),
            None => Self::new(None),
        }
    }

    /// Next raw pseudo-random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.state
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform01(&mut self) -> f64 {
        // Top 53 bits give a uniform double in [0, 1).
        let bits = self.next_u64() >> 11;
        (bits as f64) * (1.0 / (1u64 << 53) as f64)
    }

    /// Next value in `[0, upper_exclusive)`.
    pub fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        self.next_u64() % upper_exclusive
    }

    /// Choose a random element from a non-empty slice.
    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.next_bounded(items.len() as u64) as usize;
        items.get(idx)
    }

    /// Bernoulli trial with probability `p` (clamped to `[0, 1]`).
    pub fn bernoulli(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.uniform01() < p
    }
}

fn nondeterministic_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = DeterministicRng::from_seed(7);
        let mut b = DeterministicRng::from_seed(7);
        let seq_a: Vec<u64> = (0..20).map(|_| a.next_u64()).collect();
        let seq_b: Vec<u64> = (0..20).map(|_| b.next_u64()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn fork_is_deterministic_function_of_parent_and_suffix() {
        let parent = DeterministicRng::from_seed(42);
        let child1 = parent.fork(1000);
        let child2 = parent.fork(1000);
        assert_eq!(child1.seed(), child2.seed());
        assert_eq!(child1.seed(), Some(42 + 1000 + 1));
    }

    #[test]
    fn fork_of_nondeterministic_stays_nondeterministic() {
        let parent = DeterministicRng::new(None);
        let child = parent.fork(5);
        assert_eq!(child.seed(), None);
    }

    #[test]
    fn uniform01_stays_in_range() {
        let mut rng = DeterministicRng::from_seed(1);
        for _ in 0..1000 {
            let x = rng.uniform01();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn next_bounded_zero_upper_is_zero() {
        let mut rng = DeterministicRng::from_seed(1);
        assert_eq!(rng.next_bounded(0), 0);
    }

    #[test]
    fn bernoulli_boundaries() {
        let mut rng = DeterministicRng::from_seed(3);
        assert!(!rng.bernoulli(0.0));
        assert!(rng.bernoulli(1.0));
    }
}
