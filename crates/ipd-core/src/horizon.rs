use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Default cap on rounds for a geometric horizon, preventing runaway games.
pub const DEFAULT_MAX_CAP: u64 = 10_000;

/// Horizon kind tag used in observations and round records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonKind {
    /// Fixed round count.
    Fixed,
    /// Geometric stopping.
    Geometric,
}

impl HorizonKind {
    /// Stable lowercase tag (`"fixed"` or `"geometric"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Geometric => "geometric",
        }
    }
}

/// Stopping oracle for a single game. Constructed per replicate from the
/// replicate seed; `reset` rebinds it to a fresh RNG state.
#[derive(Debug, Clone)]
pub enum Horizon {
    /// Stops once `round_index >= n`.
    Fixed {
        /// Total number of rounds.
        n: u64,
    },
    /// Stops at `max_cap`, or at the first index where a Bernoulli(p) draw
    /// from the horizon's private RNG yields true. That index is latched:
    /// once found, all subsequent queries at or after it also stop.
    Geometric {
        /// Per-round stop probability.
        p: f64,
        /// Hard cap on rounds.
        max_cap: u64,
        rng: DeterministicRng,
        latched_at: Option<u64>,
    },
}

impl Horizon {
    /// Construct a fixed horizon of `n` rounds.
    #[must_use]
    pub const fn fixed(n: u64) -> Self {
        Self::Fixed { n }
    }

    /// Construct a geometric horizon with stop probability `p`, seeded from
    /// `seed`, capped at `max_cap` rounds.
    #[must_use]
    pub fn geometric(p: f64, seed: Option<u64>, max_cap: u64) -> Self {
        Self::Geometric {
            p,
            max_cap,
            rng: DeterministicRng::new(seed),
            latched_at: None,
        }
    }

    /// Construct a geometric horizon using [`DEFAULT_MAX_CAP`].
    #[must_use]
    pub fn geometric_default_cap(p: f64, seed: Option<u64>) -> Self {
        Self::geometric(p, seed, DEFAULT_MAX_CAP)
    }

    /// Whether the game should stop after this `round_index` (0-based).
    pub fn should_stop(&mut self, round_index: u64) -> bool {
        match self {
            Self::Fixed { n } => round_index >= *n,
            Self::Geometric {
                p,
                max_cap,
                rng,
                latched_at,
            } => {
                if round_index >= *max_cap {
                    return true;
                }
                if let Some(stopped_at) = *latched_at {
                    return round_index >= stopped_at;
                }
                if rng.bernoulli(*p) {
                    *latched_at = Some(round_index);
                    return true;
                }
                false
            }
        }
    }

    /// Fully reinitialize this horizon for a fresh game with `seed`.
    pub fn reset(&mut self, seed: Option<u64>) {
        match self {
            Self::Fixed { .. } => {}
            Self::Geometric { rng, latched_at, .. } => {
                rng.reset(seed);
                *latched_at = None;
            }
        }
    }

    /// Horizon kind tag.
    #[must_use]
    pub const fn kind(&self) -> HorizonKind {
        match self {
            Self::Fixed { .. } => HorizonKind::Fixed,
            Self::Geometric { .. } => HorizonKind::Geometric,
        }
    }

    /// Total round count, present only for fixed horizons.
    #[must_use]
    pub const fn total_rounds(&self) -> Option<u64> {
        match self {
            Self::Fixed { n } => Some(*n),
            Self::Geometric { .. } => None,
        }
    }

    /// Stop probability, present only for geometric horizons.
    #[must_use]
    pub const fn stop_prob(&self) -> Option<f64> {
        match self {
            Self::Fixed { .. } => None,
            Self::Geometric { p, .. } => Some(*p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_stops_at_n() {
        let mut h = Horizon::fixed(3);
        assert!(!h.should_stop(0));
        assert!(!h.should_stop(1));
        assert!(!h.should_stop(2));
        assert!(h.should_stop(3));
        assert!(h.should_stop(100));
    }

    #[test]
    fn geometric_latches_first_stop_index() {
        let mut h = Horizon::geometric(0.5, Some(7), 10_000);
        let mut stop_index = None;
        for i in 0..1000u64 {
            if h.should_stop(i) {
                stop_index = Some(i);
                break;
            }
        }
        let stop_index = stop_index.expect("should eventually stop");
        // Re-querying at and after the latched index is idempotent.
        assert!(h.should_stop(stop_index));
        assert!(h.should_stop(stop_index + 5));
    }

    #[test]
    fn geometric_respects_max_cap() {
        let mut h = Horizon::geometric(0.0, Some(1), 5);
        for i in 0..5 {
            assert!(!h.should_stop(i));
        }
        assert!(h.should_stop(5));
    }

    #[test]
    fn geometric_reset_rebinds_rng_and_clears_latch() {
        let mut h = Horizon::geometric(0.3, Some(99), 10_000);
        let mut first_stop = 0;
        for i in 0..10_000u64 {
            if h.should_stop(i) {
                first_stop = i;
                break;
            }
        }
        h.reset(Some(99));
        let mut second_stop = 0;
        for i in 0..10_000u64 {
            if h.should_stop(i) {
                second_stop = i;
                break;
            }
        }
        assert_eq!(first_stop, second_stop);
    }

    #[test]
    fn kind_and_total_rounds() {
        let fixed = Horizon::fixed(10);
        assert_eq!(fixed.kind(), HorizonKind::Fixed);
        assert_eq!(fixed.total_rounds(), Some(10));

        let geo = Horizon::geometric_default_cap(0.1, Some(1));
        assert_eq!(geo.kind(), HorizonKind::Geometric);
        assert_eq!(geo.total_rounds(), None);
        assert_eq!(geo.stop_prob(), Some(0.1));
    }
}
