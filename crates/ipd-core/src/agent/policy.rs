//! Fixed finite-memory policy agents: ALLC, ALLD, TFT, GRIM, GTFT, WSLS.

use crate::config::PolicyParams;
use crate::error::CoreError;
use crate::payoff::Action;
use crate::rng::DeterministicRng;
use crate::transcript::Observation;

/// One of the six fixed policy strategies.
///
/// A closed sum type rather than a trait object: the set of policies is
/// fixed and known ahead of time, and each variant's private state (if any)
/// lives directly on the enum.
#[derive(Debug, Clone)]
pub enum PolicyAgent {
    /// Always cooperate. Stateless.
    Allc,
    /// Always defect. Stateless.
    Alld,
    /// Copy the opponent's last action; cooperate with no history.
    Tft,
    /// Cooperate until the opponent ever defects, then always defect.
    Grim {
        /// Set permanently once any past opponent action was D.
        triggered: bool,
    },
    /// Like TFT, but forgives a defection with probability `generous_prob`.
    Gtft {
        /// Forgiveness probability.
        generous_prob: f64,
        /// Private RNG, seeded on construction/reset.
        rng: DeterministicRng,
    },
    /// Repeats its own last action if its last payoff met `win_threshold`,
    /// otherwise switches.
    Wsls {
        /// Payoff threshold for staying with the previous action.
        win_threshold: i64,
    },
}

impl PolicyAgent {
    /// Construct a policy agent by name, using `params` for GTFT/WSLS and
    /// `seed` to seed GTFT's private RNG.
    pub fn create(name: &str, params: PolicyParams, seed: Option<u64>) -> Result<Self, CoreError> {
        match name {
            "ALLC" => Ok(Self::Allc),
            "ALLD" => Ok(Self::Alld),
            "TFT" => Ok(Self::Tft),
            "GRIM" => Ok(Self::Grim { triggered: false }),
            "GTFT" => Ok(Self::Gtft {
                generous_prob: params.generous_prob,
                rng: DeterministicRng::new(seed),
            }),
            "WSLS" => Ok(Self::Wsls {
                win_threshold: params.wsls_win_threshold,
            }),
            other => Err(CoreError::UnknownPolicy(other.to_string())),
        }
    }

    /// Reset this policy to a pre-game state, equivalent to a fresh
    /// construction with `seed`.
    pub fn reset(&mut self, seed: Option<u64>) {
        match self {
            Self::Allc | Self::Alld | Self::Tft | Self::Wsls { .. } => {}
            Self::Grim { triggered } => *triggered = false,
            Self::Gtft { rng, .. } => rng.reset(seed),
        }
    }

    /// Choose an action for this observation.
    pub fn act(&mut self, obs: &Observation) -> Action {
        match self {
            Self::Allc => Action::Cooperate,
            Self::Alld => Action::Defect,
            Self::Tft => obs
                .history
                .last()
                .map_or(Action::Cooperate, |(_, opponent, _, _)| *opponent),
            Self::Grim { triggered } => {
                if *triggered {
                    return Action::Defect;
                }
                if obs
                    .history
                    .iter()
                    .any(|(_, opponent, _, _)| *opponent == Action::Defect)
                {
                    *triggered = true;
                    return Action::Defect;
                }
                Action::Cooperate
            }
            Self::Gtft { generous_prob, rng } => match obs.history.last() {
                None => Action::Cooperate,
                Some((_, opponent, _, _)) if *opponent == Action::Defect => {
                    if rng.bernoulli(*generous_prob) {
                        Action::Cooperate
                    } else {
                        Action::Defect
                    }
                }
                Some(_) => Action::Cooperate,
            },
            Self::Wsls { win_threshold } => match obs.history.last() {
                None => Action::Cooperate,
                Some((my_last, _, my_last_payoff, _)) => {
                    if *my_last_payoff >= *win_threshold {
                        *my_last
                    } else {
                        match my_last {
                            Action::Cooperate => Action::Defect,
                            Action::Defect => Action::Cooperate,
                        }
                    }
                }
            },
        }
    }
}
