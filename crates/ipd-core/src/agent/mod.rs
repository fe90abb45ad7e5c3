//! The agent contract: a closed set of variants sharing `reset`/`act`.

pub mod llm;
pub mod policy;

pub use llm::{CompletionAdapter, LastPrompts, LlmAgent, MockCompletionAdapter};
pub use policy::PolicyAgent;

use crate::error::CoreError;
use crate::parser::ParseAttempt;
use crate::payoff::Action;
use crate::transcript::Observation;

/// Either a fixed policy or an LLM-backed agent.
///
/// A sum type, not a trait object: the set of agent kinds is fixed by this
/// engine, and the registry is the sole place new instances are built. For
/// LLM agents, `last_prompts`/`last_raw_response`/`parse_attempts` expose
/// read-only diagnostics the runner consults after `act`; policy agents
/// always report these as absent/empty.
pub enum Agent {
    /// A fixed finite-memory policy.
    Policy(PolicyAgent),
    /// A language-model-backed agent.
    Llm(LlmAgent),
}

impl Agent {
    /// Reset this agent to a pre-game state equivalent to a fresh
    /// construction with `seed`.
    pub fn reset(&mut self, seed: Option<u64>) {
        match self {
            Self::Policy(p) => p.reset(seed),
            Self::Llm(l) => l.reset(seed),
        }
    }

    /// Choose an action given `observation`. Only LLM agents can fail here,
    /// and only on a completion-adapter error (fatal per §7).
    pub fn act(&mut self, observation: &Observation) -> Result<Action, CoreError> {
        match self {
            Self::Policy(p) => Ok(p.act(observation)),
            Self::Llm(l) => l.act(observation),
        }
    }

    /// The most recent system/round prompt pair, if this is an LLM agent
    /// that has acted at least once.
    #[must_use]
    pub fn last_prompts(&self) -> Option<&LastPrompts> {
        match self {
            Self::Policy(_) => None,
            Self::Llm(l) => l.last_prompts(),
        }
    }

    /// The raw completion text that produced the last returned action, if
    /// this is an LLM agent that has acted at least once.
    #[must_use]
    pub fn last_raw_response(&self) -> Option<&str> {
        match self {
            Self::Policy(_) => None,
            Self::Llm(l) => l.last_raw_response(),
        }
    }

    /// The parse-attempt trail from the last `act` call; empty for policy
    /// agents.
    #[must_use]
    pub fn parse_attempts(&self) -> &[ParseAttempt] {
        match self {
            Self::Policy(_) => &[],
            Self::Llm(l) => l.parse_attempts(),
        }
    }
}
