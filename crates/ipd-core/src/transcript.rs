use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::horizon::HorizonKind;
use crate::ids::{ConditionName, RunId};
use crate::payoff::{Action, PayoffMatrix};

/// Default number of prior rounds an observation exposes.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Which side of a game an observation or action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Agent A.
    A,
    /// Agent B.
    B,
}

/// An immutable record of one completed round.
///
/// Produced once per round. The context keys (`run_id`, `condition`,
/// `replicate`, `horizon_type`, and either `fixed_n` or `stop_prob`) and
/// `timestamp_utc` are carried alongside the round data so the record is
/// self-describing when scanned out of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Run identifier.
    pub run_id: RunId,
    /// Condition name.
    pub condition: ConditionName,
    /// Replicate index (0-based).
    pub replicate: u64,
    /// Round index (0-based).
    pub round_index: u64,
    /// Agent A's action this round.
    pub agent_a_action: Action,
    /// Agent B's action this round.
    pub agent_b_action: Action,
    /// Agent A's payoff this round.
    pub agent_a_payoff: i64,
    /// Agent B's payoff this round.
    pub agent_b_payoff: i64,
    /// Agent A's cumulative payoff through this round.
    pub agent_a_cum_payoff: i64,
    /// Agent B's cumulative payoff through this round.
    pub agent_b_cum_payoff: i64,
    /// Horizon kind for this game.
    pub horizon_type: HorizonKind,
    /// Total rounds, present only when `horizon_type` is fixed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_n: Option<u64>,
    /// Per-round stop probability, present only when `horizon_type` is geometric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_prob: Option<f64>,
    /// UTC timestamp when the round was recorded. Excluded from
    /// reproducibility comparisons — recorded for forensics only.
    pub timestamp_utc: DateTime<Utc>,
    /// Opaque per-agent prompts, included only when the run requests them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<BTreeMap<String, AgentPrompt>>,
    /// Raw completion text per agent, included only when the run requests them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_responses: Option<BTreeMap<String, String>>,
}

/// System/round prompt pair sent to an LLM agent for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPrompt {
    /// System prompt.
    pub system: String,
    /// Round (user) prompt.
    pub round: String,
}

/// One prior round, re-projected from a side's perspective:
/// `(my_action, opponent_action, my_payoff, opponent_payoff)`.
pub type HistoryEntry = (Action, Action, i64, i64);

/// The strictly partial view handed to an agent on one round.
///
/// A pure value: agents must not retain references into it beyond `act`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// 1-based round number about to be played.
    pub round_number: u64,
    /// Most recent completed rounds, from this side's perspective, oldest first.
    pub history: Vec<HistoryEntry>,
    /// This side's cumulative payoff after the last completed round.
    pub my_cumulative_payoff: i64,
    /// The opponent's cumulative payoff after the last completed round.
    pub opponent_cumulative_payoff: i64,
    /// The payoff matrix in force for this game.
    pub payoff_matrix: serde_json::Value,
    /// Horizon kind.
    pub horizon_type: HorizonKind,
    /// Total rounds, present iff `horizon_type` is fixed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_rounds: Option<u64>,
}

/// Per-game mutable buffer of [`RoundRecord`]s in append order.
///
/// Created empty when a replicate begins, appended to once per round,
/// discarded after the replicate ends. The sole authority for building
/// observations within a replicate.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    rounds: Vec<RoundRecord>,
    history_window: usize,
}

impl Transcript {
    /// Create an empty transcript with the given history window.
    #[must_use]
    pub fn new(history_window: usize) -> Self {
        Self {
            rounds: Vec::new(),
            history_window,
        }
    }

    /// Append a round in play order. Rounds must be appended in increasing
    /// `round_index` order; this is a caller invariant, not enforced here.
    pub fn append(&mut self, record: RoundRecord) {
        self.rounds.push(record);
    }

    /// Clear all rounds, returning the transcript to its initial state.
    pub fn reset(&mut self) {
        self.rounds.clear();
    }

    /// All rounds recorded so far, in append order.
    #[must_use]
    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    /// Build a fresh observation for `side` ahead of playing `round_number`
    /// (1-based). Takes the last `history_window` records, projects each
    /// from `side`'s perspective, and fills cumulative payoffs from the most
    /// recent record (0 if the transcript is empty).
    #[must_use]
    pub fn observation_for(
        &self,
        round_number: u64,
        side: Side,
        payoff_matrix: &PayoffMatrix,
        horizon_type: HorizonKind,
        total_rounds: Option<u64>,
    ) -> Observation {
        let window_start = self.rounds.len().saturating_sub(self.history_window);
        let windowed = &self.rounds[window_start..];

        let history = windowed
            .iter()
            .map(|r| project(r, side))
            .collect::<Vec<_>>();

        let (my_cumulative_payoff, opponent_cumulative_payoff) = match self.rounds.last() {
            Some(last) => match side {
                Side::A => (last.agent_a_cum_payoff, last.agent_b_cum_payoff),
                Side::B => (last.agent_b_cum_payoff, last.agent_a_cum_payoff),
            },
            None => (0, 0),
        };

        Observation {
            round_number,
            history,
            my_cumulative_payoff,
            opponent_cumulative_payoff,
            payoff_matrix: payoff_matrix.to_nested_map(),
            horizon_type,
            total_rounds,
        }
    }
}

/// Render `observation.history` as readable lines for prompt assembly.
#[must_use]
pub fn format_history_text(observation: &Observation) -> String {
    if observation.history.is_empty() {
        return "No history yet (this is the first round).".to_string();
    }
    let start_round = observation.round_number.saturating_sub(observation.history.len() as u64);
    observation
        .history
        .iter()
        .enumerate()
        .map(|(i, (my_action, opp_action, my_payoff, opp_payoff))| {
            let round_num = start_round + i as u64;
            format!(
                "Round {round_num}: You played {my_action}, Opponent played {opp_action} -> You got {my_payoff}, Opponent got {opp_payoff}"
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render cumulative payoffs as readable text for prompt assembly.
#[must_use]
pub fn format_cumulative_totals(observation: &Observation) -> String {
    format!(
        "Your cumulative payoff: {}\nOpponent's cumulative payoff: {}",
        observation.my_cumulative_payoff, observation.opponent_cumulative_payoff
    )
}

/// Render the horizon as readable text for prompt assembly.
#[must_use]
pub fn format_horizon_text(observation: &Observation) -> String {
    match (observation.horizon_type, observation.total_rounds) {
        (HorizonKind::Fixed, Some(n)) => format!(" of {n}"),
        _ => " (game continues until stopped)".to_string(),
    }
}

fn project(record: &RoundRecord, side: Side) -> HistoryEntry {
    match side {
        Side::A => (
            record.agent_a_action,
            record.agent_b_action,
            record.agent_a_payoff,
            record.agent_b_payoff,
        ),
        Side::B => (
            record.agent_b_action,
            record.agent_a_action,
            record.agent_b_payoff,
            record.agent_a_payoff,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(round_index: u64, a: Action, b: Action, cum_a: i64, cum_b: i64) -> RoundRecord {
        RoundRecord {
            run_id: "run-1".into(),
            condition: "cond".into(),
            replicate: 0,
            round_index,
            agent_a_action: a,
            agent_b_action: b,
            agent_a_payoff: 0,
            agent_b_payoff: 0,
            agent_a_cum_payoff: cum_a,
            agent_b_cum_payoff: cum_b,
            horizon_type: HorizonKind::Fixed,
            fixed_n: Some(10),
            stop_prob: None,
            timestamp_utc: Utc::now(),
            prompts: None,
            raw_responses: None,
        }
    }

    #[test]
    fn empty_transcript_has_zero_cumulative() {
        let t = Transcript::new(DEFAULT_HISTORY_WINDOW);
        let obs = t.observation_for(
            1,
            Side::A,
            &PayoffMatrix::canonical_pd(),
            HorizonKind::Fixed,
            Some(10),
        );
        assert!(obs.history.is_empty());
        assert_eq!(obs.my_cumulative_payoff, 0);
        assert_eq!(obs.opponent_cumulative_payoff, 0);
    }

    #[test]
    fn observation_swaps_perspective_for_side_b() {
        let mut t = Transcript::new(DEFAULT_HISTORY_WINDOW);
        t.append(sample_record(0, Action::Cooperate, Action::Defect, 0, 5));

        let obs_a = t.observation_for(
            2,
            Side::A,
            &PayoffMatrix::canonical_pd(),
            HorizonKind::Fixed,
            Some(10),
        );
        assert_eq!(
            obs_a.history[0],
            (Action::Cooperate, Action::Defect, 0, 0)
        );
        assert_eq!(obs_a.my_cumulative_payoff, 0);
        assert_eq!(obs_a.opponent_cumulative_payoff, 5);

        let obs_b = t.observation_for(
            2,
            Side::B,
            &PayoffMatrix::canonical_pd(),
            HorizonKind::Fixed,
            Some(10),
        );
        assert_eq!(
            obs_b.history[0],
            (Action::Defect, Action::Cooperate, 0, 0)
        );
        assert_eq!(obs_b.my_cumulative_payoff, 5);
        assert_eq!(obs_b.opponent_cumulative_payoff, 0);
    }

    #[test]
    fn history_window_caps_length() {
        let mut t = Transcript::new(2);
        for i in 0..5u64 {
            t.append(sample_record(i, Action::Cooperate, Action::Cooperate, 0, 0));
        }
        let obs = t.observation_for(
            6,
            Side::A,
            &PayoffMatrix::canonical_pd(),
            HorizonKind::Fixed,
            Some(10),
        );
        assert_eq!(obs.history.len(), 2);
    }

    #[test]
    fn reset_clears_rounds() {
        let mut t = Transcript::new(DEFAULT_HISTORY_WINDOW);
        t.append(sample_record(0, Action::Cooperate, Action::Cooperate, 3, 3));
        t.reset();
        assert!(t.rounds().is_empty());
    }
}
