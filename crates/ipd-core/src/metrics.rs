//! Derived per-replicate summary statistics, computed purely from a
//! replicate's round records and the (K, θ) collapse parameters.

use serde::{Deserialize, Serialize};

use crate::payoff::Action;
use crate::transcript::RoundRecord;

/// One row of the aggregates table: metrics for a single (condition,
/// replicate) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionMetrics {
    /// Condition name.
    pub condition: String,
    /// Replicate index.
    pub replicate: u64,
    /// Number of rounds played.
    pub total_rounds: u64,
    /// Agent A's cooperation rate.
    pub agent_a_cooperation_rate: f64,
    /// Agent B's cooperation rate.
    pub agent_b_cooperation_rate: f64,
    /// Mean of the two agents' cooperation rates.
    pub overall_cooperation_rate: f64,
    /// Cumulative joint-cooperation-rate trajectory, one value per round.
    pub cooperation_rate_over_time: Vec<f64>,
    /// Agent A's retaliation rate, absent if undefined.
    pub agent_a_retaliation_rate: Option<f64>,
    /// Agent B's retaliation rate, absent if undefined.
    pub agent_b_retaliation_rate: Option<f64>,
    /// Agent A's forgiveness rate, absent if undefined.
    pub agent_a_forgiveness_rate: Option<f64>,
    /// Agent B's forgiveness rate, absent if undefined.
    pub agent_b_forgiveness_rate: Option<f64>,
    /// Agent A's final cumulative payoff.
    pub agent_a_total_payoff: i64,
    /// Agent B's final cumulative payoff.
    pub agent_b_total_payoff: i64,
    /// Agent A's exploitability gap (B's total minus A's total).
    pub exploitability_gap_a: i64,
    /// Agent B's exploitability gap (A's total minus B's total).
    pub exploitability_gap_b: i64,
    /// Smallest round index at which a K-round window collapsed, if any.
    pub time_to_collapse: Option<u64>,
}

/// Fraction of `actions` equal to C; 0 if empty.
#[must_use]
pub fn cooperation_rate(actions: &[Action]) -> f64 {
    if actions.is_empty() {
        return 0.0;
    }
    let coops = actions.iter().filter(|a| a.is_cooperate()).count();
    #[allow(clippy::cast_precision_loss)]
    let rate = coops as f64 / actions.len() as f64;
    rate
}

/// Cumulative joint-cooperation rate after each round: at index r, total C
/// actions from both agents across rounds `0..=r` divided by `2*(r+1)`.
#[must_use]
pub fn cooperation_rate_over_time(agent_a: &[Action], agent_b: &[Action]) -> Vec<f64> {
    let mut rates = Vec::with_capacity(agent_a.len());
    let mut cum_coops = 0u64;
    for (i, (a, b)) in agent_a.iter().zip(agent_b.iter()).enumerate() {
        if a.is_cooperate() {
            cum_coops += 1;
        }
        if b.is_cooperate() {
            cum_coops += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = cum_coops as f64 / (2.0 * (i as f64 + 1.0));
        rates.push(rate);
    }
    rates
}

/// Among rounds `t >= 1` where `opponent[t-1]` was D, the fraction where
/// `mine[t]` was D. `None` if `mine.len() < 2` or the opponent never
/// defected.
#[must_use]
pub fn retaliation_rate(mine: &[Action], opponent: &[Action]) -> Option<f64> {
    conditional_response_rate(mine, opponent, Action::Defect)
}

/// Among rounds `t >= 1` where `opponent[t-1]` was D, the fraction where
/// `mine[t]` was C. Same definedness rule as [`retaliation_rate`].
#[must_use]
pub fn forgiveness_rate(mine: &[Action], opponent: &[Action]) -> Option<f64> {
    conditional_response_rate(mine, opponent, Action::Cooperate)
}

fn conditional_response_rate(mine: &[Action], opponent: &[Action], response: Action) -> Option<f64> {
    if mine.len() < 2 {
        return None;
    }
    let mut opponent_defects = 0u64;
    let mut matching_response = 0u64;
    for t in 1..mine.len() {
        if opponent[t - 1] == Action::Defect {
            opponent_defects += 1;
            if mine[t] == response {
                matching_response += 1;
            }
        }
    }
    if opponent_defects == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let rate = matching_response as f64 / opponent_defects as f64;
    Some(rate)
}

/// Smallest `r` in `[0, N-K]` such that the joint cooperation rate over
/// rounds `[r, r+K)` is `<= threshold`. `None` if `N < K` or no such `r`
/// exists.
#[must_use]
pub fn time_to_collapse(agent_a: &[Action], agent_b: &[Action], k: u64, threshold: f64) -> Option<u64> {
    let n = agent_a.len() as u64;
    if n < k || k == 0 {
        return None;
    }
    for r in 0..=(n - k) {
        let window_a = &agent_a[r as usize..(r + k) as usize];
        let window_b = &agent_b[r as usize..(r + k) as usize];
        let coops = window_a.iter().filter(|a| a.is_cooperate()).count()
            + window_b.iter().filter(|b| b.is_cooperate()).count();
        #[allow(clippy::cast_precision_loss)]
        let rate = coops as f64 / (2.0 * k as f64);
        if rate <= threshold {
            return Some(r);
        }
    }
    None
}

/// Compute all metrics for one replicate's ordered round list. `rounds`
/// must already be sorted by `round_index`.
#[must_use]
pub fn compute_metrics_for_replicate(
    condition: &str,
    replicate: u64,
    rounds: &[RoundRecord],
    collapse_k: u64,
    collapse_threshold: f64,
) -> ConditionMetrics {
    let agent_a_actions: Vec<Action> = rounds.iter().map(|r| r.agent_a_action).collect();
    let agent_b_actions: Vec<Action> = rounds.iter().map(|r| r.agent_b_action).collect();

    let agent_a_cooperation_rate = cooperation_rate(&agent_a_actions);
    let agent_b_cooperation_rate = cooperation_rate(&agent_b_actions);
    let overall_cooperation_rate = (agent_a_cooperation_rate + agent_b_cooperation_rate) / 2.0;

    let (agent_a_total_payoff, agent_b_total_payoff) = rounds
        .last()
        .map_or((0, 0), |r| (r.agent_a_cum_payoff, r.agent_b_cum_payoff));

    ConditionMetrics {
        condition: condition.to_string(),
        replicate,
        total_rounds: rounds.len() as u64,
        agent_a_cooperation_rate,
        agent_b_cooperation_rate,
        overall_cooperation_rate,
        cooperation_rate_over_time: cooperation_rate_over_time(&agent_a_actions, &agent_b_actions),
        agent_a_retaliation_rate: retaliation_rate(&agent_a_actions, &agent_b_actions),
        agent_b_retaliation_rate: retaliation_rate(&agent_b_actions, &agent_a_actions),
        agent_a_forgiveness_rate: forgiveness_rate(&agent_a_actions, &agent_b_actions),
        agent_b_forgiveness_rate: forgiveness_rate(&agent_b_actions, &agent_a_actions),
        agent_a_total_payoff,
        agent_b_total_payoff,
        exploitability_gap_a: agent_b_total_payoff - agent_a_total_payoff,
        exploitability_gap_b: agent_a_total_payoff - agent_b_total_payoff,
        time_to_collapse: time_to_collapse(
            &agent_a_actions,
            &agent_b_actions,
            collapse_k,
            collapse_threshold,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Action::{Cooperate as C, Defect as D};

    #[test]
    fn cooperation_rate_empty_is_zero() {
        assert_eq!(cooperation_rate(&[]), 0.0);
    }

    #[test]
    fn cooperation_rate_counts_fraction() {
        assert_eq!(cooperation_rate(&[C, C, D, D]), 0.5);
    }

    #[test]
    fn retaliation_undefined_when_opponent_never_defects() {
        assert_eq!(retaliation_rate(&[C, C, C], &[C, C, C]), None);
    }

    #[test]
    fn retaliation_and_forgiveness_are_complementary_when_always_one_response() {
        // Opponent defects at t=0; mine defects at t=1 in response.
        let mine = vec![C, D, D];
        let opponent = vec![D, D, C];
        assert_eq!(retaliation_rate(&mine, &opponent), Some(1.0));
        assert_eq!(forgiveness_rate(&mine, &opponent), Some(0.0));
    }

    #[test]
    fn time_to_collapse_scenario_3_alld_vs_alld() {
        let a = vec![D; 20];
        let b = vec![D; 20];
        assert_eq!(time_to_collapse(&a, &b, 10, 0.2), Some(0));
    }

    #[test]
    fn time_to_collapse_undefined_when_n_less_than_k() {
        let a = vec![D; 5];
        let b = vec![D; 5];
        assert_eq!(time_to_collapse(&a, &b, 10, 0.2), None);
    }

    #[test]
    fn time_to_collapse_undefined_when_cooperation_never_drops() {
        let a = vec![C; 20];
        let b = vec![C; 20];
        assert_eq!(time_to_collapse(&a, &b, 10, 0.2), None);
    }
}
