use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two symbols a player can play on a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Cooperate.
    Cooperate,
    /// Defect.
    Defect,
}

impl Action {
    /// Single uppercase character wire form.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Cooperate => 'C',
            Self::Defect => 'D',
        }
    }

    /// True iff this is `Cooperate`.
    #[must_use]
    pub const fn is_cooperate(self) -> bool {
        matches!(self, Self::Cooperate)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cooperate => "C",
            Self::Defect => "D",
        })
    }
}

/// Payoffs for the four `(a, b)` action pairs, as `(payoff_a, payoff_b)`.
///
/// Immutable once constructed. The canonical Prisoner's Dilemma instance is
/// `{CC->(3,3), CD->(0,5), DC->(5,0), DD->(1,1)}`; the defining inequalities
/// `DC > CC > DD > CD` and `2*CC > DC+CD` are not enforced — the matrix uses
/// whatever the config supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoffMatrix {
    cc: (i64, i64),
    cd: (i64, i64),
    dc: (i64, i64),
    dd: (i64, i64),
}

impl PayoffMatrix {
    /// Build a matrix from its four outcomes.
    #[must_use]
    pub const fn new(cc: (i64, i64), cd: (i64, i64), dc: (i64, i64), dd: (i64, i64)) -> Self {
        Self { cc, cd, dc, dd }
    }

    /// The canonical Prisoner's Dilemma payoff matrix.
    #[must_use]
    pub const fn canonical_pd() -> Self {
        Self::new((3, 3), (0, 5), (5, 0), (1, 1))
    }

    /// Payoffs for `(action_a, action_b)`, returned as `(payoff_a, payoff_b)`.
    #[must_use]
    pub const fn payoffs(&self, a: Action, b: Action) -> (i64, i64) {
        match (a, b) {
            (Action::Cooperate, Action::Cooperate) => self.cc,
            (Action::Cooperate, Action::Defect) => self.cd,
            (Action::Defect, Action::Cooperate) => self.dc,
            (Action::Defect, Action::Defect) => self.dd,
        }
    }

    /// Serialize to the nested `{C: {C: [a,b], D: [a,b]}, D: {...}}` shape
    /// used in observations and the config document.
    #[must_use]
    pub fn to_nested_map(&self) -> serde_json::Value {
        serde_json::json!({
            "C": {"C": [self.cc.0, self.cc.1], "D": [self.cd.0, self.cd.1]},
            "D": {"C": [self.dc.0, self.dc.1], "D": [self.dd.0, self.dd.1]},
        })
    }

    /// Parse the nested `{C: {C: [a,b], D: [a,b]}, D: {...}}` shape produced
    /// by [`Self::to_nested_map`], as found in an [`crate::transcript::Observation`].
    #[must_use]
    pub fn from_nested_map(value: &serde_json::Value) -> Option<Self> {
        let pair = |side: &str, action: &str| -> Option<(i64, i64)> {
            let arr = value.get(side)?.get(action)?.as_array()?;
            Some((arr.first()?.as_i64()?, arr.get(1)?.as_i64()?))
        };
        Some(Self::new(
            pair("C", "C")?,
            pair("C", "D")?,
            pair("D", "C")?,
            pair("D", "D")?,
        ))
    }

    /// Human-readable four-row table for prompt assembly.
    #[must_use]
    pub fn format_table(&self) -> String {
        let mut out = String::from(
            "Your action | Opponent action | Your payoff | Opponent payoff\n\
             ------------|------------------|-------------|----------------\n",
        );
        for my in [Action::Cooperate, Action::Defect] {
            for opp in [Action::Cooperate, Action::Defect] {
                let (mine, theirs) = self.payoffs(my, opp);
                out.push_str(&format!(
                    "     {my}      |        {opp}         |      {mine}      |       {theirs}\n"
                ));
            }
        }
        out
    }
}

impl Default for PayoffMatrix {
    fn default() -> Self {
        Self::canonical_pd()
    }
}
