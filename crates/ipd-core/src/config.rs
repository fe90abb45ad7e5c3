//! Typed configuration model and a `serde_yaml` convenience loader.
//!
//! These structs mirror the YAML document described for the experiment
//! engine: `run`, `game`, `horizon`, `experiment`, `metrics` at the top
//! level, plus the nested agent-config fragments consumed by the registry.
//! Loading a document from a filesystem path is left to callers; this
//! module only parses an already-read string.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::horizon::DEFAULT_MAX_CAP;
use crate::ids::{ConditionName, RunId};

/// Top-level experiment configuration, the root of the YAML document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullExperimentConfig {
    /// Run-level settings (id, seed, output directory, log verbosity flags).
    pub run: RunConfig,
    /// Game rules.
    #[serde(default)]
    pub game: GameConfig,
    /// Stopping rule.
    #[serde(default)]
    pub horizon: HorizonConfig,
    /// Conditions and replicate count.
    pub experiment: ExperimentConfig,
    /// Metrics computation parameters.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Caller-supplied run identifier.
    pub run_id: RunId,
    /// Run seed. Defaults to a fixed constant rather than `Option` so the
    /// default document is still fully reproducible.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Output directory for artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Whether round records should carry the `prompts` field.
    #[serde(default = "default_true")]
    pub store_prompts: bool,
    /// Whether round records should carry the `raw_responses` field.
    #[serde(default = "default_true")]
    pub store_raw_responses: bool,
}

fn default_seed() -> u64 {
    1337
}

fn default_output_dir() -> String {
    "data/runs".to_string()
}

const fn default_true() -> bool {
    true
}

/// Payoffs for one action pair, `[payoff_a, payoff_b]`.
pub type PayoffPair = [i64; 2];

/// Nested payoff-matrix document: `{C: {C:[a,b], D:[a,b]}, D: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffMatrixConfig {
    /// Outcomes when this agent plays C, keyed by opponent's action.
    #[serde(rename = "C")]
    pub c: BTreeMap<String, PayoffPair>,
    /// Outcomes when this agent plays D, keyed by opponent's action.
    #[serde(rename = "D")]
    pub d: BTreeMap<String, PayoffPair>,
}

impl Default for PayoffMatrixConfig {
    fn default() -> Self {
        let mut c = BTreeMap::new();
        c.insert("C".to_string(), [3, 3]);
        c.insert("D".to_string(), [0, 5]);
        let mut d = BTreeMap::new();
        d.insert("C".to_string(), [5, 0]);
        d.insert("D".to_string(), [1, 1]);
        Self { c, d }
    }
}

impl PayoffMatrixConfig {
    /// Resolve this document into a [`crate::payoff::PayoffMatrix`].
    pub fn to_payoff_matrix(&self) -> Result<crate::payoff::PayoffMatrix> {
        let cc = lookup_pair(&self.c, "C")?;
        let cd = lookup_pair(&self.c, "D")?;
        let dc = lookup_pair(&self.d, "C")?;
        let dd = lookup_pair(&self.d, "D")?;
        Ok(crate::payoff::PayoffMatrix::new(cc, cd, dc, dd))
    }
}

fn lookup_pair(map: &BTreeMap<String, PayoffPair>, key: &str) -> Result<(i64, i64)> {
    map.get(key)
        .map(|pair| (pair[0], pair[1]))
        .ok_or_else(|| CoreError::Config(format!("payoff_matrix missing entry for {key}")))
}

/// Game rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Display name of the game.
    #[serde(default = "default_game_name")]
    pub name: String,
    /// Payoff matrix document.
    #[serde(default)]
    pub payoff_matrix: PayoffMatrixConfig,
}

fn default_game_name() -> String {
    "prisoners_dilemma".to_string()
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            name: default_game_name(),
            payoff_matrix: PayoffMatrixConfig::default(),
        }
    }
}

/// Horizon kind tag as it appears in config documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonConfigKind {
    /// Fixed round count.
    Fixed,
    /// Geometric stopping.
    Geometric,
}

/// Stopping-rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonConfig {
    /// Which horizon kind to construct.
    #[serde(rename = "type", default = "default_horizon_kind")]
    pub kind: HorizonConfigKind,
    /// Round count for fixed horizons.
    #[serde(default = "default_n_rounds")]
    pub n_rounds: u64,
    /// Per-round stop probability for geometric horizons.
    #[serde(default = "default_stop_prob")]
    pub stop_prob: f64,
    /// Hard cap on rounds for geometric horizons.
    #[serde(default = "default_max_cap")]
    pub max_cap: u64,
}

const fn default_horizon_kind() -> HorizonConfigKind {
    HorizonConfigKind::Fixed
}

const fn default_n_rounds() -> u64 {
    100
}

const fn default_stop_prob() -> f64 {
    0.02
}

const fn default_max_cap() -> u64 {
    DEFAULT_MAX_CAP
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            kind: default_horizon_kind(),
            n_rounds: default_n_rounds(),
            stop_prob: default_stop_prob(),
            max_cap: default_max_cap(),
        }
    }
}

/// Time-to-collapse metric parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollapseConfig {
    /// Window size.
    #[serde(default = "default_collapse_k")]
    pub k: u64,
    /// Joint-cooperation threshold.
    #[serde(default = "default_collapse_theta")]
    pub cooperation_threshold: f64,
}

const fn default_collapse_k() -> u64 {
    10
}

const fn default_collapse_theta() -> f64 {
    0.2
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            k: default_collapse_k(),
            cooperation_threshold: default_collapse_theta(),
        }
    }
}

/// Metrics computation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Time-to-collapse parameters.
    #[serde(default)]
    pub collapse: CollapseConfig,
    /// Names of metrics requested in the aggregates table.
    #[serde(default = "default_report")]
    pub report: Vec<String>,
}

fn default_report() -> Vec<String> {
    vec![
        "cooperation_rate".to_string(),
        "cooperation_rate_over_time".to_string(),
        "retaliation_rate".to_string(),
        "forgiveness_rate".to_string(),
        "exploitability_payoff_gap".to_string(),
        "time_to_collapse".to_string(),
    ]
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            collapse: CollapseConfig::default(),
            report: default_report(),
        }
    }
}

/// A named reference to an agent config fragment, plus overrides to deep
/// merge on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRef {
    /// Name of the config fragment this reference resolves against, as
    /// supplied to an [`crate::registry::AgentRegistry`].
    #[serde(rename = "ref")]
    pub reference: String,
    /// Overrides deep-merged onto the base fragment.
    #[serde(default)]
    pub overrides: serde_json::Value,
}

/// One experiment condition: a name plus the two agent references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Condition name, used as a context key in round records.
    pub name: ConditionName,
    /// Agent A's reference.
    pub agent_a: AgentRef,
    /// Agent B's reference.
    pub agent_b: AgentRef,
}

/// Experiment-level settings: conditions and replicate count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Number of independent replicates per condition.
    #[serde(default = "default_replicates")]
    pub replicates: u64,
    /// Ordered list of conditions.
    pub conditions: Vec<ConditionConfig>,
}

const fn default_replicates() -> u64 {
    5
}

/// Parameters shared by the generous and win-stay-lose-shift policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyParams {
    /// GTFT: probability of cooperating anyway after an opponent defection.
    #[serde(default = "default_generous_prob")]
    pub generous_prob: f64,
    /// WSLS: payoff threshold for repeating the previous action.
    #[serde(default = "default_win_threshold")]
    pub wsls_win_threshold: i64,
}

const fn default_generous_prob() -> f64 {
    0.1
}

const fn default_win_threshold() -> i64 {
    3
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            generous_prob: default_generous_prob(),
            wsls_win_threshold: default_win_threshold(),
        }
    }
}

/// Config fragment for a policy agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAgentConfig {
    /// Policy name: one of `ALLC`, `ALLD`, `TFT`, `GRIM`, `GTFT`, `WSLS`.
    pub policy: String,
    /// Policy parameters.
    #[serde(default)]
    pub policy_params: PolicyParams,
}

/// Mock completion provider configuration, used in tests and demos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    /// `fixed`: always return `fixed_output`. `scripted`: cycle through
    /// `scripted_outputs` in order.
    #[serde(default = "default_mock_mode")]
    pub mode: String,
    /// Output returned in `fixed` mode.
    #[serde(default = "default_fixed_output")]
    pub fixed_output: String,
    /// Outputs returned in order in `scripted` mode.
    #[serde(default)]
    pub scripted_outputs: Vec<String>,
}

fn default_mock_mode() -> String {
    "fixed".to_string()
}

fn default_fixed_output() -> String {
    "C".to_string()
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            mode: default_mock_mode(),
            fixed_output: default_fixed_output(),
            scripted_outputs: Vec::new(),
        }
    }
}

/// Retry behavior for the strict output parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum additional attempts after the first parse failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retry strategy tag, recorded for diagnostics only; the engine always
    /// reprompts with the original context plus a correction message.
    #[serde(default = "default_on_invalid")]
    pub on_invalid: String,
}

const fn default_max_retries() -> u32 {
    2
}

fn default_on_invalid() -> String {
    "reprompt_same_context".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            on_invalid: default_on_invalid(),
        }
    }
}

/// Output-parsing configuration for LLM agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Expected output shape. Only `single_token` is currently parsed.
    #[serde(default = "default_output_format")]
    pub format: String,
    /// Allowed single-token values.
    #[serde(default = "default_allowed")]
    pub allowed: Vec<String>,
    /// Retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_output_format() -> String {
    "single_token".to_string()
}

fn default_allowed() -> Vec<String> {
    vec!["C".to_string(), "D".to_string()]
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
            allowed: default_allowed(),
            retry: RetryConfig::default(),
        }
    }
}

/// Prompt assembly configuration for LLM agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptingConfig {
    /// Path to the system prompt template, resolved by the caller.
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: String,
    /// Path to the round prompt template, resolved by the caller.
    #[serde(default = "default_round_prompt_path")]
    pub round_prompt_path: String,
    /// Persona label interpolated into the prompt.
    #[serde(default = "default_persona")]
    pub persona: String,
    /// Number of prior rounds shown in the prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Whether to include running cumulative totals in the prompt.
    #[serde(default = "default_true")]
    pub include_cumulative_totals: bool,
}

fn default_system_prompt_path() -> String {
    "configs/prompts/pd_system.md".to_string()
}

fn default_round_prompt_path() -> String {
    "configs/prompts/pd_round.md".to_string()
}

fn default_persona() -> String {
    "cooperative".to_string()
}

const fn default_history_window() -> usize {
    crate::transcript::DEFAULT_HISTORY_WINDOW
}

impl Default for PromptingConfig {
    fn default() -> Self {
        Self {
            system_prompt_path: default_system_prompt_path(),
            round_prompt_path: default_round_prompt_path(),
            persona: default_persona(),
            history_window: default_history_window(),
            include_cumulative_totals: true,
        }
    }
}

/// Config fragment for an LLM agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMAgentConfig {
    /// Completion provider name (`mock`, or a caller-defined provider id).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier passed through to the completion adapter.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f64,
    /// Maximum tokens requested per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Mock provider configuration, used when `provider == "mock"`.
    #[serde(default)]
    pub mock: MockConfig,
    /// Prompt assembly configuration.
    #[serde(default)]
    pub prompting: PromptingConfig,
    /// Output parsing configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "mock-001".to_string()
}

const fn default_max_tokens() -> u32 {
    10
}

impl Default for LLMAgentConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            mock: MockConfig::default(),
            prompting: PromptingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Parse a full experiment config from a YAML document string.
pub fn load_full_experiment_config(yaml: &str) -> Result<FullExperimentConfig> {
    serde_yaml::from_str(yaml).map_err(|e| CoreError::Config(e.to_string()))
}

/// Deep-merge `overrides` onto `base`: maps merge key-by-key recursively;
/// any other value (scalar, list, or a type mismatch against the base) is
/// replaced wholesale by the override.
#[must_use]
pub fn deep_merge(base: &serde_json::Value, overrides: &serde_json::Value) -> serde_json::Value {
    match (base, overrides) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(override_map)) => {
            let mut merged = base_map.clone();
            for (key, override_value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(base_value) => deep_merge(base_value, override_value),
                    None => override_value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            serde_json::Value::Object(merged)
        }
        (_, other) => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_recurses_into_maps_and_replaces_scalars() {
        let base = serde_json::json!({
            "policy": "TFT",
            "policy_params": {"generous_prob": 0.1, "wsls_win_threshold": 3},
        });
        let overrides = serde_json::json!({
            "policy_params": {"generous_prob": 0.5},
        });
        let merged = deep_merge(&base, &overrides);
        assert_eq!(merged["policy"], "TFT");
        assert_eq!(merged["policy_params"]["generous_prob"], 0.5);
        assert_eq!(merged["policy_params"]["wsls_win_threshold"], 3);
    }

    #[test]
    fn deep_merge_replaces_lists_wholesale() {
        let base = serde_json::json!({"scripted_outputs": ["C", "D", "C"]});
        let overrides = serde_json::json!({"scripted_outputs": ["D"]});
        let merged = deep_merge(&base, &overrides);
        assert_eq!(merged["scripted_outputs"], serde_json::json!(["D"]));
    }

    #[test]
    fn payoff_matrix_config_default_matches_canonical_pd() {
        let cfg = PayoffMatrixConfig::default();
        let matrix = cfg.to_payoff_matrix().expect("resolves");
        assert_eq!(matrix, crate::payoff::PayoffMatrix::canonical_pd());
    }

    #[test]
    fn load_full_experiment_config_parses_minimal_document() {
        let yaml = r"
run:
  run_id: run-001
experiment:
  conditions:
    - name: tft_vs_alld
      agent_a:
        ref: tft.yaml
      agent_b:
        ref: alld.yaml
";
        let cfg = load_full_experiment_config(yaml).expect("parses");
        assert_eq!(cfg.run.run_id.as_str(), "run-001");
        assert_eq!(cfg.experiment.replicates, 5);
        assert_eq!(cfg.experiment.conditions.len(), 1);
        assert_eq!(cfg.horizon.kind, HorizonConfigKind::Fixed);
    }
}
