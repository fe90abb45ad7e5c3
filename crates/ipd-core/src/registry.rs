//! Materializes an [`Agent`](crate::agent::Agent) from a config fragment and
//! overrides.

use std::collections::BTreeMap;

use crate::agent::{Agent, CompletionAdapter, LlmAgent, MockCompletionAdapter, PolicyAgent};
use crate::config::{deep_merge, LLMAgentConfig, PolicyAgentConfig};
use crate::error::{CoreError, Result};

/// Resolved prompt text for an LLM agent fragment. Loading these from disk
/// (by `prompting.system_prompt_path` etc.) is a caller concern; the
/// registry only consumes the already-read text.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPrompts {
    /// System prompt text.
    pub system_prompt: String,
    /// Round prompt template, with `{round_number}`, `{history_text}`,
    /// `{cumulative_totals_text}`, `{horizon_text}`, `{payoff_table_text}`,
    /// and `{persona_text}` placeholders.
    pub round_prompt_template: String,
    /// Persona fragment text, interpolated into `{persona_text}`.
    pub persona_text: String,
}

/// One named agent config fragment available to the registry, as would be
/// loaded from a referenced YAML document.
#[derive(Debug, Clone)]
pub struct AgentFragment {
    /// The fragment's config document (including its `type` tag), prior to
    /// any overrides.
    pub config: serde_json::Value,
    /// Resolved prompt text, present iff this fragment is an LLM agent.
    pub prompts: Option<ResolvedPrompts>,
}

/// Builds a [`CompletionAdapter`] for a non-`mock` provider. Registered by
/// the caller; the registry has no built-in knowledge of real providers.
pub trait CompletionAdapterFactory {
    /// Build an adapter for `provider`/`model`, or `None` if unsupported.
    fn build(&self, provider: &str, model: &str) -> Option<Box<dyn CompletionAdapter + Send>>;
}

/// Registry mapping named fragments plus overrides to constructed agents.
pub struct AgentRegistry {
    fragments: BTreeMap<String, AgentFragment>,
    adapter_factory: Option<Box<dyn CompletionAdapterFactory>>,
}

impl AgentRegistry {
    /// Build a registry over a fixed set of named fragments. `adapter_factory`
    /// is consulted for any LLM fragment whose `provider` is not `"mock"`.
    #[must_use]
    pub fn new(
        fragments: BTreeMap<String, AgentFragment>,
        adapter_factory: Option<Box<dyn CompletionAdapterFactory>>,
    ) -> Self {
        Self {
            fragments,
            adapter_factory,
        }
    }

    /// Resolve `reference` against the registry's fragment map, deep-merge
    /// `overrides` on top, dispatch on the `type` tag, and construct an
    /// [`Agent`]. `seed` seeds the new agent's private RNG, if it has one.
    pub fn create_agent(
        &self,
        reference: &str,
        overrides: &serde_json::Value,
        seed: Option<u64>,
    ) -> Result<Agent> {
        let fragment = self
            .fragments
            .get(reference)
            .ok_or_else(|| CoreError::Agent(format!("unknown agent reference: {reference}")))?;

        let merged = deep_merge(&fragment.config, overrides);
        let agent_type = merged
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CoreError::Config(format!("fragment {reference} is missing `type`")))?
            .to_string();

        match agent_type.as_str() {
            "policy" => {
                let config: PolicyAgentConfig = serde_json::from_value(merged)
                    .map_err(|e| CoreError::Config(e.to_string()))?;
                let policy = PolicyAgent::create(&config.policy, config.policy_params, seed)?;
                Ok(Agent::Policy(policy))
            }
            "llm" => {
                let config: LLMAgentConfig =
                    serde_json::from_value(merged).map_err(|e| CoreError::Config(e.to_string()))?;
                let prompts = fragment.prompts.clone().unwrap_or_default();
                let adapter = self.build_adapter(&config)?;
                Ok(Agent::Llm(LlmAgent::new(
                    config,
                    prompts.system_prompt,
                    prompts.round_prompt_template,
                    prompts.persona_text,
                    adapter,
                )))
            }
            other => Err(CoreError::UnknownAgentType(other.to_string())),
        }
    }

    fn build_adapter(&self, config: &LLMAgentConfig) -> Result<Box<dyn CompletionAdapter + Send>> {
        if config.provider == "mock" {
            return Ok(Box::new(MockCompletionAdapter::from_config(&config.mock)));
        }
        self.adapter_factory
            .as_ref()
            .and_then(|factory| factory.build(&config.provider, &config.model))
            .ok_or_else(|| CoreError::Completion(format!("unsupported provider: {}", config.provider)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments() -> BTreeMap<String, AgentFragment> {
        let mut map = BTreeMap::new();
        map.insert(
            "tft.yaml".to_string(),
            AgentFragment {
                config: serde_json::json!({"type": "policy", "policy": "TFT"}),
                prompts: None,
            },
        );
        map.insert(
            "gtft.yaml".to_string(),
            AgentFragment {
                config: serde_json::json!({
                    "type": "policy",
                    "policy": "GTFT",
                    "policy_params": {"generous_prob": 0.1, "wsls_win_threshold": 3},
                }),
                prompts: None,
            },
        );
        map.insert(
            "llm.yaml".to_string(),
            AgentFragment {
                config: serde_json::json!({"type": "llm", "provider": "mock"}),
                prompts: Some(ResolvedPrompts {
                    system_prompt: "be cooperative".to_string(),
                    round_prompt_template: "round {round_number}".to_string(),
                    persona_text: String::new(),
                }),
            },
        );
        map
    }

    #[test]
    fn resolves_policy_fragment() {
        let registry = AgentRegistry::new(fragments(), None);
        let agent = registry
            .create_agent("tft.yaml", &serde_json::json!({}), None)
            .expect("resolves");
        assert!(matches!(agent, Agent::Policy(PolicyAgent::Tft)));
    }

    #[test]
    fn overrides_deep_merge_onto_fragment() {
        let registry = AgentRegistry::new(fragments(), None);
        let agent = registry
            .create_agent(
                "gtft.yaml",
                &serde_json::json!({"policy_params": {"generous_prob": 0.9}}),
                None,
            )
            .expect("resolves");
        match agent {
            Agent::Policy(PolicyAgent::Gtft { generous_prob, .. }) => {
                assert!((generous_prob - 0.9).abs() < f64::EPSILON);
            }
            _ => panic!("expected GTFT"),
        }
    }

    #[test]
    fn resolves_mock_llm_fragment_without_factory() {
        let registry = AgentRegistry::new(fragments(), None);
        let agent = registry
            .create_agent("llm.yaml", &serde_json::json!({}), None)
            .expect("resolves");
        assert!(matches!(agent, Agent::Llm(_)));
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let registry = AgentRegistry::new(fragments(), None);
        let result = registry.create_agent("nope.yaml", &serde_json::json!({}), None);
        assert!(matches!(result, Err(CoreError::Agent(_))));
    }
}
