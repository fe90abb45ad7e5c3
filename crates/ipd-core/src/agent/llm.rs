//! LLM-backed agent: prompt assembly, completion invocation, parse/retry.

use crate::config::LLMAgentConfig;
use crate::error::CoreError;
use crate::parser::{parse_with_retry, ParseAttempt, RetryError};
use crate::payoff::{Action, PayoffMatrix};
use crate::transcript::{format_cumulative_totals, format_history_text, format_horizon_text};

/// External capability consumed by [`LlmAgent`]: turns a system prompt, a
/// round prompt, a temperature, and a token cap into raw completion text.
///
/// Implemented by callers; the core never makes a network call itself.
pub trait CompletionAdapter {
    /// Request a completion. Errors are fatal to the run (see §4.7/§7).
    fn complete(
        &mut self,
        system: &str,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, CoreError>;

    /// Reset any internal state (e.g. a scripted-output cursor) for a new
    /// game. Stateless adapters can leave this as a no-op.
    fn reset(&mut self, _seed: Option<u64>) {}
}

/// Deterministic test/demo adapter: either always returns a fixed string,
/// or cycles through a scripted list of outputs.
#[derive(Debug, Clone)]
pub struct MockCompletionAdapter {
    mode: MockMode,
    call_count: u64,
    scripted_index: usize,
}

#[derive(Debug, Clone)]
enum MockMode {
    Fixed(String),
    Scripted(Vec<String>),
}

impl MockCompletionAdapter {
    /// Build an adapter that always returns `output`.
    #[must_use]
    pub fn fixed(output: impl Into<String>) -> Self {
        Self {
            mode: MockMode::Fixed(output.into()),
            call_count: 0,
            scripted_index: 0,
        }
    }

    /// Build an adapter that cycles through `outputs` in order, wrapping
    /// around. Falls back to `"C"` if `outputs` is empty.
    #[must_use]
    pub fn scripted(outputs: Vec<String>) -> Self {
        Self {
            mode: MockMode::Scripted(outputs),
            call_count: 0,
            scripted_index: 0,
        }
    }

    /// Build from a resolved [`crate::config::MockConfig`] document.
    #[must_use]
    pub fn from_config(config: &crate::config::MockConfig) -> Self {
        if config.mode == "scripted" {
            Self::scripted(config.scripted_outputs.clone())
        } else {
            Self::fixed(config.fixed_output.clone())
        }
    }

    /// Number of `complete` calls made since construction or the last reset.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.call_count
    }
}

impl CompletionAdapter for MockCompletionAdapter {
    fn complete(
        &mut self,
        _system: &str,
        _prompt: &str,
        _temperature: f64,
        _max_tokens: u32,
    ) -> Result<String, CoreError> {
        self.call_count += 1;
        match &mut self.mode {
            MockMode::Fixed(output) => Ok(output.clone()),
            MockMode::Scripted(outputs) => {
                if outputs.is_empty() {
                    return Ok("C".to_string());
                }
                let output = outputs[self.scripted_index % outputs.len()].clone();
                self.scripted_index += 1;
                Ok(output)
            }
        }
    }

    fn reset(&mut self, _seed: Option<u64>) {
        self.call_count = 0;
        self.scripted_index = 0;
    }
}

/// System/round prompt pair sent for the most recent `act` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastPrompts {
    /// System prompt.
    pub system: String,
    /// Round prompt, including any retry correction text already folded in
    /// is NOT reflected here — this is the prompt sent on the first attempt.
    pub round: String,
}

/// Prompt assembly and parse/retry wrapper around a [`CompletionAdapter`].
pub struct LlmAgent {
    config: LLMAgentConfig,
    system_prompt: String,
    round_prompt_template: String,
    persona_text: String,
    adapter: Box<dyn CompletionAdapter + Send>,
    last_prompts: Option<LastPrompts>,
    last_raw_response: Option<String>,
    parse_attempts: Vec<ParseAttempt>,
}

impl LlmAgent {
    /// Construct an LLM agent from already-resolved prompt text (loading the
    /// template files themselves is a caller concern) and a boxed adapter.
    #[must_use]
    pub fn new(
        config: LLMAgentConfig,
        system_prompt: String,
        round_prompt_template: String,
        persona_text: String,
        adapter: Box<dyn CompletionAdapter + Send>,
    ) -> Self {
        Self {
            config,
            system_prompt,
            round_prompt_template,
            persona_text,
            adapter,
            last_prompts: None,
            last_raw_response: None,
            parse_attempts: Vec::new(),
        }
    }

    /// Reset the adapter and clear per-round diagnostics for a new game.
    pub fn reset(&mut self, seed: Option<u64>) {
        self.adapter.reset(seed);
        self.last_prompts = None;
        self.last_raw_response = None;
        self.parse_attempts.clear();
    }

    fn build_round_prompt(&self, obs: &crate::transcript::Observation) -> String {
        let payoff_matrix =
            PayoffMatrix::from_nested_map(&obs.payoff_matrix).unwrap_or_default();
        let payoff_table_text = payoff_matrix.format_table();
        let history_text = format_history_text(obs);
        let cumulative_totals_text = if self.config.prompting.include_cumulative_totals {
            format_cumulative_totals(obs)
        } else {
            "Not shown.".to_string()
        };
        let horizon_text = format_horizon_text(obs);

        self.round_prompt_template
            .replace("{persona_text}", &self.persona_text)
            .replace("{payoff_table_text}", &payoff_table_text)
            .replace("{round_number}", &obs.round_number.to_string())
            .replace("{horizon_text}", &horizon_text)
            .replace("{cumulative_totals_text}", &cumulative_totals_text)
            .replace("{history_text}", &history_text)
    }

    /// Choose an action: assemble the round prompt, invoke the adapter,
    /// parse with bounded retry, and fall back to `C` on total parse
    /// failure. A completion-adapter error is fatal and propagates.
    pub fn act(&mut self, obs: &crate::transcript::Observation) -> Result<Action, CoreError> {
        let round_prompt = self.build_round_prompt(obs);
        self.last_prompts = Some(LastPrompts {
            system: self.system_prompt.clone(),
            round: round_prompt.clone(),
        });

        let first_response = self.adapter.complete(
            &self.system_prompt,
            &round_prompt,
            self.config.temperature,
            self.config.max_tokens,
        )?;
        self.last_raw_response = Some(first_response.clone());

        let max_retries = self.config.output.retry.max_retries;
        let system_prompt = self.system_prompt.clone();
        let temperature = self.config.temperature;
        let max_tokens = self.config.max_tokens;
        let adapter = &mut self.adapter;
        let last_raw_response = &mut self.last_raw_response;

        let result = parse_with_retry(&first_response, max_retries, |correction| {
            let prompt = format!("{round_prompt}\n\n{correction}");
            let response = adapter.complete(&system_prompt, &prompt, temperature, max_tokens)?;
            *last_raw_response = Some(response.clone());
            Ok(response)
        });

        match result {
            Ok((action, attempts)) => {
                self.parse_attempts = attempts;
                Ok(action)
            }
            Err(RetryError::Exhausted(attempts)) => {
                self.parse_attempts = attempts;
                // Fixed, non-configurable fallback: cooperate on total parse
                // failure so the round still logs normally.
                Ok(Action::Cooperate)
            }
            Err(RetryError::Fatal(e)) => Err(e),
        }
    }

    /// The most recent system/round prompt pair, if `act` has been called.
    #[must_use]
    pub fn last_prompts(&self) -> Option<&LastPrompts> {
        self.last_prompts.as_ref()
    }

    /// The raw completion text that produced the last returned action.
    #[must_use]
    pub fn last_raw_response(&self) -> Option<&str> {
        self.last_raw_response.as_deref()
    }

    /// The parse-attempt trail from the last `act` call.
    #[must_use]
    pub fn parse_attempts(&self) -> &[ParseAttempt] {
        &self.parse_attempts
    }
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("config", &self.config)
            .field("last_prompts", &self.last_prompts)
            .field("last_raw_response", &self.last_raw_response)
            .field("parse_attempts", &self.parse_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizon::HorizonKind;
    use crate::transcript::Observation;

    fn sample_observation() -> Observation {
        Observation {
            round_number: 1,
            history: vec![],
            my_cumulative_payoff: 0,
            opponent_cumulative_payoff: 0,
            payoff_matrix: PayoffMatrix::canonical_pd().to_nested_map(),
            horizon_type: HorizonKind::Fixed,
            total_rounds: Some(10),
        }
    }

    fn agent_with(adapter: impl CompletionAdapter + Send + 'static) -> LlmAgent {
        LlmAgent::new(
            LLMAgentConfig::default(),
            "system".to_string(),
            "round {round_number}{horizon_text}: {history_text}".to_string(),
            String::new(),
            Box::new(adapter),
        )
    }

    #[test]
    fn fixed_adapter_yields_parsed_action() {
        let mut agent = agent_with(MockCompletionAdapter::fixed("D"));
        let action = agent.act(&sample_observation()).expect("no io error");
        assert_eq!(action, Action::Defect);
        assert_eq!(agent.parse_attempts().len(), 1);
    }

    #[test]
    fn total_parse_failure_falls_back_to_cooperate() {
        let mut agent = agent_with(MockCompletionAdapter::fixed("maybe"));
        let action = agent.act(&sample_observation()).expect("no io error");
        assert_eq!(action, Action::Cooperate);
        assert_eq!(agent.parse_attempts().len(), 1 + 2);
        assert!(agent.parse_attempts().iter().all(|a| !a.success));
    }

    #[derive(Debug, Default)]
    struct FailOnRetryAdapter {
        calls: u32,
    }

    impl CompletionAdapter for FailOnRetryAdapter {
        fn complete(
            &mut self,
            _system: &str,
            _prompt: &str,
            _temperature: f64,
            _max_tokens: u32,
        ) -> Result<String, CoreError> {
            self.calls += 1;
            if self.calls == 1 {
                Ok("maybe".to_string())
            } else {
                Err(CoreError::Completion("connection reset".to_string()))
            }
        }
    }

    #[test]
    fn completion_error_mid_retry_propagates_instead_of_cooperating() {
        let mut agent = agent_with(FailOnRetryAdapter::default());
        let err = agent.act(&sample_observation()).expect_err("should propagate");
        assert!(matches!(err, CoreError::Completion(_)));
    }

    #[test]
    fn reset_clears_diagnostics() {
        let mut agent = agent_with(MockCompletionAdapter::fixed("C"));
        agent.act(&sample_observation()).unwrap();
        assert!(agent.last_raw_response().is_some());
        agent.reset(None);
        assert!(agent.last_raw_response().is_none());
        assert!(agent.last_prompts().is_none());
        assert!(agent.parse_attempts().is_empty());
    }
}
