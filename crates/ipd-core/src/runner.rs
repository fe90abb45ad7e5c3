//! Orchestrates conditions x replicates: the engine's single entry point.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;

use crate::aggregator::write_aggregates;
use crate::agent::Agent;
use crate::config::FullExperimentConfig;
use crate::error::Result;
use crate::horizon::{Horizon, HorizonKind};
use crate::logger::RoundLogger;
use crate::manifest::RunManifest;
use crate::metrics::{compute_metrics_for_replicate, ConditionMetrics};
use crate::payoff::PayoffMatrix;
use crate::registry::AgentRegistry;
use crate::transcript::{AgentPrompt, RoundRecord, Side, Transcript};

/// Per-replicate agent seed offset for agent B, keeping the two agents'
/// streams independent even when both draw from the same run seed.
const AGENT_B_SEED_OFFSET: u64 = 1000;

/// Everything produced by a full experiment run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The manifest written for this run.
    pub manifest: RunManifest,
    /// One entry per (condition, replicate).
    pub metrics: Vec<ConditionMetrics>,
}

/// Runs every condition's replicates against a fixed config and agent
/// registry, logging rounds, then aggregating metrics.
pub struct ExperimentRunner {
    config: FullExperimentConfig,
    registry: AgentRegistry,
}

impl ExperimentRunner {
    /// Build a runner over a resolved config and agent registry.
    #[must_use]
    pub fn new(config: FullExperimentConfig, registry: AgentRegistry) -> Self {
        Self { config, registry }
    }

    /// Run every condition's replicates, writing `rounds.jsonl`,
    /// `run_manifest.json`, and `aggregates.parquet` under
    /// `run.output_dir`. Any agent or completion-adapter error aborts the
    /// run immediately (no partial condition is retried).
    pub fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let output_dir = Path::new(&self.config.run.output_dir);

        let config_snapshot = serde_json::to_value(&self.config)
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;
        let manifest = RunManifest::new(
            self.config.run.run_id.clone(),
            config_snapshot,
            started_at,
        );
        manifest.write(output_dir)?;

        let logger = RoundLogger::open(output_dir)?;
        let payoff_matrix = self.config.game.payoff_matrix.to_payoff_matrix()?;

        let mut metrics = Vec::new();
        for condition in &self.config.experiment.conditions {
            let _span = tracing::info_span!("condition", condition = %condition.name).entered();
            for replicate in 0..self.config.experiment.replicates {
                let record = self.run_replicate(condition, replicate, &payoff_matrix, &logger)?;
                metrics.push(record);
            }
        }

        write_aggregates(output_dir, &metrics)?;

        tracing::info!(
            run_id = %self.config.run.run_id,
            config_hash = %manifest.config_hash,
            conditions = self.config.experiment.conditions.len(),
            "run complete"
        );

        Ok(RunSummary { manifest, metrics })
    }

    #[tracing::instrument(skip(self, payoff_matrix, logger), fields(condition = %condition.name, replicate))]
    fn run_replicate(
        &self,
        condition: &crate::config::ConditionConfig,
        replicate: u64,
        payoff_matrix: &PayoffMatrix,
        logger: &RoundLogger,
    ) -> Result<ConditionMetrics> {
        tracing::debug!("replicate starting");
        let base_seed = self.config.run.seed;
        let seed_a = Some(base_seed + replicate);
        let seed_b = Some(base_seed + replicate + AGENT_B_SEED_OFFSET);
        let seed_h = Some(base_seed + replicate);

        let mut agent_a =
            self.registry
                .create_agent(&condition.agent_a.reference, &condition.agent_a.overrides, seed_a)?;
        let mut agent_b =
            self.registry
                .create_agent(&condition.agent_b.reference, &condition.agent_b.overrides, seed_b)?;

        let mut horizon = match self.config.horizon.kind {
            crate::config::HorizonConfigKind::Fixed => Horizon::fixed(self.config.horizon.n_rounds),
            crate::config::HorizonConfigKind::Geometric => Horizon::geometric(
                self.config.horizon.stop_prob,
                seed_h,
                self.config.horizon.max_cap,
            ),
        };

        let mut transcript = Transcript::new(crate::transcript::DEFAULT_HISTORY_WINDOW);
        let horizon_kind = horizon.kind();
        let total_rounds = horizon.total_rounds();
        let stop_prob = horizon.stop_prob();

        let mut cum_a: i64 = 0;
        let mut cum_b: i64 = 0;
        let mut round_index = 0u64;
        while !horizon.should_stop(round_index) {
            let _round_span = tracing::trace_span!("round", round_index).entered();
            let round_number = round_index + 1;
            let obs_a = transcript.observation_for(round_number, Side::A, payoff_matrix, horizon_kind, total_rounds);
            let obs_b = transcript.observation_for(round_number, Side::B, payoff_matrix, horizon_kind, total_rounds);

            let action_a = agent_a.act(&obs_a)?;
            let action_b = agent_b.act(&obs_b)?;

            let (payoff_a, payoff_b) = payoff_matrix.payoffs(action_a, action_b);
            cum_a += payoff_a;
            cum_b += payoff_b;

            let prompts = self.collect_prompts(&agent_a, &agent_b);
            let raw_responses = self.collect_raw_responses(&agent_a, &agent_b);

            let record = RoundRecord {
                run_id: self.config.run.run_id.clone(),
                condition: condition.name.clone(),
                replicate,
                round_index,
                agent_a_action: action_a,
                agent_b_action: action_b,
                agent_a_payoff: payoff_a,
                agent_b_payoff: payoff_b,
                agent_a_cum_payoff: cum_a,
                agent_b_cum_payoff: cum_b,
                horizon_type: horizon_kind,
                fixed_n: total_rounds,
                stop_prob,
                timestamp_utc: Utc::now(),
                prompts,
                raw_responses,
            };

            tracing::trace!(?action_a, ?action_b, payoff_a, payoff_b, "round played");

            logger.log_round(&record)?;
            transcript.append(record);

            round_index += 1;
        }

        tracing::debug!(rounds_played = round_index, "replicate complete");

        Ok(compute_metrics_for_replicate(
            condition.name.as_str(),
            replicate,
            transcript.rounds(),
            self.config.metrics.collapse.k,
            self.config.metrics.collapse.cooperation_threshold,
        ))
    }

    fn collect_prompts(&self, agent_a: &Agent, agent_b: &Agent) -> Option<BTreeMap<String, AgentPrompt>> {
        if !self.config.run.store_prompts {
            return None;
        }
        let mut map = BTreeMap::new();
        if let Some(p) = agent_a.last_prompts() {
            map.insert(
                "agent_a".to_string(),
                AgentPrompt {
                    system: p.system.clone(),
                    round: p.round.clone(),
                },
            );
        }
        if let Some(p) = agent_b.last_prompts() {
            map.insert(
                "agent_b".to_string(),
                AgentPrompt {
                    system: p.system.clone(),
                    round: p.round.clone(),
                },
            );
        }
        if map.is_empty() {
            None
        } else {
            Some(map)
        }
    }

    fn collect_raw_responses(&self, agent_a: &Agent, agent_b: &Agent) -> Option<BTreeMap<String, String>> {
        if !self.config.run.store_raw_responses {
            return None;
        }
        let mut map = BTreeMap::new();
        if let Some(r) = agent_a.last_raw_response() {
            map.insert("agent_a".to_string(), r.to_string());
        }
        if let Some(r) = agent_b.last_raw_response() {
            map.insert("agent_b".to_string(), r.to_string());
        }
        if map.is_empty() {
            None
        } else {
            Some(map)
        }
    }
}
