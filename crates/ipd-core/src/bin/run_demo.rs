#![forbid(unsafe_code)]
//! Runs a small built-in experiment (TFT vs ALLD, fixed horizon) to a
//! temporary output directory and prints the resulting metrics.

use std::collections::BTreeMap;

use clap::Parser;
use ipd_core::config::load_full_experiment_config;
use ipd_core::registry::{AgentFragment, AgentRegistry};
use ipd_core::runner::ExperimentRunner;

const DEMO_CONFIG: &str = r"
run:
  run_id: demo-run
  output_dir: data/runs/demo
experiment:
  replicates: 3
  conditions:
    - name: tft_vs_alld
      agent_a:
        ref: tft.yaml
      agent_b:
        ref: alld.yaml
    - name: allc_vs_allc
      agent_a:
        ref: allc.yaml
      agent_b:
        ref: allc.yaml
horizon:
  type: fixed
  n_rounds: 20
";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Runs the built-in TFT-vs-ALLD demo experiment and prints per-condition metrics."
)]
struct Cli {
    /// Directory to write rounds.jsonl/run_manifest.json/aggregates.parquet
    /// to. Overrides the built-in config's `run.output_dir`.
    #[arg(short, long)]
    output_dir: Option<String>,
}

fn demo_fragments() -> BTreeMap<String, AgentFragment> {
    let mut fragments = BTreeMap::new();
    fragments.insert(
        "tft.yaml".to_string(),
        AgentFragment {
            config: serde_json::json!({"type": "policy", "policy": "TFT"}),
            prompts: None,
        },
    );
    fragments.insert(
        "alld.yaml".to_string(),
        AgentFragment {
            config: serde_json::json!({"type": "policy", "policy": "ALLD"}),
            prompts: None,
        },
    );
    fragments.insert(
        "allc.yaml".to_string(),
        AgentFragment {
            config: serde_json::json!({"type": "policy", "policy": "ALLC"}),
            prompts: None,
        },
    );
    fragments
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = load_full_experiment_config(DEMO_CONFIG)?;
    if let Some(output_dir) = cli.output_dir {
        config.run.output_dir = output_dir;
    }

    let registry = AgentRegistry::new(demo_fragments(), None);
    let runner = ExperimentRunner::new(config, registry);

    let summary = runner.run()?;
    tracing::info!(run_id = %summary.manifest.run_id, config_hash = %summary.manifest.config_hash, "run complete");

    for m in &summary.metrics {
        println!(
            "{} replicate {}: overall_cooperation_rate={:.3} total_rounds={} time_to_collapse={:?}",
            m.condition, m.replicate, m.overall_cooperation_rate, m.total_rounds, m.time_to_collapse
        );
    }

    Ok(())
}
