//! Idempotent recomputation of metrics from the event log, and the
//! columnar `aggregates.parquet` writer.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float64Array, Int64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::error::{CoreError, Result};
use crate::logger::load_rounds_jsonl;
use crate::metrics::{compute_metrics_for_replicate, ConditionMetrics};

/// Write `metrics` as `<output_dir>/aggregates.parquet`, one row per
/// (condition, replicate). A no-op if `metrics` is empty.
pub fn write_aggregates(output_dir: &Path, metrics: &[ConditionMetrics]) -> Result<()> {
    if metrics.is_empty() {
        return Ok(());
    }

    std::fs::create_dir_all(output_dir)?;
    let batch = to_record_batch(metrics)?;

    let path = output_dir.join("aggregates.parquet");
    let file = std::fs::File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| CoreError::Config(e.to_string()))?;
    writer
        .write(&batch)
        .map_err(|e| CoreError::Config(e.to_string()))?;
    writer.close().map_err(|e| CoreError::Config(e.to_string()))?;
    Ok(())
}

/// Recompute aggregates from `<output_dir>/rounds.jsonl` and overwrite
/// `<output_dir>/aggregates.parquet`. Idempotent: running this twice with
/// the same (K, θ) over the same event log yields byte-identical output.
pub fn recompute_aggregates(output_dir: &Path, collapse_k: u64, collapse_threshold: f64) -> Result<()> {
    let rounds = load_rounds_jsonl(&output_dir.join("rounds.jsonl"))?;

    let mut grouped: BTreeMap<(crate::ids::ConditionName, u64), Vec<_>> = BTreeMap::new();
    for round in rounds {
        grouped
            .entry((round.condition.clone(), round.replicate))
            .or_default()
            .push(round);
    }

    let mut metrics = Vec::with_capacity(grouped.len());
    for ((condition, replicate), mut group) in grouped {
        group.sort_by_key(|r| r.round_index);
        metrics.push(compute_metrics_for_replicate(
            condition.as_str(),
            replicate,
            &group,
            collapse_k,
            collapse_threshold,
        ));
    }

    write_aggregates(output_dir, &metrics)
}

fn to_record_batch(metrics: &[ConditionMetrics]) -> Result<RecordBatch> {
    let schema = aggregates_schema();

    let condition: StringArray = metrics.iter().map(|m| Some(m.condition.as_str())).collect();
    let replicate: UInt64Array = metrics.iter().map(|m| Some(m.replicate)).collect();
    let total_rounds: UInt64Array = metrics.iter().map(|m| Some(m.total_rounds)).collect();
    let agent_a_cooperation_rate: Float64Array =
        metrics.iter().map(|m| Some(m.agent_a_cooperation_rate)).collect();
    let agent_b_cooperation_rate: Float64Array =
        metrics.iter().map(|m| Some(m.agent_b_cooperation_rate)).collect();
    let overall_cooperation_rate: Float64Array =
        metrics.iter().map(|m| Some(m.overall_cooperation_rate)).collect();
    let cooperation_rate_over_time: StringArray = metrics
        .iter()
        .map(|m| serde_json::to_string(&m.cooperation_rate_over_time).unwrap_or_default())
        .collect();
    let agent_a_retaliation_rate: Float64Array =
        metrics.iter().map(|m| m.agent_a_retaliation_rate).collect();
    let agent_b_retaliation_rate: Float64Array =
        metrics.iter().map(|m| m.agent_b_retaliation_rate).collect();
    let agent_a_forgiveness_rate: Float64Array =
        metrics.iter().map(|m| m.agent_a_forgiveness_rate).collect();
    let agent_b_forgiveness_rate: Float64Array =
        metrics.iter().map(|m| m.agent_b_forgiveness_rate).collect();
    let agent_a_total_payoff: Int64Array = metrics.iter().map(|m| Some(m.agent_a_total_payoff)).collect();
    let agent_b_total_payoff: Int64Array = metrics.iter().map(|m| Some(m.agent_b_total_payoff)).collect();
    let exploitability_gap_a: Int64Array =
        metrics.iter().map(|m| Some(m.exploitability_gap_a)).collect();
    let exploitability_gap_b: Int64Array =
        metrics.iter().map(|m| Some(m.exploitability_gap_b)).collect();
    let time_to_collapse: UInt64Array = metrics.iter().map(|m| m.time_to_collapse).collect();

    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(condition),
            Arc::new(replicate),
            Arc::new(total_rounds),
            Arc::new(agent_a_cooperation_rate),
            Arc::new(agent_b_cooperation_rate),
            Arc::new(overall_cooperation_rate),
            Arc::new(cooperation_rate_over_time),
            Arc::new(agent_a_retaliation_rate),
            Arc::new(agent_b_retaliation_rate),
            Arc::new(agent_a_forgiveness_rate),
            Arc::new(agent_b_forgiveness_rate),
            Arc::new(agent_a_total_payoff),
            Arc::new(agent_b_total_payoff),
            Arc::new(exploitability_gap_a),
            Arc::new(exploitability_gap_b),
            Arc::new(time_to_collapse),
        ],
    )
    .map_err(|e| CoreError::Config(e.to_string()))
}

fn aggregates_schema() -> Schema {
    Schema::new(vec![
        Field::new("condition", DataType::Utf8, false),
        Field::new("replicate", DataType::UInt64, false),
        Field::new("total_rounds", DataType::UInt64, false),
        Field::new("agent_a_cooperation_rate", DataType::Float64, false),
        Field::new("agent_b_cooperation_rate", DataType::Float64, false),
        Field::new("overall_cooperation_rate", DataType::Float64, false),
        Field::new("cooperation_rate_over_time", DataType::Utf8, false),
        Field::new("agent_a_retaliation_rate", DataType::Float64, true),
        Field::new("agent_b_retaliation_rate", DataType::Float64, true),
        Field::new("agent_a_forgiveness_rate", DataType::Float64, true),
        Field::new("agent_b_forgiveness_rate", DataType::Float64, true),
        Field::new("agent_a_total_payoff", DataType::Int64, false),
        Field::new("agent_b_total_payoff", DataType::Int64, false),
        Field::new("exploitability_gap_a", DataType::Int64, false),
        Field::new("exploitability_gap_b", DataType::Int64, false),
        Field::new("time_to_collapse", DataType::UInt64, true),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::horizon::HorizonKind;
    use crate::logger::RoundLogger;
    use crate::payoff::Action;
    use chrono::Utc;
    use tempfile::tempdir;

    fn round(condition: &str, replicate: u64, round_index: u64, a: Action, b: Action, cum_a: i64, cum_b: i64) -> crate::transcript::RoundRecord {
        crate::transcript::RoundRecord {
            run_id: "run-1".into(),
            condition: condition.into(),
            replicate,
            round_index,
            agent_a_action: a,
            agent_b_action: b,
            agent_a_payoff: 0,
            agent_b_payoff: 0,
            agent_a_cum_payoff: cum_a,
            agent_b_cum_payoff: cum_b,
            horizon_type: HorizonKind::Fixed,
            fixed_n: Some(2),
            stop_prob: None,
            timestamp_utc: Utc::now(),
            prompts: None,
            raw_responses: None,
        }
    }

    #[test]
    fn recompute_aggregates_groups_and_writes_parquet() {
        let dir = tempdir().expect("tempdir");
        let logger = RoundLogger::open(dir.path()).expect("open");
        logger
            .log_round(&round("c1", 0, 0, Action::Cooperate, Action::Cooperate, 3, 3))
            .unwrap();
        logger
            .log_round(&round("c1", 0, 1, Action::Cooperate, Action::Cooperate, 6, 6))
            .unwrap();

        recompute_aggregates(dir.path(), 10, 0.2).expect("recompute");
        assert!(dir.path().join("aggregates.parquet").exists());
    }

    #[test]
    fn write_aggregates_is_noop_on_empty_metrics() {
        let dir = tempdir().expect("tempdir");
        write_aggregates(dir.path(), &[]).expect("no-op");
        assert!(!dir.path().join("aggregates.parquet").exists());
    }
}
