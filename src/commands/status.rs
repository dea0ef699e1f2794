use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::{ExtractRunManifest, GroupRecord};

pub fn run(args: StatusArgs) -> Result<()> {
    info!(output = %args.output.display(), "status requested");

    if let Some(manifest_path) = &args.manifest_path {
        if manifest_path.exists() {
            let manifest: ExtractRunManifest = read_json(manifest_path)?;
            info!(
                run_id = %manifest.run_id,
                status = %manifest.status,
                started_at = %manifest.started_at,
                updated_at = %manifest.updated_at,
                source = %manifest.source.path,
                backend = %manifest.source.backend,
                sha256 = %manifest.source.sha256,
                pages = manifest.counts.page_count,
                empty_pages = manifest.counts.empty_page_count,
                groups = manifest.counts.groups_emitted,
                duplicate_headers = manifest.counts.duplicate_headers_skipped,
                assembly_date = %manifest.assembly_date.unwrap_or_default(),
                warnings = manifest.warnings.len(),
                "loaded extract run manifest"
            );
        } else {
            warn!(path = %manifest_path.display(), "extract run manifest missing");
        }
    }

    if !args.output.exists() {
        warn!(path = %args.output.display(), "group statistics file missing");
        return Ok(());
    }

    let records: Vec<GroupRecord> = read_json(&args.output)?;
    let summary = summarize(&records);

    info!(
        groups = summary.group_count,
        assembly_dates = %summary.assembly_dates.join(","),
        contemplated = summary.total_contemplated,
        free_bids = summary.total_free_bids,
        fixed_bids_adjusted = summary.total_adjusted_fixed_bids,
        lowest_free_bid = summary.lowest_free_percentage.unwrap_or(0.0),
        "group statistics status"
    );

    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct StatsSummary {
    group_count: usize,
    assembly_dates: Vec<String>,
    total_contemplated: u64,
    total_free_bids: u64,
    total_adjusted_fixed_bids: u64,
    /// Lowest non-zero free bid across groups; groups without samples report 0.
    lowest_free_percentage: Option<f64>,
}

fn summarize(records: &[GroupRecord]) -> StatsSummary {
    let assembly_dates = records
        .iter()
        .map(|record| record.assembly_date.clone())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();

    let lowest_free_percentage = records
        .iter()
        .map(|record| record.min_free_percentage)
        .filter(|value| *value > 0.0)
        .reduce(f64::min);

    StatsSummary {
        group_count: records.len(),
        assembly_dates,
        total_contemplated: records
            .iter()
            .map(|record| u64::from(record.contemplated_count))
            .sum(),
        total_free_bids: records
            .iter()
            .map(|record| u64::from(record.free_bid_count))
            .sum(),
        total_adjusted_fixed_bids: records
            .iter()
            .map(|record| u64::from(record.adjusted_fixed_bid_count))
            .sum(),
        lowest_free_percentage,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
