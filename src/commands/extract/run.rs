use std::num::NonZeroUsize;
use std::process::Command;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use super::machine::{ExtractionOutcome, LinePatterns, extract_groups};
use super::scanner::scan_lines;
use super::source::open_page_source;
use crate::cli::ExtractArgs;
use crate::model::{
    ExtractCounts, ExtractRunManifest, SourceEntry, ToolVersions, UNKNOWN_ASSEMBLY_DATE,
};
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    info!(input = %args.input.display(), run_id = %run_id, "starting extraction");

    let source = open_page_source(&args.input, args.max_pages.map(NonZeroUsize::get))?;
    let pages = source
        .read_pages()
        .with_context(|| format!("failed to extract pages from {}", args.input.display()))?;
    let empty_page_count = pages.iter().filter(|page| page.is_none()).count();

    info!(
        backend = source.backend(),
        pages = pages.len(),
        empty_pages = empty_page_count,
        "document pages loaded"
    );

    let patterns = LinePatterns::new()?;
    let outcome = extract_groups(&patterns, scan_lines(&pages));

    let mut warnings = Vec::new();
    if outcome.assembly_date.is_none() {
        warn!(
            fallback = UNKNOWN_ASSEMBLY_DATE,
            "no 'Contemplação de' date found; using the default for every group"
        );
        warnings.push(format!(
            "contemplation date not found; assembly date set to '{UNKNOWN_ASSEMBLY_DATE}'"
        ));
    }

    info!(
        groups = outcome.records.len(),
        lines = outcome.stats.lines_scanned,
        duplicate_headers = outcome.stats.duplicate_headers_skipped,
        dropped = outcome.stats.unparsable_groups_dropped,
        "extraction completed"
    );
    log_sample(&outcome);

    let status = if outcome.records.is_empty() {
        warn!("no groups extracted; output not written");
        warnings.push("no groups extracted".to_string());
        "empty"
    } else if args.dry_run {
        info!(path = %args.output.display(), "dry-run: output not written");
        "dry_run"
    } else {
        write_json_pretty(&args.output, &outcome.records)?;
        info!(path = %args.output.display(), "wrote group statistics");
        "completed"
    };

    if let Some(manifest_path) = &args.manifest_path {
        let manifest = ExtractRunManifest {
            manifest_version: 1,
            run_id,
            status: status.to_string(),
            started_at,
            updated_at: now_utc_string(),
            command: render_extract_command(&args),
            tool_versions: ToolVersions {
                pdftotext: command_version_optional("pdftotext", &["-v"]),
            },
            source: SourceEntry {
                path: args.input.display().to_string(),
                backend: source.backend().to_string(),
                sha256: sha256_file(&args.input)?,
            },
            output_path: (status == "completed").then(|| args.output.display().to_string()),
            counts: ExtractCounts {
                page_count: pages.len(),
                empty_page_count,
                lines_scanned: outcome.stats.lines_scanned,
                bid_lines_tallied: outcome.stats.bid_lines_tallied,
                groups_emitted: outcome.records.len(),
                duplicate_headers_skipped: outcome.stats.duplicate_headers_skipped,
                unparsable_groups_dropped: outcome.stats.unparsable_groups_dropped,
            },
            assembly_date: outcome.assembly_date.clone(),
            warnings,
        };

        write_json_pretty(manifest_path, &manifest)?;
        info!(path = %manifest_path.display(), "wrote extract run manifest");
    }

    Ok(())
}

fn log_sample(outcome: &ExtractionOutcome) {
    let Some(first) = outcome.records.first() else {
        return;
    };

    info!(
        group = first.group_number,
        assembly = %first.assembly_date,
        contemplated = first.contemplated_count,
        fixed_adjusted = first.adjusted_fixed_bid_count,
        "sample record"
    );
}

fn command_version_optional(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;

    // pdftotext prints its version banner on stderr.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    };

    source
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
}

pub(super) fn render_extract_command(args: &ExtractArgs) -> String {
    let mut command = vec![
        "assembly-stats".to_string(),
        "extract".to_string(),
        "--input".to_string(),
        args.input.display().to_string(),
        "--output".to_string(),
        args.output.display().to_string(),
    ];

    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(max_pages) = args.max_pages {
        command.push("--max-pages".to_string());
        command.push(max_pages.to_string());
    }
    if args.dry_run {
        command.push("--dry-run".to_string());
    }

    command.join(" ")
}
