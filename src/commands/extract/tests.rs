use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use super::machine::{ExtractionOutcome, LinePatterns, extract_groups};
use super::run::render_extract_command;
use super::scanner::scan_lines;
use super::source::{SourceError, open_page_source, split_pages};
use crate::cli::ExtractArgs;
use crate::model::GroupRecord;

fn extract(lines: &[&str]) -> ExtractionOutcome {
    let patterns = LinePatterns::new().expect("line patterns should compile");
    extract_groups(&patterns, lines.iter().copied())
}

fn group_numbers(outcome: &ExtractionOutcome) -> Vec<u32> {
    outcome
        .records
        .iter()
        .map(|record| record.group_number)
        .collect()
}

#[test]
fn extracts_two_groups_with_shared_assembly_date() {
    let outcome = extract(&[
        "Grupo 2009",
        "Contemplação de: 15/03/24",
        "70,0000 Livre",
        "Fixo",
        "Fixo",
        "Grupo 2010",
        "Cotas Grupo: 50",
    ]);

    assert_eq!(
        outcome.records,
        vec![
            GroupRecord {
                group_number: 2009,
                assembly_date: "15/03/24".to_string(),
                contemplated_count: 3,
                adjusted_fixed_bid_count: 1,
                free_bid_count: 1,
                mean_free_percentage: 70.0,
                min_free_percentage: 70.0,
            },
            GroupRecord {
                group_number: 2010,
                assembly_date: "15/03/24".to_string(),
                contemplated_count: 50,
                adjusted_fixed_bid_count: 0,
                free_bid_count: 0,
                mean_free_percentage: 0.0,
                min_free_percentage: 0.0,
            },
        ]
    );
    assert_eq!(outcome.assembly_date.as_deref(), Some("15/03/24"));
}

#[test]
fn repeated_group_header_never_emits_second_record() {
    let outcome = extract(&[
        "Grupo 2009",
        "Livre 50,0000",
        "Grupo 2010",
        "Fixo",
        "Grupo 2009",
        "Livre 10,0000",
        "Livre",
        "Cotas Grupo: 99",
        "Grupo 2011",
        "Sorteio",
        "Grupo 2009",
        "Livre 5,0000",
    ]);

    assert_eq!(group_numbers(&outcome), vec![2009, 2010, 2011]);
    assert_eq!(outcome.stats.duplicate_headers_skipped, 2);

    let first = &outcome.records[0];
    assert_eq!(first.contemplated_count, 1);
    assert_eq!(first.free_bid_count, 1);
    assert_eq!(first.mean_free_percentage, 50.0);
    assert_eq!(first.min_free_percentage, 50.0);

    assert_eq!(outcome.records[1].contemplated_count, 1);
    assert_eq!(outcome.records[2].contemplated_count, 1);
}

#[test]
fn fixed_bid_count_is_reduced_by_one_and_never_negative() {
    let outcome = extract(&[
        "Grupo 3001",
        "Fixo",
        "Fixo",
        "Lance FIXO",
        "Grupo 3002",
        "Sorteio",
    ]);

    assert_eq!(outcome.records[0].adjusted_fixed_bid_count, 2);
    assert_eq!(outcome.records[0].contemplated_count, 3);
    assert_eq!(outcome.records[1].adjusted_fixed_bid_count, 0);
}

#[test]
fn last_quota_count_line_overrides_manual_tally() {
    let outcome = extract(&[
        "Cotas Grupo: 9",
        "Grupo 2009",
        "Cotas Grupo: 12",
        "Livre",
        "Livre",
        "Sorteio",
        "Cotas Grupo 7",
        "Grupo 2010",
        "Livre",
    ]);

    assert_eq!(outcome.records[0].contemplated_count, 7);
    assert_eq!(outcome.records[1].contemplated_count, 1);
}

#[test]
fn free_bid_mean_and_minimum_are_rounded_to_four_places() {
    let outcome = extract(&[
        "Grupo 2009",
        "Livre 10,0000",
        "Livre 20,0000",
        "Livre 20,0000",
    ]);

    let record = &outcome.records[0];
    assert_eq!(record.free_bid_count, 3);
    assert_eq!(record.mean_free_percentage, 16.6667);
    assert_eq!(record.min_free_percentage, 10.0);
}

#[test]
fn free_bid_without_own_percentage_uses_last_seen_value() {
    let outcome = extract(&[
        "Grupo 2009",
        "45,1234",
        "Livre",
        "Livre 55,0000",
        "Livre",
    ]);

    let record = &outcome.records[0];
    assert_eq!(record.free_bid_count, 3);
    assert_eq!(record.mean_free_percentage, 51.7078);
    assert_eq!(record.min_free_percentage, 45.1234);
}

#[test]
fn last_seen_percentage_resets_on_new_group() {
    let outcome = extract(&["Grupo 2009", "80,0000 Fixo", "Grupo 2010", "Livre"]);

    let second = &outcome.records[1];
    assert_eq!(second.free_bid_count, 1);
    assert_eq!(second.mean_free_percentage, 0.0);
    assert_eq!(second.min_free_percentage, 0.0);
}

#[test]
fn percentages_outside_valid_range_are_ignored() {
    let outcome = extract(&[
        "Grupo 2009",
        "150,0000 Livre",
        "0,0000 Livre",
        "70,50 Livre",
    ]);

    let record = &outcome.records[0];
    assert_eq!(record.free_bid_count, 3);
    assert_eq!(record.mean_free_percentage, 0.0);
    assert_eq!(record.min_free_percentage, 0.0);
}

#[test]
fn date_found_late_applies_to_groups_closed_earlier() {
    let outcome = extract(&[
        "Grupo 2009",
        "Livre",
        "Grupo 2010",
        "Sorteio",
        "Contemplacao de 01/02/2024",
        "Contemplação de: 05/06/24",
    ]);

    assert_eq!(outcome.assembly_date.as_deref(), Some("01/02/2024"));
    assert!(
        outcome
            .records
            .iter()
            .all(|record| record.assembly_date == "01/02/2024")
    );
}

#[test]
fn missing_date_falls_back_to_dash() {
    let outcome = extract(&["Grupo 2009", "Livre"]);

    assert!(outcome.assembly_date.is_none());
    assert_eq!(outcome.records[0].assembly_date, "-");
}

#[test]
fn recognizes_all_group_header_shapes() {
    let outcome = extract(&[
        "Grupo",
        "2009",
        "Livre 30,0000",
        "2010 Grupo",
        "Fixo",
        "GRUPO 2011",
        "grupo",
        "2012",
        "Sorteio",
    ]);

    assert_eq!(group_numbers(&outcome), vec![2009, 2010, 2011, 2012]);
    assert_eq!(outcome.records[0].mean_free_percentage, 30.0);
    assert_eq!(outcome.records[3].contemplated_count, 1);
}

#[test]
fn bare_number_without_pending_header_is_content() {
    let outcome = extract(&["Grupo 2009", "2010", "Livre"]);

    assert_eq!(group_numbers(&outcome), vec![2009]);
    assert_eq!(outcome.records[0].free_bid_count, 1);
}

#[test]
fn lines_before_first_group_are_not_counted() {
    let outcome = extract(&["Livre 70,0000", "Fixo", "Grupo 2009", "Sorteio"]);

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].contemplated_count, 1);
    assert_eq!(outcome.records[0].free_bid_count, 0);
}

#[test]
fn non_ascii_digit_group_is_tallied_but_dropped() {
    let outcome = extract(&[
        "Grupo 2009",
        "Livre",
        "Grupo ٢٠٠٩",
        "Livre",
        "Livre",
        "Grupo 2010",
        "Sorteio",
    ]);

    assert_eq!(group_numbers(&outcome), vec![2009, 2010]);
    assert_eq!(outcome.records[0].free_bid_count, 1);
    assert_eq!(outcome.stats.unparsable_groups_dropped, 1);
}

#[test]
fn mean_of_adjacent_samples_rounds_like_exact_decimal() {
    let outcome = extract(&["Grupo 2009", "Livre 70,0003", "Livre 70,0004"]);

    let record = &outcome.records[0];
    assert_eq!(record.mean_free_percentage, 70.0003);
    assert_eq!(record.min_free_percentage, 70.0003);
}

#[test]
fn pending_bare_header_survives_inline_header() {
    let outcome = extract(&["Grupo", "Grupo 2010", "Fixo", "2011", "Sorteio"]);

    assert_eq!(group_numbers(&outcome), vec![2010, 2011]);
    assert_eq!(outcome.records[0].contemplated_count, 1);
    assert_eq!(outcome.records[1].contemplated_count, 1);
}

#[test]
fn oversized_quota_count_is_ignored() {
    let outcome = extract(&[
        "Grupo 2009",
        "Cotas Grupo: 12",
        "Livre",
        "Cotas Grupo: 99999999999",
        "Grupo 2010",
        "Livre",
        "Sorteio",
        "Cotas Grupo: 99999999999",
    ]);

    assert_eq!(outcome.records[0].contemplated_count, 12);
    assert_eq!(outcome.records[1].contemplated_count, 2);
}

#[test]
fn case_folded_bid_tokens_are_counted() {
    let outcome = extract(&["Grupo 2009", "ſorteio", "LIVRE 40,0000", "fixo"]);

    let record = &outcome.records[0];
    assert_eq!(record.contemplated_count, 3);
    assert_eq!(record.free_bid_count, 1);
    assert_eq!(record.mean_free_percentage, 40.0);
    assert_eq!(record.adjusted_fixed_bid_count, 0);
}

#[test]
fn empty_input_yields_no_records() {
    let outcome = extract(&[]);

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.stats.lines_scanned, 0);
}

#[test]
fn scan_lines_trims_and_skips_blank_lines_and_pages() {
    let pages = vec![
        Some("  Grupo 2009 \r\n\n   \n Livre \n".to_string()),
        None,
        Some("\tFixo".to_string()),
    ];

    let lines: Vec<&str> = scan_lines(&pages).collect();
    assert_eq!(lines, vec!["Grupo 2009", "Livre", "Fixo"]);
}

#[test]
fn split_pages_marks_blank_pages_and_drops_trailing_ones() {
    let pages = split_pages("Grupo 2009\n\u{000C}  \n\u{000C}Livre\u{0000}\n\u{000C}", None);
    assert_eq!(
        pages,
        vec![
            Some("Grupo 2009\n".to_string()),
            None,
            Some("Livre\n".to_string()),
        ]
    );

    let limited = split_pages("a\u{000C}b\u{000C}c", Some(2));
    assert_eq!(limited, vec![Some("a".to_string()), Some("b".to_string())]);
}

#[test]
fn missing_input_is_reported_before_extraction() {
    let error = open_page_source(&PathBuf::from("does/not/exist.pdf"), None)
        .err()
        .expect("missing input should fail");
    assert!(matches!(error, SourceError::MissingInput(_)));
}

#[test]
fn text_dump_source_feeds_extraction() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("contemplados.txt");
    fs::write(
        &path,
        "Resultado\nContemplação de: 15/03/24\n\u{000C}Grupo 2009\n70,0000 Livre\n\u{000C}\u{000C}2010 Grupo\nSorteio\n",
    )
    .expect("write fixture");

    let source = open_page_source(&path, None).expect("source should open");
    assert_eq!(source.backend(), "text_dump");

    let pages = source.read_pages().expect("pages should load");
    assert_eq!(pages.len(), 4);
    assert!(pages[2].is_none());

    let patterns = LinePatterns::new().expect("line patterns should compile");
    let outcome = extract_groups(&patterns, scan_lines(&pages));
    assert_eq!(group_numbers(&outcome), vec![2009, 2010]);
    assert_eq!(outcome.records[1].assembly_date, "15/03/24");
}

#[test]
fn records_serialize_with_published_field_names() {
    let outcome = extract(&["Grupo 2009", "70,0000 Livre"]);
    let value = serde_json::to_value(&outcome.records).expect("records serialize");
    let object = value[0].as_object().expect("record is an object");

    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "Assembleia",
            "Grupo",
            "Media Lance Livre",
            "Menor Lance Livre",
            "Qtd Contemplados",
            "Qtd Lance Fixo (30/45)",
            "Qtd Lance Livre",
        ]
    );
    assert_eq!(object["Grupo"], 2009);
    assert_eq!(object["Media Lance Livre"], 70.0);
}

#[test]
fn render_extract_command_includes_optional_flags() {
    let args = ExtractArgs {
        input: PathBuf::from("contemplados_geral.pdf"),
        output: PathBuf::from("out.json"),
        manifest_path: Some(PathBuf::from("run.json")),
        max_pages: NonZeroUsize::new(3),
        dry_run: true,
    };

    assert_eq!(
        render_extract_command(&args),
        "assembly-stats extract --input contemplados_geral.pdf --output out.json --manifest-path run.json --max-pages 3 --dry-run"
    );
}
