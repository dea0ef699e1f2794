use std::collections::HashSet;
use std::mem;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use crate::model::{GroupRecord, UNKNOWN_ASSEMBLY_DATE};
use crate::util::round4;

#[derive(Debug)]
pub struct LinePatterns {
    contemplation_date: Regex,
    quota_count: Regex,
    group_header: Regex,
    isolated_number: Regex,
    percentage: Regex,
    bid_kind: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderMatch<'a> {
    Number(&'a str),
    /// "Grupo" alone on its line; the number follows on a later line.
    Bare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BidKind {
    Free,
    Fixed,
    Drawing,
}

impl LinePatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            contemplation_date: Regex::new(
                r"(?i)Contempla[çc][ãa]o\s*de[:\s]*(\d{2}/\d{2}/\d{2,4})",
            )
            .context("failed to compile contemplation date regex")?,
            quota_count: Regex::new(r"(?i)Cotas\s*Grupo\s*[:.]?\s*(\d+)")
                .context("failed to compile quota count regex")?,
            group_header: Regex::new(r"(?i)(?:Grupo\s+(\d{4}))|(\d{4})\s+Grupo|^Grupo$")
                .context("failed to compile group header regex")?,
            isolated_number: Regex::new(r"^(\d{4})$")
                .context("failed to compile isolated group number regex")?,
            percentage: Regex::new(r"(\d{1,3},\d{4,})")
                .context("failed to compile percentage regex")?,
            bid_kind: Regex::new(r"(?i)(Livre)|(Fixo)|(Sorteio)")
                .context("failed to compile bid type regex")?,
        })
    }

    fn contemplation_date<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.contemplation_date
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
    }

    fn quota_count(&self, line: &str) -> Option<u32> {
        self.quota_count
            .captures(line)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    }

    fn header<'a>(&self, line: &'a str) -> Option<HeaderMatch<'a>> {
        let captures = self.group_header.captures(line)?;
        match captures.get(1).or_else(|| captures.get(2)) {
            Some(number) => Some(HeaderMatch::Number(number.as_str())),
            None => Some(HeaderMatch::Bare),
        }
    }

    fn isolated_number<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.isolated_number
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
    }

    /// Comma-decimal percentage in `(0, 100]`; anything else is ignored.
    fn percentage(&self, line: &str) -> Option<f64> {
        let raw = self.percentage.captures(line)?.get(1)?.as_str();
        raw.replace(',', ".")
            .parse::<f64>()
            .ok()
            .filter(|value| *value > 0.0 && *value <= 100.0)
    }

    /// Kind follows the alternative that matched, so case-folded spellings
    /// still count.
    fn bid_kind(&self, line: &str) -> Option<BidKind> {
        let captures = self.bid_kind.captures(line)?;
        if captures.get(1).is_some() {
            Some(BidKind::Free)
        } else if captures.get(2).is_some() {
            Some(BidKind::Fixed)
        } else {
            Some(BidKind::Drawing)
        }
    }
}

#[derive(Debug, Default)]
struct GroupAccumulator {
    manual_count: u32,
    official_count: Option<u32>,
    fixed_bid_count: u32,
    free_bid_count: u32,
    free_bid_percentages: Vec<f64>,
}

impl GroupAccumulator {
    /// Builds the output record; `None` when the header number is not a valid
    /// integer. The assembly date is filled in once the whole stream is read.
    ///
    /// Both the official-count override and the one-less fixed bid count are
    /// business rules of the published statistics and are kept as-is.
    fn into_record(self, number: &str) -> Option<GroupRecord> {
        let group_number = number.parse::<u32>().ok()?;

        let (mean, min) = if self.free_bid_percentages.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = self.free_bid_percentages.iter().sum();
            let min = self
                .free_bid_percentages
                .iter()
                .copied()
                .fold(f64::INFINITY, f64::min);
            (sum / self.free_bid_percentages.len() as f64, min)
        };

        Some(GroupRecord {
            group_number,
            assembly_date: UNKNOWN_ASSEMBLY_DATE.to_string(),
            contemplated_count: self.official_count.unwrap_or(self.manual_count),
            adjusted_fixed_bid_count: self.fixed_bid_count.saturating_sub(1),
            free_bid_count: self.free_bid_count,
            mean_free_percentage: round4(mean),
            min_free_percentage: round4(min),
        })
    }
}

#[derive(Debug, Default)]
enum GroupContext {
    #[default]
    Idle,
    Live {
        number: String,
        accumulator: GroupAccumulator,
    },
    /// Header for a group already emitted; its lines are not counted.
    Duplicate { number: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub lines_scanned: usize,
    pub bid_lines_tallied: usize,
    pub duplicate_headers_skipped: usize,
    pub unparsable_groups_dropped: usize,
}

#[derive(Debug)]
pub struct ExtractionOutcome {
    pub records: Vec<GroupRecord>,
    /// `None` when no contemplation date appeared anywhere in the document.
    pub assembly_date: Option<String>,
    pub stats: ExtractionStats,
}

/// State for a single pass over a document's lines.
#[derive(Debug, Default)]
pub struct ParserState {
    context: GroupContext,
    last_seen_percentage: f64,
    awaiting_isolated_group_number: bool,
    seen_group_numbers: HashSet<u32>,
    global_date: Option<String>,
    records: Vec<GroupRecord>,
    stats: ExtractionStats,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consume(&mut self, patterns: &LinePatterns, line: &str) {
        self.stats.lines_scanned += 1;

        if self.global_date.is_none() {
            if let Some(date) = patterns.contemplation_date(line) {
                info!(date, "contemplation date detected");
                self.global_date = Some(date.to_string());
            }
        }

        if let Some(count) = patterns.quota_count(line) {
            if let GroupContext::Live { accumulator, .. } = &mut self.context {
                accumulator.official_count = Some(count);
            }
        }

        let boundary = match patterns.header(line) {
            Some(HeaderMatch::Number(number)) => Some(number),
            Some(HeaderMatch::Bare) => {
                self.awaiting_isolated_group_number = true;
                return;
            }
            None if self.awaiting_isolated_group_number => {
                let number = patterns.isolated_number(line);
                if number.is_some() {
                    self.awaiting_isolated_group_number = false;
                }
                number
            }
            None => None,
        };

        if let Some(number) = boundary {
            self.open_group(number);
            return;
        }

        self.accumulate(patterns, line);
    }

    pub fn finish(mut self) -> ExtractionOutcome {
        if let GroupContext::Live {
            number,
            accumulator,
        } = mem::take(&mut self.context)
        {
            self.close_group(&number, accumulator);
        }

        let assembly_date = self
            .global_date
            .clone()
            .unwrap_or_else(|| UNKNOWN_ASSEMBLY_DATE.to_string());
        for record in &mut self.records {
            record.assembly_date.clone_from(&assembly_date);
        }

        ExtractionOutcome {
            records: self.records,
            assembly_date: self.global_date,
            stats: self.stats,
        }
    }

    fn open_group(&mut self, number: &str) {
        if let GroupContext::Live {
            number: closing,
            accumulator,
        } = mem::take(&mut self.context)
        {
            self.close_group(&closing, accumulator);
        }

        match number.parse::<u32>() {
            Ok(value) if self.seen_group_numbers.contains(&value) => {
                self.stats.duplicate_headers_skipped += 1;
                debug!(group = number, "repeated group header, ignoring its lines");
                self.context = GroupContext::Duplicate {
                    number: number.to_string(),
                };
            }
            Ok(value) => {
                self.seen_group_numbers.insert(value);
                self.start_live_group(number);
            }
            Err(_) => {
                // Not deduplicated; the record is dropped again when it closes.
                debug!(group = number, "group number is not an integer");
                self.start_live_group(number);
            }
        }
    }

    fn start_live_group(&mut self, number: &str) {
        self.last_seen_percentage = 0.0;
        self.context = GroupContext::Live {
            number: number.to_string(),
            accumulator: GroupAccumulator::default(),
        };
    }

    fn close_group(&mut self, number: &str, accumulator: GroupAccumulator) {
        match accumulator.into_record(number) {
            Some(record) => self.records.push(record),
            None => {
                self.stats.unparsable_groups_dropped += 1;
                debug!(group = number, "dropping group with non-numeric number");
            }
        }
    }

    fn accumulate(&mut self, patterns: &LinePatterns, line: &str) {
        let accumulator = match &mut self.context {
            GroupContext::Live { accumulator, .. } => accumulator,
            GroupContext::Duplicate { number } => {
                debug!(group = %number, line, "skipping line under repeated group");
                return;
            }
            GroupContext::Idle => return,
        };

        let line_percentage = patterns.percentage(line);
        if let Some(value) = line_percentage {
            self.last_seen_percentage = value;
        }

        let Some(kind) = patterns.bid_kind(line) else {
            return;
        };

        self.stats.bid_lines_tallied += 1;
        accumulator.manual_count += 1;

        match kind {
            BidKind::Fixed => accumulator.fixed_bid_count += 1,
            BidKind::Free => {
                accumulator.free_bid_count += 1;
                let sample = line_percentage.or_else(|| {
                    (self.last_seen_percentage > 0.0).then_some(self.last_seen_percentage)
                });
                if let Some(value) = sample {
                    accumulator.free_bid_percentages.push(value);
                }
            }
            BidKind::Drawing => {}
        }
    }
}

pub fn extract_groups<'a>(
    patterns: &LinePatterns,
    lines: impl IntoIterator<Item = &'a str>,
) -> ExtractionOutcome {
    let mut state = ParserState::new();
    for line in lines {
        state.consume(patterns, line);
    }
    state.finish()
}
