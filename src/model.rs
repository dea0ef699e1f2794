use serde::{Deserialize, Serialize};

/// Placeholder written into `Assembleia` when no contemplation date was found.
pub const UNKNOWN_ASSEMBLY_DATE: &str = "-";

/// One finalized group, serialized with the field names consumers of the
/// statistics file expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(rename = "Grupo")]
    pub group_number: u32,
    #[serde(rename = "Assembleia")]
    pub assembly_date: String,
    #[serde(rename = "Qtd Contemplados")]
    pub contemplated_count: u32,
    #[serde(rename = "Qtd Lance Fixo (30/45)")]
    pub adjusted_fixed_bid_count: u32,
    #[serde(rename = "Qtd Lance Livre")]
    pub free_bid_count: u32,
    #[serde(rename = "Media Lance Livre")]
    pub mean_free_percentage: f64,
    #[serde(rename = "Menor Lance Livre")]
    pub min_free_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub path: String,
    pub backend: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolVersions {
    pub pdftotext: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractCounts {
    pub page_count: usize,
    pub empty_page_count: usize,
    pub lines_scanned: usize,
    pub bid_lines_tallied: usize,
    pub groups_emitted: usize,
    pub duplicate_headers_skipped: usize,
    pub unparsable_groups_dropped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub tool_versions: ToolVersions,
    pub source: SourceEntry,
    pub output_path: Option<String>,
    pub counts: ExtractCounts,
    pub assembly_date: Option<String>,
    pub warnings: Vec<String>,
}
