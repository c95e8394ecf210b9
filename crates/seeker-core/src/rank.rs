//! Result normalization and ranking

use crate::extract::RawRow;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Known qualities, best first
pub const QUALITY_ORDER: &[&str] = &["2160p", "1440p", "1080p", "720p", "480p", "360p"];

/// Rank given to results with no recognizable quality; worse than any known one
pub const UNKNOWN_QUALITY_RANK: usize = usize::MAX;

/// Number of results kept after sorting
pub const MAX_RESULTS: usize = 5;

/// A normalized search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub name: String,
    pub quality: Option<String>,
    /// Index into [`QUALITY_ORDER`]; lower is better
    pub quality_rank: usize,
    pub size_text: String,
    pub size_mb: Option<f64>,
    /// Largest integer found in the row, usually the seed count
    pub health: u64,
    pub detail_url: Option<String>,
    pub cells: Vec<String>,
}

fn quality_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(2160p|1440p|1080p|720p|480p|360p)").unwrap())
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)([\d.]+)\s*(TB|GB|MB|KB)").unwrap())
}

fn integer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// First known quality tag in the text, lowercased
pub fn parse_quality(text: &str) -> Option<String> {
    quality_regex()
        .captures(text)
        .map(|caps| caps[1].to_lowercase())
}

/// Convert a size like "1.2 GB" to mebibytes
pub fn to_size_mb(size_text: &str) -> Option<f64> {
    let caps = size_regex().captures(size_text)?;
    let value: f64 = caps[1].parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let factor = match caps[2].to_uppercase().as_str() {
        "TB" => 1024.0 * 1024.0,
        "GB" => 1024.0,
        "MB" => 1.0,
        "KB" => 1.0 / 1024.0,
        _ => return None,
    };
    Some(value * factor)
}

/// Largest integer appearing in any cell, or 0
pub fn health_score(cells: &[String]) -> u64 {
    cells
        .iter()
        .flat_map(|cell| integer_regex().find_iter(cell))
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

fn normalize_row(row: &RawRow) -> RankedResult {
    let cells = row.effective_cells();
    let joined = cells.join(" ");

    let quality = parse_quality(&joined);
    let quality_rank = quality
        .as_deref()
        .and_then(|q| QUALITY_ORDER.iter().position(|known| *known == q))
        .unwrap_or(UNKNOWN_QUALITY_RANK);

    let size_cell = cells.iter().find(|cell| size_regex().is_match(cell));
    let size_mb = size_cell.and_then(|cell| to_size_mb(cell));

    RankedResult {
        name: cells.first().cloned().unwrap_or_else(|| row.text.clone()),
        quality,
        quality_rank,
        size_text: size_cell.cloned().unwrap_or_else(|| "Unknown".to_string()),
        size_mb,
        health: health_score(&cells),
        detail_url: row.detail_url.clone(),
        cells,
    }
}

/// Turn raw rows into typed records
pub fn normalize_results(rows: &[RawRow]) -> Vec<RankedResult> {
    rows.iter().map(normalize_row).collect()
}

/// Ordering used for results: health desc, quality asc, size asc, known size first
pub fn compare_results(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.health
        .cmp(&a.health)
        .then_with(|| a.quality_rank.cmp(&b.quality_rank))
        .then_with(|| match (a.size_mb, b.size_mb) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

/// Stable sort, then drop records without a name
pub fn sort_results(mut results: Vec<RankedResult>) -> Vec<RankedResult> {
    results.sort_by(compare_results);
    results.retain(|r| !r.name.trim().is_empty());
    results
}

/// Normalize, sort, and keep the best [`MAX_RESULTS`]
pub fn rank_rows(rows: &[RawRow]) -> Vec<RankedResult> {
    let mut ranked = sort_results(normalize_results(rows));
    ranked.truncate(MAX_RESULTS);
    ranked
}
