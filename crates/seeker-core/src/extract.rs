//! Result table and download link extraction

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Row selectors, most specific first. The first one that yields a row wins.
pub const RESULT_ROW_SELECTORS: &[&str] = &[
    // CSS form of /html/body/div[1]/div[6]/div[1]/table[2]/tbody
    "body > div:nth-of-type(1) > div:nth-of-type(6) > div:nth-of-type(1) > table:nth-of-type(2) > tbody > tr",
    "table.table2 > tbody > tr",
    "table:nth-of-type(2) > tbody > tr",
    "tbody tr",
    "table tr",
];

/// Detail page selectors tried before scanning every anchor
pub const DOWNLOAD_LINK_SELECTORS: &[&str] = &[
    "a[href^='magnet:']",
    ".downloadarea a[href]",
    "a.csprite_dltorrent[href]",
];

/// One table row, minimally parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// Non-empty cell texts in order
    pub cells: Vec<String>,
    /// Whole visible row text
    pub text: String,
    /// First in-row link, resolved against the page URL
    pub detail_url: Option<String>,
}

impl RawRow {
    /// Cells, or the whole row text when the row had no cells
    pub fn effective_cells(&self) -> Vec<String> {
        if self.cells.is_empty() {
            vec![self.text.clone()]
        } else {
            self.cells.clone()
        }
    }
}

/// Parse result rows out of a search page
pub fn extract_rows_from_html(html: &str, base_url: &str) -> Vec<RawRow> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    for selector_str in RESULT_ROW_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };

        let rows: Vec<RawRow> = document
            .select(&selector)
            .filter_map(|row| parse_row(row, base.as_ref()))
            .collect();

        if !rows.is_empty() {
            debug!("Extracted {} rows using selector: {}", rows.len(), selector_str);
            return rows;
        }
    }

    debug!("No result rows matched any selector");
    Vec::new()
}

fn parse_row(row: ElementRef, base: Option<&Url>) -> Option<RawRow> {
    let mut cells = Vec::new();
    let mut header_cells = 0;

    for child in row.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "td" => {
                let text = collapse_whitespace(&child.text().collect::<Vec<_>>().join(" "));
                if !text.is_empty() {
                    cells.push(text);
                }
            }
            "th" => header_cells += 1,
            _ => {}
        }
    }

    // Header rows carry only <th> cells
    if cells.is_empty() && header_cells > 0 {
        return None;
    }

    let text = collapse_whitespace(&row.text().collect::<Vec<_>>().join(" "));
    if cells.is_empty() && text.is_empty() {
        return None;
    }

    let anchor = Selector::parse("a[href]").unwrap();
    let detail_url = row
        .select(&anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| resolve_href(href, base));

    Some(RawRow {
        cells,
        text,
        detail_url,
    })
}

/// Find the best magnet or torrent link on a detail page
pub fn extract_download_link(html: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut candidates: Vec<(u8, String)> = Vec::new();
    for selector_str in DOWNLOAD_LINK_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        for anchor in document.select(&selector) {
            if let Some(candidate) = score_anchor(anchor) {
                if !candidates.iter().any(|(_, href)| *href == candidate.1) {
                    candidates.push(candidate);
                }
            }
        }
    }

    if candidates.is_empty() {
        debug!("No download selector matched, scanning every anchor");
        let anchor = Selector::parse("a[href]").unwrap();
        candidates = document
            .select(&anchor)
            .filter_map(score_anchor)
            .filter(|(score, _)| *score > 0)
            .collect();
    }

    // max_by_key keeps the last maximum, so walk in reverse to prefer document order
    candidates
        .into_iter()
        .rev()
        .max_by_key(|(score, _)| *score)
        .map(|(_, href)| resolve_href(&href, base.as_ref()))
}

fn score_anchor(anchor: ElementRef) -> Option<(u8, String)> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }

    let text = anchor.text().collect::<String>().to_lowercase();
    Some((link_score(href, &text), href.to_string()))
}

/// Specificity of a candidate download link
fn link_score(href: &str, text: &str) -> u8 {
    let lower = href.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");

    if lower.starts_with("magnet:") {
        3
    } else if path.ends_with(".torrent") {
        2
    } else if text.contains("magnet") || text.contains("torrent") {
        1
    } else {
        0
    }
}

fn resolve_href(href: &str, base: Option<&Url>) -> String {
    if href.to_lowercase().starts_with("magnet:") {
        return href.to_string();
    }

    match base {
        Some(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
