//! Tolerant extraction of competition rows from listing markup.
//!
//! The listing page carries one table whose column headers vary, but the
//! first two columns are always organization and positions. Extraction is
//! best-effort row mapping: malformed rows are skipped, and only a document
//! with no table at all is an error.

use std::sync::LazyLock;

use cnb_core::{CompetitionRecord, CompetitionStatus};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

static TABLE: LazyLock<Selector> = LazyLock::new(|| sel("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| sel("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| sel("td"));
static LINK: LazyLock<Selector> = LazyLock::new(|| sel("a[href]"));

fn sel(raw: &str) -> Selector {
    Selector::parse(raw).expect("static selector is valid")
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The expected table structure is entirely absent, which means the
    /// host page changed shape. Distinct from a table with zero data rows,
    /// which is a valid sparse region.
    #[error("no listing table in document")]
    MissingTable,
}

/// Converts raw listing markup into an ordered list of records, preserving
/// source table order. Relative detail links are resolved against `base`.
///
/// Re-extracting identical markup yields an element-wise identical list.
pub fn extract(
    raw_markup: &str,
    base: &Url,
) -> Result<Vec<CompetitionRecord>, ExtractionError> {
    let document = Html::parse_document(raw_markup);
    let table = document
        .select(&TABLE)
        .next()
        .ok_or(ExtractionError::MissingTable)?;

    let mut records = Vec::new();
    for row in table.select(&ROW) {
        // Header rows use <th> and fall through the cell count check.
        let cells: Vec<ElementRef> = row.select(&CELL).collect();
        if cells.len() < 2 {
            continue;
        }

        let organization = cell_text(cells[0]);
        let positions = cell_text(cells[1]);
        if organization.is_empty() || positions.is_empty() {
            continue;
        }

        let row_text: String = row.text().collect();
        let status = CompetitionStatus::classify(&row_text);
        // The site sometimes folds the "previsto" marker into the
        // organization cell; it is a status, not part of the name.
        let organization = if status == CompetitionStatus::Scheduled {
            strip_scheduled_marker(&organization)
        } else {
            organization
        };
        if organization.is_empty() {
            continue;
        }

        let url = cells[0]
            .select(&LINK)
            .next()
            .and_then(|anchor| anchor.value().attr("href"))
            .and_then(|href| absolutize(base, href));

        records.push(CompetitionRecord {
            organization,
            positions,
            status,
            url,
        });
    }

    Ok(records)
}

/// Concatenated text of a cell with whitespace collapsed.
fn cell_text(cell: ElementRef) -> String {
    normalize_whitespace(&cell.text().collect::<String>())
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes the first case-insensitive occurrence of "previsto".
fn strip_scheduled_marker(text: &str) -> String {
    let needle = b"previsto";
    let found = text
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle));
    match found {
        // The match is pure ASCII, so both ends are char boundaries.
        Some(pos) => normalize_whitespace(&format!(
            "{}{}",
            &text[..pos],
            &text[pos + needle.len()..]
        )),
        None => text.to_string(),
    }
}

fn absolutize(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(String::from)
}
