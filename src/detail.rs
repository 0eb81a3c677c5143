//! Assignment detail pages.
//!
//! Each summary's link points at a detail page holding an info table. The
//! table is found by its `Posted:` label cell (pages carry other, unrelated
//! tables) and every further lookup is relative to it:
//!
//! | Field | Source |
//! |-------|--------|
//! | `total_points` | first number in the cell after `Total Points:` |
//! | `sections` | text of the cell after `Sections:` |
//! | `description` | inner HTML of the last cell in the second-to-last row |
//!
//! Points and sections are left as `None` when their label is absent.

use std::sync::LazyLock;

use futures::future::try_join_all;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::models::{AssignmentSummary, FullAssignmentRecord};
use crate::session::{PortalSession, SessionRequest};
use crate::text::selector;

const POSTED_LABEL: &str = "Posted:";
const POINTS_LABEL: &str = "Total Points:";
const SECTIONS_LABEL: &str = "Sections:";

static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d+)?").unwrap_or_else(|e| panic!("invalid number pattern: {e}"))
});

/// Fields read from a detail page.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentDetail {
    pub description: String,
    pub sections: Option<String>,
    pub total_points: Option<f64>,
}

impl AssignmentDetail {
    pub fn merge(self, summary: AssignmentSummary) -> FullAssignmentRecord {
        FullAssignmentRecord {
            summary,
            description: self.description,
            sections: self.sections,
            total_points: self.total_points,
        }
    }
}

/// Parse the info table out of a detail page.
pub fn parse_detail_page(html: &str) -> SyncResult<AssignmentDetail> {
    let document = Html::parse_document(html);

    let table = document
        .select(&TABLE)
        .find(|t| direct_cells(*t).any(|c| cell_text(c) == POSTED_LABEL))
        .ok_or_else(|| {
            SyncError::Parse(format!("no table with a {:?} label cell", POSTED_LABEL))
        })?;

    let total_points = value_after_label(table, POINTS_LABEL)
        .and_then(|cell| NUMBER.find(&cell_text(cell)).map(|m| m.as_str().to_string()))
        .map(|n| {
            n.parse::<f64>()
                .map_err(|e| SyncError::Parse(format!("bad point total {:?}: {}", n, e)))
        })
        .transpose()?;

    let sections = value_after_label(table, SECTIONS_LABEL).map(cell_text);

    let rows: Vec<ElementRef<'_>> = direct_rows(table).collect();
    let description = rows
        .len()
        .checked_sub(2)
        .and_then(|i| row_cells(rows[i]).last())
        .map(|cell| cell.inner_html().trim().to_string())
        .ok_or_else(|| {
            SyncError::Parse("info table has no description row".to_string())
        })?;

    Ok(AssignmentDetail {
        description,
        sections,
        total_points,
    })
}

/// Fetch one summary's detail page and merge it into a full record.
pub async fn enrich(
    session: &dyn PortalSession,
    summary: AssignmentSummary,
) -> SyncResult<FullAssignmentRecord> {
    debug!(name = %summary.name, link = %summary.link, "fetching detail page");
    let detail = session
        .fetch(SessionRequest::get(summary.link.clone()))
        .await
        .and_then(|html| parse_detail_page(&html))
        .map_err(|e| e.for_assignment(&summary.name, &summary.link))?;
    Ok(detail.merge(summary))
}

/// Enrich every summary concurrently. The first failure fails the batch;
/// results of fetches still in flight are discarded.
pub async fn enrich_all(
    session: &dyn PortalSession,
    summaries: Vec<AssignmentSummary>,
) -> SyncResult<Vec<FullAssignmentRecord>> {
    let total = summaries.len();
    let records = try_join_all(summaries.into_iter().map(|s| enrich(session, s))).await?;
    info!(count = total, "enriched assignments");
    Ok(records)
}

/// Rows belonging to this table, not to tables nested in its cells.
fn direct_rows<'a>(table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    table.select(&ROW).filter(move |row| belongs_to(*row, table))
}

fn direct_cells<'a>(table: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    direct_rows(table).flat_map(row_cells)
}

/// The row's own `th`/`td` children. Cells of tables nested inside them are
/// not included.
fn row_cells(row: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| matches!(e.value().name(), "td" | "th"))
}

fn belongs_to(row: ElementRef<'_>, table: ElementRef<'_>) -> bool {
    row.ancestors()
        .find(|n| n.value().as_element().map(|e| e.name()) == Some("table"))
        .map(|n| n.id() == table.id())
        .unwrap_or(false)
}

fn value_after_label<'a>(table: ElementRef<'a>, label: &str) -> Option<ElementRef<'a>> {
    let label_cell = direct_cells(table).find(|c| cell_text(*c) == label)?;
    label_cell.next_siblings().find_map(ElementRef::wrap)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
