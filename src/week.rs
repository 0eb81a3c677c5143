//! Week calendar fragment parsing.
//!
//! The portal's `portlet_calendar_week` endpoint answers with an HTML
//! fragment: one `div.cal_day` per day (id `day_YYYY-MM-DD`), each holding
//! `li.cal_item` entries.
//!
//! ```html
//! <div class="cal_day" id="day_2022-01-07">
//!   <ul>
//!     <li class="cal_item">
//!       <a class="class_filter" title="AP Music Theory" href="#">AP Music Theory</a>
//!       <span class="description">
//!         <a class="assignment_link" href="/x/y/assignment/view/123" title="TEST 4">TEST 4</a>
//!       </span>
//!       <span class="small">11:59pm</span>
//!     </li>
//!   </ul>
//! </div>
//! ```
//!
//! When the range is empty the calendar markup is replaced entirely by a
//! notice containing [`EMPTY_RANGE_MARKER`].

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::due_date::resolve_due_date;
use crate::error::{SyncError, SyncResult};
use crate::models::AssignmentSummary;
use crate::text::selector;

/// Text the portal shows instead of the calendar when nothing is due.
pub const EMPTY_RANGE_MARKER: &str = "There are no assignments in this range";

const DAY_SELECTOR: &str = "div.cal_day";
const ITEM_SELECTOR: &str = "li.cal_item";
const CLASS_ANCHOR_SELECTOR: &str = "a.class_filter";
const ASSIGNMENT_ANCHOR_SELECTOR: &str = "a.assignment_link";
const TIME_SELECTOR: &str = "span.small";
const DAY_ID_PREFIX: &str = "day_";

static DAY: LazyLock<Selector> = LazyLock::new(|| selector(DAY_SELECTOR));
static ITEM: LazyLock<Selector> = LazyLock::new(|| selector(ITEM_SELECTOR));
static CLASS_ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector(CLASS_ANCHOR_SELECTOR));
static ASSIGNMENT_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| selector(ASSIGNMENT_ANCHOR_SELECTOR));
static TIME: LazyLock<Selector> = LazyLock::new(|| selector(TIME_SELECTOR));

/// Parse a week fragment into summaries, day-major then item order.
///
/// Returns an empty list as soon as the empty-range marker is seen. Any
/// missing element or attribute fails the whole parse.
pub fn parse_week_fragment(html: &str) -> SyncResult<Vec<AssignmentSummary>> {
    let fragment = Html::parse_fragment(html);

    if fragment
        .root_element()
        .text()
        .any(|t| t.contains(EMPTY_RANGE_MARKER))
    {
        debug!("week fragment reports an empty range");
        return Ok(Vec::new());
    }

    let mut summaries = Vec::new();
    for (index, day_block) in fragment.select(&DAY).enumerate() {
        let day = day_block
            .value()
            .attr("id")
            .ok_or_else(|| missing(format!("day block #{}", index), "id"))?;
        let day = day.strip_prefix(DAY_ID_PREFIX).ok_or_else(|| {
            SyncError::Parse(format!(
                "day block id {:?} does not start with {:?}",
                day, DAY_ID_PREFIX
            ))
        })?;

        for item in day_block.select(&ITEM) {
            summaries.push(parse_item(day, item)?);
        }
    }

    debug!(count = summaries.len(), "parsed week fragment");
    Ok(summaries)
}

fn parse_item(day: &str, item: ElementRef<'_>) -> SyncResult<AssignmentSummary> {
    let class_name = required_attr(item, &CLASS_ANCHOR, CLASS_ANCHOR_SELECTOR, "title", day)?;

    let anchor = item
        .select(&ASSIGNMENT_ANCHOR)
        .next()
        .ok_or_else(|| missing_in_day(day, ASSIGNMENT_ANCHOR_SELECTOR))?;
    let link = anchor
        .value()
        .attr("href")
        .ok_or_else(|| missing(ASSIGNMENT_ANCHOR_SELECTOR, "href"))?;
    let name = anchor
        .value()
        .attr("title")
        .ok_or_else(|| missing(ASSIGNMENT_ANCHOR_SELECTOR, "title"))?;

    let time = item
        .select(&TIME)
        .next()
        .ok_or_else(|| missing_in_day(day, TIME_SELECTOR))?
        .text()
        .collect::<String>();

    Ok(AssignmentSummary {
        name: name.trim().to_string(),
        class_name: class_name.trim().to_string(),
        link: link.trim().to_string(),
        due_date: resolve_due_date(day, time.trim())?,
    })
}

fn required_attr<'a>(
    item: ElementRef<'a>,
    sel: &Selector,
    css: &str,
    attr: &str,
    day: &str,
) -> SyncResult<&'a str> {
    item.select(sel)
        .next()
        .ok_or_else(|| missing_in_day(day, css))?
        .value()
        .attr(attr)
        .ok_or_else(|| missing(css, attr))
}

fn missing(what: impl std::fmt::Display, attr: &str) -> SyncError {
    SyncError::Parse(format!("{} has no {:?} attribute", what, attr))
}

fn missing_in_day(day: &str, css: &str) -> SyncError {
    SyncError::Parse(format!("item on {} has no element matching {:?}", day, css))
}
