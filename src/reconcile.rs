//! Create/update reconciliation against records already in the store.
//!
//! The natural key is the assignment link reduced to path + query + fragment,
//! so `https://portal.example/x/1?a=b` and `/x/1?a=b` are the same record.

use std::collections::HashMap;

use tracing::{debug, warn};
use url::Url;

use crate::models::{ExistingRecordRef, FullAssignmentRecord, UpsertOperation};

/// Base used to resolve relative links. Only path, query, and fragment of
/// the result are ever read.
const RELATIVE_BASE: &str = "http://relative.invalid/";

/// Reduce a link to path + query + fragment.
///
/// Returns `None` when the link cannot be parsed even relative to a base.
pub fn normalize_link(link: &str) -> Option<String> {
    let base = Url::parse(RELATIVE_BASE).ok()?;
    let url = base.join(link.trim()).ok()?;

    let mut out = url.path().to_string();
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        out.push('#');
        out.push_str(fragment);
    }
    Some(out)
}

/// Fresh records split by the write they need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub to_create: Vec<UpsertOperation>,
    pub to_update: Vec<UpsertOperation>,
}

impl ReconcilePlan {
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition fresh records into creates and updates.
///
/// When several existing records share a normalized link the first one wins
/// and no conflict is reported; a warning is logged so the duplicates can be
/// cleaned up by hand.
pub fn reconcile(
    records: &[FullAssignmentRecord],
    existing: &[ExistingRecordRef],
) -> ReconcilePlan {
    let mut by_link: HashMap<&str, &str> = HashMap::with_capacity(existing.len());
    for item in existing {
        if let Some(first) = by_link.get(item.normalized_link.as_str()) {
            warn!(
                link = %item.normalized_link,
                kept = %first,
                ignored = %item.external_id,
                "duplicate link among existing records"
            );
            continue;
        }
        by_link.insert(&item.normalized_link, &item.external_id);
    }

    let mut plan = ReconcilePlan::default();
    for record in records {
        let key = normalize_link(record.link()).unwrap_or_else(|| record.link().to_string());
        match by_link.get(key.as_str()) {
            Some(id) => plan.to_update.push(UpsertOperation::Update {
                record: record.clone(),
                external_id: id.to_string(),
            }),
            None => plan.to_create.push(UpsertOperation::Create {
                record: record.clone(),
            }),
        }
    }

    debug!(
        create = plan.to_create.len(),
        update = plan.to_update.len(),
        "reconciled assignments"
    );
    plan
}
