//! Core data models used throughout the sync pipeline.
//!
//! These types represent the assignments, store references, and class tags
//! that flow from the portal scrape into the external store.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Lightweight assignment parsed from the week calendar fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentSummary {
    pub name: String,
    pub class_name: String,
    /// Relative detail-page path; the cross-run identity key.
    pub link: String,
    /// Local wall-clock due time. No timezone is attached.
    pub due_date: NaiveDateTime,
}

/// A summary enriched with fields from its detail page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullAssignmentRecord {
    #[serde(flatten)]
    pub summary: AssignmentSummary,
    /// Raw HTML of the description cell. Flattened to text only when written
    /// to the store.
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_points: Option<f64>,
}

impl FullAssignmentRecord {
    pub fn name(&self) -> &str {
        &self.summary.name
    }

    pub fn link(&self) -> &str {
        &self.summary.link
    }

    pub fn class_name(&self) -> &str {
        &self.summary.class_name
    }
}

/// Minimal projection of a record already present in the external store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRecordRef {
    pub external_id: String,
    pub normalized_link: String,
}

/// Named colors accepted for a class tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagColor {
    #[default]
    Default,
    Gray,
    Brown,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
    Red,
}

impl TagColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagColor::Default => "default",
            TagColor::Gray => "gray",
            TagColor::Brown => "brown",
            TagColor::Orange => "orange",
            TagColor::Yellow => "yellow",
            TagColor::Green => "green",
            TagColor::Blue => "blue",
            TagColor::Purple => "purple",
            TagColor::Pink => "pink",
            TagColor::Red => "red",
        }
    }
}

/// A category tag bound to a class name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTag {
    pub id: String,
    pub name: String,
    pub color: TagColor,
}

/// One write against the external store.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOperation {
    Create {
        record: FullAssignmentRecord,
    },
    Update {
        record: FullAssignmentRecord,
        external_id: String,
    },
}

impl UpsertOperation {
    pub fn record(&self) -> &FullAssignmentRecord {
        match self {
            UpsertOperation::Create { record } | UpsertOperation::Update { record, .. } => record,
        }
    }
}

/// Identity of the signed-in portal user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub first_name: String,
    pub last_name: String,
    pub login: String,
    #[serde(default)]
    pub import_id: Option<String>,
    #[serde(default)]
    pub source_system_id: Option<String>,
}
