//! External store abstraction.
//!
//! The pipeline only needs six operations from the notes/database service,
//! captured by [`ExternalStore`]. Record properties are modelled as the
//! closed [`PropertyValue`] enum so every property the builder emits is
//! checked at compile time; adapters translate it to their wire format.
//!
//! # Collection layout
//!
//! | Property | Kind | Content |
//! |----------|------|---------|
//! | `Name` | title | assignment name, linked to the detail page |
//! | `Link` | rich text | full detail-page URL, linked |
//! | `Due` | date | due timestamp, no timezone |
//! | `Class` | multi-select | one tag named after the class |
//! | `Points` | number | total points, or empty |
//! | `Sections` | rich text | sections, or empty |

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::{SyncError, SyncResult};
use crate::models::{ClassTag, ExistingRecordRef, FullAssignmentRecord, TagColor};
use crate::reconcile::normalize_link;
use crate::tags::TagRegistry;
use crate::text::flatten_html;

pub const NAME_PROPERTY: &str = "Name";
pub const LINK_PROPERTY: &str = "Link";
pub const DUE_PROPERTY: &str = "Due";
pub const CLASS_PROPERTY: &str = "Class";
pub const POINTS_PROPERTY: &str = "Points";
pub const SECTIONS_PROPERTY: &str = "Sections";

/// A run of text, optionally linked.
#[derive(Debug, Clone, PartialEq)]
pub struct RichText {
    pub content: String,
    pub link: Option<String>,
}

impl RichText {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            link: None,
        }
    }

    pub fn linked(content: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            link: Some(link.into()),
        }
    }
}

/// A date (or range) with no timezone attached.
#[derive(Debug, Clone, PartialEq)]
pub struct DateValue {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
}

/// One option of a multi-select property.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub name: String,
    pub color: TagColor,
}

/// A typed record property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(Vec<RichText>),
    RichText(Vec<RichText>),
    Date(DateValue),
    MultiSelect(Vec<SelectOption>),
    Number(Option<f64>),
}

/// Property name → value, in a stable order.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A content block in a record's body.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Paragraph { text: String },
}

/// A record as returned by the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredRecord {
    pub id: String,
    /// URL held by the `Link` property, if any.
    pub link: Option<String>,
    /// Tags on the `Class` property, with ids assigned by the store.
    pub class_tags: Vec<ClassTag>,
}

/// Kind of a collection field, with select options where applicable.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    MultiSelect { options: Vec<ClassTag> },
    Other(String),
}

impl FieldKind {
    pub fn name(&self) -> &str {
        match self {
            FieldKind::MultiSelect { .. } => "multi_select",
            FieldKind::Other(kind) => kind,
        }
    }
}

/// Field definitions of a collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionSchema {
    pub fields: BTreeMap<String, FieldKind>,
}

/// Operations the pipeline needs from the notes/database service.
#[async_trait]
pub trait ExternalStore: Send + Sync {
    /// All records in the collection.
    async fn query_collection(&self, collection_id: &str) -> SyncResult<Vec<StoredRecord>>;

    /// The collection's field definitions.
    async fn collection_schema(&self, collection_id: &str) -> SyncResult<CollectionSchema>;

    /// Create a record with properties and body content.
    async fn create_record(
        &self,
        collection_id: &str,
        properties: &Properties,
        content: &[ContentBlock],
    ) -> SyncResult<StoredRecord>;

    /// Partially update a record's properties.
    async fn update_record(
        &self,
        record_id: &str,
        properties: &Properties,
    ) -> SyncResult<StoredRecord>;

    /// Id of the first block in a record's body, if it has one.
    async fn first_block_id(&self, record_id: &str) -> SyncResult<Option<String>>;

    /// Overwrite a content block.
    async fn update_block(&self, block_id: &str, block: &ContentBlock) -> SyncResult<()>;
}

/// Check the `Class` field is a multi-select and return its options.
pub fn class_tags_from_schema(schema: &CollectionSchema) -> SyncResult<Vec<ClassTag>> {
    match schema.fields.get(CLASS_PROPERTY) {
        Some(FieldKind::MultiSelect { options }) => Ok(options.clone()),
        Some(other) => Err(SyncError::Schema(format!(
            "{} property type is {}, expected multi_select",
            CLASS_PROPERTY,
            other.name()
        ))),
        None => Err(SyncError::Schema(format!(
            "collection has no {} property",
            CLASS_PROPERTY
        ))),
    }
}

/// Project stored records onto the refs used for matching. Records with no
/// usable link are dropped since nothing can match them.
pub fn existing_refs(records: &[StoredRecord]) -> Vec<ExistingRecordRef> {
    records
        .iter()
        .filter_map(|r| {
            let normalized = r.link.as_deref().and_then(normalize_link);
            if normalized.is_none() {
                tracing::warn!(record = %r.id, "existing record has no link; skipping");
            }
            normalized.map(|normalized_link| ExistingRecordRef {
                external_id: r.id.clone(),
                normalized_link,
            })
        })
        .collect()
}

/// Build the property set for an assignment.
///
/// The class tag takes its color from the registry as it stands now, or
/// [`TagColor::Default`] for a class not seen yet.
pub fn build_properties(
    record: &FullAssignmentRecord,
    base_url: &str,
    registry: &TagRegistry,
) -> Properties {
    let full_link = format!("{}{}", base_url.trim_end_matches('/'), record.link());

    let mut props = Properties::new();
    props.insert(
        NAME_PROPERTY.to_string(),
        PropertyValue::Title(vec![RichText::linked(record.name(), full_link.clone())]),
    );
    props.insert(
        LINK_PROPERTY.to_string(),
        PropertyValue::RichText(vec![RichText::linked(full_link.clone(), full_link)]),
    );
    props.insert(
        DUE_PROPERTY.to_string(),
        PropertyValue::Date(DateValue {
            start: record.summary.due_date,
            end: None,
        }),
    );
    props.insert(
        CLASS_PROPERTY.to_string(),
        PropertyValue::MultiSelect(vec![SelectOption {
            name: record.class_name().to_string(),
            color: registry.color_for(record.class_name()),
        }]),
    );
    props.insert(
        POINTS_PROPERTY.to_string(),
        PropertyValue::Number(record.total_points),
    );
    props.insert(
        SECTIONS_PROPERTY.to_string(),
        PropertyValue::RichText(vec![RichText::plain(
            record.sections.clone().unwrap_or_default(),
        )]),
    );
    props
}

/// The single body block holding the flattened description.
pub fn description_block(record: &FullAssignmentRecord) -> ContentBlock {
    ContentBlock::Paragraph {
        text: flatten_html(&record.description),
    }
}
