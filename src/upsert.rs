//! Create/update execution against the external store.
//!
//! All writes of a batch run concurrently. Each reads the [`TagRegistry`]
//! when it builds its properties and records the tags the store echoes back
//! as soon as the record write is acknowledged, even if a later step of the
//! same update fails. Failed writes are neither retried nor rolled back:
//! the batch always runs to the end and any failure is reported together
//! with how many writes were acknowledged.

use futures::future::join_all;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::models::{FullAssignmentRecord, UpsertOperation};
use crate::reconcile::ReconcilePlan;
use crate::store::{build_properties, description_block, ExternalStore, StoredRecord};
use crate::tags::TagRegistry;

/// Counts of acknowledged writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub created: usize,
    pub updated: usize,
}

/// Everything a write needs besides its operation.
pub struct UpsertContext<'a> {
    pub store: &'a dyn ExternalStore,
    pub collection_id: &'a str,
    /// Portal origin prefixed to relative links.
    pub base_url: &'a str,
    pub registry: &'a TagRegistry,
}

/// Run every operation of the plan.
///
/// # Errors
///
/// [`SyncError::PartialBatch`] if at least one write failed. Writes that
/// succeeded stay in the store.
pub async fn execute_plan(ctx: &UpsertContext<'_>, plan: ReconcilePlan) -> SyncResult<UpsertSummary> {
    let operations: Vec<UpsertOperation> =
        plan.to_create.into_iter().chain(plan.to_update).collect();
    info!(total = operations.len(), "writing assignments");

    let results = join_all(operations.iter().map(|op| execute_one(ctx, op))).await;

    let mut summary = UpsertSummary::default();
    let mut failures = Vec::new();
    for (op, result) in operations.iter().zip(results) {
        match (op, result) {
            (UpsertOperation::Create { .. }, Ok(())) => summary.created += 1,
            (UpsertOperation::Update { .. }, Ok(())) => summary.updated += 1,
            (_, Err(e)) => failures.push(e),
        }
    }

    if failures.is_empty() {
        Ok(summary)
    } else {
        Err(SyncError::PartialBatch {
            created: summary.created,
            updated: summary.updated,
            failures,
        })
    }
}

/// Run a single create or update.
pub async fn execute_one(ctx: &UpsertContext<'_>, op: &UpsertOperation) -> SyncResult<()> {
    let record = op.record();
    let result = match op {
        UpsertOperation::Create { record } => create(ctx, record).await,
        UpsertOperation::Update {
            record,
            external_id,
        } => update(ctx, record, external_id).await,
    };
    result.map_err(|e| e.for_assignment(record.name(), record.link()))
}

async fn create(ctx: &UpsertContext<'_>, record: &FullAssignmentRecord) -> SyncResult<()> {
    debug!(name = %record.name(), link = %record.link(), "creating assignment");
    let properties = build_properties(record, ctx.base_url, ctx.registry);
    let stored = ctx
        .store
        .create_record(ctx.collection_id, &properties, &[description_block(record)])
        .await?;
    register_tags(ctx.registry, stored);
    debug!(name = %record.name(), link = %record.link(), "created assignment");
    Ok(())
}

async fn update(
    ctx: &UpsertContext<'_>,
    record: &FullAssignmentRecord,
    record_id: &str,
) -> SyncResult<()> {
    debug!(name = %record.name(), link = %record.link(), "updating assignment");
    let properties = build_properties(record, ctx.base_url, ctx.registry);
    let stored = ctx.store.update_record(record_id, &properties).await?;
    register_tags(ctx.registry, stored);

    let block_id = ctx.store.first_block_id(record_id).await?.ok_or_else(|| {
        SyncError::Consistency(format!("record {} has no description block", record_id))
    })?;
    ctx.store
        .update_block(&block_id, &description_block(record))
        .await?;

    debug!(name = %record.name(), link = %record.link(), "updated assignment");
    Ok(())
}

fn register_tags(registry: &TagRegistry, stored: StoredRecord) {
    for tag in stored.class_tags {
        registry.record(tag);
    }
}
