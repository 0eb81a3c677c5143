//! Sync pipeline orchestration.
//!
//! One pass, end to end:
//!
//! ```text
//! week fragment ─▶ summaries ─▶ detail pages ─▶ reconcile ─▶ create/update
//!   (session)       (parse)      (concurrent)    (vs store)    (concurrent)
//! ```
//!
//! Scraping and enrichment are all-or-nothing: any failure stops the run
//! before the store is touched. The write phase runs every operation and
//! reports partial success.

use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::config::Config;
use crate::detail::enrich_all;
use crate::error::SyncResult;
use crate::notion::NotionStore;
use crate::reconcile::{reconcile, ReconcilePlan};
use crate::session::{fetch_week_fragment, HttpSession, PortalSession};
use crate::store::{class_tags_from_schema, existing_refs, ExternalStore};
use crate::tags::TagRegistry;
use crate::upsert::{execute_plan, UpsertContext, UpsertSummary};
use crate::week::parse_week_fragment;

/// Options for one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Week to scrape; the portal's current week when `None`.
    pub start_date: Option<NaiveDate>,
    /// Plan the writes without performing them.
    pub dry_run: bool,
}

/// Outcome of a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub scraped: usize,
    pub plan: ReconcilePlan,
    /// `None` on a dry run.
    pub written: Option<UpsertSummary>,
}

/// Run the pipeline against the given session and store.
pub async fn run_pipeline(
    session: &dyn PortalSession,
    store: &dyn ExternalStore,
    config: &Config,
    options: &SyncOptions,
) -> SyncResult<SyncReport> {
    let fragment = fetch_week_fragment(session, options.start_date).await?;
    let summaries = parse_week_fragment(&fragment)?;
    info!(count = summaries.len(), "assignments found in week");

    let records = enrich_all(session, summaries).await?;

    let collection_id = config.store.database_id.as_str();
    let stored = store.query_collection(collection_id).await?;
    let existing = existing_refs(&stored);
    let plan = reconcile(&records, &existing);
    info!(
        create = plan.to_create.len(),
        update = plan.to_update.len(),
        "sync plan"
    );

    let schema = store.collection_schema(collection_id).await?;
    let registry = TagRegistry::new(class_tags_from_schema(&schema)?);

    let mut report = SyncReport {
        scraped: records.len(),
        plan,
        written: None,
    };
    if options.dry_run {
        return Ok(report);
    }

    let ctx = UpsertContext {
        store,
        collection_id,
        base_url: &config.portal.base_url,
        registry: &registry,
    };
    let written = execute_plan(&ctx, report.plan.clone()).await?;
    info!(tags = registry.len(), "class tags after sync");
    report.written = Some(written);
    Ok(report)
}

/// `lsync sync`: run against the live portal and Notion.
pub async fn run_sync(config: &Config, options: &SyncOptions) -> Result<()> {
    let session = HttpSession::new(&config.portal)?;
    let store = NotionStore::new(&config.store)?;

    let report = run_pipeline(&session, &store, config, options).await?;

    match report.written {
        Some(written) => {
            println!("sync");
            println!("  scraped: {}", report.scraped);
            println!("  created: {}", written.created);
            println!("  updated: {}", written.updated);
        }
        None => {
            println!("sync (dry-run)");
            println!("  scraped: {}", report.scraped);
            for op in &report.plan.to_create {
                let r = op.record();
                println!("  create  {}  {}  {}", r.summary.due_date, r.name(), r.link());
            }
            for op in &report.plan.to_update {
                let r = op.record();
                println!("  update  {}  {}  {}", r.summary.due_date, r.name(), r.link());
            }
        }
    }
    println!("ok");
    Ok(())
}
