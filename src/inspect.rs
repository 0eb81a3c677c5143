//! Read-only commands: `lsync check` and `lsync parse-week`.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::notion::NotionStore;
use crate::store::{class_tags_from_schema, ExternalStore};
use crate::week::parse_week_fragment;

/// Validate the Notion database and list its class tags.
pub async fn run_check(config: &Config) -> Result<()> {
    let store = NotionStore::new(&config.store)?;
    check_store(&store, &config.store.database_id).await
}

pub async fn check_store(store: &dyn ExternalStore, database_id: &str) -> Result<()> {
    let schema = store
        .collection_schema(database_id)
        .await
        .with_context(|| format!("Failed to read database {}", database_id))?;
    let tags = class_tags_from_schema(&schema)?;

    println!("{:<32} COLOR", "CLASS");
    for tag in &tags {
        println!("{:<32} {}", tag.name, tag.color.as_str());
    }
    println!("ok");
    Ok(())
}

/// Parse a saved week fragment and print one summary per line.
pub fn run_parse_week(path: &Path) -> Result<()> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fragment: {}", path.display()))?;
    let summaries = parse_week_fragment(&html)?;

    for s in &summaries {
        println!(
            "{}\t{}\t{}\t{}",
            s.due_date.format("%Y-%m-%dT%H:%M:%S"),
            s.class_name,
            s.name,
            s.link
        );
    }
    eprintln!("{} assignments", summaries.len());
    Ok(())
}
