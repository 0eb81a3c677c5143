//! Integration tests for the sync pipeline.
//!
//! A scripted portal session and an in-memory store stand in for the
//! browser session and Notion, so the whole scrape → reconcile → upsert
//! flow runs without a network.

use async_trait::async_trait;
use chrono::NaiveDate;
use learning_sync::config::{Config, FileConfig};
use learning_sync::error::{SyncError, SyncResult};
use learning_sync::models::{
    AssignmentSummary, ClassTag, FullAssignmentRecord, SessionUser, TagColor, UpsertOperation,
};
use learning_sync::reconcile::ReconcilePlan;
use learning_sync::session::{PortalSession, SessionRequest};
use learning_sync::store::{
    CollectionSchema, ContentBlock, ExternalStore, FieldKind, Properties, PropertyValue,
    StoredRecord, CLASS_PROPERTY, LINK_PROPERTY,
};
use learning_sync::sync::{run_pipeline, SyncOptions};
use learning_sync::tags::TagRegistry;
use learning_sync::upsert::{execute_plan, UpsertContext};
use std::collections::HashMap;
use std::sync::Mutex;

const BASE: &str = "https://learning.example.org";

// ─── Scripted session ───────────────────────────────────────────────

struct ScriptedSession {
    week: String,
    pages: HashMap<String, String>,
    requests: Mutex<Vec<SessionRequest>>,
}

impl ScriptedSession {
    fn new(week: String, pages: &[(&str, String)]) -> Self {
        Self {
            week,
            pages: pages
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PortalSession for ScriptedSession {
    async fn fetch(&self, request: SessionRequest) -> SyncResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        if request.path.ends_with("/portal/portlet_calendar_week") {
            return Ok(self.week.clone());
        }
        self.pages
            .get(&request.path)
            .cloned()
            .ok_or_else(|| SyncError::Fetch(format!("HTTP 404 for {}", request.path)))
    }

    async fn session_token(&self) -> SyncResult<String> {
        Ok("csrf".to_string())
    }

    async fn session_user(&self) -> SyncResult<SessionUser> {
        Ok(SessionUser {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            login: "alovelace".to_string(),
            import_id: None,
            source_system_id: None,
        })
    }

    async fn current_classes(&self) -> SyncResult<Vec<u64>> {
        Ok(vec![11, 22])
    }
}

// ─── In-memory store ────────────────────────────────────────────────

#[derive(Clone)]
struct Page {
    id: String,
    properties: Properties,
    blocks: Vec<(String, ContentBlock)>,
}

#[derive(Default)]
struct State {
    pages: Vec<Page>,
    options: Vec<ClassTag>,
    next_id: usize,
}

struct MemoryStore {
    state: Mutex<State>,
    class_kind: FieldKind,
}

impl MemoryStore {
    fn new(options: Vec<ClassTag>) -> Self {
        Self {
            state: Mutex::new(State {
                options: options.clone(),
                ..State::default()
            }),
            class_kind: FieldKind::MultiSelect { options },
        }
    }

    fn with_page(self, id: &str, link: &str, with_block: bool) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut properties = Properties::new();
            properties.insert(
                LINK_PROPERTY.to_string(),
                PropertyValue::RichText(vec![learning_sync::store::RichText::linked(
                    format!("{}{}", BASE, link),
                    format!("{}{}", BASE, link),
                )]),
            );
            let blocks = if with_block {
                vec![(
                    format!("{}-block", id),
                    ContentBlock::Paragraph {
                        text: "old".to_string(),
                    },
                )]
            } else {
                Vec::new()
            };
            state.pages.push(Page {
                id: id.to_string(),
                properties,
                blocks,
            });
        }
        self
    }

    fn page(&self, id: &str) -> Page {
        self.state
            .lock()
            .unwrap()
            .pages
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .unwrap()
    }

    fn page_count(&self) -> usize {
        self.state.lock().unwrap().pages.len()
    }

    /// Resolve tags for a property set, minting options for unseen names.
    /// Yields between the lookup and the insert so concurrent writers race
    /// the way a remote service would.
    async fn resolve_tags(&self, properties: &Properties) -> Vec<ClassTag> {
        let wanted = match properties.get(CLASS_PROPERTY) {
            Some(PropertyValue::MultiSelect(options)) => options.clone(),
            _ => Vec::new(),
        };
        let mut tags = Vec::new();
        for option in wanted {
            let known = self
                .state
                .lock()
                .unwrap()
                .options
                .iter()
                .find(|t| t.name == option.name)
                .cloned();
            if let Some(tag) = known {
                tags.push(tag);
                continue;
            }
            tokio::task::yield_now().await;
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let tag = ClassTag {
                id: format!("opt-{}", state.next_id),
                name: option.name.clone(),
                color: option.color,
            };
            state.options.push(tag.clone());
            tags.push(tag);
        }
        tags
    }

    fn stored(page: &Page, class_tags: Vec<ClassTag>) -> StoredRecord {
        let link = match page.properties.get(LINK_PROPERTY) {
            Some(PropertyValue::RichText(texts)) => texts.first().and_then(|t| t.link.clone()),
            _ => None,
        };
        StoredRecord {
            id: page.id.clone(),
            link,
            class_tags,
        }
    }
}

#[async_trait]
impl ExternalStore for MemoryStore {
    async fn query_collection(&self, _collection_id: &str) -> SyncResult<Vec<StoredRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .iter()
            .map(|p| MemoryStore::stored(p, Vec::new()))
            .collect())
    }

    async fn collection_schema(&self, _collection_id: &str) -> SyncResult<CollectionSchema> {
        let mut schema = CollectionSchema::default();
        schema
            .fields
            .insert(CLASS_PROPERTY.to_string(), self.class_kind.clone());
        Ok(schema)
    }

    async fn create_record(
        &self,
        _collection_id: &str,
        properties: &Properties,
        content: &[ContentBlock],
    ) -> SyncResult<StoredRecord> {
        let tags = self.resolve_tags(properties).await;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("page-{}", state.next_id);
        let page = Page {
            id: id.clone(),
            properties: properties.clone(),
            blocks: content
                .iter()
                .enumerate()
                .map(|(i, b)| (format!("{}-block-{}", id, i), b.clone()))
                .collect(),
        };
        state.pages.push(page.clone());
        Ok(MemoryStore::stored(&page, tags))
    }

    async fn update_record(
        &self,
        record_id: &str,
        properties: &Properties,
    ) -> SyncResult<StoredRecord> {
        let tags = self.resolve_tags(properties).await;
        let mut state = self.state.lock().unwrap();
        let page = state
            .pages
            .iter_mut()
            .find(|p| p.id == record_id)
            .ok_or_else(|| SyncError::Fetch(format!("HTTP 404 for page {}", record_id)))?;
        for (k, v) in properties {
            page.properties.insert(k.clone(), v.clone());
        }
        Ok(MemoryStore::stored(page, tags))
    }

    async fn first_block_id(&self, record_id: &str) -> SyncResult<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pages
            .iter()
            .find(|p| p.id == record_id)
            .and_then(|p| p.blocks.first())
            .map(|(id, _)| id.clone()))
    }

    async fn update_block(&self, block_id: &str, block: &ContentBlock) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        for page in state.pages.iter_mut() {
            for (id, existing) in page.blocks.iter_mut() {
                if id == block_id {
                    *existing = block.clone();
                    return Ok(());
                }
            }
        }
        Err(SyncError::Fetch(format!("HTTP 404 for block {}", block_id)))
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn config() -> Config {
    let env: HashMap<&str, &str> = [
        ("LEARNING_URL_BASE", BASE),
        ("GOOGLE_EMAIL", "ada@example.org"),
        ("GOOGLE_PASSWORD", "pw"),
        ("LEARNING_SESSION_COOKIE", "_session=1"),
        ("NOTION_TOKEN", "secret"),
        ("NOTION_CALENDAR_DATABASE_ID", "db"),
    ]
    .into_iter()
    .collect();
    Config::resolve(FileConfig::default(), |k| env.get(k).map(|v| v.to_string())).unwrap()
}

fn item(class: &str, link: &str, title: &str, time: &str) -> String {
    format!(
        r#"<li class="cal_item"><a class="class_filter" title="{class}">{class}</a>
           <span class="description"><a class="assignment_link" href="{link}" title="{title}">{title}</a></span>
           <span class="small">{time}</span></li>"#
    )
}

fn day(date: &str, items: &[String]) -> String {
    format!(
        r#"<div class="cal_day" id="day_{date}"><ul>{}</ul></div>"#,
        items.join("")
    )
}

fn detail(points: Option<&str>, description: &str) -> String {
    let points_row = points
        .map(|p| format!("<tr><th>Total Points:</th><td>{}</td></tr>", p))
        .unwrap_or_default();
    format!(
        r#"<html><body><table>
             <tr><th>Posted:</th><td>Jan 3</td></tr>
             {points_row}
             <tr><th>Sections:</th><td>Period 3</td></tr>
             <tr><th>Description:</th><td>{description}</td></tr>
             <tr><td>Attachments</td></tr>
           </table></body></html>"#
    )
}

fn tag(id: &str, name: &str, color: TagColor) -> ClassTag {
    ClassTag {
        id: id.to_string(),
        name: name.to_string(),
        color,
    }
}

fn new_record(name: &str, class: &str, link: &str) -> FullAssignmentRecord {
    FullAssignmentRecord {
        summary: AssignmentSummary {
            name: name.to_string(),
            class_name: class.to_string(),
            link: link.to_string(),
            due_date: NaiveDate::from_ymd_opt(2022, 1, 7)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap(),
        },
        description: "<p>desc</p>".to_string(),
        sections: None,
        total_points: None,
    }
}

fn scripted_week() -> ScriptedSession {
    let week = [
        day(
            "2022-01-07",
            &[item(
                "AP Music Theory",
                "/x/y/assignment/view/123",
                "TEST 4",
                "11:59pm",
            )],
        ),
        day(
            "2022-01-08",
            &[item("Chemistry", "/c/assignment/view/9", "Lab Report", "11pm")],
        ),
    ]
    .join("");
    ScriptedSession::new(
        week,
        &[
            (
                "/x/y/assignment/view/123",
                detail(Some("100"), "<p>Sight-singing <b>test</b></p>"),
            ),
            ("/c/assignment/view/9", detail(None, "Write it up")),
        ],
    )
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_end_to_end_create_and_update() {
    let session = scripted_week();
    let store = MemoryStore::new(vec![tag("t-music", "AP Music Theory", TagColor::Purple)])
        .with_page("existing-chem", "/c/assignment/view/9", true);

    let report = run_pipeline(&session, &store, &config(), &SyncOptions::default())
        .await
        .unwrap();

    let written = report.written.unwrap();
    assert_eq!(report.scraped, 2);
    assert_eq!(written.created, 1);
    assert_eq!(written.updated, 1);
    assert_eq!(store.page_count(), 2);

    // The week query used the session user and classes.
    let requests = session.requests.lock().unwrap();
    assert_eq!(requests[0].path, "/u/alovelace/portal/portlet_calendar_week");
    assert_eq!(requests[0].body.as_deref(), Some("id=11+22&csrf_token=csrf"));
    drop(requests);

    // New page: registry color, points, flattened description.
    let created = store
        .state
        .lock()
        .unwrap()
        .pages
        .iter()
        .find(|p| p.id != "existing-chem")
        .cloned()
        .unwrap();
    match &created.properties[CLASS_PROPERTY] {
        PropertyValue::MultiSelect(options) => {
            assert_eq!(options[0].name, "AP Music Theory");
            assert_eq!(options[0].color, TagColor::Purple);
        }
        other => panic!("unexpected class property {:?}", other),
    }
    assert_eq!(
        created.properties["Points"],
        PropertyValue::Number(Some(100.0))
    );
    assert_eq!(
        created.blocks[0].1,
        ContentBlock::Paragraph {
            text: "Sight-singing test".to_string()
        }
    );

    // Existing page: description block overwritten, no points.
    let updated = store.page("existing-chem");
    assert_eq!(
        updated.blocks[0].1,
        ContentBlock::Paragraph {
            text: "Write it up".to_string()
        }
    );
    assert_eq!(updated.properties["Points"], PropertyValue::Number(None));
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let session = scripted_week();
    let store = MemoryStore::new(vec![]);
    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };

    let report = run_pipeline(&session, &store, &config(), &options)
        .await
        .unwrap();
    assert!(report.written.is_none());
    assert_eq!(report.plan.to_create.len(), 2);
    assert_eq!(store.page_count(), 0);
}

#[tokio::test]
async fn test_enrichment_failure_aborts_before_writes() {
    let week = day(
        "2022-01-07",
        &[
            item("Bio", "/b/1", "Lab", "3pm"),
            item("Bio", "/b/missing", "Quiz", "4pm"),
        ],
    );
    let session = ScriptedSession::new(week, &[("/b/1", detail(None, "x"))]);
    let store = MemoryStore::new(vec![]);

    let err = run_pipeline(&session, &store, &config(), &SyncOptions::default())
        .await
        .unwrap_err();
    match err {
        SyncError::Assignment { name, link, .. } => {
            assert_eq!(name, "Quiz");
            assert_eq!(link, "/b/missing");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(store.page_count(), 0);
}

#[tokio::test]
async fn test_empty_week_writes_nothing() {
    let session = ScriptedSession::new(
        "<div class=\"notice\">There are no assignments in this range.</div>".to_string(),
        &[],
    );
    let store = MemoryStore::new(vec![]);
    let report = run_pipeline(&session, &store, &config(), &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(report.scraped, 0);
    assert_eq!(report.written.unwrap().created, 0);
}

#[tokio::test]
async fn test_schema_mismatch_fails() {
    let session = scripted_week();
    let mut store = MemoryStore::new(vec![]);
    store.class_kind = FieldKind::Other("select".to_string());

    let err = run_pipeline(&session, &store, &config(), &SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Schema(_)));
    assert_eq!(store.page_count(), 0);
}

#[tokio::test]
async fn test_update_without_block_is_reported_not_fatal_to_batch() {
    let store = MemoryStore::new(vec![]).with_page("bare", "/b/2", false);
    let registry = TagRegistry::default();
    let ctx = UpsertContext {
        store: &store,
        collection_id: "db",
        base_url: BASE,
        registry: &registry,
    };
    let plan = ReconcilePlan {
        to_create: vec![UpsertOperation::Create {
            record: new_record("Lab", "Bio", "/b/1"),
        }],
        to_update: vec![UpsertOperation::Update {
            record: new_record("Quiz", "Bio", "/b/2"),
            external_id: "bare".to_string(),
        }],
    };

    let err = execute_plan(&ctx, plan).await.unwrap_err();
    match err {
        SyncError::PartialBatch {
            created,
            updated,
            failures,
        } => {
            assert_eq!(created, 1);
            assert_eq!(updated, 0);
            assert_eq!(failures.len(), 1);
            let msg = failures[0].to_string();
            assert!(msg.contains("Quiz"));
            assert!(msg.contains("/b/2"));
            assert!(matches!(
                &failures[0],
                SyncError::Assignment { source, .. } if matches!(**source, SyncError::Consistency(_))
            ));
        }
        other => panic!("unexpected error {:?}", other),
    }
    // The create was acknowledged and stays.
    assert_eq!(store.page_count(), 2);
}

#[tokio::test]
async fn test_update_keeps_returned_tags_when_block_step_fails() {
    let store = MemoryStore::new(vec![tag("t-music", "Music", TagColor::Pink)])
        .with_page("bare", "/m/1", false);
    let registry = TagRegistry::default();
    let ctx = UpsertContext {
        store: &store,
        collection_id: "db",
        base_url: BASE,
        registry: &registry,
    };
    let plan = ReconcilePlan {
        to_create: vec![],
        to_update: vec![UpsertOperation::Update {
            record: new_record("Etude", "Music", "/m/1"),
            external_id: "bare".to_string(),
        }],
    };

    let err = execute_plan(&ctx, plan).await.unwrap_err();
    assert!(matches!(err, SyncError::PartialBatch { updated: 0, .. }));
    assert_eq!(registry.color_for("Music"), TagColor::Pink);
    assert_eq!(registry.snapshot(), vec![tag("t-music", "Music", TagColor::Pink)]);
}

#[tokio::test]
async fn test_concurrent_creates_for_new_class_tolerate_duplicates() {
    let store = MemoryStore::new(vec![]);
    let registry = TagRegistry::default();
    let ctx = UpsertContext {
        store: &store,
        collection_id: "db",
        base_url: BASE,
        registry: &registry,
    };
    let plan = ReconcilePlan {
        to_create: vec![
            UpsertOperation::Create {
                record: new_record("One", "Latin", "/l/1"),
            },
            UpsertOperation::Create {
                record: new_record("Two", "Latin", "/l/2"),
            },
        ],
        to_update: vec![],
    };

    let written = execute_plan(&ctx, plan).await.unwrap();
    assert_eq!(written.created, 2);

    let latin: Vec<ClassTag> = registry
        .snapshot()
        .into_iter()
        .filter(|t| t.name == "Latin")
        .collect();
    assert!(!latin.is_empty());
    assert!(latin.iter().all(|t| t.color == TagColor::Default));
}

#[tokio::test]
async fn test_completed_writes_feed_later_lookups() {
    let store = MemoryStore::new(vec![tag("t1", "Art", TagColor::Orange)]);
    let registry = TagRegistry::new(vec![]);
    let ctx = UpsertContext {
        store: &store,
        collection_id: "db",
        base_url: BASE,
        registry: &registry,
    };

    // First batch learns the store's tag for Art.
    let first = ReconcilePlan {
        to_create: vec![UpsertOperation::Create {
            record: new_record("Sketch", "Art", "/a/1"),
        }],
        to_update: vec![],
    };
    execute_plan(&ctx, first).await.unwrap();
    assert_eq!(registry.color_for("Art"), TagColor::Orange);

    // A later write picks the color up from the registry.
    let second = ReconcilePlan {
        to_create: vec![UpsertOperation::Create {
            record: new_record("Paint", "Art", "/a/2"),
        }],
        to_update: vec![],
    };
    execute_plan(&ctx, second).await.unwrap();
    let pages = store.state.lock().unwrap().pages.clone();
    match &pages[1].properties[CLASS_PROPERTY] {
        PropertyValue::MultiSelect(options) => assert_eq!(options[0].color, TagColor::Orange),
        other => panic!("unexpected class property {:?}", other),
    }
}
