//! # Learning Sync
//!
//! Scrapes a week of assignments from a school "Learning" portal and syncs
//! them into a Notion calendar database, creating or updating one page per
//! assignment keyed by its detail-page link.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Week parser  │──▶│  Enricher   │──▶│  Reconcile  │──▶│ Upsert + tag │
//! │ + due dates  │   │ (detail pg) │   │ (by link)   │   │   registry   │
//! └──────┬───────┘   └──────┬──────┘   └──────┬──────┘   └──────┬───────┘
//!        │                  │                 │                 │
//!        ▼                  ▼                 ▼                 ▼
//!   PortalSession      PortalSession     ExternalStore     ExternalStore
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lsync login-url               # where to sign in
//! lsync check                   # validate the Notion database
//! lsync sync --dry-run          # show what would be written
//! lsync sync                    # write it
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`week`] | Week calendar fragment parser |
//! | [`due_date`] | Due-date resolution |
//! | [`detail`] | Detail page fetch and enrichment |
//! | [`reconcile`] | Create/update partitioning |
//! | [`store`] | Store trait and typed property model |
//! | [`tags`] | Shared class tag registry |
//! | [`upsert`] | Concurrent create/update execution |
//! | [`session`] | Portal session trait and HTTP session |
//! | [`notion`] | Notion store adapter |
//! | [`text`] | HTML flattening |
//! | [`sync`] | Pipeline orchestration |

pub mod config;
pub mod detail;
pub mod due_date;
pub mod error;
pub mod inspect;
pub mod models;
pub mod notion;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod sync;
pub mod tags;
pub mod text;
pub mod upsert;
pub mod week;
