//! Shared registry of class tags for one upsert batch.
//!
//! Loaded from the collection schema when the batch starts, then appended to
//! as writes complete. Every write reads the registry when it starts, so it
//! sees tags recorded by writes that already finished but not by writes
//! still in flight.
//!
//! Two writes that both start before either has finished can each introduce
//! the same never-seen class. Both send it with the default color and the
//! store may mint two options for it. That duplicate is tolerated; the
//! registry keeps whichever tags the store echoes back, keyed by tag id.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::models::{ClassTag, TagColor};

/// Append-only set of class tags shared by concurrent writes.
#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: Mutex<Vec<ClassTag>>,
}

impl TagRegistry {
    pub fn new(tags: Vec<ClassTag>) -> Self {
        Self {
            tags: Mutex::new(tags),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ClassTag>> {
        self.tags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Color of the first tag with exactly this name, or the default.
    pub fn color_for(&self, class_name: &str) -> TagColor {
        self.lock()
            .iter()
            .find(|t| t.name == class_name)
            .map(|t| t.color)
            .unwrap_or_default()
    }

    /// Record a tag echoed by the store. Returns `true` if its id was new.
    pub fn record(&self, tag: ClassTag) -> bool {
        let mut tags = self.lock();
        if tags.iter().any(|t| t.id == tag.id) {
            return false;
        }
        debug!(name = %tag.name, color = tag.color.as_str(), "registered class tag");
        tags.push(tag);
        true
    }

    pub fn snapshot(&self) -> Vec<ClassTag> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
