//! The shared, authoritative text document and its process-wide registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// The mutable, lock-guarded content of a Document.
pub struct DocumentBody {
    /// Authoritative text. `None` means "never set" or "nullified", which
    /// is distinct from an empty string.
    pub text: Option<String>,
    /// Updated on every mutation of `text`.
    pub last_modified: DateTime<Utc>,
}

/// A document shared by every View attached to its name.
pub struct Document {
    /// Stable identifier, e.g. "proposal".
    pub name: String,
    /// Count of Views currently attached. Only ever touched under the
    /// document registry's mutex.
    views: Mutex<usize>,
    /// Read-modify-write of `text` is always performed under this lock,
    /// held across an entire patch cycle.
    body: Mutex<DocumentBody>,
}

impl Document {
    fn new(name: String) -> Self {
        Self {
            name,
            views: Mutex::new(0),
            body: Mutex::new(DocumentBody {
                text: None,
                last_modified: Utc::now(),
            }),
        }
    }

    /// Acquire the document lock for a read-modify-write cycle.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, DocumentBody> {
        self.body.lock()
    }

    /// Current view count (for tests/diagnostics; registry is the source
    /// of truth for mutation).
    pub fn view_count(&self) -> usize {
        *self.views.lock()
    }

    fn increment_views(&self) {
        *self.views.lock() += 1;
    }

    fn decrement_views(&self) {
        let mut v = self.views.lock();
        *v = v.saturating_sub(1);
    }
}

impl DocumentBody {
    /// Replace `text`, stamping `last_modified`. No-op if the content is
    /// unchanged (mirrors the original `setText` short-circuit).
    pub fn set_text(&mut self, new_text: Option<String>) {
        if self.text != new_text {
            self.text = new_text;
            self.last_modified = Utc::now();
        }
    }
}

/// Process-wide map from document name to Document, guarded by one mutex.
#[derive(Default)]
pub struct DocumentRegistry {
    documents: Mutex<HashMap<String, Arc<Document>>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `name`, creating it with no text if it doesn't exist, and
    /// increment its view count. Mirrors `fetch_textobj`.
    pub fn attach(&self, name: &str) -> Arc<Document> {
        let mut documents = self.documents.lock();
        let doc = documents
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(document = name, "creating document");
                Arc::new(Document::new(name.to_string()))
            })
            .clone();
        doc.increment_views();
        doc
    }

    /// Decrement a document's view count. Called when a View detaches.
    pub fn release(&self, doc: &Arc<Document>) {
        doc.decrement_views();
    }

    /// Janitor sweep: remove documents with zero views whose text has been
    /// idle longer than `timeout`.
    pub fn sweep_idle(&self, timeout: chrono::Duration) {
        let cutoff = Utc::now() - timeout;
        let mut documents = self.documents.lock();
        documents.retain(|name, doc| {
            if doc.view_count() == 0 {
                let last_modified = doc.body.lock().last_modified;
                if last_modified < cutoff {
                    tracing::info!(document = name.as_str(), "expired idle document");
                    return false;
                }
            }
            true
        });
    }

    /// Number of tracked documents (tests/diagnostics).
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_creates_and_increments() {
        let registry = DocumentRegistry::new();
        let doc = registry.attach("memo");
        assert_eq!(doc.view_count(), 1);
        let doc2 = registry.attach("memo");
        assert_eq!(doc2.view_count(), 2);
        assert!(Arc::ptr_eq(&doc, &doc2));
    }

    #[test]
    fn release_decrements_and_sweep_removes() {
        let registry = DocumentRegistry::new();
        let doc = registry.attach("memo");
        registry.release(&doc);
        assert_eq!(doc.view_count(), 0);
        registry.sweep_idle(chrono::Duration::seconds(-1));
        assert!(registry.is_empty());
    }

    #[test]
    fn sweep_keeps_referenced_documents() {
        let registry = DocumentRegistry::new();
        let _doc = registry.attach("memo");
        registry.sweep_idle(chrono::Duration::seconds(-1));
        assert_eq!(registry.len(), 1);
    }
}
