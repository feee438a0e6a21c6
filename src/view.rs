//! A client's session on one document, and its process-wide registry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::document::{Document, DocumentRegistry};

/// One server-originated edit sent to the client but not yet acknowledged.
#[derive(Debug, Clone)]
pub struct PendingEdit {
    pub server_version: u64,
    pub fragment: String,
}

/// The mutable state of a View. Guarded by `View::state` so that requests
/// racing on the same (user, filename) pair can't corrupt it; a
/// well-behaved client never triggers that race since it issues one
/// request at a time.
pub struct ViewState {
    pub shadow: String,
    pub shadow_client_version: u64,
    pub shadow_server_version: u64,
    pub backup_shadow: String,
    pub backup_shadow_server_version: u64,
    pub edit_stack: Vec<PendingEdit>,
    pub delta_ok: bool,
    pub last_activity: DateTime<Utc>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            shadow: String::new(),
            shadow_client_version: 0,
            shadow_server_version: 0,
            backup_shadow: String::new(),
            backup_shadow_server_version: 0,
            edit_stack: Vec::new(),
            delta_ok: true,
            last_activity: Utc::now(),
        }
    }
}

/// One client's session on one document.
pub struct View {
    pub user: String,
    pub filename: String,
    pub doc: Arc<Document>,
    state: Mutex<ViewState>,
}

impl View {
    fn new(user: String, filename: String, doc: Arc<Document>) -> Self {
        Self {
            user,
            filename,
            doc,
            state: Mutex::new(ViewState::default()),
        }
    }

    /// Acquire the View's mutable state for the duration of processing one
    /// action group. Never held across I/O.
    pub fn state(&self) -> parking_lot::MutexGuard<'_, ViewState> {
        self.state.lock()
    }

    pub fn touch(&self) {
        self.state.lock().last_activity = Utc::now();
    }

    fn last_activity(&self) -> DateTime<Utc> {
        self.state.lock().last_activity
    }

    /// Force this View to look maximally idle, for the nullify path.
    fn expire_immediately(&self) {
        self.state.lock().last_activity = DateTime::<Utc>::MIN_UTC;
    }
}

/// Outcome of trying to attach a View.
pub enum AttachResult {
    Attached(Arc<View>),
    /// Too many Views already connected; the caller should pretend the
    /// request packet was lost (respond with an empty body).
    Overflow,
}

/// Process-wide map from (user, filename) to View, guarded by one mutex.
#[derive(Default)]
pub struct ViewRegistry {
    views: Mutex<HashMap<(String, String), Arc<View>>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up (user, filename); refresh and return on hit. On miss,
    /// enforce `max_views` (0 = unbounded) using the historical
    /// strict-greater comparison (effective cap is `max_views + 1`,
    /// preserved for wire compatibility — see DESIGN.md), then create a
    /// View, attaching its Document via `doc_registry` while still holding
    /// the view-registry lock (document-registry lock nests inside it,
    /// never the reverse).
    pub fn attach(
        &self,
        doc_registry: &DocumentRegistry,
        user: &str,
        filename: &str,
        max_views: usize,
    ) -> AttachResult {
        let mut views = self.views.lock();
        let key = (user.to_string(), filename.to_string());

        if let Some(existing) = views.get(&key) {
            existing.touch();
            tracing::debug!(user, filename, "accepted view");
            return AttachResult::Attached(existing.clone());
        }

        if max_views != 0 && views.len() > max_views {
            tracing::warn!("overflow: can't create new view");
            return AttachResult::Overflow;
        }

        let doc = doc_registry.attach(filename);
        let view = Arc::new(View::new(user.to_string(), filename.to_string(), doc));
        tracing::debug!(user, filename, "creating view");
        views.insert(key, view.clone());
        AttachResult::Attached(view)
    }

    /// Remove a View from the registry and release its Document reference.
    pub fn detach(&self, doc_registry: &DocumentRegistry, view: &Arc<View>) {
        let mut views = self.views.lock();
        let key = (view.user.clone(), view.filename.clone());
        if views.remove(&key).is_some() {
            doc_registry.release(&view.doc);
        }
    }

    /// Nullify path: force immediate expiry, then detach.
    pub fn nullify(&self, doc_registry: &DocumentRegistry, view: &Arc<View>) {
        view.expire_immediately();
        self.detach(doc_registry, view);
    }

    /// Janitor sweep: detach every View idle longer than `timeout`.
    pub fn sweep_idle(&self, doc_registry: &DocumentRegistry, timeout: chrono::Duration) {
        let cutoff = Utc::now() - timeout;
        let expired: Vec<Arc<View>> = {
            let views = self.views.lock();
            views
                .values()
                .filter(|v| v.last_activity() < cutoff)
                .cloned()
                .collect()
        };
        for view in expired {
            tracing::info!(user = view.user.as_str(), filename = view.filename.as_str(), "idle out");
            self.detach(doc_registry, &view);
        }
    }

    pub fn len(&self) -> usize {
        self.views.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_creates_and_reuses() {
        let docs = DocumentRegistry::new();
        let views = ViewRegistry::new();
        let v1 = match views.attach(&docs, "alice", "memo", 0) {
            AttachResult::Attached(v) => v,
            AttachResult::Overflow => panic!("unexpected overflow"),
        };
        let v2 = match views.attach(&docs, "alice", "memo", 0) {
            AttachResult::Attached(v) => v,
            AttachResult::Overflow => panic!("unexpected overflow"),
        };
        assert!(Arc::ptr_eq(&v1, &v2));
        assert_eq!(v1.doc.view_count(), 1);
    }

    #[test]
    fn overflow_uses_strict_greater() {
        let docs = DocumentRegistry::new();
        let views = ViewRegistry::new();
        // max_views=1 allows a second view too (effective cap is max+1).
        matches!(views.attach(&docs, "a", "f1", 1), AttachResult::Attached(_));
        matches!(views.attach(&docs, "b", "f2", 1), AttachResult::Attached(_));
        assert!(matches!(
            views.attach(&docs, "c", "f3", 1),
            AttachResult::Overflow
        ));
    }

    #[test]
    fn detach_releases_document() {
        let docs = DocumentRegistry::new();
        let views = ViewRegistry::new();
        let v = match views.attach(&docs, "alice", "memo", 0) {
            AttachResult::Attached(v) => v,
            AttachResult::Overflow => panic!("unexpected overflow"),
        };
        views.detach(&docs, &v);
        assert_eq!(v.doc.view_count(), 0);
        assert!(views.is_empty());
    }
}
