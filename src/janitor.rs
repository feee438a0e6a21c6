//! Background sweep that reaps idle Views, then idle Documents.
//!
//! Mirrors the original daemon's cleanup thread: Views are timed out first
//! (detaching releases their Document reference), then Documents whose
//! view count has reached zero are timed out separately. Runs on its own
//! interval rather than sleeping a fixed wall-clock amount between sweeps.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::SyncServer;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the janitor as a detached background task. Returns its handle so
/// callers can abort it on shutdown if they choose to.
pub fn spawn(server: Arc<SyncServer>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweep_once(&server);
        }
    })
}

fn sweep_once(server: &SyncServer) {
    let view_timeout = chrono::Duration::from_std(server.config.timeout_view)
        .unwrap_or(chrono::Duration::zero());
    let text_timeout = chrono::Duration::from_std(server.config.timeout_text)
        .unwrap_or(chrono::Duration::zero());

    server.views.sweep_idle(&server.documents, view_timeout);
    server.documents.sweep_idle(text_timeout);

    tracing::debug!(
        views = server.views.len(),
        documents = server.documents.len(),
        "janitor sweep complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn sweep_removes_idle_documents_with_no_views() {
        let server = SyncServer::new(ServerConfig {
            timeout_view: Duration::from_secs(0),
            timeout_text: Duration::from_secs(0),
            ..ServerConfig::default()
        });
        server.handle_request("u:alice\nf:0:memo\nR:0:Hello\n\n");
        assert!(!server.documents.is_empty());

        std::thread::sleep(Duration::from_millis(5));
        sweep_once(&server);

        assert!(server.views.is_empty());
        assert!(server.documents.is_empty());
    }
}
