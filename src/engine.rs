//! The differential-sync state machine: walks a parsed action list,
//! mutates the View/Document pair it names, and emits response fragments.

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::ServerConfig;
use crate::document::DocumentRegistry;
use crate::protocol::{Action, Mode};
use crate::textdiff;
use crate::view::{AttachResult, PendingEdit, View, ViewRegistry};

/// Characters MobWrite's wire format has historically left unescaped when
/// percent-encoding a raw-text response, matching Python's
/// `urllib.quote(text, "!~*'();/?:@&=+$,# ")`.
const MOBWRITE_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b';')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b',')
    .remove(b'#')
    .remove(b' ');

fn percent_encode(text: &str) -> String {
    utf8_percent_encode(text, MOBWRITE_SAFE).to_string()
}

fn percent_decode(payload: &str) -> Result<String, std::str::Utf8Error> {
    percent_encoding::percent_decode_str(payload)
        .decode_utf8()
        .map(|cow| cow.into_owned())
}

/// The server instance: the two registries and the configuration that
/// governs view capacity. Owned by the HTTP layer and the janitor.
pub struct SyncServer {
    pub documents: DocumentRegistry,
    pub views: ViewRegistry,
    pub config: ServerConfig,
}

impl SyncServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            documents: DocumentRegistry::new(),
            views: ViewRegistry::new(),
            config,
        }
    }

    /// Parse and run a request body, returning the response body
    /// (including its terminating newline). A request that overflows the
    /// view cap gets an empty string back instead — no trailing newline
    /// either — simulating a lost packet so the client retries.
    pub fn handle_request(&self, body: &str) -> String {
        let actions = crate::protocol::parse_request(body);
        match self.process_actions(&actions) {
            Some(mut response) => {
                response.push('\n');
                response
            }
            None => String::new(),
        }
    }

    /// Walk the action list left to right, grouping consecutive actions by
    /// (user, filename) and emitting one response fragment per group.
    /// Returns `None` on view-cap overflow, distinct from an empty-but-real
    /// response.
    fn process_actions(&self, actions: &[Action]) -> Option<String> {
        let mut output = String::new();
        let mut current_view: Option<Arc<View>> = None;
        let mut last_user: Option<String> = None;
        let mut last_filename: Option<String> = None;

        for (index, action) in actions.iter().enumerate() {
            if current_view.is_none() {
                match self.views.attach(
                    &self.documents,
                    &action.user,
                    &action.filename,
                    self.config.max_views,
                ) {
                    AttachResult::Attached(view) => {
                        view.state().delta_ok = true;
                        current_view = Some(view);
                    }
                    AttachResult::Overflow => {
                        // Pretend the response packet was lost.
                        return None;
                    }
                }
            }
            let view = current_view.clone().expect("just attached above");

            if action.mode == Mode::Null {
                {
                    let mut body = view.doc.lock();
                    body.set_text(None);
                }
                tracing::debug!(user = action.user.as_str(), filename = action.filename.as_str(), "nullifying");
                self.views.nullify(&self.documents, &view);
                current_view = None;
                continue;
            }

            match action.mode {
                Mode::Raw => self.apply_raw(&view, action),
                Mode::Delta => self.apply_delta(&view, action),
                Mode::Null => unreachable!("handled above"),
            }

            let next_differs = actions
                .get(index + 1)
                .map(|next| next.user != action.user || next.filename != action.filename)
                .unwrap_or(true);

            if next_differs {
                let print_username = if action.echo_user && last_user.as_deref() != Some(action.user.as_str()) {
                    Some(action.user.clone())
                } else {
                    None
                };
                let print_filename = if last_filename.as_deref() != Some(action.filename.as_str())
                    || last_user.as_deref() != Some(action.user.as_str())
                {
                    Some(action.filename.clone())
                } else {
                    None
                };

                output.push_str(&self.generate_fragment(&view, print_username, print_filename, action.force));

                last_user = Some(action.user.clone());
                last_filename = Some(action.filename.clone());
                current_view = None;
            }
        }

        Some(output)
    }

    fn apply_raw(&self, view: &Arc<View>, action: &Action) {
        let Ok(data) = percent_decode(&action.data) else {
            tracing::warn!(user = action.user.as_str(), "raw payload was not valid UTF-8; dropping action");
            return;
        };
        tracing::info!(bytes = data.len(), "got raw text");

        let mut state = view.state();
        state.delta_ok = true;
        state.shadow = data.clone();
        state.shadow_client_version = action.client_version.expect("raw action carries client_version");
        state.shadow_server_version = action.server_version.expect("raw action carries server_version");
        state.backup_shadow = state.shadow.clone();
        state.backup_shadow_server_version = state.shadow_server_version;
        state.edit_stack.clear();

        let needs_overwrite = {
            let body = view.doc.lock();
            action.force || body.text.is_none()
        };
        if needs_overwrite {
            let mut body = view.doc.lock();
            if body.text.as_deref() != Some(data.as_str()) {
                body.set_text(Some(data));
                tracing::debug!("overwrote content");
            }
        }
    }

    fn apply_delta(&self, view: &Arc<View>, action: &Action) {
        let action_server_version = action.server_version.expect("delta action carries server_version");
        let action_client_version = action.client_version.expect("delta action carries client_version");

        let mut state = view.state();

        if action_server_version != state.shadow_server_version
            && action_server_version == state.backup_shadow_server_version
        {
            tracing::warn!(
                from = state.shadow_server_version,
                to = state.backup_shadow_server_version,
                "rollback from shadow to backup shadow"
            );
            state.shadow = state.backup_shadow.clone();
            state.shadow_server_version = state.backup_shadow_server_version;
            state.edit_stack.clear();
        }

        state.edit_stack.retain(|e: &PendingEdit| e.server_version > action_server_version);

        if action_server_version != state.shadow_server_version {
            state.delta_ok = false;
            tracing::warn!(
                got = action_server_version,
                expected = state.shadow_server_version,
                "shadow version mismatch"
            );
        } else if action_client_version > state.shadow_client_version {
            state.delta_ok = false;
            tracing::warn!(
                got = action_client_version,
                expected = state.shadow_client_version,
                "future delta"
            );
        } else if action_client_version < state.shadow_client_version {
            tracing::warn!(
                got = action_client_version,
                expected = state.shadow_client_version,
                "repeated delta"
            );
        } else {
            match textdiff::from_delta(&state.shadow, &action.data) {
                Err(_) => {
                    state.delta_ok = false;
                    tracing::warn!(shadow_len = state.shadow.len(), "delta failure");
                }
                Ok(diffs) => {
                    state.shadow_client_version += 1;
                    let mut body = view.doc.lock();
                    let new_shadow = textdiff::patch(&state.shadow, &diffs, &state.shadow);
                    let current_text = body.text.clone().unwrap_or_default();
                    let new_doc_text = textdiff::patch(&state.shadow, &diffs, &current_text);
                    state.shadow = new_shadow.clone();
                    state.backup_shadow = new_shadow;
                    state.backup_shadow_server_version = state.shadow_server_version;
                    body.set_text(Some(new_doc_text));
                }
            }
        }
    }

    fn generate_fragment(
        &self,
        view: &Arc<View>,
        print_username: Option<String>,
        print_filename: Option<String>,
        force: bool,
    ) -> String {
        let mut out = String::new();
        let mut state = view.state();

        if let Some(user) = print_username {
            out.push_str(&format!("u:{user}\n"));
        }
        if let Some(filename) = print_filename {
            out.push_str(&format!("F:{}:{filename}\n", state.shadow_client_version));
        }

        let doc_text = view.doc.lock().text.clone();

        let master_text: String;
        if state.delta_ok {
            master_text = doc_text.unwrap_or_default();
            let mut diffs = textdiff::diff(&state.shadow, &master_text);
            textdiff::cleanup_efficiency(&mut diffs);
            let delta = textdiff::to_delta(&diffs);
            let tag = if force { "D" } else { "d" };
            let fragment = format!("{tag}:{}:{delta}\n", state.shadow_server_version);
            tracing::info!(delta = delta.as_str(), "sent delta");
            state.edit_stack.push(PendingEdit {
                server_version: state.shadow_server_version,
                fragment,
            });
            state.shadow_server_version += 1;
        } else {
            state.shadow_client_version += 1;
            match doc_text {
                None => {
                    master_text = String::new();
                    let fragment = format!("r:{}:\n", state.shadow_server_version);
                    tracing::info!("sent empty raw text");
                    state.edit_stack.push(PendingEdit {
                        server_version: state.shadow_server_version,
                        fragment,
                    });
                }
                Some(text) => {
                    let encoded = percent_encode(&text);
                    let fragment = format!("R:{}:{encoded}\n", state.shadow_server_version);
                    tracing::info!(bytes = encoded.len(), "sent raw text");
                    state.edit_stack.push(PendingEdit {
                        server_version: state.shadow_server_version,
                        fragment,
                    });
                    master_text = text;
                }
            }
        }
        state.shadow = master_text;

        for edit in &state.edit_stack {
            out.push_str(&edit.fragment);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn server() -> SyncServer {
        SyncServer::new(ServerConfig::default())
    }

    #[test]
    fn lifecycle_scenario_raw_then_delta() {
        let server = server();
        // Raw upload establishes "Hello" at clientVersion 1 (the client was
        // already mid-stream when this View was created).
        let resp1 = server.handle_request("u:alice\nf:0:memo\nR:1:Hello\n\n");
        assert!(!resp1.is_empty());

        // Delta appends "!" at clientVersion 1 -> 2, serverVersion 0; the
        // engine rolls shadowServerVersion back from 1 to its backup (0)
        // before accepting it, since the client never saw the intervening
        // server-originated round.
        let resp2 = server.handle_request("u:alice\nf:0:memo\nd:1:=5\t+!\n\n");
        assert!(!resp2.is_empty());

        let doc = server.documents.attach("memo");
        assert_eq!(doc.lock().text.as_deref(), Some("Hello!"));
        server.documents.release(&doc);
    }

    #[test]
    fn idempotent_ack_leaves_state_unchanged() {
        let server = server();
        server.handle_request("u:alice\nf:0:memo\nR:1:Hello\n\n");

        let view = match server
            .views
            .attach(&server.documents, "alice", "memo", 0)
        {
            AttachResult::Attached(v) => v,
            AttachResult::Overflow => panic!("unexpected overflow"),
        };
        let before_version = view.state().shadow_client_version;
        let before_shadow = view.state().shadow.clone();

        // client_version 0 is already < shadow_client_version (1) after the raw upload.
        server.handle_request("u:alice\nf:1:memo\nd:0:=5\n\n");

        assert_eq!(view.state().shadow_client_version, before_version);
        assert_eq!(view.state().shadow, before_shadow);
    }

    #[test]
    fn overflow_yields_empty_body() {
        let server = SyncServer::new(ServerConfig {
            max_views: 1,
            ..ServerConfig::default()
        });
        // max_views=1 allows two distinct views (strict-greater quirk).
        assert!(!server.handle_request("u:a\nf:0:doc1\nR:0:x\n\n").is_empty());
        assert!(!server.handle_request("u:b\nf:0:doc2\nR:0:x\n\n").is_empty());
        assert_eq!(server.handle_request("u:c\nf:0:doc3\nR:0:x\n\n"), "");
    }

    #[test]
    fn null_action_clears_text_and_detaches_view() {
        let server = server();
        server.handle_request("u:alice\nf:0:memo\nR:0:Hello\n\n");
        server.handle_request("u:alice\nN:memo\n\n");

        let doc = server.documents.attach("memo");
        assert!(doc.lock().text.is_none());
        server.documents.release(&doc);
        assert!(server.views.is_empty());
    }

    #[test]
    fn bad_delta_triggers_raw_reset() {
        let server = server();
        server.handle_request("u:alice\nf:0:memo\nR:0:Hello\n\n");
        // Versions line up (serverVersion 1, clientVersion 0) but the delta's
        // claimed base length can't possibly match "Hello" -> decode fails.
        let resp = server.handle_request("u:alice\nf:1:memo\nd:0:=999\t-1=0\n\n");
        assert!(resp.contains("R:"));
    }
}
