//! # syncd
//!
//! A differential-synchronization server: clients hold a local copy of a
//! shared text document and periodically exchange compact edit packets to
//! converge on a common state.
//!
//! ## Architecture
//!
//! - `config`: layered configuration (defaults, file, environment)
//! - `error`: the crate-level error taxonomy
//! - `document`: the shared authoritative text store
//! - `view`: one client's session on one document
//! - `protocol`: the wire request parser
//! - `textdiff`: a facade over the `dmp` diff/match/patch primitive
//! - `engine`: the sync state machine tying the above together
//! - `janitor`: the idle-session/document sweeper
//! - `http`: the `axum` transport shell

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod http;
pub mod janitor;
pub mod protocol;
pub mod textdiff;
pub mod view;
