//! # semse
//!
//! A document pipeline and semantic search engine.
//!
//! Raw text files move through a chain of resumable, file-to-file stages
//! into a SQLite-backed store with a flat cosine-distance vector index,
//! which is then queried from the CLI or over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! text ──▶ structure ──▶ embed ──▶ keys ──▶ import ──▶ ┌──────────┐
//!          (completion)  (embedding)                   │  SQLite  │
//!                                                      │ entries  │
//!                                         export ◀──── │ +indexes │
//!                                                      └────┬─────┘
//!                                                 ┌─────────┴─────────┐
//!                                                 ▼                   ▼
//!                                           semse search       POST /api/query
//! ```
//!
//! The data model, validator, index manager and retriever live in
//! `semse-core`; this crate wires them to the filesystem, SQLite and the
//! OpenAI-compatible services.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection and store wiring |
//! | [`migrate`] | Schema migrations and `init` |
//! | [`sqlite_store`] | SQLite implementation of the store contract |
//! | [`openai`] | Shared HTTP client with retries |
//! | [`embedding`] | Embedding providers |
//! | [`completion`] | Completion providers |
//! | [`walker`] | Directory traversal |
//! | [`stage`] | Stage trait, outcomes, tallies |
//! | [`progress`] | Per-file outcome reporting |
//! | [`structure`] | Text → record stage |
//! | [`embed_cmd`] | Embedding stage |
//! | [`keying`] | Keying stage |
//! | [`import`] | Import stage |
//! | [`export`] | Export command |
//! | [`search`] | Search command |
//! | [`server`] | HTTP query server |

pub mod completion;
pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod export;
pub mod import;
pub mod keying;
pub mod migrate;
pub mod openai;
pub mod progress;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stage;
pub mod structure;
pub mod walker;
