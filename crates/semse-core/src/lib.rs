//! # semse core
//!
//! I/O-free logic shared by the `semse` pipeline and query server:
//! the canonical document record, schema validation, vector encoding,
//! the storage abstraction, the index manager, and nearest-neighbor
//! retrieval.
//!
//! This crate contains no tokio, sqlx, filesystem, or HTTP
//! dependencies. Concrete store backends and external service clients
//! live in the `semse` app crate and plug in through the [`store::Store`]
//! and [`embedding::Embedder`] traits.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Document record, keyed record, record envelope, search hit |
//! | [`validate`] | Record validation with aggregated field errors |
//! | [`embedding`] | Embedder trait, binary vector codec, cosine math |
//! | [`store`] | Key-value/vector store trait and in-memory backend |
//! | [`index`] | Index declaration, record ↔ field mapping |
//! | [`search`] | k-nearest-neighbor retrieval with pagination |
//! | [`error`] | Error taxonomy |

pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod search;
pub mod store;
pub mod validate;
