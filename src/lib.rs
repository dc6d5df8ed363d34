//! # Semimatch
//!
//! A semantic similarity matching service. Tabular rows and PDF-extracted
//! problem statements are normalized into content-addressed units, embedded,
//! and stored in named in-memory collections; queries are ranked by cosine
//! similarity with an optional language-model rescoring pass blended on top.
//! Long-running comparisons go through a bounded queue consumed by a single
//! background worker.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌─────────────┐
//! │ CSV / PDF │──▶│ Normalize  │──▶│  Vector     │
//! │ uploads   │   │ + Embed    │   │  store      │
//! └───────────┘   └────────────┘   └─────┬───────┘
//!                                        │
//!              ┌─────────────────────────┤
//!              ▼                         ▼
//!        ┌──────────┐             ┌────────────┐
//!        │  HTTP    │── enqueue ─▶│   Worker   │
//!        │ (axum)   │◀─ status ───│  (1 task)  │
//!        └──────────┘             └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Vector collections and similarity search |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`rescore`] | Language-model rescoring |
//! | [`normalize`] | CSV rows and fragments into content units |
//! | [`extract`] | PDF text and fragment mining |
//! | [`ingest`] | Deduplicating ingest pipeline |
//! | [`compare`] | Two-stage similarity ranking |
//! | [`jobs`] | Bounded job queue and results map |
//! | [`worker`] | Background job consumer |
//! | [`monitoring`] | Health checks and metrics |
//! | [`server`] | HTTP API |

pub mod compare;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod jobs;
pub mod models;
pub mod monitoring;
pub mod normalize;
pub mod rescore;
pub mod server;
pub mod store;
pub mod worker;
