//! Engagement Core - likes, bookmarks, qualified views, and live counters
//!
//! Records per-identity reactions against content items owned elsewhere,
//! keeps per-content counters authoritative, and streams counter changes to
//! live subscribers. Embeds as a library; the host process brings its own
//! HTTP/RPC surface and authentication.
//!
//! ## Architecture
//!
//! ```text
//! embedding application
//!     ↓ validation
//! Content Existence Gate (one adapter per content kind)
//!     ↓
//! Toggle Engine / View Qualification Engine
//!     ↓ one immediate transaction
//! interaction_records + counter_aggregates (SQLite, WAL)
//!     ↓ post-commit authoritative read
//! ChangeHub (broadcast firehose + per-content topics)
//! ```
//!
//! ## Guarantees
//!
//! | Concern | Mechanism |
//! |---------|-----------|
//! | Idempotent toggles | UNIQUE record key, writes checked by rows affected |
//! | One view per identity | `INSERT OR IGNORE`, metrics ratchet on conflict |
//! | Counters never negative | `MAX(0, ...)` clamp inside the upsert |
//! | Concurrent duplicates | constraint resolves them, counter moves once |
//! | Transient contention | bounded retries with backoff and a deadline |
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//! ├── engagement.db          # interaction_records, counter_aggregates, schema_version
//! └── config.toml            # EngagementConfig
//! ```

pub mod catalog;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod identity;
pub mod services;

// Re-exports
pub use catalog::{ContentGate, KindGateRegistry, SqlTableGate, StaticGate};
pub use config::EngagementConfig;
pub use content::{ContentKind, ContentRef};
pub use db::{CounterSnapshot, EngagementDb, RetryPolicy};
pub use error::{EngagementError, Result};
pub use identity::Identity;
pub use services::{
    BookmarkStatus, ChangeEvent, ChangeHub, CounterService, LikeStatus, Services, ToggleOutcome,
    ToggleService, ViewEngagement, ViewOutcome, ViewService,
};
