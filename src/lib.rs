// src/lib.rs
//! # reddit-watch
//!
//! Polls Reddit search for a keyword, optionally tightens the match, publishes the newest posts,
//! waits while reporting progress, and repeats until stopped.
//!
//! ```text
//! ┌──────────────┐   ┌──────────┐   ┌──────────────┐
//! │ SourceAdapter│──▶│  filter  │──▶│   Renderer   │
//! │  feed / api  │   │ + cap    │   │ board/log/.. │
//! └──────▲───────┘   └──────────┘   └──────────────┘
//!        │            scheduler::Session (one task)
//!        └──────────── wait_phase (100 steps) ◀───┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod render;
pub mod scheduler;
pub mod source;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{ConfigError, FetchError};
pub use crate::render::{CycleOutcome, Renderer, RendererMux};
pub use crate::scheduler::{SchedulerState, Session};
pub use crate::source::{NormalizedResult, SearchRequest, SourceAdapter};
