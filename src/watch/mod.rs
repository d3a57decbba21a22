// src/watch/mod.rs

//! File watching and change debouncing.
//!
//! This module is responsible for:
//! - Compiling watch glob patterns ([`patterns`]).
//! - Wiring up a cross-platform filesystem watcher (`notify`) that reports
//!   one raw change per matching glob ([`watcher`]).
//! - Coalescing bursts of raw changes into trigger events ([`debouncer`]).
//!
//! It does **not** know which task runs for which glob; the scheduler
//! resolves that through the task graph.

pub mod debouncer;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use debouncer::{spawn_debouncer, Debouncer, RawChange};
pub use patterns::{collect_matching_files, GlobMatcher};
pub use watcher::{spawn_watcher, WatcherHandle};
