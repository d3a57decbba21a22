#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;

pub use buildwatch_test_utils::builders::{ConfigFileBuilder, GraphFixture, Runners};
pub use buildwatch_test_utils::fake_executor::{executed_names, FakeExecutor};
pub use buildwatch_test_utils::fakes::{
    FakeBundler, FakeMinifier, FakeSchema, FakeTestRunner, RecordingRunner,
};
pub use buildwatch_test_utils::{capture_logs, init_tracing, wait_until, with_timeout};

use buildwatch::engine::TriggerEvent;

/// A debounced trigger for `glob` carrying `paths`.
pub fn trigger(glob: &str, paths: &[&str], seq: u64) -> TriggerEvent {
    TriggerEvent {
        glob: glob.to_string(),
        paths: paths.iter().map(PathBuf::from).collect::<BTreeSet<_>>(),
        seq,
    }
}
