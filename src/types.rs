// src/types.rs

//! Identifiers shared by config, graph construction and the serve controller.

/// Bundles the entry module and writes the plain + minified artifacts.
pub const BUILD_TASK: &str = "build";

/// Regenerates the schema document from the generator script.
pub const SCHEMA_TASK: &str = "schema";

/// Runs the test-spec files.
pub const TEST_TASK: &str = "test";

/// Every task this tool knows how to construct, in registration order.
pub const KNOWN_TASKS: [&str; 3] = [BUILD_TASK, SCHEMA_TASK, TEST_TASK];
