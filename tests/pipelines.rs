// tests/pipelines.rs

mod common;
use crate::common::{
    capture_logs, init_tracing, ConfigFileBuilder, FakeBundler, FakeMinifier, FakeSchema,
    FakeTestRunner,
};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use buildwatch::config::ConfigFile;
use buildwatch::dag::{RunContext, TaskGraph};
use buildwatch::engine::TriggerReason;
use buildwatch::errors::PipelineError;
use buildwatch::fs::mock::MockFileSystem;
use buildwatch::pipeline::{assemble, Collaborators};
use buildwatch::reload::ReloadChannel;

const ROOT: &str = "proj";

struct Harness {
    graph: TaskGraph,
    fs: MockFileSystem,
    bundler: Arc<FakeBundler>,
    schema: Arc<FakeSchema>,
    tests: Arc<FakeTestRunner>,
    reload: ReloadChannel,
}

impl Harness {
    fn new(cfg: &ConfigFile, minifier: FakeMinifier, tests: FakeTestRunner) -> Self {
        let fs = MockFileSystem::new();
        let bundler = Arc::new(FakeBundler::new("var answer = 42;\n"));
        let schema = Arc::new(FakeSchema::new(r#"{"$schema": "x", "type": "object"}"#));
        let tests = Arc::new(tests);
        let reload = ReloadChannel::new();
        let tools = Collaborators {
            bundler: bundler.clone(),
            minifier: Arc::new(minifier),
            schema: schema.clone(),
            tests: tests.clone(),
            fs: Arc::new(fs.clone()),
        };
        let graph = assemble(cfg, Path::new(ROOT), tools, reload.clone()).unwrap();
        Self {
            graph,
            fs,
            bundler,
            schema,
            tests,
            reload,
        }
    }

    fn standard() -> Self {
        Self::new(
            &ConfigFile::default(),
            FakeMinifier::new(),
            FakeTestRunner::new(),
        )
    }

    async fn run(&self, task: &str) -> Result<(), PipelineError> {
        let ctx = RunContext {
            task: task.to_string(),
            run_id: 1,
            reason: TriggerReason::Manual,
            paths: BTreeSet::new(),
        };
        let def = self.graph.task(task).expect("task registered");
        def.runner.run(&ctx).await
    }
}

fn p(path: &str) -> PathBuf {
    PathBuf::from(path)
}

#[tokio::test]
async fn build_writes_bundle_minified_and_map_then_publishes_reload() {
    init_tracing();
    let h = Harness::standard();
    let mut sub = h.reload.subscribe();

    h.run("build").await.unwrap();

    assert_eq!(
        h.fs.contents("proj/vegalite.js").unwrap(),
        b"var answer = 42;\n"
    );
    assert_eq!(
        String::from_utf8(h.fs.contents("proj/vegalite.min.js").unwrap()).unwrap(),
        "varanswer=42;\n//# sourceMappingURL=vegalite.min.js.map\n"
    );
    let map: serde_json::Value =
        serde_json::from_slice(&h.fs.contents("proj/vegalite.min.js.map").unwrap()).unwrap();
    assert_eq!(map["sources"][0], "vegalite.js");

    assert_eq!(
        h.fs.writes(),
        vec![
            p("proj/vegalite.js"),
            p("proj/vegalite.min.js.map"),
            p("proj/vegalite.min.js"),
        ]
    );
    assert_eq!(sub.try_recv().map(|e| e.seq), Some(1));
    assert_eq!(h.bundler.calls(), 1);
}

#[tokio::test]
async fn unchanged_rebuild_does_not_rewrite_artifacts() {
    init_tracing();
    let h = Harness::standard();

    h.run("build").await.unwrap();
    h.run("build").await.unwrap();
    assert_eq!(h.fs.writes().len(), 3);
    assert_eq!(h.reload.last_seq(), 2);

    h.bundler.set_output("var answer = 43;\n");
    h.run("build").await.unwrap();
    assert_eq!(h.fs.writes().len(), 6);
}

#[tokio::test]
async fn bundler_failure_keeps_previous_artifacts_and_skips_reload() {
    init_tracing();
    let h = Harness::standard();
    h.fs.add_file("proj/vegalite.js", "old bundle");
    h.fs.add_file("proj/vegalite.min.js", "old min");
    let mut sub = h.reload.subscribe();
    h.bundler.set_failing("Cannot find module './missing'");

    let err = h.run("build").await.unwrap_err();

    assert!(matches!(err, PipelineError::Bundle(ref msg) if msg.contains("missing")));
    assert!(h.fs.writes().is_empty());
    assert_eq!(h.fs.contents("proj/vegalite.js").unwrap(), b"old bundle");
    assert_eq!(h.fs.contents("proj/vegalite.min.js").unwrap(), b"old min");
    assert_eq!(sub.try_recv(), None);
}

#[tokio::test]
async fn minifier_failure_writes_nothing() {
    init_tracing();
    let h = Harness::new(
        &ConfigFile::default(),
        FakeMinifier::failing(),
        FakeTestRunner::new(),
    );

    let err = h.run("build").await.unwrap_err();

    assert!(matches!(err, PipelineError::Minify(_)));
    assert!(h.fs.writes().is_empty());
    assert_eq!(h.reload.last_seq(), 0);
}

#[tokio::test]
async fn failed_minified_write_keeps_the_previous_build_together() {
    init_tracing();
    let h = Harness::standard();
    h.fs.add_file("proj/vegalite.js", "old bundle");
    h.fs.add_file("proj/vegalite.min.js", "old min");
    h.fs.deny_writes("proj/vegalite.min.js");

    let err = h.run("build").await.unwrap_err();

    assert!(
        matches!(err, PipelineError::Write { ref path, .. } if path.contains("proj/vegalite.min.js"))
    );
    assert_eq!(h.fs.contents("proj/vegalite.js").unwrap(), b"old bundle");
    assert_eq!(h.fs.contents("proj/vegalite.min.js").unwrap(), b"old min");
    assert!(h.fs.writes().is_empty());
    assert_eq!(h.reload.last_seq(), 0);
}

#[tokio::test]
async fn schema_capture_is_written_verbatim() {
    init_tracing();
    let h = Harness::standard();

    h.run("schema").await.unwrap();

    assert_eq!(
        h.fs.contents("proj/spec.json").unwrap(),
        br#"{"$schema": "x", "type": "object"}"#
    );
    assert_eq!(h.schema.calls(), 1);
}

#[tokio::test]
async fn schema_capture_that_is_not_json_leaves_previous_document() {
    init_tracing();
    let h = Harness::standard();
    h.fs.add_file("proj/spec.json", "{\"old\":true}");
    h.schema.set_output("ReferenceError: x is not defined");

    let err = h.run("schema").await.unwrap_err();

    assert!(matches!(err, PipelineError::SchemaSubprocess(_)));
    assert_eq!(h.fs.contents("proj/spec.json").unwrap(), b"{\"old\":true}");
    assert!(h.fs.writes().is_empty());
}

#[tokio::test]
async fn schema_subprocess_failure_leaves_previous_document_byte_identical() {
    init_tracing();
    let h = Harness::standard();
    h.run("schema").await.unwrap();
    let before = h.fs.contents("proj/spec.json").unwrap();
    h.schema
        .set_failing("schema command exited with status 1: TypeError: x is undefined");

    let err = h.run("schema").await.unwrap_err();

    assert!(matches!(err, PipelineError::SchemaSubprocess(ref msg) if msg.contains("status 1")));
    assert_eq!(h.fs.contents("proj/spec.json").unwrap(), before);
    assert_eq!(h.fs.writes().len(), 1);
}

#[tokio::test]
async fn test_suite_passes_when_every_file_passes() {
    init_tracing();
    let h = Harness::new(
        &ConfigFile::default(),
        FakeMinifier::new(),
        FakeTestRunner::new()
            .with_file("test/a.spec.js", true)
            .with_file("test/b.spec.js", true),
    );

    h.run("test").await.unwrap();
    assert_eq!(h.tests.globs(), vec!["test/*.spec.js"]);
}

#[tokio::test]
async fn one_failing_spec_file_fails_the_suite() {
    init_tracing();
    let h = Harness::new(
        &ConfigFile::default(),
        FakeMinifier::new(),
        FakeTestRunner::new()
            .with_file("test/a.spec.js", true)
            .with_file("test/b.spec.js", false),
    );

    let err = h.run("test").await.unwrap_err();
    assert!(matches!(err, PipelineError::TestRun(ref msg) if msg.contains("1 of 2")));
}

#[tokio::test]
async fn every_test_run_ends_with_a_summary() {
    let passing = Harness::new(
        &ConfigFile::default(),
        FakeMinifier::new(),
        FakeTestRunner::new().with_file("test/a.spec.js", true),
    );
    let failing = Harness::new(
        &ConfigFile::default(),
        FakeMinifier::new(),
        FakeTestRunner::new().with_file("test/a.spec.js", false),
    );
    let empty = Harness::standard();
    let broken = Harness::new(
        &ConfigFile::default(),
        FakeMinifier::new(),
        FakeTestRunner::failing("mocha: command not found"),
    );

    let (logs, _guard) = capture_logs();
    passing.run("test").await.unwrap();
    failing.run("test").await.unwrap_err();
    empty.run("test").await.unwrap();
    let err = broken.run("test").await.unwrap_err();

    assert!(matches!(err, PipelineError::TestRun(ref msg) if msg.contains("not found")));
    let summaries = logs.lines_with("test summary");
    assert_eq!(summaries.len(), 4, "{}", logs.contents());
    assert!(summaries[0].contains("passed=1") && summaries[0].contains("failed=0"));
    assert!(summaries[1].contains("passed=0") && summaries[1].contains("failed=1"));
    assert!(summaries[2].contains("no_spec_files=true"));
    assert!(summaries[3].contains("mocha: command not found"));
}

#[test]
fn assembled_graph_follows_configured_prerequisites_and_watches() {
    let cfg = ConfigFileBuilder::new()
        .build_after("schema")
        .test_after("build")
        .build();
    let h = Harness::new(&cfg, FakeMinifier::new(), FakeTestRunner::new());

    assert_eq!(
        h.graph.execution_plan("test").unwrap(),
        vec!["schema", "build", "test"]
    );
    assert_eq!(
        h.graph.subscribers_of("src/**"),
        BTreeSet::from(["build".to_string(), "test".to_string()])
    );
    assert_eq!(
        h.graph.subscribers_of("src/schema/schema.js"),
        BTreeSet::from(["schema".to_string()])
    );
}
