// tests/serve_controller.rs

mod common;
use crate::common::{init_tracing, wait_until, with_timeout, GraphFixture, Runners};

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use buildwatch::config::ServeSection;
use buildwatch::dag::{TaskGraph, WatchGlob};
use buildwatch::engine::{spawn_scheduler, SchedulerHandle};
use buildwatch::errors::{BuildwatchError, Result};
use buildwatch::reload::ReloadChannel;
use buildwatch::serve::ServeController;
use buildwatch::watch::{spawn_watcher, WatcherHandle};

fn full_graph() -> (Arc<TaskGraph>, Runners) {
    GraphFixture::new()
        .task("build", &["src/**"], &[])
        .task("schema", &["src/schema/schema.js"], &[])
        .task("test", &["src/**", "test/**"], &[])
        .build()
}

fn serve_section(base_dir: &Path, port: u16) -> ServeSection {
    ServeSection {
        base_dir: base_dir.to_path_buf(),
        host: "127.0.0.1".to_string(),
        port,
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn arm_all(root: &Path, graph: &TaskGraph) -> WatcherHandle {
    let (tx, _rx) = mpsc::unbounded_channel();
    spawn_watcher(root, graph.watch_globs().to_vec(), tx).unwrap()
}

struct Setup {
    dir: tempfile::TempDir,
    graph: Arc<TaskGraph>,
    runners: Runners,
    handle: SchedulerHandle,
    join: JoinHandle<Result<()>>,
    reload: ReloadChannel,
}

impl Setup {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("index.html"),
            "<html><body><h1>vega-lite</h1></body></html>",
        )
        .unwrap();
        std::fs::write(dir.path().join("vegalite.js"), "var vl = {};").unwrap();
        let (graph, runners) = full_graph();
        let (handle, join) = spawn_scheduler(Arc::clone(&graph));
        Self {
            dir,
            graph,
            runners,
            handle,
            join,
            reload: ReloadChannel::new(),
        }
    }

    fn controller(&self, port: u16) -> ServeController {
        ServeController::new(
            serve_section(Path::new("."), port),
            self.dir.path(),
            Arc::clone(&self.graph),
            self.handle.clone(),
            self.reload.clone(),
        )
    }

    async fn stop(self) {
        self.handle.shutdown().await.unwrap();
        with_timeout(self.join).await.unwrap().unwrap();
    }
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn start_before_arming_fails_without_running_or_binding() {
    init_tracing();
    let setup = Setup::new();
    let port = free_port();
    let controller = setup.controller(port);
    assert!(!controller.is_armed());

    let err = with_timeout(controller.start()).await.unwrap_err();

    assert!(matches!(err, BuildwatchError::StartupOrder(_)));
    for task in ["build", "schema", "test"] {
        assert_eq!(setup.runners.get(task).started(), 0, "{task} ran");
    }
    // Nothing holds the port.
    std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    setup.stop().await;
}

#[tokio::test]
async fn missing_task_is_a_startup_order_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (graph, runners) = GraphFixture::new()
        .task("build", &["src/**"], &[])
        .task("schema", &["src/schema/schema.js"], &[])
        .build();
    let (handle, join) = spawn_scheduler(Arc::clone(&graph));
    let mut controller = ServeController::new(
        serve_section(Path::new("."), 0),
        dir.path(),
        Arc::clone(&graph),
        handle.clone(),
        ReloadChannel::new(),
    );
    controller.arm(arm_all(dir.path(), &graph));

    let err = with_timeout(controller.start()).await.unwrap_err();

    assert!(matches!(err, BuildwatchError::StartupOrder(ref msg) if msg.contains("test")));
    assert_eq!(runners.get("build").started(), 0);
    handle.shutdown().await.unwrap();
    with_timeout(join).await.unwrap().unwrap();
}

#[tokio::test]
async fn partially_armed_watches_are_a_startup_order_error() {
    init_tracing();
    let setup = Setup::new();
    let mut controller = setup.controller(0);
    let some: Vec<WatchGlob> = setup
        .graph
        .watch_globs()
        .iter()
        .filter(|g| g.pattern() != "test/**")
        .cloned()
        .collect();
    let (tx, _rx) = mpsc::unbounded_channel();
    controller.arm(spawn_watcher(setup.dir.path(), some, tx).unwrap());

    let err = with_timeout(controller.start()).await.unwrap_err();

    assert!(matches!(err, BuildwatchError::StartupOrder(ref msg) if msg.contains("test/**")));
    setup.stop().await;
}

#[tokio::test]
async fn armed_controller_runs_every_task_then_serves_files_and_reloads() {
    init_tracing();
    let setup = Setup::new();
    let mut controller = setup.controller(0);
    controller.arm(arm_all(setup.dir.path(), &setup.graph));

    let server = with_timeout(controller.start()).await.unwrap();

    for task in ["build", "schema", "test"] {
        assert_eq!(setup.runners.get(task).finished(), 1, "{task}");
    }
    let addr = server.local_addr();

    let page = with_timeout(http_get(addr, "/index.html")).await;
    assert!(page.starts_with("HTTP/1.1 200"), "{page}");
    assert!(page.contains(
        "<h1>vega-lite</h1><script src=\"/__buildwatch/reload.js\"></script></body>"
    ));

    let bundle = with_timeout(http_get(addr, "/vegalite.js")).await;
    assert!(bundle.ends_with("var vl = {};"), "{bundle}");

    let script = with_timeout(http_get(addr, "/__buildwatch/reload.js")).await;
    assert!(script.contains("application/javascript"));
    assert!(script.contains("EventSource(\"/__buildwatch/events\")"));

    let missing = with_timeout(http_get(addr, "/nope.js")).await;
    assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

    // Live-reload stream.
    let mut events = TcpStream::connect(addr).await.unwrap();
    events
        .write_all(b"GET /__buildwatch/events HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let reload = setup.reload.clone();
    with_timeout(wait_until(|| reload.subscriber_count() == 1)).await;
    reload.publish();

    let mut seen = String::new();
    let mut buf = [0u8; 1024];
    with_timeout(async {
        while !seen.contains("data: {\"seq\":1}") {
            let n = events.read(&mut buf).await.unwrap();
            assert!(n > 0, "event stream closed early: {seen}");
            seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    })
    .await;
    assert!(seen.contains("text/event-stream"));
    assert!(seen.contains("event: reload"));
    drop(events);

    with_timeout(server.shutdown()).await.unwrap();
    setup.stop().await;
}

#[tokio::test]
async fn failing_initial_build_aborts_startup() {
    init_tracing();
    let setup = Setup::new();
    setup.runners.get("build").set_failing(true);
    let port = free_port();
    let mut controller = setup.controller(port);
    controller.arm(arm_all(setup.dir.path(), &setup.graph));

    let err = with_timeout(controller.start()).await.unwrap_err();

    assert!(matches!(err, BuildwatchError::StartupRunFailed(ref msg) if msg.contains("build")));
    std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    setup.stop().await;
}

#[tokio::test]
async fn failing_initial_schema_aborts_startup() {
    init_tracing();
    let setup = Setup::new();
    setup.runners.get("schema").set_failing(true);
    let port = free_port();
    let mut controller = setup.controller(port);
    controller.arm(arm_all(setup.dir.path(), &setup.graph));

    let err = with_timeout(controller.start()).await.unwrap_err();

    assert!(matches!(err, BuildwatchError::StartupRunFailed(ref msg) if msg.contains("schema")));
    assert_eq!(setup.runners.get("test").started(), 0);
    std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    setup.stop().await;
}

#[tokio::test]
async fn failing_initial_tests_still_serve() {
    init_tracing();
    let setup = Setup::new();
    setup.runners.get("test").set_failing(true);
    let mut controller = setup.controller(0);
    controller.arm(arm_all(setup.dir.path(), &setup.graph));

    let server = with_timeout(controller.start()).await.unwrap();
    assert_eq!(setup.runners.get("test").finished(), 1);

    with_timeout(server.shutdown()).await.unwrap();
    setup.stop().await;
}
