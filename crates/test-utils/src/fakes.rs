//! In-memory stand-ins for the pipeline collaborators and run functions.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use buildwatch::dag::{RunContext, RunFuture, TaskRunner};
use buildwatch::errors::PipelineError;
use buildwatch::tools::{
    BoxFuture, Bundler, Minified, Minifier, SchemaGenerator, TestFileResult, TestRunner,
};

/// Returns a fixed bundle (or error) and counts calls.
#[derive(Debug)]
pub struct FakeBundler {
    output: Mutex<std::result::Result<Vec<u8>, String>>,
    calls: AtomicUsize,
}

impl FakeBundler {
    pub fn new(bundle: impl Into<Vec<u8>>) -> Self {
        Self {
            output: Mutex::new(Ok(bundle.into())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            output: Mutex::new(Err(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_output(&self, bundle: impl Into<Vec<u8>>) {
        *self.output.lock().unwrap() = Ok(bundle.into());
    }

    pub fn set_failing(&self, message: &str) {
        *self.output.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Bundler for FakeBundler {
    fn bundle<'a>(&'a self, _entry: &'a Path) -> BoxFuture<'a, Result<Vec<u8>, PipelineError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = self.output.lock().unwrap().clone();
        Box::pin(async move { output.map_err(PipelineError::Bundle) })
    }
}

/// Strips ASCII whitespace and emits a tiny map naming the source.
#[derive(Debug, Default)]
pub struct FakeMinifier {
    fail: AtomicBool,
}

impl FakeMinifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
        }
    }
}

impl Minifier for FakeMinifier {
    fn minify(&self, code: &[u8], source_name: &str) -> Result<Minified, PipelineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::Minify("unexpected token".to_string()));
        }
        let code = code
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let map = format!(r#"{{"version":3,"sources":["{source_name}"],"mappings":""}}"#);
        Ok(Minified {
            code,
            map: map.into_bytes(),
        })
    }
}

/// Schema generator returning a fixed capture.
#[derive(Debug)]
pub struct FakeSchema {
    output: Mutex<std::result::Result<Vec<u8>, String>>,
    calls: AtomicUsize,
}

impl FakeSchema {
    pub fn new(document: impl Into<Vec<u8>>) -> Self {
        Self {
            output: Mutex::new(Ok(document.into())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            output: Mutex::new(Err(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_output(&self, document: impl Into<Vec<u8>>) {
        *self.output.lock().unwrap() = Ok(document.into());
    }

    pub fn set_failing(&self, message: &str) {
        *self.output.lock().unwrap() = Err(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SchemaGenerator for FakeSchema {
    fn generate(&self) -> BoxFuture<'_, Result<Vec<u8>, PipelineError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = self.output.lock().unwrap().clone();
        Box::pin(async move { output.map_err(PipelineError::SchemaSubprocess) })
    }
}

/// Test runner reporting a fixed pass/fail per file.
#[derive(Debug, Default)]
pub struct FakeTestRunner {
    files: Mutex<Vec<(PathBuf, bool)>>,
    globs: Mutex<Vec<String>>,
    error: Mutex<Option<String>>,
}

impl FakeTestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, file: &str, passed: bool) -> Self {
        self.files.lock().unwrap().push((PathBuf::from(file), passed));
        self
    }

    /// Make every run fail before any spec file runs.
    pub fn failing(message: &str) -> Self {
        let runner = Self::default();
        *runner.error.lock().unwrap() = Some(message.to_string());
        runner
    }

    /// Globs the runner was asked to expand, one per run.
    pub fn globs(&self) -> Vec<String> {
        self.globs.lock().unwrap().clone()
    }
}

impl TestRunner for FakeTestRunner {
    fn run<'a>(&'a self, glob: &'a str) -> BoxFuture<'a, Result<Vec<TestFileResult>, PipelineError>> {
        self.globs.lock().unwrap().push(glob.to_string());
        if let Some(message) = self.error.lock().unwrap().clone() {
            return Box::pin(async move { Err(PipelineError::TestRun(message)) });
        }
        let results = self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(file, passed)| TestFileResult {
                file: file.clone(),
                passed: *passed,
                log_lines: vec![format!("{} {}", if *passed { "ok" } else { "not ok" }, file.display())],
            })
            .collect();
        Box::pin(async move { Ok(results) })
    }
}

/// Run function that records every run and can be held open.
///
/// A gated runner blocks each run until [`release`](Self::release) hands it
/// a permit, which lets tests trigger while a run is in flight.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    runs: Mutex<Vec<RunContext>>,
    finished: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Semaphore>,
    fail: AtomicBool,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    /// Let `n` more runs finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn runs(&self) -> Vec<RunContext> {
        self.runs.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Most runs of this task observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl TaskRunner for RecordingRunner {
    fn run<'a>(&'a self, ctx: &'a RunContext) -> RunFuture<'a> {
        Box::pin(async move {
            self.runs.lock().unwrap().push(ctx.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(PipelineError::TestRun(format!("run {} failed", ctx.run_id)))
            } else {
                Ok(())
            }
        })
    }
}
