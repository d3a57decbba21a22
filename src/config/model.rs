// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{BUILD_TASK, SCHEMA_TASK, TEST_TASK};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [watch]
/// quiet_window_ms = 100
///
/// [build]
/// entry = "src/vl.js"
/// name = "vegalite"
/// bundle_cmd = "browserify {entry} --standalone vl --debug"
/// watch = ["src/**"]
///
/// [schema]
/// cmd = "node schemagen.js"
/// cwd = "src/schema"
/// output = "spec.json"
///
/// [test]
/// specs = "test/*.spec.js"
/// cmd = "mocha --reporter list {file}"
///
/// [serve]
/// port = 3000
/// ```
///
/// All sections are optional and default to the layout of the original
/// project (a browserify bundle, a node schema generator and mocha specs).
///
/// This is the *unchecked* form; use [`ConfigFile`] (via `TryFrom`) in the
/// rest of the application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub schema: SchemaSection,

    #[serde(default)]
    pub test: TestSection,

    #[serde(default)]
    pub serve: ServeSection,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see
/// `config::validate`) or [`ConfigFile::new_unchecked`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watch: WatchSection,
    pub build: BuildSection,
    pub schema: SchemaSection,
    pub test: TestSection,
    pub serve: ServeSection,
}

impl ConfigFile {
    /// Wrap sections that are already known to be valid.
    pub fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            watch: raw.watch,
            build: raw.build,
            schema: raw.schema,
            test: raw.test,
            serve: raw.serve,
        }
    }

    /// The quiet window `W` used by the debouncer.
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.watch.quiet_window_ms)
    }
}

/// Watch and prerequisite settings of one configured task.
#[derive(Debug, Clone, Copy)]
pub struct TaskSection<'a> {
    pub name: &'static str,
    pub watch: &'a [String],
    pub after: &'a [String],
}

fn task_sections<'a>(
    build: &'a BuildSection,
    schema: &'a SchemaSection,
    test: &'a TestSection,
) -> [TaskSection<'a>; 3] {
    [
        TaskSection {
            name: BUILD_TASK,
            watch: &build.watch,
            after: &build.after,
        },
        TaskSection {
            name: SCHEMA_TASK,
            watch: &schema.watch,
            after: &schema.after,
        },
        TaskSection {
            name: TEST_TASK,
            watch: &test.watch,
            after: &test.after,
        },
    ]
}

impl RawConfigFile {
    pub fn task_sections(&self) -> [TaskSection<'_>; 3] {
        task_sections(&self.build, &self.schema, &self.test)
    }
}

impl ConfigFile {
    pub fn task_sections(&self) -> [TaskSection<'_>; 3] {
        task_sections(&self.build, &self.schema, &self.test)
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// Debounce quiet window in milliseconds.
    #[serde(default = "default_quiet_window_ms")]
    pub quiet_window_ms: u64,
}

fn default_quiet_window_ms() -> u64 {
    100
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            quiet_window_ms: default_quiet_window_ms(),
        }
    }
}

/// `[build]` section: bundle + minify.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Entry module handed to the bundler.
    #[serde(default = "default_entry")]
    pub entry: PathBuf,

    /// Directory receiving `<name>.js`, `<name>.min.js` and its map.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Base file name of the artifacts.
    #[serde(default = "default_name")]
    pub name: String,

    /// Shell command whose stdout is the bundle. `{entry}` is replaced by
    /// the entry path.
    #[serde(default = "default_bundle_cmd")]
    pub bundle_cmd: String,

    #[serde(default = "default_build_watch")]
    pub watch: Vec<String>,

    /// Prerequisite tasks.
    #[serde(default)]
    pub after: Vec<String>,
}

fn default_entry() -> PathBuf {
    PathBuf::from("src/vl.js")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_name() -> String {
    "vegalite".to_string()
}

fn default_bundle_cmd() -> String {
    "browserify {entry} --standalone vl --debug".to_string()
}

fn default_build_watch() -> Vec<String> {
    vec!["src/**".to_string()]
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            entry: default_entry(),
            output_dir: default_output_dir(),
            name: default_name(),
            bundle_cmd: default_bundle_cmd(),
            watch: default_build_watch(),
            after: Vec::new(),
        }
    }
}

impl BuildSection {
    pub fn bundle_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.js", self.name))
    }

    pub fn minified_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.min.js", self.name))
    }

    pub fn source_map_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.min.js.map", self.name))
    }
}

/// `[schema]` section: the schema generator subprocess.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSection {
    /// Command run through the shell; stdout must be a JSON document.
    #[serde(default = "default_schema_cmd")]
    pub cmd: String,

    /// Working directory of the generator.
    #[serde(default = "default_schema_cwd")]
    pub cwd: PathBuf,

    /// File receiving the captured document.
    #[serde(default = "default_schema_output")]
    pub output: PathBuf,

    #[serde(default = "default_schema_watch")]
    pub watch: Vec<String>,

    #[serde(default)]
    pub after: Vec<String>,
}

fn default_schema_cmd() -> String {
    "node schemagen.js".to_string()
}

fn default_schema_cwd() -> PathBuf {
    PathBuf::from("src/schema")
}

fn default_schema_output() -> PathBuf {
    PathBuf::from("spec.json")
}

fn default_schema_watch() -> Vec<String> {
    vec!["src/schema/schema.js".to_string()]
}

impl Default for SchemaSection {
    fn default() -> Self {
        Self {
            cmd: default_schema_cmd(),
            cwd: default_schema_cwd(),
            output: default_schema_output(),
            watch: default_schema_watch(),
            after: Vec::new(),
        }
    }
}

/// `[test]` section: the test runner.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSection {
    /// Glob of test-spec files, relative to the project root.
    #[serde(default = "default_specs")]
    pub specs: String,

    /// Command run once per spec file; `{file}` is replaced by its path.
    #[serde(default = "default_test_cmd")]
    pub cmd: String,

    #[serde(default = "default_test_watch")]
    pub watch: Vec<String>,

    #[serde(default)]
    pub after: Vec<String>,
}

fn default_specs() -> String {
    "test/*.spec.js".to_string()
}

fn default_test_cmd() -> String {
    "mocha --reporter list {file}".to_string()
}

fn default_test_watch() -> Vec<String> {
    vec!["src/**".to_string(), "test/**".to_string()]
}

impl Default for TestSection {
    fn default() -> Self {
        Self {
            specs: default_specs(),
            cmd: default_test_cmd(),
            watch: default_test_watch(),
            after: Vec::new(),
        }
    }
}

/// `[serve]` section: static server.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServeSection {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            host: default_host(),
            port: default_port(),
        }
    }
}
