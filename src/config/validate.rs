// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BuildwatchError, Result};
use crate::types::KNOWN_TASKS;
use crate::watch::patterns::GlobMatcher;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BuildwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_required_fields(cfg)?;
    validate_globs(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.quiet_window_ms == 0 {
        return Err(BuildwatchError::ConfigError(
            "[watch].quiet_window_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_required_fields(cfg: &RawConfigFile) -> Result<()> {
    let fields = [
        ("[build].entry", cfg.build.entry.as_os_str().is_empty()),
        ("[build].name", cfg.build.name.trim().is_empty()),
        ("[build].bundle_cmd", cfg.build.bundle_cmd.trim().is_empty()),
        ("[schema].cmd", cfg.schema.cmd.trim().is_empty()),
        ("[schema].output", cfg.schema.output.as_os_str().is_empty()),
        ("[test].specs", cfg.test.specs.trim().is_empty()),
        ("[test].cmd", cfg.test.cmd.trim().is_empty()),
    ];

    for (field, empty) in fields {
        if empty {
            return Err(BuildwatchError::ConfigError(format!(
                "{field} must not be empty"
            )));
        }
    }
    Ok(())
}

fn validate_globs(cfg: &RawConfigFile) -> Result<()> {
    for section in cfg.task_sections() {
        for pattern in section.watch {
            GlobMatcher::new(pattern)?;
        }
    }
    GlobMatcher::new(&cfg.test.specs)?;
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for section in cfg.task_sections() {
        for dep in section.after {
            if !KNOWN_TASKS.contains(&dep.as_str()) {
                return Err(BuildwatchError::UnknownTask(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    section.name, dep
                )));
            }
            if dep == section.name {
                return Err(BuildwatchError::CyclicDependency(format!(
                    "task '{}' cannot depend on itself in `after`",
                    section.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: prerequisite -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for section in cfg.task_sections() {
        graph.add_node(section.name);
    }

    for section in cfg.task_sections() {
        for dep in section.after {
            graph.add_edge(dep.as_str(), section.name, ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(BuildwatchError::CyclicDependency(format!(
            "cycle detected in task prerequisites involving task '{}'",
            cycle.node_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ConfigFile::try_from(RawConfigFile::default()).is_ok());
    }

    #[test]
    fn zero_quiet_window_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.watch.quiet_window_ms = 0;
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(BuildwatchError::ConfigError(msg)) if msg.contains("quiet_window_ms")
        ));
    }

    #[test]
    fn unknown_prerequisite_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.test.after = vec!["lint".to_string()];
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(BuildwatchError::UnknownTask(msg)) if msg.contains("lint")
        ));
    }

    #[test]
    fn prerequisite_cycle_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.test.after = vec!["build".to_string()];
        raw.build.after = vec!["test".to_string()];
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(BuildwatchError::CyclicDependency(_))
        ));
    }

    #[test]
    fn bad_glob_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.build.watch = vec!["src/[".to_string()];
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(BuildwatchError::InvalidGlob(_))
        ));
    }

    #[test]
    fn empty_bundle_cmd_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.build.bundle_cmd = "  ".to_string();
        assert!(ConfigFile::try_from(raw).is_err());
    }
}
