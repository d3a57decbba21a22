// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BuildwatchError, Result};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (prerequisite cycles, globs, etc.). Use [`load_and_validate`]
/// for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        BuildwatchError::ConfigError(format!("reading config file at {:?}: {e}", path))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - unknown `after` references,
///   - prerequisite cycles,
///   - invalid globs and empty required fields.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Resolve the config for a CLI invocation.
///
/// An explicit path must exist. Without one, `Buildwatch.toml` is used when
/// present and the built-in defaults otherwise.
pub fn resolve_config(explicit: Option<&Path>) -> Result<(ConfigFile, PathBuf)> {
    match explicit {
        Some(path) => Ok((load_and_validate(path)?, path.to_path_buf())),
        None => {
            let path = default_config_path();
            if path.is_file() {
                Ok((load_and_validate(&path)?, path))
            } else {
                info!(path = ?path, "no config file found; using built-in defaults");
                Ok((ConfigFile::default(), path))
            }
        }
    }
}

/// Helper to resolve a default config path.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Buildwatch.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[watch]
quiet_window_ms = 250

[build]
name = "bundle"
"#
        )
        .unwrap();

        let cfg = load_and_validate(file.path()).unwrap();
        assert_eq!(cfg.watch.quiet_window_ms, 250);
        assert_eq!(cfg.build.name, "bundle");
        assert_eq!(cfg.build.entry, PathBuf::from("src/vl.js"));
        assert_eq!(cfg.schema.output, PathBuf::from("spec.json"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[build]\nentri = \"typo.js\"\n").unwrap();
        assert!(matches!(
            load_and_validate(file.path()),
            Err(BuildwatchError::TomlError(_))
        ));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = resolve_config(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(BuildwatchError::ConfigError(_))));
    }
}
