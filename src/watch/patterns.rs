// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use globset::GlobBuilder;

use crate::errors::{BuildwatchError, Result};
use crate::fs::FileSystem;

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// A compiled watch pattern.
///
/// Patterns are evaluated against forward-slash paths relative to the
/// project root (e.g. `"src/compile/mark.js"`). Matching is case-sensitive
/// and `*` does not cross directory separators (`**` does). A pattern with
/// no glob metacharacters is a prefix: `"src"` matches `"src/a.js"`.
#[derive(Clone)]
pub struct GlobMatcher {
    pattern: String,
    matcher: globset::GlobMatcher,
    prefix: Option<String>,
}

impl fmt::Debug for GlobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobMatcher")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl GlobMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(false)
            .literal_separator(true)
            .build()
            .map_err(|e| BuildwatchError::InvalidGlob(format!("{pattern}: {e}")))?;

        let prefix = if pattern.contains(GLOB_META) {
            None
        } else {
            Some(pattern.trim_end_matches('/').to_string())
        };

        Ok(Self {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
            prefix,
        })
    }

    /// The pattern as written in the config.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns true if `rel_path` (relative, forward slashes) is covered.
    pub fn is_match(&self, rel_path: &str) -> bool {
        if self.matcher.is_match(rel_path) {
            return true;
        }
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => rel_path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
            _ => false,
        }
    }

    /// Deepest directory that is fixed by the pattern, e.g. `test` for
    /// `test/*.spec.js`. Empty when the pattern starts with a wildcard.
    pub fn base_dir(&self) -> PathBuf {
        let literal_end = self
            .pattern
            .find(GLOB_META)
            .unwrap_or(self.pattern.len());
        let literal = &self.pattern[..literal_end];
        let dir = match literal.rfind('/') {
            Some(idx) => &literal[..idx],
            None if self.prefix.is_some() => literal,
            None => "",
        };
        PathBuf::from(dir)
    }
}

/// Collect all files under `root` that match `matcher`, sorted.
///
/// The walk starts at the pattern's fixed base directory so that large
/// unrelated trees (e.g. `node_modules`) are not visited.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    matcher: &GlobMatcher,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let start = root.join(matcher.base_dir());
    if fs.is_file(&start) {
        files.push(start);
        return Ok(files);
    }
    if !fs.is_dir(&start) {
        return Ok(files);
    }

    let mut stack = vec![start];
    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Ok(rel) = path.strip_prefix(root) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if matcher.is_match(&rel_str) {
                        files.push(path);
                    }
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn double_star_matches_nested_paths() {
        let m = GlobMatcher::new("src/**").unwrap();
        assert!(m.is_match("src/a.js"));
        assert!(m.is_match("src/compile/mark.js"));
        assert!(!m.is_match("test/a.js"));
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let m = GlobMatcher::new("test/*.spec.js").unwrap();
        assert!(m.is_match("test/encode.spec.js"));
        assert!(!m.is_match("test/nested/encode.spec.js"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let m = GlobMatcher::new("src/**").unwrap();
        assert!(!m.is_match("SRC/a.js"));
    }

    #[test]
    fn literal_pattern_is_a_prefix() {
        let m = GlobMatcher::new("src/schema").unwrap();
        assert!(m.is_match("src/schema"));
        assert!(m.is_match("src/schema/schema.js"));
        assert!(!m.is_match("src/schemagen.js"));
    }

    #[test]
    fn base_dir_stops_at_first_wildcard() {
        assert_eq!(
            GlobMatcher::new("test/*.spec.js").unwrap().base_dir(),
            PathBuf::from("test")
        );
        assert_eq!(GlobMatcher::new("**/*.js").unwrap().base_dir(), PathBuf::new());
        assert_eq!(
            GlobMatcher::new("src/schema/schema.js").unwrap().base_dir(),
            PathBuf::from("src/schema")
        );
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(matches!(
            GlobMatcher::new("src/{a"),
            Err(BuildwatchError::InvalidGlob(_))
        ));
    }

    #[test]
    fn collects_sorted_matches_from_base_dir() {
        let fs = MockFileSystem::new();
        fs.add_file("proj/test/b.spec.js", "b");
        fs.add_file("proj/test/a.spec.js", "a");
        fs.add_file("proj/test/helper.js", "h");
        fs.add_file("proj/src/x.spec.js", "x");

        let m = GlobMatcher::new("test/*.spec.js").unwrap();
        let files = collect_matching_files(&fs, Path::new("proj"), &m).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("proj/test/a.spec.js"),
                PathBuf::from("proj/test/b.spec.js")
            ]
        );
    }
}
