// src/pipeline/writer.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tracing::debug;

use crate::errors::PipelineError;
use crate::fs::FileSystem;

/// Writes artifacts atomically and skips rewrites of unchanged content.
///
/// Remembers a blake3 fingerprint of the last bytes written per path. A
/// write whose bytes match the fingerprint is skipped as long as the file
/// still exists, so idempotent runs leave mtimes alone. The filesystem work
/// itself runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    fs: Arc<dyn FileSystem>,
    written: Arc<Mutex<HashMap<PathBuf, blake3::Hash>>>,
}

impl ArtifactWriter {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            written: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Write `contents` to `path`. Returns whether the file was touched.
    pub async fn write(&self, path: &Path, contents: &[u8]) -> Result<bool, PipelineError> {
        self.write_all(&[(path, contents)]).await
    }

    /// Write a group of artifacts that belong to one run, in order.
    ///
    /// Skipped when every file already holds its bytes. Otherwise the whole
    /// group is staged before any file is replaced, so a failed write never
    /// leaves files from two different runs side by side.
    pub async fn write_all(&self, files: &[(&Path, &[u8])]) -> Result<bool, PipelineError> {
        let hashes: Vec<blake3::Hash> = files.iter().map(|(_, c)| blake3::hash(c)).collect();
        if files
            .iter()
            .zip(&hashes)
            .all(|((path, _), hash)| self.is_current(path, hash))
        {
            debug!(paths = ?paths(files), "artifacts unchanged; skipping write");
            return Ok(false);
        }

        let owned: Vec<(PathBuf, Vec<u8>)> = files
            .iter()
            .map(|(path, contents)| (path.to_path_buf(), contents.to_vec()))
            .collect();
        let fs = Arc::clone(&self.fs);
        tokio::task::spawn_blocking(move || match owned.as_slice() {
            [(path, contents)] => fs.write_atomic(path, contents),
            group => {
                let borrowed: Vec<(&Path, &[u8])> = group
                    .iter()
                    .map(|(path, contents)| (path.as_path(), contents.as_slice()))
                    .collect();
                fs.write_atomic_all(&borrowed)
            }
        })
        .await
        .map_err(|e| anyhow!("write task failed: {e}"))
        .and_then(|written| written)
        .map_err(|source| PipelineError::Write {
            path: paths(files).join(", "),
            source,
        })?;

        for ((path, _), hash) in files.iter().zip(hashes) {
            self.remember(path, hash);
        }
        Ok(true)
    }

    fn is_current(&self, path: &Path, hash: &blake3::Hash) -> bool {
        let written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        written.get(path) == Some(hash) && self.fs.exists(path)
    }

    fn remember(&self, path: &Path, hash: blake3::Hash) {
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        written.insert(path.to_path_buf(), hash);
    }
}

fn paths(files: &[(&Path, &[u8])]) -> Vec<String> {
    files
        .iter()
        .map(|(path, _)| path.display().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[tokio::test]
    async fn identical_content_is_written_once() {
        let fs = MockFileSystem::new();
        let writer = ArtifactWriter::new(Arc::new(fs.clone()));

        assert!(writer.write(Path::new("out/a.js"), b"code").await.unwrap());
        assert!(!writer.write(Path::new("out/a.js"), b"code").await.unwrap());
        assert!(writer.write(Path::new("out/a.js"), b"new code").await.unwrap());
        assert_eq!(fs.writes().len(), 2);
    }

    #[tokio::test]
    async fn deleted_file_is_rewritten() {
        let fs = MockFileSystem::new();
        let writer = ArtifactWriter::new(Arc::new(fs.clone()));

        writer.write(Path::new("a.js"), b"code").await.unwrap();
        fs.remove("a.js");
        assert!(writer.write(Path::new("a.js"), b"code").await.unwrap());
        assert_eq!(fs.contents("a.js").unwrap(), b"code");
    }

    #[tokio::test]
    async fn group_is_written_in_order() {
        let fs = MockFileSystem::new();
        let writer = ArtifactWriter::new(Arc::new(fs.clone()));

        let files: [(&Path, &[u8]); 2] = [
            (Path::new("a.min.js.map"), b"{}"),
            (Path::new("a.min.js"), b"c"),
        ];
        assert!(writer.write_all(&files).await.unwrap());
        assert!(!writer.write_all(&files).await.unwrap());
        assert_eq!(
            fs.writes(),
            vec![PathBuf::from("a.min.js.map"), PathBuf::from("a.min.js")]
        );
    }

    #[tokio::test]
    async fn failed_group_leaves_every_file_and_fingerprint_alone() {
        let fs = MockFileSystem::new();
        fs.add_file("a.js", "old");
        fs.deny_writes("a.min.js");
        let writer = ArtifactWriter::new(Arc::new(fs.clone()));

        let files: [(&Path, &[u8]); 2] =
            [(Path::new("a.js"), b"new"), (Path::new("a.min.js"), b"min")];
        let err = writer.write_all(&files).await.unwrap_err();

        assert!(matches!(err, PipelineError::Write { ref path, .. } if path == "a.js, a.min.js"));
        assert_eq!(fs.contents("a.js").unwrap(), b"old");
        assert!(writer.write(Path::new("a.js"), b"new").await.unwrap());
    }

    #[tokio::test]
    async fn failed_write_is_reported_with_path() {
        let fs = MockFileSystem::new();
        fs.deny_writes("spec.json");
        let writer = ArtifactWriter::new(Arc::new(fs));

        let err = writer.write(Path::new("spec.json"), b"{}").await.unwrap_err();
        assert!(matches!(err, PipelineError::Write { ref path, .. } if path == "spec.json"));
    }
}
