//! Scratch directories and file naming for intermediate media.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const MAX_STEM_CHARS: usize = 40;
const SCENE_ID_CHARS: usize = 6;
const TOKEN_CHARS: usize = 8;
const REMOVE_ATTEMPTS: u32 = 5;
const REMOVE_BACKOFF: Duration = Duration::from_millis(40);

/// Directory removed recursively once the owner is done with it.
///
/// Call [`ScratchDir::close`] on every normal exit path. Dropping an open directory (a cancelled
/// request, a panic) still removes it, on the blocking pool when a runtime is available.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    closed: bool,
}

impl ScratchDir {
    /// Create `parent/<prefix>_<random>` and everything above it.
    pub async fn create(parent: &Path, prefix: &str) -> io::Result<Self> {
        let path = parent.join(format!("{prefix}_{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self {
            path,
            closed: false,
        })
    }

    /// Location of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory and wait for the removal to finish.
    pub async fn close(mut self) {
        self.closed = true;
        let path = self.path.clone();
        let outcome = tokio::task::spawn_blocking(move || remove_tree(&path)).await;
        match outcome {
            Ok(result) => log_removal(&self.path, result),
            Err(error) => tracing::warn!(
                path = %self.path.display(),
                error = %error,
                "Scratch directory removal task failed"
            ),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || log_removal(&path, remove_tree(&path)));
            }
            Err(_) => log_removal(&path, remove_tree(&path)),
        }
    }
}

/// `remove_dir_all`, retried while a late writer (an aborted job's blocking encode) is still
/// adding files.
fn remove_tree(path: &Path) -> io::Result<()> {
    let mut attempt = 1;
    loop {
        match std::fs::remove_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(error)
                if error.kind() == io::ErrorKind::DirectoryNotEmpty
                    && attempt < REMOVE_ATTEMPTS =>
            {
                std::thread::sleep(REMOVE_BACKOFF * attempt);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

fn log_removal(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed scratch directory"),
        Err(error) => tracing::warn!(
            path = %path.display(),
            error = %error,
            "Failed to remove scratch directory"
        ),
    }
}

/// Reduce an identifier to characters safe in a file name.
pub fn sanitize_file_stem(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_CHARS)
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        "scene".to_string()
    } else {
        cleaned
    }
}

/// Six hex characters of a v4 UUID, for scenes supplied without an id.
pub fn generated_scene_id() -> String {
    random_hex(SCENE_ID_CHARS)
}

/// Eight hex characters for default output names.
pub fn short_token() -> String {
    random_hex(TOKEN_CHARS)
}

fn random_hex(len: usize) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(len);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_characters() {
        assert_eq!(sanitize_file_stem("intro"), "intro");
        assert_eq!(sanitize_file_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_file_stem("scène 1"), "sc_ne_1");
        assert_eq!(sanitize_file_stem("///"), "scene");
        assert_eq!(sanitize_file_stem(""), "scene");
        assert_eq!(sanitize_file_stem(&"x".repeat(100)).len(), MAX_STEM_CHARS);
    }

    #[test]
    fn generated_ids_are_short_hex() {
        let id = generated_scene_id();
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generated_scene_id());

        let token = short_token();
        assert_eq!(token.len(), 8);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn close_removes_the_tree() {
        let root = tempfile::tempdir().expect("tempdir");
        let scratch = ScratchDir::create(root.path(), "run").await.expect("create");
        let path = scratch.path().to_path_buf();
        std::fs::create_dir_all(path.join("nested")).expect("nested");
        std::fs::write(path.join("nested").join("clip.mp4"), b"data").expect("write");
        assert!(path.is_dir());
        scratch.close().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn close_tolerates_an_already_removed_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let scratch = ScratchDir::create(root.path(), "run").await.expect("create");
        let path = scratch.path().to_path_buf();
        std::fs::remove_dir_all(&path).expect("remove");
        scratch.close().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn dropped_directory_is_removed_on_the_blocking_pool() {
        let root = tempfile::tempdir().expect("tempdir");
        let scratch = ScratchDir::create(root.path(), "run").await.expect("create");
        let path = scratch.path().to_path_buf();
        std::fs::write(path.join("clip.mp4"), b"data").expect("write");
        drop(scratch);

        tokio::time::timeout(Duration::from_secs(5), async {
            while path.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("directory removed after drop");
    }

    #[test]
    fn drop_outside_a_runtime_removes_synchronously() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("run_sync");
        std::fs::create_dir_all(&path).expect("create");
        std::fs::write(path.join("image.png"), b"png").expect("write");
        drop(ScratchDir {
            path: path.clone(),
            closed: false,
        });
        assert!(!path.exists());
    }

    #[test]
    fn remove_tree_ignores_missing_paths() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(remove_tree(&root.path().join("absent")).is_ok());
    }
}
