use std::fs::File;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use super::error::StateError;

/// Advisory exclusive lock serializing runs for one tenant. Released on drop.
#[derive(Debug)]
pub struct TenantLock {
    _file: File,
    path: PathBuf,
}

impl TenantLock {
    /// Try to take the lock without waiting. `Ok(None)` means another
    /// process (or another handle in this one) already holds it.
    pub async fn try_acquire(
        lock_dir: &Path,
        tenant_id: &str,
    ) -> Result<Option<Self>, StateError> {
        let path = lock_dir.join(format!("{}.lock", sanitize_tenant_id(tenant_id)));
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| StateError::Lock {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            let file = File::create(&path).map_err(|e| StateError::Lock {
                path: path.clone(),
                source: e,
            })?;
            match file.try_lock_exclusive() {
                Ok(_) => Ok(Some(Self { _file: file, path })),
                Err(e) => {
                    tracing::debug!(path = %path.display(), "Lock held elsewhere: {}", e);
                    Ok(None)
                }
            }
        })
        .await?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Keep lock file names to a safe character set.
fn sanitize_tenant_id(tenant_id: &str) -> String {
    tenant_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("ksef-sync-tests")
            .join("locks")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_sanitize_tenant_id() {
        assert_eq!(sanitize_tenant_id("acme-1"), "acme-1");
        assert_eq!(sanitize_tenant_id("a/b c"), "a_b_c");
    }

    #[tokio::test]
    async fn test_second_acquire_fails_until_release() {
        let dir = test_dir("exclusive");
        let first = TenantLock::try_acquire(&dir, "acme").await.unwrap();
        assert!(first.is_some());
        assert!(first.as_ref().unwrap().path().ends_with("acme.lock"));

        let second = TenantLock::try_acquire(&dir, "acme").await.unwrap();
        assert!(second.is_none());

        drop(first);
        let third = TenantLock::try_acquire(&dir, "acme").await.unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn test_locks_are_per_tenant() {
        let dir = test_dir("per_tenant");
        let a = TenantLock::try_acquire(&dir, "a").await.unwrap();
        let b = TenantLock::try_acquire(&dir, "b").await.unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
