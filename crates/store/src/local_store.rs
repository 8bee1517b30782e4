//! Staging directory layout and package commit operations

use appfw_config::Scope;
use appfw_errors::{Error, StorageError};
use appfw_types::CrInfo;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};

/// Subdirectory under the download volume root that holds staged apps.
const DOWNLOADED_APPS_DIR: &str = "downloadedApps";

/// Staging store rooted at the operator's download volume.
///
/// Layout:
/// `{root}/downloadedApps/{namespace}/{kind}/{crName}/{scope}/{appSrcName}/{appName}_{objectHash}`
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding staged packages for one (CR, scope, app source).
    #[must_use]
    pub fn app_pkg_dir(&self, cr: &CrInfo, scope: Scope, app_src: &str) -> PathBuf {
        self.root
            .join(DOWNLOADED_APPS_DIR)
            .join(&cr.namespace)
            .join(cr.kind.to_string())
            .join(&cr.name)
            .join(scope.to_string())
            .join(app_src)
    }

    /// Full path of one staged package file.
    #[must_use]
    pub fn app_pkg_path(
        &self,
        cr: &CrInfo,
        scope: Scope,
        app_src: &str,
        pkg_file_name: &str,
    ) -> PathBuf {
        self.app_pkg_dir(cr, scope, app_src).join(pkg_file_name)
    }

    /// Create the staging directory for one app source.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if directory creation fails.
    pub async fn ensure_app_pkg_dir(
        &self,
        cr: &CrInfo,
        scope: Scope,
        app_src: &str,
    ) -> Result<PathBuf, Error> {
        let dir = self.app_pkg_dir(cr, scope, app_src);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::DirectoryCreationFailed {
                path: dir.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(dir)
    }

    /// Whether a staged package already exists with the expected size.
    ///
    /// Used by the download worker to skip a re-fetch.
    pub async fn is_app_pkg_staged(&self, path: &Path, expected_size: u64) -> bool {
        match fs::metadata(path).await {
            Ok(meta) => meta.is_file() && meta.len() == expected_size,
            Err(_) => false,
        }
    }

    /// Stream `reader` into `dest` atomically: write a sibling temp file,
    /// fsync, rename into place. A failed transfer leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if any I/O step fails; the partial temp
    /// file is removed first.
    pub async fn stage_from_reader<R>(&self, mut reader: R, dest: &Path) -> Result<u64, Error>
    where
        R: AsyncRead + Unpin + Send,
    {
        // Append rather than replace: package names already contain dots.
        let mut tmp_name = dest.as_os_str().to_owned();
        tmp_name.push(".part");
        let tmp_path = PathBuf::from(tmp_name);

        let staged = async {
            let mut file = fs::File::create(&tmp_path).await?;
            let written = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, dest).await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        match staged {
            Ok(written) => Ok(written),
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(StorageError::StagingFailed {
                    path: dest.display().to_string(),
                    message: e.to_string(),
                }
                .into())
            }
        }
    }

    /// Remove one staged package.
    ///
    /// # Errors
    ///
    /// Returns a `StorageError` if the file exists but cannot be removed.
    /// A missing file is not an error; cleanup is idempotent.
    pub async fn delete_app_pkg(&self, path: &Path) -> Result<(), Error> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemovalFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appfw_types::CrKind;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn cr() -> CrInfo {
        CrInfo::new(CrKind::Standalone, "s1", "test")
    }

    #[test]
    fn layout_is_bit_exact() {
        let store = LocalStore::new("/opt/splunk/appframework");
        let path = store.app_pkg_path(&cr(), Scope::Local, "appSrc1", "app1.tgz_abcd1111");
        assert_eq!(
            path,
            PathBuf::from(
                "/opt/splunk/appframework/downloadedApps/test/Standalone/s1/local/appSrc1/app1.tgz_abcd1111"
            )
        );
    }

    #[test]
    fn cluster_scope_has_its_own_subtree() {
        let store = LocalStore::new("/vol");
        let cm = CrInfo::new(CrKind::ClusterManager, "cm1", "test");
        let dir = store.app_pkg_dir(&cm, Scope::Cluster, "clusterApps");
        assert_eq!(
            dir,
            PathBuf::from("/vol/downloadedApps/test/ClusterManager/cm1/cluster/clusterApps")
        );
    }

    #[tokio::test]
    async fn stage_commits_atomically() {
        let temp = tempdir().unwrap();
        let store = LocalStore::new(temp.path());
        let dir = store.ensure_app_pkg_dir(&cr(), Scope::Local, "appSrc1").await.unwrap();

        let dest = dir.join("app1.tgz_abcd1111");
        let written = store
            .stage_from_reader(Cursor::new(vec![7u8; 10]), &dest)
            .await
            .unwrap();

        assert_eq!(written, 10);
        assert!(store.is_app_pkg_staged(&dest, 10).await);
        // No temp file left behind, and the temp name kept the full
        // package name.
        let mut tmp_name = dest.as_os_str().to_owned();
        tmp_name.push(".part");
        assert!(!PathBuf::from(tmp_name).exists());
    }

    #[tokio::test]
    async fn staged_check_requires_matching_size() {
        let temp = tempdir().unwrap();
        let store = LocalStore::new(temp.path());
        let dir = store.ensure_app_pkg_dir(&cr(), Scope::Local, "appSrc1").await.unwrap();

        let dest = dir.join("app1.tgz_abcd1111");
        store
            .stage_from_reader(Cursor::new(vec![0u8; 4]), &dest)
            .await
            .unwrap();

        assert!(!store.is_app_pkg_staged(&dest, 10).await);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = LocalStore::new(temp.path());
        let dir = store.ensure_app_pkg_dir(&cr(), Scope::Local, "appSrc1").await.unwrap();

        let dest = dir.join("app1.tgz_abcd1111");
        store
            .stage_from_reader(Cursor::new(vec![0u8; 4]), &dest)
            .await
            .unwrap();

        store.delete_app_pkg(&dest).await.unwrap();
        assert!(!dest.exists());
        // Second removal of a missing file is fine.
        store.delete_app_pkg(&dest).await.unwrap();
    }
}
