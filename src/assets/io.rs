use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::errors::{Error, Result};

/// Byte source for asset loads.
///
/// Reads run on the loader runtime, so the returned future must be `Send`.
pub trait AssetReader: Send + Sync {
    /// Reads the full contents addressed by `uri`.
    fn read_bytes(&self, uri: &str) -> BoxFuture<'static, Result<Vec<u8>>>;
}

/// Reads from the local file system.
///
/// Relative URIs resolve against the root directory; `file://` URLs and
/// absolute paths are read as-is.
pub struct FileAssetReader {
    root_path: PathBuf,
}

impl FileAssetReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let root_path = if path.is_file() {
            path.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            path.to_path_buf()
        };
        Self { root_path }
    }

    #[inline]
    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn resolve(&self, uri: &str) -> Result<PathBuf> {
        if uri.starts_with("file:") {
            let url = url::Url::parse(uri).map_err(|e| Error::UnresolvedResource {
                uri: uri.to_owned(),
                reason: e.to_string(),
            })?;
            return url.to_file_path().map_err(|()| Error::UnresolvedResource {
                uri: uri.to_owned(),
                reason: "not a local file URL".to_owned(),
            });
        }
        Ok(self.root_path.join(uri))
    }
}

impl AssetReader for FileAssetReader {
    fn read_bytes(&self, uri: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        let path = self.resolve(uri);
        async move {
            let path = path?;
            log::debug!("reading {}", path.display());
            Ok(tokio::fs::read(&path).await?)
        }
        .boxed()
    }
}

/// In-memory asset table, for embedded assets and tests.
#[derive(Default)]
pub struct MemoryAssetReader {
    entries: RwLock<FxHashMap<String, Arc<[u8]>>>,
}

impl MemoryAssetReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.entries.write().insert(uri.into(), bytes.into());
    }

    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.entries.read().contains_key(uri)
    }
}

impl AssetReader for MemoryAssetReader {
    fn read_bytes(&self, uri: &str) -> BoxFuture<'static, Result<Vec<u8>>> {
        let found = self.entries.read().get(uri).cloned();
        let uri = uri.to_owned();
        async move {
            match found {
                Some(bytes) => Ok(bytes.to_vec()),
                None => Err(Error::Io(Arc::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no in-memory asset named '{uri}'"),
                )))),
            }
        }
        .boxed()
    }
}
