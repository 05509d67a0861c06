use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use rescache_service::resource::ResourceDefinition;
use thiserror::Error;

use crate::settings::ResourceConfig;

/// An error resolving a key from a directory.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The key would escape the resource directory.
    #[error("key `{0}` is not a relative path")]
    InvalidKey(String),
    /// Reading the file failed.
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Resolves keys to the contents of the files in a directory.
#[derive(Clone, Debug)]
pub struct DirectoryResource {
    name: String,
    root: Rc<Path>,
}

impl DirectoryResource {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            name: config.name.clone(),
            root: Rc::from(config.root.as_path()),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ReadError> {
        let key_path = Path::new(key);
        let is_relative = key_path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !is_relative {
            return Err(ReadError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(key_path))
    }
}

impl ResourceDefinition for DirectoryResource {
    type Output = Rc<str>;
    type Error = ReadError;

    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, key: &str) -> LocalBoxFuture<'static, Result<Rc<str>, ReadError>> {
        let path = self.path_for(key);
        async move {
            let path = path?;
            tracing::debug!(path = %path.display(), "Reading file");
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Rc::from(contents)),
                Err(e) => Err(ReadError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        .boxed_local()
    }
}
