//! Mapping script identifiers to files on disk.

use anyhow::Result;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::types::ScriptName;

/// Resolves a script identifier to an absolute file path.
///
/// `Ok(None)` means "not found"; errors are reserved for I/O failures that
/// prevented the lookup itself.
pub trait PathResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        identifier: &'a ScriptName,
        extensions: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + 'a>>;
}

/// Filesystem resolver rooted at the project directory.
///
/// The identifier is tried as given, then with each extension appended in
/// order. Only regular files match.
#[derive(Debug, Clone)]
pub struct FsPathResolver {
    root_dir: PathBuf,
}

impl FsPathResolver {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn candidates(&self, identifier: &ScriptName, extensions: &[String]) -> Vec<PathBuf> {
        let raw = Path::new(identifier.as_str());
        let base = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root_dir.join(raw)
        };

        let mut candidates = Vec::with_capacity(extensions.len() + 1);
        candidates.push(base.clone());
        for ext in extensions {
            let mut with_ext = base.clone().into_os_string();
            with_ext.push(ext);
            candidates.push(PathBuf::from(with_ext));
        }
        candidates
    }
}

impl PathResolver for FsPathResolver {
    fn resolve<'a>(
        &'a self,
        identifier: &'a ScriptName,
        extensions: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Option<PathBuf>>> + Send + 'a>> {
        Box::pin(async move {
            for candidate in self.candidates(identifier, extensions) {
                let is_file = match tokio::fs::metadata(&candidate).await {
                    Ok(meta) => meta.is_file(),
                    Err(_) => false,
                };
                if is_file {
                    tracing::debug!(
                        "Resolved `{}` to candidate {}",
                        identifier,
                        candidate.display()
                    );
                    let absolute = tokio::fs::canonicalize(&candidate).await?;
                    return Ok(Some(absolute));
                }
            }
            Ok(None)
        })
    }
}
