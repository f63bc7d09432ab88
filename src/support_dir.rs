use std::path::{Path, PathBuf};

use crate::{
    backend::INDEX_EXTENSION,
    error::{Error, Result},
};

#[derive(Debug, Clone)]
pub struct SupportDir {
    root: PathBuf,
}

impl SupportDir {
    /// Resolve the support directory from, in order of priority:
    /// 1. An explicit path (from --support-dir), which must already exist
    /// 2. The DOCSIFT_SUPPORT_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/docsift/)
    ///
    /// An explicit path that does not exist is an error rather than being
    /// created silently; a typo there would strand every index artifact.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_dir() {
                return Err(Error::InvalidSupportPath(path.to_path_buf()));
            }
            return Ok(Self {
                root: path.to_path_buf(),
            });
        }

        let root = if let Ok(val) = std::env::var("DOCSIFT_SUPPORT_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("docsift")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::InvalidSupportPath(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact path for a named collection: `<root>/<name>.index`.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{INDEX_EXTENSION}"))
    }
}
