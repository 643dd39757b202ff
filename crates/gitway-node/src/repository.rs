//! Resolution of repository identifiers to directories under the root.
//!
//! Identifiers are resolved on every request. Nothing is cached, since
//! repositories may be created or removed while the server runs.

use crate::error::ApiError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix every served repository directory carries.
pub const GIT_SUFFIX: &str = ".git";

/// A repository that exists under the root and looks like a bare repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepo {
    /// Directory name, always ending in `.git`.
    pub name: String,
    /// Canonical absolute path.
    pub path: PathBuf,
}

/// The directory all repositories are served from.
#[derive(Debug, Clone)]
pub struct RepoRoot {
    root: PathBuf,
}

/// Appends `.git` unless the identifier already ends with it.
pub fn with_git_suffix(ident: &str) -> String {
    if ident.ends_with(GIT_SUFFIX) {
        ident.to_string()
    } else {
        format!("{ident}{GIT_SUFFIX}")
    }
}

/// Returns false for identifiers that could name something other than a
/// plain child directory of the root.
pub fn is_safe_identifier(ident: &str) -> bool {
    !ident.is_empty()
        && !ident.starts_with('.')
        && !ident.contains(['/', '\\', '\0', ':'])
}

impl RepoRoot {
    /// Creates a resolver for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the configured root.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves the first path segment of a request to a repository.
    pub async fn resolve(&self, ident: &str) -> Result<ResolvedRepo, ApiError> {
        if ident.is_empty() {
            return Err(ApiError::RepoNotSpecified);
        }

        let name = with_git_suffix(ident);
        if !is_safe_identifier(ident) {
            warn!(ident = %ident, "Rejected unsafe repository identifier");
            return Err(ApiError::RepoNotFound(name));
        }

        let root = tokio::fs::canonicalize(&self.root).await.map_err(|e| {
            warn!(root = %self.root.display(), error = %e, "Repository root unavailable");
            ApiError::RepoNotFound(name.clone())
        })?;

        let path = match tokio::fs::canonicalize(root.join(&name)).await {
            Ok(path) => path,
            Err(_) => {
                debug!(repo = %name, "Repository not found");
                return Err(ApiError::RepoNotFound(name));
            }
        };

        // Symlinks may point anywhere; the canonical path decides.
        if !path.starts_with(&root) || path == root {
            warn!(
                repo = %name,
                resolved = %path.display(),
                "Repository resolves outside the root"
            );
            return Err(ApiError::RepoNotFound(name));
        }

        if !is_bare_repository(&path).await {
            debug!(repo = %name, "Directory is not a bare repository");
            return Err(ApiError::RepoNotFound(name));
        }

        Ok(ResolvedRepo { name, path })
    }
}

/// A bare repository has a `HEAD` file and an `objects` directory at its top.
async fn is_bare_repository(path: &Path) -> bool {
    let is_dir = |p: PathBuf| async move {
        tokio::fs::metadata(p)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    };

    if !is_dir(path.to_path_buf()).await || !is_dir(path.join("objects")).await {
        return false;
    }

    tokio::fs::metadata(path.join("HEAD"))
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
