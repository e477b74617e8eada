//! Context construction configuration.

use std::path::PathBuf;

use crate::schema::SchemaRegistry;

/// Configuration for opening an [`IndexingContext`](crate::IndexingContext).
///
/// One value with named optional fields replaces the historical pile of
/// constructor overloads; every field except `id` has a usable default. With
/// no `index_path` the context lives in memory.
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    /// Context id, used in diagnostics. Required.
    pub id: String,

    /// Repository this index belongs to. Required when creating a new index;
    /// adopted from the stored descriptor when opening an existing one.
    pub repository_id: Option<String>,

    /// Local root of the repository content, if any.
    pub repository_root: Option<PathBuf>,

    /// URL the repository is served from.
    pub repository_url: Option<String>,

    /// URL remote index updates are fetched from. Defaults to
    /// `repository_url` + `/.index` when a repository URL is set.
    pub index_update_url: Option<String>,

    /// Directory for the index files. `None` selects in-memory storage.
    pub index_path: Option<PathBuf>,

    /// Take ownership of an existing index even when its descriptor
    /// disagrees, and recreate it from scratch on storage failures.
    pub reclaim: bool,

    /// Schema providers; `None` selects the default registry.
    pub providers: Option<SchemaRegistry>,
}

impl ContextConfig {
    /// Start a configuration for the given context id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the repository id.
    pub fn repository_id(mut self, repository_id: impl Into<String>) -> Self {
        self.repository_id = Some(repository_id.into());
        self
    }

    /// Set the local repository root.
    pub fn repository_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repository_root = Some(root.into());
        self
    }

    /// Set the repository URL.
    pub fn repository_url(mut self, url: impl Into<String>) -> Self {
        self.repository_url = Some(url.into());
        self
    }

    /// Set the index update URL.
    pub fn index_update_url(mut self, url: impl Into<String>) -> Self {
        self.index_update_url = Some(url.into());
        self
    }

    /// Set the index directory.
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_path = Some(path.into());
        self
    }

    /// Request reclaim semantics for this open.
    pub fn reclaim(mut self, reclaim: bool) -> Self {
        self.reclaim = reclaim;
        self
    }

    /// Use a specific schema provider registry.
    pub fn providers(mut self, providers: SchemaRegistry) -> Self {
        self.providers = Some(providers);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ContextConfig::new("central-ctx");
        assert_eq!(config.id, "central-ctx");
        assert_eq!(config.repository_id, None);
        assert_eq!(config.index_path, None);
        assert!(!config.reclaim);
        assert!(config.providers.is_none());
    }

    #[test]
    fn test_builder_setters() {
        let config = ContextConfig::new("ctx")
            .repository_id("central")
            .repository_url("https://repo.example.org/releases")
            .index_update_url("https://mirror.example.org/index")
            .index_path("/var/index/central")
            .reclaim(true);

        assert_eq!(config.repository_id.as_deref(), Some("central"));
        assert_eq!(
            config.repository_url.as_deref(),
            Some("https://repo.example.org/releases")
        );
        assert_eq!(
            config.index_update_url.as_deref(),
            Some("https://mirror.example.org/index")
        );
        assert_eq!(config.index_path, Some(PathBuf::from("/var/index/central")));
        assert!(config.reclaim);
    }
}
