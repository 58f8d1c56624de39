//! Backend topology configuration.
//!
//! A `kura.toml` describes the disk backend that serves as the default and
//! any prefix routes layered over it:
//!
//! ```toml
//! read_limit = 100
//!
//! [filesystem]
//! root_dir = "/srv/workspace"
//! virtual_mode = true
//! max_file_size_mb = 10
//!
//! [routes."/memories"]
//! kind = "store"
//! namespace = "agent-1"
//!
//! [routes."/scratch"]
//! kind = "state"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{
    Backend, CompositeBackend, FilesystemBackend, RipgrepSearcher, StateBackend, StoreBackend,
};
use crate::constants::{
    DEFAULT_GREP_TIMEOUT_SECS, DEFAULT_MAX_FILE_SIZE_MB, DEFAULT_TOOL_READ_LIMIT,
};
use crate::record::SharedFiles;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot determine working directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Disk backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Root directory. Defaults to the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,
    /// Confine every path to `root_dir`.
    pub virtual_mode: bool,
    /// Reads of larger files are refused.
    pub max_file_size_mb: f64,
    /// Deadline for the ripgrep fast path.
    pub grep_timeout_secs: u64,
    /// Ripgrep executable name or path.
    pub ripgrep_path: String,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            virtual_mode: false,
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            grep_timeout_secs: DEFAULT_GREP_TIMEOUT_SECS,
            ripgrep_path: "rg".to_string(),
        }
    }
}

impl FilesystemConfig {
    /// Config rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn with_virtual_mode(mut self, virtual_mode: bool) -> Self {
        self.virtual_mode = virtual_mode;
        self
    }

    pub fn with_max_file_size_mb(mut self, mb: f64) -> Self {
        self.max_file_size_mb = mb;
        self
    }

    /// The size limit in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        (self.max_file_size_mb * 1024.0 * 1024.0) as u64
    }

    /// The configured root, or the working directory.
    pub fn resolve_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.root_dir {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().map_err(ConfigError::CurrentDir),
        }
    }

    pub fn searcher(&self) -> RipgrepSearcher {
        RipgrepSearcher::new(
            &self.ripgrep_path,
            Duration::from_secs(self.grep_timeout_secs),
        )
    }

    /// Build the disk backend this config describes.
    pub fn build(&self) -> Result<FilesystemBackend, ConfigError> {
        Ok(FilesystemBackend::new(self.resolve_root()?, self.virtual_mode)
            .with_max_file_size(self.max_file_size_bytes())
            .with_searcher(self.searcher()))
    }
}

/// Shared store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl StoreConfig {
    pub fn build(&self, store: SharedFiles) -> StoreBackend {
        match &self.namespace {
            Some(ns) => StoreBackend::with_namespace(store, ns),
            None => StoreBackend::new(store),
        }
    }
}

/// What serves a routed prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteConfig {
    /// A second disk root.
    Filesystem {
        root_dir: PathBuf,
        #[serde(default)]
        virtual_mode: bool,
    },
    /// The shared cross-context store.
    Store {
        #[serde(default)]
        namespace: Option<String>,
    },
    /// The current execution's state map.
    State,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KuraConfig {
    /// The default backend.
    pub filesystem: FilesystemConfig,
    /// Prefix → backend.
    pub routes: BTreeMap<String, RouteConfig>,
    /// Page size used by the tool layer when none is given.
    pub read_limit: usize,
}

impl Default for KuraConfig {
    fn default() -> Self {
        Self {
            filesystem: FilesystemConfig::default(),
            routes: BTreeMap::new(),
            read_limit: DEFAULT_TOOL_READ_LIMIT,
        }
    }
}

impl KuraConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Build the configured topology.
    ///
    /// `state` backs `state` routes and `store` backs `store` routes. With no
    /// routes the disk backend is returned directly.
    pub fn build_backend(
        &self,
        state: SharedFiles,
        store: SharedFiles,
    ) -> Result<Arc<dyn Backend>, ConfigError> {
        let default: Arc<dyn Backend> = Arc::new(self.filesystem.build()?);
        if self.routes.is_empty() {
            return Ok(default);
        }

        let mut routes: Vec<(String, Arc<dyn Backend>)> = Vec::with_capacity(self.routes.len());
        for (prefix, route) in &self.routes {
            let backend: Arc<dyn Backend> = match route {
                RouteConfig::Filesystem {
                    root_dir,
                    virtual_mode,
                } => Arc::new(
                    FilesystemBackend::new(root_dir, *virtual_mode)
                        .with_max_file_size(self.filesystem.max_file_size_bytes())
                        .with_searcher(self.filesystem.searcher()),
                ),
                RouteConfig::Store { namespace } => Arc::new(
                    StoreConfig {
                        namespace: namespace.clone(),
                    }
                    .build(Arc::clone(&store)),
                ),
                RouteConfig::State => Arc::new(StateBackend::new(Arc::clone(&state))),
            };
            routes.push((prefix.clone(), backend));
        }
        Ok(Arc::new(CompositeBackend::new(default, routes)))
    }
}
