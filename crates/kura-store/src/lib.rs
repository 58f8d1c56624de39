//! # kura-store
//!
//! Pluggable file storage for agent tooling.
//!
//! Agents see one virtual, `/`-rooted namespace. What sits behind it is a
//! [`Backend`]:
//! - [`StateBackend`] keeps files in the current execution's state map and
//!   never mutates it directly; writes come back as a delta for the caller
//!   to merge
//! - [`StoreBackend`] keeps files in a shared map, optionally namespaced
//! - [`FilesystemBackend`] reads and writes a real directory, optionally
//!   confined to it
//! - [`CompositeBackend`] routes path prefixes to other backends
//!
//! [`FilesystemTools`] is the agent-facing surface: it validates untrusted
//! paths, merges deltas, and renders responses.

pub mod backend;
pub mod config;
pub mod constants;
pub mod edit;
pub mod error;
pub mod format;
pub mod paths;
pub mod record;
pub mod registry;
pub mod search;
pub mod tools;
pub mod types;

pub use backend::{
    AsyncBackend, Backend, CompositeBackend, Dispatch, FallbackReason, FilesystemBackend,
    RipgrepSearcher, StateBackend, StoreBackend,
};
pub use config::{ConfigError, FilesystemConfig, KuraConfig, RouteConfig, StoreConfig};
pub use error::{BackendError, BackendResult, EditError, FileOpError, PathError, ReadError};
pub use format::OutputMode;
pub use record::{FileData, FileMap, SharedFiles, apply_files_update, shared_files};
pub use registry::{BackendFactory, BackendRegistry};
pub use tools::{FilesystemTools, ToolOutput, ToolResponse};
pub use types::{
    Edited, FileDownloadResponse, FileInfo, FileUploadResponse, GrepMatch, GrepOutput, Written,
};
