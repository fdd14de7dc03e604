//! Workspace Module
//!
//! Per-session filesystem scopes holding submitted sources and the built
//! binary. A workspace is always removed when its session ends.

pub mod files;
pub mod manager;

pub use files::{select_entry_file, validate_files, SourceFile};
pub use manager::{Workspace, WorkspaceManager};
