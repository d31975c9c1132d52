//! Scoped temporary files.
//!
//! Every temp file the bot writes lives directly under one process-wide
//! directory owned by a [`TempStore`]. Work that creates files does so inside
//! a [`TempScope`]: paths are reserved (registered for cleanup) before any
//! writer touches them, and closing the scope deletes every reserved path,
//! whether the work succeeded or not.
//!
//! Scopes are passed explicitly as `&mut TempScope` to anything that may
//! reserve files. A [`ScopeLease`] represents one task; a lease admits at most
//! one open scope at a time.
//!
//! # Example
//!
//! ```ignore
//! use mediaforge_core::tempfiles::{ScopeLease, TempStore};
//!
//! let store = TempStore::init("/tmp/mediaforge").await?;
//! let lease = ScopeLease::new();
//! let mut scope = store.open_scope(&lease)?;
//!
//! let png = scope.reserve("png");
//! tokio::fs::write(&png, b"...").await?;
//!
//! // A second scope for the same task is rejected.
//! assert!(store.open_scope(&lease).is_err());
//!
//! let report = scope.close().await;
//! assert_eq!(report.attempted, 1);
//! ```

mod scope;
mod store;

pub use scope::{CloseReport, NameHint, ScopeLease, TempScope};
pub use store::TempStore;

use thiserror::Error;

/// Errors raised by the temp file layer.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// The task already has an open scope.
    #[error("A temp file scope is already open for this task")]
    AlreadyOpen,

    /// Creating or wiping the temp directory failed.
    #[error("Temp directory error: {0}")]
    Io(#[from] std::io::Error),
}
