//! Shared error helpers.

use serde::{Deserialize, Serialize};

/// Who a failure is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Expected failure caused by the user's input; reported as-is.
    User,
    /// Likely a hosting hiccup; the user is told to try again.
    Transient,
    /// A bug; reported with diagnostics.
    Bug,
}

/// Whether an I/O error means the disk is full.
pub fn io_is_storage_full(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::StorageFull || err.raw_os_error() == Some(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_full_detection() {
        assert!(io_is_storage_full(&std::io::Error::from_raw_os_error(28)));
        assert!(io_is_storage_full(&std::io::Error::from(
            std::io::ErrorKind::StorageFull
        )));
        assert!(!io_is_storage_full(&std::io::Error::from(
            std::io::ErrorKind::NotFound
        )));
    }
}
