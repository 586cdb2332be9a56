//! Registry error types.

use thiserror::Error;

/// Errors that can occur during registry operations.
///
/// Reachability queries never fail; only the backing store can.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("storage error: {0}")]
    Storage(#[from] reachgrid_state::StorageError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
