//! Crate-level error type returned by services and the tracker.

use thiserror::Error;

use crate::api::ApiError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl Error {
    /// True when upstream rejected the credential (401/403).
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, Error::Api(ApiError::InvalidCredential(_)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
