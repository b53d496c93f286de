//! Copyright 2024 Cosmian Tech SAS

use thiserror::Error;
use tokensign_pkcs11_sys::CK_RV;

use crate::rv::rv_description;

pub type TResult<T> = Result<T, TokenError>;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("{0}")]
    Default(String),

    #[error("failed loading the PKCS#11 module: {0}")]
    LoadFailed(String),

    #[error("error loading the library: {0}")]
    LibLoading(#[from] libloading::Error),

    #[error("PKCS#11 error: {description}")]
    Native { rv: CK_RV, description: String },

    #[error("{0} not available on the module")]
    NotSupported(&'static str),

    #[error(transparent)]
    TryFromIntError(#[from] std::num::TryFromIntError),
}

impl TokenError {
    /// Build a `Native` error with its description taken from the
    /// return-value catalog.
    pub fn native(rv: CK_RV) -> Self {
        TokenError::Native {
            rv,
            description: rv_description(rv),
        }
    }
}
