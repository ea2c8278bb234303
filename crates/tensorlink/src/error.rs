//! Error values shared across the marshaling and convolution surfaces.

use thiserror::Error;

/// Errors produced by the fallible surfaces of the crate.
///
/// Contract violations (incompatible copy shapes, wrong buffer sizes,
/// mismatched batch lengths) panic instead; the operation docs call out
/// which conditions are fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Shape or parameter mismatch found while computing convolution
    /// gradient geometry. `label` names the operation on whose behalf
    /// the computation ran.
    #[error("{label}: {message}")]
    InvalidArgument { label: String, message: String },

    /// A device string that does not parse as `KIND:ordinal`.
    #[error("invalid device string: {0:?}")]
    InvalidDevice(String),

    /// Failure reported by a transfer service implementation.
    #[error("transfer failed: {message}")]
    Transfer { message: String },

    /// Failure reported by an op builder implementation.
    #[error("builder: {message}")]
    Builder { message: String },
}

impl Error {
    pub fn invalid_argument(label: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            label: label.into(),
            message: message.into(),
        }
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Error::Transfer {
            message: message.into(),
        }
    }

    pub fn builder(message: impl Into<String>) -> Self {
        Error::Builder {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
