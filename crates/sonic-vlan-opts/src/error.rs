//! Error types for VLAN option processing.
//!
//! Every failure is request-level: the caller reports the first error of a
//! range request and nothing is rolled back.

use thiserror::Error;

/// Result type alias for VLAN option operations.
pub type VlanOptsResult<T> = Result<T, VlanOptsError>;

/// The attribute payload ran out of room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attribute buffer exhausted: need {needed} bytes, {available} available")]
pub struct EncodeError {
    /// Bytes the failed write required.
    pub needed: usize,
    /// Bytes left in the buffer when it failed.
    pub available: usize,
}

/// Errors raised while applying VLAN options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VlanOptsError {
    /// Bad option value, missing sub-attribute, or unsupported target.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Extended-ack style description.
        message: String,
    },

    /// VLAN state is owned by kernel STP or MST.
    #[error("Busy: {message}")]
    Busy {
        /// Extended-ack style description.
        message: String,
    },

    /// A VLAN inside the range, or a required attribute, is missing.
    #[error("Not found: {message}")]
    NotFound {
        /// Extended-ack style description.
        message: String,
    },

    /// A tunnel id is already mapped to another VLAN.
    #[error("Already exists: {message}")]
    AlreadyExists {
        /// Extended-ack style description.
        message: String,
    },

    /// Payload construction exceeded the buffer.
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
}

impl VlanOptsError {
    /// Creates an invalid argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an already exists error.
    pub fn exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    /// Negative errno an rtnetlink handler would return for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => -22,
            Self::Busy { .. } => -16,
            Self::NotFound { .. } => -2,
            Self::AlreadyExists { .. } => -17,
            Self::Encode(_) => -90,
        }
    }
}
