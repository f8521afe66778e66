//! Error taxonomy for CA issuance and OCSP verification
//!
//! Every failure the library can report is a variant of [`DevPkiError`].
//! Each variant carries a stable process exit code, returned by
//! [`DevPkiError::status_code`], so the CLI can surface a distinct non-zero
//! status per failure kind.

use std::fmt;
use std::time::Duration;

/// Top-level `responseStatus` of an OCSP response (RFC 2560 §4.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Successful,
    MalformedRequest,
    InternalError,
    TryLater,
    SigRequired,
    Unauthorized,
}

impl ResponseStatus {
    /// Map the raw ASN.1 enumerated value. Value 4 is unused by the RFC.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Successful),
            1 => Some(Self::MalformedRequest),
            2 => Some(Self::InternalError),
            3 => Some(Self::TryLater),
            5 => Some(Self::SigRequired),
            6 => Some(Self::Unauthorized),
            _ => None,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Successful => "successful",
            Self::MalformedRequest => "malformedRequest",
            Self::InternalError => "internalError",
            Self::TryLater => "tryLater",
            Self::SigRequired => "sigRequired",
            Self::Unauthorized => "unauthorized",
        };
        f.write_str(name)
    }
}

/// Errors raised by the issuance and verification paths
#[derive(Debug, thiserror::Error)]
pub enum DevPkiError {
    /// Malformed command-line input
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Persistence-layer failure
    #[error("CA database error: {0}")]
    RecordStore(String),

    #[error("CA with ID {id} already exists")]
    AlreadyExists { id: String },

    #[error("CA #{id} does not exist. It must be initialized first")]
    NotFound { id: String },

    #[error("Parent CA #{id} does not exist")]
    ParentNotFound { id: String },

    /// An `issuer:subject[,subject...]` argument that cannot be used
    #[error("Invalid certificate pairing: {0}")]
    InvalidPairing(String),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("OCSP transport failed: {detail}")]
    Transport { detail: String },

    #[error("OCSP request timed out after {}s", after.as_secs())]
    TransportTimeout { after: Duration },

    #[error("OCSP responder returned status {status}")]
    ResponseStatus { status: ResponseStatus },

    #[error("OCSP response has no entry for certificate serial {serial}")]
    MissingSingleResponse { serial: String },

    #[error("Certificate serial {serial} is revoked")]
    Revoked { serial: String },

    #[error("Certificate serial {serial} has unknown status")]
    UnknownStatus { serial: String },

    #[error("OCSP response for serial {serial} is outside its validity window")]
    ExpiredWindow { serial: String },

    #[error("OCSP response signature is not trusted: {0}")]
    UntrustedResponse(String),

    #[error("OCSP response could not be decoded: {0}")]
    MalformedResponse(String),
}

impl DevPkiError {
    /// Process exit code for this failure kind
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidOption(_) => 10,
            Self::RecordStore(_) => 11,
            Self::AlreadyExists { .. } => 12,
            Self::NotFound { .. } => 13,
            Self::ParentNotFound { .. } => 14,
            Self::InvalidPairing(_) => 15,
            Self::Crypto(_) => 16,
            Self::Config(_) => 17,
            Self::Transport { .. } | Self::TransportTimeout { .. } => 20,
            Self::ResponseStatus { .. } => 21,
            Self::MissingSingleResponse { .. } => 22,
            Self::Revoked { .. } => 23,
            Self::UnknownStatus { .. } => 24,
            Self::ExpiredWindow { .. } => 25,
            Self::UntrustedResponse(_) => 26,
            Self::MalformedResponse(_) => 27,
        }
    }
}

impl From<rusqlite::Error> for DevPkiError {
    fn from(err: rusqlite::Error) -> Self {
        DevPkiError::RecordStore(err.to_string())
    }
}

impl From<std::io::Error> for DevPkiError {
    fn from(err: std::io::Error) -> Self {
        DevPkiError::RecordStore(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DevPkiError>;
