//! xtrust-lib: certificate, key, and trust-store objects with path verification.
//!
//! The public surface is a small object model. Callers obtain certificates
//! and keys through a [`Provider`], populate a [`TrustStore`] with trusted
//! roots and lookup rules, configure a [`VerifyParam`], and run path
//! verification through a [`StoreContext`]. Every object owns its engine
//! resource through a [`Handle`], which releases it exactly once.

mod bio;
mod certificate;
mod collection;
mod format;
mod handle;
mod key;
mod lookup;
mod name;
mod oid;
mod params;
mod pkcs12;
mod provider;
mod store;
mod util;
pub mod verify;

pub use bio::Bio;
pub use certificate::{DigestAlgorithm, KeyMaterial, SignatureAlgorithm, X509};
pub use collection::{CertificateCollection, TrustKind};
pub use format::{FileType, X509Format};
pub use handle::{EngineResource, Handle};
pub use key::{Key, KeyAlgorithm};
pub use lookup::{
    CollectionLookup, DirectoryLookup, FileLookup, LookupSource, LookupState, X509Lookup,
};
pub use name::X509Name;
pub use params::{Purpose, VerifyFlags, VerifyParam};
pub use pkcs12::Pkcs12;
pub use provider::{Provider, ProviderConfig};
pub use store::{find_system_ca_bundle, TrustStore};
pub use verify::{ChainCertInfo, StoreContext, VerificationFailure, VerificationResult, X509Error};

/// Errors returned by xtrust-lib.
#[derive(Debug, thiserror::Error)]
pub enum XtrustError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(String),

    #[error("Invalid PEM format: {0}")]
    PemError(String),

    #[error("Invalid DER format: {0}")]
    DerError(String),

    #[error("PKCS#12 import failed: {0}")]
    Pkcs12(String),

    #[error("Unsupported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} handle used after it was closed")]
    Closed { kind: &'static str },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Verification parameters are read-only; call copy() first")]
    ReadOnly,

    #[error("Container holds no private key")]
    NoPrivateKey,

    #[error("Verification error: {0}")]
    VerifyError(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = XtrustError> = std::result::Result<T, E>;

impl XtrustError {
    /// Wrap an I/O error with the path it happened on.
    pub(crate) fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        XtrustError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}
