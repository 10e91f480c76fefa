//! Path-validation result codes.

use crate::XtrustError;
use serde::{Serialize, Serializer};

/// Why a certificate chain failed validation.
///
/// Discriminants are OpenSSL's `X509_V_ERR_*` values, so codes can be
/// compared against `openssl verify` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X509Error {
    Unspecified = 1,
    UnableToGetIssuerCert = 2,
    UnableToGetCrl = 3,
    CertSignatureFailure = 7,
    CrlSignatureFailure = 8,
    CertNotYetValid = 9,
    CertHasExpired = 10,
    CrlNotYetValid = 11,
    CrlHasExpired = 12,
    DepthZeroSelfSignedCert = 18,
    SelfSignedCertInChain = 19,
    UnableToGetIssuerCertLocally = 20,
    UnableToVerifyLeafSignature = 21,
    CertChainTooLong = 22,
    CertRevoked = 23,
    InvalidCa = 24,
    PathLengthExceeded = 25,
    InvalidPurpose = 26,
    CertUntrusted = 27,
    CertRejected = 28,
    KeyUsageNoCertsign = 32,
    UnhandledCriticalExtension = 34,
    InvalidNonCa = 37,
    InvalidExtension = 41,
    PermittedViolation = 47,
    ExcludedViolation = 48,
    ApplicationVerification = 50,
    HostnameMismatch = 62,
    EmailMismatch = 63,
    IpAddressMismatch = 64,
    MissingAuthorityKeyIdentifier = 81,
    MissingSubjectKeyIdentifier = 82,
    EmptySubjectSanNotCritical = 84,
    CaBasicConstraintsNotCritical = 85,
    AuthorityKeyIdentifierCritical = 86,
    SubjectKeyIdentifierCritical = 87,
}

const ALL: &[X509Error] = &[
    X509Error::Unspecified,
    X509Error::UnableToGetIssuerCert,
    X509Error::UnableToGetCrl,
    X509Error::CertSignatureFailure,
    X509Error::CrlSignatureFailure,
    X509Error::CertNotYetValid,
    X509Error::CertHasExpired,
    X509Error::CrlNotYetValid,
    X509Error::CrlHasExpired,
    X509Error::DepthZeroSelfSignedCert,
    X509Error::SelfSignedCertInChain,
    X509Error::UnableToGetIssuerCertLocally,
    X509Error::UnableToVerifyLeafSignature,
    X509Error::CertChainTooLong,
    X509Error::CertRevoked,
    X509Error::InvalidCa,
    X509Error::PathLengthExceeded,
    X509Error::InvalidPurpose,
    X509Error::CertUntrusted,
    X509Error::CertRejected,
    X509Error::KeyUsageNoCertsign,
    X509Error::UnhandledCriticalExtension,
    X509Error::InvalidNonCa,
    X509Error::InvalidExtension,
    X509Error::PermittedViolation,
    X509Error::ExcludedViolation,
    X509Error::ApplicationVerification,
    X509Error::HostnameMismatch,
    X509Error::EmailMismatch,
    X509Error::IpAddressMismatch,
    X509Error::MissingAuthorityKeyIdentifier,
    X509Error::MissingSubjectKeyIdentifier,
    X509Error::EmptySubjectSanNotCritical,
    X509Error::CaBasicConstraintsNotCritical,
    X509Error::AuthorityKeyIdentifierCritical,
    X509Error::SubjectKeyIdentifierCritical,
];

impl X509Error {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Result<Self, XtrustError> {
        ALL.iter()
            .copied()
            .find(|e| e.code() == code)
            .ok_or_else(|| XtrustError::NotSupported(format!("verification error code {}", code)))
    }

    /// OpenSSL's message text for this code.
    pub fn message(self) -> &'static str {
        match self {
            X509Error::Unspecified => "unspecified certificate verification error",
            X509Error::UnableToGetIssuerCert => "unable to get issuer certificate",
            X509Error::UnableToGetCrl => "unable to get certificate CRL",
            X509Error::CertSignatureFailure => "certificate signature failure",
            X509Error::CrlSignatureFailure => "CRL signature failure",
            X509Error::CertNotYetValid => "certificate is not yet valid",
            X509Error::CertHasExpired => "certificate has expired",
            X509Error::CrlNotYetValid => "CRL is not yet valid",
            X509Error::CrlHasExpired => "CRL has expired",
            X509Error::DepthZeroSelfSignedCert => "self-signed certificate",
            X509Error::SelfSignedCertInChain => "self-signed certificate in certificate chain",
            X509Error::UnableToGetIssuerCertLocally => "unable to get local issuer certificate",
            X509Error::UnableToVerifyLeafSignature => "unable to verify the first certificate",
            X509Error::CertChainTooLong => "certificate chain too long",
            X509Error::CertRevoked => "certificate revoked",
            X509Error::InvalidCa => "invalid CA certificate",
            X509Error::PathLengthExceeded => "path length constraint exceeded",
            X509Error::InvalidPurpose => "unsuitable certificate purpose",
            X509Error::CertUntrusted => "certificate not trusted",
            X509Error::CertRejected => "certificate rejected",
            X509Error::KeyUsageNoCertsign => "key usage does not include certificate signing",
            X509Error::UnhandledCriticalExtension => "unhandled critical extension",
            X509Error::InvalidNonCa => "invalid non-CA certificate (has CA markings)",
            X509Error::InvalidExtension => "invalid or inconsistent certificate extension",
            X509Error::PermittedViolation => "permitted subtree violation",
            X509Error::ExcludedViolation => "excluded subtree violation",
            X509Error::ApplicationVerification => "application verification failure",
            X509Error::HostnameMismatch => "hostname mismatch",
            X509Error::EmailMismatch => "email address mismatch",
            X509Error::IpAddressMismatch => "IP address mismatch",
            X509Error::MissingAuthorityKeyIdentifier => "missing Authority Key Identifier",
            X509Error::MissingSubjectKeyIdentifier => "missing Subject Key Identifier",
            X509Error::EmptySubjectSanNotCritical => {
                "subject name is empty but SAN is not critical"
            }
            X509Error::CaBasicConstraintsNotCritical => "basic constraints of CA cert not marked critical",
            X509Error::AuthorityKeyIdentifierCritical => "Authority Key Identifier marked critical",
            X509Error::SubjectKeyIdentifierCritical => "Subject Key Identifier marked critical",
        }
    }
}

impl std::fmt::Display for X509Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl Serialize for X509Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}
