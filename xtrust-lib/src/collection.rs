//! In-memory certificate collections and their trust tagging.

use crate::certificate::X509;
use crate::params::Purpose;
use crate::XtrustError;
use x509_parser::pem::Pem;

/// How a lookup source's certificates weigh during path building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustKind {
    /// Trusted for every purpose.
    #[default]
    Default,
    TrustClient,
    TrustServer,
    TrustAll,
    RejectClient,
    RejectServer,
    RejectAll,
}

impl TrustKind {
    /// Whether certificates tagged with this kind may anchor a chain
    /// verified for `purpose`.
    pub fn trusts(self, purpose: Option<Purpose>) -> bool {
        match self {
            TrustKind::Default | TrustKind::TrustAll => true,
            TrustKind::TrustClient => purpose == Some(Purpose::SslClient),
            TrustKind::TrustServer => {
                matches!(purpose, Some(Purpose::SslServer | Purpose::NsSslServer))
            }
            TrustKind::RejectClient | TrustKind::RejectServer | TrustKind::RejectAll => false,
        }
    }

    /// Whether certificates tagged with this kind are explicitly distrusted
    /// for `purpose`.
    pub fn rejects(self, purpose: Option<Purpose>) -> bool {
        match self {
            TrustKind::RejectAll => true,
            TrustKind::RejectClient => purpose == Some(Purpose::SslClient),
            TrustKind::RejectServer => {
                matches!(purpose, Some(Purpose::SslServer | Purpose::NsSslServer))
            }
            _ => false,
        }
    }
}

/// An ordered, caller-owned list of certificates.
#[derive(Debug, Default)]
pub struct CertificateCollection {
    certs: Vec<X509>,
}

impl CertificateCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every `CERTIFICATE` block of a PEM bundle.
    pub fn from_pem_bundle(pem_data: &[u8]) -> Result<Self, XtrustError> {
        let mut collection = Self::new();
        for der in parse_pem_certificates(pem_data)? {
            collection.add(X509::from_der(&der)?);
        }
        Ok(collection)
    }

    pub fn add(&mut self, cert: X509) {
        self.certs.push(cert);
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &X509> {
        self.certs.iter()
    }

    pub fn get(&self, index: usize) -> Option<&X509> {
        self.certs.get(index)
    }
}

impl FromIterator<X509> for CertificateCollection {
    fn from_iter<I: IntoIterator<Item = X509>>(iter: I) -> Self {
        CertificateCollection {
            certs: iter.into_iter().collect(),
        }
    }
}

/// Split a PEM input into the DER bodies of its certificate blocks.
///
/// Trailing garbage after at least one certificate is ignored; an input with
/// no certificate at all is an error.
pub(crate) fn parse_pem_certificates(input: &[u8]) -> Result<Vec<Vec<u8>>, XtrustError> {
    let mut certs = Vec::new();
    for pem_result in Pem::iter_from_buffer(input) {
        match pem_result {
            Ok(pem) => {
                if pem.label == "CERTIFICATE" || pem.label == "TRUSTED CERTIFICATE" {
                    certs.push(pem.contents);
                }
            }
            Err(e) => {
                if !certs.is_empty() {
                    break;
                }
                return Err(XtrustError::PemError(format!("failed to parse PEM: {}", e)));
            }
        }
    }
    if certs.is_empty() {
        return Err(XtrustError::PemError(
            "no certificates found in PEM input".into(),
        ));
    }
    Ok(certs)
}

/// Split a PEM input into the DER bodies of its `X509 CRL` blocks.
/// Unlike certificates, finding none is not an error.
pub(crate) fn parse_pem_crls(input: &[u8]) -> Vec<Vec<u8>> {
    Pem::iter_from_buffer(input)
        .map_while(|r| r.ok())
        .filter(|pem| pem.label == "X509 CRL")
        .map(|pem| pem.contents)
        .collect()
}
