#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Certificate fixtures generated on the fly with rcgen.

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use xtrust_lib::X509;

/// A generated certificate with its signing key.
pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issued {
    pub fn x509(&self) -> X509 {
        X509::from_der(self.cert.der()).unwrap()
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }
}

fn named(cn: &str, sans: &[&str]) -> CertificateParams {
    let mut params =
        CertificateParams::new(sans.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "xtrust tests");
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params
}

pub fn ca_params(cn: &str) -> CertificateParams {
    let mut params = named(cn, &[]);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

pub fn leaf_params(cn: &str, sans: &[&str]) -> CertificateParams {
    let mut params = named(cn, sans);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params
}

pub fn self_signed(params: CertificateParams) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    Issued { cert, key }
}

pub fn signed_by(params: CertificateParams, issuer: &Issued) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, &issuer.cert, &issuer.key).unwrap();
    Issued { cert, key }
}

pub fn root(cn: &str) -> Issued {
    self_signed(ca_params(cn))
}

/// Root, intermediate, and a server leaf for `leaf.example.com`.
pub struct Chain {
    pub root: Issued,
    pub intermediate: Issued,
    pub leaf: Issued,
}

pub fn three_level_chain() -> Chain {
    let root = root("Test Root CA");
    let intermediate = signed_by(ca_params("Test Intermediate CA"), &root);
    let leaf = signed_by(
        leaf_params("leaf.example.com", &["leaf.example.com", "www.example.com"]),
        &intermediate,
    );
    Chain {
        root,
        intermediate,
        leaf,
    }
}
