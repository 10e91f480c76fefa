#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! PKCS#12 import against archives built with OpenSSL.

mod common;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::{X509Builder, X509NameBuilder};
use xtrust_lib::*;

const PASSWORD: &str = "correct horse";

fn rsa_identity(cn: &str) -> (PKey<Private>, openssl::x509::X509) {
    let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(42).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
    builder.set_pubkey(&pkey).unwrap();
    builder.sign(&pkey, MessageDigest::sha256()).unwrap();
    (pkey, builder.build())
}

/// An archive holding an RSA key, its certificate, and one extra CA.
fn archive_der() -> (Vec<u8>, Vec<u8>) {
    let (pkey, cert) = rsa_identity("pkcs12.example.com");
    let ca = common::root("Bundled CA");
    let mut chain = Stack::new().unwrap();
    chain
        .push(openssl::x509::X509::from_der(ca.cert.der()).unwrap())
        .unwrap();

    let mut builder = openssl::pkcs12::Pkcs12::builder();
    builder.name("identity").pkey(&pkey).cert(&cert);
    builder.ca(chain);
    let der = builder.build2(PASSWORD).unwrap().to_der().unwrap();
    (der, cert.to_der().unwrap())
}

#[test]
fn import_exposes_key_and_certificates() {
    let (der, leaf_der) = archive_der();
    let mut archive = Provider::default().create_pkcs12();
    archive.import(&der, PASSWORD).unwrap();

    assert!(archive.has_private_key().unwrap());
    assert_eq!(archive.count().unwrap(), 2);

    let leaf = archive.certificate(0).unwrap();
    assert_eq!(leaf.raw_data(X509Format::Der).unwrap(), leaf_der);
    assert_eq!(
        leaf.subject_name_string().unwrap(),
        "CN = pkcs12.example.com"
    );
    assert_eq!(
        archive.certificate(1).unwrap().subject_name_string().unwrap(),
        "O = xtrust tests, CN = Bundled CA"
    );
    assert!(matches!(
        archive.certificate(2),
        Err(XtrustError::InvalidState(_))
    ));

    let key = archive.private_key().unwrap();
    assert!(key.is_rsa().unwrap());
    assert!(key.has_private_key().unwrap());
    let private = key.bytes(true).unwrap();
    let public = key.bytes(false).unwrap();
    assert_ne!(private, public);
    assert_eq!(public, leaf.public_key_data().unwrap());
    // PKCS#8 bytes load back into OpenSSL.
    assert!(PKey::private_key_from_pkcs8(&private).is_ok());
}

#[test]
fn wrong_password_is_a_pkcs12_error() {
    let (der, _) = archive_der();
    let mut archive = Pkcs12::new();
    assert!(matches!(
        archive.import(&der, "wrong"),
        Err(XtrustError::Pkcs12(_))
    ));
    // The failed import leaves the container un-imported.
    assert!(matches!(
        archive.has_private_key(),
        Err(XtrustError::InvalidState(_))
    ));
    assert_eq!(archive.count().unwrap(), 0);
    archive.import(&der, PASSWORD).unwrap();
    assert_eq!(archive.count().unwrap(), 2);
}

#[test]
fn second_import_is_rejected() {
    let (der, _) = archive_der();
    let mut archive = Pkcs12::new();
    archive.import(&der, PASSWORD).unwrap();
    assert!(matches!(
        archive.import(&der, PASSWORD),
        Err(XtrustError::InvalidState(_))
    ));
}

#[test]
fn private_key_copies_are_independent() {
    let (der, _) = archive_der();
    let mut archive = Pkcs12::new();
    archive.import(&der, PASSWORD).unwrap();
    let mut first = archive.private_key().unwrap();
    let second = archive.private_key().unwrap();
    first.close();
    assert!(second.bytes(true).is_ok());
    archive.close();
    assert!(second.bytes(true).is_ok());
    assert!(matches!(archive.count(), Err(XtrustError::Closed { .. })));
}

#[test]
fn added_certificates_follow_imported_ones() {
    let (der, _) = archive_der();
    let mut archive = Pkcs12::new();
    archive.import(&der, PASSWORD).unwrap();
    let extra = common::root("Extra CA").x509();
    archive.add_certificate(&extra).unwrap();
    assert_eq!(archive.count().unwrap(), 3);
    assert_eq!(
        archive.certificate(2).unwrap().cert_hash().unwrap(),
        extra.cert_hash().unwrap()
    );
}
