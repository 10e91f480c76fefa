#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Trust stores and the lookups attached to them.

mod common;

use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use xtrust_lib::*;

#[test]
fn duplicates_are_counted() {
    let root = root("Duplicate CA").x509();
    let mut store = TrustStore::new();
    store.add_certificate(&root).unwrap();
    store.add_certificate(&root).unwrap();
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn load_locations_reads_bundle_and_crls() {
    let a = root("Bundle CA One");
    let b = root("Bundle CA Two");
    let crl = rcgen::CertificateRevocationListParams {
        this_update: rcgen::date_time_ymd(2024, 1, 1),
        next_update: rcgen::date_time_ymd(2099, 1, 1),
        crl_number: rcgen::SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs: Vec::new(),
        key_identifier_method: rcgen::KeyIdMethod::Sha256,
    }
    .signed_by(&a.cert, &a.key)
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.pem");
    std::fs::write(&path, format!("{}{}{}", a.pem(), b.pem(), crl.pem().unwrap())).unwrap();

    let mut store = TrustStore::new();
    store.load_locations(Some(&path), None).unwrap();
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn load_locations_with_nothing_is_a_no_op() {
    let mut store = TrustStore::new();
    store.load_locations(None, None).unwrap();
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn missing_ca_file_names_the_path() {
    let mut store = TrustStore::new();
    let path = std::path::Path::new("/nonexistent/xtrust/ca.pem");
    match store.load_locations(Some(path), None) {
        Err(XtrustError::Io(e)) => assert!(e.to_string().contains("/nonexistent/xtrust/ca.pem")),
        other => panic!("expected Io error, got {:?}", other),
    }
}

const UNPARSABLE_BLOCK: &str = "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n";

#[test]
fn malformed_der_ca_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ca.der");
    std::fs::write(&path, b"garbage not a certificate").unwrap();

    let mut store = TrustStore::new();
    match store.load_locations(Some(&path), None) {
        Err(XtrustError::ParseError(msg)) => assert!(msg.contains("ca.der")),
        other => panic!("expected ParseError, got {:?}", other),
    }
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn pem_file_without_usable_certificates_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.pem");
    std::fs::write(&path, format!("{}{}", UNPARSABLE_BLOCK, UNPARSABLE_BLOCK)).unwrap();

    let mut store = TrustStore::new();
    assert!(store.load_locations(Some(&path), None).is_err());
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn bad_bundle_entry_is_skipped_next_to_a_good_one() {
    let good = root("Survivor CA");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.pem");
    std::fs::write(&path, format!("{}{}", UNPARSABLE_BLOCK, good.pem())).unwrap();

    let mut store = TrustStore::new();
    store.load_locations(Some(&path), None).unwrap();
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn der_ca_file_loads_one_certificate() {
    let ca = root("DER File CA");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ca.der");
    std::fs::write(&path, ca.cert.der()).unwrap();

    let mut store = TrustStore::new();
    store.load_locations(Some(&path), None).unwrap();
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn ca_dir_must_be_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir.pem");
    std::fs::write(&file, root("File CA").pem()).unwrap();
    let mut store = TrustStore::new();
    assert!(store.load_locations(None, Some(&file)).is_err());
    assert!(store.add_directory_lookup(dir.path(), X509Format::Pem).is_ok());
}

#[test]
fn garbage_crl_is_rejected() {
    let mut store = TrustStore::new();
    assert!(matches!(
        store.add_crl(b"not a crl"),
        Err(XtrustError::DerError(_))
    ));
}

#[test]
fn closed_store_reports_closed() {
    let mut store = TrustStore::new();
    store.close();
    store.close();
    assert!(matches!(
        store.count(),
        Err(XtrustError::Closed { kind: "x509-store" })
    ));
}

#[test]
fn system_roots_load_when_present() {
    if find_system_ca_bundle().is_none() {
        eprintln!("Skipping: no system CA bundle on this host");
        return;
    }
    let mut store = TrustStore::new();
    store.add_trusted_roots().unwrap();
    assert!(store.count().unwrap() > 0);
}

#[test]
fn file_lookup_finds_by_subject() {
    let ca = root("Lookup File CA");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ca.der");
    std::fs::write(&path, ca.cert.der()).unwrap();

    let mut lookup = X509Lookup::file();
    assert_eq!(lookup.load_file(&path, FileType::Asn1).unwrap(), 1);
    lookup.initialize().unwrap();

    let subject = ca.x509().subject_name().unwrap();
    let found = lookup.lookup_by_subject(&subject).unwrap().unwrap();
    assert_eq!(found.cert_hash().unwrap(), ca.x509().cert_hash().unwrap());

    let other = root("Someone Else").x509().subject_name().unwrap();
    assert!(lookup.lookup_by_subject(&other).unwrap().is_none());
}

#[test]
fn directory_lookup_scans_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let mut lookup = X509Lookup::hash_dir();
    lookup.add_directory(dir.path(), FileType::Pem).unwrap();
    lookup.initialize().unwrap();

    let ca = root("Late Arrival CA");
    let subject = ca.x509().subject_name().unwrap();
    assert!(lookup.lookup_by_subject(&subject).unwrap().is_none());

    // Files added after registration are seen by the next lookup.
    std::fs::write(dir.path().join("late.pem"), ca.pem()).unwrap();
    assert!(lookup.lookup_by_subject(&subject).unwrap().is_some());
}

#[test]
fn collection_lookup_requires_initialize() {
    let ca = root("Collection CA");
    let collection: CertificateCollection = std::iter::once(ca.x509()).collect();
    let mut lookup = X509Lookup::collection(&collection, TrustKind::Default).unwrap();
    let subject = ca.x509().subject_name().unwrap();
    assert!(matches!(
        lookup.lookup_by_subject(&subject),
        Err(XtrustError::InvalidState(_))
    ));
    lookup.initialize().unwrap();
    assert!(lookup.lookup_by_subject(&subject).unwrap().is_some());
    lookup.shutdown().unwrap();
    assert_eq!(lookup.state().unwrap(), LookupState::ShutDown);
    assert!(lookup.lookup_by_subject(&subject).is_err());
}

/// Serves one certificate and counts how often the store asks.
struct CountingSource {
    cert_der: Vec<u8>,
    calls: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

impl LookupSource for CountingSource {
    fn kind(&self) -> &'static str {
        "counting"
    }

    fn shutdown(&mut self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn find_by_subject(&self, subject: &X509Name) -> Result<Vec<X509>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let cert = X509::from_der(&self.cert_der)?;
        if cert.subject_name()?.raw_data()? == subject.raw_data()? {
            Ok(vec![cert])
        } else {
            Ok(Vec::new())
        }
    }
}

#[test]
fn custom_lookup_anchors_chains_and_shuts_down_with_store() {
    let ca = root("Custom Source CA");
    let leaf = signed_by(leaf_params("custom.example.com", &["custom.example.com"]), &ca);
    let calls = Arc::new(AtomicUsize::new(0));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let mut store = TrustStore::new();
    store
        .add_custom_lookup(X509Lookup::custom(Box::new(CountingSource {
            cert_der: ca.cert.der().to_vec(),
            calls: Arc::clone(&calls),
            shutdowns: Arc::clone(&shutdowns),
        })))
        .unwrap();
    assert_eq!(store.count().unwrap(), 0);

    let provider = Provider::default();
    let result = provider
        .verify_chain(&store, &leaf.x509(), &[], None)
        .unwrap();
    assert!(result.is_valid, "{}", result);
    assert!(calls.load(Ordering::SeqCst) > 0);

    drop(store);
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}
