#![no_main]

use libfuzzer_sys::fuzz_target;
use xtrust_lib::{DigestAlgorithm, Provider, TrustStore, X509Format};

fuzz_target!(|data: &[u8]| {
    // Parsing must never panic, regardless of input.
    let provider = Provider::default();
    if let Ok(cert) = provider.x509_from_raw(data) {
        let _ = cert.subject_name_string();
        let _ = cert.issuer_name_string();
        let _ = cert.serial_number(true);
        let _ = cert.fingerprint(DigestAlgorithm::Sha256);
        let _ = cert.public_key_asn1();
        let _ = cert.public_key_parameters();
        let _ = cert.subject_name_hash();
        let _ = cert.raw_data(X509Format::Pem);
        if let Ok(key) = cert.public_key() {
            let _ = key.bytes(false);
        }
        if let Ok(name) = cert.subject_name() {
            if let Ok(count) = name.entry_count() {
                for i in 0..count {
                    let _ = name.entry(i);
                }
            }
        }
        let _ = cert.print(&mut std::io::sink());

        // A self-signed input anchors itself; anything else exercises the
        // missing-issuer paths.
        let mut store = TrustStore::new();
        if store.add_certificate(&cert).is_ok() {
            let _ = provider.verify_chain(&store, &cert, &[], None);
        }
    }
});
