//! Trust stores: trusted certificates, CRLs, and name lookups.
//!
//! System roots are discovered the way OpenSSL finds them, using
//! `openssl-probe` and the `SSL_CERT_FILE` / `SSL_CERT_DIR` environment
//! variables.

use crate::certificate::{CertData, X509};
use crate::collection::{parse_pem_certificates, parse_pem_crls, CertificateCollection, TrustKind};
use crate::format::{FileType, X509Format};
use crate::handle::{EngineResource, Handle};
use crate::lookup::{is_cert_file, load_certificates, X509Lookup};
use crate::name::{NameData, X509Name};
use crate::XtrustError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use x509_parser::prelude::FromDer;

/// Well-known CA bundle file paths, in order of preference.
pub(crate) const KNOWN_CA_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt", // Debian/Ubuntu
    "/etc/pki/tls/certs/ca-bundle.crt",   // RHEL/CentOS/Fedora
    "/etc/ssl/ca-bundle.pem",             // openSUSE
    "/etc/ssl/cert.pem",                  // macOS, Alpine
];

pub(crate) const KNOWN_CA_DIR_PATHS: &[&str] = &["/etc/ssl/certs"];

#[derive(Default)]
pub(crate) struct StoreData {
    trusted: Vec<Arc<CertData>>,
    crls: Vec<Vec<u8>>,
    lookups: Vec<X509Lookup>,
}

impl EngineResource for StoreData {
    const KIND: &'static str = "x509-store";
}

/// A candidate issuer found while building a path.
pub(crate) struct Candidate {
    pub(crate) cert: Arc<CertData>,
    pub(crate) kind: TrustKind,
}

/// Trusted certificates plus the lookups consulted during path building.
///
/// Entries are never deduplicated: adding the same certificate twice counts
/// twice. There is no removal API; lookups are shut down with the store.
pub struct TrustStore {
    handle: Handle<StoreData>,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("TrustStore");
        match self.handle.get() {
            Ok(data) => d
                .field("count", &data.trusted.len())
                .field("crls", &data.crls.len())
                .field("lookups", &data.lookups.len()),
            Err(_) => d.field("closed", &true),
        };
        d.finish()
    }
}

impl TrustStore {
    pub fn new() -> Self {
        TrustStore {
            handle: Handle::new(StoreData::default()),
        }
    }

    fn data(&self) -> Result<&StoreData, XtrustError> {
        self.handle.get()
    }

    fn data_mut(&mut self) -> Result<&mut StoreData, XtrustError> {
        self.handle.get_mut()
    }

    /// Load a CA file and/or register a CA directory.
    ///
    /// The file is read eagerly: its certificates become trusted and its
    /// `X509 CRL` blocks are kept for revocation checks. The directory is
    /// registered as a directory lookup and scanned on demand. Passing
    /// neither is a no-op.
    ///
    /// A file that yields no certificate and no CRL is a parse error.
    /// Single bad entries in an otherwise usable bundle are skipped.
    pub fn load_locations(
        &mut self,
        file: Option<&Path>,
        dir: Option<&Path>,
    ) -> Result<(), XtrustError> {
        if let Some(file) = file {
            let data = std::fs::read(file).map_err(|e| XtrustError::io_at(file, e))?;
            if !crate::util::is_pem(&data) {
                let cert = X509::from_der(&data).map_err(|e| {
                    XtrustError::ParseError(format!("{}: {}", file.display(), e))
                })?;
                self.add_certificate(&cert)?;
                tracing::debug!(path = %file.display(), "loaded DER CA file");
                return self.register_dir(dir);
            }

            let crls = parse_pem_crls(&data);
            let certs = match parse_pem_certificates(&data) {
                Ok(certs) => certs,
                // A CRL-only file is fine.
                Err(_) if !crls.is_empty() => Vec::new(),
                Err(e) => {
                    return Err(XtrustError::PemError(format!("{}: {}", file.display(), e)))
                }
            };
            let mut parsed = Vec::with_capacity(certs.len());
            let mut last_error = None;
            for der in &certs {
                match X509::from_der(der) {
                    Ok(cert) => parsed.push(cert),
                    Err(e) => {
                        tracing::warn!(path = %file.display(), error = %e, "skipping unparsable bundle entry");
                        last_error = Some(e);
                    }
                }
            }
            if parsed.is_empty() && crls.is_empty() {
                let reason = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no certificates".into());
                return Err(XtrustError::ParseError(format!(
                    "{}: no usable certificate or CRL ({})",
                    file.display(),
                    reason
                )));
            }
            let added = parsed.len();
            for cert in &parsed {
                self.add_certificate(cert)?;
            }
            let crl_count = crls.len();
            self.data_mut()?.crls.extend(crls);
            tracing::debug!(path = %file.display(), added, crls = crl_count, "loaded CA file");
        }
        self.register_dir(dir)
    }

    fn register_dir(&mut self, dir: Option<&Path>) -> Result<(), XtrustError> {
        match dir {
            Some(dir) => self.add_directory_lookup_typed(dir, FileType::Default),
            None => Ok(()),
        }
    }

    /// Add the platform's trusted roots.
    ///
    /// Search order:
    /// 1. `SSL_CERT_FILE` environment variable
    /// 2. Path discovered by `openssl-probe`
    /// 3. Well-known bundle file paths
    /// 4. `SSL_CERT_DIR` environment variable
    /// 5. Directory discovered by `openssl-probe`
    /// 6. Well-known certificate directories
    pub fn add_trusted_roots(&mut self) -> Result<(), XtrustError> {
        if let Some(bundle_path) = find_system_ca_bundle() {
            if let Ok(data) = std::fs::read(&bundle_path) {
                let added = self.add_pem_bundle(&data)?;
                if added > 0 {
                    tracing::debug!(path = %bundle_path.display(), added, "added system roots");
                    return Ok(());
                }
            }
        }

        let probe = openssl_probe::probe();
        let dir_candidates = std::env::var("SSL_CERT_DIR")
            .ok()
            .into_iter()
            .chain(
                probe
                    .cert_dir
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned()),
            )
            .chain(KNOWN_CA_DIR_PATHS.iter().map(|s| (*s).to_string()));

        for dir in dir_candidates {
            let dir_path = Path::new(&dir);
            if let Ok(added) = self.add_pem_directory(dir_path) {
                if added > 0 {
                    tracing::debug!(path = %dir_path.display(), added, "added system roots");
                    return Ok(());
                }
            }
        }

        Err(missing_system_store())
    }

    /// Trust `cert`. The count grows by one even for a duplicate.
    pub fn add_certificate(&mut self, cert: &X509) -> Result<(), XtrustError> {
        let shared = cert.shared()?;
        self.data_mut()?.trusted.push(shared);
        Ok(())
    }

    /// Add a DER-encoded CRL for revocation checks.
    pub fn add_crl(&mut self, der: &[u8]) -> Result<(), XtrustError> {
        x509_parser::revocation_list::CertificateRevocationList::from_der(der)
            .map_err(|e| XtrustError::DerError(format!("CRL: {}", e)))?;
        self.data_mut()?.crls.push(der.to_vec());
        Ok(())
    }

    /// Number of directly trusted certificates. Lookups are not counted.
    pub fn count(&self) -> Result<usize, XtrustError> {
        Ok(self.data()?.trusted.len())
    }

    /// Consult `collection` during path building, weighted by `kind`.
    pub fn add_lookup(
        &mut self,
        collection: &CertificateCollection,
        kind: TrustKind,
    ) -> Result<(), XtrustError> {
        let lookup = X509Lookup::collection(collection, kind)?;
        self.add_custom_lookup(lookup)
    }

    pub fn add_directory_lookup(
        &mut self,
        dir: &Path,
        format: X509Format,
    ) -> Result<(), XtrustError> {
        self.add_directory_lookup_typed(dir, FileType::from_format(format))
    }

    fn add_directory_lookup_typed(
        &mut self,
        dir: &Path,
        file_type: FileType,
    ) -> Result<(), XtrustError> {
        let mut lookup = X509Lookup::hash_dir();
        lookup.add_directory(dir, file_type)?;
        self.add_custom_lookup(lookup)
    }

    pub fn add_file_lookup(&mut self, file: &Path, format: X509Format) -> Result<(), XtrustError> {
        let mut lookup = X509Lookup::file();
        lookup.load_file(file, FileType::from_format(format))?;
        self.add_custom_lookup(lookup)
    }

    /// Attach an arbitrary lookup. It is initialized here if the caller has
    /// not done so already.
    pub fn add_custom_lookup(&mut self, mut lookup: X509Lookup) -> Result<(), XtrustError> {
        if lookup.state()? != crate::lookup::LookupState::Initialized {
            lookup.initialize()?;
        }
        self.data_mut()?.lookups.push(lookup);
        Ok(())
    }

    pub fn close(&mut self) {
        self.handle.close();
    }

    /// Add all certificates from a PEM bundle, skipping entries that fail to
    /// parse. Returns how many were added.
    pub(crate) fn add_pem_bundle(&mut self, pem_data: &[u8]) -> Result<usize, XtrustError> {
        let mut added = 0;
        for der in parse_pem_certificates(pem_data)? {
            match X509::from_der(&der) {
                Ok(cert) => {
                    self.add_certificate(&cert)?;
                    added += 1;
                }
                Err(e) => tracing::warn!(error = %e, "skipping unparsable bundle entry"),
            }
        }
        Ok(added)
    }

    /// Eagerly load every certificate file in `dir`.
    fn add_pem_directory(&mut self, dir: &Path) -> Result<usize, XtrustError> {
        let mut total = 0;
        let entries = std::fs::read_dir(dir).map_err(|e| XtrustError::io_at(dir, e))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_cert_file(&path) {
                if let Ok(certs) = load_certificates(&path, FileType::Default) {
                    for cert in certs {
                        self.add_certificate(&cert)?;
                        total += 1;
                    }
                }
            }
        }
        Ok(total)
    }

    /// Every trusted or looked-up certificate with subject `subject`.
    /// A failing lookup is logged and skipped.
    pub(crate) fn candidates(&self, subject: &NameData) -> Result<Vec<Candidate>, XtrustError> {
        let data = self.data()?;
        let mut found: Vec<Candidate> = data
            .trusted
            .iter()
            .filter(|c| c.subject.raw == subject.raw)
            .map(|c| Candidate {
                cert: Arc::clone(c),
                kind: TrustKind::Default,
            })
            .collect();

        if !data.lookups.is_empty() {
            let mut name = X509Name::from_data(subject.clone());
            for lookup in &data.lookups {
                let kind = lookup.trust_kind()?;
                match lookup.candidates(&name) {
                    Ok(certs) => {
                        for cert in certs {
                            found.push(Candidate {
                                cert: cert.shared()?,
                                kind,
                            });
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "lookup failed; skipping"),
                }
            }
            name.close();
        }
        Ok(found)
    }

    /// The trust weights under which `cert` itself appears in the store.
    /// Empty when the certificate is not a trust anchor.
    pub(crate) fn anchor_kinds(&self, cert: &CertData) -> Result<Vec<TrustKind>, XtrustError> {
        Ok(self
            .candidates(&cert.subject)?
            .into_iter()
            .filter(|c| c.cert.der == cert.der)
            .map(|c| c.kind)
            .collect())
    }

    pub(crate) fn crls(&self) -> Result<&[Vec<u8>], XtrustError> {
        Ok(&self.data()?.crls)
    }
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_system_store() -> XtrustError {
    XtrustError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "no system trust store found",
    ))
}

/// Find the system CA bundle path (same location OpenSSL uses).
///
/// Checks `SSL_CERT_FILE`, then the path discovered by `openssl-probe`,
/// then well-known bundle paths.
pub fn find_system_ca_bundle() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SSL_CERT_FILE") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Some(p);
        }
    }

    let probe = openssl_probe::probe();
    if let Some(file) = probe.cert_file {
        let path = PathBuf::from(&file);
        if path.exists() {
            return Some(path);
        }
    }

    KNOWN_CA_BUNDLE_PATHS
        .iter()
        .map(|candidate| PathBuf::from(*candidate))
        .find(|p| p.exists())
}
