//! Name lookups: pluggable sources of candidate issuer certificates.
//!
//! A [`TrustStore`](crate::TrustStore) consults its lookups whenever path
//! building needs a certificate by subject name. Three strategies ship with
//! the crate; anything else can implement [`LookupSource`].

use crate::certificate::X509;
use crate::collection::{parse_pem_certificates, CertificateCollection, TrustKind};
use crate::format::FileType;
use crate::handle::{EngineResource, Handle};
use crate::name::X509Name;
use crate::util;
use crate::XtrustError;
use std::path::{Path, PathBuf};

/// Lifecycle of an [`X509Lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    Created,
    Initialized,
    ShutDown,
}

/// A strategy that answers "which certificates have this subject?".
pub trait LookupSource: Send + Sync {
    /// Short strategy name for logs.
    fn kind(&self) -> &'static str;

    fn initialize(&mut self) -> Result<(), XtrustError> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    /// Every certificate whose subject equals `subject`. An empty result is
    /// "not found", not an error.
    fn find_by_subject(&self, subject: &X509Name) -> Result<Vec<X509>, XtrustError>;

    /// How certificates from this source weigh during path building.
    fn trust_kind(&self) -> TrustKind {
        TrustKind::Default
    }

    fn load_file(&mut self, path: &Path, _file_type: FileType) -> Result<usize, XtrustError> {
        Err(XtrustError::NotSupported(format!(
            "{} lookup cannot load file {}",
            self.kind(),
            path.display()
        )))
    }

    fn add_directory(&mut self, path: &Path, _file_type: FileType) -> Result<(), XtrustError> {
        Err(XtrustError::NotSupported(format!(
            "{} lookup cannot add directory {}",
            self.kind(),
            path.display()
        )))
    }
}

/// Certificates read eagerly from one or more files.
#[derive(Debug, Default)]
pub struct FileLookup {
    certs: Vec<X509>,
}

impl LookupSource for FileLookup {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn find_by_subject(&self, subject: &X509Name) -> Result<Vec<X509>, XtrustError> {
        matching(self.certs.iter(), subject)
    }

    fn load_file(&mut self, path: &Path, file_type: FileType) -> Result<usize, XtrustError> {
        let certs = load_certificates(path, file_type)?;
        let added = certs.len();
        self.certs.extend(certs);
        tracing::debug!(path = %path.display(), added, "file lookup loaded certificates");
        Ok(added)
    }
}

/// Certificates read from directories at lookup time.
///
/// Scans are non-recursive and read `.pem`, `.crt`, `.cer`, `.der` files and
/// OpenSSL hash-linked files (`XXXXXXXX.N`).
#[derive(Debug, Default)]
pub struct DirectoryLookup {
    dirs: Vec<(PathBuf, FileType)>,
}

impl LookupSource for DirectoryLookup {
    fn kind(&self) -> &'static str {
        "hash-dir"
    }

    fn find_by_subject(&self, subject: &X509Name) -> Result<Vec<X509>, XtrustError> {
        let wanted = subject.data()?.raw.as_slice();
        let mut found = Vec::new();
        for (dir, file_type) in &self.dirs {
            let entries = std::fs::read_dir(dir).map_err(|e| XtrustError::io_at(dir, e))?;
            for entry in entries {
                let path = entry.map_err(|e| XtrustError::io_at(dir, e))?.path();
                if !path.is_file() || !is_cert_file(&path) {
                    continue;
                }
                let certs = match load_certificates(&path, *file_type) {
                    Ok(certs) => certs,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable certificate file");
                        continue;
                    }
                };
                for cert in certs {
                    if cert.shared()?.subject.raw == wanted {
                        found.push(cert);
                    }
                }
            }
        }
        Ok(found)
    }

    fn add_directory(&mut self, path: &Path, file_type: FileType) -> Result<(), XtrustError> {
        let meta = std::fs::metadata(path).map_err(|e| XtrustError::io_at(path, e))?;
        if !meta.is_dir() {
            return Err(XtrustError::io_at(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }
        self.dirs.push((path.to_path_buf(), file_type));
        Ok(())
    }
}

/// An in-memory collection tagged with a [`TrustKind`].
#[derive(Debug)]
pub struct CollectionLookup {
    certs: Vec<X509>,
    kind: TrustKind,
}

impl CollectionLookup {
    pub fn new(collection: &CertificateCollection, kind: TrustKind) -> Result<Self, XtrustError> {
        let certs = collection
            .iter()
            .map(X509::copy)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CollectionLookup { certs, kind })
    }
}

impl LookupSource for CollectionLookup {
    fn kind(&self) -> &'static str {
        "collection"
    }

    fn find_by_subject(&self, subject: &X509Name) -> Result<Vec<X509>, XtrustError> {
        matching(self.certs.iter(), subject)
    }

    fn trust_kind(&self) -> TrustKind {
        self.kind
    }
}

fn matching<'a>(
    certs: impl Iterator<Item = &'a X509>,
    subject: &X509Name,
) -> Result<Vec<X509>, XtrustError> {
    let wanted = subject.data()?.raw.as_slice();
    let mut found = Vec::new();
    for cert in certs {
        if cert.shared()?.subject.raw == wanted {
            found.push(cert.copy()?);
        }
    }
    Ok(found)
}

pub(crate) struct LookupData {
    source: Box<dyn LookupSource>,
    state: LookupState,
}

impl EngineResource for LookupData {
    const KIND: &'static str = "x509-lookup";
}

/// A name lookup with an explicit initialize/shutdown lifecycle.
pub struct X509Lookup {
    handle: Handle<LookupData>,
}

impl std::fmt::Debug for X509Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("X509Lookup");
        match self.handle.get() {
            Ok(data) => d
                .field("kind", &data.source.kind())
                .field("state", &data.state),
            Err(_) => d.field("closed", &true),
        };
        d.finish()
    }
}

impl X509Lookup {
    pub fn file() -> Self {
        Self::custom(Box::<FileLookup>::default())
    }

    pub fn hash_dir() -> Self {
        Self::custom(Box::<DirectoryLookup>::default())
    }

    pub fn collection(
        collection: &CertificateCollection,
        kind: TrustKind,
    ) -> Result<Self, XtrustError> {
        Ok(Self::custom(Box::new(CollectionLookup::new(
            collection, kind,
        )?)))
    }

    pub fn custom(source: Box<dyn LookupSource>) -> Self {
        X509Lookup {
            handle: Handle::new(LookupData {
                source,
                state: LookupState::Created,
            }),
        }
    }

    pub fn state(&self) -> Result<LookupState, XtrustError> {
        Ok(self.handle.get()?.state)
    }

    pub fn initialize(&mut self) -> Result<(), XtrustError> {
        let data = self.handle.get_mut()?;
        if data.state == LookupState::Initialized {
            return Err(XtrustError::InvalidState(format!(
                "{} lookup is already initialized",
                data.source.kind()
            )));
        }
        data.source.initialize()?;
        data.state = LookupState::Initialized;
        Ok(())
    }

    pub fn shutdown(&mut self) -> Result<(), XtrustError> {
        let data = self.handle.get_mut()?;
        if data.state != LookupState::Initialized {
            return Err(XtrustError::InvalidState(format!(
                "{} lookup is not initialized",
                data.source.kind()
            )));
        }
        data.source.shutdown();
        data.state = LookupState::ShutDown;
        Ok(())
    }

    /// The first certificate whose subject equals `name`, if any.
    pub fn lookup_by_subject(&self, name: &X509Name) -> Result<Option<X509>, XtrustError> {
        Ok(self.candidates(name)?.into_iter().next())
    }

    pub(crate) fn candidates(&self, name: &X509Name) -> Result<Vec<X509>, XtrustError> {
        let data = self.handle.get()?;
        if data.state != LookupState::Initialized {
            return Err(XtrustError::InvalidState(format!(
                "{} lookup used before initialize()",
                data.source.kind()
            )));
        }
        data.source.find_by_subject(name)
    }

    pub(crate) fn trust_kind(&self) -> Result<TrustKind, XtrustError> {
        Ok(self.handle.get()?.source.trust_kind())
    }

    /// Load certificates from `path` into a file lookup.
    pub fn load_file(&mut self, path: &Path, file_type: FileType) -> Result<usize, XtrustError> {
        self.handle.get_mut()?.source.load_file(path, file_type)
    }

    /// Register `path` with a directory lookup.
    pub fn add_directory(&mut self, path: &Path, file_type: FileType) -> Result<(), XtrustError> {
        self.handle.get_mut()?.source.add_directory(path, file_type)
    }

    pub fn close(&mut self) {
        self.shutdown_if_initialized();
        self.handle.close();
    }

    fn shutdown_if_initialized(&mut self) {
        if let Ok(data) = self.handle.get_mut() {
            if data.state == LookupState::Initialized {
                data.source.shutdown();
                data.state = LookupState::ShutDown;
            }
        }
    }
}

impl Drop for X509Lookup {
    fn drop(&mut self) {
        self.shutdown_if_initialized();
    }
}

/// Whether `path` looks like a certificate file: `.pem`, `.crt`, `.cer`,
/// `.der`, or an OpenSSL hash link (`XXXXXXXX.N`).
pub(crate) fn is_cert_file(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    matches!(ext, "pem" | "crt" | "cer" | "der")
        || (ext.len() == 1 && ext.bytes().next().is_some_and(|b| b.is_ascii_digit()))
}

/// Read every certificate in `path` according to `file_type`.
pub(crate) fn load_certificates(path: &Path, file_type: FileType) -> Result<Vec<X509>, XtrustError> {
    let data = std::fs::read(path).map_err(|e| XtrustError::io_at(path, e))?;
    let pem = match file_type {
        FileType::Asn1 => false,
        FileType::Pem => true,
        FileType::Default => util::is_pem(&data),
    };
    if pem {
        parse_pem_certificates(&data)?
            .iter()
            .map(|der| X509::from_der(der))
            .collect()
    } else {
        Ok(vec![X509::from_der(&data)?])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        shutdowns: Arc<AtomicUsize>,
    }

    impl LookupSource for Counting {
        fn kind(&self) -> &'static str {
            "counting"
        }

        fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }

        fn find_by_subject(&self, _subject: &X509Name) -> Result<Vec<X509>, XtrustError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn lifecycle_misuse_is_invalid_state() {
        let mut lookup = X509Lookup::hash_dir();
        assert_eq!(lookup.state().unwrap(), LookupState::Created);
        assert!(matches!(
            lookup.shutdown(),
            Err(XtrustError::InvalidState(_))
        ));
        lookup.initialize().unwrap();
        assert!(matches!(
            lookup.initialize(),
            Err(XtrustError::InvalidState(_))
        ));
        lookup.shutdown().unwrap();
        assert_eq!(lookup.state().unwrap(), LookupState::ShutDown);
    }

    #[test]
    fn drop_shuts_down_initialized_lookup() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        {
            let mut lookup = X509Lookup::custom(Box::new(Counting {
                shutdowns: Arc::clone(&shutdowns),
            }));
            lookup.initialize().unwrap();
        }
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);

        // Not initialized: nothing to shut down.
        drop(X509Lookup::custom(Box::new(Counting {
            shutdowns: Arc::clone(&shutdowns),
        })));
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn file_lookup_rejects_directories() {
        let mut lookup = X509Lookup::file();
        assert!(matches!(
            lookup.add_directory(Path::new("/tmp"), FileType::Pem),
            Err(XtrustError::NotSupported(_))
        ));
    }

    #[test]
    fn missing_file_names_the_path() {
        let mut lookup = X509Lookup::file();
        let err = lookup
            .load_file(Path::new("/nonexistent/ca.pem"), FileType::Pem)
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ca.pem"));
    }

    #[test]
    fn cert_file_names() {
        assert!(is_cert_file(Path::new("ca.pem")));
        assert!(is_cert_file(Path::new("ca.der")));
        assert!(is_cert_file(Path::new("a1b2c3d4.0")));
        assert!(!is_cert_file(Path::new("README")));
        assert!(!is_cert_file(Path::new("key.p12")));
    }
}
