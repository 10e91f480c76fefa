//! PKCS#12 containers.

use crate::certificate::X509;
use crate::handle::{EngineResource, Handle};
use crate::key::{Key, KeyAlgorithm};
use crate::XtrustError;
use openssl::pkey::Id;

#[derive(Default)]
pub(crate) struct ContainerData {
    imported: bool,
    /// Leaf first, then CA certificates in container order.
    certs: Vec<X509>,
    key: Option<Key>,
}

impl EngineResource for ContainerData {
    const KIND: &'static str = "pkcs12";
}

/// A PKCS#12 bundle of certificates and an optional private key.
pub struct Pkcs12 {
    handle: Handle<ContainerData>,
}

impl std::fmt::Debug for Pkcs12 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("Pkcs12");
        match self.handle.get() {
            Ok(data) => d
                .field("imported", &data.imported)
                .field("certs", &data.certs.len())
                .field("key", &data.key.is_some()),
            Err(_) => d.field("closed", &true),
        };
        d.finish()
    }
}

impl Pkcs12 {
    pub fn new() -> Self {
        Pkcs12 {
            handle: Handle::new(ContainerData::default()),
        }
    }

    /// Decode a DER PKCS#12 blob protected by `password`.
    ///
    /// A failed import leaves the container empty and un-imported.
    pub fn import(&mut self, buffer: &[u8], password: &str) -> Result<(), XtrustError> {
        if self.handle.get()?.imported {
            return Err(XtrustError::InvalidState(
                "container has already been imported".into(),
            ));
        }

        let pkcs12 = openssl::pkcs12::Pkcs12::from_der(buffer)
            .map_err(|e| XtrustError::Pkcs12(format!("malformed container: {}", e)))?;
        let parsed = pkcs12
            .parse2(password)
            .map_err(|e| XtrustError::Pkcs12(format!("bad password or corrupt container: {}", e)))?;

        let mut certs = Vec::new();
        if let Some(cert) = &parsed.cert {
            certs.push(openssl_to_x509(cert)?);
        }
        if let Some(chain) = &parsed.ca {
            for cert in chain.iter() {
                certs.push(openssl_to_x509(cert)?);
            }
        }

        let key = match &parsed.pkey {
            Some(pkey) => {
                let id = pkey.id();
                let algorithm = if id == Id::RSA {
                    KeyAlgorithm::Rsa
                } else if id == Id::EC {
                    KeyAlgorithm::Ec
                } else if id == Id::ED25519 {
                    KeyAlgorithm::Ed25519
                } else if id == Id::ED448 {
                    KeyAlgorithm::Ed448
                } else {
                    KeyAlgorithm::Other(format!("pkey id {}", id.as_raw()))
                };
                let public_der = pkey
                    .public_key_to_der()
                    .map_err(|e| XtrustError::Pkcs12(format!("public key export: {}", e)))?;
                let private_der = pkey
                    .private_key_to_pkcs8()
                    .map_err(|e| XtrustError::Pkcs12(format!("private key export: {}", e)))?;
                Some(Key::from_parts(algorithm, public_der, Some(private_der)))
            }
            None => None,
        };

        tracing::debug!(
            certs = certs.len(),
            has_key = key.is_some(),
            "imported PKCS#12 container"
        );

        let data = self.handle.get_mut()?;
        data.certs = certs;
        data.key = key;
        data.imported = true;
        Ok(())
    }

    fn imported(&self) -> Result<&ContainerData, XtrustError> {
        let data = self.handle.get()?;
        if !data.imported {
            return Err(XtrustError::InvalidState(
                "container has not been imported".into(),
            ));
        }
        Ok(data)
    }

    pub fn has_private_key(&self) -> Result<bool, XtrustError> {
        Ok(self.imported()?.key.is_some())
    }

    /// A copy of the container's private key.
    pub fn private_key(&self) -> Result<Key, XtrustError> {
        match &self.imported()?.key {
            Some(key) => key.copy(),
            None => Err(XtrustError::NoPrivateKey),
        }
    }

    /// Number of certificates held, including ones added after import.
    pub fn count(&self) -> Result<usize, XtrustError> {
        Ok(self.handle.get()?.certs.len())
    }

    /// The certificate at `index`: the leaf first, then CA certificates.
    pub fn certificate(&self, index: usize) -> Result<X509, XtrustError> {
        let data = self.handle.get()?;
        let count = data.certs.len();
        data.certs
            .get(index)
            .ok_or_else(|| {
                XtrustError::InvalidState(format!(
                    "certificate index {} out of range ({} held)",
                    index, count
                ))
            })?
            .copy()
    }

    pub fn add_certificate(&mut self, cert: &X509) -> Result<(), XtrustError> {
        let cert = cert.copy()?;
        self.handle.get_mut()?.certs.push(cert);
        Ok(())
    }

    pub fn close(&mut self) {
        self.handle.close();
    }
}

impl Default for Pkcs12 {
    fn default() -> Self {
        Self::new()
    }
}

fn openssl_to_x509(cert: &openssl::x509::X509Ref) -> Result<X509, XtrustError> {
    let der = cert
        .to_der()
        .map_err(|e| XtrustError::Pkcs12(format!("certificate export: {}", e)))?;
    X509::from_der(&der)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn queries_before_import_fail_fast() {
        let p = Pkcs12::new();
        assert!(matches!(
            p.has_private_key(),
            Err(XtrustError::InvalidState(_))
        ));
        assert!(matches!(p.private_key(), Err(XtrustError::InvalidState(_))));
        assert_eq!(p.count().unwrap(), 0);
    }

    #[test]
    fn garbage_import_leaves_container_unimported() {
        let mut p = Pkcs12::new();
        assert!(matches!(
            p.import(b"definitely not pkcs12", "pw"),
            Err(XtrustError::Pkcs12(_))
        ));
        assert!(matches!(
            p.has_private_key(),
            Err(XtrustError::InvalidState(_))
        ));
    }

    #[test]
    fn closed_container_reports_closed() {
        let mut p = Pkcs12::new();
        p.close();
        assert!(matches!(p.count(), Err(XtrustError::Closed { .. })));
    }
}
