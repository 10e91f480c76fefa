//! Asymmetric keys extracted from certificates or PKCS#12 containers.

use crate::handle::{EngineResource, Handle};
use crate::oid;
use crate::XtrustError;
use x509_parser::prelude::FromDer;
use x509_parser::x509::SubjectPublicKeyInfo;

/// Key algorithm family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    Ec,
    Ed25519,
    Ed448,
    /// Any other algorithm, by dotted OID.
    Other(String),
}

impl KeyAlgorithm {
    pub(crate) fn from_oid(oid_str: &str) -> Self {
        match oid_str {
            oid::RSA_ENCRYPTION => KeyAlgorithm::Rsa,
            oid::EC_PUBLIC_KEY => KeyAlgorithm::Ec,
            oid::ED25519 => KeyAlgorithm::Ed25519,
            oid::ED448 => KeyAlgorithm::Ed448,
            other => KeyAlgorithm::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyAlgorithm::Rsa => write!(f, "RSA"),
            KeyAlgorithm::Ec => write!(f, "EC"),
            KeyAlgorithm::Ed25519 => write!(f, "Ed25519"),
            KeyAlgorithm::Ed448 => write!(f, "Ed448"),
            KeyAlgorithm::Other(oid) => write!(f, "{}", oid),
        }
    }
}

#[derive(Clone)]
pub(crate) struct KeyData {
    algorithm: KeyAlgorithm,
    /// DER SubjectPublicKeyInfo.
    public_der: Vec<u8>,
    /// DER PKCS#8 PrivateKeyInfo, when the key carries private material.
    private_der: Option<Vec<u8>>,
}

impl EngineResource for KeyData {
    const KIND: &'static str = "key";
}

/// An asymmetric key, public-only or with private material.
pub struct Key {
    handle: Handle<KeyData>,
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        let mut d = f.debug_struct("Key");
        if let Ok(data) = self.handle.get() {
            d.field("algorithm", &data.algorithm)
                .field("private", &data.private_der.is_some());
        } else {
            d.field("closed", &true);
        }
        d.finish()
    }
}

impl Key {
    /// Build a public key from a DER SubjectPublicKeyInfo.
    pub fn from_public_der(spki_der: &[u8]) -> Result<Self, XtrustError> {
        let (_, spki) = SubjectPublicKeyInfo::from_der(spki_der)
            .map_err(|e| XtrustError::DerError(format!("public key: {}", e)))?;
        let algorithm = KeyAlgorithm::from_oid(&spki.algorithm.algorithm.to_id_string());
        Ok(Self::from_parts(algorithm, spki_der.to_vec(), None))
    }

    pub(crate) fn from_parts(
        algorithm: KeyAlgorithm,
        public_der: Vec<u8>,
        private_der: Option<Vec<u8>>,
    ) -> Self {
        Key {
            handle: Handle::new(KeyData {
                algorithm,
                public_der,
                private_der,
            }),
        }
    }

    pub fn is_rsa(&self) -> Result<bool, XtrustError> {
        Ok(self.handle.get()?.algorithm == KeyAlgorithm::Rsa)
    }

    pub fn algorithm(&self) -> Result<KeyAlgorithm, XtrustError> {
        Ok(self.handle.get()?.algorithm.clone())
    }

    pub fn has_private_key(&self) -> Result<bool, XtrustError> {
        Ok(self.handle.get()?.private_der.is_some())
    }

    /// Export the key.
    ///
    /// With `include_private` and private material present, returns the
    /// PKCS#8 PrivateKeyInfo DER. Otherwise returns the SubjectPublicKeyInfo
    /// DER. Requesting private bytes from a public-only key is not an error:
    /// the public bytes come back instead.
    pub fn bytes(&self, include_private: bool) -> Result<Vec<u8>, XtrustError> {
        let data = self.handle.get()?;
        match (&data.private_der, include_private) {
            (Some(private), true) => Ok(private.clone()),
            (None, true) => {
                tracing::debug!(
                    algorithm = %data.algorithm,
                    "private bytes requested from a public-only key; returning public bytes"
                );
                Ok(data.public_der.clone())
            }
            (_, false) => Ok(data.public_der.clone()),
        }
    }

    /// A new, independently owned key with the same material.
    pub fn copy(&self) -> Result<Key, XtrustError> {
        Ok(Key {
            handle: Handle::new(self.handle.get()?.clone()),
        })
    }

    pub fn close(&mut self) {
        self.handle.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn public_only_key_degrades_to_public_bytes() {
        let key = Key::from_parts(KeyAlgorithm::Ec, vec![1, 2, 3], None);
        assert_eq!(key.bytes(true).unwrap(), vec![1, 2, 3]);
        assert_eq!(key.bytes(false).unwrap(), vec![1, 2, 3]);
        assert!(!key.has_private_key().unwrap());
    }

    #[test]
    fn private_bytes_need_explicit_request() {
        let key = Key::from_parts(KeyAlgorithm::Rsa, vec![1], Some(vec![9, 9]));
        assert_eq!(key.bytes(false).unwrap(), vec![1]);
        assert_eq!(key.bytes(true).unwrap(), vec![9, 9]);
        assert!(key.is_rsa().unwrap());
    }

    #[test]
    fn copy_survives_closing_the_original() {
        let mut key = Key::from_parts(KeyAlgorithm::Ed25519, vec![7], None);
        let copy = key.copy().unwrap();
        key.close();
        assert!(key.is_rsa().is_err());
        assert_eq!(copy.algorithm().unwrap(), KeyAlgorithm::Ed25519);
    }

    #[test]
    fn debug_hides_material() {
        let key = Key::from_parts(KeyAlgorithm::Rsa, vec![1], Some(vec![0xAA]));
        let dbg = format!("{:?}", key);
        assert!(dbg.contains("Rsa"));
        assert!(!dbg.contains("170"));
    }

    #[test]
    fn algorithm_from_oid() {
        assert_eq!(KeyAlgorithm::from_oid(oid::RSA_ENCRYPTION), KeyAlgorithm::Rsa);
        assert_eq!(
            KeyAlgorithm::from_oid("1.2.3"),
            KeyAlgorithm::Other("1.2.3".into())
        );
    }
}
