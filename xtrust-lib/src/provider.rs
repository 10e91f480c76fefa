//! Factory for every object in the crate.
//!
//! A [`Provider`] is an explicit value rather than process-wide state. It
//! carries a [`ProviderConfig`] that seeds new trust stores and owns the
//! shared read-only verification presets.

use crate::certificate::X509;
use crate::collection::{parse_pem_certificates, CertificateCollection};
use crate::format::X509Format;
use crate::params::{ParamData, Purpose, VerifyParam};
use crate::pkcs12::Pkcs12;
use crate::store::TrustStore;
use crate::verify::{StoreContext, VerificationResult};
use crate::XtrustError;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

fn default_depth() -> i32 {
    100
}

/// How a provider seeds trust stores and presets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// CA bundle loaded into every store from [`Provider::create_store`].
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// CA directory registered as a lookup on every new store.
    #[serde(default)]
    pub ca_dir: Option<PathBuf>,

    /// Also add the platform's trusted roots.
    #[serde(default)]
    pub use_system_roots: bool,

    /// Depth limit carried by the `ssl_client` and `ssl_server` presets.
    #[serde(default = "default_depth")]
    pub default_depth: i32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            ca_file: None,
            ca_dir: None,
            use_system_roots: false,
            default_depth: default_depth(),
        }
    }
}

impl ProviderConfig {
    /// Read `SSL_CERT_FILE` and `SSL_CERT_DIR`, the variables OpenSSL honours.
    pub fn from_env() -> Self {
        ProviderConfig {
            ca_file: std::env::var_os("SSL_CERT_FILE").map(PathBuf::from),
            ca_dir: std::env::var_os("SSL_CERT_DIR").map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, XtrustError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Creates certificates, stores, containers, and verification contexts.
#[derive(Debug)]
pub struct Provider {
    config: ProviderConfig,
    ssl_client: Arc<ParamData>,
    ssl_server: Arc<ParamData>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new(ProviderConfig::default())
    }
}

impl Provider {
    pub fn new(config: ProviderConfig) -> Self {
        let depth = config.default_depth;
        Provider {
            ssl_client: Arc::new(ParamData::preset("ssl_client", Purpose::SslClient, depth)),
            ssl_server: Arc::new(ParamData::preset("ssl_server", Purpose::SslServer, depth)),
            config,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn x509_from_data(&self, data: &[u8], format: X509Format) -> Result<X509, XtrustError> {
        X509::from_data(data, format)
    }

    /// Parse a certificate whose encoding is guessed from its first bytes.
    pub fn x509_from_raw(&self, data: &[u8]) -> Result<X509, XtrustError> {
        X509::from_data(data, X509Format::detect(data))
    }

    /// Every `CERTIFICATE` block of a PEM bundle, in file order.
    pub fn x509_chain_from_pem(&self, pem: &[u8]) -> Result<Vec<X509>, XtrustError> {
        parse_pem_certificates(pem)?
            .iter()
            .map(|der| X509::from_der(der))
            .collect()
    }

    /// A trust store seeded from the configured CA file, CA directory, and
    /// (when enabled) the system roots.
    pub fn create_store(&self) -> Result<TrustStore, XtrustError> {
        let mut store = TrustStore::new();
        store.load_locations(self.config.ca_file.as_deref(), self.config.ca_dir.as_deref())?;
        if self.config.use_system_roots {
            store.add_trusted_roots()?;
        }
        tracing::debug!(count = store.count()?, "created trust store");
        Ok(store)
    }

    pub fn create_pkcs12(&self) -> Pkcs12 {
        Pkcs12::new()
    }

    pub fn create_collection(&self) -> CertificateCollection {
        CertificateCollection::new()
    }

    /// Shared read-only preset; call `copy()` on it for a writable version.
    pub fn ssl_client_params(&self) -> VerifyParam {
        VerifyParam::shared_preset(Arc::clone(&self.ssl_client))
    }

    pub fn ssl_server_params(&self) -> VerifyParam {
        VerifyParam::shared_preset(Arc::clone(&self.ssl_server))
    }

    pub fn create_store_context<'s>(
        &self,
        store: &'s TrustStore,
        leaf: &X509,
        untrusted: &[X509],
    ) -> Result<StoreContext<'s>, XtrustError> {
        StoreContext::new(store, leaf, untrusted)
    }

    /// Verify `leaf` in one call. Without `param` the `ssl_server` preset
    /// is used.
    pub fn verify_chain(
        &self,
        store: &TrustStore,
        leaf: &X509,
        untrusted: &[X509],
        param: Option<&VerifyParam>,
    ) -> Result<VerificationResult, XtrustError> {
        let mut ctx = self.create_store_context(store, leaf, untrusted)?;
        match param {
            Some(param) => ctx.set_verify_param(param)?,
            None => ctx.set_verify_param(&self.ssl_server_params())?,
        }
        ctx.verify()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn json_config_fills_defaults() {
        let config = ProviderConfig::from_json(r#"{"ca_dir": "/etc/ssl/certs"}"#).unwrap();
        assert_eq!(config.ca_dir, Some(PathBuf::from("/etc/ssl/certs")));
        assert_eq!(config.ca_file, None);
        assert!(!config.use_system_roots);
        assert_eq!(config.default_depth, 100);
    }

    #[test]
    fn malformed_json_config_is_an_error() {
        assert!(matches!(
            ProviderConfig::from_json("{"),
            Err(XtrustError::Json(_))
        ));
    }

    #[test]
    fn presets_carry_purpose_and_depth() {
        let provider = Provider::new(ProviderConfig {
            default_depth: 7,
            ..ProviderConfig::default()
        });
        let client = provider.ssl_client_params();
        let server = provider.ssl_server_params();
        assert_eq!(client.purpose().unwrap(), Some(Purpose::SslClient));
        assert_eq!(server.purpose().unwrap(), Some(Purpose::SslServer));
        assert_eq!(server.depth().unwrap(), 7);
        assert!(!server.can_modify());
    }

    #[test]
    fn presets_are_shared() {
        let provider = Provider::default();
        let a = provider.ssl_server_params();
        let b = provider.ssl_server_params();
        assert!(std::ptr::eq(a.data().unwrap(), b.data().unwrap()));
        assert!(std::ptr::eq(a.data().unwrap(), provider.ssl_server.as_ref()));
    }

    #[test]
    fn empty_config_creates_empty_store() {
        let store = Provider::default().create_store().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
