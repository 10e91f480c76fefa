//! Verification parameters.
//!
//! A [`VerifyParam`] is the policy attached to one verification run: which
//! names the leaf must match, the intended purpose, the maximum chain depth,
//! behaviour flags, and the point in time used for validity checks.
//!
//! The `ssl_client` and `ssl_server` presets handed out by the
//! [`Provider`](crate::Provider) are shared and read-only; callers customise
//! them through [`VerifyParam::copy`].

use crate::handle::{EngineResource, Handle};
use crate::oid;
use crate::XtrustError;
use std::sync::Arc;
use time::OffsetDateTime;

/// Verification behaviour flags. Unknown bits are preserved as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VerifyFlags(u64);

impl VerifyFlags {
    pub const DEFAULT: VerifyFlags = VerifyFlags(0);
    /// Check the leaf certificate against the store's CRLs.
    pub const CRL_CHECK: VerifyFlags = VerifyFlags(0x4);
    /// Check every certificate in the chain against the store's CRLs.
    pub const CRL_CHECK_ALL: VerifyFlags = VerifyFlags(0x8);
    /// Enforce RFC 5280 rules that lenient verifiers skip.
    pub const X509_STRICT: VerifyFlags = VerifyFlags(0x20);
    /// Accept a chain anchored at any trusted certificate, not only a root.
    pub const PARTIAL_CHAIN: VerifyFlags = VerifyFlags(0x80000);
    pub const NO_CHECK_TIME: VerifyFlags = VerifyFlags(0x200000);

    pub const fn from_bits(bits: u64) -> Self {
        VerifyFlags(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: VerifyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: VerifyFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: VerifyFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for VerifyFlags {
    type Output = VerifyFlags;

    fn bitor(self, rhs: VerifyFlags) -> VerifyFlags {
        VerifyFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for VerifyFlags {
    fn bitor_assign(&mut self, rhs: VerifyFlags) {
        self.0 |= rhs.0;
    }
}

/// Intended use of the leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    SslClient = 1,
    SslServer = 2,
    NsSslServer = 3,
    SmimeSign = 4,
    SmimeEncrypt = 5,
    CrlSign = 6,
    Any = 7,
    OcspHelper = 8,
    TimestampSign = 9,
}

impl Purpose {
    pub fn from_code(code: i32) -> Result<Self, XtrustError> {
        Ok(match code {
            1 => Purpose::SslClient,
            2 => Purpose::SslServer,
            3 => Purpose::NsSslServer,
            4 => Purpose::SmimeSign,
            5 => Purpose::SmimeEncrypt,
            6 => Purpose::CrlSign,
            7 => Purpose::Any,
            8 => Purpose::OcspHelper,
            9 => Purpose::TimestampSign,
            other => {
                return Err(XtrustError::NotSupported(format!(
                    "purpose code {}",
                    other
                )))
            }
        })
    }

    /// The Extended Key Usage OID a leaf must carry (when it has an EKU
    /// extension at all) to serve this purpose. `None` for purposes that are
    /// not expressed through EKU.
    pub(crate) fn eku_oid(self) -> Option<&'static str> {
        match self {
            Purpose::SslClient => Some(oid::EKU_CLIENT_AUTH),
            Purpose::SslServer | Purpose::NsSslServer => Some(oid::EKU_SERVER_AUTH),
            Purpose::SmimeSign | Purpose::SmimeEncrypt => Some(oid::EKU_EMAIL_PROTECTION),
            Purpose::OcspHelper => Some(oid::EKU_OCSP_SIGNING),
            Purpose::TimestampSign => Some(oid::EKU_TIME_STAMPING),
            Purpose::CrlSign | Purpose::Any => None,
        }
    }
}

impl std::str::FromStr for Purpose {
    type Err = XtrustError;

    /// Accepts OpenSSL's `-purpose` names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "sslclient" => Purpose::SslClient,
            "sslserver" => Purpose::SslServer,
            "nssslserver" => Purpose::NsSslServer,
            "smimesign" => Purpose::SmimeSign,
            "smimeencrypt" => Purpose::SmimeEncrypt,
            "crlsign" => Purpose::CrlSign,
            "any" => Purpose::Any,
            "ocsphelper" => Purpose::OcspHelper,
            "timestampsign" => Purpose::TimestampSign,
            other => return Err(XtrustError::NotSupported(format!("purpose '{}'", other))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParamData {
    pub(crate) name: Option<String>,
    pub(crate) hosts: Vec<String>,
    pub(crate) email: Option<String>,
    pub(crate) ip: Option<String>,
    pub(crate) purpose: Option<Purpose>,
    /// Negative means unlimited.
    pub(crate) depth: i32,
    pub(crate) flags: VerifyFlags,
    pub(crate) time: Option<OffsetDateTime>,
}

impl ParamData {
    pub(crate) fn preset(name: &str, purpose: Purpose, depth: i32) -> Self {
        ParamData {
            name: Some(name.to_string()),
            hosts: Vec::new(),
            email: None,
            ip: None,
            purpose: Some(purpose),
            depth,
            flags: VerifyFlags::DEFAULT,
            time: None,
        }
    }
}

impl EngineResource for Arc<ParamData> {
    const KIND: &'static str = "verify-param";
}

/// Policy bag for one verification run.
#[derive(Debug)]
pub struct VerifyParam {
    handle: Handle<Arc<ParamData>>,
    read_only: bool,
}

impl VerifyParam {
    /// A writable parameter set built from scratch.
    ///
    /// Unlike the provider presets it has no name and no purpose, default
    /// flags, and depth -1 (unlimited). Nothing is shared with a preset, so
    /// mutating it never affects [`Provider::ssl_server_params`](crate::Provider::ssl_server_params).
    pub fn new() -> Self {
        VerifyParam {
            handle: Handle::new(Arc::new(ParamData {
                name: None,
                hosts: Vec::new(),
                email: None,
                ip: None,
                purpose: None,
                depth: -1,
                flags: VerifyFlags::DEFAULT,
                time: None,
            })),
            read_only: false,
        }
    }

    pub(crate) fn shared_preset(data: Arc<ParamData>) -> Self {
        VerifyParam {
            handle: Handle::new(data),
            read_only: true,
        }
    }

    pub(crate) fn data(&self) -> Result<&ParamData, XtrustError> {
        Ok(self.handle.get()?.as_ref())
    }

    fn data_mut(&mut self) -> Result<&mut ParamData, XtrustError> {
        if self.read_only {
            return Err(XtrustError::ReadOnly);
        }
        Ok(Arc::make_mut(self.handle.get_mut()?))
    }

    pub fn can_modify(&self) -> bool {
        !self.read_only
    }

    /// A writable deep copy. Mutating the copy never affects `self`.
    pub fn copy(&self) -> Result<VerifyParam, XtrustError> {
        let data = self.data()?.clone();
        Ok(VerifyParam {
            handle: Handle::new(Arc::new(data)),
            read_only: false,
        })
    }

    pub fn name(&self) -> Result<Option<String>, XtrustError> {
        Ok(self.data()?.name.clone())
    }

    /// Set the parameter set's own name (a label, not a host to match).
    pub fn set_name(&mut self, name: &str) -> Result<(), XtrustError> {
        self.data_mut()?.name = Some(name.to_string());
        Ok(())
    }

    /// Replace the whole set of acceptable hostnames with `host`.
    pub fn set_host(&mut self, host: &str) -> Result<(), XtrustError> {
        let data = self.data_mut()?;
        data.hosts.clear();
        data.hosts.push(host.to_string());
        Ok(())
    }

    /// Accept `host` in addition to the hostnames already set.
    pub fn add_host(&mut self, host: &str) -> Result<(), XtrustError> {
        self.data_mut()?.hosts.push(host.to_string());
        Ok(())
    }

    pub fn hosts(&self) -> Result<Vec<String>, XtrustError> {
        Ok(self.data()?.hosts.clone())
    }

    pub fn set_email(&mut self, email: &str) -> Result<(), XtrustError> {
        self.data_mut()?.email = Some(email.to_string());
        Ok(())
    }

    /// Set the IP address the leaf must carry, in textual form.
    pub fn set_ip(&mut self, ip: &str) -> Result<(), XtrustError> {
        if ip.parse::<std::net::IpAddr>().is_err() {
            return Err(XtrustError::NotSupported(format!("IP address '{}'", ip)));
        }
        self.data_mut()?.ip = Some(ip.to_string());
        Ok(())
    }

    pub fn flags(&self) -> Result<VerifyFlags, XtrustError> {
        Ok(self.data()?.flags)
    }

    pub fn set_flags(&mut self, flags: VerifyFlags) -> Result<(), XtrustError> {
        self.data_mut()?.flags = flags;
        Ok(())
    }

    pub fn purpose(&self) -> Result<Option<Purpose>, XtrustError> {
        Ok(self.data()?.purpose)
    }

    pub fn set_purpose(&mut self, purpose: Purpose) -> Result<(), XtrustError> {
        self.data_mut()?.purpose = Some(purpose);
        Ok(())
    }

    pub fn depth(&self) -> Result<i32, XtrustError> {
        Ok(self.data()?.depth)
    }

    /// Maximum number of intermediates between leaf and anchor. The value is
    /// passed through unchecked; negative means unlimited.
    pub fn set_depth(&mut self, depth: i32) -> Result<(), XtrustError> {
        self.data_mut()?.depth = depth;
        Ok(())
    }

    pub fn time(&self) -> Result<Option<OffsetDateTime>, XtrustError> {
        Ok(self.data()?.time)
    }

    /// Evaluate validity windows at `time` instead of now.
    pub fn set_time(&mut self, time: OffsetDateTime) -> Result<(), XtrustError> {
        self.data_mut()?.time = Some(time);
        Ok(())
    }

    pub fn clear_time(&mut self) -> Result<(), XtrustError> {
        self.data_mut()?.time = None;
        Ok(())
    }

    pub fn close(&mut self) {
        self.handle.close();
    }
}

impl Default for VerifyParam {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn preset() -> VerifyParam {
        VerifyParam::shared_preset(Arc::new(ParamData::preset(
            "ssl_server",
            Purpose::SslServer,
            100,
        )))
    }

    #[test]
    fn presets_reject_mutation() {
        let mut p = preset();
        assert!(!p.can_modify());
        assert!(matches!(p.set_depth(3), Err(XtrustError::ReadOnly)));
        assert!(matches!(p.add_host("a"), Err(XtrustError::ReadOnly)));
        assert_eq!(p.depth().unwrap(), 100);
    }

    #[test]
    fn scratch_params_are_writable_and_unlimited() {
        let mut p = VerifyParam::new();
        assert!(p.can_modify());
        assert_eq!(p.depth().unwrap(), -1);
        assert_eq!(p.purpose().unwrap(), None);
        assert!(p.hosts().unwrap().is_empty());
        assert_eq!(p.flags().unwrap(), VerifyFlags::DEFAULT);
        p.set_depth(4).unwrap();
        p.set_purpose(Purpose::SslClient).unwrap();
        assert_eq!(p.depth().unwrap(), 4);
        assert_eq!(p.purpose().unwrap(), Some(Purpose::SslClient));
    }

    #[test]
    fn copy_is_independent() {
        let original = preset();
        let mut copy = original.copy().unwrap();
        copy.set_depth(2).unwrap();
        copy.set_flags(VerifyFlags::X509_STRICT).unwrap();
        assert_eq!(copy.depth().unwrap(), 2);
        assert_eq!(original.depth().unwrap(), 100);
        assert_eq!(original.flags().unwrap(), VerifyFlags::DEFAULT);
    }

    #[test]
    fn set_host_replaces_add_host_appends() {
        let mut p = VerifyParam::new();
        p.add_host("old.example.com").unwrap();
        p.set_host("example.com").unwrap();
        p.add_host("alt.example.com").unwrap();
        assert_eq!(
            p.hosts().unwrap(),
            vec!["example.com".to_string(), "alt.example.com".to_string()]
        );
        p.set_host("only.example.com").unwrap();
        assert_eq!(p.hosts().unwrap(), vec!["only.example.com".to_string()]);
    }

    #[test]
    fn flags_keep_unknown_bits() {
        let mut flags = VerifyFlags::from_bits(0x1_0000_0000) | VerifyFlags::CRL_CHECK;
        assert!(flags.contains(VerifyFlags::CRL_CHECK));
        flags.remove(VerifyFlags::CRL_CHECK);
        assert_eq!(flags.bits(), 0x1_0000_0000);
    }

    #[test]
    fn invalid_ip_rejected() {
        let mut p = VerifyParam::new();
        assert!(p.set_ip("999.1.1.1").is_err());
        assert!(p.set_ip("::1").is_ok());
    }

    #[test]
    fn purpose_codes_and_names() {
        assert_eq!(Purpose::from_code(2).unwrap(), Purpose::SslServer);
        assert!(Purpose::from_code(0).is_err());
        assert_eq!("sslclient".parse::<Purpose>().unwrap(), Purpose::SslClient);
        assert_eq!(Purpose::SslServer.eku_oid(), Some(oid::EKU_SERVER_AUTH));
        assert_eq!(Purpose::Any.eku_oid(), None);
    }
}
