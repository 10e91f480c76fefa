//! Name extraction shared by the leaf and name-constraint checks.

use crate::oid;
use crate::util;
use x509_parser::prelude::*;

/// Self-issued certificates (subject == issuer) don't count toward depth
/// or path length, and are exempt from name constraints unless they are
/// the leaf.
pub(crate) fn is_self_issued(cert: &X509Certificate) -> bool {
    cert.subject().as_raw() == cert.issuer().as_raw()
}

/// Subject-identity names a certificate presents, gathered in one pass.
#[derive(Debug, Default)]
pub(crate) struct PresentedNames {
    pub(crate) dns: Vec<String>,
    /// RFC 822 names from the SAN plus subject emailAddress attributes.
    pub(crate) emails: Vec<String>,
    /// Raw SAN iPAddress octets.
    pub(crate) ips: Vec<Vec<u8>>,
    pub(crate) common_name: Option<String>,
}

impl PresentedNames {
    pub(crate) fn of(cert: &X509Certificate) -> Self {
        let mut names = PresentedNames::default();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for gn in &san.value.general_names {
                match gn {
                    GeneralName::DNSName(n) => names.dns.push(n.to_string()),
                    GeneralName::RFC822Name(e) => names.emails.push(e.to_string()),
                    GeneralName::IPAddress(ip) => names.ips.push(ip.to_vec()),
                    _ => {}
                }
            }
        }
        for rdn in cert.subject().iter() {
            for attr in rdn.iter() {
                let Ok(value) = attr.as_str() else { continue };
                match attr.attr_type().to_id_string().as_str() {
                    oid::COMMON_NAME if names.common_name.is_none() => {
                        names.common_name = Some(value.to_string())
                    }
                    oid::EMAIL_ADDRESS => names.emails.push(value.to_string()),
                    _ => {}
                }
            }
        }
        names
    }

    /// RFC 6125 host match; CN is consulted only without SAN DNS names.
    pub(crate) fn matches_host(&self, host: &str) -> bool {
        util::verify_hostname_match(&self.dns, self.common_name.as_deref(), host)
    }

    pub(crate) fn matches_email(&self, email: &str) -> bool {
        util::verify_email_match(&self.emails, email)
    }

    pub(crate) fn matches_ip(&self, ip: &str) -> bool {
        let ips: Vec<String> = self.ips.iter().map(|b| util::format_ip_bytes(b)).collect();
        util::verify_ip_match(&ips, ip)
    }

    /// The names shown in a hostname-mismatch message.
    pub(crate) fn host_names_for_display(&self) -> Vec<String> {
        if self.dns.is_empty() {
            self.common_name.iter().cloned().collect()
        } else {
            self.dns.clone()
        }
    }
}

/// Short human-readable identifier: CN, then O, then OU, else "Unknown".
pub(crate) fn short_name(cert: &X509Certificate) -> String {
    for wanted in [oid::COMMON_NAME, oid::ORGANIZATION, oid::ORGANIZATIONAL_UNIT] {
        let found = cert
            .subject()
            .iter_attributes()
            .find(|attr| attr.attr_type().to_id_string() == wanted)
            .and_then(|attr| attr.as_str().ok());
        if let Some(value) = found {
            return value.to_string();
        }
    }
    "Unknown".to_string()
}

/// Whether the verifier understands extension `oid`. Unknown critical
/// extensions fail validation.
pub(crate) fn is_known_extension(oid: &str) -> bool {
    matches!(
        oid,
        oid::EXT_SUBJECT_KEY_ID
            | oid::EXT_KEY_USAGE
            | oid::EXT_SUBJECT_ALT_NAME
            | oid::EXT_ISSUER_ALT_NAME
            | oid::EXT_BASIC_CONSTRAINTS
            | oid::EXT_NAME_CONSTRAINTS
            | oid::EXT_CRL_DISTRIBUTION_POINTS
            | oid::EXT_CERTIFICATE_POLICIES
            | oid::EXT_POLICY_MAPPINGS
            | oid::EXT_AUTHORITY_KEY_ID
            | oid::EXT_POLICY_CONSTRAINTS
            | oid::EXT_EXTENDED_KEY_USAGE
            | oid::EXT_FRESHEST_CRL
            | oid::EXT_INHIBIT_ANY_POLICY
            | oid::EXT_AUTHORITY_INFO_ACCESS
            | oid::EXT_SUBJECT_INFO_ACCESS
            | oid::EXT_TLS_FEATURE
            | oid::EXT_SCT_LIST
            | oid::EXT_CT_POISON
            | oid::EXT_NETSCAPE_CERT_TYPE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cn_only_used_without_san_dns() {
        let names = PresentedNames {
            dns: vec![],
            common_name: Some("example.com".into()),
            ..Default::default()
        };
        assert!(names.matches_host("example.com"));
        assert_eq!(names.host_names_for_display(), vec!["example.com"]);

        let names = PresentedNames {
            dns: vec!["www.example.com".into()],
            common_name: Some("example.com".into()),
            ..Default::default()
        };
        assert!(!names.matches_host("example.com"));
        assert!(names.matches_host("www.example.com"));
    }

    #[test]
    fn ip_match_uses_san_octets() {
        let names = PresentedNames {
            ips: vec![vec![127, 0, 0, 1]],
            ..Default::default()
        };
        assert!(names.matches_ip("127.0.0.1"));
        assert!(!names.matches_ip("10.0.0.1"));
    }

    #[test]
    fn critical_extension_recognition() {
        assert!(is_known_extension(oid::EXT_BASIC_CONSTRAINTS));
        assert!(!is_known_extension("1.2.3.4.5"));
    }
}
