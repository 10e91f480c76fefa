//! Shared encoding and name-matching utilities.

use crate::oid;
use base64::Engine;
use std::net::IpAddr;

/// Format bytes as colon-separated uppercase hex (e.g., "AB:CD:EF").
pub(crate) fn hex_colon_upper(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Encode bytes as base64 with PEM-style 64-character line wrapping.
pub(crate) fn base64_wrap(data: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    encoded
        .as_bytes()
        .chunks(64)
        .filter_map(|c| std::str::from_utf8(c).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap DER bytes in a PEM block with the given label.
pub(crate) fn pem_encode(label: &str, der: &[u8]) -> String {
    format!(
        "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
        base64_wrap(der)
    )
}

pub(crate) fn is_pem(input: &[u8]) -> bool {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    input
        .get(start..)
        .is_some_and(|rest| rest.starts_with(b"-----BEGIN"))
}

/// Short attribute name for a DN attribute OID, or the dotted OID itself.
pub(crate) fn oid_short_name(oid_str: &str) -> String {
    match oid_str {
        oid::COMMON_NAME => "CN",
        oid::SURNAME => "SN",
        oid::SERIAL_NUMBER => "serialNumber",
        oid::COUNTRY => "C",
        oid::LOCALITY => "L",
        oid::STATE_OR_PROVINCE => "ST",
        oid::STREET_ADDRESS => "street",
        oid::ORGANIZATION => "O",
        oid::ORGANIZATIONAL_UNIT => "OU",
        oid::TITLE => "title",
        oid::POSTAL_CODE => "postalCode",
        oid::GIVEN_NAME => "GN",
        oid::EMAIL_ADDRESS => "emailAddress",
        oid::DOMAIN_COMPONENT => "DC",
        other => return other.to_string(),
    }
    .to_string()
}

pub(crate) fn format_ip_bytes(bytes: &[u8]) -> String {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        std::net::Ipv4Addr::from(octets).to_string()
    } else if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        std::net::Ipv6Addr::from(octets).to_string()
    } else {
        hex::encode(bytes)
    }
}

/// Match `hostname` against SAN DNS names, falling back to the CN only when
/// the certificate carries no SAN DNS names. Wildcards follow RFC 6125: a
/// single leftmost `*` label matching exactly one label.
pub(crate) fn verify_hostname_match(
    dns_names: &[String],
    cn: Option<&str>,
    hostname: &str,
) -> bool {
    let host = hostname.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    if dns_names.is_empty() {
        return cn.is_some_and(|cn| dns_pattern_matches(cn, &host));
    }
    dns_names.iter().any(|name| dns_pattern_matches(name, &host))
}

fn dns_pattern_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        // Wildcards never cover a bare public suffix such as "*.com".
        if !suffix.contains('.') {
            return false;
        }
        match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        }
    } else {
        pattern == host
    }
}

/// Case-insensitive email match; the local part is compared exactly.
pub(crate) fn verify_email_match(emails: &[String], email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    emails.iter().any(|candidate| match candidate.rsplit_once('@') {
        Some((c_local, c_domain)) => c_local == local && c_domain.eq_ignore_ascii_case(domain),
        None => false,
    })
}

/// Compare an IP address string against SAN IP entries semantically, so that
/// different textual forms of the same IPv6 address match.
pub(crate) fn verify_ip_match(san_ips: &[String], ip: &str) -> bool {
    let Ok(wanted) = ip.parse::<IpAddr>() else {
        return false;
    };
    san_ips
        .iter()
        .filter_map(|s| s.parse::<IpAddr>().ok())
        .any(|candidate| candidate == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_and_case_insensitive_host() {
        let dns = names(&["Example.COM"]);
        assert!(verify_hostname_match(&dns, None, "example.com"));
        assert!(verify_hostname_match(&dns, None, "example.com."));
        assert!(!verify_hostname_match(&dns, None, "www.example.com"));
    }

    #[test]
    fn wildcard_covers_one_label() {
        let dns = names(&["*.example.com"]);
        assert!(verify_hostname_match(&dns, None, "www.example.com"));
        assert!(!verify_hostname_match(&dns, None, "a.b.example.com"));
        assert!(!verify_hostname_match(&dns, None, "example.com"));
    }

    #[test]
    fn wildcard_on_public_suffix_rejected() {
        assert!(!verify_hostname_match(&names(&["*.com"]), None, "example.com"));
    }

    #[test]
    fn cn_fallback_only_without_san() {
        assert!(verify_hostname_match(&[], Some("example.com"), "example.com"));
        assert!(!verify_hostname_match(
            &names(&["other.com"]),
            Some("example.com"),
            "example.com"
        ));
    }

    #[test]
    fn email_domain_case_insensitive() {
        let emails = names(&["user@Example.com"]);
        assert!(verify_email_match(&emails, "user@example.COM"));
        assert!(!verify_email_match(&emails, "User@example.com"));
        assert!(!verify_email_match(&emails, "not-an-email"));
    }

    #[test]
    fn ipv6_textual_forms_match() {
        let ips = names(&["2001:db8::1"]);
        assert!(verify_ip_match(&ips, "2001:0db8:0000:0000:0000:0000:0000:0001"));
        assert!(!verify_ip_match(&ips, "2001:db8::2"));
        assert!(!verify_ip_match(&ips, "garbage"));
    }

    #[test]
    fn pem_detection() {
        assert!(is_pem(b"  -----BEGIN CERTIFICATE-----"));
        assert!(!is_pem(b"\x30\x82"));
        assert!(!is_pem(b""));
    }

    #[test]
    fn pem_encode_wraps_lines() {
        let pem = pem_encode("CERTIFICATE", &[0u8; 100]);
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.ends_with("-----END CERTIFICATE-----\n"));
        assert!(pem.lines().all(|l| l.len() <= 64));
    }
}
