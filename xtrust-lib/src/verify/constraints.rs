//! Name Constraints (RFC 5280 Section 4.2.1.10).

use super::helpers::PresentedNames;
use super::{VerificationFailure, X509Error};
use crate::util;
use x509_parser::extensions::NameConstraints;
use x509_parser::prelude::GeneralName;

/// Upper bound on names × subtrees examined for one certificate.
pub(crate) const MAX_NC_WORK_FACTOR: usize = 65_536;

/// Check the names presented by the certificate at `depth` against a CA's
/// Name Constraints.
pub(crate) fn check_name_constraints(
    nc: &NameConstraints,
    names: &PresentedNames,
    subject: &str,
    depth: usize,
    ca_depth: usize,
) -> Vec<VerificationFailure> {
    let mut failures = Vec::new();
    let fail = |error: X509Error, message: String| {
        VerificationFailure::new(error, depth, subject, message)
    };

    let dns: Vec<String> = names.dns.iter().map(|n| n.to_ascii_lowercase()).collect();
    let emails: Vec<String> = names.emails.iter().map(|e| e.to_ascii_lowercase()).collect();

    let subtrees = nc.excluded_subtrees.as_ref().map_or(0, |s| s.len())
        + nc.permitted_subtrees.as_ref().map_or(0, |s| s.len());
    let total_names = dns.len() + emails.len() + names.ips.len();
    if total_names.saturating_mul(subtrees) > MAX_NC_WORK_FACTOR {
        failures.push(fail(
            X509Error::Unspecified,
            format!(
                "name constraints check exceeds resource limits ({} names x {} subtrees)",
                total_names, subtrees
            ),
        ));
        return failures;
    }

    if let Some(excluded) = &nc.excluded_subtrees {
        for subtree in excluded {
            match &subtree.base {
                GeneralName::DNSName(c) => {
                    let c = c.to_ascii_lowercase();
                    for name in dns.iter().filter(|n| dns_name_matches_constraint(n, &c)) {
                        failures.push(fail(
                            X509Error::ExcludedViolation,
                            format!(
                                "DNS name '{}' is excluded by constraint '{}' of CA at depth {}",
                                name, c, ca_depth
                            ),
                        ));
                    }
                }
                GeneralName::RFC822Name(c) => {
                    let c = c.to_ascii_lowercase();
                    for email in emails.iter().filter(|e| email_matches_constraint(e, &c)) {
                        failures.push(fail(
                            X509Error::ExcludedViolation,
                            format!(
                                "email '{}' is excluded by constraint '{}' of CA at depth {}",
                                email, c, ca_depth
                            ),
                        ));
                    }
                }
                GeneralName::IPAddress(c) => {
                    for ip in names.ips.iter().filter(|ip| ip_matches_constraint(ip, c)) {
                        failures.push(fail(
                            X509Error::ExcludedViolation,
                            format!(
                                "IP '{}' is excluded by a constraint of CA at depth {}",
                                util::format_ip_bytes(ip),
                                ca_depth
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    // A permitted subtree of a given name type restricts only names of that type.
    if let Some(permitted) = &nc.permitted_subtrees {
        let dns_constraints: Vec<String> = permitted
            .iter()
            .filter_map(|s| match &s.base {
                GeneralName::DNSName(c) => Some(c.to_ascii_lowercase()),
                _ => None,
            })
            .collect();
        if !dns_constraints.is_empty() {
            for name in &dns {
                if !dns_constraints.iter().any(|c| dns_name_matches_constraint(name, c)) {
                    failures.push(fail(
                        X509Error::PermittedViolation,
                        format!(
                            "DNS name '{}' is outside the permitted subtrees of CA at depth {}",
                            name, ca_depth
                        ),
                    ));
                }
            }
        }

        let email_constraints: Vec<String> = permitted
            .iter()
            .filter_map(|s| match &s.base {
                GeneralName::RFC822Name(c) => Some(c.to_ascii_lowercase()),
                _ => None,
            })
            .collect();
        if !email_constraints.is_empty() {
            for email in &emails {
                if !email_constraints.iter().any(|c| email_matches_constraint(email, c)) {
                    failures.push(fail(
                        X509Error::PermittedViolation,
                        format!(
                            "email '{}' is outside the permitted subtrees of CA at depth {}",
                            email, ca_depth
                        ),
                    ));
                }
            }
        }

        let ip_constraints: Vec<&[u8]> = permitted
            .iter()
            .filter_map(|s| match &s.base {
                GeneralName::IPAddress(bytes) => Some(*bytes),
                _ => None,
            })
            .collect();
        if !ip_constraints.is_empty() {
            for ip in &names.ips {
                if !ip_constraints.iter().any(|c| ip_matches_constraint(ip, c)) {
                    failures.push(fail(
                        X509Error::PermittedViolation,
                        format!(
                            "IP '{}' is outside the permitted subtrees of CA at depth {}",
                            util::format_ip_bytes(ip),
                            ca_depth
                        ),
                    ));
                }
            }
        }
    }

    failures
}

/// ".example.com" matches subdomains only; "example.com" matches the domain
/// and its subdomains.
pub(crate) fn dns_name_matches_constraint(name: &str, constraint: &str) -> bool {
    if constraint.is_empty() {
        return true;
    }
    if constraint.starts_with('.') {
        return name.ends_with(constraint);
    }
    name == constraint
        || (name.len() > constraint.len()
            && name.ends_with(constraint)
            && name.as_bytes().get(name.len() - constraint.len() - 1) == Some(&b'.'))
}

/// A constraint with '@' names one mailbox; otherwise it names a host
/// (exact) or, with a leading '.', any subdomain.
pub(crate) fn email_matches_constraint(email: &str, constraint: &str) -> bool {
    if constraint.is_empty() {
        return true;
    }
    if constraint.contains('@') {
        return email == constraint;
    }
    let Some((_, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if constraint.starts_with('.') {
        domain.ends_with(constraint)
    } else {
        domain == constraint
    }
}

/// `constraint` is address followed by netmask: 8 bytes for IPv4, 32 for IPv6.
pub(crate) fn ip_matches_constraint(ip: &[u8], constraint: &[u8]) -> bool {
    let len = ip.len();
    if constraint.len() != len * 2 || (len != 4 && len != 16) {
        return false;
    }
    let (addr, mask) = constraint.split_at(len);
    ip.iter()
        .zip(addr)
        .zip(mask)
        .all(|((ip, a), m)| (ip & m) == (a & m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_constraints() {
        assert!(dns_name_matches_constraint("host.example.com", "example.com"));
        assert!(dns_name_matches_constraint("example.com", "example.com"));
        assert!(!dns_name_matches_constraint("badexample.com", "example.com"));
        assert!(dns_name_matches_constraint("host.example.com", ".example.com"));
        assert!(!dns_name_matches_constraint("example.com", ".example.com"));
    }

    #[test]
    fn email_constraints() {
        assert!(email_matches_constraint("a@example.com", "example.com"));
        assert!(!email_matches_constraint("a@sub.example.com", "example.com"));
        assert!(email_matches_constraint("a@sub.example.com", ".example.com"));
        assert!(email_matches_constraint("a@example.com", "a@example.com"));
        assert!(!email_matches_constraint("b@example.com", "a@example.com"));
    }

    #[test]
    fn ip_constraints() {
        let net = [10, 0, 0, 0, 255, 0, 0, 0];
        assert!(ip_matches_constraint(&[10, 1, 2, 3], &net));
        assert!(!ip_matches_constraint(&[11, 1, 2, 3], &net));
        assert!(!ip_matches_constraint(&[10, 1, 2, 3], &[10, 0, 0, 0]));
    }
}
