//! Individual verification checks.
//!
//! Each check appends every failure it finds; none stops at the first.

use super::chain::{is_self_signed, Trust};
use super::constraints::check_name_constraints;
use super::crl::{revocation_status, CrlStatus};
use super::helpers::{is_known_extension, is_self_issued, PresentedNames};
use super::{VerificationFailure, X509Error};
use crate::oid;
use crate::params::{ParamData, Purpose, VerifyFlags};
use std::collections::HashSet;
use ::time::OffsetDateTime;
use x509_parser::prelude::*;

/// The built chain, parsed once, with display subjects alongside.
pub(crate) struct ChainView<'a> {
    pub(crate) parsed: Vec<X509Certificate<'a>>,
    pub(crate) subjects: Vec<String>,
    pub(crate) anchored: bool,
}

impl<'a> ChainView<'a> {
    fn failure(&self, error: X509Error, depth: usize, message: String) -> VerificationFailure {
        let subject = self.subjects.get(depth).map(String::as_str).unwrap_or("");
        VerificationFailure::new(error, depth, subject, message)
    }

    /// Issuer positions: everything above the leaf.
    fn issuers(&self) -> impl Iterator<Item = (usize, &X509Certificate<'a>)> + '_ {
        self.parsed.iter().enumerate().skip(1)
    }
}

/// Non-self-issued intermediates beyond `depth` fail with `CertChainTooLong`.
/// The leaf and the trust anchor don't count; a negative depth is unlimited.
pub(crate) fn check_depth(view: &ChainView, depth: i32, out: &mut Vec<VerificationFailure>) {
    let Ok(limit) = usize::try_from(depth) else {
        return;
    };
    let end = if view.anchored {
        view.parsed.len().saturating_sub(1)
    } else {
        view.parsed.len()
    };
    let mut counted = 0usize;
    for (i, cert) in view.parsed.iter().enumerate().take(end).skip(1) {
        if is_self_issued(cert) {
            continue;
        }
        counted += 1;
        if counted > limit {
            out.push(view.failure(
                X509Error::CertChainTooLong,
                i,
                format!("chain exceeds maximum depth of {}", limit),
            ));
            return;
        }
    }
}

pub(crate) fn check_time_validity(
    view: &ChainView,
    now: OffsetDateTime,
    out: &mut Vec<VerificationFailure>,
) {
    for (i, cert) in view.parsed.iter().enumerate() {
        let validity = cert.validity();
        if now < validity.not_before.to_datetime() {
            out.push(view.failure(
                X509Error::CertNotYetValid,
                i,
                format!("not valid before {}", validity.not_before),
            ));
        }
        if now > validity.not_after.to_datetime() {
            out.push(view.failure(
                X509Error::CertHasExpired,
                i,
                format!("expired at {}", validity.not_after),
            ));
        }
    }
}

/// Every issuer must be a CA and honour its pathLenConstraint. v1/v2
/// issuers without extensions are accepted as CAs.
pub(crate) fn check_basic_constraints(view: &ChainView, out: &mut Vec<VerificationFailure>) {
    for (i, cert) in view.issuers() {
        match cert.basic_constraints().ok().flatten().map(|bc| bc.value) {
            Some(bc) => {
                if !bc.ca {
                    out.push(view.failure(
                        X509Error::InvalidCa,
                        i,
                        "not a CA but used as issuer".into(),
                    ));
                }
                if let Some(pathlen) = bc.path_len_constraint {
                    let below = view
                        .parsed
                        .iter()
                        .take(i)
                        .skip(1)
                        .filter(|c| !is_self_issued(c))
                        .count();
                    if below > pathlen as usize {
                        out.push(view.failure(
                            X509Error::PathLengthExceeded,
                            i,
                            format!("pathlen={} but {} intermediates below", pathlen, below),
                        ));
                    }
                }
            }
            None if cert.version().0 >= 2 => {
                out.push(view.failure(
                    X509Error::InvalidCa,
                    i,
                    "no basic constraints but used as issuer".into(),
                ));
            }
            None => {}
        }
    }
}

pub(crate) fn check_key_cert_sign(view: &ChainView, out: &mut Vec<VerificationFailure>) {
    for (i, cert) in view.issuers() {
        if let Ok(Some(ku)) = cert.key_usage() {
            if !ku.value.key_cert_sign() {
                out.push(view.failure(
                    X509Error::KeyUsageNoCertsign,
                    i,
                    "key usage lacks keyCertSign".into(),
                ));
            }
        }
    }
}

pub(crate) fn check_critical_extensions(view: &ChainView, out: &mut Vec<VerificationFailure>) {
    for (i, cert) in view.parsed.iter().enumerate() {
        for ext in cert.extensions() {
            if ext.critical && !is_known_extension(&ext.oid.to_id_string()) {
                out.push(view.failure(
                    X509Error::UnhandledCriticalExtension,
                    i,
                    format!("unrecognized critical extension {}", ext.oid),
                ));
            }
        }
    }
}

/// Each certificate must be signed by the next one up.
pub(crate) fn check_signatures(view: &ChainView, out: &mut Vec<VerificationFailure>) {
    for (i, (child, parent)) in view.parsed.iter().zip(view.parsed.iter().skip(1)).enumerate() {
        if let Err(e) = child.verify_signature(Some(parent.public_key())) {
            out.push(view.failure(
                X509Error::CertSignatureFailure,
                i,
                format!("signature does not verify with issuer key: {}", e),
            ));
        }
    }
}

/// Explain why the chain is not anchored, and flag explicitly rejected
/// certificates wherever they sit.
pub(crate) fn check_trust(
    view: &ChainView,
    trust: &[Trust],
    out: &mut Vec<VerificationFailure>,
) {
    for (i, t) in trust.iter().enumerate() {
        if *t == Trust::Rejected {
            out.push(view.failure(
                X509Error::CertRejected,
                i,
                "explicitly distrusted for this purpose".into(),
            ));
        }
    }
    if view.anchored {
        return;
    }
    let Some(last) = view.parsed.last() else {
        return;
    };
    let depth = view.parsed.len() - 1;
    let last_trust = trust.get(depth).copied().unwrap_or(Trust::NotInStore);

    if is_self_signed(last) {
        match last_trust {
            Trust::Neutral => out.push(view.failure(
                X509Error::CertUntrusted,
                depth,
                "root is in the store but not trusted for this purpose".into(),
            )),
            Trust::NotInStore if depth == 0 => out.push(view.failure(
                X509Error::DepthZeroSelfSignedCert,
                depth,
                "self-signed certificate is not in the trust store".into(),
            )),
            Trust::NotInStore => out.push(view.failure(
                X509Error::SelfSignedCertInChain,
                depth,
                "root is not in the trust store".into(),
            )),
            Trust::Trusted | Trust::Rejected => {}
        }
        return;
    }

    let issuer = last.issuer().to_string();
    if last_trust == Trust::NotInStore {
        out.push(view.failure(
            X509Error::UnableToGetIssuerCertLocally,
            depth,
            format!("unable to find issuer: {}", issuer),
        ));
        if depth == 0 {
            out.push(view.failure(
                X509Error::UnableToVerifyLeafSignature,
                depth,
                "no issuer available to verify the leaf".into(),
            ));
        }
    } else {
        out.push(view.failure(
            X509Error::UnableToGetIssuerCert,
            depth,
            format!("trusted certificate's issuer not found: {}", issuer),
        ));
    }
}

/// When the leaf has an Extended Key Usage extension it must allow the
/// requested purpose.
pub(crate) fn check_purpose(
    view: &ChainView,
    purpose: Option<Purpose>,
    out: &mut Vec<VerificationFailure>,
) {
    let Some(purpose) = purpose else { return };
    let Some(required) = purpose.eku_oid() else {
        return;
    };
    let Some(leaf) = view.parsed.first() else {
        return;
    };
    let Ok(Some(eku)) = leaf.extended_key_usage() else {
        return;
    };
    let eku = &eku.value;
    let allowed = eku.any
        || match required {
            oid::EKU_SERVER_AUTH => {
                eku.server_auth
                    || (purpose == Purpose::NsSslServer
                        && eku.other.iter().any(|o| {
                            let o = o.to_id_string();
                            o == oid::EKU_NS_SERVER_GATED_CRYPTO
                                || o == oid::EKU_MS_SERVER_GATED_CRYPTO
                        }))
            }
            oid::EKU_CLIENT_AUTH => eku.client_auth,
            oid::EKU_EMAIL_PROTECTION => eku.email_protection,
            oid::EKU_TIME_STAMPING => eku.time_stamping,
            oid::EKU_OCSP_SIGNING => eku.ocsp_signing,
            other => eku.other.iter().any(|o| o.to_id_string() == other),
        };
    if !allowed {
        out.push(view.failure(
            X509Error::InvalidPurpose,
            0,
            format!("extended key usage does not allow {:?}", purpose),
        ));
    }
}

/// Hosts (any listed host may match), email, and IP against the leaf.
pub(crate) fn check_leaf_identity(
    view: &ChainView,
    param: &ParamData,
    out: &mut Vec<VerificationFailure>,
) {
    let Some(leaf) = view.parsed.first() else {
        return;
    };
    let names = PresentedNames::of(leaf);

    if !param.hosts.is_empty() && !param.hosts.iter().any(|h| names.matches_host(h)) {
        out.push(view.failure(
            X509Error::HostnameMismatch,
            0,
            format!(
                "none of [{}] matches certificate names [{}]",
                param.hosts.join(", "),
                names.host_names_for_display().join(", ")
            ),
        ));
    }
    if let Some(email) = &param.email {
        if !names.matches_email(email) {
            out.push(view.failure(
                X509Error::EmailMismatch,
                0,
                format!("email '{}' does not match certificate", email),
            ));
        }
    }
    if let Some(ip) = &param.ip {
        if !names.matches_ip(ip) {
            out.push(view.failure(
                X509Error::IpAddressMismatch,
                0,
                format!("IP address '{}' does not match certificate", ip),
            ));
        }
    }
}

/// Apply every CA's Name Constraints to the certificates below it.
/// Self-issued intermediates are exempt.
pub(crate) fn check_chain_name_constraints(view: &ChainView, out: &mut Vec<VerificationFailure>) {
    for (ca_depth, ca) in view.issuers() {
        let Ok(Some(nc)) = ca.name_constraints() else {
            continue;
        };
        for (depth, child) in view.parsed.iter().enumerate().take(ca_depth) {
            if depth > 0 && is_self_issued(child) {
                continue;
            }
            let subject = view.subjects.get(depth).map(String::as_str).unwrap_or("");
            out.extend(check_name_constraints(
                &nc.value,
                &PresentedNames::of(child),
                subject,
                depth,
                ca_depth,
            ));
        }
    }
}

/// RFC 5280 profile rules enforced only under `X509_STRICT`.
pub(crate) fn check_strict(view: &ChainView, out: &mut Vec<VerificationFailure>) {
    for (i, cert) in view.parsed.iter().enumerate() {
        let is_leaf = i == 0;
        let self_signed = is_self_issued(cert);

        let mut seen = HashSet::new();
        if let Some(dup) = cert
            .extensions()
            .iter()
            .find(|ext| !seen.insert(ext.oid.to_id_string()))
        {
            out.push(view.failure(
                X509Error::InvalidExtension,
                i,
                format!("duplicate extension {}", dup.oid),
            ));
        }

        let find = |wanted: &str| {
            cert.extensions()
                .iter()
                .find(|e| e.oid.to_id_string() == wanted)
        };

        match find(oid::EXT_AUTHORITY_KEY_ID) {
            None if !self_signed => out.push(view.failure(
                X509Error::MissingAuthorityKeyIdentifier,
                i,
                "missing Authority Key Identifier".into(),
            )),
            Some(ext) if ext.critical => out.push(view.failure(
                X509Error::AuthorityKeyIdentifierCritical,
                i,
                "Authority Key Identifier marked critical".into(),
            )),
            _ => {}
        }

        match find(oid::EXT_SUBJECT_KEY_ID) {
            None if !is_leaf => out.push(view.failure(
                X509Error::MissingSubjectKeyIdentifier,
                i,
                "CA without Subject Key Identifier".into(),
            )),
            Some(ext) if ext.critical => out.push(view.failure(
                X509Error::SubjectKeyIdentifierCritical,
                i,
                "Subject Key Identifier marked critical".into(),
            )),
            _ => {}
        }

        if !is_leaf {
            if let Some(ext) = find(oid::EXT_BASIC_CONSTRAINTS) {
                if !ext.critical {
                    out.push(view.failure(
                        X509Error::CaBasicConstraintsNotCritical,
                        i,
                        "CA basic constraints not marked critical".into(),
                    ));
                }
            }
        }

        if let Some(ext) = find(oid::EXT_NAME_CONSTRAINTS) {
            if is_leaf || !ext.critical {
                out.push(view.failure(
                    X509Error::InvalidExtension,
                    i,
                    "Name Constraints must be critical and only appear in CA certificates"
                        .into(),
                ));
            }
        }

        let serial = cert.raw_serial();
        if serial.len() > 20 || serial.iter().all(|&b| b == 0) {
            out.push(view.failure(
                X509Error::InvalidExtension,
                i,
                "serial number must be positive and at most 20 octets".into(),
            ));
        }

        if cert.subject().as_raw().len() <= 2 {
            if let Some(ext) = find(oid::EXT_SUBJECT_ALT_NAME) {
                if !ext.critical {
                    out.push(view.failure(
                        X509Error::EmptySubjectSanNotCritical,
                        i,
                        "empty subject with non-critical SAN".into(),
                    ));
                }
            }
        }
    }
}

/// Revocation under `CRL_CHECK` (leaf) or `CRL_CHECK_ALL` (every
/// certificate except a self-signed anchor).
pub(crate) fn check_revocation(
    view: &ChainView,
    flags: VerifyFlags,
    crls: &[Vec<u8>],
    now: OffsetDateTime,
    out: &mut Vec<VerificationFailure>,
) {
    let count = if flags.contains(VerifyFlags::CRL_CHECK_ALL) {
        view.parsed.len()
    } else if flags.contains(VerifyFlags::CRL_CHECK) {
        1
    } else {
        return;
    };

    for (i, cert) in view.parsed.iter().enumerate().take(count) {
        if i > 0 && i + 1 == view.parsed.len() && is_self_signed(cert) {
            continue;
        }
        let issuer = view.parsed.get(i + 1);
        match revocation_status(cert, issuer, crls, now) {
            CrlStatus::Good => {}
            CrlStatus::Revoked { reason } => out.push(view.failure(
                X509Error::CertRevoked,
                i,
                format!("revoked (reason: {})", reason),
            )),
            CrlStatus::Unavailable(error) => {
                out.push(view.failure(error, i, "no usable CRL from issuer".into()))
            }
        }
    }
}
