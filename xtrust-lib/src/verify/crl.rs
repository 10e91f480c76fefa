//! CRL-based revocation checking.

use super::X509Error;
use ::time::OffsetDateTime;
use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;

/// Outcome of looking a certificate up in the store's CRLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CrlStatus {
    Good,
    Revoked { reason: &'static str },
    /// No usable CRL from the certificate's issuer.
    Unavailable(X509Error),
}

/// RFC 5280 Section 5.3.1 reason code names.
pub(crate) fn format_crl_reason(code: u8) -> &'static str {
    match code {
        1 => "keyCompromise",
        2 => "cACompromise",
        3 => "affiliationChanged",
        4 => "superseded",
        5 => "cessationOfOperation",
        6 => "certificateHold",
        8 => "removeFromCRL",
        9 => "privilegeWithdrawn",
        10 => "aACompromise",
        _ => "unspecified",
    }
}

/// Check `cert` against every CRL issued by its issuer.
///
/// A CRL only counts when it is current at `now` and, if `issuer` is known,
/// carries a valid signature from it. When no CRL counts, the most specific
/// reason is reported: bad signature, then expired or not yet valid, then
/// missing.
pub(crate) fn revocation_status(
    cert: &X509Certificate,
    issuer: Option<&X509Certificate>,
    crl_ders: &[Vec<u8>],
    now: OffsetDateTime,
) -> CrlStatus {
    let mut problem = X509Error::UnableToGetCrl;
    let serial = cert.raw_serial();

    for der in crl_ders {
        let Ok((_, crl)) = CertificateRevocationList::from_der(der) else {
            continue;
        };
        if crl.issuer().as_raw() != cert.issuer().as_raw() {
            continue;
        }
        if let Some(issuer) = issuer {
            if crl.verify_signature(issuer.public_key()).is_err() {
                problem = X509Error::CrlSignatureFailure;
                continue;
            }
        }
        if now < crl.last_update().to_datetime() {
            if problem == X509Error::UnableToGetCrl {
                problem = X509Error::CrlNotYetValid;
            }
            continue;
        }
        if crl.next_update().is_some_and(|next| now > next.to_datetime()) {
            if problem == X509Error::UnableToGetCrl {
                problem = X509Error::CrlHasExpired;
            }
            continue;
        }

        return match crl
            .iter_revoked_certificates()
            .find(|revoked| revoked.raw_serial() == serial)
        {
            Some(revoked) => CrlStatus::Revoked {
                reason: revoked
                    .reason_code()
                    .map(|(_, rc)| format_crl_reason(rc.0))
                    .unwrap_or("unspecified"),
            },
            None => CrlStatus::Good,
        };
    }

    CrlStatus::Unavailable(problem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_names() {
        assert_eq!(format_crl_reason(1), "keyCompromise");
        assert_eq!(format_crl_reason(7), "unspecified");
    }
}
