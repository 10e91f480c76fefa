//! Certificate path verification against a trust store.
//!
//! A [`StoreContext`] binds a leaf certificate, an optional pool of
//! untrusted intermediates, a [`TrustStore`], and a [`VerifyParam`]. Running
//! [`StoreContext::verify`] builds a path to a trust anchor and then checks
//! signatures, validity windows, basic constraints, key usage, name
//! constraints, purpose, identity (host, email, IP), and, when requested,
//! revocation. Every failure is collected as a [`VerificationFailure`]; a run
//! never stops at the first problem.

mod chain;
mod checks;
mod constraints;
mod crl;
mod error;
mod helpers;

pub use error::X509Error;

use crate::certificate::{CertData, X509};
use crate::params::{ParamData, VerifyFlags, VerifyParam};
use crate::store::TrustStore;
use crate::util;
use crate::XtrustError;
use chain::{build_chain, Trust};
use checks::ChainView;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

/// One reason a chain failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationFailure {
    pub error: X509Error,
    /// Position in the chain (0 = leaf).
    pub depth: usize,
    /// One-line subject of the certificate at `depth`.
    pub subject: String,
    pub message: String,
}

impl VerificationFailure {
    pub(crate) fn new(error: X509Error, depth: usize, subject: &str, message: String) -> Self {
        VerificationFailure {
            error,
            depth,
            subject: subject.to_string(),
            message,
        }
    }
}

impl std::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "error {} at depth {} ({}): {}: {}",
            self.error.code(),
            self.depth,
            self.subject,
            self.error,
            self.message
        )
    }
}

/// Information about a certificate in the built chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainCertInfo {
    /// Position in chain (0 = leaf).
    pub depth: usize,
    pub subject: String,
    pub issuer: String,
    /// Short human-readable name derived from CN, O, or OU.
    pub short_name: String,
    /// Serial number as colon-separated hex.
    pub serial: String,
}

/// Outcome of a verification run.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    /// The chain that was built, leaf first. When no trust anchor was
    /// reached this is the longest partial path found.
    pub chain: Vec<ChainCertInfo>,
    /// Every failure found (empty when `is_valid`).
    pub errors: Vec<VerificationFailure>,
}

impl VerificationResult {
    pub fn has_error(&self, error: X509Error) -> bool {
        self.errors.iter().any(|f| f.error == error)
    }

    pub fn first_error(&self) -> Option<X509Error> {
        self.errors.first().map(|f| f.error)
    }
}

impl std::fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // short_name, serial, OK|FAIL[, reasons]
        if let Some(leaf) = self.chain.first() {
            write!(f, "{}, {}, ", leaf.short_name, leaf.serial)?;
        }
        if self.is_valid {
            write!(f, "OK")
        } else {
            write!(f, "FAIL")?;
            let reasons: Vec<String> = self
                .errors
                .iter()
                .map(|e| format!("{} at depth {}", e.error, e.depth))
                .collect();
            if !reasons.is_empty() {
                write!(f, ", {}", reasons.join("; "))?;
            }
            Ok(())
        }
    }
}

type VerifyCallback = Box<dyn Fn(&X509, usize) -> bool + Send + Sync>;

/// One verification run: leaf, untrusted pool, store, and parameters.
pub struct StoreContext<'s> {
    store: &'s TrustStore,
    leaf: Arc<CertData>,
    untrusted: Vec<Arc<CertData>>,
    param: Option<ParamData>,
    callback: Option<VerifyCallback>,
}

impl std::fmt::Debug for StoreContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreContext")
            .field("store", self.store)
            .field("untrusted", &self.untrusted.len())
            .field("param", &self.param)
            .finish()
    }
}

impl<'s> StoreContext<'s> {
    pub fn new(store: &'s TrustStore, leaf: &X509, untrusted: &[X509]) -> Result<Self, XtrustError> {
        Ok(StoreContext {
            store,
            leaf: leaf.shared()?,
            untrusted: untrusted
                .iter()
                .map(X509::shared)
                .collect::<Result<Vec<_>, _>>()?,
            param: None,
            callback: None,
        })
    }

    /// Use a snapshot of `param` for this run. Later changes to `param` do
    /// not affect the context.
    pub fn set_verify_param(&mut self, param: &VerifyParam) -> Result<(), XtrustError> {
        self.param = Some(param.data()?.clone());
        Ok(())
    }

    /// Application check run on every certificate of the built chain; a
    /// `false` return records [`X509Error::ApplicationVerification`].
    pub fn set_verify_callback<F>(&mut self, callback: F)
    where
        F: Fn(&X509, usize) -> bool + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn verify(&self) -> Result<VerificationResult, XtrustError> {
        let default_param;
        let param = match &self.param {
            Some(p) => p,
            None => {
                default_param = VerifyParam::new().data()?.clone();
                &default_param
            }
        };
        let now = param.time.unwrap_or_else(OffsetDateTime::now_utc);

        let built = build_chain(
            &self.leaf,
            &self.untrusted,
            self.store,
            param.purpose,
            param.flags.contains(VerifyFlags::PARTIAL_CHAIN),
        )?;

        let parsed = built
            .certs
            .iter()
            .map(|c| c.parsed())
            .collect::<Result<Vec<_>, _>>()?;
        let view = ChainView {
            parsed,
            subjects: built.certs.iter().map(|c| c.subject.to_oneline()).collect(),
            anchored: built.anchored,
        };
        let trust = built
            .certs
            .iter()
            .map(|c| {
                self.store
                    .anchor_kinds(c)
                    .map(|kinds| Trust::from_kinds(&kinds, param.purpose))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut errors = Vec::new();
        checks::check_trust(&view, &trust, &mut errors);
        checks::check_depth(&view, param.depth, &mut errors);
        if !param.flags.contains(VerifyFlags::NO_CHECK_TIME) {
            checks::check_time_validity(&view, now, &mut errors);
        }
        checks::check_signatures(&view, &mut errors);
        checks::check_basic_constraints(&view, &mut errors);
        checks::check_key_cert_sign(&view, &mut errors);
        checks::check_critical_extensions(&view, &mut errors);
        checks::check_chain_name_constraints(&view, &mut errors);
        if param.flags.contains(VerifyFlags::X509_STRICT) {
            checks::check_strict(&view, &mut errors);
        }
        checks::check_purpose(&view, param.purpose, &mut errors);
        checks::check_leaf_identity(&view, param, &mut errors);
        checks::check_revocation(&view, param.flags, self.store.crls()?, now, &mut errors);

        if let Some(callback) = &self.callback {
            for (depth, cert) in built.certs.iter().enumerate() {
                let mut wrapper = X509::from_shared(Arc::clone(cert));
                let accepted = callback(&wrapper, depth);
                wrapper.close();
                if !accepted {
                    let subject = view.subjects.get(depth).map(String::as_str).unwrap_or("");
                    errors.push(VerificationFailure::new(
                        X509Error::ApplicationVerification,
                        depth,
                        subject,
                        "rejected by application callback".into(),
                    ));
                }
            }
        }

        let chain = built
            .certs
            .iter()
            .zip(&view.parsed)
            .enumerate()
            .map(|(depth, (data, parsed))| ChainCertInfo {
                depth,
                subject: data.subject.to_oneline(),
                issuer: data.issuer.to_oneline(),
                short_name: helpers::short_name(parsed),
                serial: util::hex_colon_upper(parsed.raw_serial()),
            })
            .collect();

        let result = VerificationResult {
            is_valid: errors.is_empty(),
            chain,
            errors,
        };
        tracing::debug!(
            valid = result.is_valid,
            errors = result.errors.len(),
            anchored = built.anchored,
            "verification finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn failure(error: X509Error, depth: usize) -> VerificationFailure {
        VerificationFailure::new(error, depth, "CN = leaf", "detail".into())
    }

    #[test]
    fn result_display_lists_every_reason() {
        let result = VerificationResult {
            is_valid: false,
            chain: vec![ChainCertInfo {
                depth: 0,
                subject: "CN = leaf".into(),
                issuer: "CN = ca".into(),
                short_name: "leaf".into(),
                serial: "01".into(),
            }],
            errors: vec![
                failure(X509Error::CertHasExpired, 0),
                failure(X509Error::HostnameMismatch, 0),
            ],
        };
        assert_eq!(
            result.to_string(),
            "leaf, 01, FAIL, certificate has expired at depth 0; hostname mismatch at depth 0"
        );
        assert!(result.has_error(X509Error::HostnameMismatch));
        assert!(!result.has_error(X509Error::CertRevoked));
        assert_eq!(result.first_error(), Some(X509Error::CertHasExpired));
    }

    #[test]
    fn failure_serializes_code() {
        let json = serde_json::to_value(failure(X509Error::CertRevoked, 1)).unwrap();
        assert_eq!(json["error"], 23);
        assert_eq!(json["depth"], 1);
    }
}
