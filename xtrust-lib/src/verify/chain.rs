//! Certificate path building via DFS with backtracking.
//!
//! Starting from the leaf, candidate issuers are drawn from the trust store
//! (trusted certificates and lookups) and from the caller's untrusted pool.
//! Candidates whose signature over the current certificate verifies are
//! tried first; name-only matches are kept as a last resort so that a bad
//! signature surfaces as a signature failure rather than a missing issuer.

use crate::certificate::CertData;
use crate::collection::TrustKind;
use crate::params::Purpose;
use crate::store::TrustStore;
use crate::XtrustError;
use std::sync::Arc;
use x509_parser::prelude::*;

/// Maximum chain length explored, independent of the configured depth.
pub(crate) const MAX_CHAIN_DEPTH: usize = 32;

/// How the store regards a certificate for the purpose being verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trust {
    NotInStore,
    Trusted,
    /// In the store, but its trust kind doesn't cover this purpose.
    Neutral,
    Rejected,
}

impl Trust {
    pub(crate) fn from_kinds(kinds: &[TrustKind], purpose: Option<Purpose>) -> Self {
        if kinds.is_empty() {
            Trust::NotInStore
        } else if kinds.iter().any(|k| k.rejects(purpose)) {
            Trust::Rejected
        } else if kinds.iter().any(|k| k.trusts(purpose)) {
            Trust::Trusted
        } else {
            Trust::Neutral
        }
    }
}

/// A path from the leaf toward a trust anchor.
#[derive(Debug)]
pub(crate) struct BuiltChain {
    /// Leaf first.
    pub(crate) certs: Vec<Arc<CertData>>,
    /// Whether the last certificate is an accepted trust anchor.
    pub(crate) anchored: bool,
}

pub(crate) fn is_self_signed(cert: &X509Certificate) -> bool {
    cert.subject().as_raw() == cert.issuer().as_raw() && cert.verify_signature(None).is_ok()
}

struct Builder<'a> {
    untrusted: &'a [Arc<CertData>],
    store: &'a TrustStore,
    purpose: Option<Purpose>,
    partial_chain: bool,
    /// Longest dead-end path seen, reported when nothing anchors.
    longest: Vec<Arc<CertData>>,
}

/// Build the best chain for `leaf`. When no path reaches a trust anchor,
/// the longest path explored is returned unanchored for diagnostics.
pub(crate) fn build_chain(
    leaf: &Arc<CertData>,
    untrusted: &[Arc<CertData>],
    store: &TrustStore,
    purpose: Option<Purpose>,
    partial_chain: bool,
) -> Result<BuiltChain, XtrustError> {
    let mut builder = Builder {
        untrusted,
        store,
        purpose,
        partial_chain,
        longest: Vec::new(),
    };
    let mut chain = vec![Arc::clone(leaf)];
    if builder.dfs(&mut chain)? {
        tracing::debug!(length = chain.len(), "built anchored chain");
        return Ok(BuiltChain {
            certs: chain,
            anchored: true,
        });
    }
    tracing::debug!(length = builder.longest.len(), "no path to a trust anchor");
    Ok(BuiltChain {
        certs: builder.longest,
        anchored: false,
    })
}

impl Builder<'_> {
    fn dfs(&mut self, chain: &mut Vec<Arc<CertData>>) -> Result<bool, XtrustError> {
        let Some(current) = chain.last().cloned() else {
            return Ok(false);
        };
        if chain.len() > self.longest.len() {
            self.longest = chain.clone();
        }

        let parsed = current.parsed()?;
        let self_signed = is_self_signed(&parsed);
        let trust = Trust::from_kinds(&self.store.anchor_kinds(&current)?, self.purpose);
        if trust == Trust::Trusted && (self_signed || self.partial_chain) {
            return Ok(true);
        }
        if self_signed || chain.len() >= MAX_CHAIN_DEPTH {
            return Ok(false);
        }

        let mut verified: Vec<Arc<CertData>> = Vec::new();
        let mut name_only: Vec<Arc<CertData>> = Vec::new();
        let from_store = self
            .store
            .candidates(&current.issuer)?
            .into_iter()
            .map(|c| c.cert);
        let from_pool = self
            .untrusted
            .iter()
            .filter(|c| c.subject.raw == current.issuer.raw)
            .cloned();
        for candidate in from_store.chain(from_pool) {
            let seen = chain
                .iter()
                .chain(verified.iter())
                .chain(name_only.iter())
                .any(|c| c.der == candidate.der);
            if seen {
                continue;
            }
            let signs_current = {
                let issuer = candidate.parsed()?;
                parsed.verify_signature(Some(issuer.public_key())).is_ok()
            };
            if signs_current {
                verified.push(candidate);
            } else {
                name_only.push(candidate);
            }
        }

        for candidate in verified.into_iter().chain(name_only) {
            chain.push(candidate);
            if self.dfs(chain)? {
                return Ok(true);
            }
            chain.pop();
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_outweighs_trust() {
        let kinds = [TrustKind::TrustAll, TrustKind::RejectServer];
        assert_eq!(
            Trust::from_kinds(&kinds, Some(Purpose::SslServer)),
            Trust::Rejected
        );
        assert_eq!(
            Trust::from_kinds(&kinds, Some(Purpose::SslClient)),
            Trust::Trusted
        );
    }

    #[test]
    fn purpose_specific_trust_is_neutral_elsewhere() {
        assert_eq!(
            Trust::from_kinds(&[TrustKind::TrustClient], Some(Purpose::SslServer)),
            Trust::Neutral
        );
        assert_eq!(Trust::from_kinds(&[], None), Trust::NotInStore);
    }
}
