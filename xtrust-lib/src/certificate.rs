//! X.509 certificate objects.

use crate::bio::Bio;
use crate::format::X509Format;
use crate::handle::{EngineResource, Handle};
use crate::key::Key;
use crate::name::{NameData, X509Name};
use crate::oid;
use crate::util;
use crate::XtrustError;
use digest::Digest;
use std::io::Write;
use std::sync::Arc;
use ::time::OffsetDateTime;
use x509_parser::der_parser::asn1_rs::ToDer;
use x509_parser::prelude::*;

/// Digest algorithm for fingerprint computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

impl std::str::FromStr for DigestAlgorithm {
    type Err = XtrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            other => Err(XtrustError::NotSupported(format!("digest '{}'", other))),
        }
    }
}

/// Signature algorithm of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureAlgorithm {
    /// Dotted OID.
    pub oid: String,
    /// Name when the OID belongs to the known signature group.
    pub name: Option<&'static str>,
}

impl SignatureAlgorithm {
    pub(crate) fn from_oid(oid_str: String) -> Self {
        let name = match oid_str.as_str() {
            oid::MD5_WITH_RSA => Some("md5WithRSAEncryption"),
            oid::SHA1_WITH_RSA => Some("sha1WithRSAEncryption"),
            oid::RSASSA_PSS => Some("rsassaPss"),
            oid::SHA256_WITH_RSA => Some("sha256WithRSAEncryption"),
            oid::SHA384_WITH_RSA => Some("sha384WithRSAEncryption"),
            oid::SHA512_WITH_RSA => Some("sha512WithRSAEncryption"),
            oid::ECDSA_WITH_SHA1 => Some("ecdsa-with-SHA1"),
            oid::ECDSA_WITH_SHA256 => Some("ecdsa-with-SHA256"),
            oid::ECDSA_WITH_SHA384 => Some("ecdsa-with-SHA384"),
            oid::ECDSA_WITH_SHA512 => Some("ecdsa-with-SHA512"),
            oid::ED25519 => Some("Ed25519"),
            oid::ED448 => Some("Ed448"),
            _ => None,
        };
        SignatureAlgorithm { oid: oid_str, name }
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name.unwrap_or(&self.oid))
    }
}

/// An algorithm OID paired with DER-level key data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub oid: String,
    pub data: Vec<u8>,
}

/// Engine-side certificate: the DER bytes and the fields read from them.
#[derive(Debug)]
pub(crate) struct CertData {
    pub(crate) der: Vec<u8>,
    pub(crate) subject: NameData,
    pub(crate) issuer: NameData,
    version: u32,
    serial: Vec<u8>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    spki: Vec<u8>,
    key_oid: String,
    key_bits: Vec<u8>,
    key_params: Vec<u8>,
    signature_oid: String,
    subject_key_id: Option<Vec<u8>>,
}

impl CertData {
    fn parse(input: &[u8]) -> Result<Self, XtrustError> {
        let (remaining, x509) = X509Certificate::from_der(input)
            .map_err(|e| XtrustError::DerError(format!("{}", e)))?;

        // Keep only the certificate bytes, not trailing data.
        let cert_len = input.len() - remaining.len();
        let der = input.get(..cert_len).unwrap_or(input).to_vec();

        let tbs = &x509.tbs_certificate;
        if tbs.version.0 > 2 {
            return Err(XtrustError::ParseError(format!(
                "unsupported X.509 version {} (expected v1, v2, or v3)",
                tbs.version.0 + 1
            )));
        }

        let spki = &tbs.subject_pki;
        let key_params = match &spki.algorithm.parameters {
            Some(any) => any.to_der_vec().map_err(|e| {
                XtrustError::ParseError(format!("failed to encode key parameters: {}", e))
            })?,
            None => Vec::new(),
        };

        let subject_key_id = tbs.extensions().iter().find_map(|ext| {
            match ext.parsed_extension() {
                ParsedExtension::SubjectKeyIdentifier(ski) => Some(ski.0.to_vec()),
                _ => None,
            }
        });

        Ok(CertData {
            subject: NameData::from_parsed(&tbs.subject),
            issuer: NameData::from_parsed(&tbs.issuer),
            version: tbs.version.0,
            serial: tbs.raw_serial().to_vec(),
            not_before: tbs.validity.not_before.to_datetime(),
            not_after: tbs.validity.not_after.to_datetime(),
            spki: spki.raw.to_vec(),
            key_oid: spki.algorithm.algorithm.to_id_string(),
            key_bits: spki.subject_public_key.data.to_vec(),
            key_params,
            signature_oid: x509.signature_algorithm.algorithm.to_id_string(),
            subject_key_id,
            der,
        })
    }

    /// Re-borrow the parsed structure for checks that need extensions.
    pub(crate) fn parsed(&self) -> Result<X509Certificate<'_>, XtrustError> {
        X509Certificate::from_der(&self.der)
            .map(|(_, cert)| cert)
            .map_err(|e| XtrustError::DerError(format!("{}", e)))
    }
}

impl EngineResource for Arc<CertData> {
    const KIND: &'static str = "x509";
}

/// A parsed, immutable X.509 certificate.
#[derive(Debug)]
pub struct X509 {
    handle: Handle<Arc<CertData>>,
}

impl X509 {
    /// Parse a certificate in the given encoding.
    pub fn from_data(data: &[u8], format: X509Format) -> Result<Self, XtrustError> {
        if data.is_empty() {
            return Err(XtrustError::ParseError("empty input".into()));
        }
        match format {
            X509Format::Der => Self::from_der(data),
            X509Format::Pem => Self::from_pem(data),
        }
    }

    pub fn from_der(der: &[u8]) -> Result<Self, XtrustError> {
        Ok(Self::from_shared(Arc::new(CertData::parse(der)?)))
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, XtrustError> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem)
            .map_err(|e| XtrustError::PemError(format!("{}", e)))?;
        if pem.label != "CERTIFICATE"
            && pem.label != "TRUSTED CERTIFICATE"
            && pem.label != "X509 CERTIFICATE"
        {
            return Err(XtrustError::PemError(format!(
                "expected CERTIFICATE, got {}",
                pem.label
            )));
        }
        Self::from_der(&pem.contents)
    }

    pub(crate) fn from_shared(data: Arc<CertData>) -> Self {
        X509 {
            handle: Handle::new(data),
        }
    }

    pub(crate) fn shared(&self) -> Result<Arc<CertData>, XtrustError> {
        Ok(Arc::clone(self.handle.get()?))
    }

    fn data(&self) -> Result<&CertData, XtrustError> {
        Ok(self.handle.get()?.as_ref())
    }

    pub fn subject_name(&self) -> Result<X509Name, XtrustError> {
        Ok(X509Name::from_data(self.data()?.subject.clone()))
    }

    pub fn issuer_name(&self) -> Result<X509Name, XtrustError> {
        Ok(X509Name::from_data(self.data()?.issuer.clone()))
    }

    pub fn subject_name_string(&self) -> Result<String, XtrustError> {
        Ok(self.data()?.subject.to_oneline())
    }

    pub fn issuer_name_string(&self) -> Result<String, XtrustError> {
        Ok(self.data()?.issuer.to_oneline())
    }

    /// The certificate in the requested encoding. DER output is byte-equal
    /// to the DER the certificate was parsed from.
    pub fn raw_data(&self, format: X509Format) -> Result<Vec<u8>, XtrustError> {
        let der = &self.data()?.der;
        Ok(match format {
            X509Format::Der => der.clone(),
            X509Format::Pem => util::pem_encode("CERTIFICATE", der).into_bytes(),
        })
    }

    /// SHA-1 digest of the DER certificate (20 bytes).
    pub fn cert_hash(&self) -> Result<Vec<u8>, XtrustError> {
        Ok(DigestAlgorithm::Sha1.digest(&self.data()?.der))
    }

    /// Colon-separated uppercase hex fingerprint.
    pub fn fingerprint(&self, algorithm: DigestAlgorithm) -> Result<String, XtrustError> {
        Ok(util::hex_colon_upper(
            &algorithm.digest(&self.data()?.der),
        ))
    }

    pub fn not_before(&self) -> Result<OffsetDateTime, XtrustError> {
        Ok(self.data()?.not_before)
    }

    pub fn not_after(&self) -> Result<OffsetDateTime, XtrustError> {
        Ok(self.data()?.not_after)
    }

    /// DER SubjectPublicKeyInfo.
    pub fn public_key_data(&self) -> Result<Vec<u8>, XtrustError> {
        Ok(self.data()?.spki.clone())
    }

    /// Algorithm OID and the raw subjectPublicKey bits.
    pub fn public_key_asn1(&self) -> Result<KeyMaterial, XtrustError> {
        let data = self.data()?;
        Ok(KeyMaterial {
            oid: data.key_oid.clone(),
            data: data.key_bits.clone(),
        })
    }

    /// Algorithm OID and the DER algorithm parameters (empty when absent).
    pub fn public_key_parameters(&self) -> Result<KeyMaterial, XtrustError> {
        let data = self.data()?;
        Ok(KeyMaterial {
            oid: data.key_oid.clone(),
            data: data.key_params.clone(),
        })
    }

    /// The certificate's public key as a [`Key`].
    pub fn public_key(&self) -> Result<Key, XtrustError> {
        Key::from_public_der(&self.data()?.spki)
    }

    /// Serial number bytes in DER (big-endian) order.
    ///
    /// With `mono_style` the returned copy is byte-reversed for callers that
    /// display serials little-endian. Both forms denote the same serial.
    pub fn serial_number(&self, mono_style: bool) -> Result<Vec<u8>, XtrustError> {
        let mut serial = self.data()?.serial.clone();
        if mono_style {
            serial.reverse();
        }
        Ok(serial)
    }

    /// Zero-based X.509 version (2 for a v3 certificate).
    pub fn version(&self) -> Result<u32, XtrustError> {
        Ok(self.data()?.version)
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm, XtrustError> {
        Ok(SignatureAlgorithm::from_oid(
            self.data()?.signature_oid.clone(),
        ))
    }

    /// Hash of the subject Name, computed through a short-lived Name object.
    pub fn subject_name_hash(&self) -> Result<u64, XtrustError> {
        let mut name = self.subject_name()?;
        let hash = name.hash();
        name.close();
        hash
    }

    pub fn subject_key_identifier(&self) -> Result<Option<Vec<u8>>, XtrustError> {
        Ok(self.data()?.subject_key_id.clone())
    }

    /// Whether subject and issuer are the same Name.
    pub fn is_self_issued(&self) -> Result<bool, XtrustError> {
        let data = self.data()?;
        Ok(data.subject.raw == data.issuer.raw)
    }

    /// Write a human-readable dump of the certificate.
    pub fn print<W: Write>(&self, writer: &mut W) -> Result<(), XtrustError> {
        let text = self.text()?;
        let mut bio = Bio::new(writer);
        bio.write_str(&text)?;
        bio.finish()
    }

    /// Write the certificate as PEM, optionally preceded by the dump.
    pub fn export_as_pem<W: Write>(
        &self,
        writer: &mut W,
        include_human_readable: bool,
    ) -> Result<(), XtrustError> {
        let text = if include_human_readable {
            Some(self.text()?)
        } else {
            None
        };
        let pem = util::pem_encode("CERTIFICATE", &self.data()?.der);
        let mut bio = Bio::new(writer);
        if let Some(text) = text {
            bio.write_str(&text)?;
        }
        bio.write_str(&pem)?;
        bio.finish()
    }

    /// A new handle on the same certificate.
    pub fn copy(&self) -> Result<X509, XtrustError> {
        Ok(Self::from_shared(self.shared()?))
    }

    pub fn close(&mut self) {
        self.handle.close();
    }

    fn text(&self) -> Result<String, XtrustError> {
        let data = self.data()?;
        let x509 = data.parsed()?;
        let mut out = String::new();

        out.push_str("Certificate:\n");
        out.push_str(&format!(
            "    Version: {} (0x{:x})\n",
            data.version + 1,
            data.version
        ));
        out.push_str(&format!(
            "    Serial Number: {}\n",
            util::hex_colon_upper(&data.serial)
        ));
        out.push_str(&format!(
            "    Signature Algorithm: {}\n",
            SignatureAlgorithm::from_oid(data.signature_oid.clone())
        ));
        out.push_str(&format!("    Issuer: {}\n", data.issuer.to_oneline()));
        out.push_str("    Validity\n");
        out.push_str(&format!(
            "        Not Before: {}\n",
            openssl_date(data.not_before)
        ));
        out.push_str(&format!(
            "        Not After : {}\n",
            openssl_date(data.not_after)
        ));
        out.push_str(&format!("    Subject: {}\n", data.subject.to_oneline()));

        let algorithm = crate::key::KeyAlgorithm::from_oid(&data.key_oid);
        out.push_str(&format!("    Public Key Algorithm: {}", algorithm));
        if let Ok(parsed) = x509.public_key().parsed() {
            let bits = parsed.key_size();
            if bits > 0 {
                out.push_str(&format!(" ({} bit)", bits));
            }
        }
        out.push('\n');

        if !x509.extensions().is_empty() {
            out.push_str("    X509v3 extensions:\n");
            for ext in x509.extensions() {
                format_extension(&mut out, ext);
            }
        }

        out.push_str(&format!(
            "    SHA1 Fingerprint: {}\n",
            util::hex_colon_upper(&DigestAlgorithm::Sha1.digest(&data.der))
        ));
        Ok(out)
    }
}

fn format_extension(out: &mut String, ext: &X509Extension) {
    let critical = if ext.critical { " critical" } else { "" };
    match ext.parsed_extension() {
        ParsedExtension::BasicConstraints(bc) => {
            out.push_str(&format!("        Basic Constraints:{}\n", critical));
            let pathlen = bc
                .path_len_constraint
                .map(|n| format!(", pathlen:{}", n))
                .unwrap_or_default();
            out.push_str(&format!(
                "            CA:{}{}\n",
                if bc.ca { "TRUE" } else { "FALSE" },
                pathlen
            ));
        }
        ParsedExtension::KeyUsage(ku) => {
            out.push_str(&format!("        Key Usage:{}\n", critical));
            let mut usages = Vec::new();
            if ku.digital_signature() {
                usages.push("Digital Signature");
            }
            if ku.non_repudiation() {
                usages.push("Non Repudiation");
            }
            if ku.key_encipherment() {
                usages.push("Key Encipherment");
            }
            if ku.data_encipherment() {
                usages.push("Data Encipherment");
            }
            if ku.key_agreement() {
                usages.push("Key Agreement");
            }
            if ku.key_cert_sign() {
                usages.push("Certificate Sign");
            }
            if ku.crl_sign() {
                usages.push("CRL Sign");
            }
            out.push_str(&format!("            {}\n", usages.join(", ")));
        }
        ParsedExtension::SubjectAlternativeName(san) => {
            out.push_str(&format!("        Subject Alternative Name:{}\n", critical));
            let names: Vec<String> = san
                .general_names
                .iter()
                .map(|gn| match gn {
                    GeneralName::DNSName(n) => format!("DNS:{}", n),
                    GeneralName::RFC822Name(e) => format!("email:{}", e),
                    GeneralName::IPAddress(ip) => {
                        format!("IP Address:{}", util::format_ip_bytes(ip))
                    }
                    GeneralName::URI(u) => format!("URI:{}", u),
                    other => format!("{:?}", other),
                })
                .collect();
            out.push_str(&format!("            {}\n", names.join(", ")));
        }
        ParsedExtension::SubjectKeyIdentifier(ski) => {
            out.push_str(&format!("        Subject Key Identifier:{}\n", critical));
            out.push_str(&format!("            {}\n", util::hex_colon_upper(ski.0)));
        }
        _ => {
            out.push_str(&format!(
                "        {}:{}\n",
                extension_name(&ext.oid.to_id_string()),
                critical
            ));
        }
    }
}

fn extension_name(oid_str: &str) -> String {
    match oid_str {
        oid::EXT_AUTHORITY_KEY_ID => "Authority Key Identifier".into(),
        oid::EXT_EXTENDED_KEY_USAGE => "Extended Key Usage".into(),
        oid::EXT_NAME_CONSTRAINTS => "Name Constraints".into(),
        oid::EXT_CRL_DISTRIBUTION_POINTS => "CRL Distribution Points".into(),
        oid::EXT_CERTIFICATE_POLICIES => "Certificate Policies".into(),
        oid::EXT_AUTHORITY_INFO_ACCESS => "Authority Information Access".into(),
        oid::EXT_ISSUER_ALT_NAME => "Issuer Alternative Name".into(),
        oid::EXT_SCT_LIST => "CT Precertificate SCTs".into(),
        other => other.to_string(),
    }
}

/// Format a timestamp in OpenSSL's style: `Feb  3 23:57:06 2026 GMT`.
pub(crate) fn openssl_date(dt: OffsetDateTime) -> String {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let month = MONTHS
        .get(usize::from(u8::from(dt.month())).saturating_sub(1))
        .copied()
        .unwrap_or("???");
    format!(
        "{} {:2} {:02}:{:02}:{:02} {} GMT",
        month,
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.year()
    )
}
