//! Distinguished Names.

use crate::handle::{EngineResource, Handle};
use crate::util;
use crate::XtrustError;
use digest::Digest;
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name as ParsedName;

/// Engine-side copy of a Name: its DER encoding and flattened attributes.
#[derive(Debug, Clone)]
pub(crate) struct NameData {
    pub(crate) raw: Vec<u8>,
    /// (dotted OID, short name, value) in encoding order.
    pub(crate) entries: Vec<(String, String, String)>,
}

impl EngineResource for NameData {
    const KIND: &'static str = "x509-name";
}

impl NameData {
    pub(crate) fn from_parsed(name: &ParsedName) -> Self {
        let mut entries = Vec::new();
        for rdn in name.iter() {
            for attr in rdn.iter() {
                let oid = attr.attr_type().to_id_string();
                let short = util::oid_short_name(&oid);
                let value = attr.as_str().unwrap_or("<binary>").to_string();
                entries.push((oid, short, value));
            }
        }
        NameData {
            raw: name.as_raw().to_vec(),
            entries,
        }
    }

    /// One-line form, e.g. "C = US, O = Org, CN = example.com".
    ///
    /// Values containing commas, equals signs, or backslashes are escaped.
    pub(crate) fn to_oneline(&self) -> String {
        let mut result = String::new();
        for (i, (_, k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                result.push_str(", ");
            }
            result.push_str(k);
            result.push_str(" = ");
            for ch in v.chars() {
                match ch {
                    '\\' => result.push_str("\\\\"),
                    ',' => result.push_str("\\,"),
                    '=' => result.push_str("\\="),
                    _ => result.push(ch),
                }
            }
        }
        result
    }

    pub(crate) fn hash(&self) -> u64 {
        let digest = sha1::Sha1::digest(&self.raw);
        let mut word = [0u8; 4];
        word.copy_from_slice(digest.get(..4).unwrap_or(&[0; 4]));
        u64::from(u32::from_le_bytes(word))
    }
}

/// A structured distinguished name, owned by the caller.
#[derive(Debug)]
pub struct X509Name {
    handle: Handle<NameData>,
}

impl X509Name {
    pub(crate) fn from_data(data: NameData) -> Self {
        X509Name {
            handle: Handle::new(data),
        }
    }

    /// Parse a standalone DER-encoded Name.
    pub fn from_der(der: &[u8]) -> Result<Self, XtrustError> {
        let (_, parsed) = ParsedName::from_der(der)
            .map_err(|e| XtrustError::DerError(format!("distinguished name: {}", e)))?;
        Ok(Self::from_data(NameData::from_parsed(&parsed)))
    }

    /// The one-line string form.
    pub fn to_oneline(&self) -> Result<String, XtrustError> {
        Ok(self.handle.get()?.to_oneline())
    }

    /// DER encoding of the Name.
    pub fn raw_data(&self) -> Result<Vec<u8>, XtrustError> {
        Ok(self.handle.get()?.raw.clone())
    }

    /// Engine-defined 32-bit hash of the DER Name (first four bytes of its
    /// SHA-1 digest, little-endian), widened to `u64`.
    pub fn hash(&self) -> Result<u64, XtrustError> {
        Ok(self.handle.get()?.hash())
    }

    pub fn entry_count(&self) -> Result<usize, XtrustError> {
        Ok(self.handle.get()?.entries.len())
    }

    /// The `(oid, short name, value)` triple at `index`, if any.
    pub fn entry(&self, index: usize) -> Result<Option<(String, String, String)>, XtrustError> {
        Ok(self.handle.get()?.entries.get(index).cloned())
    }

    pub(crate) fn data(&self) -> Result<&NameData, XtrustError> {
        self.handle.get()
    }

    pub fn close(&mut self) {
        self.handle.close();
    }
}

impl std::fmt::Display for X509Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.handle.get() {
            Ok(data) => write!(f, "{}", data.to_oneline()),
            Err(_) => write!(f, "<closed>"),
        }
    }
}
