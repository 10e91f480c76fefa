//! Certificate encodings and their engine file types.

use crate::XtrustError;

/// Encoding of certificate and key material accepted by the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X509Format {
    Der = 1,
    Pem = 2,
}

impl X509Format {
    /// Map a raw format code (as found in configuration or foreign callers)
    /// onto the closed format set.
    pub fn from_code(code: i32) -> Result<Self, XtrustError> {
        match code {
            1 => Ok(X509Format::Der),
            2 => Ok(X509Format::Pem),
            other => Err(XtrustError::NotSupported(format!(
                "certificate format code {}",
                other
            ))),
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Guess the encoding of `input`: PEM if it starts with `-----BEGIN`
    /// after leading whitespace, DER otherwise.
    pub fn detect(input: &[u8]) -> Self {
        if crate::util::is_pem(input) {
            X509Format::Pem
        } else {
            X509Format::Der
        }
    }
}

impl std::str::FromStr for X509Format {
    type Err = XtrustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("der") {
            Ok(X509Format::Der)
        } else if s.eq_ignore_ascii_case("pem") {
            Ok(X509Format::Pem)
        } else {
            Err(XtrustError::NotSupported(format!(
                "certificate format '{}'",
                s
            )))
        }
    }
}

impl std::fmt::Display for X509Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            X509Format::Der => write!(f, "DER"),
            X509Format::Pem => write!(f, "PEM"),
        }
    }
}

/// File type understood by file and directory lookups.
///
/// `Default` has no public counterpart: it reads PEM and falls back to DER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Asn1,
    Pem,
    Default,
}

impl FileType {
    pub fn from_format(format: X509Format) -> Self {
        match format {
            X509Format::Der => FileType::Asn1,
            X509Format::Pem => FileType::Pem,
        }
    }
}

impl From<X509Format> for FileType {
    fn from(format: X509Format) -> Self {
        FileType::from_format(format)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn format_codes_map_to_file_types() {
        assert_eq!(
            FileType::from_format(X509Format::from_code(1).unwrap()),
            FileType::Asn1
        );
        assert_eq!(
            FileType::from_format(X509Format::from_code(2).unwrap()),
            FileType::Pem
        );
    }

    #[test]
    fn unknown_format_code_is_not_supported() {
        for code in [0, 3, -1, 42] {
            assert!(matches!(
                X509Format::from_code(code),
                Err(XtrustError::NotSupported(_))
            ));
        }
    }

    #[test]
    fn parse_format_names() {
        assert_eq!("PEM".parse::<X509Format>().unwrap(), X509Format::Pem);
        assert_eq!("der".parse::<X509Format>().unwrap(), X509Format::Der);
        assert!("p12".parse::<X509Format>().is_err());
    }

    #[test]
    fn detect_pem_with_leading_whitespace() {
        assert_eq!(
            X509Format::detect(b"\n  -----BEGIN CERTIFICATE-----\n"),
            X509Format::Pem
        );
        assert_eq!(X509Format::detect(&[0x30, 0x82, 0x01]), X509Format::Der);
    }
}
