//! OCSP request construction
//!
//! Turns `issuer:subject[,subject...]` pairings into a single DER-encoded
//! OCSP request holding one CertID per (issuer, subject) pair, in input
//! order. No nonce extension is added.

use std::fs;
use std::path::{Path, PathBuf};

use openssl::hash::MessageDigest;
use openssl::ocsp::{OcspCertId, OcspRequest};
use openssl::x509::{X509Ref, X509VerifyResult, X509};
use tracing::{debug, warn};

use crate::error::{DevPkiError, Result};
use crate::x509_common::serial_string;

/// Hash used for issuer name and key hashes inside each CertID
fn cert_id_digest() -> MessageDigest {
    MessageDigest::sha1()
}

/// One `issuer:subject[,subject...]` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePairing {
    pub issuer: PathBuf,
    pub subjects: Vec<PathBuf>,
}

impl CertificatePairing {
    pub fn parse(arg: &str) -> Result<Self> {
        let (issuer, subjects) = arg.split_once(':').ok_or_else(|| {
            DevPkiError::InvalidPairing(format!(
                "'{}' must have the form <issuer>:<subject>[,<subject>...]",
                arg
            ))
        })?;

        let issuer = issuer.trim();
        if issuer.is_empty() {
            return Err(DevPkiError::InvalidPairing(format!(
                "'{}' names no issuer certificate",
                arg
            )));
        }

        let subjects = split_list(subjects).ok_or_else(|| {
            DevPkiError::InvalidPairing(format!("'{}' names no subject certificates", arg))
        })?;

        Ok(Self {
            issuer: PathBuf::from(issuer),
            subjects,
        })
    }
}

/// Split a comma separated list of paths. Blank entries are rejected.
pub fn split_list(list: &str) -> Option<Vec<PathBuf>> {
    let entries: Vec<&str> = list.split(',').map(str::trim).collect();
    if entries.iter().any(|e| e.is_empty()) {
        return None;
    }
    Some(entries.into_iter().map(PathBuf::from).collect())
}

/// Read a certificate stored as PEM or DER
pub fn load_certificate(path: &Path) -> Result<X509> {
    let bytes = fs::read(path).map_err(|e| {
        DevPkiError::InvalidPairing(format!("{}: {}", path.display(), e))
    })?;
    X509::from_pem(&bytes).or_else(|_| X509::from_der(&bytes)).map_err(|_| {
        DevPkiError::InvalidPairing(format!("{}: not a PEM or DER certificate", path.display()))
    })
}

/// A subject certificate together with its issuer
#[derive(Clone)]
pub struct QueryEntry {
    pub issuer: X509,
    pub subject: X509,
}

impl QueryEntry {
    /// CertID for this pair, identical each time it is derived
    pub fn cert_id(&self) -> Result<OcspCertId> {
        Ok(OcspCertId::from_cert(
            cert_id_digest(),
            &self.subject,
            &self.issuer,
        )?)
    }

    pub fn serial(&self) -> Result<String> {
        serial_string(&self.subject)
    }
}

/// A built request and the pairs it was built from
pub struct OcspQuery {
    entries: Vec<QueryEntry>,
    der: Vec<u8>,
}

impl OcspQuery {
    pub fn entries(&self) -> &[QueryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// DER encoding of the OCSP request
    pub fn to_der(&self) -> &[u8] {
        &self.der
    }

    /// One CertID per pair, in request order, for matching the response
    pub fn identifiers(&self) -> Result<Vec<OcspCertId>> {
        self.entries.iter().map(QueryEntry::cert_id).collect()
    }

    /// Every distinct issuer certificate referenced by the request
    pub fn issuers(&self) -> Vec<X509> {
        let mut issuers: Vec<X509> = Vec::new();
        for entry in &self.entries {
            let already = issuers.iter().any(|known| same_certificate(known, &entry.issuer));
            if !already {
                issuers.push(entry.issuer.clone());
            }
        }
        issuers
    }
}

fn same_certificate(a: &X509Ref, b: &X509Ref) -> bool {
    match (a.to_der(), b.to_der()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[derive(Default)]
pub struct OcspRequestBuilder {
    entries: Vec<QueryEntry>,
}

impl OcspRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw `issuer:subject[,subject...]` arguments
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut builder = Self::new();
        for arg in args {
            let pairing = CertificatePairing::parse(arg.as_ref())?;
            builder.add_pairing(&pairing)?;
        }
        Ok(builder)
    }

    /// Load the files of `pairing` and append its pairs
    pub fn add_pairing(&mut self, pairing: &CertificatePairing) -> Result<&mut Self> {
        let issuer = load_certificate(&pairing.issuer)?;
        let subjects = pairing
            .subjects
            .iter()
            .map(|path| load_certificate(path))
            .collect::<Result<Vec<_>>>()?;
        self.add_certificates(issuer, subjects)
    }

    pub fn add_certificates(&mut self, issuer: X509, subjects: Vec<X509>) -> Result<&mut Self> {
        if subjects.is_empty() {
            return Err(DevPkiError::InvalidPairing(
                "an issuer must be paired with at least one subject certificate".into(),
            ));
        }
        for subject in subjects {
            if issuer.issued(&subject) != X509VerifyResult::OK {
                warn!(
                    serial = %serial_string(&subject)?,
                    "subject certificate does not appear to be issued by its paired issuer"
                );
            }
            self.entries.push(QueryEntry {
                issuer: issuer.clone(),
                subject,
            });
        }
        Ok(self)
    }

    pub fn build(self) -> Result<OcspQuery> {
        if self.entries.is_empty() {
            return Err(DevPkiError::InvalidPairing(
                "no certificates to query".into(),
            ));
        }
        let mut request = OcspRequest::new()?;
        for entry in &self.entries {
            request.add_id(entry.cert_id()?)?;
        }
        let der = request.to_der()?;
        debug!(identifiers = self.entries.len(), bytes = der.len(), "built OCSP request");
        Ok(OcspQuery {
            entries: self.entries,
            der,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::CaDefaults;
    use crate::generate_root_ca::RsaRootCABuilder;
    use crate::generate_subordinate_ca::RsaSubordinateCABuilder;
    use tempfile::TempDir;

    #[test]
    fn test_parse_pairing() {
        let pairing = CertificatePairing::parse("ca.cer:a.cer,b.cer").unwrap();
        assert_eq!(pairing.issuer, PathBuf::from("ca.cer"));
        assert_eq!(
            pairing.subjects,
            vec![PathBuf::from("a.cer"), PathBuf::from("b.cer")]
        );
    }

    #[test]
    fn test_parse_pairing_without_separator() {
        assert!(matches!(
            CertificatePairing::parse("ca.cer"),
            Err(DevPkiError::InvalidPairing(_))
        ));
    }

    #[test]
    fn test_parse_pairing_empty_subjects() {
        for arg in ["ca.cer:", "ca.cer: ", "ca.cer:a.cer,,b.cer", ":a.cer"] {
            assert!(
                matches!(
                    CertificatePairing::parse(arg),
                    Err(DevPkiError::InvalidPairing(_))
                ),
                "{arg} should be rejected"
            );
        }
    }

    #[test]
    fn test_unresolvable_file() {
        let err = OcspRequestBuilder::from_args(&["/nonexistent/ca.cer:/nonexistent/s.cer"])
            .err()
            .unwrap();
        assert!(matches!(err, DevPkiError::InvalidPairing(_)));
    }

    #[test]
    fn test_load_certificate_errors() {
        let tmp = TempDir::new().unwrap();
        let garbage = tmp.path().join("garbage.cer");
        fs::write(&garbage, b"definitely not a certificate").unwrap();

        for path in [tmp.path().join("missing.cer"), garbage] {
            assert!(matches!(
                load_certificate(&path),
                Err(DevPkiError::InvalidPairing(_))
            ));
        }
    }

    #[test]
    fn test_build_one_identifier_per_subject() {
        let tmp = TempDir::new().unwrap();
        let defaults = CaDefaults::default();
        let (ca_key, ca_cert) = RsaRootCABuilder::new(&defaults)
            .subject_common_name("Query CA".to_string())
            .build()
            .unwrap();
        let (_, first) = RsaSubordinateCABuilder::new(ca_key.clone(), ca_cert.clone(), &defaults)
            .subject_common_name("First".to_string())
            .build()
            .unwrap();
        let (_, second) = RsaSubordinateCABuilder::new(ca_key, ca_cert.clone(), &defaults)
            .subject_common_name("Second".to_string())
            .build()
            .unwrap();

        let ca_path = tmp.path().join("ca.cer");
        let first_path = tmp.path().join("first.cer");
        let second_path = tmp.path().join("second.der");
        fs::write(&ca_path, ca_cert.to_pem().unwrap()).unwrap();
        fs::write(&first_path, first.to_pem().unwrap()).unwrap();
        fs::write(&second_path, second.to_der().unwrap()).unwrap();

        let arg = format!(
            "{}:{},{}",
            ca_path.display(),
            first_path.display(),
            second_path.display()
        );
        let query = OcspRequestBuilder::from_args(&[arg]).unwrap().build().unwrap();

        assert_eq!(query.len(), 2);
        assert_eq!(query.issuers().len(), 1);
        assert_eq!(
            query.entries()[0].serial().unwrap(),
            serial_string(&first).unwrap()
        );
        assert_eq!(
            query.entries()[1].serial().unwrap(),
            serial_string(&second).unwrap()
        );
        assert!(!query.to_der().is_empty());
    }

    #[test]
    fn test_build_without_entries() {
        assert!(matches!(
            OcspRequestBuilder::new().build(),
            Err(DevPkiError::InvalidPairing(_))
        ));
    }
}
