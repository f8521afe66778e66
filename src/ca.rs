//! Certificate authority lifecycle
//!
//! [`CaIssuer`] creates root and subordinate CAs, persists their key pair
//! and certificate through [`Storage`], and deletes them again. A CA is
//! addressed by an opaque identifier; the caller decides which identifier
//! is the default.

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use tracing::{debug, info, warn};

use crate::configs::CaDefaults;
use crate::error::{DevPkiError, Result};
use crate::generate_root_ca::RsaRootCABuilder;
use crate::generate_subordinate_ca::RsaSubordinateCABuilder;
use crate::storage::Storage;
use crate::x509_common::serial_string;

/// Parameters of a new certificate authority
#[derive(Debug, Clone, Default)]
pub struct CertificateAuthority {
    pub id: String,
    pub name: Option<String>,
    pub parent_id: Option<String>,
}

impl CertificateAuthority {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

pub struct CaIssuer {
    storage: Storage,
    defaults: CaDefaults,
}

impl CaIssuer {
    pub fn new(storage: Storage, defaults: CaDefaults) -> Self {
        Self { storage, defaults }
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        self.storage.exists(id)
    }

    /// Known CA ids
    pub fn list(&self) -> Result<Vec<String>> {
        self.storage.list_ids()
    }

    /// Subject CN: the given name, or `<prefix> <id>`
    fn common_name(&self, authority: &CertificateAuthority) -> String {
        match authority.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{} {}", self.defaults.common_name_prefix, authority.id),
        }
    }

    /// Create the CA's key pair and certificate and persist them
    ///
    /// # Errors
    /// - [`DevPkiError::AlreadyExists`] if `authority.id` already has a record
    /// - [`DevPkiError::ParentNotFound`] if the parent id has no record
    /// - [`DevPkiError::RecordStore`] / [`DevPkiError::Crypto`] on lower-level failures
    pub fn init(&self, authority: &CertificateAuthority) -> Result<(PKey<Private>, X509)> {
        if self.storage.exists(&authority.id)? {
            return Err(DevPkiError::AlreadyExists {
                id: authority.id.clone(),
            });
        }

        let common_name = self.common_name(authority);
        let (private_key, certificate) = match authority.parent_id.as_deref() {
            None => RsaRootCABuilder::new(&self.defaults)
                .subject_common_name(common_name)
                .build()?,
            Some(parent_id) => {
                if !self.storage.exists(parent_id)? {
                    return Err(DevPkiError::ParentNotFound {
                        id: parent_id.to_string(),
                    });
                }
                let parent = self.storage.open(parent_id)?;
                let parent_key = parent.private_key()?;
                let parent_cert = parent.certificate()?;
                debug!(parent_id, "loaded parent CA signing material");
                RsaSubordinateCABuilder::new(parent_key, parent_cert, &self.defaults)
                    .subject_common_name(common_name)
                    .build()?
            }
        };

        self.persist(&authority.id, &private_key, &certificate)?;

        info!(
            id = %authority.id,
            parent = authority.parent_id.as_deref().unwrap_or("-"),
            serial = %serial_string(&certificate)?,
            "CA initialized"
        );
        Ok((private_key, certificate))
    }

    /// Write the pair; on failure remove the half-created record
    fn persist(&self, id: &str, private_key: &PKey<Private>, certificate: &X509) -> Result<()> {
        let result = self
            .storage
            .create(id)
            .and_then(|record| record.store_key_certificate(private_key, certificate).map(|_| ()));

        if let Err(err) = result {
            // create() refuses an existing id before touching it, so any
            // file present now is the one this call made.
            if !matches!(err, DevPkiError::AlreadyExists { .. }) {
                self.roll_back(id, &err);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Best-effort removal; failures here are logged, never returned
    fn roll_back(&self, id: &str, cause: &DevPkiError) {
        match self.storage.exists(id) {
            Ok(false) => {}
            Ok(true) => {
                warn!(id, error = %cause, "rolling back partially created CA");
                if let Err(cleanup) = self.storage.delete(id) {
                    warn!(id, error = %cleanup, "failed to remove partially created CA");
                }
            }
            Err(check) => {
                warn!(id, error = %check, "could not check for partially created CA");
            }
        }
    }

    /// Remove the CA's record. Subordinates are left in place.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.storage.delete(id)?;
        info!(id, "CA deleted");
        Ok(())
    }

    /// Remove every CA record
    pub fn delete_all(&self) -> Result<usize> {
        let removed = self.storage.reset_to_empty()?;
        info!(removed, "all CA databases deleted");
        Ok(removed)
    }

    /// Stored certificate of an existing CA
    pub fn certificate(&self, id: &str) -> Result<X509> {
        self.storage.open(id)?.certificate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_directory::DataDirectory;
    use openssl::nid::Nid;
    use openssl::x509::X509Ref;
    use tempfile::TempDir;

    fn issuer(tmp: &TempDir) -> CaIssuer {
        let storage = Storage::new(DataDirectory::at(tmp.path()).unwrap());
        CaIssuer::new(storage, CaDefaults::default())
    }

    fn subject_cn(cert: &X509Ref) -> String {
        cert.subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .unwrap()
            .data()
            .as_utf8()
            .unwrap()
            .to_string()
    }

    fn has_critical_ca_constraint(cert: &X509Ref) -> bool {
        let text = String::from_utf8(cert.to_text().unwrap()).unwrap();
        text.contains("X509v3 Basic Constraints: critical") && text.contains("CA:TRUE")
    }

    #[test]
    fn test_root_ca_properties() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);

        let (key, cert) = issuer.init(&CertificateAuthority::new("0")).unwrap();

        assert_eq!(
            cert.issuer_name().to_der().unwrap(),
            cert.subject_name().to_der().unwrap()
        );
        let serial: u32 = serial_string(&cert).unwrap().parse().unwrap();
        assert!((1..=100_000).contains(&serial));
        let window = cert.not_before().diff(cert.not_after()).unwrap();
        assert_eq!((window.days, window.secs), (730, 0));
        assert!(has_critical_ca_constraint(&cert));
        assert!(cert.subject_key_id().is_some());
        assert!(cert.authority_key_id().is_some());
        assert!(cert.verify(&key).unwrap());
        assert_eq!(subject_cn(&cert), "DevPKI CA 0");
    }

    #[test]
    fn test_name_used_as_common_name() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);
        let (_, cert) = issuer
            .init(&CertificateAuthority::new("named").with_name("Team Root"))
            .unwrap();
        assert_eq!(subject_cn(&cert), "Team Root");
    }

    #[test]
    fn test_subordinate_signed_by_parent_key() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);
        let (_, root_cert) = issuer.init(&CertificateAuthority::new("root")).unwrap();

        let (sub_key, sub_cert) = issuer
            .init(&CertificateAuthority::new("sub").with_parent("root"))
            .unwrap();

        assert_eq!(
            sub_cert.issuer_name().to_der().unwrap(),
            root_cert.subject_name().to_der().unwrap()
        );
        assert!(sub_cert.verify(&root_cert.public_key().unwrap()).unwrap());
        assert!(!matches!(sub_cert.verify(&sub_key), Ok(true)));
        assert!(has_critical_ca_constraint(&sub_cert));
    }

    #[test]
    fn test_exists_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);

        assert!(!issuer.exists("7").unwrap());
        issuer.init(&CertificateAuthority::new("7")).unwrap();
        assert!(issuer.exists("7").unwrap());
        issuer.delete("7").unwrap();
        assert!(!issuer.exists("7").unwrap());
        assert!(matches!(
            issuer.delete("7"),
            Err(DevPkiError::NotFound { .. })
        ));
    }

    #[test]
    fn test_init_existing_id_leaves_record_unchanged() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);
        let (_, original) = issuer.init(&CertificateAuthority::new("dup")).unwrap();

        let err = issuer
            .init(&CertificateAuthority::new("dup").with_name("Other"))
            .unwrap_err();
        assert!(matches!(err, DevPkiError::AlreadyExists { .. }));
        assert_eq!(err.status_code(), 12);

        let stored = issuer.certificate("dup").unwrap();
        assert_eq!(stored.to_der().unwrap(), original.to_der().unwrap());
    }

    #[test]
    fn test_missing_parent() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);
        let err = issuer
            .init(&CertificateAuthority::new("orphan").with_parent("nope"))
            .unwrap_err();
        assert!(matches!(err, DevPkiError::ParentNotFound { ref id } if id == "nope"));
        assert!(!issuer.exists("orphan").unwrap());
    }

    #[test]
    fn test_store_failure_reports_original_error() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);
        // A directory where the database file should go makes opening it fail
        let blocker = tmp.path().join("ca_blocked.db");
        std::fs::create_dir(&blocker).unwrap();

        let err = issuer
            .init(&CertificateAuthority::new("blocked"))
            .unwrap_err();
        assert!(matches!(err, DevPkiError::RecordStore(_)));
        assert_eq!(err.status_code(), 11);
        assert!(blocker.is_dir());
        assert!(!issuer.exists("blocked").unwrap());
    }

    #[test]
    fn test_delete_parent_keeps_subordinate() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);
        issuer.init(&CertificateAuthority::new("p")).unwrap();
        issuer
            .init(&CertificateAuthority::new("c").with_parent("p"))
            .unwrap();

        issuer.delete("p").unwrap();
        assert!(issuer.exists("c").unwrap());
        assert!(issuer.certificate("c").is_ok());
    }

    #[test]
    fn test_delete_all() {
        let tmp = TempDir::new().unwrap();
        let issuer = issuer(&tmp);
        issuer.init(&CertificateAuthority::new("a")).unwrap();
        issuer.init(&CertificateAuthority::new("b")).unwrap();
        assert_eq!(issuer.list().unwrap(), vec!["a", "b"]);

        assert_eq!(issuer.delete_all().unwrap(), 2);
        assert!(issuer.list().unwrap().is_empty());
    }
}
