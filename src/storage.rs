//! CA record store
//!
//! Each certificate authority owns one SQLite database (`ca_<id>.db`) inside
//! the data directory. The database holds two linked tables: private keys,
//! and certificates referencing the key they belong to.

use std::fs;
use std::path::PathBuf;

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use rusqlite::{params, Connection, OptionalExtension};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::data_directory::DataDirectory;
use crate::error::{DevPkiError, Result};

const DB_FILE_PREFIX: &str = "ca_";
const DB_FILE_SUFFIX: &str = ".db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS private_keys (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        pem TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS certificates (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        private_key_id INTEGER NOT NULL REFERENCES private_keys(id) ON DELETE CASCADE,
        pem TEXT NOT NULL
    );
";

/// Row id of a stored private key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHandle(i64);

pub struct Storage {
    data_directory: DataDirectory,
}

impl Storage {
    pub fn new(data_directory: DataDirectory) -> Self {
        Storage { data_directory }
    }

    fn db_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self
            .data_directory
            .absolute_path_for(&format!("{DB_FILE_PREFIX}{id}{DB_FILE_SUFFIX}")))
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.db_path(id)?.is_file())
    }

    /// Create an empty database for `id`
    pub fn create(&self, id: &str) -> Result<CaRecord> {
        if self.exists(id)? {
            return Err(DevPkiError::AlreadyExists { id: id.to_string() });
        }
        let path = self.db_path(id)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        debug!(id, path = %path.display(), "created CA database");
        Ok(CaRecord {
            id: id.to_string(),
            conn,
        })
    }

    pub fn open(&self, id: &str) -> Result<CaRecord> {
        if !self.exists(id)? {
            return Err(DevPkiError::NotFound { id: id.to_string() });
        }
        let conn = Connection::open(self.db_path(id)?)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(CaRecord {
            id: id.to_string(),
            conn,
        })
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if !self.exists(id)? {
            return Err(DevPkiError::NotFound { id: id.to_string() });
        }
        let path = self.db_path(id)?;
        fs::remove_file(&path)?;
        debug!(id, path = %path.display(), "removed CA database");
        Ok(())
    }

    /// Ids of every CA database in the data directory, sorted
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.data_directory.path())? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(id) = name
                .strip_prefix(DB_FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(DB_FILE_SUFFIX))
            {
                if validate_id(id).is_ok() && entry.path().is_file() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove every CA database. Returns the number removed.
    pub fn reset_to_empty(&self) -> Result<usize> {
        let ids = self.list_ids()?;
        for id in &ids {
            self.delete(id)?;
        }
        Ok(ids.len())
    }
}

/// Ids become file names, so only a conservative character set is allowed
fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DevPkiError::InvalidOption(format!(
            "CA id '{}' may only contain ASCII letters, digits, '-' and '_'",
            id
        )))
    }
}

/// Open database of a single CA
pub struct CaRecord {
    id: String,
    conn: Connection,
}

impl CaRecord {
    pub fn insert_key_pair(&self, pem: &str) -> Result<KeyHandle> {
        self.conn
            .execute("INSERT INTO private_keys (pem) VALUES (?1)", params![pem])?;
        Ok(KeyHandle(self.conn.last_insert_rowid()))
    }

    pub fn insert_certificate(&self, key: KeyHandle, pem: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO certificates (private_key_id, pem) VALUES (?1, ?2)",
            params![key.0, pem],
        )?;
        Ok(())
    }

    /// Store a key and its certificate as one linked pair, atomically
    pub fn store_key_certificate(
        &self,
        private_key: &PKey<Private>,
        certificate: &X509,
    ) -> Result<KeyHandle> {
        let key_pem = SecretString::from(pem_to_string(private_key.private_key_to_pem_pkcs8()?)?);
        let cert_pem = pem_to_string(certificate.to_pem()?)?;

        let tx = self.conn.unchecked_transaction()?;
        let handle = self.insert_key_pair(key_pem.expose_secret())?;
        self.insert_certificate(handle, &cert_pem)?;
        tx.commit()?;
        Ok(handle)
    }

    /// The most recently stored certificate
    pub fn certificate(&self) -> Result<X509> {
        let pem: Option<String> = self
            .conn
            .query_row(
                "SELECT pem FROM certificates ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let pem = pem.ok_or_else(|| {
            DevPkiError::RecordStore(format!("CA #{} has no certificate", self.id))
        })?;
        Ok(X509::from_pem(pem.as_bytes())?)
    }

    /// Private key linked to the most recently stored certificate
    pub fn private_key(&self) -> Result<PKey<Private>> {
        let pem: Option<String> = self
            .conn
            .query_row(
                "SELECT k.pem FROM certificates c
                 JOIN private_keys k ON c.private_key_id = k.id
                 ORDER BY c.id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let pem = SecretString::from(pem.ok_or_else(|| {
            DevPkiError::RecordStore(format!("CA #{} has no private key", self.id))
        })?);
        Ok(PKey::private_key_from_pem(pem.expose_secret().as_bytes())?)
    }
}

fn pem_to_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| DevPkiError::RecordStore(format!("PEM is not valid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::CaDefaults;
    use crate::generate_root_ca::RsaRootCABuilder;
    use tempfile::TempDir;

    fn storage(tmp: &TempDir) -> Storage {
        Storage::new(DataDirectory::at(tmp.path()).unwrap())
    }

    #[test]
    fn test_create_exists_delete() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);

        assert!(!storage.exists("0").unwrap());
        drop(storage.create("0").unwrap());
        assert!(storage.exists("0").unwrap());
        assert!(matches!(
            storage.create("0"),
            Err(DevPkiError::AlreadyExists { .. })
        ));

        storage.delete("0").unwrap();
        assert!(!storage.exists("0").unwrap());
        assert!(matches!(
            storage.delete("0"),
            Err(DevPkiError::NotFound { .. })
        ));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        assert!(matches!(
            storage.exists("../etc"),
            Err(DevPkiError::InvalidOption(_))
        ));
        assert!(storage.exists("").is_err());
        assert!(storage.exists("lab-ca_2").is_ok());
    }

    #[test]
    fn test_store_and_load_pair() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        let (key, cert) = RsaRootCABuilder::new(&CaDefaults::default())
            .subject_common_name("Store Test CA".to_string())
            .build()
            .unwrap();

        let record = storage.create("store").unwrap();
        record.store_key_certificate(&key, &cert).unwrap();
        drop(record);

        let record = storage.open("store").unwrap();
        assert_eq!(record.certificate().unwrap().to_der().unwrap(), cert.to_der().unwrap());
        assert!(record.private_key().unwrap().public_eq(&key));
    }

    #[test]
    fn test_certificate_requires_linked_key() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        let record = storage.create("fk").unwrap();

        assert!(matches!(record.certificate(), Err(DevPkiError::RecordStore(_))));
        // Foreign key enforcement: no private key row with id 99
        assert!(record.insert_certificate(KeyHandle(99), "pem").is_err());
    }

    #[test]
    fn test_list_and_reset() {
        let tmp = TempDir::new().unwrap();
        let storage = storage(&tmp);
        drop(storage.create("b").unwrap());
        drop(storage.create("a").unwrap());
        fs::write(tmp.path().join("unrelated.txt"), "x").unwrap();

        assert_eq!(storage.list_ids().unwrap(), vec!["a", "b"]);
        assert_eq!(storage.reset_to_empty().unwrap(), 2);
        assert!(storage.list_ids().unwrap().is_empty());
        assert!(tmp.path().join("unrelated.txt").exists());
    }
}
