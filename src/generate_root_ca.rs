//! Root CA Certificate Generation Module
//!
//! Generates self-signed root CA certificates, the trust anchors of a
//! development PKI.
//!
//! # PKI Hierarchy Position
//! ```text
//! Root CA (self-signed) ← This module
//!   └── Subordinate CA (signed by its parent)
//! ```
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same
//! - **Signed by**: the freshly generated key itself
//! - **Extensions**: see [`crate::x509_common`]
//!
//! # Example
//! ```rust,no_run
//! # use devpki::configs::CaDefaults;
//! # use devpki::generate_root_ca::RsaRootCABuilder;
//! # fn example() -> devpki::error::Result<()> {
//! let (root_key, root_cert) = RsaRootCABuilder::new(&CaDefaults::default())
//!     .subject_common_name("Example Root CA".to_string())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use crate::configs::CaDefaults;
use crate::error::Result;
use crate::x509_common::{build_ca_certificate, generate_rsa_key};

/// Builder for RSA key pairs and self-signed root CA certificates
pub struct RsaRootCABuilder {
    subject_common_name: String,
    defaults: CaDefaults,
}

impl RsaRootCABuilder {
    pub fn new(defaults: &CaDefaults) -> Self {
        Self {
            subject_common_name: String::new(),
            defaults: defaults.clone(),
        }
    }

    /// Set the common name (CN) for the certificate
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set validity period in days
    pub fn validity_days(mut self, days: u32) -> Self {
        self.defaults.validity_days = days;
        self
    }

    /// Build the RSA key pair and self-signed root CA certificate
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, self-signed certificate)
    ///
    /// # Errors
    /// Returns error if key generation, extension creation or signing fails.
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        let private_key = generate_rsa_key(self.defaults.key_bits)?;
        let certificate =
            build_ca_certificate(&private_key, &self.subject_common_name, &self.defaults, None)?;
        Ok((private_key, certificate))
    }
}
