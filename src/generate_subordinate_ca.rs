//! Subordinate CA Certificate Generation Module
//!
//! Generates CA certificates signed by a parent CA (root or another
//! subordinate).
//!
//! # PKI Hierarchy Position
//! ```text
//! Root CA (self-signed)
//!   └── Subordinate CA (signed by its parent) ← This module
//! ```
//!
//! # Certificate Properties
//! - **Signed by**: the parent CA's private key
//! - **Issuer**: the parent certificate's subject
//! - **Authority Key Identifier**: derived from the parent certificate
//! - **Extensions**: see [`crate::x509_common`]

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use crate::configs::CaDefaults;
use crate::error::Result;
use crate::x509_common::{build_ca_certificate, generate_rsa_key, Signer};

pub struct RsaSubordinateCABuilder {
    subject_common_name: String,
    defaults: CaDefaults,
    signing_key: PKey<Private>,
    signing_cert: X509,
}

impl RsaSubordinateCABuilder {
    /// Create a new RSA subordinate CA builder
    ///
    /// # Arguments
    /// * `ca_key` - Parent CA's private key for signing
    /// * `ca_cert` - Parent CA's certificate (issuer information)
    pub fn new(ca_key: PKey<Private>, ca_cert: X509, defaults: &CaDefaults) -> Self {
        Self {
            subject_common_name: String::new(),
            defaults: defaults.clone(),
            signing_key: ca_key,
            signing_cert: ca_cert,
        }
    }

    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.defaults.validity_days = days;
        self
    }

    /// Build the RSA key pair and a certificate signed by the parent CA
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, signed certificate)
    pub fn build(self) -> Result<(PKey<Private>, X509)> {
        let private_key = generate_rsa_key(self.defaults.key_bits)?;
        let signer = Signer {
            key: &self.signing_key,
            certificate: &self.signing_cert,
        };
        let certificate = build_ca_certificate(
            &private_key,
            &self.subject_common_name,
            &self.defaults,
            Some(&signer),
        )?;
        Ok((private_key, certificate))
    }
}
