//! DevPKI - Development Certificate Authority and OCSP Checker
//!
//! A small Public Key Infrastructure toolkit for test and development
//! environments. It creates root and subordinate CAs, keeps each CA's key
//! pair and certificate in its own SQLite record store, and queries OCSP
//! responders for the revocation status of certificates.
//!
//! # Overview
//!
//! ```text
//! Root CA (self-signed, CA:TRUE)
//!   └── Subordinate CA (signed by its parent, CA:TRUE)
//!       └── ...
//! ```
//!
//! Every CA certificate carries a random serial, SHA-512 signature, a
//! critical `basicConstraints` CA:TRUE, a critical `keyUsage` of
//! keyCertSign and cRLSign, plus subject and authority key identifiers.
//!
//! # Quick Start
//!
//! ```bash
//! devpki ca init                      # root CA "0"
//! devpki ca init sub --with-parent 0  # subordinate of "0"
//! devpki ocsp --uri http://ocsp.example.test ca.cer:leaf.cer
//! ```
//!
//! ## As a Library
//!
//! ```no_run
//! use devpki::ca::{CaIssuer, CertificateAuthority};
//! use devpki::configs::CaDefaults;
//! use devpki::data_directory::DataDirectory;
//! use devpki::storage::Storage;
//!
//! fn main() -> devpki::error::Result<()> {
//!     let storage = Storage::new(DataDirectory::resolve(None)?);
//!     let issuer = CaIssuer::new(storage, CaDefaults::default());
//!
//!     let (_key, cert) = issuer.init(&CertificateAuthority::new("0"))?;
//!     println!("{}", String::from_utf8_lossy(&cert.to_pem()?));
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! ## [`storage`]
//!
//! One SQLite database per CA id holding a `private_keys` and a
//! `certificates` table. Writes of a key pair and its certificate happen in
//! one transaction.
//!
//! ## [`generate_root_ca`] / [`generate_subordinate_ca`]
//!
//! Builders producing a fresh RSA key pair and a CA certificate, either
//! self-signed or signed by a parent CA.
//!
//! ## [`ca`]
//!
//! CA lifecycle: init, delete, delete all, exists, list.
//!
//! ## [`ocsp_request`], [`ocsp_transport`], [`ocsp_validator`]
//!
//! Build a DER OCSP request from issuer/subject pairings, POST it over
//! HTTP, and accept the response only if it passes every check in order.
//!
//! ```no_run
//! use std::time::Duration;
//! use devpki::ocsp_request::OcspRequestBuilder;
//! use devpki::ocsp_transport::HttpTransport;
//! use devpki::ocsp_validator::{OcspExchange, OcspValidator};
//!
//! # fn example() -> devpki::error::Result<()> {
//! let query = OcspRequestBuilder::from_args(&["ca.cer:leaf.cer"])?.build()?;
//! let transport = HttpTransport::new(1024 * 1024)?;
//! let validator = OcspValidator::new(Vec::new());
//!
//! let validated = OcspExchange::new(&query).execute(
//!     &transport,
//!     "http://ocsp.example.test",
//!     Duration::from_secs(5),
//!     &validator,
//! )?;
//! for status in validated.statuses {
//!     println!("{}: good", status.serial);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Library functions return [`error::Result`]; every [`error::DevPkiError`]
//! variant maps to a stable process exit code.

pub mod ca;
pub mod configs;
pub mod data_directory;
pub mod error;
pub mod generate_root_ca;
pub mod generate_subordinate_ca;
pub mod ocsp_request;
pub mod ocsp_transport;
pub mod ocsp_validator;
pub mod storage;
pub mod x509_common;
