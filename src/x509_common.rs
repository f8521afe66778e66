//! Building blocks shared by the root and subordinate CA builders
//!
//! Both kinds of CA certificate carry the same profile:
//! - **Version**: X.509v3
//! - **Serial Number**: uniform random integer in `1..=serial_max`
//! - **Validity**: `[now, now + validity_days]` from a single clock reading
//! - **Basic Constraints**: CA=true, critical
//! - **Key Usage**: keyCertSign, cRLSign, critical
//! - **Subject Key Identifier**: hash of the certificate's own public key
//! - **Authority Key Identifier**: keyid and issuer of the signing CA
//! - **Signature**: SHA-512 with the signer's key
//!
//! Only the issuer name and the signing key differ between the two.

use std::time::{SystemTime, UNIX_EPOCH};

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509Name, X509Ref, X509};

use crate::configs::CaDefaults;
use crate::error::{DevPkiError, Result};

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub fn signing_digest() -> MessageDigest {
    MessageDigest::sha512()
}

/// Generate a fresh RSA key pair of `bits` size
pub fn generate_rsa_key(bits: u32) -> Result<PKey<Private>> {
    let rsa = Rsa::generate(bits)?;
    Ok(PKey::from_rsa(rsa)?)
}

/// Uniform random serial in `1..=serial_max`
///
/// Serials are not tracked across issuances, so two CAs can receive the
/// same serial with probability `1 / serial_max`.
pub fn random_serial(serial_max: u32) -> Result<Asn1Integer> {
    if serial_max == 0 {
        return Err(DevPkiError::Config("serial_max must be positive".into()));
    }
    let upper = BigNum::from_u32(serial_max)?;
    let mut serial = BigNum::new()?;
    upper.rand_range(&mut serial)?;
    serial.add_word(1)?;
    Ok(serial.to_asn1_integer()?)
}

pub fn common_name(cn: &str) -> Result<X509Name> {
    let mut name_builder = X509Name::builder()?;
    name_builder.append_entry_by_nid(Nid::COMMONNAME, cn)?;
    Ok(name_builder.build())
}

/// `[now, now + days]`
pub struct ValidityWindow {
    pub not_before: Asn1Time,
    pub not_after: Asn1Time,
}

impl ValidityWindow {
    pub fn days_from_now(days: u32) -> Result<Self> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DevPkiError::Config(format!("System clock before UNIX epoch: {}", e)))?
            .as_secs() as i64;
        let end = now + i64::from(days) * SECONDS_PER_DAY;
        Ok(Self {
            not_before: Asn1Time::from_unix(now as _)?,
            not_after: Asn1Time::from_unix(end as _)?,
        })
    }
}

/// Signing key and certificate of the parent CA
pub struct Signer<'a> {
    pub key: &'a PKeyRef<Private>,
    pub certificate: &'a X509Ref,
}

/// Issue a CA certificate for `subject_key`
///
/// With `signer == None` the certificate is self-signed: issuer equals
/// subject and `subject_key` signs it.
pub fn build_ca_certificate(
    subject_key: &PKeyRef<Private>,
    subject_common_name: &str,
    defaults: &CaDefaults,
    signer: Option<&Signer<'_>>,
) -> Result<X509> {
    let mut builder = X509::builder()?;
    builder.set_version(X509_VERSION_3)?;

    let serial = random_serial(defaults.serial_max)?;
    builder.set_serial_number(&serial)?;

    let subject_name = common_name(subject_common_name)?;
    builder.set_subject_name(&subject_name)?;
    match signer {
        Some(signer) => builder.set_issuer_name(signer.certificate.subject_name())?,
        None => builder.set_issuer_name(&subject_name)?,
    }

    let window = ValidityWindow::days_from_now(defaults.validity_days)?;
    builder.set_not_before(&window.not_before)?;
    builder.set_not_after(&window.not_after)?;

    builder.set_pubkey(subject_key)?;

    append_ca_extensions(&mut builder, signer.map(|s| s.certificate))?;

    let signing_key = signer.map(|s| s.key).unwrap_or(subject_key);
    builder.sign(signing_key, signing_digest())?;
    Ok(builder.build())
}

/// basicConstraints, keyUsage, subjectKeyIdentifier, authorityKeyIdentifier
///
/// `issuer == None` means the certificate under construction is its own
/// issuer.
fn append_ca_extensions(builder: &mut X509Builder, issuer: Option<&X509Ref>) -> Result<()> {
    let basic_constraints = BasicConstraints::new().critical().ca().build()?;
    builder.append_extension(basic_constraints)?;

    let key_usage = KeyUsage::new()
        .critical()
        .key_cert_sign()
        .crl_sign()
        .build()?;
    builder.append_extension(key_usage)?;

    let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(ski)?;

    // Needs the subject key identifier above when self-signed
    let aki = AuthorityKeyIdentifier::new()
        .keyid(true)
        .issuer(true)
        .build(&builder.x509v3_context(issuer, None))?;
    builder.append_extension(aki)?;

    Ok(())
}

/// Decimal rendering of a certificate serial
pub fn serial_string(certificate: &X509Ref) -> Result<String> {
    let serial = certificate.serial_number().to_bn()?;
    Ok(serial.to_dec_str()?.to_string())
}
