//! OCSP response validation
//!
//! A response is accepted only when every check below passes, evaluated in
//! this order and stopping at the first failure:
//!
//! 1. the carrier reported HTTP 200
//! 2. `responseStatus` is `successful`
//! 3. every requested CertID has a matching `SingleResponse`
//! 4. every matched `certStatus` is `good`
//! 5. now lies within `[thisUpdate, nextUpdate]` of every matched entry
//! 6. the response signature verifies against the trust store built from
//!    the request's issuers plus any explicitly supplied chain certificates
//!
//! [`OcspExchange`] drives one request through
//! `Built → Sent → Received → Validated | Rejected(kind)`.

use std::time::Duration;

use openssl::ocsp::{OcspCertStatus, OcspFlag, OcspResponse, OcspStatus};
use openssl::stack::Stack;
use openssl::x509::store::{X509Store, X509StoreBuilder};
use openssl::x509::verify::X509VerifyFlags;
use openssl::x509::X509;
use tracing::{debug, info, warn};

use crate::error::{DevPkiError, ResponseStatus, Result};
use crate::ocsp_request::OcspQuery;
use crate::ocsp_transport::{OcspTransport, TransportResponse, OCSP_REQUEST_CONTENT_TYPE};

/// Why an exchange was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    Transport,
    ResponseStatus(ResponseStatus),
    MissingSingleResponse,
    Revoked,
    UnknownStatus,
    ExpiredWindow,
    UntrustedResponse,
    MalformedResponse,
    /// Failure unrelated to the protocol, e.g. a crypto library error
    Other,
}

impl From<&DevPkiError> for RejectionKind {
    fn from(err: &DevPkiError) -> Self {
        match err {
            DevPkiError::Transport { .. } | DevPkiError::TransportTimeout { .. } => {
                Self::Transport
            }
            DevPkiError::ResponseStatus { status } => Self::ResponseStatus(*status),
            DevPkiError::MissingSingleResponse { .. } => Self::MissingSingleResponse,
            DevPkiError::Revoked { .. } => Self::Revoked,
            DevPkiError::UnknownStatus { .. } => Self::UnknownStatus,
            DevPkiError::ExpiredWindow { .. } => Self::ExpiredWindow,
            DevPkiError::UntrustedResponse(_) => Self::UntrustedResponse,
            DevPkiError::MalformedResponse(_) => Self::MalformedResponse,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Built,
    Sent,
    Received,
    Validated,
    Rejected(RejectionKind),
}

/// Accepted status of one requested certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateStatus {
    pub serial: String,
    pub this_update: String,
    pub next_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResponse {
    /// One entry per requested certificate, in request order
    pub statuses: Vec<CertificateStatus>,
}

pub struct OcspValidator {
    chain_certs: Vec<X509>,
    clock_skew_secs: u32,
}

impl OcspValidator {
    pub fn new(chain_certs: Vec<X509>) -> Self {
        Self {
            chain_certs,
            clock_skew_secs: 0,
        }
    }

    /// Tolerance applied to both ends of the validity window
    pub fn with_clock_skew(mut self, secs: u32) -> Self {
        self.clock_skew_secs = secs;
        self
    }

    /// Issuers of the request plus the chain certificates, without duplicates
    fn trusted_certificates(&self, query: &OcspQuery) -> Result<Vec<X509>> {
        let mut trusted: Vec<X509> = Vec::new();
        let mut seen: Vec<Vec<u8>> = Vec::new();
        for cert in query.issuers().into_iter().chain(self.chain_certs.iter().cloned()) {
            let der = cert.to_der()?;
            if !seen.contains(&der) {
                seen.push(der);
                trusted.push(cert);
            }
        }
        Ok(trusted)
    }

    fn trust_store(&self, trusted: &[X509]) -> Result<(X509Store, Stack<X509>)> {
        let mut store = X509StoreBuilder::new()?;
        // Every member is an anchor, including subordinate CAs
        store.set_flags(X509VerifyFlags::PARTIAL_CHAIN)?;
        let mut certs = Stack::new()?;
        for cert in trusted {
            store.add_cert(cert.clone())?;
            certs.push(cert.clone())?;
        }
        Ok((store.build(), certs))
    }

    /// Apply the six checks to a received response
    pub fn validate(
        &self,
        query: &OcspQuery,
        response: &TransportResponse,
    ) -> Result<ValidatedResponse> {
        if !response.is_success() {
            return Err(DevPkiError::Transport {
                detail: format!("OCSP responder returned HTTP {}", response.status),
            });
        }

        let ocsp = OcspResponse::from_der(&response.body)
            .map_err(|e| DevPkiError::MalformedResponse(e.to_string()))?;

        let raw_status = ocsp.status().as_raw();
        match ResponseStatus::from_raw(raw_status) {
            Some(ResponseStatus::Successful) => {}
            Some(status) => return Err(DevPkiError::ResponseStatus { status }),
            None => {
                return Err(DevPkiError::MalformedResponse(format!(
                    "unknown responseStatus {}",
                    raw_status
                )))
            }
        }

        let basic = ocsp
            .basic()
            .map_err(|e| DevPkiError::MalformedResponse(e.to_string()))?;

        // CertIDs must outlive the statuses borrowed from `basic`
        let serials = query
            .entries()
            .iter()
            .map(|entry| entry.serial())
            .collect::<Result<Vec<_>>>()?;
        let cert_ids = serials.into_iter().zip(query.identifiers()?).collect::<Vec<_>>();

        let mut matched: Vec<(&str, OcspStatus<'_>)> = Vec::with_capacity(cert_ids.len());
        for (serial, cert_id) in &cert_ids {
            let status = basic
                .find_status(cert_id)
                .ok_or_else(|| DevPkiError::MissingSingleResponse {
                    serial: serial.clone(),
                })?;
            matched.push((serial.as_str(), status));
        }

        for (serial, status) in &matched {
            if status.status == OcspCertStatus::GOOD {
                continue;
            }
            let serial = serial.to_string();
            return Err(if status.status == OcspCertStatus::REVOKED {
                DevPkiError::Revoked { serial }
            } else {
                DevPkiError::UnknownStatus { serial }
            });
        }

        for (serial, status) in &matched {
            status
                .check_validity(self.clock_skew_secs, None)
                .map_err(|_| DevPkiError::ExpiredWindow {
                    serial: serial.to_string(),
                })?;
        }

        let trusted = self.trusted_certificates(query)?;
        let (store, certs) = self.trust_store(&trusted)?;
        basic
            .verify(&certs, &store, OcspFlag::empty())
            .map_err(|e| DevPkiError::UntrustedResponse(e.to_string()))?;
        debug!(trusted = trusted.len(), "OCSP response signature verified");

        let statuses = matched
            .iter()
            .map(|(serial, status)| CertificateStatus {
                serial: serial.to_string(),
                this_update: status.this_update.to_string(),
                next_update: status.next_update().map(|t| t.to_string()),
            })
            .collect();
        Ok(ValidatedResponse { statuses })
    }
}

/// One request/response cycle against a responder
pub struct OcspExchange<'q> {
    query: &'q OcspQuery,
    state: ExchangeState,
}

impl<'q> OcspExchange<'q> {
    pub fn new(query: &'q OcspQuery) -> Self {
        Self {
            query,
            state: ExchangeState::Built,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn reject(&mut self, err: DevPkiError) -> DevPkiError {
        let kind = RejectionKind::from(&err);
        warn!(?kind, error = %err, "OCSP exchange rejected");
        self.state = ExchangeState::Rejected(kind);
        err
    }

    /// Send the request, then validate whatever comes back
    pub fn execute<T: OcspTransport + ?Sized>(
        &mut self,
        transport: &T,
        uri: &str,
        timeout: Duration,
        validator: &OcspValidator,
    ) -> Result<ValidatedResponse> {
        if self.state != ExchangeState::Built {
            return Err(DevPkiError::InvalidOption(
                "an OCSP exchange can only be executed once".into(),
            ));
        }

        self.state = ExchangeState::Sent;
        let response = transport
            .post(uri, OCSP_REQUEST_CONTENT_TYPE, self.query.to_der(), timeout)
            .map_err(|e| self.reject(e))?;
        self.state = ExchangeState::Received;
        debug!(status = response.status, bytes = response.body.len(), "OCSP response received");

        let validated = validator
            .validate(self.query, &response)
            .map_err(|e| self.reject(e))?;
        self.state = ExchangeState::Validated;
        info!(certificates = validated.statuses.len(), "OCSP response validated");
        Ok(validated)
    }
}
