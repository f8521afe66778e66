//! OCSP transport
//!
//! The validator only needs "POST these bytes, give me the status code and
//! body back". [`OcspTransport`] is that seam; [`HttpTransport`] implements
//! it with a blocking `reqwest` client and tests substitute a fake.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use crate::error::{DevPkiError, Result};

pub const OCSP_REQUEST_CONTENT_TYPE: &str = "application/ocsp-request";
pub const OCSP_RESPONSE_CONTENT_TYPE: &str = "application/ocsp-response";

/// Raw carrier-level response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

pub trait OcspTransport {
    /// POST `body` to `uri`, failing with
    /// [`DevPkiError::TransportTimeout`] once `timeout` elapses
    fn post(
        &self,
        uri: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse>;
}

#[derive(Debug)]
pub struct HttpTransport {
    http_client: reqwest::blocking::Client,
    max_response_bytes: usize,
}

impl HttpTransport {
    pub fn new(max_response_bytes: usize) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| DevPkiError::Transport {
                detail: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            http_client,
            max_response_bytes,
        })
    }
}

impl OcspTransport for HttpTransport {
    fn post(
        &self,
        uri: &str,
        content_type: &str,
        body: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                DevPkiError::TransportTimeout { after: timeout }
            } else {
                DevPkiError::Transport {
                    detail: e.to_string(),
                }
            }
        };

        debug!(uri, bytes = body.len(), "posting OCSP request");
        let response = self
            .http_client
            .post(uri)
            .timeout(timeout)
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, OCSP_RESPONSE_CONTENT_TYPE)
            .body(body.to_vec())
            .send()
            .map_err(&map_err)?;

        let status = response.status().as_u16();
        let bytes = response.bytes().map_err(&map_err)?;
        if bytes.len() > self.max_response_bytes {
            return Err(DevPkiError::Transport {
                detail: format!(
                    "OCSP response too large: {} bytes (max: {})",
                    bytes.len(),
                    self.max_response_bytes
                ),
            });
        }
        debug!(status, bytes = bytes.len(), "received OCSP response");

        Ok(TransportResponse {
            status,
            body: bytes.to_vec(),
        })
    }
}
