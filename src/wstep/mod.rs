// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MS-WSTEP certificate enrollment client.
//!
//! A CSR is submitted as a WS-Trust `RequestSecurityToken`. The CA either
//! issues the certificate immediately, defers the request for manual
//! approval, or refuses it. Deferred requests are tracked by a [`Cookie`]
//! and resumed later with [`EnrollmentClient::poll`].

pub mod types;

use std::fmt;
use std::str::FromStr;

use base64::prelude::*;
use tracing::{debug, info, warn};
use url::Url;

use crate::binding::certificate_to_pem;
use crate::error::{CepError, Result};
use crate::soap::SoapClient;
use types::{
    RequestSecurityToken, RequestSecurityTokenResponse, RequestSecurityTokenResponseCollection,
    ISSUE_REQUEST_TYPE, RENEW_REQUEST_TYPE, RST_ACTION,
};

/// Disposition words that mean the request will never be issued.
const REFUSED_DISPOSITIONS: &[&str] = &["denied", "revoked", "failed", "rejected"];

/// State needed to resume a pending request.
///
/// Its text form, `"{request_id},{reference}"`, is handed to the caller and
/// read back on the next poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cookie {
    /// Request id assigned by the CA.
    pub request_id: u32,
    /// Where to poll; the URI of the pending token reference.
    pub reference: String,
}

impl Cookie {
    /// Create a cookie.
    pub fn new(request_id: u32, reference: impl Into<String>) -> Self {
        Self {
            request_id,
            reference: reference.into(),
        }
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.request_id, self.reference)
    }
}

impl FromStr for Cookie {
    type Err = CepError;

    /// Split on the first comma; the reference may contain more.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (id, reference) = s
            .split_once(',')
            .ok_or_else(|| CepError::invalid_cookie(format!("'{}' has no ','", s)))?;
        let request_id = id
            .trim()
            .parse::<u32>()
            .map_err(|_| CepError::invalid_cookie(format!("'{}' is not a request id", id)))?;
        if reference.is_empty() {
            return Err(CepError::invalid_cookie("Cookie has an empty reference"));
        }
        Ok(Self::new(request_id, reference))
    }
}

/// Kind of certificate request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    /// A first enrollment.
    #[default]
    Issue,
    /// A renewal of an existing certificate.
    Renew,
}

impl RequestKind {
    fn request_type(self) -> &'static str {
        match self {
            Self::Issue => ISSUE_REQUEST_TYPE,
            Self::Renew => RENEW_REQUEST_TYPE,
        }
    }
}

/// A certificate request to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    /// Issue or renew.
    pub kind: RequestKind,
    /// PKCS#10 request, PEM.
    pub csr_pem: String,
    /// Template the certificate is requested for. Only used to pick an
    /// endpoint from the policy.
    pub template: Option<String>,
    /// Certificate being renewed, PEM.
    pub prior_certificate: Option<String>,
}

impl EnrollmentRequest {
    /// A new enrollment.
    pub fn new(csr_pem: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Issue,
            csr_pem: csr_pem.into(),
            template: None,
            prior_certificate: None,
        }
    }

    /// A renewal of `prior_certificate`.
    pub fn renewal(csr_pem: impl Into<String>, prior_certificate: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::Renew,
            csr_pem: csr_pem.into(),
            template: None,
            prior_certificate: Some(prior_certificate.into()),
        }
    }

    /// Target a template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Whether this renews an existing certificate.
    pub fn is_renewal(&self) -> bool {
        self.kind == RequestKind::Renew
    }
}

/// Result of a submission or poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    /// The certificate was issued.
    Issued {
        /// Issued certificate, PEM.
        certificate: String,
    },
    /// The request awaits approval.
    Pending {
        /// State to poll with.
        cookie: Cookie,
    },
    /// The CA refused the request.
    Rejected {
        /// The CA's disposition message.
        reason: String,
    },
}

impl EnrollmentOutcome {
    /// Whether a certificate was issued.
    pub fn is_issued(&self) -> bool {
        matches!(self, Self::Issued { .. })
    }

    /// Whether the request is pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// Extract the base64 body of a PEM certificate request.
///
/// Both `CERTIFICATE REQUEST` and `NEW CERTIFICATE REQUEST` labels are
/// accepted. Line breaks are removed from the body.
pub fn csr_body(pem: &str) -> Result<String> {
    let pem = pem.trim();
    let label = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"]
        .into_iter()
        .find(|label| pem.starts_with(&format!("-----BEGIN {}-----", label)))
        .ok_or_else(|| CepError::invalid_pem("Expected a PEM certificate request"))?;

    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);
    let body = pem[begin.len()..]
        .strip_suffix(end.as_str())
        .ok_or_else(|| CepError::invalid_pem(format!("Missing '{}'", end)))?;

    let body: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if body.is_empty() {
        return Err(CepError::invalid_pem("Certificate request is empty"));
    }
    BASE64_STANDARD
        .decode(&body)
        .map_err(|e| CepError::invalid_pem(format!("Certificate request is not base64: {}", e)))?;
    Ok(body)
}

/// Client for a WSTEP enrollment endpoint.
#[derive(Debug, Clone)]
pub struct EnrollmentClient {
    soap: SoapClient,
    endpoint: Url,
}

impl EnrollmentClient {
    /// Create a client for `endpoint`.
    pub fn new(soap: SoapClient, endpoint: Url) -> Self {
        Self { soap, endpoint }
    }

    /// The enrollment endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Submit a certificate request.
    ///
    /// # Errors
    ///
    /// - [`CepError::InvalidPem`] if the CSR is not a PEM certificate request
    /// - [`CepError::Fault`] if the CA answers with a SOAP fault
    /// - transport and binding errors from [`SoapClient::send`]
    pub async fn issue(&self, request: &EnrollmentRequest) -> Result<EnrollmentOutcome> {
        let body = csr_body(&request.csr_pem)?;
        let rst = RequestSecurityToken::with_csr(request.kind.request_type(), body);

        debug!("Submitting {:?} request to {}", request.kind, self.endpoint);
        let response = self.exchange(&self.endpoint, &rst).await?;
        let outcome = classify(response, None)?;
        log_outcome(&outcome);
        Ok(outcome)
    }

    /// Ask for the status of a pending request.
    ///
    /// The query goes to the cookie's reference when it is an absolute
    /// URL, and to this client's endpoint otherwise. A still pending answer
    /// carries the caller's request id unchanged.
    pub async fn poll(&self, cookie: &Cookie) -> Result<EnrollmentOutcome> {
        let target = match Url::parse(&cookie.reference) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => {
                warn!(
                    "Cookie reference '{}' is not a URL, polling {}",
                    cookie.reference, self.endpoint
                );
                self.endpoint.clone()
            }
        };

        debug!("Polling request {} at {}", cookie.request_id, target);
        let rst = RequestSecurityToken::query(cookie.request_id);
        let response = self.exchange(&target, &rst).await?;
        let outcome = classify(response, Some(cookie))?;
        log_outcome(&outcome);
        Ok(outcome)
    }

    async fn exchange(
        &self,
        endpoint: &Url,
        rst: &RequestSecurityToken,
    ) -> Result<RequestSecurityTokenResponse> {
        let collection: RequestSecurityTokenResponseCollection =
            self.soap.send(endpoint, RST_ACTION, rst).await?;

        let mut responses = collection.responses.into_iter();
        let first = responses
            .next()
            .ok_or_else(|| CepError::binding("RequestSecurityTokenResponseCollection is empty"))?;
        if responses.next().is_some() {
            debug!("Ignoring additional responses in collection");
        }
        Ok(first)
    }
}

/// Reduce a response to an outcome.
///
/// `previous` is the cookie being polled, if any. Its request id is kept
/// and its reference fills in for a response that omits one.
pub fn classify(
    response: RequestSecurityTokenResponse,
    previous: Option<&Cookie>,
) -> Result<EnrollmentOutcome> {
    let disposition = response.disposition_message.trim().to_string();

    if let Some(encoded) = response.requested_token.certificate() {
        let certificate = certificate_to_pem(encoded).ok_or_else(|| {
            CepError::binding_type("requested_token", encoded, "base64 certificate")
        })?;
        return Ok(EnrollmentOutcome::Issued { certificate });
    }

    let lowered = disposition.to_lowercase();
    if REFUSED_DISPOSITIONS.iter().any(|word| lowered.contains(word)) {
        return Ok(EnrollmentOutcome::Rejected {
            reason: disposition,
        });
    }

    let reference = response
        .requested_token
        .reference_uri()
        .map(str::to_string)
        .or_else(|| previous.map(|c| c.reference.clone()));

    let Some(reference) = reference else {
        return Ok(EnrollmentOutcome::Rejected {
            reason: if disposition.is_empty() {
                "No certificate and no request reference in response".to_string()
            } else {
                disposition
            },
        });
    };

    let request_id = match previous {
        Some(cookie) => cookie.request_id,
        None => response
            .request_id
            .ok_or_else(|| CepError::binding("Pending response carries no RequestID"))?,
    };

    Ok(EnrollmentOutcome::Pending {
        cookie: Cookie::new(request_id, reference),
    })
}

fn log_outcome(outcome: &EnrollmentOutcome) {
    match outcome {
        EnrollmentOutcome::Issued { .. } => info!("Certificate issued"),
        EnrollmentOutcome::Pending { cookie } => {
            info!("Request {} is pending", cookie.request_id)
        }
        EnrollmentOutcome::Rejected { reason } => info!("Request rejected: {}", reason),
    }
}
