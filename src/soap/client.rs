//! SOAP transport.
//!
//! This module provides [`SoapClient`], which wraps a request body in a
//! SOAP 1.2 envelope, lets the configured [`Authenticator`] decorate it,
//! posts it, and decodes either the response payload or a SOAP fault.

use std::sync::Arc;

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use url::Url;

use crate::auth::Authenticator;
use crate::binding::{self, XmlBinding};
use crate::config::CepClientConfig;
use crate::error::{CepError, Result};
use crate::soap::types::{Envelope, Fault};
use crate::tls::build_http_client;
use crate::xml::XmlElement;

/// Content type of SOAP 1.2 requests.
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Upper bound on 401 round trips for a single message.
const MAX_CHALLENGES: usize = 4;

/// Longest response excerpt kept in a [`CepError::ServerError`].
const MAX_ERROR_BODY: usize = 512;

/// SOAP 1.2 client shared by the policy and enrollment clients.
#[derive(Clone)]
pub struct SoapClient {
    http: reqwest::Client,
    auth: Arc<Authenticator>,
}

impl std::fmt::Debug for SoapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoapClient")
            .field("auth", &self.auth.kind())
            .finish()
    }
}

impl SoapClient {
    /// Create a client, building the HTTP stack from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS configuration fails.
    pub fn new(config: &CepClientConfig, auth: Authenticator) -> Result<Self> {
        let http = build_http_client(config, &auth)?;
        Ok(Self::with_http(http, auth))
    }

    /// Create a client around an existing HTTP client.
    pub fn with_http(http: reqwest::Client, auth: Authenticator) -> Self {
        Self {
            http,
            auth: Arc::new(auth),
        }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The authentication strategy.
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Send `request` to `endpoint` and decode the response payload.
    ///
    /// # Errors
    ///
    /// - [`CepError::Connect`] if the server cannot be reached
    /// - [`CepError::Fault`] if the server answers with a SOAP fault
    /// - [`CepError::Authentication`] if a 401 challenge cannot be answered
    /// - [`CepError::ServerError`] for any other HTTP failure
    /// - [`CepError::Binding`] if the response does not match `Resp`
    pub async fn send<Req, Resp>(&self, endpoint: &Url, action: &str, request: &Req) -> Result<Resp>
    where
        Req: XmlBinding,
        Resp: XmlBinding,
    {
        let payload = binding::serialize(request)?;
        let envelope = self.send_envelope(endpoint, Envelope::new(action, endpoint, payload)).await?;
        binding::deserialize(envelope.payload())
    }

    /// Send a prepared envelope and return the response envelope.
    ///
    /// Faults are raised as errors, so a returned envelope never carries one.
    pub async fn send_envelope(&self, endpoint: &Url, mut envelope: Envelope) -> Result<Envelope> {
        self.auth.decorate_envelope(&mut envelope)?;

        let body = binding::serialize(&envelope)?.to_bytes()?;
        tracing::debug!(
            "POST {} (message {})",
            endpoint,
            envelope.message_id().unwrap_or("-")
        );
        tracing::trace!("Request: {}", String::from_utf8_lossy(&body));

        let mut authorization = self.auth.initial_authorization(endpoint)?;
        let mut challenges = 0;

        let response = loop {
            let mut request = self
                .http
                .post(endpoint.clone())
                .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
                .body(body.clone());
            if let Some(ref value) = authorization {
                request = request.header(AUTHORIZATION, value.as_str());
            }

            let response = request.send().await.map_err(CepError::from_transport)?;
            if response.status() != StatusCode::UNAUTHORIZED {
                break response;
            }

            challenges += 1;
            let offered = header_values(response.headers());
            if challenges > MAX_CHALLENGES {
                return Err(CepError::authentication(format!(
                    "{} kept answering 401 after {} attempts",
                    endpoint, MAX_CHALLENGES
                )));
            }
            match self.auth.respond_to_challenge(endpoint, &offered)? {
                Some(value) => {
                    tracing::debug!("Answering authentication challenge from {}", endpoint);
                    authorization = Some(value);
                }
                None => {
                    return Err(CepError::authentication(format!(
                        "{} refused the credentials (HTTP 401, offered: {})",
                        endpoint,
                        if offered.is_empty() {
                            "nothing".to_string()
                        } else {
                            offered.join(", ")
                        }
                    )));
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            self.auth
                .complete(endpoint, &header_values(response.headers()))?;
        }

        let bytes = response.bytes().await.map_err(CepError::from_transport)?;
        tracing::trace!("Response ({}): {}", status, String::from_utf8_lossy(&bytes));

        decode_response(status, &bytes)
    }
}

/// All `WWW-Authenticate` values, as text.
fn header_values(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Turn a status and body into an envelope or an error.
fn decode_response(status: StatusCode, bytes: &[u8]) -> Result<Envelope> {
    let parsed = XmlElement::parse(bytes).and_then(|e| binding::deserialize::<Envelope>(&e));

    match parsed {
        Ok(envelope) if envelope.is_fault() => {
            let fault: Fault = binding::deserialize(envelope.payload())?;
            let err = fault.into_error();
            tracing::debug!("Server returned SOAP fault: {}", err);
            Err(err)
        }
        Ok(envelope) if status.is_success() => Ok(envelope),
        Err(e) if status.is_success() => Err(e),
        _ => {
            let text = String::from_utf8_lossy(bytes);
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                text.chars().take(MAX_ERROR_BODY).collect()
            };
            Err(CepError::server_error(status.as_u16(), message))
        }
    }
}
