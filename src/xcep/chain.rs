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

//! CA chain discovery through Authority Information Access.
//!
//! Starting from a CA certificate published in the policy, issuers are
//! fetched one by one from their `caIssuers` URI until a self-issued
//! certificate is reached. Any failure along the way ends the walk and the
//! certificates gathered so far are returned as a partial chain.

use async_trait::async_trait;
use const_oid::db::rfc5280::{ID_AD_CA_ISSUERS, ID_PE_AUTHORITY_INFO_ACCESS};
use der::pem::LineEnding;
use der::{Decode, DecodePem, Encode, EncodePem};
use tracing::{debug, warn};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::AuthorityInfoAccessSyntax;
use x509_cert::Certificate;

use crate::error::{CepError, Result};

/// Longest chain followed before giving up.
pub const MAX_CHAIN_DEPTH: usize = 8;

/// Retrieves issuer certificates by URI.
#[async_trait]
pub trait IssuerFetcher: Send + Sync {
    /// Fetch the certificate published at `uri`, DER or PEM.
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

/// [`IssuerFetcher`] over plain HTTP GET.
#[derive(Debug, Clone)]
pub struct HttpIssuerFetcher {
    http: reqwest::Client,
}

impl HttpIssuerFetcher {
    /// Fetch with an existing client.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IssuerFetcher for HttpIssuerFetcher {
    async fn fetch(&self, uri: &str) -> Result<Vec<u8>> {
        debug!("Fetching issuer certificate from {}", uri);
        let response = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(CepError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CepError::server_error(
                status.as_u16(),
                format!("GET {} failed", uri),
            ));
        }

        let bytes = response.bytes().await.map_err(CepError::from_transport)?;
        Ok(bytes.to_vec())
    }
}

/// One certificate of a [`CertificateChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCertificate {
    /// DER encoding.
    pub der: Vec<u8>,
    /// PEM encoding, without a trailing newline.
    pub pem: String,
    /// Subject common name, or the full subject if it has none.
    pub nickname: String,
}

impl ChainCertificate {
    fn from_certificate(cert: &Certificate) -> Result<Self> {
        let der = cert.to_der()?;
        let pem = cert.to_pem(LineEnding::LF)?.trim_end().to_string();
        let nickname = common_name(cert).unwrap_or_else(|| cert.tbs_certificate.subject.to_string());
        Ok(Self { der, pem, nickname })
    }
}

/// CA certificates ordered from the root down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateChain {
    certificates: Vec<ChainCertificate>,
    complete: bool,
}

impl CertificateChain {
    /// Certificates, root first.
    pub fn certificates(&self) -> &[ChainCertificate] {
        &self.certificates
    }

    /// Whether a self-issued root was reached.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of certificates.
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Whether the chain holds no certificates.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// The topmost certificate found.
    pub fn root(&self) -> Option<&ChainCertificate> {
        self.certificates.first()
    }

    /// `nickname\nPEM` entries joined by newlines, root first.
    pub fn to_certmonger(&self) -> String {
        self.certificates
            .iter()
            .map(|c| format!("{}\n{}", c.nickname, c.pem))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Walk AIA `caIssuers` links upwards from `start`.
///
/// # Errors
///
/// Only a `start` certificate that cannot be parsed is an error. Problems
/// further up the chain end the walk with a partial result.
pub async fn resolve_chain(start: &[u8], fetcher: &dyn IssuerFetcher) -> Result<CertificateChain> {
    let first = parse_certificate(start)?;
    let mut path = vec![first];
    let mut complete = false;

    loop {
        let Some(current) = path.last() else {
            break;
        };
        let subject = current.tbs_certificate.subject.to_string();

        if is_self_issued(current) {
            complete = true;
            break;
        }
        if path.len() >= MAX_CHAIN_DEPTH {
            warn!("Chain exceeds {} certificates, stopping at {}", MAX_CHAIN_DEPTH, subject);
            break;
        }

        let Some(uri) = ca_issuers_uri(current) else {
            warn!("No AIA caIssuers URI in {}, chain is partial", subject);
            break;
        };

        let bytes = match fetcher.fetch(&uri).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot fetch issuer of {} from {}: {}", subject, uri, e);
                break;
            }
        };

        let parent = match parse_certificate(&bytes) {
            Ok(cert) => cert,
            Err(e) => {
                warn!("Issuer certificate from {} does not parse: {}", uri, e);
                break;
            }
        };

        if parent.tbs_certificate.subject != current.tbs_certificate.issuer {
            warn!(
                "Certificate from {} is {}, expected {}",
                uri, parent.tbs_certificate.subject, current.tbs_certificate.issuer
            );
            break;
        }

        debug!("Found issuer {}", parent.tbs_certificate.subject);
        path.push(parent);
    }

    let mut certificates = path
        .iter()
        .map(ChainCertificate::from_certificate)
        .collect::<Result<Vec<_>>>()?;
    certificates.reverse();

    Ok(CertificateChain {
        certificates,
        complete,
    })
}

/// Parse a certificate given as DER or PEM.
pub fn parse_certificate(data: &[u8]) -> Result<Certificate> {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let trimmed = &data[start..];
    if trimmed.starts_with(b"-----BEGIN") {
        Certificate::from_pem(trimmed)
            .map_err(|e| CepError::invalid_pem(format!("Invalid certificate: {}", e)))
    } else {
        Ok(Certificate::from_der(data)?)
    }
}

fn is_self_issued(cert: &Certificate) -> bool {
    cert.tbs_certificate.subject == cert.tbs_certificate.issuer
}

/// First `caIssuers` URI of the AIA extension.
fn ca_issuers_uri(cert: &Certificate) -> Option<String> {
    let extension = cert
        .tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == ID_PE_AUTHORITY_INFO_ACCESS)?;

    let aia = match AuthorityInfoAccessSyntax::from_der(extension.extn_value.as_bytes()) {
        Ok(aia) => aia,
        Err(e) => {
            warn!("Malformed AIA extension: {}", e);
            return None;
        }
    };

    aia.0.iter().find_map(|access| {
        if access.access_method != ID_AD_CA_ISSUERS {
            return None;
        }
        match &access.access_location {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
            _ => None,
        }
    })
}

/// Subject common name.
pub fn common_name(cert: &Certificate) -> Option<String> {
    use const_oid::db::rfc4519::CN;

    for rdn in cert.tbs_certificate.subject.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid == CN {
                if let Ok(s) = std::str::from_utf8(atv.value.value()) {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}
