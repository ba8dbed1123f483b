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

//! Authentication strategies.
//!
//! The mechanism is chosen once, at configuration time, and is one of the
//! [`Authenticator`] variants. The SOAP transport calls into it at fixed
//! points of every exchange:
//!
//! 1. [`Authenticator::configure_client`] while the HTTP client is built
//! 2. [`Authenticator::decorate_envelope`] before serialization
//! 3. [`Authenticator::initial_authorization`] for the first attempt
//! 4. [`Authenticator::respond_to_challenge`] on every 401
//! 5. [`Authenticator::complete`] on the final successful response

mod kerberos;
mod username;

pub use kerberos::{ContextProvider, KerberosAuth, SecurityContext, MAX_ROUNDS};
pub use username::UsernamePasswordAuth;

use url::Url;

use crate::config::{AuthConfig, AuthKind, ClientIdentity};
use crate::error::{CepError, Result};
use crate::soap::Envelope;
use crate::tls::{build_reqwest_identity, parse_pem_certificates, parse_pem_private_key};

/// The configured authentication mechanism.
pub enum Authenticator {
    /// No credentials.
    Anonymous,
    /// Kerberos through SPNEGO.
    Kerberos(KerberosAuth),
    /// TLS client certificate.
    Certificate(CertificateAuth),
    /// Username and password.
    UsernamePassword(UsernamePasswordAuth),
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Authenticator({})", self.kind())
    }
}

impl Authenticator {
    /// Build the strategy selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CepError::Underconfigured`] if the mechanism cannot be set
    /// up, for instance Kerberos without GSSAPI support.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let auth = match config {
            AuthConfig::Anonymous => Self::Anonymous,
            AuthConfig::Kerberos(krb) => Self::Kerberos(KerberosAuth::new(krb)?),
            AuthConfig::Certificate(identity) => {
                Self::Certificate(CertificateAuth::new(identity.clone())?)
            }
            AuthConfig::UsernamePassword(creds) => {
                Self::UsernamePassword(UsernamePasswordAuth::new(creds.clone()))
            }
        };
        tracing::debug!("Using {} authentication", auth.kind());
        Ok(auth)
    }

    /// The mechanism, as advertised in XCEP endpoint lists.
    pub fn kind(&self) -> AuthKind {
        match self {
            Self::Anonymous => AuthKind::Anonymous,
            Self::Kerberos(_) => AuthKind::Kerberos,
            Self::Certificate(_) => AuthKind::Certificate,
            Self::UsernamePassword(_) => AuthKind::UsernamePassword,
        }
    }

    /// Attach transport-level credentials to the HTTP client.
    pub fn configure_client(
        &self,
        builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder> {
        match self {
            Self::Certificate(cert) => cert.configure_client(builder),
            _ => Ok(builder),
        }
    }

    /// Add message-level credentials to an outgoing envelope.
    pub fn decorate_envelope(&self, envelope: &mut Envelope) -> Result<()> {
        match self {
            Self::UsernamePassword(up) => up.decorate_envelope(envelope),
            _ => Ok(()),
        }
    }

    /// `Authorization` header value for the first attempt.
    pub fn initial_authorization(&self, _url: &Url) -> Result<Option<String>> {
        match self {
            Self::UsernamePassword(up) => Ok(up.basic_authorization()),
            _ => Ok(None),
        }
    }

    /// `Authorization` header value answering a 401.
    ///
    /// `challenges` holds every `WWW-Authenticate` value of the response.
    /// `None` means the mechanism has nothing more to offer.
    pub fn respond_to_challenge(&self, url: &Url, challenges: &[String]) -> Result<Option<String>> {
        match self {
            Self::Kerberos(krb) => krb.respond_to_challenge(url, challenges),
            _ => Ok(None),
        }
    }

    /// Inspect the headers of the final successful response.
    pub fn complete(&self, _url: &Url, challenges: &[String]) -> Result<()> {
        match self {
            Self::Kerberos(krb) => krb.complete(challenges),
            _ => Ok(()),
        }
    }
}

/// Mutual TLS with a client certificate.
#[derive(Clone)]
pub struct CertificateAuth {
    identity: ClientIdentity,
}

impl CertificateAuth {
    /// Validate and wrap a client identity.
    pub fn new(identity: ClientIdentity) -> Result<Self> {
        parse_pem_certificates(&identity.cert_pem)
            .map_err(|e| CepError::underconfigured(format!("Client certificate: {}", e)))?;
        parse_pem_private_key(&identity.key_pem)
            .map_err(|e| CepError::underconfigured(format!("Client key: {}", e)))?;
        Ok(Self { identity })
    }

    fn configure_client(&self, builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
        Ok(builder.identity(build_reqwest_identity(&self.identity)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PasswordMode, UsernamePasswordConfig};

    const LEAF_PEM: &[u8] = include_bytes!("../../tests/fixtures/pki/leaf.pem");
    const LEAF_KEY: &[u8] = include_bytes!("../../tests/fixtures/pki/leaf.key");

    #[test]
    fn test_kinds() {
        assert_eq!(
            Authenticator::from_config(&AuthConfig::Anonymous).unwrap().kind(),
            AuthKind::Anonymous
        );
        let up = AuthConfig::UsernamePassword(UsernamePasswordConfig::new("u", "p"));
        assert_eq!(
            Authenticator::from_config(&up).unwrap().kind(),
            AuthKind::UsernamePassword
        );
        let cert = AuthConfig::Certificate(ClientIdentity::new(LEAF_PEM, LEAF_KEY));
        assert_eq!(
            Authenticator::from_config(&cert).unwrap().kind(),
            AuthKind::Certificate
        );
    }

    #[test]
    fn test_certificate_requires_key() {
        let cert = AuthConfig::Certificate(ClientIdentity::new(LEAF_PEM, LEAF_PEM));
        assert!(matches!(
            Authenticator::from_config(&cert),
            Err(CepError::Underconfigured(_))
        ));
    }

    #[test]
    fn test_anonymous_is_inert() {
        let url = Url::parse("https://cep.example.test/").unwrap();
        let auth = Authenticator::Anonymous;
        assert_eq!(auth.initial_authorization(&url).unwrap(), None);
        assert_eq!(
            auth.respond_to_challenge(&url, &["Negotiate".to_string()]).unwrap(),
            None
        );
    }

    #[test]
    fn test_basic_mode_sets_header() {
        let url = Url::parse("https://cep.example.test/").unwrap();
        let mut creds = UsernamePasswordConfig::new("alice", "secret");
        creds.mode = PasswordMode::Basic;
        let auth = Authenticator::from_config(&AuthConfig::UsernamePassword(creds)).unwrap();
        assert_eq!(
            auth.initial_authorization(&url).unwrap().as_deref(),
            Some("Basic YWxpY2U6c2VjcmV0")
        );
    }

    #[cfg(not(feature = "gssapi"))]
    #[test]
    fn test_kerberos_without_gssapi_is_underconfigured() {
        let krb = AuthConfig::Kerberos(crate::config::KerberosConfig::default());
        assert!(matches!(
            Authenticator::from_config(&krb),
            Err(CepError::Underconfigured(_))
        ));
    }
}
