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

//! Configuration types for the enrollment client.
//!
//! This module provides configuration structures for setting up a policy or
//! enrollment client: endpoint URL and type, authentication mechanism, and
//! TLS settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default seconds certmonger waits before polling a pending request.
pub const DEFAULT_POLL_INTERVAL: u64 = 3600;

/// Which service the configured endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointType {
    /// An XCEP policy endpoint; enrollment endpoints are discovered from it.
    #[default]
    Policy,
    /// A WSTEP enrollment endpoint used directly.
    Enrollment,
}

impl FromStr for EndpointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Policy" | "policy" => Ok(Self::Policy),
            "Enrollment" | "enrollment" => Ok(Self::Enrollment),
            other => Err(format!("unknown endpoint type '{}'", other)),
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Policy => write!(f, "Policy"),
            Self::Enrollment => write!(f, "Enrollment"),
        }
    }
}

/// Authentication mechanisms known to XCEP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthKind {
    /// No authentication.
    #[default]
    Anonymous,
    /// Kerberos through SPNEGO.
    Kerberos,
    /// WS-Security username token or HTTP Basic.
    UsernamePassword,
    /// TLS client certificate.
    Certificate,
}

impl AuthKind {
    /// Every kind, in XCEP code order.
    pub const ALL: [AuthKind; 4] = [
        Self::Anonymous,
        Self::Kerberos,
        Self::UsernamePassword,
        Self::Certificate,
    ];

    /// The XCEP `clientAuthentication` code.
    pub fn xcep_code(self) -> i64 {
        match self {
            Self::Anonymous => 1,
            Self::Kerberos => 2,
            Self::UsernamePassword => 4,
            Self::Certificate => 8,
        }
    }

    /// Map an XCEP `clientAuthentication` code.
    pub fn from_xcep_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.xcep_code() == code)
    }

    /// The name used in settings files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "Anonymous",
            Self::Kerberos => "Kerberos",
            Self::UsernamePassword => "UsernamePassword",
            Self::Certificate => "Certificate",
        }
    }
}

impl FromStr for AuthKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown authentication kind '{}'", s))
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a policy or enrollment client.
#[derive(Clone)]
pub struct CepClientConfig {
    /// Configured endpoint URL.
    pub endpoint: Url,

    /// Whether `endpoint` is a policy or an enrollment service.
    pub endpoint_type: EndpointType,

    /// Authentication mechanism and its credentials.
    pub auth: AuthConfig,

    /// Trust anchor configuration for server certificate verification.
    pub trust_anchors: TrustAnchors,

    /// Request timeout duration.
    pub timeout: Duration,

    /// Seconds certmonger should wait before polling a pending request.
    pub poll_interval: u64,

    /// Additional HTTP headers to include in requests.
    pub additional_headers: Vec<(String, String)>,
}

impl fmt::Debug for CepClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CepClientConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("endpoint_type", &self.endpoint_type)
            .field("auth", &self.auth.kind())
            .field("trust_anchors", &self.trust_anchors)
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl CepClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CepClientConfigBuilder {
        CepClientConfigBuilder::new()
    }
}

/// Builder for [`CepClientConfig`].
#[derive(Default)]
pub struct CepClientConfigBuilder {
    endpoint: Option<Url>,
    endpoint_type: EndpointType,
    auth: Option<AuthConfig>,
    trust_anchors: Option<TrustAnchors>,
    timeout: Option<Duration>,
    poll_interval: Option<u64>,
    additional_headers: Vec<(String, String)>,
}

impl CepClientConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint URL.
    pub fn endpoint(mut self, url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        self.endpoint = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Set the endpoint URL from a pre-parsed URL.
    pub fn endpoint_parsed(mut self, url: Url) -> Self {
        self.endpoint = Some(url);
        self
    }

    /// Set the endpoint type.
    pub fn endpoint_type(mut self, endpoint_type: EndpointType) -> Self {
        self.endpoint_type = endpoint_type;
        self
    }

    /// Set the authentication mechanism.
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Use the built-in root store for server verification.
    pub fn trust_webpki_roots(mut self) -> Self {
        self.trust_anchors = Some(TrustAnchors::WebPki);
        self
    }

    /// Use explicit CA certificates for server verification.
    pub fn trust_explicit(mut self, ca_certs: Vec<Vec<u8>>) -> Self {
        self.trust_anchors = Some(TrustAnchors::Explicit(ca_certs));
        self
    }

    /// Accept any server certificate (insecure).
    pub fn trust_any_insecure(mut self) -> Self {
        self.trust_anchors = Some(TrustAnchors::InsecureAcceptAny);
        self
    }

    /// Set trust anchors directly.
    pub fn trust_anchors(mut self, anchors: TrustAnchors) -> Self {
        self.trust_anchors = Some(anchors);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the poll interval reported for pending requests.
    pub fn poll_interval(mut self, seconds: u64) -> Self {
        self.poll_interval = Some(seconds);
        self
    }

    /// Add an additional HTTP header to all requests.
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.push((name.into(), value.into()));
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not set.
    pub fn build(self) -> Result<CepClientConfig, &'static str> {
        let endpoint = self.endpoint.ok_or("endpoint is required")?;

        Ok(CepClientConfig {
            endpoint,
            endpoint_type: self.endpoint_type,
            auth: self.auth.unwrap_or(AuthConfig::Anonymous),
            trust_anchors: self.trust_anchors.unwrap_or(TrustAnchors::WebPki),
            timeout: self.timeout.unwrap_or(Duration::from_secs(30)),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            additional_headers: self.additional_headers,
        })
    }
}

/// Authentication mechanism with its credentials.
#[derive(Clone)]
pub enum AuthConfig {
    /// No credentials.
    Anonymous,
    /// Kerberos through SPNEGO.
    Kerberos(KerberosConfig),
    /// TLS client certificate.
    Certificate(ClientIdentity),
    /// Username and password.
    UsernamePassword(UsernamePasswordConfig),
}

impl AuthConfig {
    /// The mechanism this configuration selects.
    pub fn kind(&self) -> AuthKind {
        match self {
            Self::Anonymous => AuthKind::Anonymous,
            Self::Kerberos(_) => AuthKind::Kerberos,
            Self::Certificate(_) => AuthKind::Certificate,
            Self::UsernamePassword(_) => AuthKind::UsernamePassword,
        }
    }
}

/// Kerberos options.
#[derive(Debug, Clone)]
pub struct KerberosConfig {
    /// Keytab to initiate credentials from.
    pub keytab: Option<PathBuf>,
    /// Initialise a private in-memory credential cache.
    pub init_ccache: bool,
    /// Client principals to try, in order. Empty means the default principal.
    pub principals: Vec<String>,
    /// Request credential delegation.
    pub delegate: bool,
    /// Service part of the target principal.
    pub service: String,
}

impl Default for KerberosConfig {
    fn default() -> Self {
        Self {
            keytab: None,
            init_ccache: true,
            principals: Vec::new(),
            delegate: true,
            service: "HTTP".to_string(),
        }
    }
}

/// How a username and password are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordMode {
    /// WS-Security `UsernameToken` in the SOAP header.
    #[default]
    Message,
    /// HTTP Basic `Authorization` header.
    Basic,
}

impl FromStr for PasswordMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Message" | "message" => Ok(Self::Message),
            "Basic" | "basic" => Ok(Self::Basic),
            other => Err(format!("unknown password mode '{}'", other)),
        }
    }
}

/// Username and password credentials.
#[derive(Clone)]
pub struct UsernamePasswordConfig {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
    /// Presentation mode.
    pub mode: PasswordMode,
}

impl UsernamePasswordConfig {
    /// Create credentials in message mode.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            mode: PasswordMode::Message,
        }
    }
}

impl fmt::Debug for UsernamePasswordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsernamePasswordConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mode", &self.mode)
            .finish()
    }
}

/// Client identity for TLS client certificate authentication.
#[derive(Clone)]
pub struct ClientIdentity {
    /// PEM-encoded certificate chain, client certificate first.
    pub cert_pem: Vec<u8>,

    /// PEM-encoded private key.
    pub key_pem: Vec<u8>,
}

impl ClientIdentity {
    /// Create a new client identity from PEM-encoded data.
    pub fn new(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    /// Create a client identity from file paths.
    pub fn from_files(
        cert_path: impl AsRef<std::path::Path>,
        key_path: impl AsRef<std::path::Path>,
    ) -> std::io::Result<Self> {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        Ok(Self { cert_pem, key_pem })
    }
}

/// Trust anchor configuration for server certificate verification.
#[derive(Clone)]
pub enum TrustAnchors {
    /// Use the built-in root store.
    WebPki,

    /// Use explicit CA certificates (PEM-encoded bundles).
    Explicit(Vec<Vec<u8>>),

    /// Accept any server certificate.
    ///
    /// **WARNING**: This disables all server certificate verification.
    InsecureAcceptAny,
}

impl fmt::Debug for TrustAnchors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebPki => write!(f, "WebPki"),
            Self::Explicit(certs) => write!(f, "Explicit({} bundles)", certs.len()),
            Self::InsecureAcceptAny => write!(f, "InsecureAcceptAny"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = CepClientConfig::builder()
            .endpoint("https://cep.example.test/ADPolicyProvider_CEP_Kerberos/service.svc/CEP")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.endpoint_type, EndpointType::Policy);
        assert_eq!(config.auth.kind(), AuthKind::Anonymous);
        assert!(matches!(config.trust_anchors, TrustAnchors::WebPki));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_builder_requires_endpoint() {
        assert!(CepClientConfig::builder().build().is_err());
    }

    #[test]
    fn test_auth_kind_codes() {
        for kind in AuthKind::ALL {
            assert_eq!(AuthKind::from_xcep_code(kind.xcep_code()), Some(kind));
        }
        assert_eq!(AuthKind::from_xcep_code(3), None);
        assert_eq!("kerberos".parse::<AuthKind>().unwrap(), AuthKind::Kerberos);
        assert!("Digest".parse::<AuthKind>().is_err());
    }

    #[test]
    fn test_password_is_redacted() {
        let creds = UsernamePasswordConfig::new("alice", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}
