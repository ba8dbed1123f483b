// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Settings file for the certmonger helper.
//!
//! The settings file is TOML and describes a single policy or enrollment
//! endpoint with its credentials.
//!
//! # Example Settings
//!
//! ```toml
//! [global]
//! endpoint = "https://ca.ad.example.test/ADPolicyProvider_CEP_Kerberos/service.svc/CEP"
//! type = "Policy"
//! auth = "Kerberos"
//! cas = "/etc/pki/tls/certs/ca-bundle.crt"
//! poll_interval = 3600
//!
//! [kerberos]
//! keytab = "/etc/krb5.keytab"
//! principals = ["${SHORTNAME}$", "host/${fqdn}"]
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use usg_cep_client::settings::SettingsLoader;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::new().load()?;
//! let config = settings.to_client_config()?;
//! # Ok(())
//! # }
//! ```

mod expand;
mod loader;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    AuthConfig, AuthKind, CepClientConfig, ClientIdentity, DEFAULT_POLL_INTERVAL, EndpointType,
    KerberosConfig, PasswordMode, UsernamePasswordConfig,
};
use crate::error::{CepError, Result};

pub use expand::expand_variables;
pub use loader::{ENV_VAR, SettingsLoader};

/// Complete settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Endpoint, trust and timing.
    #[serde(default)]
    pub global: GlobalSettings,

    /// Kerberos options.
    #[serde(default)]
    pub kerberos: KerberosSettings,

    /// TLS client certificate.
    #[serde(default)]
    pub certificate: CertificateSettings,

    /// Username and password.
    #[serde(default)]
    pub usernamepassword: UsernamePasswordSettings,

    /// Logging options.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// The `[global]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Policy or enrollment endpoint URL.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// `Policy` or `Enrollment`.
    #[serde(rename = "type", default = "default_type")]
    pub endpoint_type: String,

    /// `Anonymous`, `Kerberos`, `Certificate` or `UsernamePassword`.
    #[serde(default = "default_auth")]
    pub auth: String,

    /// CA bundle file or directory. `""` disables verification.
    #[serde(default)]
    pub cas: Option<String>,

    /// Seconds certmonger should wait before polling.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            endpoint_type: default_type(),
            auth: default_auth(),
            cas: None,
            poll_interval: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

/// The `[kerberos]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KerberosSettings {
    /// Keytab for the client principal.
    #[serde(default)]
    pub keytab: Option<PathBuf>,

    /// Initialise a private credential cache.
    #[serde(default = "default_true")]
    pub ccache: bool,

    /// Principals to try, in order.
    #[serde(default)]
    pub principals: Vec<String>,

    /// Request credential delegation.
    #[serde(default = "default_true")]
    pub delegate: bool,

    /// Service part of the target principal.
    #[serde(default = "default_service")]
    pub service: String,
}

impl Default for KerberosSettings {
    fn default() -> Self {
        Self {
            keytab: None,
            ccache: true,
            principals: Vec::new(),
            delegate: true,
            service: default_service(),
        }
    }
}

/// The `[certificate]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateSettings {
    /// PEM certificate (chain).
    #[serde(default)]
    pub certfile: Option<PathBuf>,

    /// PEM private key.
    #[serde(default)]
    pub keyfile: Option<PathBuf>,
}

/// The `[usernamepassword]` section.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsernamePasswordSettings {
    /// Username.
    #[serde(default)]
    pub username: Option<String>,

    /// Password.
    #[serde(default)]
    pub password: Option<String>,

    /// `Message` or `Basic`.
    #[serde(default)]
    pub mode: Option<String>,
}

impl std::fmt::Debug for UsernamePasswordSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernamePasswordSettings")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("mode", &self.mode)
            .finish()
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// `error`, `warn`, `info`, `debug` or `trace`.
    #[serde(default)]
    pub level: Option<String>,
}

fn default_type() -> String {
    EndpointType::Policy.to_string()
}

fn default_auth() -> String {
    AuthKind::Kerberos.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL
}

fn default_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_service() -> String {
    "HTTP".to_string()
}

impl Settings {
    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or has unknown keys.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| CepError::config(format!("Invalid TOML: {e}")))
    }

    /// Expand all variable references in string values.
    pub fn expand_variables(&mut self) {
        self.expand_with(&expand_variables);
    }

    pub(crate) fn expand_with(&mut self, expand: &dyn Fn(&str) -> String) {
        let expand_path = |p: &mut PathBuf| *p = PathBuf::from(expand(&p.to_string_lossy()));

        if let Some(endpoint) = self.global.endpoint.as_mut() {
            *endpoint = expand(endpoint);
        }
        if let Some(cas) = self.global.cas.as_mut() {
            *cas = expand(cas);
        }

        if let Some(keytab) = self.kerberos.keytab.as_mut() {
            expand_path(keytab);
        }
        for principal in &mut self.kerberos.principals {
            *principal = expand(principal);
        }

        if let Some(certfile) = self.certificate.certfile.as_mut() {
            expand_path(certfile);
        }
        if let Some(keyfile) = self.certificate.keyfile.as_mut() {
            expand_path(keyfile);
        }

        if let Some(username) = self.usernamepassword.username.as_mut() {
            *username = expand(username);
        }
    }

    /// The configured authentication mechanism.
    pub fn auth_kind(&self) -> Result<AuthKind> {
        self.global.auth.parse().map_err(CepError::config)
    }

    /// Build the client configuration these settings describe.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is missing or invalid, a name is not
    /// recognised, credentials for the chosen mechanism are missing, or the
    /// CA bundle cannot be read.
    pub fn to_client_config(&self) -> Result<CepClientConfig> {
        let endpoint = self
            .global
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| CepError::config("global.endpoint is not set"))?;

        let endpoint_type: EndpointType =
            self.global.endpoint_type.parse().map_err(CepError::config)?;

        let trust_anchors = crate::tls::load_trust_anchors(self.global.cas.as_deref())?;

        CepClientConfig::builder()
            .endpoint(endpoint)
            .map_err(|e| CepError::config(format!("Invalid endpoint URL: {e}")))?
            .endpoint_type(endpoint_type)
            .auth(self.auth_config()?)
            .trust_anchors(trust_anchors)
            .timeout(Duration::from_secs(self.global.timeout_secs))
            .poll_interval(self.global.poll_interval)
            .build()
            .map_err(CepError::config)
    }

    fn auth_config(&self) -> Result<AuthConfig> {
        Ok(match self.auth_kind()? {
            AuthKind::Anonymous => AuthConfig::Anonymous,
            AuthKind::Kerberos => AuthConfig::Kerberos(KerberosConfig {
                keytab: self.kerberos.keytab.clone(),
                init_ccache: self.kerberos.ccache,
                principals: self.kerberos.principals.clone(),
                delegate: self.kerberos.delegate,
                service: self.kerberos.service.clone(),
            }),
            AuthKind::Certificate => {
                let (Some(certfile), Some(keyfile)) =
                    (&self.certificate.certfile, &self.certificate.keyfile)
                else {
                    return Err(CepError::config(
                        "certificate.certfile and certificate.keyfile are required",
                    ));
                };
                let identity = ClientIdentity::from_files(certfile, keyfile).map_err(|e| {
                    CepError::config(format!("Failed to read client certificate: {e}"))
                })?;
                AuthConfig::Certificate(identity)
            }
            AuthKind::UsernamePassword => {
                let section = &self.usernamepassword;
                let (Some(username), Some(password)) = (&section.username, &section.password)
                else {
                    return Err(CepError::config(
                        "usernamepassword.username and usernamepassword.password are required",
                    ));
                };
                let mode: PasswordMode = match &section.mode {
                    Some(mode) => mode.parse().map_err(CepError::config)?,
                    None => PasswordMode::default(),
                };
                AuthConfig::UsernamePassword(UsernamePasswordConfig {
                    username: username.clone(),
                    password: password.clone(),
                    mode,
                })
            }
        })
    }
}
