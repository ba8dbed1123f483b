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

//! Kerberos authentication through HTTP Negotiate (SPNEGO).
//!
//! The exchange is driven by 401 responses. The first `WWW-Authenticate:
//! Negotiate` challenge starts a security context for `HTTP@<host>`; each
//! continuation token from the server is fed back until the server accepts
//! the request or [`MAX_ROUNDS`] is exceeded. A mutual-authentication token
//! on the final response is passed to the context as well.
//!
//! The GSSAPI library is reached through [`ContextProvider`]. The system
//! provider needs the `gssapi` cargo feature.

use std::sync::{Arc, Mutex};

use base64::prelude::*;
use url::Url;

use crate::config::KerberosConfig;
use crate::error::{CepError, Result};

/// Maximum number of Negotiate tokens sent for one message.
pub const MAX_ROUNDS: usize = 3;

/// Starts client security contexts.
pub trait ContextProvider: Send + Sync {
    /// Start a context for `target` (`service@host`).
    fn start(&self, target: &str, delegate: bool) -> Result<Box<dyn SecurityContext>>;
}

/// One client-side GSSAPI context.
pub trait SecurityContext: Send {
    /// Process a server token (none on the first call) and produce the next
    /// token to send, if any.
    fn step(&mut self, token: Option<&[u8]>) -> Result<Option<Vec<u8>>>;

    /// Whether the context is fully established.
    fn is_complete(&self) -> bool;
}

#[derive(Default)]
struct Negotiation {
    context: Option<Box<dyn SecurityContext>>,
    rounds: usize,
}

/// SPNEGO authenticator.
pub struct KerberosAuth {
    provider: Arc<dyn ContextProvider>,
    service: String,
    delegate: bool,
    state: Mutex<Negotiation>,
}

impl KerberosAuth {
    /// Create an authenticator backed by the system GSSAPI library.
    ///
    /// # Errors
    ///
    /// Returns [`CepError::Underconfigured`] when built without the
    /// `gssapi` feature.
    pub fn new(config: &KerberosConfig) -> Result<Self> {
        let provider = system_provider(config)?;
        Ok(Self::with_provider(
            provider,
            config.service.clone(),
            config.delegate,
        ))
    }

    /// Create an authenticator with an explicit context provider.
    pub fn with_provider(
        provider: Arc<dyn ContextProvider>,
        service: impl Into<String>,
        delegate: bool,
    ) -> Self {
        Self {
            provider,
            service: service.into(),
            delegate,
            state: Mutex::new(Negotiation::default()),
        }
    }

    /// Target name for `url`, e.g. `HTTP@cep.example.com`.
    pub fn target_for(&self, url: &Url) -> Result<String> {
        let host = url
            .host_str()
            .ok_or_else(|| CepError::authentication(format!("{} has no host", url)))?;
        Ok(format!("{}@{}", self.service, host))
    }

    pub(super) fn respond_to_challenge(
        &self,
        url: &Url,
        challenges: &[String],
    ) -> Result<Option<String>> {
        let token = match negotiate_token(challenges)? {
            Some(token) => token,
            None => return Ok(None),
        };

        let mut state = self.lock()?;

        if state.context.is_some() && token.is_none() {
            *state = Negotiation::default();
            return Err(CepError::authentication(
                "Server rejected the Kerberos token",
            ));
        }

        state.rounds += 1;
        if state.rounds > MAX_ROUNDS {
            *state = Negotiation::default();
            return Err(CepError::authentication(format!(
                "Negotiation did not finish within {} rounds",
                MAX_ROUNDS
            )));
        }

        let (mut context, input) = match state.context.take() {
            Some(context) => (context, token),
            None => {
                let target = self.target_for(url)?;
                tracing::debug!("Starting Kerberos context for {}", target);
                (self.provider.start(&target, self.delegate)?, None)
            }
        };
        let output = context.step(input.as_deref());
        state.context = Some(context);

        match output? {
            Some(bytes) => Ok(Some(format!("Negotiate {}", BASE64_STANDARD.encode(bytes)))),
            None => {
                *state = Negotiation::default();
                Err(CepError::authentication(
                    "Kerberos context produced no token for the server",
                ))
            }
        }
    }

    pub(super) fn complete(&self, challenges: &[String]) -> Result<()> {
        let mut state = self.lock()?;
        let mut finished = std::mem::take(&mut *state);

        if let Some(ref mut context) = finished.context {
            if let Some(Some(token)) = negotiate_token(challenges)? {
                context.step(Some(token.as_slice()))?;
            }
            if !context.is_complete() {
                tracing::warn!("Server accepted the request before mutual authentication finished");
            }
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Negotiation>> {
        self.state
            .lock()
            .map_err(|_| CepError::authentication("Kerberos state is poisoned"))
    }
}

/// Find a Negotiate challenge.
///
/// Returns `None` if none was offered, `Some(None)` for a bare challenge and
/// `Some(Some(token))` for a continuation.
fn negotiate_token(challenges: &[String]) -> Result<Option<Option<Vec<u8>>>> {
    for challenge in challenges.iter().flat_map(|c| c.split(',')) {
        let challenge = challenge.trim();
        let (scheme, rest) = match challenge.split_once(' ') {
            Some((scheme, rest)) => (scheme, rest.trim()),
            None => (challenge, ""),
        };
        if !scheme.eq_ignore_ascii_case("Negotiate") {
            continue;
        }
        if rest.is_empty() {
            return Ok(Some(None));
        }
        let token = BASE64_STANDARD
            .decode(rest)
            .map_err(|e| CepError::authentication(format!("Malformed Negotiate token: {}", e)))?;
        return Ok(Some(Some(token)));
    }
    Ok(None)
}

#[cfg(not(feature = "gssapi"))]
fn system_provider(_config: &KerberosConfig) -> Result<Arc<dyn ContextProvider>> {
    Err(CepError::underconfigured(
        "Kerberos authentication requires the gssapi feature",
    ))
}

#[cfg(feature = "gssapi")]
fn system_provider(config: &KerberosConfig) -> Result<Arc<dyn ContextProvider>> {
    Ok(Arc::new(gssapi::GssapiProvider::new(config)))
}

#[cfg(feature = "gssapi")]
mod gssapi {
    use libgssapi::context::{ClientCtx, CtxFlags, SecurityContext as _};
    use libgssapi::credential::{Cred, CredUsage};
    use libgssapi::name::Name;
    use libgssapi::oid::{
        OidSet, GSS_MECH_KRB5, GSS_MECH_SPNEGO, GSS_NT_HOSTBASED_SERVICE, GSS_NT_KRB5_PRINCIPAL,
    };

    use super::{ContextProvider, SecurityContext};
    use crate::config::KerberosConfig;
    use crate::error::{CepError, Result};

    fn gss_error(e: libgssapi::error::Error) -> CepError {
        CepError::authentication(format!("GSSAPI: {}", e))
    }

    pub(super) struct GssapiProvider {
        principals: Vec<String>,
    }

    impl GssapiProvider {
        pub(super) fn new(config: &KerberosConfig) -> Self {
            if config.init_ccache {
                std::env::set_var("KRB5CCNAME", "MEMORY:cepces");
            }
            if let Some(ref keytab) = config.keytab {
                std::env::set_var("KRB5_CLIENT_KTNAME", keytab);
            }
            Self {
                principals: config.principals.clone(),
            }
        }

        fn credential(&self) -> Result<Option<Cred>> {
            if self.principals.is_empty() {
                return Ok(None);
            }

            let mut mechs = OidSet::new().map_err(gss_error)?;
            mechs.add(&GSS_MECH_KRB5).map_err(gss_error)?;

            let mut last_error = None;
            for principal in &self.principals {
                let name = Name::new(principal.as_bytes(), Some(&GSS_NT_KRB5_PRINCIPAL))
                    .map_err(gss_error)?;
                match Cred::acquire(Some(&name), None, CredUsage::Initiate, Some(&mechs)) {
                    Ok(cred) => {
                        tracing::info!("Using Kerberos principal {}", principal);
                        return Ok(Some(cred));
                    }
                    Err(e) => {
                        tracing::warn!("No credentials for principal {}: {}", principal, e);
                        last_error = Some(e);
                    }
                }
            }

            Err(CepError::authentication(match last_error {
                Some(e) => format!("No usable Kerberos principal: {}", e),
                None => "No usable Kerberos principal".to_string(),
            }))
        }
    }

    impl ContextProvider for GssapiProvider {
        fn start(&self, target: &str, delegate: bool) -> Result<Box<dyn SecurityContext>> {
            let name =
                Name::new(target.as_bytes(), Some(&GSS_NT_HOSTBASED_SERVICE)).map_err(gss_error)?;
            let cred = self.credential()?;

            let mut flags = CtxFlags::GSS_C_MUTUAL_FLAG | CtxFlags::GSS_C_SEQUENCE_FLAG;
            if delegate {
                flags |= CtxFlags::GSS_C_DELEG_FLAG;
            }

            let ctx = ClientCtx::new(cred, name, flags, Some(&GSS_MECH_SPNEGO));
            Ok(Box::new(GssapiContext(ctx)))
        }
    }

    struct GssapiContext(ClientCtx);

    impl SecurityContext for GssapiContext {
        fn step(&mut self, token: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
            let output = self.0.step(token, None).map_err(gss_error)?;
            Ok(output.map(|buf| buf.to_vec()))
        }

        fn is_complete(&self) -> bool {
            self.0.is_complete()
        }
    }
}
