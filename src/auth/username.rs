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

//! Username and password authentication.

use base64::prelude::*;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::{PasswordMode, UsernamePasswordConfig};
use crate::error::{CepError, Result};
use crate::soap::types::{BASE64_BINARY, PASSWORD_TEXT};
use crate::soap::{Envelope, Security, TypedValue, UsernameToken};

/// Username/password credentials presented as a WS-Security token or as
/// HTTP Basic.
#[derive(Debug, Clone)]
pub struct UsernamePasswordAuth {
    credentials: UsernamePasswordConfig,
}

impl UsernamePasswordAuth {
    /// Wrap resolved credentials.
    pub fn new(credentials: UsernamePasswordConfig) -> Self {
        Self { credentials }
    }

    /// The presentation mode.
    pub fn mode(&self) -> PasswordMode {
        self.credentials.mode
    }

    /// A fresh `wsse:UsernameToken` with nonce and creation time.
    pub fn username_token(&self) -> Result<UsernameToken> {
        let now = OffsetDateTime::now_utc();
        let now = now.replace_nanosecond(0).unwrap_or(now);
        let created = now
            .format(&Rfc3339)
            .map_err(|e| CepError::authentication(format!("Cannot format timestamp: {}", e)))?;
        let nonce = BASE64_STANDARD.encode(uuid::Uuid::new_v4().as_bytes());

        Ok(UsernameToken {
            username: self.credentials.username.clone(),
            password: TypedValue {
                value_type: Some(PASSWORD_TEXT.to_string()),
                encoding_type: None,
                value: self.credentials.password.clone(),
            },
            nonce: Some(TypedValue {
                value_type: None,
                encoding_type: Some(BASE64_BINARY.to_string()),
                value: nonce,
            }),
            created: Some(created),
        })
    }

    pub(super) fn decorate_envelope(&self, envelope: &mut Envelope) -> Result<()> {
        if self.credentials.mode != PasswordMode::Message {
            return Ok(());
        }
        let header = envelope
            .header
            .as_mut()
            .ok_or_else(|| CepError::binding("Envelope has no header to carry credentials"))?;
        header.security = Some(Security {
            must_understand: Some(true),
            username_token: self.username_token()?,
        });
        Ok(())
    }

    pub(super) fn basic_authorization(&self) -> Option<String> {
        if self.credentials.mode != PasswordMode::Basic {
            return None;
        }
        let credentials = format!(
            "{}:{}",
            self.credentials.username, self.credentials.password
        );
        Some(format!("Basic {}", BASE64_STANDARD.encode(credentials)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding;
    use crate::xml::{ns, QName, XmlElement};
    use url::Url;

    fn envelope() -> Envelope {
        let to = Url::parse("https://cep.example.test/").unwrap();
        Envelope::new("urn:a", &to, XmlElement::new(QName::local("x")))
    }

    #[test]
    fn test_username_token_header_shape() {
        let auth = UsernamePasswordAuth::new(UsernamePasswordConfig::new("alice", "secret"));
        let mut env = envelope();
        auth.decorate_envelope(&mut env).unwrap();

        let element = binding::serialize(&env).unwrap();
        let header = element.child(&QName::new(ns::SOAP, "Header")).unwrap();
        let security = header.child(&QName::new(ns::WSSE, "Security")).unwrap();
        assert_eq!(
            security.attribute(&QName::new(ns::SOAP, "mustUnderstand")),
            Some("1")
        );

        let token = security.child(&QName::new(ns::WSSE, "UsernameToken")).unwrap();
        let username = token.child(&QName::new(ns::WSSE, "Username")).unwrap();
        assert_eq!(username.text(), "alice");

        let password = token.child(&QName::new(ns::WSSE, "Password")).unwrap();
        assert_eq!(password.text(), "secret");
        assert_eq!(password.attribute(&QName::local("Type")), Some(PASSWORD_TEXT));

        let nonce = token.child(&QName::new(ns::WSSE, "Nonce")).unwrap();
        assert_eq!(BASE64_STANDARD.decode(nonce.text()).unwrap().len(), 16);

        let created = token.child(&QName::new(ns::WSU, "Created")).unwrap();
        assert!(OffsetDateTime::parse(created.text(), &Rfc3339).is_ok());
        assert!(created.text().ends_with('Z'));
    }

    #[test]
    fn test_nonce_changes_per_token() {
        let auth = UsernamePasswordAuth::new(UsernamePasswordConfig::new("alice", "secret"));
        let a = auth.username_token().unwrap();
        let b = auth.username_token().unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_basic_mode_leaves_envelope_alone() {
        let mut creds = UsernamePasswordConfig::new("alice", "secret");
        creds.mode = PasswordMode::Basic;
        let auth = UsernamePasswordAuth::new(creds);

        let mut env = envelope();
        auth.decorate_envelope(&mut env).unwrap();
        assert!(env.header.unwrap().security.is_none());
    }
}
