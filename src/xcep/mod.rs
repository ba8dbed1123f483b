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

//! MS-XCEP certificate enrollment policy client.
//!
//! [`PolicyClient::get_policy`] downloads the enrollment policy and resolves
//! it into a [`PolicyResponse`]: templates, the certificate authorities that
//! issue them, and the enrollment endpoints of each authority.

mod chain;
pub mod types;

pub use chain::{
    common_name, parse_certificate, resolve_chain, CertificateChain, ChainCertificate,
    HttpIssuerFetcher, IssuerFetcher, MAX_CHAIN_DEPTH,
};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::AuthKind;
use crate::error::Result;
use crate::soap::SoapClient;
use types::{GetPolicies, GetPoliciesResponse, GET_POLICIES_ACTION};

/// An enrollment endpoint advertised for a CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Address of the enrollment service.
    pub uri: Url,
    /// Authentication it expects.
    pub authentication: AuthKind,
    /// Lower is preferred; `None` sorts last.
    pub priority: Option<u64>,
    /// Only renewals are accepted.
    pub renewal_only: bool,
}

impl Endpoint {
    fn sort_key(&self) -> u64 {
        self.priority.unwrap_or(u64::MAX)
    }
}

/// A certificate authority from the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateAuthority {
    /// `cAReferenceID`.
    pub reference_id: i64,
    /// CA certificate, PEM.
    pub certificate: String,
    /// Whether the caller may enroll through this CA.
    pub enroll_permission: bool,
    /// Enrollment endpoints in server order.
    pub endpoints: Vec<Endpoint>,
}

/// An OID from the policy's OID table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOid {
    /// Dotted OID.
    pub value: String,
    /// OID group.
    pub group: Option<i64>,
    /// `oIDReferenceID`.
    pub reference_id: i64,
    /// Display name.
    pub default_name: Option<String>,
}

/// A certificate template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTemplate {
    /// Template common name.
    pub name: String,
    /// Display name taken from the template's OID.
    pub friendly_name: Option<String>,
    /// Endpoints of every CA issuing this template, in reference order.
    pub endpoints: Vec<Endpoint>,
    /// Reference ids of the issuing CAs.
    pub ca_references: Vec<i64>,
    /// How long before expiry renewal should start.
    pub renewal_period: Option<Duration>,
    /// Lifetime of issued certificates.
    pub validity_period: Option<Duration>,
}

impl PolicyTemplate {
    /// Exact match on the friendly name or the common name.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.friendly_name.as_deref() == Some(name)
    }
}

/// A resolved `GetPoliciesResponse`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyResponse {
    /// Policy identifier.
    pub policy_id: String,
    /// Policy display name.
    pub friendly_name: Option<String>,
    /// Hours until the policy should be refreshed.
    pub next_update_hours: Option<u64>,
    /// Templates in server order.
    pub templates: Vec<PolicyTemplate>,
    /// Certificate authorities in server order.
    pub authorities: Vec<CertificateAuthority>,
    /// OID table.
    pub oids: Vec<PolicyOid>,
}

impl PolicyResponse {
    /// Resolve references of a wire response.
    pub fn from_wire(wire: GetPoliciesResponse) -> Self {
        let authorities: Vec<CertificateAuthority> = wire
            .cas
            .into_iter()
            .map(|ca| CertificateAuthority {
                reference_id: ca.reference_id,
                certificate: ca.certificate,
                enroll_permission: ca.enroll_permission,
                endpoints: ca
                    .uris
                    .into_iter()
                    .filter_map(|uri| match Url::parse(&uri.uri) {
                        Ok(parsed) => Some(Endpoint {
                            uri: parsed,
                            authentication: uri.client_authentication,
                            priority: uri.priority,
                            renewal_only: uri.renewal_only.unwrap_or(false),
                        }),
                        Err(e) => {
                            warn!("Ignoring endpoint '{}': {}", uri.uri, e);
                            None
                        }
                    })
                    .collect(),
            })
            .collect();

        let oids: Vec<PolicyOid> = wire
            .oids
            .into_iter()
            .map(|oid| PolicyOid {
                value: oid.value,
                group: oid.group,
                reference_id: oid.reference_id,
                default_name: oid.default_name.filter(|n| !n.is_empty()),
            })
            .collect();

        let Some(response) = wire.response else {
            return Self {
                authorities,
                oids,
                ..Self::default()
            };
        };

        let mut templates = Vec::with_capacity(response.policies.len());
        for policy in response.policies {
            let Some(attributes) = policy.attributes else {
                warn!("Skipping template without attributes in policy {}", response.policy_id);
                continue;
            };

            let friendly_name = policy.policy_oid_reference.and_then(|reference| {
                oids.iter()
                    .find(|oid| oid.reference_id == reference)
                    .and_then(|oid| oid.default_name.clone())
            });

            let mut endpoints = Vec::new();
            for reference in &policy.ca_references {
                match authorities.iter().find(|ca| ca.reference_id == *reference) {
                    Some(ca) => endpoints.extend(ca.endpoints.iter().cloned()),
                    None => warn!(
                        "Template {} references unknown CA {}",
                        attributes.common_name, reference
                    ),
                }
            }

            let validity = attributes.certificate_validity;
            templates.push(PolicyTemplate {
                name: attributes.common_name,
                friendly_name,
                endpoints,
                ca_references: policy.ca_references,
                renewal_period: validity.map(|v| Duration::from_secs(v.renewal_period_seconds)),
                validity_period: validity.map(|v| Duration::from_secs(v.validity_period_seconds)),
            });
        }

        Self {
            policy_id: response.policy_id,
            friendly_name: response.policy_friendly_name.filter(|n| !n.is_empty()),
            next_update_hours: response.next_update_hours,
            templates,
            authorities,
            oids,
        }
    }

    /// The template called `name`, by friendly name or common name.
    ///
    /// Matching is exact and case-sensitive.
    pub fn find_template(&self, name: &str) -> Option<&PolicyTemplate> {
        self.templates.iter().find(|t| t.matches(name))
    }

    /// Template common names in server order.
    pub fn template_names(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.name.as_str()).collect()
    }

    /// Endpoints accepting `kind`, most preferred first.
    ///
    /// With a template, only the CAs issuing it are considered. Endpoints of
    /// equal priority keep server order.
    pub fn endpoints_for<'a>(
        &'a self,
        kind: AuthKind,
        template: Option<&'a PolicyTemplate>,
    ) -> Vec<&'a Endpoint> {
        let mut endpoints: Vec<&Endpoint> = match template {
            Some(t) => t.endpoints.iter().collect(),
            None => self.authorities.iter().flat_map(|ca| ca.endpoints.iter()).collect(),
        };
        endpoints.retain(|e| e.authentication == kind);
        endpoints.sort_by_key(|e| e.sort_key());
        endpoints
    }

    /// The preferred endpoint for a new request or a renewal.
    ///
    /// Renewal-only endpoints are skipped unless `renew` is set.
    pub fn select_endpoint<'a>(
        &'a self,
        kind: AuthKind,
        renew: bool,
        template: Option<&'a PolicyTemplate>,
    ) -> Option<&'a Endpoint> {
        self.endpoints_for(kind, template)
            .into_iter()
            .find(|e| renew || !e.renewal_only)
    }

    /// PEM of the first CA certificate.
    pub fn first_ca_certificate(&self) -> Option<&str> {
        self.authorities.first().map(|ca| ca.certificate.as_str())
    }
}

/// Client for an XCEP policy endpoint.
#[derive(Clone)]
pub struct PolicyClient {
    soap: SoapClient,
    endpoint: Url,
    fetcher: Arc<dyn IssuerFetcher>,
}

impl std::fmt::Debug for PolicyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

impl PolicyClient {
    /// Create a client for `endpoint`, fetching AIA issuers over HTTP.
    pub fn new(soap: SoapClient, endpoint: Url) -> Self {
        let fetcher = Arc::new(HttpIssuerFetcher::new(soap.http().clone()));
        Self {
            soap,
            endpoint,
            fetcher,
        }
    }

    /// Replace the AIA issuer fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn IssuerFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// The policy endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Download and resolve the enrollment policy.
    ///
    /// # Errors
    ///
    /// Transport errors and faults from [`SoapClient::send`], or a binding
    /// error if the response does not follow the XCEP schema.
    pub async fn get_policy(&self) -> Result<PolicyResponse> {
        debug!("Requesting enrollment policy from {}", self.endpoint);
        let wire: GetPoliciesResponse = self
            .soap
            .send(&self.endpoint, GET_POLICIES_ACTION, &GetPolicies::default())
            .await?;

        let policy = PolicyResponse::from_wire(wire);
        info!(
            "Policy {} lists {} template(s) from {} CA(s)",
            policy.policy_id,
            policy.templates.len(),
            policy.authorities.len()
        );
        Ok(policy)
    }

    /// Build the CA chain above the first CA of `policy`.
    ///
    /// An empty chain is returned if the policy lists no CA.
    pub async fn fetch_roots(&self, policy: &PolicyResponse) -> Result<CertificateChain> {
        let Some(pem) = policy.first_ca_certificate() else {
            warn!("Policy lists no certificate authority");
            return Ok(CertificateChain::default());
        };
        resolve_chain(pem.as_bytes(), self.fetcher.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding;
    use crate::soap::Envelope;
    use crate::xml::XmlElement;

    const MULTI: &str = include_str!("../../tests/fixtures/xcep/get_policies_multi.xml");
    const ADCS: &str = include_str!("../../tests/fixtures/xcep/get_policies_adcs.xml");

    fn load(doc: &str) -> PolicyResponse {
        let doc = doc.replace("{{SERVER}}", "https://ca.example.test");
        let element = XmlElement::parse(doc.as_bytes()).unwrap();
        let envelope: Envelope = binding::deserialize(&element).unwrap();
        let wire: GetPoliciesResponse = binding::deserialize(envelope.payload()).unwrap();
        PolicyResponse::from_wire(wire)
    }

    #[test]
    fn test_templates_in_document_order() {
        let policy = load(MULTI);
        assert_eq!(policy.template_names(), vec!["Machine", "WebServer", "User"]);
        assert_eq!(policy.friendly_name.as_deref(), Some("Example Enterprise Policy"));
        assert_eq!(policy.next_update_hours, Some(8));

        let web = &policy.templates[1];
        assert_eq!(web.friendly_name.as_deref(), Some("Corporate Web Server"));
        assert_eq!(web.ca_references, vec![0, 1]);
        assert_eq!(web.endpoints.len(), 5);
        assert_eq!(web.validity_period, Some(Duration::from_secs(63072000)));

        let user = &policy.templates[2];
        assert_eq!(user.friendly_name, None);
        assert_eq!(user.renewal_period, None);
    }

    #[test]
    fn test_adcs_sample() {
        let policy = load(ADCS);
        assert_eq!(policy.policy_id, "{DA239A97-1289-4B14-924F-B318D56ED254}");
        assert_eq!(policy.friendly_name, None);
        assert_eq!(policy.template_names(), vec!["Machine"]);

        // policyOIDReference 13 is not in the OID table.
        let machine = &policy.templates[0];
        assert_eq!(machine.friendly_name, None);
        assert_eq!(machine.renewal_period, Some(Duration::from_secs(3628800)));
        assert_eq!(
            machine.endpoints,
            vec![Endpoint {
                uri: Url::parse(
                    "https://win-ca01.mars.milkyway.site/MARS-ROOT-CA_CES_Kerberos/service.svc/CES"
                )
                .unwrap(),
                authentication: AuthKind::Kerberos,
                priority: Some(1),
                renewal_only: false,
            }]
        );

        let ca = &policy.authorities[0];
        assert!(ca.enroll_permission);
        assert!(ca.certificate.starts_with("-----BEGIN CERTIFICATE-----\nMIIFrTCCA5Wg"));
        let cert = parse_certificate(ca.certificate.as_bytes()).unwrap();
        assert_eq!(common_name(&cert).as_deref(), Some("MARS-ROOT-CA"));
    }

    #[test]
    fn test_find_template_is_exact() {
        let policy = load(MULTI);
        assert_eq!(policy.find_template("WebServer").unwrap().name, "WebServer");
        assert_eq!(
            policy.find_template("Corporate Web Server").unwrap().name,
            "WebServer"
        );
        assert!(policy.find_template("webserver").is_none());
        assert!(policy.find_template("Corporate").is_none());
    }

    #[test]
    fn test_endpoint_selection_by_kind_and_priority() {
        let policy = load(MULTI);

        let kerberos = policy.endpoints_for(AuthKind::Kerberos, None);
        assert_eq!(kerberos.len(), 2);
        assert_eq!(kerberos[0].priority, Some(1));
        assert!(kerberos[0].renewal_only);

        let new = policy.select_endpoint(AuthKind::Kerberos, false, None).unwrap();
        assert_eq!(new.uri.path(), "/Issuing-CA_CES_Kerberos/service.svc/CES");

        let renew = policy.select_endpoint(AuthKind::Kerberos, true, None).unwrap();
        assert_eq!(renew.uri.path(), "/Issuing-CA_CES_Kerberos_Renew/service.svc/CES");

        assert!(policy
            .select_endpoint(AuthKind::Certificate, false, None)
            .is_none());
    }

    #[test]
    fn test_endpoint_selection_within_template() {
        let policy = load(MULTI);
        let user = policy.find_template("User");

        let anonymous = policy.select_endpoint(AuthKind::Anonymous, false, user).unwrap();
        assert_eq!(anonymous.uri.path(), "/Second-CA_CES_Anonymous/service.svc/CES");

        // Nil priority sorts after explicit priorities.
        let up = policy.endpoints_for(AuthKind::UsernamePassword, user);
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].priority, None);
        assert!(!up[0].renewal_only);

        assert!(policy
            .select_endpoint(AuthKind::Kerberos, false, user)
            .is_none());
    }

    #[test]
    fn test_nil_response_body() {
        let doc = format!(
            r#"<GetPoliciesResponse xmlns="{}" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
                 <response xsi:nil="true"/><cAs xsi:nil="true"/><oIDs xsi:nil="true"/>
               </GetPoliciesResponse>"#,
            crate::xml::ns::XCEP
        );
        let element = XmlElement::parse(doc.as_bytes()).unwrap();
        let wire: GetPoliciesResponse = binding::deserialize(&element).unwrap();
        let policy = PolicyResponse::from_wire(wire);
        assert!(policy.templates.is_empty());
        assert!(policy.first_ca_certificate().is_none());
    }

    #[test]
    fn test_policy_without_attributes_is_skipped() {
        let doc = format!(
            r#"<GetPoliciesResponse xmlns="{}" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
                 <response>
                   <policyID>policy-1</policyID>
                   <policies>
                     <policy><cAs xsi:nil="true"/><attributes xsi:nil="true"/></policy>
                     <policy><cAs xsi:nil="true"/></policy>
                     <policy><cAs xsi:nil="true"/><attributes><commonName>Machine</commonName></attributes></policy>
                   </policies>
                 </response>
                 <cAs xsi:nil="true"/><oIDs xsi:nil="true"/>
               </GetPoliciesResponse>"#,
            crate::xml::ns::XCEP
        );
        let element = XmlElement::parse(doc.as_bytes()).unwrap();
        let wire: GetPoliciesResponse = binding::deserialize(&element).unwrap();
        assert_eq!(wire.response.as_ref().unwrap().policies.len(), 3);

        let policy = PolicyResponse::from_wire(wire);
        assert_eq!(policy.template_names(), vec!["Machine"]);
    }
}
