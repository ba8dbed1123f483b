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

//! MS-XCEP message types.
//!
//! These mirror the wire schema one to one. [`super::PolicyResponse`] is the
//! resolved model built from them.

use crate::binding::{Field, Record, Scalar, Schema, XmlBinding};
use crate::config::AuthKind;
use crate::error::{CepError, Result};
use crate::xml::ns::XCEP;

/// SOAP action of the `GetPolicies` operation.
pub const GET_POLICIES_ACTION: &str =
    "http://schemas.microsoft.com/windows/pki/2009/01/enrollmentpolicy/IPolicy/GetPolicies";

/// `xcep:GetPolicies` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetPolicies {
    /// Client state.
    pub client: Client,
    /// Filter narrowing the returned policies.
    pub request_filter: RequestFilter,
}

impl XmlBinding for GetPolicies {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "GetPolicies",
            &[
                Field::node("client", XCEP, "client", Client::schema),
                Field::node("request_filter", XCEP, "requestFilter", RequestFilter::schema),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_node("client", &self.client)
            .with_node("request_filter", &self.request_filter)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            client: record.take_node("client")?,
            request_filter: record.take_node("request_filter")?,
        })
    }
}

/// `xcep:client`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Client {
    /// Time of the last policy download.
    pub last_update: Option<String>,
    /// Preferred language for display names.
    pub preferred_language: Option<String>,
}

impl XmlBinding for Client {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "client",
            &[
                Field::leaf("last_update", XCEP, "lastUpdate", Scalar::String)
                    .optional()
                    .nillable(),
                Field::leaf("preferred_language", XCEP, "preferredLanguage", Scalar::String)
                    .optional()
                    .nillable(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt("last_update", self.last_update.clone())
            .with_opt("preferred_language", self.preferred_language.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            last_update: record.take_opt_text("last_update")?,
            preferred_language: record.take_opt_text("preferred_language")?,
        })
    }
}

/// `xcep:requestFilter`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestFilter {
    /// Policy OIDs of interest; empty asks for all of them.
    pub policy_oids: Vec<String>,
    /// Client version.
    pub client_version: Option<i64>,
    /// Server version.
    pub server_version: Option<i64>,
}

impl XmlBinding for RequestFilter {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "requestFilter",
            &[
                Field::leaf("policy_oids", XCEP, "oid", Scalar::String)
                    .many()
                    .wrapped("policyOIDs")
                    .nillable(),
                Field::leaf("client_version", XCEP, "clientVersion", Scalar::Integer)
                    .optional()
                    .nillable(),
                Field::leaf("server_version", XCEP, "serverVersion", Scalar::Integer)
                    .optional()
                    .nillable(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_list("policy_oids", self.policy_oids.clone())
            .with_opt("client_version", self.client_version)
            .with_opt("server_version", self.server_version)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            policy_oids: record.take_texts("policy_oids")?,
            client_version: record.take_opt_int("client_version")?,
            server_version: record.take_opt_int("server_version")?,
        })
    }
}

/// `xcep:GetPoliciesResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct GetPoliciesResponse {
    /// The policy body; nil when the server has nothing to offer.
    pub response: Option<Response>,
    /// Certificate authorities referenced by the policies.
    pub cas: Vec<Ca>,
    /// OIDs referenced by the policies.
    pub oids: Vec<Oid>,
}

impl XmlBinding for GetPoliciesResponse {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "GetPoliciesResponse",
            &[
                Field::node("response", XCEP, "response", Response::schema)
                    .optional()
                    .nillable(),
                Field::node("cas", XCEP, "cA", Ca::schema)
                    .many()
                    .wrapped("cAs")
                    .nillable(),
                Field::node("oids", XCEP, "oID", Oid::schema)
                    .many()
                    .wrapped("oIDs")
                    .nillable(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt_node("response", self.response.as_ref())
            .with_nodes("cas", &self.cas)
            .with_nodes("oids", &self.oids)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            response: record.take_opt_node("response")?,
            cas: record.take_nodes("cas")?,
            oids: record.take_nodes("oids")?,
        })
    }
}

/// `xcep:response`.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Identifier of the policy.
    pub policy_id: String,
    /// Display name of the policy.
    pub policy_friendly_name: Option<String>,
    /// Hours until the client should refresh.
    pub next_update_hours: Option<u64>,
    /// Whether the policies are unchanged since `lastUpdate`.
    pub policies_not_changed: Option<bool>,
    /// Certificate templates.
    pub policies: Vec<Policy>,
}

impl XmlBinding for Response {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "response",
            &[
                Field::leaf("policy_id", XCEP, "policyID", Scalar::String),
                Field::leaf("policy_friendly_name", XCEP, "policyFriendlyName", Scalar::String)
                    .optional()
                    .nillable(),
                Field::leaf("next_update_hours", XCEP, "nextUpdateHours", Scalar::Unsigned)
                    .optional()
                    .nillable(),
                Field::leaf("policies_not_changed", XCEP, "policiesNotChanged", Scalar::Boolean)
                    .optional()
                    .nillable(),
                Field::node("policies", XCEP, "policy", Policy::schema)
                    .many()
                    .wrapped("policies")
                    .nillable(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("policy_id", self.policy_id.clone())
            .with_opt("policy_friendly_name", self.policy_friendly_name.clone())
            .with_opt("next_update_hours", self.next_update_hours)
            .with_opt("policies_not_changed", self.policies_not_changed)
            .with_nodes("policies", &self.policies)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            policy_id: record.take_text("policy_id")?,
            policy_friendly_name: record.take_opt_text("policy_friendly_name")?,
            next_update_hours: record.take_opt_uint("next_update_hours")?,
            policies_not_changed: record.take_opt_bool("policies_not_changed")?,
            policies: record.take_nodes("policies")?,
        })
    }
}

/// `xcep:policy`, one certificate template.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// `oIDReferenceID` of the template's OID.
    pub policy_oid_reference: Option<i64>,
    /// `cAReferenceID`s of the CAs issuing this template.
    pub ca_references: Vec<i64>,
    /// Template attributes.
    pub attributes: Option<Attributes>,
}

impl XmlBinding for Policy {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "policy",
            &[
                Field::leaf("policy_oid_reference", XCEP, "policyOIDReference", Scalar::Integer)
                    .optional(),
                Field::leaf("ca_references", XCEP, "cAReference", Scalar::Integer)
                    .many()
                    .wrapped("cAs")
                    .nillable(),
                Field::node("attributes", XCEP, "attributes", Attributes::schema)
                    .optional()
                    .nillable(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt("policy_oid_reference", self.policy_oid_reference)
            .with_list("ca_references", self.ca_references.clone())
            .with_opt_node("attributes", self.attributes.as_ref())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            policy_oid_reference: record.take_opt_int("policy_oid_reference")?,
            ca_references: record.take_ints("ca_references")?,
            attributes: record.take_opt_node("attributes")?,
        })
    }
}

/// `xcep:attributes`.
///
/// Only the members this client acts on are bound; the rest of the template
/// definition (key usage, private key flags, extensions) is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    /// Template common name.
    pub common_name: String,
    /// Template schema version.
    pub policy_schema: Option<u64>,
    /// Validity and renewal periods.
    pub certificate_validity: Option<CertificateValidity>,
    /// Enrollment permissions of the caller.
    pub permission: Option<EnrollmentPermission>,
}

impl XmlBinding for Attributes {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "attributes",
            &[
                Field::leaf("common_name", XCEP, "commonName", Scalar::String),
                Field::leaf("policy_schema", XCEP, "policySchema", Scalar::Unsigned).optional(),
                Field::node(
                    "certificate_validity",
                    XCEP,
                    "certificateValidity",
                    CertificateValidity::schema,
                )
                .optional(),
                Field::node("permission", XCEP, "permission", EnrollmentPermission::schema)
                    .optional(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("common_name", self.common_name.clone())
            .with_opt("policy_schema", self.policy_schema)
            .with_opt_node("certificate_validity", self.certificate_validity.as_ref())
            .with_opt_node("permission", self.permission.as_ref())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            common_name: record.take_text("common_name")?,
            policy_schema: record.take_opt_uint("policy_schema")?,
            certificate_validity: record.take_opt_node("certificate_validity")?,
            permission: record.take_opt_node("permission")?,
        })
    }
}

/// `xcep:certificateValidity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateValidity {
    /// Lifetime of issued certificates.
    pub validity_period_seconds: u64,
    /// How long before expiry renewal should start.
    pub renewal_period_seconds: u64,
}

impl XmlBinding for CertificateValidity {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "certificateValidity",
            &[
                Field::leaf("validity", XCEP, "validityPeriodSeconds", Scalar::Unsigned),
                Field::leaf("renewal", XCEP, "renewalPeriodSeconds", Scalar::Unsigned),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("validity", self.validity_period_seconds)
            .with("renewal", self.renewal_period_seconds)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            validity_period_seconds: record.take_uint("validity")?,
            renewal_period_seconds: record.take_uint("renewal")?,
        })
    }
}

/// `xcep:permission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentPermission {
    /// The caller may enroll.
    pub enroll: bool,
    /// The caller may auto-enroll.
    pub auto_enroll: bool,
}

impl XmlBinding for EnrollmentPermission {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "permission",
            &[
                Field::leaf("enroll", XCEP, "enroll", Scalar::Boolean),
                Field::leaf("auto_enroll", XCEP, "autoEnroll", Scalar::Boolean),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("enroll", self.enroll)
            .with("auto_enroll", self.auto_enroll)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            enroll: record.take_bool("enroll")?,
            auto_enroll: record.take_bool("auto_enroll")?,
        })
    }
}

/// `xcep:cA`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ca {
    /// Enrollment endpoints of this CA.
    pub uris: Vec<CaUri>,
    /// CA certificate, PEM.
    pub certificate: String,
    /// Whether the caller may enroll through this CA.
    pub enroll_permission: bool,
    /// Identifier referenced by `cAReference`.
    pub reference_id: i64,
}

impl XmlBinding for Ca {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "cA",
            &[
                Field::node("uris", XCEP, "cAURI", CaUri::schema)
                    .many_non_empty()
                    .wrapped("uris"),
                Field::leaf("certificate", XCEP, "certificate", Scalar::Certificate),
                Field::leaf("enroll_permission", XCEP, "enrollPermission", Scalar::Boolean),
                Field::leaf("reference_id", XCEP, "cAReferenceID", Scalar::Integer),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_nodes("uris", &self.uris)
            .with("certificate", self.certificate.clone())
            .with("enroll_permission", self.enroll_permission)
            .with("reference_id", self.reference_id)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            uris: record.take_nodes("uris")?,
            certificate: record.take_text("certificate")?,
            enroll_permission: record.take_bool("enroll_permission")?,
            reference_id: record.take_int("reference_id")?,
        })
    }
}

/// `xcep:cAURI`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaUri {
    /// Authentication the endpoint expects.
    pub client_authentication: AuthKind,
    /// Endpoint address.
    pub uri: String,
    /// Lower is preferred.
    pub priority: Option<u64>,
    /// Endpoint only accepts renewals.
    pub renewal_only: Option<bool>,
}

impl XmlBinding for CaUri {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "cAURI",
            &[
                Field::leaf(
                    "client_authentication",
                    XCEP,
                    "clientAuthentication",
                    Scalar::Integer,
                ),
                Field::leaf("uri", XCEP, "uri", Scalar::String),
                Field::leaf("priority", XCEP, "priority", Scalar::Unsigned)
                    .optional()
                    .nillable(),
                Field::leaf("renewal_only", XCEP, "renewalOnly", Scalar::Boolean)
                    .optional()
                    .nillable(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("client_authentication", self.client_authentication.xcep_code())
            .with("uri", self.uri.clone())
            .with_opt("priority", self.priority)
            .with_opt("renewal_only", self.renewal_only)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        let code = record.take_int("client_authentication")?;
        let client_authentication = AuthKind::from_xcep_code(code).ok_or_else(|| {
            CepError::binding_type(
                "client_authentication",
                code.to_string(),
                "client authentication code (1, 2, 4 or 8)",
            )
        })?;

        Ok(Self {
            client_authentication,
            uri: record.take_text("uri")?,
            priority: record.take_opt_uint("priority")?,
            renewal_only: record.take_opt_bool("renewal_only")?,
        })
    }
}

/// `xcep:oID`.
#[derive(Debug, Clone, PartialEq)]
pub struct Oid {
    /// Dotted OID.
    pub value: String,
    /// OID group.
    pub group: Option<i64>,
    /// Identifier referenced by `policyOIDReference`.
    pub reference_id: i64,
    /// Display name.
    pub default_name: Option<String>,
}

impl XmlBinding for Oid {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            XCEP,
            "oID",
            &[
                Field::leaf("value", XCEP, "value", Scalar::String),
                Field::leaf("group", XCEP, "group", Scalar::Integer).optional(),
                Field::leaf("reference_id", XCEP, "oIDReferenceID", Scalar::Integer),
                Field::leaf("default_name", XCEP, "defaultName", Scalar::String)
                    .optional()
                    .nillable(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("value", self.value.clone())
            .with_opt("group", self.group)
            .with("reference_id", self.reference_id)
            .with_opt("default_name", self.default_name.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            value: record.take_text("value")?,
            group: record.take_opt_int("group")?,
            reference_id: record.take_int("reference_id")?,
            default_name: record.take_opt_text("default_name")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding;
    use crate::soap::Envelope;
    use crate::xml::{QName, XmlElement};

    const MULTI: &str = include_str!("../../tests/fixtures/xcep/get_policies_multi.xml");
    const ADCS: &str = include_str!("../../tests/fixtures/xcep/get_policies_adcs.xml");

    fn response_payload(doc: &str) -> XmlElement {
        let doc = doc.replace("{{SERVER}}", "https://ca.example.test");
        let envelope: Envelope =
            binding::deserialize(&XmlElement::parse(doc.as_bytes()).unwrap()).unwrap();
        envelope.payload().clone()
    }

    #[test]
    fn test_get_policies_request_is_all_nil() {
        let element = binding::serialize(&GetPolicies::default()).unwrap();
        assert_eq!(element.name, QName::new(XCEP, "GetPolicies"));

        let client = element.child(&QName::new(XCEP, "client")).unwrap();
        assert!(client.child(&QName::new(XCEP, "lastUpdate")).unwrap().is_nil());
        assert!(client
            .child(&QName::new(XCEP, "preferredLanguage"))
            .unwrap()
            .is_nil());

        let filter = element.child(&QName::new(XCEP, "requestFilter")).unwrap();
        for name in ["policyOIDs", "clientVersion", "serverVersion"] {
            let child = filter.child(&QName::new(XCEP, name)).unwrap();
            assert!(child.is_nil(), "{} should be nil", name);
        }
    }

    #[test]
    fn test_get_policies_round_trip() {
        let request = GetPolicies {
            client: Client {
                last_update: Some("2024-01-01T00:00:00Z".to_string()),
                preferred_language: None,
            },
            request_filter: RequestFilter {
                policy_oids: vec!["1.2.3".to_string(), "1.2.4".to_string()],
                client_version: Some(1),
                server_version: None,
            },
        };
        let bytes = binding::serialize(&request).unwrap().to_bytes().unwrap();
        let parsed = XmlElement::parse(&bytes).unwrap();
        assert_eq!(binding::deserialize::<GetPolicies>(&parsed).unwrap(), request);
    }

    #[test]
    fn test_get_policies_response_round_trip() {
        for doc in [ADCS, MULTI] {
            let response: GetPoliciesResponse =
                binding::deserialize(&response_payload(doc)).unwrap();
            let bytes = binding::serialize(&response).unwrap().to_bytes().unwrap();
            let reparsed = XmlElement::parse(&bytes).unwrap();
            assert_eq!(
                binding::deserialize::<GetPoliciesResponse>(&reparsed).unwrap(),
                response
            );
        }
    }

    #[test]
    fn test_unknown_client_authentication_code() {
        let doc = format!(
            r#"<cAURI xmlns="{}"><clientAuthentication>3</clientAuthentication><uri>https://x/</uri></cAURI>"#,
            XCEP
        );
        let element = XmlElement::parse(doc.as_bytes()).unwrap();
        match binding::deserialize::<CaUri>(&element) {
            Err(CepError::BindingType { field, value, .. }) => {
                assert_eq!(field, "client_authentication");
                assert_eq!(value, "3");
            }
            other => panic!("Expected binding type error, got {:?}", other),
        }
    }

    #[test]
    fn test_ca_requires_an_endpoint() {
        let doc = format!(
            r#"<cA xmlns="{}"><uris/><certificate>QUJD</certificate>
               <enrollPermission>true</enrollPermission><cAReferenceID>0</cAReferenceID></cA>"#,
            XCEP
        );
        let element = XmlElement::parse(doc.as_bytes()).unwrap();
        assert!(matches!(
            binding::deserialize::<Ca>(&element),
            Err(CepError::Binding(_))
        ));
    }
}
