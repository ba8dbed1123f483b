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

//! WS-Trust message types used by MS-WSTEP.

use crate::binding::{Field, Record, Scalar, Schema, XmlBinding};
use crate::error::{CepError, Result};
use crate::xml::ns::{ENROLLMENT, WSSE, WST, WSU};

/// SOAP action of the `RequestSecurityToken` operation.
pub const RST_ACTION: &str =
    "http://schemas.microsoft.com/windows/pki/2009/01/enrollment/RST/wstep";

/// Requested token type: an X.509v3 certificate.
pub const TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";

/// Request type of a new enrollment.
pub const ISSUE_REQUEST_TYPE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue";

/// Request type of a renewal.
pub const RENEW_REQUEST_TYPE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Renew";

/// Request type of a status query for a pending request.
pub const QUERY_REQUEST_TYPE: &str =
    "http://schemas.microsoft.com/windows/pki/2009/01/enrollment/QueryTokenStatus";

/// Value type of a PKCS#10 request token.
pub const PKCS10_VALUE_TYPE: &str =
    "http://schemas.microsoft.com/windows/pki/2009/01/enrollment#PKCS10";

/// Encoding type of base64 binary tokens.
pub const BASE64_ENCODING_TYPE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd#base64binary";

/// `wst:RequestSecurityToken`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSecurityToken {
    /// `wst:TokenType`.
    pub token_type: Option<String>,
    /// `wst:RequestType`.
    pub request_type: String,
    /// The CSR, or an empty token when polling.
    pub token: BinarySecurityToken,
    /// `enrollment:RequestID` of a pending request.
    pub request_id: Option<u32>,
}

impl RequestSecurityToken {
    /// A request carrying a base64 PKCS#10 body.
    pub fn with_csr(request_type: &str, csr_base64: impl Into<String>) -> Self {
        Self {
            token_type: Some(TOKEN_TYPE.to_string()),
            request_type: request_type.to_string(),
            token: BinarySecurityToken::pkcs10(csr_base64),
            request_id: None,
        }
    }

    /// A status query for pending request `request_id`.
    pub fn query(request_id: u32) -> Self {
        Self {
            token_type: Some(TOKEN_TYPE.to_string()),
            request_type: QUERY_REQUEST_TYPE.to_string(),
            token: BinarySecurityToken::pkcs10(""),
            request_id: Some(request_id),
        }
    }
}

impl XmlBinding for RequestSecurityToken {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            WST,
            "RequestSecurityToken",
            &[
                Field::leaf("token_type", WST, "TokenType", Scalar::String).optional(),
                Field::leaf("request_type", WST, "RequestType", Scalar::String),
                Field::node("token", WSSE, "BinarySecurityToken", BinarySecurityToken::schema),
                Field::leaf("request_id", ENROLLMENT, "RequestID", Scalar::Unsigned).optional(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt("token_type", self.token_type.clone())
            .with("request_type", self.request_type.clone())
            .with_node("token", &self.token)
            .with_opt("request_id", self.request_id)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            token_type: record.take_opt_text("token_type")?,
            request_type: record.take_text("request_type")?,
            token: record.take_node("token")?,
            request_id: take_opt_request_id(&mut record)?,
        })
    }
}

/// `wsse:BinarySecurityToken`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinarySecurityToken {
    /// `ValueType`.
    pub value_type: Option<String>,
    /// `EncodingType`.
    pub encoding_type: Option<String>,
    /// `wsu:Id`.
    pub id: Option<String>,
    /// Base64 content.
    pub value: String,
}

impl BinarySecurityToken {
    /// A PKCS#10 token with an empty `wsu:Id`.
    pub fn pkcs10(value: impl Into<String>) -> Self {
        Self {
            value_type: Some(PKCS10_VALUE_TYPE.to_string()),
            encoding_type: Some(BASE64_ENCODING_TYPE.to_string()),
            id: Some(String::new()),
            value: value.into(),
        }
    }
}

impl XmlBinding for BinarySecurityToken {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            WSSE,
            "BinarySecurityToken",
            &[
                Field::attribute("value_type", "", "ValueType", Scalar::String).optional(),
                Field::attribute("encoding_type", "", "EncodingType", Scalar::String).optional(),
                Field::attribute("id", WSU, "Id", Scalar::String).optional(),
                Field::text("value", Scalar::String).optional(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt("value_type", self.value_type.clone())
            .with_opt("encoding_type", self.encoding_type.clone())
            .with_opt("id", self.id.clone())
            .with("value", self.value.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            value_type: record.take_opt_text("value_type")?,
            encoding_type: record.take_opt_text("encoding_type")?,
            id: record.take_opt_text("id")?,
            value: record
                .take_opt_text("value")?
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
        })
    }
}

/// `wst:RequestSecurityTokenResponseCollection`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSecurityTokenResponseCollection {
    /// One response per request; this client sends one.
    pub responses: Vec<RequestSecurityTokenResponse>,
}

impl XmlBinding for RequestSecurityTokenResponseCollection {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            WST,
            "RequestSecurityTokenResponseCollection",
            &[Field::node(
                "responses",
                WST,
                "RequestSecurityTokenResponse",
                RequestSecurityTokenResponse::schema,
            )
            .many()],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new().with_nodes("responses", &self.responses)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            responses: record.take_nodes("responses")?,
        })
    }
}

/// `wst:RequestSecurityTokenResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSecurityTokenResponse {
    /// `wst:TokenType`.
    pub token_type: Option<String>,
    /// `enrollment:DispositionMessage`, the CA's verdict in prose.
    pub disposition_message: String,
    /// PKCS#7 with the issued certificate and its chain.
    pub token: Option<BinarySecurityToken>,
    /// The issued certificate or a reference to the pending request.
    pub requested_token: RequestedSecurityToken,
    /// `enrollment:RequestID`.
    pub request_id: Option<u32>,
}

impl XmlBinding for RequestSecurityTokenResponse {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            WST,
            "RequestSecurityTokenResponse",
            &[
                Field::leaf("token_type", WST, "TokenType", Scalar::String).optional(),
                Field::leaf(
                    "disposition_message",
                    ENROLLMENT,
                    "DispositionMessage",
                    Scalar::String,
                ),
                Field::node("token", WSSE, "BinarySecurityToken", BinarySecurityToken::schema)
                    .optional(),
                Field::node(
                    "requested_token",
                    WST,
                    "RequestedSecurityToken",
                    RequestedSecurityToken::schema,
                ),
                Field::leaf("request_id", ENROLLMENT, "RequestID", Scalar::Unsigned).optional(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt("token_type", self.token_type.clone())
            .with("disposition_message", self.disposition_message.clone())
            .with_opt_node("token", self.token.as_ref())
            .with_node("requested_token", &self.requested_token)
            .with_opt("request_id", self.request_id)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            token_type: record.take_opt_text("token_type")?,
            disposition_message: record.take_text("disposition_message")?,
            token: record.take_opt_node("token")?,
            requested_token: record.take_node("requested_token")?,
            request_id: take_opt_request_id(&mut record)?,
        })
    }
}

/// `wst:RequestedSecurityToken`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestedSecurityToken {
    /// The issued certificate, base64 DER.
    pub token: Option<BinarySecurityToken>,
    /// Reference to the request when no certificate was issued.
    pub reference: Option<SecurityTokenReference>,
}

impl RequestedSecurityToken {
    /// Base64 certificate, if one was issued.
    pub fn certificate(&self) -> Option<&str> {
        self.token
            .as_ref()
            .map(|t| t.value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// The `Reference@URI` value, if present.
    pub fn reference_uri(&self) -> Option<&str> {
        self.reference
            .as_ref()?
            .reference
            .as_ref()
            .map(|r| r.uri.as_str())
            .filter(|u| !u.is_empty())
    }
}

impl XmlBinding for RequestedSecurityToken {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            WST,
            "RequestedSecurityToken",
            &[
                Field::node("token", WSSE, "BinarySecurityToken", BinarySecurityToken::schema)
                    .optional(),
                Field::node(
                    "reference",
                    WSSE,
                    "SecurityTokenReference",
                    SecurityTokenReference::schema,
                )
                .optional(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt_node("token", self.token.as_ref())
            .with_opt_node("reference", self.reference.as_ref())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            token: record.take_opt_node("token")?,
            reference: record.take_opt_node("reference")?,
        })
    }
}

/// `wsse:SecurityTokenReference`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityTokenReference {
    /// `wsse:Reference`.
    pub reference: Option<Reference>,
}

impl XmlBinding for SecurityTokenReference {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            WSSE,
            "SecurityTokenReference",
            &[Field::node("reference", WSSE, "Reference", Reference::schema).optional()],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new().with_opt_node("reference", self.reference.as_ref())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            reference: record.take_opt_node("reference")?,
        })
    }
}

/// `wsse:Reference`.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// `URI`.
    pub uri: String,
}

impl XmlBinding for Reference {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            WSSE,
            "Reference",
            &[Field::attribute("uri", "", "URI", Scalar::String)],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new().with("uri", self.uri.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            uri: record.take_text("uri")?,
        })
    }
}

fn take_opt_request_id(record: &mut Record) -> Result<Option<u32>> {
    match record.take_opt_uint("request_id")? {
        None => Ok(None),
        Some(id) => u32::try_from(id).map(Some).map_err(|_| {
            CepError::binding_type("request_id", id.to_string(), "32-bit request id")
        }),
    }
}
