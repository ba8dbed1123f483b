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

//! SOAP 1.2 envelope, WS-Addressing header and fault types.

use url::Url;

use crate::binding::{Field, Record, Scalar, Schema, XmlBinding};
use crate::error::{CepError, Result};
use crate::xml::{ns, QName, XmlElement};

/// Password type URI for clear-text username tokens.
pub const PASSWORD_TEXT: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";

/// Encoding type URI for base64 binary values.
pub const BASE64_BINARY: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// Qualified name of a SOAP fault.
pub const FAULT: QName = QName::new(ns::SOAP, "Fault");

/// A SOAP 1.2 envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Header block. Servers may omit it.
    pub header: Option<Header>,
    /// Body block.
    pub body: Body,
}

impl Envelope {
    /// Create a request envelope with a fresh message id.
    pub fn new(action: &str, to: &Url, payload: XmlElement) -> Self {
        Self {
            header: Some(Header {
                action: Some(HeaderValue::must_understand(action)),
                message_id: Some(format!("urn:uuid:{}", uuid::Uuid::new_v4())),
                to: Some(HeaderValue::must_understand(to.as_str())),
                security: None,
            }),
            body: Body { payload },
        }
    }

    /// The message id, if the header carries one.
    pub fn message_id(&self) -> Option<&str> {
        self.header.as_ref()?.message_id.as_deref()
    }

    /// The body payload.
    pub fn payload(&self) -> &XmlElement {
        &self.body.payload
    }

    /// Whether the payload is a SOAP fault.
    pub fn is_fault(&self) -> bool {
        self.body.payload.name == FAULT
    }
}

impl XmlBinding for Envelope {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::SOAP,
            "Envelope",
            &[
                Field::node("header", ns::SOAP, "Header", Header::schema).optional(),
                Field::node("body", ns::SOAP, "Body", Body::schema),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt_node("header", self.header.as_ref())
            .with_node("body", &self.body)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            header: record.take_opt_node("header")?,
            body: record.take_node("body")?,
        })
    }
}

/// WS-Addressing and WS-Security header entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// `a:Action`.
    pub action: Option<HeaderValue>,
    /// `a:MessageID`.
    pub message_id: Option<String>,
    /// `a:To`.
    pub to: Option<HeaderValue>,
    /// `wsse:Security`.
    pub security: Option<Security>,
}

impl XmlBinding for Header {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::SOAP,
            "Header",
            &[
                Field::node("action", ns::ADDRESSING, "Action", HeaderValue::schema).optional(),
                Field::leaf("message_id", ns::ADDRESSING, "MessageID", Scalar::String).optional(),
                Field::node("to", ns::ADDRESSING, "To", HeaderValue::schema).optional(),
                Field::node("security", ns::WSSE, "Security", Security::schema).optional(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt_node("action", self.action.as_ref())
            .with_opt("message_id", self.message_id.clone())
            .with_opt_node("to", self.to.as_ref())
            .with_opt_node("security", self.security.as_ref())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            action: record.take_opt_node("action")?,
            message_id: record.take_opt_text("message_id")?,
            to: record.take_opt_node("to")?,
            security: record.take_opt_node("security")?,
        })
    }
}

/// A header value with an optional `s:mustUnderstand` flag.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderValue {
    /// Element text.
    pub value: String,
    /// `s:mustUnderstand`.
    pub must_understand: Option<bool>,
}

impl HeaderValue {
    /// A value the receiver must understand.
    pub fn must_understand(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            must_understand: Some(true),
        }
    }
}

impl XmlBinding for HeaderValue {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::ADDRESSING,
            "Action",
            &[
                Field::attribute("must_understand", ns::SOAP, "mustUnderstand", Scalar::Flag)
                    .optional(),
                Field::text("value", Scalar::String),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt("must_understand", self.must_understand)
            .with("value", self.value.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            must_understand: record.take_opt_bool("must_understand")?,
            value: record.take_opt_text("value")?.unwrap_or_default(),
        })
    }
}

/// `wsse:Security` header carrying a username token.
#[derive(Debug, Clone, PartialEq)]
pub struct Security {
    /// `s:mustUnderstand`.
    pub must_understand: Option<bool>,
    /// The credentials.
    pub username_token: UsernameToken,
}

impl XmlBinding for Security {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::WSSE,
            "Security",
            &[
                Field::attribute("must_understand", ns::SOAP, "mustUnderstand", Scalar::Flag)
                    .optional(),
                Field::node("username_token", ns::WSSE, "UsernameToken", UsernameToken::schema),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt("must_understand", self.must_understand)
            .with_node("username_token", &self.username_token)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            must_understand: record.take_opt_bool("must_understand")?,
            username_token: record.take_node("username_token")?,
        })
    }
}

/// `wsse:UsernameToken`.
#[derive(Debug, Clone, PartialEq)]
pub struct UsernameToken {
    /// `wsse:Username`.
    pub username: String,
    /// `wsse:Password`.
    pub password: TypedValue,
    /// `wsse:Nonce`, base64.
    pub nonce: Option<TypedValue>,
    /// `wsu:Created`, RFC 3339 UTC.
    pub created: Option<String>,
}

impl XmlBinding for UsernameToken {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::WSSE,
            "UsernameToken",
            &[
                Field::leaf("username", ns::WSSE, "Username", Scalar::String),
                Field::node("password", ns::WSSE, "Password", TypedValue::schema),
                Field::node("nonce", ns::WSSE, "Nonce", TypedValue::schema).optional(),
                Field::leaf("created", ns::WSU, "Created", Scalar::String).optional(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("username", self.username.clone())
            .with_node("password", &self.password)
            .with_opt_node("nonce", self.nonce.as_ref())
            .with_opt("created", self.created.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            username: record.take_text("username")?,
            password: record.take_node("password")?,
            nonce: record.take_opt_node("nonce")?,
            created: record.take_opt_text("created")?,
        })
    }
}

/// Text with an optional unqualified `Type` or `EncodingType` URI.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// `Type`.
    pub value_type: Option<String>,
    /// `EncodingType`.
    pub encoding_type: Option<String>,
    /// Element text.
    pub value: String,
}

impl XmlBinding for TypedValue {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::WSSE,
            "Password",
            &[
                Field::attribute("value_type", "", "Type", Scalar::String).optional(),
                Field::attribute("encoding_type", "", "EncodingType", Scalar::String).optional(),
                Field::text("value", Scalar::String),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_opt("value_type", self.value_type.clone())
            .with_opt("encoding_type", self.encoding_type.clone())
            .with("value", self.value.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            value_type: record.take_opt_text("value_type")?,
            encoding_type: record.take_opt_text("encoding_type")?,
            value: record.take_opt_text("value")?.unwrap_or_default(),
        })
    }
}

/// `s:Body` with a single payload element.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// The message.
    pub payload: XmlElement,
}

impl XmlBinding for Body {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(ns::SOAP, "Body", &[Field::any("payload")]);
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new().with("payload", self.payload.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        let payload = record
            .take_element("payload")?
            .ok_or_else(|| CepError::binding("SOAP body is empty"))?;
        Ok(Self { payload })
    }
}

/// A SOAP 1.2 fault.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    /// `s:Code`.
    pub code: FaultCode,
    /// `s:Reason`.
    pub reason: FaultReason,
}

impl Fault {
    /// Convert into the crate error.
    pub fn into_error(self) -> CepError {
        let reason = self.reason.text().to_string();
        let subcode = self.code.subcode.map(|s| s.value);
        CepError::fault(self.code.value, subcode, reason)
    }
}

impl XmlBinding for Fault {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::SOAP,
            "Fault",
            &[
                Field::node("code", ns::SOAP, "Code", FaultCode::schema),
                Field::node("reason", ns::SOAP, "Reason", FaultReason::schema),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_node("code", &self.code)
            .with_node("reason", &self.reason)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            code: record.take_node("code")?,
            reason: record.take_node("reason")?,
        })
    }
}

/// `s:Code` or `s:Subcode`; both share the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultCode {
    /// `s:Value`.
    pub value: String,
    /// `s:Subcode`.
    pub subcode: Option<Box<FaultCode>>,
}

impl XmlBinding for FaultCode {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::SOAP,
            "Code",
            &[
                Field::leaf("value", ns::SOAP, "Value", Scalar::String),
                Field::node("subcode", ns::SOAP, "Subcode", FaultCode::schema).optional(),
            ],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("value", self.value.clone())
            .with_opt_node("subcode", self.subcode.as_deref())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            value: record.take_text("value")?,
            subcode: record.take_opt_node::<FaultCode>("subcode")?.map(Box::new),
        })
    }
}

/// `s:Reason`.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultReason {
    /// `s:Text` entries, one per language.
    pub texts: Vec<String>,
}

impl FaultReason {
    /// The first reason text.
    pub fn text(&self) -> &str {
        self.texts.first().map(String::as_str).unwrap_or("")
    }
}

impl XmlBinding for FaultReason {
    fn schema() -> &'static Schema {
        static SCHEMA: Schema = Schema::new(
            ns::SOAP,
            "Reason",
            &[Field::leaf("texts", ns::SOAP, "Text", Scalar::String).many_non_empty()],
        );
        &SCHEMA
    }

    fn to_record(&self) -> Record {
        Record::new().with_list("texts", self.texts.clone())
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            texts: record.take_texts("texts")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding;

    const FAULT_XML: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://www.w3.org/2005/08/addressing">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://www.w3.org/2005/08/addressing/soap/fault</a:Action>
    <a:RelatesTo>urn:uuid:5d9d8e3a-2b0e-4b55-9a3c-2f3f1c1d0e01</a:RelatesTo>
  </s:Header>
  <s:Body>
    <s:Fault>
      <s:Code>
        <s:Value>s:Receiver</s:Value>
        <s:Subcode><s:Value xmlns:a="http://schemas.microsoft.com/net/2005/12/windowscommunicationfoundation/dispatcher">a:InternalServiceFault</s:Value></s:Subcode>
      </s:Code>
      <s:Reason><s:Text xml:lang="en-US">The server was unable to process the request.</s:Text></s:Reason>
    </s:Fault>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn test_envelope_header_shape() {
        let to = Url::parse("https://cep.example.test/service.svc").unwrap();
        let payload = XmlElement::new(QName::new(ns::XCEP, "GetPolicies"));
        let envelope = Envelope::new("urn:action", &to, payload);

        let element = binding::serialize(&envelope).unwrap();
        let header = element.child(&QName::new(ns::SOAP, "Header")).unwrap();
        let must_understand = QName::new(ns::SOAP, "mustUnderstand");

        let action = header.child(&QName::new(ns::ADDRESSING, "Action")).unwrap();
        assert_eq!(action.text(), "urn:action");
        assert_eq!(action.attribute(&must_understand), Some("1"));

        let to = header.child(&QName::new(ns::ADDRESSING, "To")).unwrap();
        assert_eq!(to.text(), "https://cep.example.test/service.svc");
        assert_eq!(to.attribute(&must_understand), Some("1"));

        let id = header.child(&QName::new(ns::ADDRESSING, "MessageID")).unwrap();
        assert!(id.text().starts_with("urn:uuid:"));
        assert_eq!(id.text().len(), "urn:uuid:".len() + 36);
    }

    #[test]
    fn test_message_ids_are_fresh() {
        let to = Url::parse("https://cep.example.test/").unwrap();
        let payload = XmlElement::new(QName::local("x"));
        let a = Envelope::new("urn:a", &to, payload.clone());
        let b = Envelope::new("urn:a", &to, payload);
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn test_envelope_round_trip() {
        let to = Url::parse("https://cep.example.test/").unwrap();
        let payload = XmlElement::new(QName::new(ns::WST, "RequestSecurityToken"))
            .with_child(XmlElement::new(QName::new(ns::WST, "TokenType")).with_text("t"));
        let mut envelope = Envelope::new("urn:a", &to, payload);
        if let Some(header) = envelope.header.as_mut() {
            header.security = Some(Security {
                must_understand: Some(true),
                username_token: UsernameToken {
                    username: "alice".to_string(),
                    password: TypedValue {
                        value_type: Some(PASSWORD_TEXT.to_string()),
                        encoding_type: None,
                        value: "secret".to_string(),
                    },
                    nonce: None,
                    created: Some("2026-01-01T00:00:00Z".to_string()),
                },
            });
        }

        let bytes = binding::serialize(&envelope).unwrap().to_bytes().unwrap();
        let reparsed: Envelope = binding::deserialize(&XmlElement::parse(&bytes).unwrap()).unwrap();
        assert_eq!(reparsed, envelope);
    }

    #[test]
    fn test_fault_decodes() {
        let element = XmlElement::parse(FAULT_XML.as_bytes()).unwrap();
        let envelope: Envelope = binding::deserialize(&element).unwrap();
        assert!(envelope.is_fault());

        let fault: Fault = binding::deserialize(envelope.payload()).unwrap();
        assert_eq!(
            fault.into_error().to_string(),
            "The server was unable to process the request. (Code: s:Receiver; Subcode: a:InternalServiceFault)"
        );
    }

    #[test]
    fn test_fault_round_trip() {
        let service_fault = include_str!("../../tests/fixtures/wstep/fault.xml");
        for doc in [FAULT_XML, service_fault] {
            let envelope: Envelope =
                binding::deserialize(&XmlElement::parse(doc.as_bytes()).unwrap()).unwrap();
            let fault: Fault = binding::deserialize(envelope.payload()).unwrap();

            let bytes = binding::serialize(&fault).unwrap().to_bytes().unwrap();
            let reparsed: Fault = binding::deserialize(&XmlElement::parse(&bytes).unwrap()).unwrap();
            assert_eq!(reparsed, fault);
        }
    }

    #[test]
    fn test_empty_body_is_binding_error() {
        let xml = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body/></s:Envelope>"#;
        let element = XmlElement::parse(xml.as_bytes()).unwrap();
        assert!(matches!(
            binding::deserialize::<Envelope>(&element),
            Err(CepError::Binding(_))
        ));
    }
}
