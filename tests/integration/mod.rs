//! Integration test utilities and helpers
//!
//! This module provides common test infrastructure for the policy and
//! enrollment integration tests, including mock server setup, fixture
//! loading, and client construction.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;
use usg_cep_client::auth::Authenticator;
use usg_cep_client::soap::SoapClient;
use usg_cep_client::xcep::IssuerFetcher;
use usg_cep_client::{AuthConfig, CepClientConfig, CepError, EndpointType};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// SOAP 1.2 media type
pub const CONTENT_TYPE_SOAP: &str = "application/soap+xml; charset=utf-8";

/// Service paths, as AD CS names them
pub const PATH_POLICY: &str = "/ADPolicyProvider_CEP_UsernamePassword/service.svc/CEP";
pub const PATH_ISSUING_ANONYMOUS: &str = "/Issuing-CA_CES_Anonymous/service.svc/CES";
pub const PATH_ISSUING_KERBEROS: &str = "/Issuing-CA_CES_Kerberos/service.svc/CES";
pub const PATH_SECOND_ANONYMOUS: &str = "/Second-CA_CES_Anonymous/service.svc/CES";

/// AIA locations baked into the PKI fixtures
pub const ROOT_AIA: &str = "http://pki.example.test/aia/root.crt";
pub const ISSUING_AIA: &str = "http://pki.example.test/aia/issuing.crt";

pub const LEAF_PEM: &str = include_str!("../fixtures/pki/leaf.pem");
pub const LEAF_CSR: &str = include_str!("../fixtures/pki/leaf.csr");
pub const ISSUING_PEM: &str = include_str!("../fixtures/pki/issuing.pem");
pub const ROOT_DER: &[u8] = include_bytes!("../fixtures/pki/root.der");

const POLICIES_MULTI: &str = include_str!("../fixtures/xcep/get_policies_multi.xml");
const RSTR_ISSUED: &str = include_str!("../fixtures/wstep/rstr_issued.xml");
const RSTR_PENDING: &str = include_str!("../fixtures/wstep/rstr_pending.xml");
const FAULT: &str = include_str!("../fixtures/wstep/fault.xml");

/// Mock CEP/CES server builder for integration tests
pub struct MockCepServer {
    server: MockServer,
}

impl MockCepServer {
    /// Create a new mock server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    /// Get the base URL of the mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Absolute URL for a path on the mock server
    pub fn endpoint(&self, path: &str) -> Url {
        Url::parse(&format!("{}{}", self.server.uri(), path)).unwrap()
    }

    /// Get a reference to the inner MockServer for custom mocking
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    /// Number of requests received so far
    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.unwrap_or_default().len()
    }

    /// Mock the policy endpoint with the three-template policy
    pub async fn mock_policy(&self) {
        let body = POLICIES_MULTI.replace("{{SERVER}}", &self.url());
        self.mock_soap(PATH_POLICY, "GetPolicies", 200, body).await;
    }

    /// Mock an issued certificate answer to a new request
    pub async fn mock_issued(&self, service_path: &str) {
        self.mock_soap(service_path, "RequestSecurityToken", 200, issued_body())
            .await;
    }

    /// Mock an issued certificate answer to a status query
    pub async fn mock_poll_issued(&self, service_path: &str) {
        self.mock_soap(service_path, "QueryTokenStatus", 200, issued_body())
            .await;
    }

    /// Mock a pending answer to a new request
    pub async fn mock_pending(&self, service_path: &str, request_id: u32) {
        let body = self.pending_body(request_id);
        Mock::given(method("POST"))
            .and(path(service_path))
            .and(body_string_contains("ws-trust/200512/Issue"))
            .respond_with(soap_response(200, body))
            .mount(&self.server)
            .await;
    }

    /// Mock one pending answer to a status query
    pub async fn mock_poll_pending_once(&self, service_path: &str, request_id: u32) {
        let body = self.pending_body(request_id);
        Mock::given(method("POST"))
            .and(path(service_path))
            .and(body_string_contains("QueryTokenStatus"))
            .respond_with(soap_response(200, body))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Mock a SOAP fault (HTTP 500)
    pub async fn mock_fault(&self, service_path: &str) {
        self.mock_soap(service_path, "RequestSecurityToken", 500, FAULT.to_string())
            .await;
    }

    /// Mock a non-SOAP HTTP error
    pub async fn mock_http_error(&self, service_path: &str, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(service_path))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_string(message)
                    .insert_header("Content-Type", "text/plain"),
            )
            .mount(&self.server)
            .await;
    }

    async fn mock_soap(&self, service_path: &str, marker: &str, status: u16, body: String) {
        Mock::given(method("POST"))
            .and(path(service_path))
            .and(body_string_contains(marker))
            .respond_with(soap_response(status, body))
            .mount(&self.server)
            .await;
    }

    fn pending_body(&self, request_id: u32) -> String {
        RSTR_PENDING
            .replace("{{SERVER}}", &self.url())
            .replace("{{REQUEST_ID}}", &request_id.to_string())
    }
}

fn soap_response(status: u16, body: String) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .set_body_string(body)
        .insert_header("Content-Type", CONTENT_TYPE_SOAP)
}

fn issued_body() -> String {
    RSTR_ISSUED.replace("{{CERTIFICATE}}", &pem_body(LEAF_PEM))
}

/// Base64 body of a PEM block, on one line
pub fn pem_body(pem: &str) -> String {
    pem.lines()
        .filter(|l| !l.starts_with("-----"))
        .map(str::trim)
        .collect()
}

/// Anonymous configuration for `endpoint`
pub fn anonymous_config(endpoint: Url, endpoint_type: EndpointType) -> CepClientConfig {
    CepClientConfig::builder()
        .endpoint_parsed(endpoint)
        .endpoint_type(endpoint_type)
        .auth(AuthConfig::Anonymous)
        .poll_interval(900)
        .build()
        .expect("Valid config")
}

/// SOAP client without credentials
pub fn anonymous_soap(config: &CepClientConfig) -> SoapClient {
    let auth = Authenticator::from_config(&AuthConfig::Anonymous).expect("Anonymous auth");
    SoapClient::new(config, auth).expect("SOAP client")
}

/// In-memory AIA publisher
#[derive(Default)]
pub struct StaticFetcher {
    published: HashMap<String, Vec<u8>>,
    pub requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn publish(mut self, uri: &str, data: &[u8]) -> Self {
        self.published.insert(uri.to_string(), data.to_vec());
        self
    }
}

#[async_trait]
impl IssuerFetcher for StaticFetcher {
    async fn fetch(&self, uri: &str) -> usg_cep_client::Result<Vec<u8>> {
        self.requested.lock().unwrap().push(uri.to_string());
        self.published
            .get(uri)
            .cloned()
            .ok_or_else(|| CepError::server_error(404, "Not Found"))
    }
}
