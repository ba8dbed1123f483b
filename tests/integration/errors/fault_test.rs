//! Integration tests for SOAP faults and HTTP errors

use crate::integration::{anonymous_config, MockCepServer, LEAF_CSR, PATH_ISSUING_ANONYMOUS, PATH_POLICY};
use usg_cep_client::operations::env::CSR;
use usg_cep_client::{
    CepError, Dispatcher, EndpointType, EnrollmentRequest, OperationEnv, ResultCode, Service,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const DENIED: &str = "Denied by Policy Module  The request was for a certificate template that is not supported by the Active Directory Certificate Services policy: WebServer.";

fn enrollment_dispatcher(mock: &MockCepServer) -> Dispatcher {
    Dispatcher::new(anonymous_config(
        mock.endpoint(PATH_ISSUING_ANONYMOUS),
        EndpointType::Enrollment,
    ))
}

#[tokio::test]
async fn test_fault_is_an_error() {
    let mock = MockCepServer::start().await;
    mock.mock_fault(PATH_ISSUING_ANONYMOUS).await;

    let config = anonymous_config(mock.endpoint(PATH_ISSUING_ANONYMOUS), EndpointType::Enrollment);
    let service = Service::new(config).expect("Service creation failed");
    let err = service
        .submit(&EnrollmentRequest::new(LEAF_CSR))
        .await
        .unwrap_err();

    match err {
        CepError::Fault {
            code,
            subcode,
            reason,
        } => {
            assert_eq!(code, "s:Receiver");
            assert_eq!(subcode.as_deref(), Some("a:InternalServiceFault"));
            assert_eq!(reason, DENIED);
        }
        other => panic!("Expected a fault, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_submit_fault_is_rejected_with_reason() {
    let mock = MockCepServer::start().await;
    mock.mock_fault(PATH_ISSUING_ANONYMOUS).await;

    let env = OperationEnv::new().with(CSR, LEAF_CSR);
    let result = enrollment_dispatcher(&mock).dispatch("SUBMIT", &env).await;

    assert_eq!(result.code, ResultCode::Rejected);
    assert_eq!(result.payload, DENIED);
}

#[tokio::test]
async fn test_server_error_is_connecterror() {
    let mock = MockCepServer::start().await;
    mock.mock_http_error(PATH_ISSUING_ANONYMOUS, 503, "Service Unavailable")
        .await;

    let env = OperationEnv::new().with(CSR, LEAF_CSR);
    let result = enrollment_dispatcher(&mock).dispatch("SUBMIT", &env).await;

    assert_eq!(result.code, ResultCode::ConnectError);
}

#[tokio::test]
async fn test_missing_service_is_underconfigured() {
    let mock = MockCepServer::start().await;
    mock.mock_http_error(PATH_POLICY, 404, "Not Found").await;

    let dispatcher = Dispatcher::new(anonymous_config(
        mock.endpoint(PATH_POLICY),
        EndpointType::Policy,
    ));
    let result = dispatcher
        .dispatch("GET-SUPPORTED-TEMPLATES", &OperationEnv::new())
        .await;

    assert_eq!(result.code, ResultCode::Underconfigured);
}

#[tokio::test]
async fn test_unexpected_body_is_rejected() {
    let mock = MockCepServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_ISSUING_ANONYMOUS))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Body><Unexpected xmlns="urn:example"/></s:Body></s:Envelope>"#,
        ))
        .mount(mock.inner())
        .await;

    let env = OperationEnv::new().with(CSR, LEAF_CSR);
    let result = enrollment_dispatcher(&mock).dispatch("SUBMIT", &env).await;

    assert_eq!(result.code, ResultCode::Rejected);
}
