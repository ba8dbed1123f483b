//! Integration tests for the certmonger operations

use std::sync::Arc;

use crate::integration::{
    anonymous_config, MockCepServer, StaticFetcher, LEAF_CSR, LEAF_PEM, PATH_ISSUING_ANONYMOUS,
    PATH_ISSUING_KERBEROS, PATH_POLICY, ROOT_AIA, ROOT_DER,
};
use usg_cep_client::operations::env::{CA_COOKIE, CA_PROFILE, CERTIFICATE, CSR};
use usg_cep_client::{Dispatcher, EndpointType, OperationEnv, ResultCode};

fn policy_dispatcher(mock: &MockCepServer) -> Dispatcher {
    Dispatcher::new(anonymous_config(mock.endpoint(PATH_POLICY), EndpointType::Policy))
}

#[tokio::test]
async fn test_get_supported_templates() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let result = policy_dispatcher(&mock)
        .dispatch("GET-SUPPORTED-TEMPLATES", &OperationEnv::new())
        .await;

    assert_eq!(result.code, ResultCode::DEFAULT);
    assert_eq!(result.payload, "Machine\nWebServer\nUser");
}

#[tokio::test]
async fn test_fetch_roots() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let dispatcher = policy_dispatcher(&mock)
        .with_issuer_fetcher(Arc::new(StaticFetcher::default().publish(ROOT_AIA, ROOT_DER)));
    let result = dispatcher.dispatch("FETCH-ROOTS", &OperationEnv::new()).await;

    assert_eq!(result.code, ResultCode::DEFAULT);
    assert!(result.payload.starts_with("Example Root CA\n-----BEGIN CERTIFICATE-----"));
    assert!(result.payload.contains("\nExample Issuing CA\n-----BEGIN CERTIFICATE-----"));
    assert_eq!(result.payload.matches("-----BEGIN CERTIFICATE-----").count(), 2);
}

#[tokio::test]
async fn test_fetch_roots_in_enrollment_mode_is_empty() {
    let mock = MockCepServer::start().await;
    let dispatcher = Dispatcher::new(anonymous_config(
        mock.endpoint(PATH_ISSUING_ANONYMOUS),
        EndpointType::Enrollment,
    ));

    let result = dispatcher.dispatch("FETCH-ROOTS", &OperationEnv::new()).await;

    assert_eq!(result.code, ResultCode::DEFAULT);
    assert!(result.payload.is_empty());
    assert_eq!(mock.request_count().await, 0);
}

#[tokio::test]
async fn test_submit_issued() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;
    mock.mock_issued(PATH_ISSUING_ANONYMOUS).await;

    let env = OperationEnv::new()
        .with(CSR, LEAF_CSR)
        .with(CA_PROFILE, "Machine");
    let result = policy_dispatcher(&mock).dispatch("SUBMIT", &env).await;

    assert_eq!(result.code, ResultCode::Issued);
    assert_eq!(result.payload, LEAF_PEM.trim());
}

#[tokio::test]
async fn test_submit_pending_then_poll() {
    let mock = MockCepServer::start().await;
    mock.mock_pending(PATH_ISSUING_ANONYMOUS, 42).await;
    mock.mock_poll_issued(PATH_ISSUING_KERBEROS).await;

    let dispatcher = Dispatcher::new(anonymous_config(
        mock.endpoint(PATH_ISSUING_ANONYMOUS),
        EndpointType::Enrollment,
    ));

    let env = OperationEnv::new().with(CSR, LEAF_CSR);
    let result = dispatcher.dispatch("SUBMIT", &env).await;
    assert_eq!(result.code, ResultCode::WaitMore);

    let (delay, cookie) = result.payload.split_once('\n').expect("delay and cookie");
    assert_eq!(delay, "900");
    assert_eq!(
        cookie,
        format!("42,{}", mock.endpoint(PATH_ISSUING_KERBEROS))
    );

    let env = OperationEnv::new().with(CA_COOKIE, cookie);
    let result = dispatcher.dispatch("POLL", &env).await;
    assert_eq!(result.code, ResultCode::Issued);
    assert_eq!(result.payload, LEAF_PEM.trim());
}

#[tokio::test]
async fn test_submit_without_csr_sends_nothing() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let env = OperationEnv::new()
        .with(CA_PROFILE, "Machine")
        .with(CERTIFICATE, LEAF_PEM);
    let result = policy_dispatcher(&mock).dispatch("SUBMIT", &env).await;

    assert_eq!(result.code, ResultCode::Underconfigured);
    assert_eq!(mock.request_count().await, 0);
}

#[tokio::test]
async fn test_submit_unknown_template() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let env = OperationEnv::new()
        .with(CSR, LEAF_CSR)
        .with(CA_PROFILE, "SmartcardLogon");
    let result = policy_dispatcher(&mock).dispatch("SUBMIT", &env).await;

    assert_eq!(result.code, ResultCode::Underconfigured);
    assert!(result.payload.contains("SmartcardLogon"));
}

#[tokio::test]
async fn test_unknown_operation_is_unsupported() {
    let mock = MockCepServer::start().await;

    let result = policy_dispatcher(&mock)
        .dispatch("FETCH-SCEP-ENCRYPTION-CERT", &OperationEnv::new())
        .await;

    assert_eq!(result.code, ResultCode::Unsupported);
    assert_eq!(mock.request_count().await, 0);
}
