//! Integration tests for certificate requests (RequestSecurityToken)

use crate::integration::{
    anonymous_config, anonymous_soap, MockCepServer, LEAF_CSR, LEAF_PEM, PATH_ISSUING_ANONYMOUS,
    PATH_ISSUING_KERBEROS, PATH_POLICY, PATH_SECOND_ANONYMOUS,
};
use usg_cep_client::{
    Cookie, EndpointType, EnrollmentClient, EnrollmentOutcome, EnrollmentRequest, Service,
};

#[tokio::test]
async fn test_issue_returns_certificate_verbatim() {
    let mock = MockCepServer::start().await;
    mock.mock_issued(PATH_ISSUING_ANONYMOUS).await;

    let endpoint = mock.endpoint(PATH_ISSUING_ANONYMOUS);
    let config = anonymous_config(endpoint.clone(), EndpointType::Enrollment);
    let client = EnrollmentClient::new(anonymous_soap(&config), endpoint);

    let outcome = client
        .issue(&EnrollmentRequest::new(LEAF_CSR))
        .await
        .expect("issue failed");

    assert_eq!(
        outcome,
        EnrollmentOutcome::Issued {
            certificate: LEAF_PEM.trim().to_string()
        }
    );
}

#[tokio::test]
async fn test_issue_pending() {
    let mock = MockCepServer::start().await;
    mock.mock_pending(PATH_ISSUING_ANONYMOUS, 42).await;

    let endpoint = mock.endpoint(PATH_ISSUING_ANONYMOUS);
    let config = anonymous_config(endpoint.clone(), EndpointType::Enrollment);
    let client = EnrollmentClient::new(anonymous_soap(&config), endpoint);

    let outcome = client
        .issue(&EnrollmentRequest::new(LEAF_CSR))
        .await
        .expect("issue failed");

    let expected = Cookie::new(42, mock.endpoint(PATH_ISSUING_KERBEROS).to_string());
    assert_eq!(outcome, EnrollmentOutcome::Pending { cookie: expected });
}

#[tokio::test]
async fn test_request_carries_pkcs10_body() {
    let mock = MockCepServer::start().await;
    mock.mock_issued(PATH_ISSUING_ANONYMOUS).await;

    let endpoint = mock.endpoint(PATH_ISSUING_ANONYMOUS);
    let config = anonymous_config(endpoint.clone(), EndpointType::Enrollment);
    let client = EnrollmentClient::new(anonymous_soap(&config), endpoint);
    client
        .issue(&EnrollmentRequest::new(LEAF_CSR))
        .await
        .expect("issue failed");

    let requests = mock.inner().received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    let csr_first_line = LEAF_CSR.lines().nth(1).unwrap();
    assert!(body.contains(csr_first_line));
    assert!(body.contains("ws-trust/200512/Issue"));
    assert!(body.contains("#PKCS10"));
    assert!(!body.contains("BEGIN CERTIFICATE REQUEST"));
}

#[tokio::test]
async fn test_submit_through_policy_picks_template_ca() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;
    mock.mock_issued(PATH_SECOND_ANONYMOUS).await;

    let config = anonymous_config(mock.endpoint(PATH_POLICY), EndpointType::Policy);
    let service = Service::new(config).expect("Service creation failed");

    // User is only offered by the second CA.
    let outcome = service
        .submit(&EnrollmentRequest::new(LEAF_CSR).with_template("User"))
        .await
        .expect("submit failed");

    assert!(outcome.is_issued());
}

#[tokio::test]
async fn test_renewal_uses_renew_request_type() {
    let mock = MockCepServer::start().await;
    mock.mock_issued(PATH_ISSUING_ANONYMOUS).await;

    let endpoint = mock.endpoint(PATH_ISSUING_ANONYMOUS);
    let config = anonymous_config(endpoint.clone(), EndpointType::Enrollment);
    let service = Service::new(config).expect("Service creation failed");

    let outcome = service
        .submit(&EnrollmentRequest::renewal(LEAF_CSR, LEAF_PEM))
        .await
        .expect("submit failed");
    assert!(outcome.is_issued());

    let requests = mock.inner().received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("ws-trust/200512/Renew"));
}
