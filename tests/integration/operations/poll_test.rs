//! Integration tests for polling pending requests (QueryTokenStatus)

use crate::integration::{
    anonymous_config, anonymous_soap, MockCepServer, LEAF_CSR, LEAF_PEM, PATH_ISSUING_ANONYMOUS,
    PATH_ISSUING_KERBEROS,
};
use usg_cep_client::{Cookie, EndpointType, EnrollmentClient, EnrollmentOutcome, EnrollmentRequest};

fn client(mock: &MockCepServer) -> EnrollmentClient {
    let endpoint = mock.endpoint(PATH_ISSUING_ANONYMOUS);
    let config = anonymous_config(endpoint.clone(), EndpointType::Enrollment);
    EnrollmentClient::new(anonymous_soap(&config), endpoint)
}

#[tokio::test]
async fn test_pending_then_issued() {
    let mock = MockCepServer::start().await;
    mock.mock_pending(PATH_ISSUING_ANONYMOUS, 42).await;
    mock.mock_poll_issued(PATH_ISSUING_KERBEROS).await;

    let client = client(&mock);
    let EnrollmentOutcome::Pending { cookie } = client
        .issue(&EnrollmentRequest::new(LEAF_CSR))
        .await
        .expect("issue failed")
    else {
        panic!("expected a pending outcome");
    };

    // The cookie is all certmonger keeps between SUBMIT and POLL.
    let cookie: Cookie = cookie.to_string().parse().expect("cookie round trip");
    let outcome = client.poll(&cookie).await.expect("poll failed");

    assert_eq!(
        outcome,
        EnrollmentOutcome::Issued {
            certificate: LEAF_PEM.trim().to_string()
        }
    );
}

#[tokio::test]
async fn test_poll_goes_to_reference_with_request_id() {
    let mock = MockCepServer::start().await;
    mock.mock_poll_issued(PATH_ISSUING_KERBEROS).await;

    let cookie = Cookie::new(42, mock.endpoint(PATH_ISSUING_KERBEROS).to_string());
    client(&mock).poll(&cookie).await.expect("poll failed");

    let requests = mock.inner().received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), PATH_ISSUING_KERBEROS);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("QueryTokenStatus"));
    assert!(body.contains(">42</"));
}

#[tokio::test]
async fn test_repeated_poll_keeps_cookie() {
    let mock = MockCepServer::start().await;
    // Two independent pending answers that report different request ids.
    mock.mock_poll_pending_once(PATH_ISSUING_KERBEROS, 77).await;
    mock.mock_poll_pending_once(PATH_ISSUING_KERBEROS, 99).await;

    let cookie = Cookie::new(42, mock.endpoint(PATH_ISSUING_KERBEROS).to_string());
    let client = client(&mock);

    let first = client.poll(&cookie).await.expect("first poll failed");
    let second = client.poll(&cookie).await.expect("second poll failed");

    assert_eq!(first, EnrollmentOutcome::Pending { cookie: cookie.clone() });
    assert_eq!(first, second);
    assert_eq!(mock.request_count().await, 2);
}

#[tokio::test]
async fn test_poll_with_opaque_reference_uses_endpoint() {
    let mock = MockCepServer::start().await;
    mock.mock_poll_issued(PATH_ISSUING_ANONYMOUS).await;

    let cookie = Cookie::new(7, "urn:request:7");
    let outcome = client(&mock).poll(&cookie).await.expect("poll failed");
    assert!(outcome.is_issued());
}
