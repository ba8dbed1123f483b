//! Integration tests for network error handling

use std::time::Duration;

use url::Url;
use usg_cep_client::operations::env::CSR;
use usg_cep_client::{
    AuthConfig, CepClientConfig, CepError, Dispatcher, EndpointType, OperationEnv, ResultCode,
    Service,
};

use crate::integration::LEAF_CSR;

/// A local port with nothing listening on it.
fn closed_port_url(path: &str) -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{}{}", port, path)).expect("Valid URL")
}

fn config(endpoint: Url, endpoint_type: EndpointType) -> CepClientConfig {
    CepClientConfig::builder()
        .endpoint_parsed(endpoint)
        .endpoint_type(endpoint_type)
        .auth(AuthConfig::Anonymous)
        .timeout(Duration::from_secs(2))
        .build()
        .expect("Valid config")
}

#[tokio::test]
async fn test_connection_refused() {
    let endpoint = closed_port_url("/ADPolicyProvider_CEP_Anonymous/service.svc/CEP");
    let service = Service::new(config(endpoint, EndpointType::Policy))
        .expect("Service creation failed");

    let err = service.templates().await.unwrap_err();

    assert!(
        matches!(err, CepError::Connect(_)),
        "Should be a connection error, got: {:?}",
        err
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_connection_refused_maps_to_connecterror() {
    let policy = Dispatcher::new(config(
        closed_port_url("/ADPolicyProvider_CEP_Anonymous/service.svc/CEP"),
        EndpointType::Policy,
    ));
    let enrollment = Dispatcher::new(config(
        closed_port_url("/Issuing-CA_CES_Anonymous/service.svc/CES"),
        EndpointType::Enrollment,
    ));
    let env = OperationEnv::new().with(CSR, LEAF_CSR);

    for name in ["GET-SUPPORTED-TEMPLATES", "FETCH-ROOTS", "SUBMIT"] {
        let result = policy.dispatch(name, &env).await;
        assert_eq!(result.code, ResultCode::ConnectError, "{}", name);
    }

    let result = enrollment.dispatch("SUBMIT", &env).await;
    assert_eq!(result.code, ResultCode::ConnectError);
}
