//! Integration tests for policy retrieval (GetPolicies)

use std::sync::Arc;

use crate::integration::{
    anonymous_config, anonymous_soap, MockCepServer, ISSUING_AIA, ISSUING_PEM, PATH_POLICY,
    ROOT_AIA, ROOT_DER, StaticFetcher,
};
use usg_cep_client::xcep::PolicyClient;
use usg_cep_client::{AuthKind, EndpointType, Service};

#[tokio::test]
async fn test_get_policy_templates_in_order() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let config = anonymous_config(mock.endpoint(PATH_POLICY), EndpointType::Policy);
    let client = PolicyClient::new(anonymous_soap(&config), config.endpoint.clone());

    let policy = client.get_policy().await.expect("get_policy failed");

    assert_eq!(policy.templates.len(), 3);
    assert_eq!(policy.template_names(), vec!["Machine", "WebServer", "User"]);
    assert_eq!(
        policy.templates[1].friendly_name.as_deref(),
        Some("Corporate Web Server")
    );
    assert_eq!(policy.authorities.len(), 2);
}

#[tokio::test]
async fn test_endpoints_follow_priority() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let config = anonymous_config(mock.endpoint(PATH_POLICY), EndpointType::Policy);
    let service = Service::new(config).expect("Service creation failed");

    let endpoints = service
        .endpoints(Some("WebServer"))
        .await
        .expect("endpoints failed");
    let paths: Vec<&str> = endpoints.iter().map(|e| e.uri.path()).collect();
    assert_eq!(
        paths,
        vec![
            "/Issuing-CA_CES_Anonymous/service.svc/CES",
            "/Second-CA_CES_Anonymous/service.svc/CES",
        ]
    );
    assert!(endpoints.iter().all(|e| e.authentication == AuthKind::Anonymous));
}

#[tokio::test]
async fn test_policy_is_fetched_once() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let config = anonymous_config(mock.endpoint(PATH_POLICY), EndpointType::Policy);
    let service = Service::new(config).expect("Service creation failed");

    service.templates().await.expect("templates failed");
    service.endpoints(None).await.expect("endpoints failed");
    service.templates().await.expect("templates failed");

    assert_eq!(mock.request_count().await, 1);
}

#[tokio::test]
async fn test_unknown_template_is_underconfigured() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let config = anonymous_config(mock.endpoint(PATH_POLICY), EndpointType::Policy);
    let service = Service::new(config).expect("Service creation failed");

    let err = service.endpoints(Some("SmartcardLogon")).await.unwrap_err();
    assert!(matches!(err, usg_cep_client::CepError::Underconfigured(_)));
}

#[tokio::test]
async fn test_fetch_roots_walks_aia() {
    let mock = MockCepServer::start().await;
    mock.mock_policy().await;

    let fetcher = Arc::new(StaticFetcher::default().publish(ROOT_AIA, ROOT_DER));
    let config = anonymous_config(mock.endpoint(PATH_POLICY), EndpointType::Policy);
    let service = Service::new(config)
        .expect("Service creation failed")
        .with_issuer_fetcher(fetcher.clone());

    let chain = service.fetch_roots().await.expect("fetch_roots failed");

    assert!(chain.is_complete());
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.certificates()[0].nickname, "Example Root CA");
    assert_eq!(chain.certificates()[1].pem, ISSUING_PEM.trim());
    assert_eq!(*fetcher.requested.lock().unwrap(), vec![ROOT_AIA.to_string()]);
    assert!(!fetcher.requested.lock().unwrap().contains(&ISSUING_AIA.to_string()));
}
