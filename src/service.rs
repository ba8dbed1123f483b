//! Enrollment service.
//!
//! This module provides [`Service`], the façade over the XCEP policy client
//! and the WSTEP enrollment client. It decides which enrollment endpoint a
//! request goes to, depending on whether the configured endpoint is a policy
//! service or an enrollment service.

use std::sync::Arc;

use tokio::sync::OnceCell;
use url::Url;

use crate::auth::Authenticator;
use crate::config::{CepClientConfig, EndpointType};
use crate::error::{CepError, Result};
use crate::soap::SoapClient;
use crate::wstep::{Cookie, EnrollmentClient, EnrollmentOutcome, EnrollmentRequest};
use crate::xcep::{CertificateChain, Endpoint, IssuerFetcher, PolicyClient, PolicyResponse};

/// Certificate enrollment through a policy or enrollment endpoint.
///
/// In [`EndpointType::Policy`] mode the policy is downloaded once, on first
/// use, and enrollment endpoints are chosen from it. In
/// [`EndpointType::Enrollment`] mode the configured endpoint is used as is
/// and there are no templates or CA chain to offer.
///
/// # Example
///
/// ```no_run
/// use usg_cep_client::{CepClientConfig, EnrollmentRequest, Service};
///
/// # async fn example(csr_pem: String) -> Result<(), Box<dyn std::error::Error>> {
/// let config = CepClientConfig::builder()
///     .endpoint("https://cep.example.com/ADPolicyProvider_CEP_Kerberos/service.svc/CEP")?
///     .build()?;
///
/// let service = Service::new(config)?;
/// for template in service.templates().await? {
///     println!("{}", template);
/// }
///
/// let outcome = service
///     .submit(&EnrollmentRequest::new(csr_pem).with_template("Machine"))
///     .await?;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Service {
    config: CepClientConfig,
    soap: SoapClient,
    policy_client: Option<PolicyClient>,
    policy: OnceCell<PolicyResponse>,
}

impl Service {
    /// Create a service, building the authenticator and HTTP stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the authentication mechanism or TLS cannot be
    /// set up.
    pub fn new(config: CepClientConfig) -> Result<Self> {
        let auth = Authenticator::from_config(&config.auth)?;
        let soap = SoapClient::new(&config, auth)?;
        Ok(Self::with_soap(config, soap))
    }

    /// Create a service around an existing SOAP client.
    pub fn with_soap(config: CepClientConfig, soap: SoapClient) -> Self {
        let policy_client = match config.endpoint_type {
            EndpointType::Policy => Some(PolicyClient::new(soap.clone(), config.endpoint.clone())),
            EndpointType::Enrollment => None,
        };
        Self {
            config,
            soap,
            policy_client,
            policy: OnceCell::new(),
        }
    }

    /// Replace the AIA issuer fetcher used by [`Service::fetch_roots`].
    pub fn with_issuer_fetcher(mut self, fetcher: Arc<dyn IssuerFetcher>) -> Self {
        self.policy_client = self.policy_client.map(|c| c.with_fetcher(fetcher));
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &CepClientConfig {
        &self.config
    }

    /// Seconds to wait before polling a pending request.
    pub fn poll_interval(&self) -> u64 {
        self.config.poll_interval
    }

    /// The enrollment policy; `None` in enrollment mode.
    pub async fn policy(&self) -> Result<Option<&PolicyResponse>> {
        let Some(client) = &self.policy_client else {
            return Ok(None);
        };
        let policy = self.policy.get_or_try_init(|| client.get_policy()).await?;
        Ok(Some(policy))
    }

    /// Template common names in server order.
    pub async fn templates(&self) -> Result<Vec<String>> {
        Ok(match self.policy().await? {
            Some(policy) => policy.template_names().into_iter().map(str::to_string).collect(),
            None => Vec::new(),
        })
    }

    /// Endpoints usable with the configured authentication, most preferred
    /// first.
    ///
    /// # Errors
    ///
    /// [`CepError::Underconfigured`] if `template` is not offered by the
    /// policy.
    pub async fn endpoints(&self, template: Option<&str>) -> Result<Vec<Endpoint>> {
        let Some(policy) = self.policy().await? else {
            return Ok(Vec::new());
        };
        let template = find_template(policy, template)?;
        Ok(policy
            .endpoints_for(self.config.auth.kind(), template)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Where `request` should be sent.
    ///
    /// # Errors
    ///
    /// [`CepError::Underconfigured`] if the template is unknown or no
    /// endpoint accepts the configured authentication.
    pub async fn enrollment_endpoint(&self, request: &EnrollmentRequest) -> Result<Url> {
        let Some(policy) = self.policy().await? else {
            return Ok(self.config.endpoint.clone());
        };

        let kind = self.config.auth.kind();
        let template = find_template(policy, request.template.as_deref())?;
        let endpoint = policy
            .select_endpoint(kind, request.is_renewal(), template)
            .ok_or_else(|| {
                CepError::underconfigured(format!(
                    "No enrollment endpoint accepts {} authentication{}",
                    kind,
                    template
                        .map(|t| format!(" for template {}", t.name))
                        .unwrap_or_default()
                ))
            })?;

        tracing::debug!("Selected enrollment endpoint {}", endpoint.uri);
        Ok(endpoint.uri.clone())
    }

    /// Submit a certificate request.
    pub async fn submit(&self, request: &EnrollmentRequest) -> Result<EnrollmentOutcome> {
        let endpoint = self.enrollment_endpoint(request).await?;
        EnrollmentClient::new(self.soap.clone(), endpoint)
            .issue(request)
            .await
    }

    /// Poll a pending request.
    pub async fn poll(&self, cookie: &Cookie) -> Result<EnrollmentOutcome> {
        EnrollmentClient::new(self.soap.clone(), self.config.endpoint.clone())
            .poll(cookie)
            .await
    }

    /// The CA chain, root first. Empty in enrollment mode.
    pub async fn fetch_roots(&self) -> Result<CertificateChain> {
        let (Some(client), Some(policy)) = (&self.policy_client, self.policy().await?) else {
            return Ok(CertificateChain::default());
        };
        client.fetch_roots(policy).await
    }
}

fn find_template<'a>(
    policy: &'a PolicyResponse,
    name: Option<&str>,
) -> Result<Option<&'a crate::xcep::PolicyTemplate>> {
    match name {
        None => Ok(None),
        Some(name) => policy.find_template(name).map(Some).ok_or_else(|| {
            CepError::underconfigured(format!("Template '{}' is not offered by the policy", name))
        }),
    }
}
