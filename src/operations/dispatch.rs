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

//! Operation dispatch.
//!
//! The dispatcher is the only place where [`CepError`] values become
//! certmonger result codes.

use std::sync::Arc;

use super::env::{self, OperationEnv};
use super::{Operation, OperationResult, ResultCode};
use crate::config::CepClientConfig;
use crate::error::{CepError, Result};
use crate::service::Service;
use crate::wstep::{Cookie, EnrollmentOutcome, EnrollmentRequest};
use crate::xcep::IssuerFetcher;

/// Runs certmonger operations against one configured endpoint.
pub struct Dispatcher {
    config: std::result::Result<CepClientConfig, String>,
    fetcher: Option<Arc<dyn IssuerFetcher>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher. Nothing is contacted until an operation needs it.
    pub fn new(config: CepClientConfig) -> Self {
        Self {
            config: Ok(config),
            fetcher: None,
        }
    }

    /// Create a dispatcher without a usable configuration.
    ///
    /// Operations that never contact the CA still succeed. SUBMIT and POLL
    /// report [`ResultCode::Underconfigured`] with `reason`, while
    /// GET-SUPPORTED-TEMPLATES and FETCH-ROOTS report an empty success so
    /// certmonger asks again later.
    pub fn unconfigured(reason: impl Into<String>) -> Self {
        Self {
            config: Err(reason.into()),
            fetcher: None,
        }
    }

    /// The configuration, if there is one.
    pub fn config(&self) -> Option<&CepClientConfig> {
        self.config.as_ref().ok()
    }

    /// Use `fetcher` for AIA downloads during FETCH-ROOTS.
    pub fn with_issuer_fetcher(mut self, fetcher: Arc<dyn IssuerFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Run the operation called `name`.
    ///
    /// Unknown names yield [`ResultCode::Unsupported`]. Every failure is
    /// folded into the result; this never returns an error.
    pub async fn dispatch(&self, name: &str, env: &OperationEnv) -> OperationResult {
        let operation = match name.parse::<Operation>() {
            Ok(operation) => operation,
            Err(e) => {
                tracing::debug!("{}", e);
                return OperationResult::new(ResultCode::Unsupported, "");
            }
        };

        tracing::debug!("Running {}", operation);
        match self.run(operation, env).await {
            Ok(result) => {
                tracing::info!("{} finished with {}", operation, result.code);
                result
            }
            Err(e) => {
                let result = result_for_error(&e);
                tracing::warn!("{} failed with {}: {}", operation, result.code, e);
                result
            }
        }
    }

    async fn run(&self, operation: Operation, env: &OperationEnv) -> Result<OperationResult> {
        for key in operation.required_inputs() {
            env.require(key)?;
        }

        match operation {
            Operation::Identify => Ok(OperationResult::success(format!(
                "cepces {}",
                crate::VERSION
            ))),
            Operation::GetNewRequestRequirements | Operation::GetRenewRequestRequirements => {
                Ok(OperationResult::success(env::CA_PROFILE))
            }
            Operation::GetDefaultTemplate => Ok(OperationResult::success("")),
            Operation::GetSupportedTemplates => {
                let Some(service) = self.listing_service(operation) else {
                    return Ok(OperationResult::success(""));
                };
                let templates = service.templates().await?;
                Ok(OperationResult::success(templates.join("\n")))
            }
            Operation::FetchRoots => {
                let Some(service) = self.listing_service(operation) else {
                    return Ok(OperationResult::success(""));
                };
                let chain = service.fetch_roots().await?;
                if !chain.is_empty() && !chain.is_complete() {
                    tracing::warn!("Returning a partial CA chain of {} certificates", chain.len());
                }
                Ok(OperationResult::success(chain.to_certmonger()))
            }
            Operation::Submit => {
                let csr = env.require(env::CSR)?;
                let mut request = match env.get(env::CERTIFICATE) {
                    Some(prior) => EnrollmentRequest::renewal(csr, prior),
                    None => EnrollmentRequest::new(csr),
                };
                if let Some(template) = env.get(env::CA_PROFILE) {
                    request = request.with_template(template);
                }

                let service = self.service()?;
                let outcome = service.submit(&request).await?;
                Ok(outcome_result(&service, outcome))
            }
            Operation::Poll => {
                let cookie: Cookie = env.require(env::CA_COOKIE)?.parse()?;
                let service = self.service()?;
                let outcome = service.poll(&cookie).await?;
                Ok(outcome_result(&service, outcome))
            }
        }
    }

    fn service(&self) -> Result<Service> {
        let config = self
            .config
            .as_ref()
            .map_err(|reason| CepError::underconfigured(reason.clone()))?;
        let service = Service::new(config.clone())?;
        Ok(match &self.fetcher {
            Some(fetcher) => service.with_issuer_fetcher(Arc::clone(fetcher)),
            None => service,
        })
    }

    /// The service for a listing operation, or `None` if it cannot be built.
    fn listing_service(&self, operation: Operation) -> Option<Service> {
        match self.service() {
            Ok(service) => Some(service),
            Err(e) => {
                tracing::warn!("{} has no service, reporting nothing: {}", operation, e);
                None
            }
        }
    }
}

fn outcome_result(service: &Service, outcome: EnrollmentOutcome) -> OperationResult {
    match outcome {
        EnrollmentOutcome::Issued { certificate } => OperationResult::success(certificate),
        EnrollmentOutcome::Pending { cookie } => OperationResult::new(
            ResultCode::WaitMore,
            format!("{}\n{}", service.poll_interval(), cookie),
        ),
        EnrollmentOutcome::Rejected { reason } => OperationResult::new(ResultCode::Rejected, reason),
    }
}

/// Translate an error into the result certmonger sees.
///
/// SOAP faults report only the fault reason. Everything else reports the
/// error message.
pub fn result_for_error(err: &CepError) -> OperationResult {
    let code = match err {
        CepError::Connect(_) | CepError::Http(_) => ResultCode::ConnectError,
        CepError::ServerError { status, .. } if *status >= 500 => ResultCode::ConnectError,
        CepError::Fault { reason, .. } => {
            return OperationResult::new(ResultCode::Rejected, reason.clone());
        }
        CepError::Binding(_)
        | CepError::BindingType { .. }
        | CepError::Xml(_)
        | CepError::InvalidPem(_)
        | CepError::InvalidCookie(_)
        | CepError::Base64(_)
        | CepError::Der(_) => ResultCode::Rejected,
        CepError::ServerError { .. }
        | CepError::Underconfigured(_)
        | CepError::Authentication(_)
        | CepError::Tls(_)
        | CepError::Config(_)
        | CepError::Url(_)
        | CepError::Io(_) => ResultCode::Underconfigured,
    };
    OperationResult::new(code, err.to_string())
}
