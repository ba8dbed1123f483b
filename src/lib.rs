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

//! # usg-cep-client
//!
//! A Rust client for Microsoft's certificate enrollment web services:
//! MS-XCEP (Certificate Enrollment Policy) and MS-WSTEP (WS-Trust X.509v3
//! Token Enrollment), plus a certmonger CA helper built on them.
//!
//! ## Features
//!
//! - **Async-first design** using Tokio
//! - **Policy discovery**: templates, CAs and enrollment endpoints from `GetPolicies`
//! - **Enrollment**: issue, renew and poll through `RequestSecurityToken`
//! - **Authentication**: anonymous, Kerberos (SPNEGO), username/password and TLS client certificates
//! - **CA chain retrieval** by following Authority Information Access
//! - **certmonger helper** operations with the standard result codes
//!
//! ## Quick Start
//!
//! ```no_run
//! use usg_cep_client::{CepClientConfig, Service};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CepClientConfig::builder()
//!         .endpoint("https://ca.example.com/ADPolicyProvider_CEP_UsernamePassword/service.svc/CEP")?
//!         .build()?;
//!
//!     let service = Service::new(config)?;
//!     for template in service.templates().await? {
//!         println!("{}", template);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Certificate Enrollment
//!
//! ```no_run
//! use usg_cep_client::{CepClientConfig, EnrollmentOutcome, EnrollmentRequest, Service};
//!
//! # async fn example(csr_pem: String) -> Result<(), Box<dyn std::error::Error>> {
//! let config = CepClientConfig::builder()
//!     .endpoint("https://ca.example.com/ADPolicyProvider_CEP_Kerberos/service.svc/CEP")?
//!     .build()?;
//! let service = Service::new(config)?;
//!
//! match service.submit(&EnrollmentRequest::new(csr_pem).with_template("Machine")).await? {
//!     EnrollmentOutcome::Issued { certificate } => println!("{}", certificate),
//!     EnrollmentOutcome::Pending { cookie } => println!("Pending, poll with {}", cookie),
//!     EnrollmentOutcome::Rejected { reason } => println!("Rejected: {}", reason),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## certmonger
//!
//! The `cepces-submit` binary reads `CERTMONGER_OPERATION` and the other
//! `CERTMONGER_*` variables, runs one operation through
//! [`operations::Dispatcher`], prints the payload and exits with the
//! result code.
//!
//! ## Cargo Features
//!
//! - `gssapi`: Kerberos through the system GSSAPI library

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod binding;
pub mod config;
pub mod error;
pub mod logging;
pub mod operations;
pub mod service;
pub mod settings;
pub mod soap;
pub mod tls;
pub mod wstep;
pub mod xcep;
pub mod xml;

// Re-export main types at crate root for convenience
pub use config::{
    AuthConfig, AuthKind, CepClientConfig, CepClientConfigBuilder, ClientIdentity, EndpointType,
    KerberosConfig, PasswordMode, TrustAnchors, UsernamePasswordConfig,
};
pub use error::{CepError, Result};
pub use operations::{Dispatcher, Operation, OperationEnv, OperationResult, ResultCode};
pub use service::Service;
pub use wstep::{Cookie, EnrollmentClient, EnrollmentOutcome, EnrollmentRequest};
pub use xcep::{CertificateChain, PolicyClient, PolicyResponse, PolicyTemplate};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("usg-cep-client/", env!("CARGO_PKG_VERSION"));
