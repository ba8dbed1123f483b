//! Certmonger helper operations.
//!
//! This module contains the operation vocabulary certmonger drives a CA
//! helper with, the result codes it understands, and the [`Dispatcher`]
//! that turns one named operation into one [`OperationResult`].

mod dispatch;
pub mod env;

use std::fmt;
use std::str::FromStr;

pub use dispatch::{Dispatcher, result_for_error};
pub use env::OperationEnv;

/// An operation certmonger may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Report the helper name and version.
    Identify,
    /// Download the CA chain.
    FetchRoots,
    /// List the templates offered by the policy.
    GetSupportedTemplates,
    /// Report the default template.
    GetDefaultTemplate,
    /// List the inputs needed for a new request.
    GetNewRequestRequirements,
    /// List the inputs needed for a renewal.
    GetRenewRequestRequirements,
    /// Submit a certificate signing request.
    Submit,
    /// Check on a pending request.
    Poll,
}

impl Operation {
    /// Every operation with its certmonger name.
    pub const ALL: [(Operation, &'static str); 8] = [
        (Self::Identify, "IDENTIFY"),
        (Self::FetchRoots, "FETCH-ROOTS"),
        (Self::GetSupportedTemplates, "GET-SUPPORTED-TEMPLATES"),
        (Self::GetDefaultTemplate, "GET-DEFAULT-TEMPLATE"),
        (Self::GetNewRequestRequirements, "GET-NEW-REQUEST-REQUIREMENTS"),
        (Self::GetRenewRequestRequirements, "GET-RENEW-REQUEST-REQUIREMENTS"),
        (Self::Submit, "SUBMIT"),
        (Self::Poll, "POLL"),
    ];

    /// The name certmonger passes in `CERTMONGER_OPERATION`.
    pub fn name(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(op, _)| *op == self)
            .map(|(_, name)| *name)
            .unwrap_or_default()
    }

    /// Whether the operation talks to the CA.
    pub fn needs_service(self) -> bool {
        matches!(
            self,
            Self::FetchRoots | Self::GetSupportedTemplates | Self::Submit | Self::Poll
        )
    }

    /// Inputs that must be present before anything is sent.
    pub fn required_inputs(self) -> &'static [&'static str] {
        match self {
            Self::Submit => &[env::CSR],
            Self::Poll => &[env::CA_COOKIE],
            _ => &[],
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(op, _)| *op)
            .ok_or_else(|| format!("unsupported operation '{}'", s))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exit status reported to certmonger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// The certificate was issued, or the operation succeeded.
    Issued = 0,
    /// The request is pending; certmonger picks the delay.
    Wait = 1,
    /// The CA refused the request.
    Rejected = 2,
    /// The CA could not be reached.
    ConnectError = 3,
    /// The helper is missing configuration or input.
    Underconfigured = 4,
    /// The request is pending; poll after the reported delay.
    WaitMore = 5,
    /// The operation is not implemented.
    Unsupported = 6,
}

impl ResultCode {
    /// Success for operations that do not issue certificates.
    pub const DEFAULT: ResultCode = ResultCode::Issued;

    /// The numeric exit status.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Issued => "ISSUED",
            Self::Wait => "WAIT",
            Self::Rejected => "REJECTED",
            Self::ConnectError => "CONNECTERROR",
            Self::Underconfigured => "UNDERCONFIGURED",
            Self::WaitMore => "WAITMORE",
            Self::Unsupported => "UNSUPPORTED",
        };
        f.write_str(name)
    }
}

/// What an operation reports: an exit status and the text for stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    /// Exit status.
    pub code: ResultCode,
    /// Text printed to stdout; may be empty.
    pub payload: String,
}

impl OperationResult {
    /// Create a result.
    pub fn new(code: ResultCode, payload: impl Into<String>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    /// A successful result.
    pub fn success(payload: impl Into<String>) -> Self {
        Self::new(ResultCode::DEFAULT, payload)
    }
}
