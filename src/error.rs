//! Error types for the enrollment client.
//!
//! This module defines every error that can occur below the operation
//! dispatcher: XML binding failures, transport and TLS failures, SOAP faults
//! reported by the server, authentication failures and configuration gaps.

use thiserror::Error;

/// Result type alias using [`CepError`].
pub type Result<T> = std::result::Result<T, CepError>;

/// Errors that can occur during policy or enrollment operations.
#[derive(Debug, Error)]
pub enum CepError {
    /// A required element or attribute was missing, or an element was
    /// not the one the schema expected.
    #[error("Binding error: {0}")]
    Binding(String),

    /// A leaf value could not be coerced to its declared scalar type.
    #[error("Binding type error: cannot read '{value}' as {expected} for field '{field}'")]
    BindingType {
        /// Field key from the binding schema.
        field: String,
        /// The offending text.
        value: String,
        /// Name of the expected scalar type.
        expected: &'static str,
    },

    /// Malformed or rejected XML document.
    #[error("XML error: {0}")]
    Xml(String),

    /// The server could not be reached (refused, DNS, TLS handshake, timeout).
    #[error("Connection error: {0}")]
    Connect(String),

    /// HTTP request or response error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an HTTP error that carried no SOAP fault.
    #[error("Server error {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The server answered with a SOAP fault.
    #[error("{reason} (Code: {code}; Subcode: {})", .subcode.as_deref().unwrap_or("None"))]
    Fault {
        /// `Code/Value` of the fault.
        code: String,
        /// `Code/Subcode/Value` of the fault, if present.
        subcode: Option<String>,
        /// `Reason/Text` of the fault.
        reason: String,
    },

    /// A required input or configuration value is missing.
    #[error("Underconfigured: {0}")]
    Underconfigured(String),

    /// Credential negotiation or verification failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Invalid PEM data.
    #[error("Invalid PEM data: {0}")]
    InvalidPem(String),

    /// A poll cookie could not be decoded.
    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    /// Settings file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Base64 decoding error.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// DER encoding/decoding error.
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CepError {
    /// Create a binding error with the given message.
    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    /// Create a binding type error.
    pub fn binding_type(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: &'static str,
    ) -> Self {
        Self::BindingType {
            field: field.into(),
            value: value.into(),
            expected,
        }
    }

    /// Create an XML error with the given message.
    pub fn xml(msg: impl Into<String>) -> Self {
        Self::Xml(msg.into())
    }

    /// Create a connection error with the given message.
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Create a server error with status and message.
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    /// Create a SOAP fault error.
    pub fn fault(
        code: impl Into<String>,
        subcode: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Fault {
            code: code.into(),
            subcode,
            reason: reason.into(),
        }
    }

    /// Create an underconfigured error.
    pub fn underconfigured(msg: impl Into<String>) -> Self {
        Self::Underconfigured(msg.into())
    }

    /// Create an authentication error.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a TLS error with the given message.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create an invalid PEM error.
    pub fn invalid_pem(msg: impl Into<String>) -> Self {
        Self::InvalidPem(msg.into())
    }

    /// Create an invalid cookie error.
    pub fn invalid_cookie(msg: impl Into<String>) -> Self {
        Self::InvalidCookie(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify a reqwest error.
    ///
    /// Failures that happen before a response is received become
    /// [`CepError::Connect`]; everything else stays [`CepError::Http`].
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::Connect(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Returns true if the caller may retry the operation later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Http(_) => true,
            Self::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this is a SOAP fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}
