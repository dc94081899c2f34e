//! Error taxonomy for request processing and configuration.
//!
//! [`ServiceError`] covers everything that can go wrong while serving one
//! request; each variant knows its OWS exception triples and HTTP status.
//! [`ConfigurationError`] is raised while assembling registries and is
//! fatal at startup or reload.

use crate::codec::key::CodecKey;
use crate::ows::{CodedException, ExceptionCode, ExceptionReport};
use crate::request::params;
use crate::xml::XmlError;

/// Failure while serving a single request.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("the request did not include a value for the required parameter '{name}'")]
    MissingParameter { name: String },

    #[error("invalid value for parameter '{name}': {message}")]
    InvalidParameterValue { name: String, message: String },

    #[error("the service '{service}' is not supported")]
    InvalidService { service: String },

    #[error("the service '{service}' is not supported in version '{version}'")]
    InvalidServiceOrVersion { service: String, version: String },

    #[error("the version '{version}' is not supported")]
    VersionNotSupported { version: String },

    #[error("none of the accepted versions [{}] is supported", accept_versions.join(", "))]
    VersionNegotiationFailed { accept_versions: Vec<String> },

    #[error("the operation '{operation}' is not supported")]
    OperationNotSupported { operation: String },

    #[error("HTTP {method} is not supported by the {binding} binding")]
    MethodNotSupported {
        method: String,
        binding: &'static str,
    },

    #[error("no decoder is available for {key}")]
    NoDecoderForKey { key: CodecKey },

    /// The transport refused the body before any binding saw it.
    #[error("the request body could not be read: {message}")]
    RequestBody { status: u16, message: String },

    #[error("no encoder is available for {key}")]
    NoEncoderForKey { key: CodecKey },

    #[error("{message}")]
    Decode {
        code: ExceptionCode,
        locator: Option<String>,
        message: String,
    },

    #[error("the response could not be encoded: {message}")]
    EncodingFailed { message: String },

    /// Several exceptions reported at once, usually by an operator.
    #[error("{0}")]
    Report(ExceptionReport),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Malformed or unusable request content.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            code: ExceptionCode::InvalidRequest,
            locator: None,
            message: message.into(),
        }
    }

    /// Invalid value found at `locator` while decoding.
    #[must_use]
    pub fn decode_at(locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            code: ExceptionCode::InvalidParameterValue,
            locator: Some(locator.into()),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    #[must_use]
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameterValue {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The OWS exceptions this error is reported as.
    #[must_use]
    pub fn to_report(&self) -> ExceptionReport {
        let message = self.to_string();
        let exception = match self {
            Self::MissingParameter { name } => {
                CodedException::new(ExceptionCode::MissingParameterValue, message).at(name)
            }
            Self::InvalidParameterValue { name, .. } => {
                CodedException::new(ExceptionCode::InvalidParameterValue, message).at(name)
            }
            Self::InvalidService { .. } => {
                CodedException::new(ExceptionCode::InvalidParameterValue, message)
                    .at(params::SERVICE)
            }
            Self::InvalidServiceOrVersion { .. } | Self::VersionNotSupported { .. } => {
                CodedException::new(ExceptionCode::InvalidParameterValue, message)
                    .at(params::VERSION)
            }
            Self::VersionNegotiationFailed { .. } => {
                CodedException::new(ExceptionCode::VersionNegotiationFailed, message)
                    .at("AcceptVersions")
            }
            Self::OperationNotSupported { operation } => {
                CodedException::new(ExceptionCode::OperationNotSupported, message).at(operation)
            }
            Self::MethodNotSupported { .. } => {
                CodedException::new(ExceptionCode::NoApplicableCode, message)
            }
            Self::NoDecoderForKey { .. } | Self::RequestBody { .. } => {
                CodedException::new(ExceptionCode::InvalidRequest, message)
            }
            Self::Decode { code, locator, .. } => {
                let exception = CodedException::new(*code, message);
                match locator {
                    Some(locator) => exception.at(locator),
                    None => exception,
                }
            }
            Self::Report(report) => return report.clone(),
            Self::NoEncoderForKey { .. } | Self::EncodingFailed { .. } | Self::Internal(_) => {
                CodedException::new(ExceptionCode::NoApplicableCode, message)
            }
        };
        ExceptionReport::single(exception).with_status(self.status())
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::MethodNotSupported { .. } => 405,
            Self::OperationNotSupported { .. } => 501,
            Self::NoEncoderForKey { .. } | Self::EncodingFailed { .. } | Self::Internal(_) => 500,
            Self::Decode { code, .. } => code.default_status(),
            Self::Report(report) => report.status(),
            Self::RequestBody { status, .. } => *status,
            _ => 400,
        }
    }

    /// Whether the fault lies with the client.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        self.status() < 500 || matches!(self, Self::OperationNotSupported { .. })
    }
}

impl From<XmlError> for ServiceError {
    fn from(e: XmlError) -> Self {
        match e {
            XmlError::Write(message) => Self::EncodingFailed { message },
            other => Self::decode(other.to_string()),
        }
    }
}

impl From<ExceptionReport> for ServiceError {
    fn from(report: ExceptionReport) -> Self {
        Self::Report(report)
    }
}

/// No registered codec is compatible with the requested key.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no {kind} found for {key}")]
pub struct NoCodecFound {
    pub kind: &'static str,
    pub key: CodecKey,
}

/// Invalid registry contents, detected while loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{kind} '{duplicate}' declares {key}, already declared by '{existing}'")]
    DuplicateCodecKey {
        kind: &'static str,
        key: CodecKey,
        existing: String,
        duplicate: String,
    },

    #[error("more than one request operator is registered for {key}")]
    DuplicateOperator { key: String },

    #[error("no request operators are registered")]
    NoOperators,

    #[error("codec discovery failed: {0:#}")]
    Discovery(#[source] anyhow::Error),
}
