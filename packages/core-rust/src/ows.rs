//! OWS exception reports: the fault document every binding emits.

use std::fmt;
use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

use crate::xml::{emit, XmlError};

pub const NS_OWS: &str = "http://www.opengis.net/ows/1.1";
pub const OWS_PREFIX: &str = "ows";

/// OWS exception codes, plus the SOS-specific ones bindings may raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionCode {
    OperationNotSupported,
    MissingParameterValue,
    InvalidParameterValue,
    VersionNegotiationFailed,
    InvalidUpdateSequence,
    OptionNotSupported,
    NoApplicableCode,
    NoDataAvailable,
    InvalidRequest,
}

impl ExceptionCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OperationNotSupported => "OperationNotSupported",
            Self::MissingParameterValue => "MissingParameterValue",
            Self::InvalidParameterValue => "InvalidParameterValue",
            Self::VersionNegotiationFailed => "VersionNegotiationFailed",
            Self::InvalidUpdateSequence => "InvalidUpdateSequence",
            Self::OptionNotSupported => "OptionNotSupported",
            Self::NoApplicableCode => "NoApplicableCode",
            Self::NoDataAvailable => "NoDataAvailable",
            Self::InvalidRequest => "InvalidRequest",
        }
    }

    /// HTTP status used when nothing more specific is known.
    #[must_use]
    pub fn default_status(self) -> u16 {
        match self {
            Self::OperationNotSupported | Self::OptionNotSupported => 501,
            Self::NoApplicableCode => 500,
            _ => 400,
        }
    }

    /// Fixed reason text carried in SOAP 1.2 faults.
    #[must_use]
    pub fn soap_reason(self) -> &'static str {
        match self {
            Self::InvalidParameterValue => "The request contained an invalid parameter value.",
            Self::MissingParameterValue => {
                "The request did not include a value for a required parameter and this server does not declare a default value for it."
            }
            Self::OperationNotSupported => {
                "The requested operation is not supported by this server."
            }
            Self::OptionNotSupported => {
                "The request included/targeted an option that is not supported by this server."
            }
            Self::VersionNegotiationFailed => {
                "The list of versions in the 'AcceptVersions' parameter value of the GetCapabilities operation request did not include any version supported by this server."
            }
            Self::NoDataAvailable => "There are no data available.",
            Self::InvalidUpdateSequence => {
                "The value of the (optional) updateSequence parameter in the GetCapabilities operation request is invalid."
            }
            Self::InvalidRequest => "The request is invalid.",
            Self::NoApplicableCode => "A server exception was encountered.",
        }
    }

    /// Whether the client caused the fault (SOAP `Sender`/`Client`).
    #[must_use]
    pub fn is_client_fault(self) -> bool {
        self != Self::NoApplicableCode
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(code, locator, text)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedException {
    pub code: ExceptionCode,
    pub locator: Option<String>,
    pub message: String,
}

impl CodedException {
    #[must_use]
    pub fn new(code: ExceptionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            locator: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn at(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }
}

/// One or more exceptions plus an optional explicit HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExceptionReport {
    exceptions: Vec<CodedException>,
    status: Option<u16>,
}

impl ExceptionReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(exception: CodedException) -> Self {
        Self {
            exceptions: vec![exception],
            status: None,
        }
    }

    pub fn push(&mut self, exception: CodedException) {
        self.exceptions.push(exception);
    }

    /// Appends all of `other`'s exceptions; an explicit status on `other`
    /// is kept only if this report has none.
    pub fn merge(&mut self, other: ExceptionReport) {
        self.exceptions.extend(other.exceptions);
        self.status = self.status.or(other.status);
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn exceptions(&self) -> &[CodedException] {
        &self.exceptions
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }

    /// Explicit status if set, otherwise the highest code default.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.unwrap_or_else(|| {
            self.exceptions
                .iter()
                .map(|e| e.code.default_status())
                .max()
                .unwrap_or(500)
        })
    }

    /// Code of the first exception; reports are never rendered empty.
    #[must_use]
    pub fn primary_code(&self) -> ExceptionCode {
        self.exceptions
            .first()
            .map_or(ExceptionCode::NoApplicableCode, |e| e.code)
    }

    /// Renders a complete `ows:ExceptionReport` document.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Write`] if serialization fails.
    pub fn to_xml(&self, version: &str) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        emit(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        let mut root = BytesStart::new("ows:ExceptionReport");
        root.push_attribute(("xmlns:ows", NS_OWS));
        root.push_attribute(("version", version));
        root.push_attribute(("xml:lang", "en"));
        emit(&mut writer, Event::Start(root))?;
        self.write_exceptions(&mut writer)?;
        emit(&mut writer, Event::End(BytesEnd::new("ows:ExceptionReport")))?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| XmlError::Write(e.to_string()))
    }

    /// Writes the `ows:Exception` elements only, for embedding in other
    /// documents. The `ows` prefix must be bound by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Write`] if serialization fails.
    pub fn write_exceptions<W: std::io::Write>(
        &self,
        writer: &mut Writer<W>,
    ) -> Result<(), XmlError> {
        let fallback;
        let exceptions = if self.exceptions.is_empty() {
            fallback = [CodedException::new(
                ExceptionCode::NoApplicableCode,
                ExceptionCode::NoApplicableCode.soap_reason(),
            )];
            &fallback[..]
        } else {
            &self.exceptions[..]
        };
        for exception in exceptions {
            let mut start = BytesStart::new("ows:Exception");
            start.push_attribute(("exceptionCode", exception.code.as_str()));
            if let Some(locator) = &exception.locator {
                start.push_attribute(("locator", locator.as_str()));
            }
            emit(writer, Event::Start(start))?;
            emit(writer, Event::Start(BytesStart::new("ows:ExceptionText")))?;
            emit(writer, Event::Text(BytesText::new(&exception.message)))?;
            emit(writer, Event::End(BytesEnd::new("ows:ExceptionText")))?;
            emit(writer, Event::End(BytesEnd::new("ows:Exception")))?;
        }
        Ok(())
    }
}

impl fmt::Display for ExceptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.exceptions.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", e.code)?;
            if let Some(locator) = &e.locator {
                write!(f, "@{locator}")?;
            }
            write!(f, ": {}", e.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    #[test]
    fn report_document_carries_every_triple() {
        let mut report = ExceptionReport::single(
            CodedException::new(ExceptionCode::MissingParameterValue, "request is missing")
                .at("request"),
        );
        report.push(CodedException::new(
            ExceptionCode::InvalidParameterValue,
            "version <3.0> is not supported",
        ));

        let xml = report.to_xml("2.0.0").unwrap();
        let doc = XmlDocument::parse(xml.clone()).unwrap();
        assert_eq!(doc.root_namespace(), Some(NS_OWS));
        assert_eq!(doc.root_name(), "ExceptionReport");
        assert_eq!(doc.attribute("version"), Some("2.0.0"));
        assert!(xml.contains(r#"exceptionCode="MissingParameterValue" locator="request""#));
        assert!(xml.contains("version &lt;3.0&gt; is not supported"));
    }

    #[test]
    fn status_follows_codes_unless_overridden() {
        let report =
            ExceptionReport::single(CodedException::new(ExceptionCode::InvalidRequest, "x"));
        assert_eq!(report.status(), 400);

        let mut mixed = report.clone();
        mixed.push(CodedException::new(ExceptionCode::OperationNotSupported, "y"));
        assert_eq!(mixed.status(), 501);

        assert_eq!(report.with_status(418).status(), 418);
    }

    #[test]
    fn merge_keeps_first_status() {
        let mut a = ExceptionReport::single(CodedException::new(ExceptionCode::NoApplicableCode, "a"));
        let b = ExceptionReport::single(CodedException::new(ExceptionCode::InvalidRequest, "b"))
            .with_status(422);
        a.merge(b);
        assert_eq!(a.exceptions().len(), 2);
        assert_eq!(a.status(), 422);
        assert_eq!(a.to_string(), "NoApplicableCode: a; InvalidRequest: b");
    }

    #[test]
    fn empty_report_still_renders_an_exception() {
        let xml = ExceptionReport::new().to_xml("2.0.0").unwrap();
        assert!(xml.contains("NoApplicableCode"));
    }
}
