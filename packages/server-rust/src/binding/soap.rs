//! SOAP binding: requests arrive as SOAP 1.1 or 1.2 envelopes and every
//! answer, fault or success, goes back in an envelope of the same version.

use async_trait::async_trait;
use http::StatusCode;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use sos_core::ows::NS_OWS;
use sos_core::xml::{emit, strip_declaration};
use sos_core::{
    CodingRepository, EncodedResponse, Encoding, ExceptionReport, OperationKey, ServiceError,
    XmlDocument, XmlError,
};
use tracing::{debug, error};

use super::{
    method_not_supported, status_code, Binding, BindingContext, TransportRequest,
    TransportResponse,
};

const NAME: &str = "SOAP";

pub const NS_SOAP_11: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const NS_SOAP_12: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const NS_WSA: &str = "http://www.w3.org/2005/08/addressing";

// ---------------------------------------------------------------------------
// SoapVersion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SoapVersion {
    Soap11,
    #[default]
    Soap12,
}

impl SoapVersion {
    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            Self::Soap11 => NS_SOAP_11,
            Self::Soap12 => NS_SOAP_12,
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }

    #[must_use]
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            NS_SOAP_11 => Some(Self::Soap11),
            NS_SOAP_12 => Some(Self::Soap12),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope parsing
// ---------------------------------------------------------------------------

/// A parsed request envelope.
#[derive(Debug)]
pub struct Envelope {
    pub version: SoapVersion,
    /// WS-Addressing `MessageID`, echoed back as `RelatesTo`.
    pub message_id: Option<String>,
    /// WS-Addressing `Action` header.
    pub action: Option<String>,
    /// The single body child, with the envelope's namespace bindings.
    pub body: XmlDocument,
}

/// Why an envelope could not be read; `version` is set once it was known.
#[derive(Debug)]
pub struct EnvelopeFailure {
    pub version: Option<SoapVersion>,
    pub error: ServiceError,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Header,
    Body,
}

#[derive(Clone, Copy)]
enum HeaderField {
    MessageId,
    Action,
}

fn malformed(e: impl std::fmt::Display) -> ServiceError {
    XmlError::Malformed(e.to_string()).into()
}

/// Adds the `xmlns` declarations of `element`, later ones replacing
/// earlier ones of the same name.
fn collect_declarations(
    element: &BytesStart<'_>,
    into: &mut Vec<(String, String)>,
) -> Result<(), ServiceError> {
    for attr in element.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            let name = String::from_utf8_lossy(key).into_owned();
            let value = attr.unescape_value().map_err(malformed)?.into_owned();
            into.retain(|(existing, _)| *existing != name);
            into.push((name, value));
        }
    }
    Ok(())
}

/// Splits a SOAP envelope into its version, addressing headers and body.
///
/// # Errors
///
/// Returns an [`EnvelopeFailure`] if the text is not a well-formed envelope
/// of a known SOAP version with exactly one body element.
pub fn parse_envelope(text: &str) -> Result<Envelope, EnvelopeFailure> {
    let mut version: Option<SoapVersion> = None;
    let fail = |version: Option<SoapVersion>, error: ServiceError| EnvelopeFailure { version, error };

    let mut reader = NsReader::from_str(text);
    let mut depth = 0usize;
    let mut section = Section::Outside;
    let mut declarations: Vec<(String, String)> = Vec::new();
    let mut field: Option<HeaderField> = None;
    let mut message_id: Option<String> = None;
    let mut action: Option<String> = None;
    let mut capture: Option<Writer<Vec<u8>>> = None;
    let mut body: Option<String> = None;

    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| fail(version, malformed(e)))?;
        let namespace = match resolved {
            ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.0).into_owned()),
            ResolveResult::Unknown(prefix) => {
                return Err(fail(
                    version,
                    malformed(format!(
                        "unbound namespace prefix '{}'",
                        String::from_utf8_lossy(&prefix)
                    )),
                ))
            }
            ResolveResult::Unbound => None,
        };

        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let empty = matches!(event, Event::Empty(_));
                let local = e.local_name();
                let local = local.as_ref();
                let in_soap = namespace.as_deref() == version.map(SoapVersion::namespace);
                match depth {
                    0 => {
                        if local != b"Envelope" {
                            return Err(fail(None, ServiceError::decode("the request is not a SOAP envelope")));
                        }
                        let ns = namespace.as_deref().unwrap_or_default();
                        version = Some(SoapVersion::from_namespace(ns).ok_or_else(|| {
                            fail(
                                None,
                                ServiceError::decode(format!(
                                    "unsupported SOAP envelope namespace '{ns}'"
                                )),
                            )
                        })?);
                        collect_declarations(e, &mut declarations).map_err(|err| fail(version, err))?;
                    }
                    1 if in_soap && local == b"Header" => section = Section::Header,
                    1 if in_soap && local == b"Body" => {
                        section = Section::Body;
                        collect_declarations(e, &mut declarations).map_err(|err| fail(version, err))?;
                    }
                    2 if section == Section::Body => {
                        if body.is_some() {
                            return Err(fail(
                                version,
                                ServiceError::decode("the SOAP body holds more than one element"),
                            ));
                        }
                        capture = Some(Writer::new(Vec::new()));
                    }
                    2 if section == Section::Header && namespace.as_deref() == Some(NS_WSA) => {
                        field = match local {
                            b"MessageID" => Some(HeaderField::MessageId),
                            b"Action" => Some(HeaderField::Action),
                            _ => None,
                        };
                    }
                    _ => {}
                }
                if let Some(writer) = capture.as_mut() {
                    emit(writer, event.clone()).map_err(|err| fail(version, err.into()))?;
                }
                if empty {
                    if depth == 2 && section == Section::Body {
                        body = finish(capture.take()).map_err(|err| fail(version, err))?;
                    }
                    if depth == 1 {
                        section = Section::Outside;
                    }
                } else {
                    depth += 1;
                }
            }
            Event::End(_) => {
                if let Some(writer) = capture.as_mut() {
                    emit(writer, event.clone()).map_err(|err| fail(version, err.into()))?;
                }
                depth = depth.saturating_sub(1);
                match depth {
                    2 if section == Section::Body => {
                        body = finish(capture.take()).map_err(|err| fail(version, err))?;
                    }
                    2 => field = None,
                    1 => section = Section::Outside,
                    _ => {}
                }
            }
            Event::Text(t) => {
                if let Some(writer) = capture.as_mut() {
                    emit(writer, event.clone()).map_err(|err| fail(version, err.into()))?;
                } else if let Some(field) = field {
                    let value = t.unescape().map_err(|e| fail(version, malformed(e)))?;
                    let value = value.trim().to_string();
                    match field {
                        HeaderField::MessageId => message_id = Some(value),
                        HeaderField::Action => action = Some(value),
                    }
                }
            }
            Event::Eof => break,
            _ => {
                if let Some(writer) = capture.as_mut() {
                    emit(writer, event.clone()).map_err(|err| fail(version, err.into()))?;
                }
            }
        }
    }

    let Some(version) = version else {
        return Err(fail(None, XmlError::Empty.into()));
    };
    let body = body.ok_or_else(|| fail(Some(version), ServiceError::decode("the SOAP body is empty")))?;
    let body = XmlDocument::from_fragment(&body, &declarations)
        .map_err(|e| fail(Some(version), e.into()))?;
    Ok(Envelope {
        version,
        message_id,
        action,
        body,
    })
}

fn finish(capture: Option<Writer<Vec<u8>>>) -> Result<Option<String>, ServiceError> {
    capture
        .map(|writer| {
            String::from_utf8(writer.into_inner()).map_err(|_| ServiceError::from(XmlError::Encoding))
        })
        .transpose()
}

/// Action from the `SOAPAction` header (1.1) or the content type's
/// `action` parameter (1.2).
#[must_use]
pub fn transport_action(request: &TransportRequest) -> Option<String> {
    let unquote = |value: &str| {
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    };
    if let Some(action) = request.header("soapaction").and_then(unquote) {
        return Some(action);
    }
    request
        .content_type()?
        .split(';')
        .skip(1)
        .filter_map(|parameter| parameter.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("action"))
        .and_then(|(_, value)| unquote(value))
}

/// The action must name the operation as its last path segment.
fn check_action(action: Option<&str>, operation: &str) -> Result<(), ServiceError> {
    match action {
        Some(action) if action.rsplit(['/', '#', ':']).next() != Some(operation) => {
            Err(ServiceError::invalid(
                "SOAPAction",
                format!("the action '{action}' does not match the operation '{operation}'"),
            ))
        }
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Envelope writing
// ---------------------------------------------------------------------------

fn text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), XmlError> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn write_envelope<F>(
    version: SoapVersion,
    relates_to: Option<&str>,
    declare_ows: bool,
    body: F,
) -> Result<String, XmlError>
where
    F: FnOnce(&mut Writer<Vec<u8>>) -> Result<(), XmlError>,
{
    let mut writer = Writer::new(Vec::new());
    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;
    let mut root = BytesStart::new("soap:Envelope");
    root.push_attribute(("xmlns:soap", version.namespace()));
    if declare_ows {
        root.push_attribute(("xmlns:ows", NS_OWS));
    }
    emit(&mut writer, Event::Start(root))?;
    if let Some(id) = relates_to {
        emit(&mut writer, Event::Start(BytesStart::new("soap:Header")))?;
        let mut relates = BytesStart::new("wsa:RelatesTo");
        relates.push_attribute(("xmlns:wsa", NS_WSA));
        emit(&mut writer, Event::Start(relates))?;
        emit(&mut writer, Event::Text(BytesText::new(id)))?;
        emit(&mut writer, Event::End(BytesEnd::new("wsa:RelatesTo")))?;
        emit(&mut writer, Event::End(BytesEnd::new("soap:Header")))?;
    }
    emit(&mut writer, Event::Start(BytesStart::new("soap:Body")))?;
    body(&mut writer)?;
    emit(&mut writer, Event::End(BytesEnd::new("soap:Body")))?;
    emit(&mut writer, Event::End(BytesEnd::new("soap:Envelope")))?;
    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
}

fn write_fault<W: std::io::Write>(
    writer: &mut Writer<W>,
    version: SoapVersion,
    report: &ExceptionReport,
) -> Result<(), XmlError> {
    let code = report.primary_code();
    let client = code.is_client_fault();
    emit(writer, Event::Start(BytesStart::new("soap:Fault")))?;
    match version {
        SoapVersion::Soap11 => {
            text_element(
                writer,
                "faultcode",
                if client { "soap:Client" } else { "soap:Server" },
            )?;
            let text = report
                .exceptions()
                .first()
                .map_or(code.soap_reason(), |e| e.message.as_str());
            text_element(writer, "faultstring", text)?;
            emit(writer, Event::Start(BytesStart::new("detail")))?;
            report.write_exceptions(writer)?;
            emit(writer, Event::End(BytesEnd::new("detail")))?;
        }
        SoapVersion::Soap12 => {
            emit(writer, Event::Start(BytesStart::new("soap:Code")))?;
            text_element(
                writer,
                "soap:Value",
                if client { "soap:Sender" } else { "soap:Receiver" },
            )?;
            emit(writer, Event::Start(BytesStart::new("soap:Subcode")))?;
            text_element(writer, "soap:Value", &format!("ows:{}", code.as_str()))?;
            emit(writer, Event::End(BytesEnd::new("soap:Subcode")))?;
            emit(writer, Event::End(BytesEnd::new("soap:Code")))?;

            emit(writer, Event::Start(BytesStart::new("soap:Reason")))?;
            let mut text = BytesStart::new("soap:Text");
            text.push_attribute(("xml:lang", "en"));
            emit(writer, Event::Start(text))?;
            emit(writer, Event::Text(BytesText::new(code.soap_reason())))?;
            emit(writer, Event::End(BytesEnd::new("soap:Text")))?;
            emit(writer, Event::End(BytesEnd::new("soap:Reason")))?;

            emit(writer, Event::Start(BytesStart::new("soap:Detail")))?;
            report.write_exceptions(writer)?;
            emit(writer, Event::End(BytesEnd::new("soap:Detail")))?;
        }
    }
    emit(writer, Event::End(BytesEnd::new("soap:Fault")))
}

/// A complete fault envelope for `report`.
///
/// # Errors
///
/// Returns [`XmlError::Write`] if serialization fails.
pub fn fault_envelope(
    version: SoapVersion,
    relates_to: Option<&str>,
    report: &ExceptionReport,
) -> Result<String, XmlError> {
    write_envelope(version, relates_to, true, |writer| {
        write_fault(writer, version, report)
    })
}

/// Embeds an XML document in a response envelope.
///
/// # Errors
///
/// Returns [`XmlError::Write`] if serialization fails.
pub fn response_envelope(
    version: SoapVersion,
    relates_to: Option<&str>,
    document: &str,
) -> Result<String, XmlError> {
    let content = strip_declaration(document);
    write_envelope(version, relates_to, false, |writer| {
        emit(writer, Event::Text(BytesText::from_escaped(content)))
    })
}

// ---------------------------------------------------------------------------
// SoapBinding
// ---------------------------------------------------------------------------

/// Serves SOAP 1.1 and 1.2 requests over POST.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoapBinding;

impl SoapBinding {
    async fn process(
        ctx: &BindingContext,
        envelope: &Envelope,
        action: Option<&str>,
    ) -> Result<EncodedResponse, ServiceError> {
        let request = ctx.decode_xml(&envelope.body)?;
        if ctx.config.validate_soap_action {
            check_action(action, &request.operation)?;
        }
        ctx.execute(request).await
    }

    fn fault(
        ctx: &BindingContext,
        version: SoapVersion,
        relates_to: Option<&str>,
        failure: &ServiceError,
    ) -> TransportResponse {
        let report = ctx.report_failure(NAME, failure);
        match fault_envelope(version, relates_to, &report) {
            Ok(document) => TransportResponse::new(
                status_code(report.status()),
                version.content_type(),
                document,
            ),
            Err(e) => {
                error!(error = %e, "SOAP fault could not be rendered");
                TransportResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    report.to_string(),
                )
            }
        }
    }

    fn wrap(ctx: &BindingContext, envelope: &Envelope, encoded: EncodedResponse) -> TransportResponse {
        if !encoded.is_xml() {
            debug!(content_type = %encoded.content_type, "returning non-XML response unwrapped");
            return TransportResponse::from_encoded(encoded);
        }
        let relates_to = envelope.message_id.as_deref();
        let document = String::from_utf8_lossy(&encoded.body);
        match response_envelope(envelope.version, relates_to, &document) {
            Ok(wrapped) => TransportResponse::new(
                encoded.status.map_or(StatusCode::OK, status_code),
                envelope.version.content_type(),
                wrapped,
            ),
            Err(e) => Self::fault(ctx, envelope.version, relates_to, &e.into()),
        }
    }
}

#[async_trait]
impl Binding for SoapBinding {
    fn name(&self) -> &'static str {
        NAME
    }

    fn url_pattern(&self) -> &'static str {
        "soap"
    }

    async fn handle_get(&self, ctx: &BindingContext, request: TransportRequest) -> TransportResponse {
        Self::fault(
            ctx,
            ctx.config.default_soap_version,
            None,
            &method_not_supported(&request, NAME),
        )
    }

    fn fault_response(&self, ctx: &BindingContext, error: &ServiceError) -> TransportResponse {
        Self::fault(ctx, ctx.config.default_soap_version, None, error)
    }

    async fn handle_post(&self, ctx: &BindingContext, request: TransportRequest) -> TransportResponse {
        let default_version = ctx.config.default_soap_version;
        let Ok(text) = std::str::from_utf8(&request.body) else {
            return Self::fault(ctx, default_version, None, &XmlError::Encoding.into());
        };
        let envelope = match parse_envelope(text) {
            Ok(envelope) => envelope,
            Err(failure) => {
                return Self::fault(
                    ctx,
                    failure.version.unwrap_or(default_version),
                    None,
                    &failure.error,
                )
            }
        };
        let action = transport_action(&request).or_else(|| envelope.action.clone());
        match Self::process(ctx, &envelope, action.as_deref()).await {
            Ok(encoded) => Self::wrap(ctx, &envelope, encoded),
            Err(e) => Self::fault(ctx, envelope.version, envelope.message_id.as_deref(), &e),
        }
    }

    fn supports_operation_over_post(
        &self,
        codecs: &CodingRepository,
        operation: &OperationKey,
    ) -> bool {
        codecs.supports(Encoding::Xml, operation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use sos_core::{CodecKey, CodedException, ExceptionCode};

    use super::*;
    use crate::service::config::ServiceConfig;
    use crate::testing::{
        binding_context, binding_context_with, EchoOperator, StaticDecoder, TEST_NS,
    };

    fn decoders() -> Vec<std::sync::Arc<dyn sos_core::Decoder>> {
        vec![StaticDecoder::arc(
            vec![CodecKey::element(TEST_NS, "GetObservation")],
            "2.0.0",
            "GetObservation",
        )]
    }

    fn context() -> BindingContext {
        binding_context(
            decoders(),
            vec![EchoOperator::arc("SOS", "2.0.0", "GetObservation")],
        )
    }

    fn envelope(namespace: &str, header: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<env:Envelope xmlns:env="{namespace}" xmlns:sos="{TEST_NS}" xmlns:wsa="{NS_WSA}">
  <env:Header>{header}</env:Header>
  <env:Body>
    {body}
  </env:Body>
</env:Envelope>"#
        )
    }

    async fn post(ctx: &BindingContext, content_type: &'static str, body: String) -> TransportResponse {
        SoapBinding
            .handle_post(ctx, TransportRequest::post(content_type, body))
            .await
    }

    #[test]
    fn envelope_body_inherits_namespaces() {
        let parsed = parse_envelope(&envelope(
            NS_SOAP_12,
            "<wsa:MessageID>urn:uuid:42</wsa:MessageID><wsa:Action>urn:act</wsa:Action>",
            r#"<sos:GetObservation service="SOS" version="2.0.0"><sos:offering>o1</sos:offering></sos:GetObservation>"#,
        ))
        .unwrap();
        assert_eq!(parsed.version, SoapVersion::Soap12);
        assert_eq!(parsed.message_id.as_deref(), Some("urn:uuid:42"));
        assert_eq!(parsed.action.as_deref(), Some("urn:act"));
        assert_eq!(parsed.body.root_namespace(), Some(TEST_NS));
        assert_eq!(parsed.body.root_name(), "GetObservation");
        assert_eq!(parsed.body.attribute("version"), Some("2.0.0"));
        assert!(parsed.body.as_str().contains("<sos:offering>o1</sos:offering>"));
    }

    #[test]
    fn envelope_errors_keep_known_version() {
        let failure = parse_envelope(&envelope(NS_SOAP_11, "", "")).unwrap_err();
        assert_eq!(failure.version, Some(SoapVersion::Soap11));

        let failure =
            parse_envelope(&envelope("http://example.org/soap/9", "", "<sos:X/>")).unwrap_err();
        assert_eq!(failure.version, None);

        let failure = parse_envelope(&format!(r#"<sos:GetObservation xmlns:sos="{TEST_NS}"/>"#))
            .unwrap_err();
        assert_eq!(failure.version, None);
    }

    #[test]
    fn action_comes_from_header_or_content_type() {
        let mut request = TransportRequest::post(
            "application/soap+xml; charset=utf-8; action=\"urn:op/GetObservation\"",
            "",
        );
        assert_eq!(
            transport_action(&request).as_deref(),
            Some("urn:op/GetObservation")
        );
        request.headers.insert(
            "soapaction",
            http::HeaderValue::from_static("\"urn:other\""),
        );
        assert_eq!(transport_action(&request).as_deref(), Some("urn:other"));
        assert_eq!(
            transport_action(&TransportRequest::post("text/xml", "")),
            None
        );
    }

    #[test]
    fn action_must_end_with_operation() {
        assert!(check_action(None, "GetObservation").is_ok());
        assert!(check_action(
            Some("http://www.opengis.net/def/serviceOperation/sos/core/2.0/GetObservation"),
            "GetObservation"
        )
        .is_ok());
        assert!(check_action(Some("urn:sos:DescribeSensor"), "GetObservation").is_err());
    }

    #[tokio::test]
    async fn soap12_request_is_answered_in_envelope() {
        let ctx = context();
        let response = post(
            &ctx,
            "application/soap+xml",
            envelope(
                NS_SOAP_12,
                "<wsa:MessageID>urn:uuid:7</wsa:MessageID>",
                r#"<sos:GetObservation service="SOS" version="2.0.0"/>"#,
            ),
        )
        .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type, SoapVersion::Soap12.content_type());

        let doc = XmlDocument::parse(response.body_text().into_owned()).unwrap();
        assert_eq!(doc.root_namespace(), Some(NS_SOAP_12));
        assert_eq!(doc.root_name(), "Envelope");
        let body = response.body_text();
        assert!(body.contains("<wsa:RelatesTo"));
        assert!(body.contains("urn:uuid:7"));
        assert!(body.contains(r#"operation="GetObservation""#));
        assert_eq!(body.matches("<?xml").count(), 1);
    }

    #[tokio::test]
    async fn soap11_unknown_body_is_client_fault() {
        let ctx = context();
        let response = post(
            &ctx,
            "text/xml",
            envelope(NS_SOAP_11, "", r#"<GetWeather xmlns="urn:example:weather"/>"#),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.content_type, SoapVersion::Soap11.content_type());
        let body = response.body_text();
        assert!(body.contains(NS_SOAP_11));
        assert!(body.contains("<faultcode>soap:Client</faultcode>"));
        assert!(body.contains(r#"exceptionCode="InvalidRequest""#));
    }

    #[tokio::test]
    async fn unknown_soap_version_faults_with_default_version() {
        let ctx = context();
        let response = post(
            &ctx,
            "application/soap+xml",
            envelope(
                "http://example.org/soap/9",
                "",
                r#"<sos:GetObservation service="SOS" version="2.0.0"/>"#,
            ),
        )
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.content_type, SoapVersion::Soap12.content_type());
        let doc = XmlDocument::parse(response.body_text().into_owned()).unwrap();
        assert_eq!(doc.root_namespace(), Some(NS_SOAP_12));
        let body = response.body_text();
        assert!(body.contains("<soap:Value>soap:Sender</soap:Value>"));
        assert!(body.contains("<soap:Value>ows:InvalidRequest</soap:Value>"));
    }

    #[tokio::test]
    async fn mismatched_action_is_rejected_when_checked() {
        let config = ServiceConfig {
            validate_soap_action: true,
            ..ServiceConfig::default()
        };
        let ctx = binding_context_with(
            config,
            decoders(),
            vec![EchoOperator::arc("SOS", "2.0.0", "GetObservation")],
        );
        let body = envelope(
            NS_SOAP_12,
            "<wsa:Action>urn:sos:DescribeSensor</wsa:Action>",
            r#"<sos:GetObservation service="SOS" version="2.0.0"/>"#,
        );
        let response = post(&ctx, "application/soap+xml", body.clone()).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body_text().contains(r#"locator="SOAPAction""#));

        // Unchecked by default.
        let response = post(&context(), "application/soap+xml", body).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn get_is_answered_with_fault_envelope() {
        let response = SoapBinding
            .handle_get(&context(), TransportRequest::get("request=GetCapabilities"))
            .await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.body_text().contains("soap:Fault"));
    }

    #[test]
    fn server_faults_use_receiver_code() {
        let report = ExceptionReport::single(CodedException::new(
            ExceptionCode::NoApplicableCode,
            "backend unavailable",
        ));
        let soap12 = fault_envelope(SoapVersion::Soap12, Some("urn:uuid:1"), &report).unwrap();
        assert!(soap12.contains("<soap:Value>soap:Receiver</soap:Value>"));
        assert!(soap12.contains("<soap:Value>ows:NoApplicableCode</soap:Value>"));
        assert!(soap12.contains(r#"<soap:Text xml:lang="en">"#));
        assert!(soap12.contains("backend unavailable"));
        XmlDocument::parse(soap12).unwrap();

        let soap11 = fault_envelope(SoapVersion::Soap11, None, &report).unwrap();
        assert!(soap11.contains("<faultcode>soap:Server</faultcode>"));
        assert!(soap11.contains("<faultstring>backend unavailable</faultstring>"));
        XmlDocument::parse(soap11).unwrap();
    }

    #[test]
    fn non_xml_responses_are_not_wrapped() {
        let ctx = context();
        let parsed = parse_envelope(&envelope(
            NS_SOAP_12,
            "",
            r#"<sos:GetObservation service="SOS" version="2.0.0"/>"#,
        ))
        .unwrap();
        let encoded = EncodedResponse {
            content_type: "application/json".into(),
            body: b"{}".to_vec(),
            status: None,
        };
        let response = SoapBinding::wrap(&ctx, &parsed, encoded);
        assert_eq!(response.content_type, "application/json");
        assert_eq!(response.body_text(), "{}");
    }
}
