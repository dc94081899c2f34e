//! Built-in `GetCapabilities`: operator, KVP and XML decoders, XML encoder.
//!
//! The operator advertises every operation registered for its
//! `(service, version)` together with the HTTP methods the installed
//! bindings accept it over. Availability is computed per request, so a
//! codec reload is reflected without rebuilding the operator.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};
use serde::{Deserialize, Serialize};
use sos_core::codec::{Codec, Decoder, DecoderInput, Encoder};
use sos_core::ows::NS_OWS;
use sos_core::request::{operation_names, params, versions, SERVICE_RESPONSE};
use sos_core::xml::{emit, XmlError};
use sos_core::{
    CodecKey, CodingRepository, ConfigurationError, EncodedResponse, Encoding, OperationKey,
    ServiceError,
    ServiceRequest, ServiceResponse, TypeTag, XmlDocument,
};

use crate::binding::BindingRepository;
use crate::service::operation::{RequestOperator, RequestOperatorKey};
use crate::service::registry::OperatorRegistry;

pub const NS_SOS_20: &str = "http://www.opengis.net/sos/2.0";
const NS_XLINK: &str = "http://www.w3.org/1999/xlink";

pub static CAPABILITIES_RESPONSE: TypeTag =
    TypeTag::new("CapabilitiesResponse", &[&SERVICE_RESPONSE]);

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// One advertised operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetadata {
    pub name: String,
    /// URL patterns of the bindings accepting it over GET.
    pub get: Vec<String>,
    /// URL patterns of the bindings accepting it over POST.
    pub post: Vec<String>,
}

/// Payload of a capabilities response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub service: String,
    pub version: String,
    /// Every version the service is offered in, highest first.
    pub versions: Vec<String>,
    pub operations: Vec<OperationMetadata>,
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Answers `GetCapabilities` for one `(service, version)`.
pub struct GetCapabilitiesOperator {
    key: RequestOperatorKey,
    versions: Vec<String>,
    operations: Vec<String>,
    codecs: Arc<CodingRepository>,
    bindings: BindingRepository,
}

impl GetCapabilitiesOperator {
    /// One operator per version of `service` found in `registry`, or a
    /// single 2.0.0 operator when the service has none yet.
    ///
    /// Must run after every other operator is registered: the operation
    /// list is taken from `registry` here.
    #[must_use]
    pub fn from_registry(
        registry: &OperatorRegistry,
        service: &str,
        codecs: &Arc<CodingRepository>,
        bindings: &BindingRepository,
    ) -> Vec<Arc<Self>> {
        let mut versions = registry.supported_versions(service).to_vec();
        if versions.is_empty() {
            versions.push(versions::V2_0_0.to_string());
        }
        versions
            .iter()
            .map(|version| {
                let mut operations = vec![operation_names::GET_CAPABILITIES.to_string()];
                for key in registry.request_operator_keys() {
                    let so = &key.service_operator;
                    if so.service == service
                        && so.version == *version
                        && !operations.contains(&key.operation)
                    {
                        operations.push(key.operation.clone());
                    }
                }
                Arc::new(Self {
                    key: RequestOperatorKey::new(
                        service,
                        version.as_str(),
                        operation_names::GET_CAPABILITIES,
                    ),
                    versions: versions.clone(),
                    operations,
                    codecs: Arc::clone(codecs),
                    bindings: bindings.clone(),
                })
            })
            .collect()
    }

    fn describe(&self) -> Capabilities {
        let so = &self.key.service_operator;
        let operations = self
            .operations
            .iter()
            .map(|name| {
                let key = OperationKey::new(so.service.as_str(), so.version.as_str(), name.as_str());
                let (get, post) = self.bindings.endpoints(&self.codecs, &key);
                OperationMetadata {
                    name: name.clone(),
                    get: get.into_iter().map(str::to_string).collect(),
                    post: post.into_iter().map(str::to_string).collect(),
                }
            })
            .collect();
        Capabilities {
            service: so.service.clone(),
            version: so.version.clone(),
            versions: self.versions.clone(),
            operations,
        }
    }
}

#[async_trait]
impl RequestOperator for GetCapabilitiesOperator {
    fn key(&self) -> RequestOperatorKey {
        self.key.clone()
    }

    async fn receive_request(
        &self,
        _request: ServiceRequest,
    ) -> Result<ServiceResponse, ServiceError> {
        let capabilities = self.describe();
        let payload = serde_json::to_value(&capabilities)
            .map_err(|e| ServiceError::Internal(e.into()))?;
        Ok(ServiceResponse {
            service: capabilities.service,
            version: capabilities.version,
            operation: operation_names::GET_CAPABILITIES.to_string(),
            namespace: NS_SOS_20.to_string(),
            response_type: &CAPABILITIES_RESPONSE,
            content_type: sos_core::xml::CONTENT_TYPE_XML.to_string(),
            payload,
            status: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// `?request=GetCapabilities&AcceptVersions=...`
pub struct CapabilitiesKvpDecoder {
    service: String,
}

impl Codec for CapabilitiesKvpDecoder {
    fn keys(&self) -> Vec<CodecKey> {
        vec![CodecKey::operation(
            Encoding::Kvp,
            OperationKey::any_version(self.service.as_str(), operation_names::GET_CAPABILITIES),
        )]
    }

    fn name(&self) -> &str {
        "GetCapabilities (KVP)"
    }
}

impl Decoder for CapabilitiesKvpDecoder {
    fn decode(&self, input: DecoderInput<'_>) -> Result<ServiceRequest, ServiceError> {
        let DecoderInput::Kvp(parameters) = input else {
            return Err(ServiceError::decode("expected query parameters"));
        };
        let service = parameters
            .get(params::SERVICE)
            .ok_or_else(|| ServiceError::missing(params::SERVICE))?;
        Ok(ServiceRequest::new(
            service,
            parameters.get(params::VERSION).map(str::to_string),
            operation_names::GET_CAPABILITIES,
        )
        .with_accept_versions(parameters.get_list(params::ACCEPT_VERSIONS)))
    }
}

/// `<sos:GetCapabilities service="SOS">` with optional `ows:AcceptVersions`.
pub struct CapabilitiesXmlDecoder {
    service: String,
}

impl Codec for CapabilitiesXmlDecoder {
    fn keys(&self) -> Vec<CodecKey> {
        vec![
            CodecKey::element(NS_SOS_20, operation_names::GET_CAPABILITIES),
            CodecKey::operation(
                Encoding::Xml,
                OperationKey::any_version(self.service.as_str(), operation_names::GET_CAPABILITIES),
            ),
        ]
    }

    fn name(&self) -> &str {
        "GetCapabilities (XML)"
    }
}

impl Decoder for CapabilitiesXmlDecoder {
    fn decode(&self, input: DecoderInput<'_>) -> Result<ServiceRequest, ServiceError> {
        let DecoderInput::Xml(doc) = input else {
            return Err(ServiceError::decode("expected an XML document"));
        };
        let service = doc
            .attribute(params::SERVICE)
            .ok_or_else(|| ServiceError::missing(params::SERVICE))?;
        Ok(ServiceRequest::new(
            service,
            doc.attribute(params::VERSION).map(str::to_string),
            operation_names::GET_CAPABILITIES,
        )
        .with_accept_versions(accept_versions(doc)?))
    }
}

/// Text of every `ows:AcceptVersions/ows:Version`, in document order.
fn accept_versions(doc: &XmlDocument) -> Result<Vec<String>, ServiceError> {
    let mut reader = NsReader::from_str(doc.as_str());
    let mut in_accept = false;
    let mut in_version = false;
    let mut out = Vec::new();
    loop {
        let (resolved, event) = reader
            .read_resolved_event()
            .map_err(|e| ServiceError::from(XmlError::Malformed(e.to_string())))?;
        let ows = matches!(resolved, ResolveResult::Bound(ns) if ns.0 == NS_OWS.as_bytes());
        match event {
            Event::Start(e) if ows && e.local_name().as_ref() == b"AcceptVersions" => {
                in_accept = true;
            }
            Event::End(e) if ows && e.local_name().as_ref() == b"AcceptVersions" => {
                in_accept = false;
            }
            Event::Start(e) if in_accept && ows && e.local_name().as_ref() == b"Version" => {
                in_version = true;
            }
            Event::End(e) if ows && e.local_name().as_ref() == b"Version" => in_version = false,
            Event::Text(text) if in_version => {
                let version = text
                    .unescape()
                    .map_err(|e| ServiceError::from(XmlError::Malformed(e.to_string())))?;
                let version = version.trim();
                if !version.is_empty() {
                    out.push(version.to_string());
                }
            }
            Event::Eof => return Ok(out),
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Renders a [`Capabilities`] payload as `sos:Capabilities`.
pub struct CapabilitiesEncoder {
    service_url: String,
}

impl CapabilitiesEncoder {
    fn href(&self, binding: &str) -> String {
        format!("{}/{binding}", self.service_url.trim_end_matches('/'))
    }

    fn render(&self, capabilities: &Capabilities) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        emit(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        let mut root = BytesStart::new("sos:Capabilities");
        root.push_attribute(("xmlns:sos", NS_SOS_20));
        root.push_attribute(("xmlns:ows", NS_OWS));
        root.push_attribute(("xmlns:xlink", NS_XLINK));
        root.push_attribute(("version", capabilities.version.as_str()));
        emit(&mut writer, Event::Start(root))?;

        emit(
            &mut writer,
            Event::Start(BytesStart::new("ows:ServiceIdentification")),
        )?;
        text_element(
            &mut writer,
            "ows:ServiceType",
            &format!("OGC:{}", capabilities.service),
        )?;
        for version in &capabilities.versions {
            text_element(&mut writer, "ows:ServiceTypeVersion", version)?;
        }
        emit(
            &mut writer,
            Event::End(BytesEnd::new("ows:ServiceIdentification")),
        )?;

        emit(
            &mut writer,
            Event::Start(BytesStart::new("ows:OperationsMetadata")),
        )?;
        for operation in &capabilities.operations {
            let mut start = BytesStart::new("ows:Operation");
            start.push_attribute(("name", operation.name.as_str()));
            emit(&mut writer, Event::Start(start))?;
            emit(&mut writer, Event::Start(BytesStart::new("ows:DCP")))?;
            emit(&mut writer, Event::Start(BytesStart::new("ows:HTTP")))?;
            for binding in &operation.get {
                let href = format!("{}?", self.href(binding));
                link(&mut writer, "ows:Get", &href)?;
            }
            for binding in &operation.post {
                link(&mut writer, "ows:Post", &self.href(binding))?;
            }
            emit(&mut writer, Event::End(BytesEnd::new("ows:HTTP")))?;
            emit(&mut writer, Event::End(BytesEnd::new("ows:DCP")))?;
            emit(&mut writer, Event::End(BytesEnd::new("ows:Operation")))?;
        }
        emit(
            &mut writer,
            Event::End(BytesEnd::new("ows:OperationsMetadata")),
        )?;

        emit(&mut writer, Event::End(BytesEnd::new("sos:Capabilities")))?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| XmlError::Write(e.to_string()))
    }
}

fn text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    text: &str,
) -> Result<(), XmlError> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn link<W: std::io::Write>(writer: &mut Writer<W>, name: &str, href: &str) -> Result<(), XmlError> {
    let mut start = BytesStart::new(name);
    start.push_attribute(("xlink:href", href));
    emit(writer, Event::Empty(start))
}

impl Codec for CapabilitiesEncoder {
    fn keys(&self) -> Vec<CodecKey> {
        vec![CodecKey::xml_type(NS_SOS_20, &CAPABILITIES_RESPONSE)]
    }

    fn name(&self) -> &str {
        "Capabilities (XML)"
    }
}

impl Encoder for CapabilitiesEncoder {
    fn encode(&self, response: &ServiceResponse) -> Result<EncodedResponse, ServiceError> {
        let capabilities: Capabilities = serde_json::from_value(response.payload.clone())
            .map_err(|e| ServiceError::EncodingFailed {
                message: format!("not a capabilities payload: {e}"),
            })?;
        let body = self
            .render(&capabilities)
            .map_err(|e| ServiceError::EncodingFailed {
                message: e.to_string(),
            })?;
        Ok(EncodedResponse::xml(body))
    }
}

// ---------------------------------------------------------------------------
// Installation
// ---------------------------------------------------------------------------

/// Registers the capabilities decoders and encoder for `service`.
///
/// # Errors
///
/// Returns [`ConfigurationError::DuplicateCodecKey`] if another codec
/// already claims one of their exact keys.
pub fn install_codecs(
    codecs: &CodingRepository,
    service: &str,
    service_url: &str,
) -> Result<(), ConfigurationError> {
    codecs.register_decoder(Arc::new(CapabilitiesKvpDecoder {
        service: service.to_string(),
    }))?;
    codecs.register_decoder(Arc::new(CapabilitiesXmlDecoder {
        service: service.to_string(),
    }))?;
    codecs.register_encoder(Arc::new(CapabilitiesEncoder {
        service_url: service_url.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
