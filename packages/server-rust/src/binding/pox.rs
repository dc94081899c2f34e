//! Plain-old-XML binding: the request document is the POST body.

use async_trait::async_trait;
use sos_core::request::params;
use sos_core::{
    CodingRepository, EncodedResponse, Encoding, OperationKey, ServiceError, XmlDocument,
};

use super::{Binding, BindingContext, TransportRequest, TransportResponse};

const NAME: &str = "POX";

/// Serves POST requests carrying a bare XML request document.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoxBinding;

impl PoxBinding {
    async fn process(ctx: &BindingContext, doc: &XmlDocument) -> Result<EncodedResponse, ServiceError> {
        let request = ctx.decode_xml(doc)?;
        ctx.execute(request).await
    }
}

#[async_trait]
impl Binding for PoxBinding {
    fn name(&self) -> &'static str {
        NAME
    }

    fn url_pattern(&self) -> &'static str {
        "pox"
    }

    async fn handle_post(&self, ctx: &BindingContext, request: TransportRequest) -> TransportResponse {
        let doc = match XmlDocument::parse_bytes(&request.body) {
            Ok(doc) => doc,
            Err(e) => return ctx.exception_response(NAME, &e.into(), None),
        };
        match Self::process(ctx, &doc).await {
            Ok(encoded) => TransportResponse::from_encoded(encoded),
            Err(e) => ctx.exception_response(NAME, &e, doc.attribute(params::VERSION)),
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
    use http::StatusCode;
    use sos_core::CodecKey;

    use super::*;
    use crate::testing::{binding_context, EchoOperator, StaticDecoder, TEST_NS};

    fn context() -> BindingContext {
        binding_context(
            vec![
                StaticDecoder::arc(
                    vec![CodecKey::element(TEST_NS, "GetObservation")],
                    "2.0.0",
                    "GetObservation",
                ),
                StaticDecoder::arc(
                    vec![CodecKey::element(TEST_NS, "GetFeatureOfInterest")],
                    "3.0.0",
                    "GetFeatureOfInterest",
                ),
            ],
            vec![EchoOperator::arc("SOS", "2.0.0", "GetObservation")],
        )
    }

    async fn post(body: &str) -> TransportResponse {
        PoxBinding
            .handle_post(
                &context(),
                TransportRequest::post("application/xml", body.to_string()),
            )
            .await
    }

    #[tokio::test]
    async fn root_element_routes_request() {
        let response = post(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<sos:GetObservation xmlns:sos="{TEST_NS}" service="SOS" version="2.0.0"/>"#
        ))
        .await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body_text().contains(r#"operation="GetObservation""#));
    }

    #[tokio::test]
    async fn unknown_root_is_a_client_fault() {
        let response = post(r#"<GetWeather xmlns="urn:example:weather"/>"#).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let body = response.body_text();
        assert!(body.contains("ows:ExceptionReport"));
        assert!(body.contains(r#"exceptionCode="InvalidRequest""#));
        assert!(body.contains("GetWeather"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_client_fault() {
        let response = post("<sos:GetObservation").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body_text().contains("ows:ExceptionReport"));

        let response = post("").await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn root_attributes_are_checked_before_decoding() {
        let response = post(&format!(
            r#"<GetObservation xmlns="{TEST_NS}" service="WFS" version="2.0.0"/>"#
        ))
        .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body_text().contains(r#"locator="service""#));
    }

    #[tokio::test]
    async fn decoded_version_is_validated() {
        // The decoder reports version 3.0.0, which no operator serves.
        let response = post(&format!(r#"<GetFeatureOfInterest xmlns="{TEST_NS}"/>"#)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let body = response.body_text();
        assert!(body.contains(r#"locator="version""#));
        assert!(body.contains("3.0.0"));
    }

    #[tokio::test]
    async fn get_is_not_supported() {
        let response = PoxBinding
            .handle_get(&context(), TransportRequest::get("request=GetCapabilities"))
            .await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.body_text().contains("HTTP GET is not supported"));
    }
}
