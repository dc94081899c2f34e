//! Canonical request and response objects exchanged between bindings,
//! decoders, operators and encoders.
//!
//! Routing only ever looks at `service`, `version` and `operation`; the
//! operation-specific content travels as an opaque JSON payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::key::CodecKey;
use crate::tag::TypeTag;

/// Default service name.
pub const SOS: &str = "SOS";

/// Protocol versions the built-in components know about.
pub mod versions {
    pub const V1_0_0: &str = "1.0.0";
    pub const V2_0_0: &str = "2.0.0";
}

/// Operation names with special handling in the dispatch core.
pub mod operation_names {
    pub const GET_CAPABILITIES: &str = "GetCapabilities";
}

/// Well-known KVP parameter names (lowercase).
pub mod params {
    pub const SERVICE: &str = "service";
    pub const VERSION: &str = "version";
    pub const REQUEST: &str = "request";
    pub const ACCEPT_VERSIONS: &str = "acceptversions";
}

/// Root of every response type; encoders declared for it accept anything.
pub static SERVICE_RESPONSE: TypeTag = TypeTag::root("ServiceResponse");

// ---------------------------------------------------------------------------
// ParameterMap
// ---------------------------------------------------------------------------

/// Query parameters with case-insensitive names.
///
/// Names are stored lowercased; the first occurrence of a repeated
/// parameter wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap {
    entries: BTreeMap<String, String>,
}

impl ParameterMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` query string.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut map = Self::new();
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            map.insert(&name, value.into_owned());
        }
        map
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.into());
    }

    /// Overwrites `name`, unlike [`insert`](Self::insert).
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Value of `name`, ignoring case. Empty values count as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Comma-separated list value, trimmed, empty items dropped.
    #[must_use]
    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// ServiceRequest
// ---------------------------------------------------------------------------

/// A decoded request.
///
/// `version` may be unset only for the capabilities operation, where it is
/// filled in by version negotiation before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub service: String,
    pub version: Option<String>,
    pub operation: String,
    /// Versions offered by the client, preferred first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept_versions: Vec<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ServiceRequest {
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        version: Option<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            version,
            operation: operation.into(),
            accept_versions: Vec::new(),
            payload: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_accept_versions(mut self, versions: Vec<String>) -> Self {
        self.accept_versions = versions;
        self
    }

    #[must_use]
    pub fn is_capabilities(&self) -> bool {
        self.operation == operation_names::GET_CAPABILITIES
    }
}

// ---------------------------------------------------------------------------
// ServiceResponse / EncodedResponse
// ---------------------------------------------------------------------------

/// What an operator returns; an encoder turns it into bytes.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub service: String,
    pub version: String,
    pub operation: String,
    /// Namespace the response is rendered in.
    pub namespace: String,
    /// Declared type, matched against encoder type keys.
    pub response_type: &'static TypeTag,
    /// Content type the client asked for.
    pub content_type: String,
    pub payload: serde_json::Value,
    /// Pre-set HTTP status; `None` means 200.
    pub status: Option<u16>,
}

impl ServiceResponse {
    /// Key used to look up an encoder for this response.
    #[must_use]
    pub fn encoder_key(&self) -> CodecKey {
        CodecKey::xml_type(self.namespace.clone(), self.response_type)
    }
}

/// Encoded response body ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResponse {
    pub content_type: String,
    pub body: Vec<u8>,
    pub status: Option<u16>,
}

impl EncodedResponse {
    #[must_use]
    pub fn xml(body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: crate::xml::CONTENT_TYPE_XML.to_string(),
            body: body.into(),
            status: None,
        }
    }

    /// Whether the body is XML and may therefore be embedded in a SOAP body.
    #[must_use]
    pub fn is_xml(&self) -> bool {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence == "text/xml" || essence == "application/xml" || essence.ends_with("+xml")
    }
}
