//! Pluggable decoders and encoders, and where they are registered.

pub mod key;
pub mod registry;
pub mod repository;

use crate::error::ServiceError;
use crate::request::{EncodedResponse, ParameterMap, ServiceRequest, ServiceResponse};
use crate::xml::XmlDocument;

pub use key::{CodecKey, Encoding, NamespaceKey, OperationKey, XmlTypeKey};
pub use registry::{CodecRegistry, CodecSource, Resolved, TieBreak};
pub use repository::CodingRepository;

/// Anything registered under codec keys.
pub trait Codec: Send + Sync + 'static {
    /// Keys this codec handles. Must be stable for the codec's lifetime.
    fn keys(&self) -> Vec<CodecKey>;

    /// Name used in logs and configuration errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Transport content handed to a decoder.
#[derive(Debug, Clone, Copy)]
pub enum DecoderInput<'a> {
    Kvp(&'a ParameterMap),
    Xml(&'a XmlDocument),
}

/// Turns transport content into a [`ServiceRequest`].
pub trait Decoder: Codec {
    /// # Errors
    ///
    /// Returns a [`ServiceError`] describing what is wrong with the input;
    /// bindings report it to the client unchanged.
    fn decode(&self, input: DecoderInput<'_>) -> Result<ServiceRequest, ServiceError>;
}

/// Turns a [`ServiceResponse`] into bytes.
pub trait Encoder: Codec {
    /// # Errors
    ///
    /// Returns [`ServiceError::EncodingFailed`] or another error if the
    /// response cannot be rendered.
    fn encode(&self, response: &ServiceResponse) -> Result<EncodedResponse, ServiceError>;
}
