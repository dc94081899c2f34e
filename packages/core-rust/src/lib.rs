//! SOS core: codec keys and similarity resolution, the codec registry,
//! canonical request/response types, and the OWS exception model.
//!
//! Nothing here knows about HTTP; bindings and routing live in the server
//! crate.

pub mod codec;
pub mod error;
pub mod ows;
pub mod request;
pub mod tag;
pub mod xml;

pub use codec::{
    Codec, CodecKey, CodecRegistry, CodingRepository, Decoder, DecoderInput, Encoder, Encoding,
    OperationKey, TieBreak,
};
pub use error::{ConfigurationError, NoCodecFound, ServiceError};
pub use ows::{CodedException, ExceptionCode, ExceptionReport};
pub use request::{EncodedResponse, ParameterMap, ServiceRequest, ServiceResponse};
pub use tag::TypeTag;
pub use xml::{XmlDocument, XmlError};
