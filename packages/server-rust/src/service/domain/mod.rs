//! Operations the dispatch core provides itself.

pub mod capabilities;

pub use capabilities::{
    install_codecs, Capabilities, GetCapabilitiesOperator, OperationMetadata,
    CAPABILITIES_RESPONSE, NS_SOS_20,
};
