//! Decoders and encoders side by side.

use std::sync::Arc;

use super::key::{CodecKey, Encoding, OperationKey};
use super::registry::{CodecRegistry, CodecSource, TieBreak};
use super::{Decoder, Encoder};
use crate::error::{ConfigurationError, NoCodecFound};

/// The two codec registries a binding needs.
pub struct CodingRepository {
    decoders: CodecRegistry<dyn Decoder>,
    encoders: CodecRegistry<dyn Encoder>,
}

impl CodingRepository {
    #[must_use]
    pub fn new(tie_break: TieBreak) -> Self {
        Self {
            decoders: CodecRegistry::new("decoder", tie_break),
            encoders: CodecRegistry::new("encoder", tie_break),
        }
    }

    /// Repository fed by discovery sources, consulted immediately and on
    /// every [`reload`](Self::reload).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if either source fails or yields
    /// duplicate exact keys.
    pub fn from_sources(
        tie_break: TieBreak,
        decoders: CodecSource<dyn Decoder>,
        encoders: CodecSource<dyn Encoder>,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            decoders: CodecRegistry::with_source("decoder", tie_break, decoders)?,
            encoders: CodecRegistry::with_source("encoder", tie_break, encoders)?,
        })
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateCodecKey`] on key collisions.
    pub fn register_decoder(&self, decoder: Arc<dyn Decoder>) -> Result<(), ConfigurationError> {
        self.decoders.register(decoder)
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateCodecKey`] on key collisions.
    pub fn register_encoder(&self, encoder: Arc<dyn Encoder>) -> Result<(), ConfigurationError> {
        self.encoders.register(encoder)
    }

    /// # Errors
    ///
    /// Returns [`NoCodecFound`] if no decoder is compatible with `key`.
    pub fn resolve_decoder(&self, key: &CodecKey) -> Result<Arc<dyn Decoder>, NoCodecFound> {
        self.decoders.resolve(key).map(|r| r.codec)
    }

    /// # Errors
    ///
    /// Returns [`NoCodecFound`] if no encoder is compatible with `key`.
    pub fn resolve_encoder(&self, key: &CodecKey) -> Result<Arc<dyn Encoder>, NoCodecFound> {
        self.encoders.resolve(key).map(|r| r.codec)
    }

    /// Reloads decoders, then encoders. Each swap is atomic on its own.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`]; a registry that failed to
    /// reload keeps its previous snapshot.
    pub fn reload(&self) -> Result<(), ConfigurationError> {
        self.decoders.reload()?;
        self.encoders.reload()
    }

    /// Whether some decoder accepts `operation` on `encoding`.
    #[must_use]
    pub fn supports(&self, encoding: Encoding, operation: &OperationKey) -> bool {
        self.decoders
            .contains(&CodecKey::operation(encoding, operation.clone()))
    }

    /// Fully populated operation keys declared by decoders on `encoding`.
    #[must_use]
    pub fn decoder_operations(&self, encoding: Encoding) -> Vec<OperationKey> {
        let snapshot = self.decoders.snapshot();
        let mut out: Vec<OperationKey> = snapshot
            .keys()
            .filter_map(|key| match key {
                CodecKey::Operation { encoding: e, key }
                    if *e == encoding && key.operation.is_some() =>
                {
                    Some(key.clone())
                }
                _ => None,
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    #[must_use]
    pub fn decoders(&self) -> &CodecRegistry<dyn Decoder> {
        &self.decoders
    }

    #[must_use]
    pub fn encoders(&self) -> &CodecRegistry<dyn Encoder> {
        &self.encoders
    }
}

impl Default for CodingRepository {
    fn default() -> Self {
        Self::new(TieBreak::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Codec, DecoderInput};
    use crate::error::ServiceError;
    use crate::request::{EncodedResponse, ServiceRequest, ServiceResponse, SERVICE_RESPONSE};
    use crate::tag::TypeTag;

    static CAPABILITIES: TypeTag = TypeTag::new("Capabilities", &[&SERVICE_RESPONSE]);

    struct KvpCaps;

    impl Codec for KvpCaps {
        fn keys(&self) -> Vec<CodecKey> {
            vec![CodecKey::kvp("SOS", "2.0.0", "GetCapabilities")]
        }
    }

    impl Decoder for KvpCaps {
        fn decode(&self, _input: DecoderInput<'_>) -> Result<ServiceRequest, ServiceError> {
            Ok(ServiceRequest::new("SOS", None, "GetCapabilities"))
        }
    }

    struct AnyResponse;

    impl Codec for AnyResponse {
        fn keys(&self) -> Vec<CodecKey> {
            vec![CodecKey::xml_type("urn:sos", &SERVICE_RESPONSE)]
        }
    }

    impl Encoder for AnyResponse {
        fn encode(&self, _response: &ServiceResponse) -> Result<EncodedResponse, ServiceError> {
            Ok(EncodedResponse::xml("<ok/>"))
        }
    }

    #[test]
    fn resolves_both_roles() {
        let repo = CodingRepository::default();
        repo.register_decoder(Arc::new(KvpCaps)).unwrap();
        repo.register_encoder(Arc::new(AnyResponse)).unwrap();

        assert!(repo
            .resolve_decoder(&CodecKey::kvp("SOS", "2.0.0", "GetCapabilities"))
            .is_ok());
        assert!(repo
            .resolve_encoder(&CodecKey::xml_type("urn:sos", &CAPABILITIES))
            .is_ok());
        assert!(repo
            .resolve_encoder(&CodecKey::xml_type("urn:other", &CAPABILITIES))
            .is_err());
    }

    #[test]
    fn supports_checks_the_encoding() {
        let repo = CodingRepository::default();
        repo.register_decoder(Arc::new(KvpCaps)).unwrap();
        let op = OperationKey::new("SOS", "2.0.0", "GetCapabilities");
        assert!(repo.supports(Encoding::Kvp, &op));
        assert!(!repo.supports(Encoding::Xml, &op));
        assert_eq!(repo.decoder_operations(Encoding::Kvp), vec![op]);
    }

    #[test]
    fn default_codec_name_is_the_type_name() {
        let decoder: Arc<dyn Decoder> = Arc::new(KvpCaps);
        assert!(decoder.name().ends_with("KvpCaps"));
    }
}
