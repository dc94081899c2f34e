use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sos_core::{ConfigurationError, ServiceError, ServiceRequest, ServiceResponse};

use super::operation::{compare_versions, RequestOperator, RequestOperatorKey, ServiceOperatorKey};

// ---------------------------------------------------------------------------
// ServiceOperator
// ---------------------------------------------------------------------------

/// All request operators of one `(service, version)` pair.
pub struct ServiceOperator {
    key: ServiceOperatorKey,
    operators: BTreeMap<String, Arc<dyn RequestOperator>>,
}

impl ServiceOperator {
    fn new(key: ServiceOperatorKey) -> Self {
        Self {
            key,
            operators: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &ServiceOperatorKey {
        &self.key
    }

    /// Operation names, sorted.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(String::as_str)
    }

    #[must_use]
    pub fn request_operator(&self, operation: &str) -> Option<Arc<dyn RequestOperator>> {
        self.operators.get(operation).cloned()
    }

    /// Hands `request` to the operator registered for its operation.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::OperationNotSupported`] if this service
    /// version has no such operation; otherwise whatever the operator returns.
    pub async fn receive_request(
        &self,
        request: ServiceRequest,
    ) -> Result<ServiceResponse, ServiceError> {
        match self.operators.get(&request.operation) {
            Some(operator) => operator.receive_request(request).await,
            None => Err(ServiceError::OperationNotSupported {
                operation: request.operation,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// OperatorRegistry
// ---------------------------------------------------------------------------

/// Operators indexed by service and version.
///
/// Filled once while the process is assembled and read-only afterwards; it
/// is shared behind an `Arc` by the router.
#[derive(Default)]
pub struct OperatorRegistry {
    service_operators: HashMap<ServiceOperatorKey, ServiceOperator>,
    /// Supported versions per service, highest first.
    versions: HashMap<String, Vec<String>>,
    /// Registration order, for listings.
    order: Vec<RequestOperatorKey>,
}

impl OperatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `operator` under its own key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateOperator`] if the key is taken.
    pub fn register(&mut self, operator: Arc<dyn RequestOperator>) -> Result<(), ConfigurationError> {
        let key = operator.key();
        let service_operator = self
            .service_operators
            .entry(key.service_operator.clone())
            .or_insert_with(|| ServiceOperator::new(key.service_operator.clone()));
        if service_operator.operators.contains_key(&key.operation) {
            return Err(ConfigurationError::DuplicateOperator {
                key: key.to_string(),
            });
        }
        service_operator
            .operators
            .insert(key.operation.clone(), operator);

        let versions = self
            .versions
            .entry(key.service_operator.service.clone())
            .or_default();
        if !versions.contains(&key.service_operator.version) {
            versions.push(key.service_operator.version.clone());
            versions.sort_by(|a, b| compare_versions(b, a));
        }
        self.order.push(key);
        Ok(())
    }

    #[must_use]
    pub fn get_service_operator(&self, service: &str, version: &str) -> Option<&ServiceOperator> {
        self.service_operators
            .get(&ServiceOperatorKey::new(service, version))
    }

    #[must_use]
    pub fn is_service_supported(&self, service: &str) -> bool {
        self.versions.contains_key(service)
    }

    #[must_use]
    pub fn is_version_supported(&self, service: &str, version: &str) -> bool {
        self.versions
            .get(service)
            .is_some_and(|versions| versions.iter().any(|v| v == version))
    }

    /// Versions of `service`, highest first.
    #[must_use]
    pub fn supported_versions(&self, service: &str) -> &[String] {
        self.versions
            .get(service)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Keys of all request operators, in registration order.
    #[must_use]
    pub fn request_operator_keys(&self) -> &[RequestOperatorKey] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoOperator;

    fn registry() -> OperatorRegistry {
        let mut registry = OperatorRegistry::new();
        registry
            .register(EchoOperator::arc("SOS", "1.0.0", "GetCapabilities"))
            .unwrap();
        registry
            .register(EchoOperator::arc("SOS", "2.0.0", "GetCapabilities"))
            .unwrap();
        registry
            .register(EchoOperator::arc("SOS", "2.0.0", "DescribeSensor"))
            .unwrap();
        registry
    }

    #[test]
    fn service_operator_lists_its_operations() {
        let registry = registry();
        let operator = registry.get_service_operator("SOS", "2.0.0").unwrap();
        assert_eq!(operator.key(), &ServiceOperatorKey::new("SOS", "2.0.0"));
        assert_eq!(
            operator.operations().collect::<Vec<_>>(),
            vec!["DescribeSensor", "GetCapabilities"]
        );
        assert!(registry.get_service_operator("SOS", "3.0.0").is_none());
        assert!(registry.get_service_operator("WFS", "2.0.0").is_none());
    }

    #[test]
    fn versions_are_tracked_per_service() {
        let registry = registry();
        assert!(registry.is_service_supported("SOS"));
        assert!(!registry.is_service_supported("sos"));
        assert!(registry.is_version_supported("SOS", "1.0.0"));
        assert!(!registry.is_version_supported("SOS", "1.1.0"));
        assert_eq!(registry.supported_versions("SOS"), ["2.0.0", "1.0.0"]);
        assert!(registry.supported_versions("WPS").is_empty());
    }

    #[test]
    fn duplicate_operator_is_rejected() {
        let mut registry = registry();
        let err = registry
            .register(EchoOperator::arc("SOS", "2.0.0", "DescribeSensor"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateOperator { key } if key == "SOS/2.0.0/DescribeSensor"));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn unknown_operation_is_not_supported() {
        let registry = registry();
        let operator = registry.get_service_operator("SOS", "1.0.0").unwrap();
        let err = operator
            .receive_request(ServiceRequest::new(
                "SOS",
                Some("1.0.0".into()),
                "DescribeSensor",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::OperationNotSupported { operation } if operation == "DescribeSensor"));
    }
}
