//! Operator keys and the request operator contract.

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use sos_core::{ServiceError, ServiceRequest, ServiceResponse};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// `(service, version)` pair a service operator is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceOperatorKey {
    pub service: String,
    pub version: String,
}

impl ServiceOperatorKey {
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ServiceOperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.version)
    }
}

/// `(service, version, operation)` triple a request operator is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestOperatorKey {
    pub service_operator: ServiceOperatorKey,
    pub operation: String,
}

impl RequestOperatorKey {
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        version: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            service_operator: ServiceOperatorKey::new(service, version),
            operation: operation.into(),
        }
    }
}

impl fmt::Display for RequestOperatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_operator, self.operation)
    }
}

/// Orders dotted version strings numerically (`1.10.0` > `1.9.0`); parts
/// that are not numbers compare as text.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RequestOperator
// ---------------------------------------------------------------------------

/// Executes one operation of one service version.
///
/// Operators see only decoded requests; failures they return travel back
/// to the binding unchanged.
#[async_trait]
pub trait RequestOperator: Send + Sync + 'static {
    fn key(&self) -> RequestOperatorKey;

    /// # Errors
    ///
    /// Any [`ServiceError`]; the binding turns it into a fault.
    async fn receive_request(&self, request: ServiceRequest)
        -> Result<ServiceResponse, ServiceError>;
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn keys_compare_by_value() {
        assert_eq!(
            RequestOperatorKey::new("SOS", "2.0.0", "GetCapabilities"),
            RequestOperatorKey::new("SOS".to_string(), "2.0.0", "GetCapabilities".to_string())
        );
        assert_ne!(
            ServiceOperatorKey::new("SOS", "2.0.0"),
            ServiceOperatorKey::new("SOS", "1.0.0")
        );
    }

    #[test]
    fn keys_display_as_paths() {
        let key = RequestOperatorKey::new("SOS", "2.0.0", "DescribeSensor");
        assert_eq!(key.to_string(), "SOS/2.0.0/DescribeSensor");
    }

    #[test]
    fn versions_compare_numerically() {
        assert_eq!(compare_versions("2.0.0", "1.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "2.0.0"), Ordering::Equal);
    }

    proptest! {
        #[test]
        fn version_order_is_antisymmetric(
            a in proptest::collection::vec(0u64..100, 1..4),
            b in proptest::collection::vec(0u64..100, 1..4),
        ) {
            let a = a.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
            let b = b.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
            prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
        }

        #[test]
        fn version_order_matches_numeric_parts(
            a in proptest::collection::vec(0u64..1000, 3),
            b in proptest::collection::vec(0u64..1000, 3),
        ) {
            let text = |v: &[u64]| v.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
            prop_assert_eq!(compare_versions(&text(&a), &text(&b)), a.cmp(&b));
        }
    }
}
