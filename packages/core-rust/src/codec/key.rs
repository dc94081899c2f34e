//! Codec keys and the similarity score used to pick the closest codec.
//!
//! Every decoder and encoder declares the keys it handles. A request is
//! described by a key of the same shape; resolution compares the requested
//! key against every declared key with [`CodecKey::similarity`], where
//! `Some(0)` is an exact fit, larger values are looser fits and `None` means
//! the codec cannot handle the request at all.

use std::collections::BTreeSet;
use std::fmt;

use crate::tag::TypeTag;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Wire shape a codec consumes or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Encoding {
    /// URL query parameters.
    Kvp,
    /// An XML document, bare or carried in a SOAP body.
    Xml,
}

impl Encoding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kvp => "kvp",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Attribute comparison
// ---------------------------------------------------------------------------

/// Distance contribution of one optional attribute.
///
/// Equal values (or both unset) cost nothing. A value missing on either
/// side costs one. Two different populated values are incompatible, so the
/// candidate is dropped. A key's similarity is the sum over its attributes,
/// which ranks a generic codec behind an exact one while keeping it eligible.
fn attribute_distance(candidate: Option<&str>, requested: Option<&str>) -> Option<u32> {
    match (candidate, requested) {
        (Some(a), Some(b)) if a == b => Some(0),
        (Some(_), Some(_)) => None,
        (None, None) => Some(0),
        _ => Some(1),
    }
}

/// Wildcard equality: an unset attribute on either side matches anything.
fn attribute_matches(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// OperationKey
// ---------------------------------------------------------------------------

/// `(service, version, operation)` triple; any part may be left unset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OperationKey {
    pub service: Option<String>,
    pub version: Option<String>,
    pub operation: Option<String>,
}

impl OperationKey {
    /// Fully populated key.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        version: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            service: Some(service.into()),
            version: Some(version.into()),
            operation: Some(operation.into()),
        }
    }

    /// Key for an operation of `service` regardless of version.
    #[must_use]
    pub fn any_version(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
            version: None,
            operation: Some(operation.into()),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Equality where unset parts are wildcards.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        attribute_matches(self.service.as_deref(), other.service.as_deref())
            && attribute_matches(self.version.as_deref(), other.version.as_deref())
            && attribute_matches(self.operation.as_deref(), other.operation.as_deref())
    }

    /// Sum of per-attribute distances, `None` if any attribute conflicts.
    #[must_use]
    pub fn similarity(&self, requested: &Self) -> Option<u32> {
        let service = attribute_distance(self.service.as_deref(), requested.service.as_deref())?;
        let version = attribute_distance(self.version.as_deref(), requested.version.as_deref())?;
        let operation =
            attribute_distance(self.operation.as_deref(), requested.operation.as_deref())?;
        Some(service + version + operation)
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.service.as_deref().unwrap_or("*"),
            self.version.as_deref().unwrap_or("*"),
            self.operation.as_deref().unwrap_or("*")
        )
    }
}

// ---------------------------------------------------------------------------
// NamespaceKey / XmlTypeKey
// ---------------------------------------------------------------------------

/// Root element of an XML document: namespace plus optional local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceKey {
    pub namespace: String,
    pub element: Option<String>,
}

impl NamespaceKey {
    #[must_use]
    pub fn similarity(&self, requested: &Self) -> Option<u32> {
        if self.namespace != requested.namespace {
            return None;
        }
        attribute_distance(self.element.as_deref(), requested.element.as_deref())
    }

    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.namespace == other.namespace
            && attribute_matches(self.element.as_deref(), other.element.as_deref())
    }
}

/// A value type inside a namespace, used to key encoders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XmlTypeKey {
    pub namespace: String,
    pub type_tag: &'static TypeTag,
}

impl XmlTypeKey {
    /// Hops from the requested type up to the declared one.
    #[must_use]
    pub fn similarity(&self, requested: &Self) -> Option<u32> {
        if self.namespace != requested.namespace {
            return None;
        }
        requested.type_tag.distance_to(self.type_tag)
    }
}

impl PartialOrd for XmlTypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XmlTypeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.namespace, self.type_tag.name()).cmp(&(&other.namespace, other.type_tag.name()))
    }
}

// ---------------------------------------------------------------------------
// CodecKey
// ---------------------------------------------------------------------------

/// Identifies what a codec handles, or what a request needs.
///
/// Keys are plain values: structural `Eq`/`Hash` serve exact lookups, while
/// [`matches`](Self::matches) and [`similarity`](Self::similarity) implement
/// wildcard equality and distance scoring.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CodecKey {
    /// Operation triple on a given encoding.
    Operation {
        encoding: Encoding,
        key: OperationKey,
    },
    /// XML root element.
    Namespace(NamespaceKey),
    /// Response type within a namespace.
    XmlType(XmlTypeKey),
    /// Several keys that must all be satisfied. Parts are kept sorted and
    /// deduplicated so equal sets compare and hash equal.
    Composite(BTreeSet<CodecKey>),
}

impl CodecKey {
    /// KVP operation key with every part populated.
    #[must_use]
    pub fn kvp(
        service: impl Into<String>,
        version: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Operation {
            encoding: Encoding::Kvp,
            key: OperationKey::new(service, version, operation),
        }
    }

    /// XML operation key with every part populated.
    #[must_use]
    pub fn xml_operation(
        service: impl Into<String>,
        version: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Operation {
            encoding: Encoding::Xml,
            key: OperationKey::new(service, version, operation),
        }
    }

    #[must_use]
    pub fn operation(encoding: Encoding, key: OperationKey) -> Self {
        Self::Operation { encoding, key }
    }

    /// Any root element within `namespace`.
    #[must_use]
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self::Namespace(NamespaceKey {
            namespace: namespace.into(),
            element: None,
        })
    }

    /// A specific root element.
    #[must_use]
    pub fn element(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::Namespace(NamespaceKey {
            namespace: namespace.into(),
            element: Some(local_name.into()),
        })
    }

    #[must_use]
    pub fn xml_type(namespace: impl Into<String>, type_tag: &'static TypeTag) -> Self {
        Self::XmlType(XmlTypeKey {
            namespace: namespace.into(),
            type_tag,
        })
    }

    /// Composite of `parts`. A single part collapses to itself.
    #[must_use]
    pub fn composite(parts: impl IntoIterator<Item = CodecKey>) -> Self {
        let mut set = BTreeSet::new();
        for part in parts {
            match part {
                Self::Composite(inner) => set.extend(inner),
                other => {
                    set.insert(other);
                }
            }
        }
        if set.len() == 1 {
            if let Some(only) = set.pop_first() {
                return only;
            }
        }
        Self::Composite(set)
    }

    /// Wildcard equality: unset attributes on either side match anything.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Operation { encoding: e1, key: k1 },
                Self::Operation { encoding: e2, key: k2 },
            ) => e1 == e2 && k1.matches(k2),
            (Self::Namespace(a), Self::Namespace(b)) => a.matches(b),
            (Self::XmlType(a), Self::XmlType(b)) => a == b,
            (Self::Composite(a), Self::Composite(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.matches(y)))
            }
            _ => false,
        }
    }

    /// Distance from `requested` to this (declared) key.
    ///
    /// Keys of different kinds, or on different encodings, never match.
    #[must_use]
    pub fn similarity(&self, requested: &Self) -> Option<u32> {
        match (self, requested) {
            (
                Self::Operation { encoding: e1, key: k1 },
                Self::Operation { encoding: e2, key: k2 },
            ) if e1 == e2 => k1.similarity(k2),
            (Self::Namespace(a), Self::Namespace(b)) => a.similarity(b),
            (Self::XmlType(a), Self::XmlType(b)) => a.similarity(b),
            (Self::Composite(declared), Self::Composite(parts)) if declared.len() == parts.len() => {
                composite_distance(declared.iter(), parts)
            }
            _ => None,
        }
    }

    /// Distance from `requested` to the best of a codec's declared keys.
    ///
    /// A composite request is satisfied part by part: every part needs a
    /// compatible declared key and the score is the sum of the per-part
    /// minimums. A declared composite may also match the request as a whole.
    #[must_use]
    pub fn best_similarity(declared: &[CodecKey], requested: &CodecKey) -> Option<u32> {
        let whole = declared
            .iter()
            .filter_map(|key| key.similarity(requested))
            .min();
        match requested {
            Self::Composite(parts) => {
                let partwise = composite_distance(declared.iter(), parts);
                match (whole, partwise) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            }
            _ => whole,
        }
    }
}

fn composite_distance<'a>(
    declared: impl Iterator<Item = &'a CodecKey> + Clone,
    parts: &BTreeSet<CodecKey>,
) -> Option<u32> {
    parts.iter().try_fold(0u32, |total, part| {
        let best = declared
            .clone()
            .filter_map(|key| key.similarity(part))
            .min()?;
        Some(total + best)
    })
}

impl fmt::Display for CodecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation { encoding, key } => write!(f, "{encoding}[{key}]"),
            Self::Namespace(NamespaceKey { namespace, element }) => {
                write!(f, "xml-root[{namespace}]{}", element.as_deref().unwrap_or("*"))
            }
            Self::XmlType(XmlTypeKey {
                namespace,
                type_tag,
            }) => write!(f, "xml-type[{namespace}]{type_tag}"),
            Self::Composite(parts) => {
                f.write_str("composite(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{part}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static RESPONSE: TypeTag = TypeTag::root("Response");
    static OBSERVATION: TypeTag = TypeTag::new("Observation", &[&RESPONSE]);
    static MEASUREMENT: TypeTag = TypeTag::new("Measurement", &[&OBSERVATION]);

    const NS: &str = "http://www.opengis.net/sos/2.0";

    #[test]
    fn identical_operation_keys_have_zero_distance() {
        let key = CodecKey::kvp("SOS", "2.0.0", "GetCapabilities");
        assert_eq!(key.similarity(&key.clone()), Some(0));
    }

    #[test]
    fn unset_candidate_field_is_eligible_but_worse() {
        let generic = CodecKey::operation(
            Encoding::Kvp,
            OperationKey::any_version("SOS", "GetObservation"),
        );
        let requested = CodecKey::kvp("SOS", "2.0.0", "GetObservation");
        assert_eq!(generic.similarity(&requested), Some(1));
    }

    #[test]
    fn unset_requested_field_costs_one() {
        let declared = CodecKey::kvp("SOS", "2.0.0", "GetCapabilities");
        let requested = CodecKey::operation(
            Encoding::Kvp,
            OperationKey::any_version("SOS", "GetCapabilities"),
        );
        assert_eq!(declared.similarity(&requested), Some(1));
    }

    #[test]
    fn conflicting_field_is_incompatible() {
        let declared = CodecKey::kvp("SOS", "1.0.0", "GetObservation");
        let requested = CodecKey::kvp("SOS", "2.0.0", "GetObservation");
        assert_eq!(declared.similarity(&requested), None);
    }

    #[test]
    fn encodings_never_mix() {
        let kvp = CodecKey::kvp("SOS", "2.0.0", "GetCapabilities");
        let xml = CodecKey::xml_operation("SOS", "2.0.0", "GetCapabilities");
        assert_eq!(kvp.similarity(&xml), None);
        assert!(!kvp.matches(&xml));
    }

    #[test]
    fn namespace_only_key_matches_any_root_in_namespace() {
        let declared = CodecKey::namespace(NS);
        let requested = CodecKey::element(NS, "GetObservation");
        assert_eq!(declared.similarity(&requested), Some(1));
        assert!(declared.matches(&requested));
        assert_eq!(
            CodecKey::namespace("urn:other").similarity(&requested),
            None
        );
    }

    #[test]
    fn type_keys_use_hierarchy_distance() {
        let declared = CodecKey::xml_type(NS, &RESPONSE);
        assert_eq!(
            declared.similarity(&CodecKey::xml_type(NS, &MEASUREMENT)),
            Some(2)
        );
        assert_eq!(
            CodecKey::xml_type(NS, &MEASUREMENT).similarity(&CodecKey::xml_type(NS, &RESPONSE)),
            None
        );
    }

    #[test]
    fn different_kinds_are_incompatible() {
        let ns = CodecKey::namespace(NS);
        let op = CodecKey::kvp("SOS", "2.0.0", "GetCapabilities");
        assert_eq!(ns.similarity(&op), None);
    }

    #[test]
    fn wildcard_matching_ignores_unset_fields() {
        let generic = CodecKey::operation(
            Encoding::Xml,
            OperationKey {
                service: Some("SOS".into()),
                ..OperationKey::default()
            },
        );
        assert!(generic.matches(&CodecKey::xml_operation("SOS", "2.0.0", "DescribeSensor")));
        assert_ne!(generic, CodecKey::xml_operation("SOS", "2.0.0", "DescribeSensor"));
    }

    #[test]
    fn composite_collapses_and_normalizes() {
        let a = CodecKey::namespace(NS);
        let b = CodecKey::xml_type(NS, &OBSERVATION);
        assert_eq!(CodecKey::composite([a.clone()]), a);
        assert_eq!(
            CodecKey::composite([a.clone(), b.clone()]),
            CodecKey::composite([b, a.clone(), a])
        );
    }

    #[test]
    fn composite_request_needs_every_part() {
        let declared = [
            CodecKey::namespace(NS),
            CodecKey::xml_type(NS, &RESPONSE),
        ];
        let requested = CodecKey::composite([
            CodecKey::element(NS, "GetObservationResponse"),
            CodecKey::xml_type(NS, &MEASUREMENT),
        ]);
        assert_eq!(CodecKey::best_similarity(&declared, &requested), Some(3));

        let partial = [CodecKey::namespace(NS)];
        assert_eq!(CodecKey::best_similarity(&partial, &requested), None);
    }

    #[test]
    fn display_marks_wildcards() {
        let key = CodecKey::operation(Encoding::Kvp, OperationKey::any_version("SOS", "GetCapabilities"));
        assert_eq!(key.to_string(), "kvp[SOS/*/GetCapabilities]");
    }
}
