//! Explicit type tags with declared supertypes.
//!
//! A [`TypeTag`] names a kind of value (a response type, an event type) and
//! lists the tags it specializes. Tags are declared as `static` items so
//! that a whole hierarchy is known at compile time and comparisons are by
//! name. Distances in the declared graph drive encoder resolution and event
//! listener matching.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A named type in an explicitly declared hierarchy.
///
/// Multiple supertypes are allowed, so a tag may sit below both a "class"
/// and any number of "capability" tags.
///
/// ```
/// use sos_core::tag::TypeTag;
///
/// static ROOT: TypeTag = TypeTag::root("Root");
/// static CHILD: TypeTag = TypeTag::new("Child", &[&ROOT]);
///
/// assert_eq!(CHILD.distance_to(&ROOT), Some(1));
/// assert_eq!(ROOT.distance_to(&CHILD), None);
/// ```
pub struct TypeTag {
    name: &'static str,
    supertypes: &'static [&'static TypeTag],
}

impl TypeTag {
    /// Declares a tag with no supertypes.
    #[must_use]
    pub const fn root(name: &'static str) -> Self {
        Self {
            name,
            supertypes: &[],
        }
    }

    /// Declares a tag that specializes each of `supertypes`.
    #[must_use]
    pub const fn new(name: &'static str, supertypes: &'static [&'static TypeTag]) -> Self {
        Self { name, supertypes }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn supertypes(&self) -> &'static [&'static TypeTag] {
        self.supertypes
    }

    /// Number of hops from `self` up to `ancestor`, or `None` when
    /// `ancestor` is not reachable through declared supertypes.
    ///
    /// A tag is at distance 0 from itself. With several paths the shortest
    /// one counts.
    #[must_use]
    pub fn distance_to(&self, ancestor: &TypeTag) -> Option<u32> {
        if self == ancestor {
            return Some(0);
        }
        let mut seen: HashSet<&'static str> = HashSet::new();
        let mut queue: VecDeque<(&'static TypeTag, u32)> =
            self.supertypes.iter().map(|t| (*t, 1)).collect();

        while let Some((tag, depth)) = queue.pop_front() {
            if tag == ancestor {
                return Some(depth);
            }
            if seen.insert(tag.name) {
                queue.extend(tag.supertypes.iter().map(|t| (*t, depth + 1)));
            }
        }
        None
    }

    /// Whether `self` is `other` or one of its declared descendants.
    #[must_use]
    pub fn is_a(&self, other: &TypeTag) -> bool {
        self.distance_to(other).is_some()
    }

    /// `self` followed by all of its ancestors, nearest first, each once.
    #[must_use]
    pub fn lineage(&'static self) -> Vec<&'static TypeTag> {
        let mut out = vec![self];
        let mut seen: HashSet<&'static str> = HashSet::from([self.name]);
        let mut cursor = 0;
        while let Some(tag) = out.get(cursor).copied() {
            for parent in tag.supertypes {
                if seen.insert(parent.name) {
                    out.push(parent);
                }
            }
            cursor += 1;
        }
        out
    }

    /// Like [`lineage`](Self::lineage) but keeps only tags that are
    /// themselves below `root`, so unrelated capability tags drop out.
    #[must_use]
    pub fn lineage_within(&'static self, root: &TypeTag) -> Vec<&'static TypeTag> {
        self.lineage()
            .into_iter()
            .filter(|tag| tag.is_a(root))
            .collect()
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeTag").field(&self.name).finish()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
