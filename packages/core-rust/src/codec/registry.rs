//! Codec registry with similarity-based resolution.
//!
//! The registry publishes an immutable [`Snapshot`] through an `ArcSwap`.
//! Readers load the current snapshot without locking and keep using it
//! for as long as they hold it; writers build a complete replacement under
//! a mutex and swap it in with a single store. A reader therefore sees
//! either the old codec set or the new one, never a mix.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::key::CodecKey;
use super::Codec;
use crate::error::{ConfigurationError, NoCodecFound};

/// Upper bound on memoized resolutions per snapshot.
const MEMO_CAPACITY: usize = 4096;

/// Supplies codecs at construction and on every reload.
pub type CodecSource<C> = Arc<dyn Fn() -> anyhow::Result<Vec<Arc<C>>> + Send + Sync>;

/// How equally close candidates are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// The codec registered first wins.
    #[default]
    RegistrationOrder,
    /// The codec registered last wins.
    LatestRegistration,
}

/// A resolved codec and how far it was from the requested key.
pub struct Resolved<C: ?Sized> {
    pub codec: Arc<C>,
    pub distance: u32,
}

impl<C: ?Sized> Clone for Resolved<C> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            distance: self.distance,
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for Resolved<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("distance", &self.distance)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

struct Entry<C: ?Sized> {
    codec: Arc<C>,
    keys: Vec<CodecKey>,
}

/// One immutable generation of registered codecs.
pub struct Snapshot<C: ?Sized> {
    kind: &'static str,
    generation: u64,
    tie_break: TieBreak,
    entries: Vec<Entry<C>>,
    exact: HashMap<CodecKey, usize>,
    /// Resolutions already computed against this generation, misses included.
    memo: DashMap<CodecKey, Option<(usize, u32)>>,
}

impl<C: ?Sized + Codec> Snapshot<C> {
    fn build(
        kind: &'static str,
        generation: u64,
        tie_break: TieBreak,
        codecs: &[Arc<C>],
    ) -> Result<Self, ConfigurationError> {
        let mut entries = Vec::with_capacity(codecs.len());
        let mut exact: HashMap<CodecKey, usize> = HashMap::new();

        for (idx, codec) in codecs.iter().enumerate() {
            let mut keys = codec.keys();
            keys.sort();
            keys.dedup();
            for key in &keys {
                if let Some(&existing) = exact.get(key) {
                    let existing: &Entry<C> = &entries[existing];
                    return Err(ConfigurationError::DuplicateCodecKey {
                        kind,
                        key: key.clone(),
                        existing: existing.codec.name().to_string(),
                        duplicate: codec.name().to_string(),
                    });
                }
                exact.insert(key.clone(), idx);
            }
            entries.push(Entry {
                codec: Arc::clone(codec),
                keys,
            });
        }

        Ok(Self {
            kind,
            generation,
            tie_break,
            entries,
            exact,
            memo: DashMap::new(),
        })
    }

    /// Finds the closest codec for `key`.
    ///
    /// An exact key match always wins with distance 0. Otherwise the codec
    /// with the smallest similarity wins, ties settled by the configured
    /// [`TieBreak`].
    ///
    /// # Errors
    ///
    /// Returns [`NoCodecFound`] when no codec is compatible with `key`.
    pub fn resolve(&self, key: &CodecKey) -> Result<Resolved<C>, NoCodecFound> {
        let found = if let Some(&idx) = self.exact.get(key) {
            Some((idx, 0))
        } else {
            // the shard guard must be released before inserting
            let memoized = self.memo.get(key).map(|hit| *hit);
            match memoized {
                Some(found) => found,
                None => {
                    let found = self.scan(key);
                    if self.memo.len() < MEMO_CAPACITY {
                        self.memo.insert(key.clone(), found);
                    }
                    found
                }
            }
        };

        found
            .and_then(|(idx, distance)| {
                self.entries.get(idx).map(|entry| Resolved {
                    codec: Arc::clone(&entry.codec),
                    distance,
                })
            })
            .ok_or_else(|| NoCodecFound {
                kind: self.kind,
                key: key.clone(),
            })
    }

    fn scan(&self, key: &CodecKey) -> Option<(usize, u32)> {
        let mut best: Option<(usize, u32)> = None;
        let mut tied = false;

        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(distance) = CodecKey::best_similarity(&entry.keys, key) else {
                continue;
            };
            match best {
                None => best = Some((idx, distance)),
                Some((_, current)) if distance < current => {
                    best = Some((idx, distance));
                    tied = false;
                }
                Some((_, current)) if distance == current => {
                    tied = true;
                    if self.tie_break == TieBreak::LatestRegistration {
                        best = Some((idx, distance));
                    }
                }
                Some(_) => {}
            }
        }

        if let Some((idx, distance)) = best {
            if let Some(entry) = self.entries.get(idx) {
                debug!(
                    kind = self.kind,
                    %key,
                    codec = entry.codec.name(),
                    distance,
                    tied,
                    "resolved codec by similarity"
                );
            }
        }
        best
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Codecs in registration order.
    pub fn codecs(&self) -> impl Iterator<Item = &Arc<C>> {
        self.entries.iter().map(|e| &e.codec)
    }

    /// Every declared key, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &CodecKey> {
        self.entries.iter().flat_map(|e| e.keys.iter())
    }
}

// ---------------------------------------------------------------------------
// CodecRegistry
// ---------------------------------------------------------------------------

/// Copy-on-write registry of one codec role (decoders or encoders).
pub struct CodecRegistry<C: ?Sized> {
    kind: &'static str,
    tie_break: TieBreak,
    current: ArcSwap<Snapshot<C>>,
    source: Option<CodecSource<C>>,
    /// Explicitly registered codecs; also serializes all writers.
    registered: Mutex<Vec<Arc<C>>>,
    generation: AtomicU64,
}

impl<C: ?Sized + Codec> CodecRegistry<C> {
    /// Empty registry; `kind` names the role in logs and errors.
    #[must_use]
    pub fn new(kind: &'static str, tie_break: TieBreak) -> Self {
        Self {
            kind,
            tie_break,
            current: ArcSwap::from_pointee(Snapshot {
                kind,
                generation: 0,
                tie_break,
                entries: Vec::new(),
                exact: HashMap::new(),
                memo: DashMap::new(),
            }),
            source: None,
            registered: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Registry fed by `source`, which is consulted immediately.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if discovery fails or yields
    /// duplicate exact keys.
    pub fn with_source(
        kind: &'static str,
        tie_break: TieBreak,
        source: CodecSource<C>,
    ) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new(kind, tie_break);
        registry.source = Some(source);
        registry.reload()?;
        Ok(registry)
    }

    /// Adds `codec` and publishes a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateCodecKey`] if `codec` declares
    /// a key another codec already declares; the registry is left unchanged.
    pub fn register(&self, codec: Arc<C>) -> Result<(), ConfigurationError> {
        let mut registered = self.registered.lock();
        let current = self.current.load();
        let mut codecs: Vec<Arc<C>> = current.codecs().cloned().collect();
        codecs.push(Arc::clone(&codec));
        self.publish(&codecs)?;
        registered.push(codec);
        Ok(())
    }

    /// Rebuilds the snapshot from explicit registrations plus a fresh
    /// discovery run, then swaps it in.
    ///
    /// In-flight resolutions finish against the snapshot they loaded.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if discovery fails or the new set
    /// has duplicate exact keys; the previous snapshot stays active.
    pub fn reload(&self) -> Result<(), ConfigurationError> {
        let registered = self.registered.lock();
        let mut codecs = registered.clone();
        if let Some(source) = &self.source {
            codecs.extend(source().map_err(ConfigurationError::Discovery)?);
        }
        self.publish(&codecs)?;
        info!(
            kind = self.kind,
            count = codecs.len(),
            "codec registry reloaded"
        );
        Ok(())
    }

    /// Must be called with the `registered` lock held.
    fn publish(&self, codecs: &[Arc<C>]) -> Result<(), ConfigurationError> {
        let generation = self.generation.load(Ordering::Relaxed) + 1;
        let snapshot = Snapshot::build(self.kind, generation, self.tie_break, codecs)?;
        self.generation.store(generation, Ordering::Relaxed);
        self.current.store(Arc::new(snapshot));
        Ok(())
    }

    /// The snapshot currently published.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot<C>> {
        self.current.load_full()
    }

    /// Resolves `key` against the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`NoCodecFound`] when no codec is compatible with `key`.
    pub fn resolve(&self, key: &CodecKey) -> Result<Resolved<C>, NoCodecFound> {
        self.current.load().resolve(key)
    }

    #[must_use]
    pub fn contains(&self, key: &CodecKey) -> bool {
        self.resolve(key).is_ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}
