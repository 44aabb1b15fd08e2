//! # Versioned Registry
//!
//! Per-domain tables of semantic entries whose wire-format numeric id varies
//! by protocol version (variants, block states, and similar identifier sets).
//!
//! Lifecycle is two-phase: entries are [`VersionedRegistry::define`]d once at
//! process startup while the raw mapping tables (parsed from JSON) are still
//! loaded, then [`VersionedRegistry::unload_mappings`] validates the
//! definitions, builds the per-version lookup index, and discards the raw
//! tables so they are not retained for the process lifetime. After the freeze
//! the registry is read-only; no locking is needed on the lookup path because
//! no writer exists concurrently with readers.
//!
//! Mapping data format, one object per registry:
//!
//! ```json
//! { "tabby": { "V1_20_5": 0, "V1_21": 1 }, "black": { "V1_20_5": 1 } }
//! ```
//!
//! An entry's id at some version is the id of the latest mapping whose
//! version is not newer than the requested one; a version older than the
//! entry's first mapping means the entry does not exist there yet.

use crate::error::{ProtocolError, Result};
use crate::protocol::version::ProtocolVersion;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A named semantic entry with its per-version id history and domain payload.
#[derive(Debug)]
pub struct RegistryEntry<T> {
    name: String,
    value: T,
    /// `(introduced at, id)` pairs in ascending version order.
    mappings: Vec<(ProtocolVersion, i32)>,
}

impl<T> RegistryEntry<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// The wire id of this entry at `version`, or `None` when the entry had
    /// not been introduced yet.
    pub fn id_at(&self, version: ProtocolVersion) -> Option<i32> {
        self.mappings
            .iter()
            .rev()
            .find(|(since, _)| version.is_newer_or_equal(*since))
            .map(|(_, id)| *id)
    }

    pub fn exists_at(&self, version: ProtocolVersion) -> bool {
        self.id_at(version).is_some()
    }
}

type RawMappings = HashMap<String, Vec<(ProtocolVersion, i32)>>;

/// A registry of [`RegistryEntry`] values with a define-then-freeze lifecycle.
pub struct VersionedRegistry<T> {
    name: String,
    entries: Vec<Arc<RegistryEntry<T>>>,
    by_name: HashMap<String, usize>,
    /// Raw per-version tables; dropped by [`Self::unload_mappings`].
    raw: Option<RawMappings>,
    /// Snapshot id maps keyed by every version at which any entry changes.
    /// Built at freeze time; lookups take the floor snapshot.
    index: Option<BTreeMap<ProtocolVersion, HashMap<i32, usize>>>,
}

impl<T> VersionedRegistry<T> {
    /// Parse the raw mapping tables and open the registry for definitions.
    pub fn new(name: impl Into<String>, mapping_json: &str) -> Result<Self> {
        let name = name.into();
        let parsed: HashMap<String, HashMap<String, i32>> = serde_json::from_str(mapping_json)?;
        if parsed.is_empty() {
            return Err(ProtocolError::MissingMappings(name));
        }

        let mut raw = RawMappings::with_capacity(parsed.len());
        for (entry_name, table) in parsed {
            let mut mappings = Vec::with_capacity(table.len());
            for (version_name, id) in table {
                mappings.push((ProtocolVersion::from_name(&version_name)?, id));
            }
            mappings.sort_by_key(|(version, _)| *version);
            raw.insert(entry_name, mappings);
        }

        Ok(VersionedRegistry {
            name,
            entries: Vec::new(),
            by_name: HashMap::new(),
            raw: Some(raw),
            index: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a semantic entry. Its id history comes from the mapping
    /// tables; a name absent from the tables yields an entry that exists at
    /// no version (defined but never on the wire).
    pub fn define(&mut self, name: impl Into<String>, value: T) -> Result<Arc<RegistryEntry<T>>> {
        let name = name.into();
        let raw = match self.raw.as_ref() {
            Some(raw) => raw,
            None => return Err(ProtocolError::RegistryFrozen(self.name.clone())),
        };
        if self.by_name.contains_key(&name) {
            return Err(ProtocolError::DuplicateEntryName {
                registry: self.name.clone(),
                name,
            });
        }

        let mappings = raw.get(&name).cloned().unwrap_or_default();
        let entry = Arc::new(RegistryEntry {
            name: name.clone(),
            value,
            mappings,
        });
        self.by_name.insert(name, self.entries.len());
        self.entries.push(Arc::clone(&entry));
        Ok(entry)
    }

    /// Freeze the registry: validate that no two entries collide on a
    /// (version, id) pair, build the lookup index, and discard the raw
    /// mapping tables. Further `define` calls fail.
    pub fn unload_mappings(&mut self) -> Result<()> {
        if self.raw.take().is_none() {
            return Err(ProtocolError::RegistryFrozen(self.name.clone()));
        }

        // ids only change at versions that appear in some entry's mapping
        // list, so validating one snapshot per such version covers the whole
        // version range
        let mut snapshot_versions: Vec<ProtocolVersion> = self
            .entries
            .iter()
            .flat_map(|e| e.mappings.iter().map(|(v, _)| *v))
            .collect();
        snapshot_versions.sort();
        snapshot_versions.dedup();

        let mut index = BTreeMap::new();
        for version in snapshot_versions {
            let mut by_id: HashMap<i32, usize> = HashMap::new();
            for (slot, entry) in self.entries.iter().enumerate() {
                let Some(id) = entry.id_at(version) else {
                    continue;
                };
                if let Some(&previous) = by_id.get(&id) {
                    return Err(ProtocolError::IdCollision {
                        registry: self.name.clone(),
                        version: version.name(),
                        id,
                        first: self.entries[previous].name.clone(),
                        second: entry.name.clone(),
                    });
                }
                by_id.insert(id, slot);
            }
            index.insert(version, by_id);
        }

        self.index = Some(index);
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.raw.is_none()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Arc<RegistryEntry<T>>> {
        self.by_name.get(name).map(|&slot| &self.entries[slot])
    }

    /// Resolve a wire id at some version. Before the freeze this scans the
    /// entries; after it, the floor snapshot answers in one map lookup.
    pub fn get_by_id(&self, version: ProtocolVersion, id: i32) -> Option<&Arc<RegistryEntry<T>>> {
        match &self.index {
            Some(index) => index
                .range(..=version)
                .next_back()
                .and_then(|(_, by_id)| by_id.get(&id))
                .map(|&slot| &self.entries[slot]),
            None => self
                .entries
                .iter()
                .find(|entry| entry.id_at(version) == Some(id)),
        }
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[Arc<RegistryEntry<T>>] {
        &self.entries
    }
}

impl<T> std::fmt::Debug for VersionedRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedRegistry")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
