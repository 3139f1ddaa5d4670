use std::collections::HashMap;
use std::marker::PhantomData;

use log::warn;
use tracing::{Level, event, info_span};

use super::changes::{ChangeSet, ModifiedEntity};
use super::config::{RemovalPolicy, TrackerConfig};
use super::entity::{TrackedEntity, key_of};
use super::snapshot::EntitySnapshot;
use crate::core::{EntityDescriptor, EntityKey, Result, TrackError};

/// Lifecycle state of one identity as seen by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Inserted since the last save; no snapshot yet.
    Added,
    /// Has a snapshot of its last-persisted values.
    Persisted,
    /// Marked for deletion; the snapshot stays until the next refresh.
    Removed,
    /// Removed and then added again under the same identity before a save.
    Replaced,
}

#[derive(Debug, Clone)]
enum Entry {
    Added,
    Persisted(EntitySnapshot),
    Removed(EntitySnapshot),
    Replaced(EntitySnapshot),
}

impl Entry {
    fn state(&self) -> EntityState {
        match self {
            Self::Added => EntityState::Added,
            Self::Persisted(_) => EntityState::Persisted,
            Self::Removed(_) => EntityState::Removed,
            Self::Replaced(_) => EntityState::Replaced,
        }
    }

    fn snapshot(&self) -> Option<&EntitySnapshot> {
        match self {
            Self::Added => None,
            Self::Persisted(s) | Self::Removed(s) | Self::Replaced(s) => Some(s),
        }
    }

    fn is_pending_add(&self) -> bool {
        matches!(self, Self::Added | Self::Replaced(_))
    }

    fn is_pending_removal(&self) -> bool {
        matches!(self, Self::Removed(_) | Self::Replaced(_))
    }
}

struct LiveIndex<'a, E> {
    ordered: Vec<(EntityKey, &'a E)>,
    positions: HashMap<EntityKey, usize>,
}

impl<'a, E> LiveIndex<'a, E> {
    fn get(&self, key: &EntityKey) -> Option<&'a E> {
        self.positions.get(key).map(|&pos| self.ordered[pos].1)
    }
}

/// Tracks one set of entities against the snapshot of their last-persisted
/// state.
///
/// Every identity maps to exactly one [`EntityState`]. Snapshots are only
/// replaced by [`refresh`](Self::refresh) and [`reset`](Self::reset); the
/// tracker never holds references to live entities, those are passed in by
/// whoever owns them.
pub struct ChangeTracker<E> {
    descriptor: EntityDescriptor,
    config: TrackerConfig,
    entries: HashMap<EntityKey, Entry>,
    order: Vec<EntityKey>,
    duplicate_adds: Vec<EntityKey>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: TrackedEntity> ChangeTracker<E> {
    /// Snapshots every supplied entity as persisted state.
    pub fn new<'a, I>(entities: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        Self::with_config(entities, TrackerConfig::default())
    }

    pub fn with_config<'a, I>(entities: I, config: TrackerConfig) -> Result<Self>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        config.validate()?;
        let descriptor = E::descriptor();
        descriptor.validate()?;
        let (entries, order) = snapshot_all(&descriptor, entities)?;

        event!(
            Level::DEBUG,
            set = %config.name,
            entity_type = descriptor.type_name(),
            tracked = order.len(),
            "change tracker created"
        );

        Ok(Self {
            descriptor,
            config,
            entries,
            order,
            duplicate_adds: Vec::new(),
            _entity: PhantomData,
        })
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn key_of(&self, entity: &E) -> Result<EntityKey> {
        key_of(entity, &self.descriptor)
    }

    /// Records an insertion. Collisions with persisted identities are not
    /// checked here; they fail the next `pending_changes` or `refresh`.
    pub fn add(&mut self, entity: &E) -> Result<()> {
        let key = self.key_of(entity)?;

        let Some(entry) = self.entries.get_mut(&key) else {
            event!(Level::DEBUG, set = %self.config.name, key = %key, "entity added");
            self.entries.insert(key.clone(), Entry::Added);
            self.order.push(key);
            return Ok(());
        };

        if let Entry::Removed(_) = entry {
            if let Entry::Removed(snapshot) = std::mem::replace(entry, Entry::Added) {
                *entry = Entry::Replaced(snapshot);
            }
            event!(Level::DEBUG, set = %self.config.name, key = %key, "removed entity re-added");
        } else {
            event!(
                Level::WARN,
                set = %self.config.name,
                key = %key,
                "entity added with an identity that is already tracked"
            );
            self.duplicate_adds.push(key);
        }
        Ok(())
    }

    /// Marks an entity for deletion. Nothing is dropped from the snapshots
    /// until the next refresh.
    ///
    /// Returns `false` when the identity is not tracked (or already removed);
    /// with [`RemovalPolicy::Reject`] that case is an error instead. Removing
    /// an entity that was added since the last save cancels the pending add.
    pub fn remove(&mut self, entity: &E) -> Result<bool> {
        let key = self.key_of(entity)?;
        self.remove_key(&key)
    }

    pub fn remove_key(&mut self, key: &EntityKey) -> Result<bool> {
        if let Some(pos) = self.duplicate_adds.iter().position(|k| k == key) {
            self.duplicate_adds.remove(pos);
            return Ok(true);
        }

        let removed = match self.entries.remove(key) {
            Some(Entry::Persisted(snapshot)) | Some(Entry::Replaced(snapshot)) => {
                self.entries.insert(key.clone(), Entry::Removed(snapshot));
                true
            }
            Some(Entry::Added) => {
                self.order.retain(|k| k != key);
                true
            }
            Some(Entry::Removed(snapshot)) => {
                self.entries.insert(key.clone(), Entry::Removed(snapshot));
                false
            }
            None => false,
        };

        if removed {
            event!(Level::DEBUG, set = %self.config.name, key = %key, "entity removed");
            return Ok(true);
        }

        match self.config.removal_policy {
            RemovalPolicy::Reject => Err(TrackError::NotTracked {
                type_name: self.descriptor.type_name().to_string(),
                key: key.clone(),
            }),
            RemovalPolicy::Ignore => {
                warn!(
                    "ignored removal of untracked entity: set='{}' type='{}' key={}",
                    self.config.name,
                    self.descriptor.type_name(),
                    key
                );
                Ok(false)
            }
        }
    }

    /// Live entities whose trackable fields differ from their snapshot, in
    /// input order. Entities without a persisted snapshot are skipped.
    pub fn get_modified_entities<'a, I>(&self, live: I) -> Result<Vec<&'a E>>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let mut modified = Vec::new();
        for entity in live {
            let key = self.key_of(entity)?;
            if let Some(Entry::Persisted(snapshot)) = self.entries.get(&key) {
                if snapshot.is_modified(entity)? {
                    modified.push(entity);
                }
            }
        }
        Ok(modified)
    }

    /// Like [`get_modified_entities`](Self::get_modified_entities), with the
    /// changed fields of each entity.
    pub fn modified_entries<'a, I>(&self, live: I) -> Result<Vec<ModifiedEntity<'a, E>>>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let mut ordered = Vec::new();
        for entity in live {
            ordered.push((self.key_of(entity)?, entity));
        }
        self.diff_ordered(&ordered)
    }

    /// Resolves the pending additions against the live entities.
    pub fn added_entities<'a, I>(&self, live: I) -> Result<Vec<&'a E>>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let index = self.index_live(live)?;
        self.order
            .iter()
            .filter(|key| self.entries.get(*key).is_some_and(Entry::is_pending_add))
            .map(|key| index.get(key).ok_or_else(|| self.missing_live(key)))
            .collect()
    }

    /// Last-persisted snapshots of the entities marked for deletion.
    pub fn removed_snapshots(&self) -> Vec<&EntitySnapshot> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .filter(|entry| entry.is_pending_removal())
            .filter_map(Entry::snapshot)
            .collect()
    }

    /// Added, removed and modified entities in one set.
    ///
    /// Fails before anything is written if the live set and the tracker have
    /// drifted apart, so an executor never acts on a set `refresh` would reject.
    pub fn pending_changes<'a, I>(&'a self, live: I) -> Result<ChangeSet<'a, E>>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        self.ensure_no_duplicate_adds()?;
        let index = self.index_live(live)?;
        self.check_live(&index)?;

        let mut added = Vec::new();
        let mut removed = Vec::new();
        for key in &self.order {
            let Some(entry) = self.entries.get(key) else {
                continue;
            };
            if let Some(snapshot) = entry.snapshot().filter(|_| entry.is_pending_removal()) {
                removed.push(snapshot);
            }
            if entry.is_pending_add() {
                added.push(index.get(key).ok_or_else(|| self.missing_live(key))?);
            }
        }
        let modified = self.diff_ordered(&index.ordered)?;

        Ok(ChangeSet {
            added,
            removed,
            modified,
        })
    }

    /// Acknowledges a successful save: additions become persisted, removals are
    /// purged and every remaining snapshot is re-taken from `live`.
    ///
    /// The new state is built completely before it replaces the old one, so an
    /// error leaves the tracker exactly as it was.
    pub fn refresh<'a, I>(&mut self, live: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let span = info_span!(
            "tracker.refresh",
            set = %self.config.name,
            entity_type = self.descriptor.type_name()
        );
        let _enter = span.enter();

        self.ensure_no_duplicate_adds()?;
        let index = self.index_live(live)?;
        self.check_live(&index)?;

        let mut entries = HashMap::with_capacity(index.ordered.len());
        let mut order = Vec::with_capacity(index.ordered.len());
        let mut inserted = 0usize;
        let mut purged = 0usize;

        for key in &self.order {
            let Some(entry) = self.entries.get(key) else {
                continue;
            };
            if entry.is_pending_removal() {
                purged += 1;
            }
            if entry.is_pending_add() {
                inserted += 1;
            } else if entry.is_pending_removal() {
                continue;
            }

            let entity = index.get(key).ok_or_else(|| self.missing_live(key))?;
            let snapshot = EntitySnapshot::capture(entity, &self.descriptor)?;
            entries.insert(key.clone(), Entry::Persisted(snapshot));
            order.push(key.clone());
        }

        self.entries = entries;
        self.order = order;

        event!(
            Level::DEBUG,
            inserted,
            purged,
            tracked = self.order.len(),
            "tracker refreshed"
        );
        Ok(())
    }

    /// Drops all pending bookkeeping and treats `live` as freshly loaded.
    pub fn reset<'a, I>(&mut self, live: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let (entries, order) = snapshot_all(&self.descriptor, live)?;
        self.entries = entries;
        self.order = order;
        self.duplicate_adds.clear();
        event!(Level::DEBUG, set = %self.config.name, tracked = self.order.len(), "tracker reset");
        Ok(())
    }

    pub fn state_of(&self, key: &EntityKey) -> Option<EntityState> {
        self.entries.get(key).map(Entry::state)
    }

    /// Snapshot of one identity, including identities marked for removal.
    pub fn snapshot(&self, key: &EntityKey) -> Option<&EntitySnapshot> {
        self.entries.get(key).and_then(Entry::snapshot)
    }

    /// All last-persisted snapshots in tracking order.
    pub fn all_snapshots(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .filter_map(Entry::snapshot)
    }

    /// Identities added since the last save.
    pub fn added(&self) -> Vec<&EntityKey> {
        self.keys_where(Entry::is_pending_add)
    }

    /// Identities marked for deletion since the last save.
    pub fn removed(&self) -> Vec<&EntityKey> {
        self.keys_where(Entry::is_pending_removal)
    }

    /// `true` when adds or removals are pending. Field modifications are only
    /// visible by diffing against live entities.
    pub fn has_structural_changes(&self) -> bool {
        !self.duplicate_adds.is_empty()
            || self
                .entries
                .values()
                .any(|entry| !matches!(entry, Entry::Persisted(_)))
    }

    fn keys_where(&self, predicate: fn(&Entry) -> bool) -> Vec<&EntityKey> {
        self.order
            .iter()
            .filter(|key| self.entries.get(*key).is_some_and(predicate))
            .collect()
    }

    fn diff_ordered<'a>(&self, ordered: &[(EntityKey, &'a E)]) -> Result<Vec<ModifiedEntity<'a, E>>> {
        let mut modified = Vec::new();
        for (key, entity) in ordered {
            let Some(Entry::Persisted(snapshot)) = self.entries.get(key) else {
                continue;
            };
            let changes = snapshot.diff(*entity)?;
            if changes.is_empty() {
                continue;
            }
            if self.config.trace_field_diffs {
                for change in &changes {
                    event!(
                        Level::TRACE,
                        key = %key,
                        field = %change.field,
                        original = %change.original,
                        current = %change.current,
                        "field changed"
                    );
                }
            }
            modified.push(ModifiedEntity {
                key: key.clone(),
                entity: *entity,
                changes,
            });
        }
        Ok(modified)
    }

    fn index_live<'a, I>(&self, live: I) -> Result<LiveIndex<'a, E>>
    where
        I: IntoIterator<Item = &'a E>,
        E: 'a,
    {
        let mut ordered = Vec::new();
        let mut positions = HashMap::new();
        for entity in live {
            let key = self.key_of(entity)?;
            if positions.insert(key.clone(), ordered.len()).is_some() {
                return Err(self.duplicate(key));
            }
            ordered.push((key, entity));
        }
        Ok(LiveIndex { ordered, positions })
    }

    /// Every live entity must be tracked and not removed; every tracked,
    /// non-removed identity must be live.
    fn check_live(&self, index: &LiveIndex<'_, E>) -> Result<()> {
        for (key, _) in &index.ordered {
            match self.entries.get(key) {
                None => {
                    return Err(TrackError::Inconsistent(format!(
                        "live entity {} of '{}' was never added to the tracker",
                        key,
                        self.descriptor.type_name()
                    )));
                }
                Some(Entry::Removed(_)) => {
                    return Err(TrackError::Inconsistent(format!(
                        "entity {} of '{}' is marked removed but still live",
                        key,
                        self.descriptor.type_name()
                    )));
                }
                Some(_) => {}
            }
        }

        for key in &self.order {
            let removed = matches!(self.entries.get(key), Some(Entry::Removed(_)));
            if !removed && !index.positions.contains_key(key) {
                return Err(self.missing_live(key));
            }
        }
        Ok(())
    }

    fn ensure_no_duplicate_adds(&self) -> Result<()> {
        match self.duplicate_adds.first() {
            Some(key) => Err(self.duplicate(key.clone())),
            None => Ok(()),
        }
    }

    fn duplicate(&self, key: EntityKey) -> TrackError {
        TrackError::DuplicateKey {
            type_name: self.descriptor.type_name().to_string(),
            key,
        }
    }

    fn missing_live(&self, key: &EntityKey) -> TrackError {
        TrackError::Inconsistent(format!(
            "tracked entity {} of '{}' is missing from the live set",
            key,
            self.descriptor.type_name()
        ))
    }
}

fn snapshot_all<'a, E, I>(
    descriptor: &EntityDescriptor,
    entities: I,
) -> Result<(HashMap<EntityKey, Entry>, Vec<EntityKey>)>
where
    E: TrackedEntity + 'a,
    I: IntoIterator<Item = &'a E>,
{
    let mut entries = HashMap::new();
    let mut order = Vec::new();
    for entity in entities {
        let snapshot = EntitySnapshot::capture(entity, descriptor)?;
        let key = snapshot.key().clone();
        if entries.contains_key(&key) {
            return Err(TrackError::DuplicateKey {
                type_name: descriptor.type_name().to_string(),
                key,
            });
        }
        entries.insert(key.clone(), Entry::Persisted(snapshot));
        order.push(key);
    }
    Ok((entries, order))
}
