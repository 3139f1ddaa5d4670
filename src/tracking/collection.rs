use log::warn;
use tracing::{Level, event, info_span};

use super::changes::{ChangeExecutor, ChangeSet, SaveSummary};
use super::config::{RemovalPolicy, TrackerConfig};
use super::entity::TrackedEntity;
use super::tracker::{ChangeTracker, EntityState};
use crate::core::{EntityKey, Result, TrackError};

/// A typed, mutable set of entities with change tracking.
///
/// Every insertion and removal goes through this type and is mirrored into the
/// owned [`ChangeTracker`], so the two can never drift apart. Entities are
/// handed out read-only; in-place edits go through [`update`](Self::update),
/// which refuses to change an identity.
pub struct EntityCollection<E> {
    entities: Vec<E>,
    tracker: ChangeTracker<E>,
}

impl<E: TrackedEntity> EntityCollection<E> {
    /// Wraps entities loaded from a persisted source.
    pub fn load(entities: impl IntoIterator<Item = E>) -> Result<Self> {
        Self::load_with_config(entities, TrackerConfig::default())
    }

    pub fn load_with_config(
        entities: impl IntoIterator<Item = E>,
        config: TrackerConfig,
    ) -> Result<Self> {
        let entities: Vec<E> = entities.into_iter().collect();
        let tracker = ChangeTracker::with_config(&entities, config)?;
        Ok(Self { entities, tracker })
    }

    /// An empty collection; nothing is persisted yet.
    pub fn empty() -> Result<Self> {
        Self::load(Vec::new())
    }

    pub fn tracker(&self) -> &ChangeTracker<E> {
        &self.tracker
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[E] {
        &self.entities
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.entities.iter()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&E> {
        self.position(key).map(|pos| &self.entities[pos])
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.position(key).is_some()
    }

    /// Identity-based membership test.
    pub fn contains_entity(&self, entity: &E) -> bool {
        self.tracker
            .key_of(entity)
            .is_ok_and(|key| self.contains(&key))
    }

    pub fn state_of(&self, key: &EntityKey) -> Option<EntityState> {
        self.tracker.state_of(key)
    }

    /// Adds an entity; its identity must not already be in the collection.
    pub fn add(&mut self, entity: E) -> Result<()> {
        let key = self.tracker.key_of(&entity)?;
        if self.contains(&key) {
            return Err(TrackError::DuplicateKey {
                type_name: self.tracker.descriptor().type_name().to_string(),
                key,
            });
        }
        self.tracker.add(&entity)?;
        self.entities.push(entity);
        Ok(())
    }

    /// Repeated [`add`](Self::add); stops at the first failure, keeping the
    /// entities added before it.
    pub fn add_range(&mut self, entities: impl IntoIterator<Item = E>) -> Result<()> {
        for entity in entities {
            self.add(entity)?;
        }
        Ok(())
    }

    /// Removes the entity with `key` and marks it for deletion.
    ///
    /// `Ok(None)` means nothing matched; with [`RemovalPolicy::Reject`] a miss
    /// is `TrackError::NotTracked` instead.
    pub fn remove(&mut self, key: &EntityKey) -> Result<Option<E>> {
        let Some(pos) = self.position(key) else {
            return match self.tracker.config().removal_policy {
                RemovalPolicy::Reject => Err(TrackError::NotTracked {
                    type_name: self.tracker.descriptor().type_name().to_string(),
                    key: key.clone(),
                }),
                RemovalPolicy::Ignore => {
                    warn!(
                        "remove matched no entity: set='{}' key={}",
                        self.tracker.config().name,
                        key
                    );
                    Ok(None)
                }
            };
        };
        self.tracker.remove_key(key)?;
        Ok(Some(self.entities.remove(pos)))
    }

    pub fn remove_entity(&mut self, entity: &E) -> Result<Option<E>> {
        let key = self.tracker.key_of(entity)?;
        self.remove(&key)
    }

    /// Repeated [`remove`](Self::remove); returns the entities that matched.
    pub fn remove_range<'k>(
        &mut self,
        keys: impl IntoIterator<Item = &'k EntityKey>,
    ) -> Result<Vec<E>> {
        let mut removed = Vec::new();
        for key in keys {
            if let Some(entity) = self.remove(key)? {
                removed.push(entity);
            }
        }
        Ok(removed)
    }

    /// Removes every entity one at a time so each removal is tracked.
    pub fn clear(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(first) = self.entities.first() {
            let key = self.tracker.key_of(first)?;
            if self.remove(&key)?.is_none() {
                return Err(TrackError::Inconsistent(format!(
                    "entity {} vanished during clear",
                    key
                )));
            }
            count += 1;
        }
        Ok(count)
    }

    /// Mutates one entity in place.
    ///
    /// If the closure changes the primary key, the entity is put back exactly
    /// as it was and `TrackError::KeyMutated` is returned.
    pub fn update<R>(&mut self, key: &EntityKey, f: impl FnOnce(&mut E) -> R) -> Result<R>
    where
        E: Clone,
    {
        let Some(pos) = self.position(key) else {
            return Err(TrackError::NotTracked {
                type_name: self.tracker.descriptor().type_name().to_string(),
                key: key.clone(),
            });
        };

        let before = self.entities[pos].clone();
        let result = f(&mut self.entities[pos]);
        match self.tracker.key_of(&self.entities[pos]) {
            Ok(after) if after == *key => Ok(result),
            Ok(after) => {
                self.entities[pos] = before;
                Err(TrackError::KeyMutated {
                    type_name: self.tracker.descriptor().type_name().to_string(),
                    before: key.clone(),
                    after,
                })
            }
            Err(err) => {
                self.entities[pos] = before;
                Err(err)
            }
        }
    }

    pub fn get_modified_entities(&self) -> Result<Vec<&E>> {
        self.tracker.get_modified_entities(&self.entities)
    }

    pub fn pending_changes(&self) -> Result<ChangeSet<'_, E>> {
        self.tracker.pending_changes(&self.entities)
    }

    pub fn has_changes(&self) -> Result<bool> {
        if self.tracker.has_structural_changes() {
            return Ok(true);
        }
        Ok(!self.get_modified_entities()?.is_empty())
    }

    /// Rebuilds the last-persisted version of an entity from its snapshot.
    pub fn original_values(&self, key: &EntityKey) -> Result<Option<E>> {
        self.tracker
            .snapshot(key)
            .map(|snapshot| snapshot.materialize())
            .transpose()
    }

    /// Runs one save cycle: hands the pending changes to `executor` and
    /// refreshes the tracker only if every write succeeded.
    pub fn save_changes<X>(&mut self, executor: &mut X) -> Result<SaveSummary>
    where
        X: ChangeExecutor<E> + ?Sized,
    {
        let span = info_span!(
            "collection.save_changes",
            set = %self.tracker.config().name,
            entity_type = self.tracker.descriptor().type_name()
        );
        let _enter = span.enter();

        let changes = self.tracker.pending_changes(&self.entities)?;
        let summary = changes.summary();
        if changes.is_empty() {
            event!(Level::DEBUG, "no pending changes");
            return Ok(summary);
        }

        if let Err(err) = executor.execute(&changes) {
            event!(Level::ERROR, error = %err, "persistence executor failed");
            return Err(TrackError::Executor(err));
        }

        self.tracker.refresh(&self.entities)?;
        event!(
            Level::INFO,
            inserted = summary.inserted,
            deleted = summary.deleted,
            updated = summary.updated,
            "changes saved"
        );
        Ok(summary)
    }

    /// Refreshes the tracker after an externally driven, successful save.
    pub fn acknowledge_save(&mut self) -> Result<()> {
        self.tracker.refresh(&self.entities)
    }

    /// Discards every pending change: additions are dropped, removed entities
    /// come back, and modified fields get their last-persisted values.
    ///
    /// The restored set is built in last-persisted order before anything is
    /// replaced; on error the collection and its tracker are left as they were.
    pub fn reject_changes(&mut self) -> Result<()>
    where
        E: Clone,
    {
        let mut restored = Vec::with_capacity(self.entities.len());
        let mut revived = 0usize;
        for snapshot in self.tracker.all_snapshots() {
            let key = snapshot.key();
            if self.tracker.state_of(key) == Some(EntityState::Persisted) {
                let mut entity = self.get(key).cloned().ok_or_else(|| {
                    TrackError::Inconsistent(format!(
                        "tracked entity {} is missing from the collection",
                        key
                    ))
                })?;
                snapshot.restore_into(&mut entity)?;
                restored.push(entity);
            } else {
                restored.push(snapshot.materialize::<E>()?);
                revived += 1;
            }
        }

        self.tracker.reset(&restored)?;
        self.entities = restored;
        event!(
            Level::INFO,
            set = %self.tracker.config().name,
            revived,
            "pending changes rejected"
        );
        Ok(())
    }

    fn position(&self, key: &EntityKey) -> Option<usize> {
        self.entities
            .iter()
            .position(|entity| self.tracker.key_of(entity).is_ok_and(|k| k == *key))
    }
}

impl<'a, E> IntoIterator for &'a EntityCollection<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
