use std::collections::BTreeMap;

use anyhow::{Context, anyhow, bail};
use memorm::{
    ChangeExecutor, ChangeSet, EntityCollection, EntityDescriptor, EntityKey, EntityState,
    FieldDescriptor, FieldKind, FieldValue, RemovalPolicy, SaveSummary, TrackError,
    TrackedEntity, TrackerConfig, field_write_error, tracked_entity,
};

tracked_entity! {
    #[derive(Debug, PartialEq)]
    pub struct Employee {
        #[track(key)]
        pub id: i64,
        pub name: String,
        #[track(skip)]
        pub notes: Vec<String>,
    }
}

/// Hand-written entity whose `title` can be read but never written back.
#[derive(Debug, Clone, PartialEq)]
struct Flaky {
    id: i64,
    title: String,
}

impl TrackedEntity for Flaky {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new(
            "Flaky",
            vec![
                FieldDescriptor::key("id", FieldKind::Integer),
                FieldDescriptor::new("title", FieldKind::Text),
            ],
        )
    }

    fn read_field(&self, field: &str) -> Option<FieldValue> {
        match field {
            "id" => Some(FieldValue::Integer(self.id)),
            "title" => Some(FieldValue::from(self.title.as_str())),
            _ => None,
        }
    }

    fn write_field(&mut self, field: &str, value: FieldValue) -> memorm::Result<()> {
        match (field, value) {
            ("id", FieldValue::Integer(id)) => self.id = id,
            (field, value) => return Err(field_write_error("Flaky", field, &value)),
        }
        Ok(())
    }
}

/// Applies every change set to an in-memory table, the way a SQL writer would.
#[derive(Default)]
struct TableExecutor {
    rows: BTreeMap<i64, String>,
    calls: usize,
}

impl TableExecutor {
    fn seeded(entities: &[Employee]) -> Self {
        Self {
            rows: entities.iter().map(|e| (e.id, e.name.clone())).collect(),
            calls: 0,
        }
    }
}

impl ChangeExecutor<Employee> for TableExecutor {
    fn execute(&mut self, changes: &ChangeSet<'_, Employee>) -> anyhow::Result<()> {
        self.calls += 1;
        for snapshot in &changes.removed {
            let id = snapshot.key().values()[0]
                .as_i64()
                .context("integer primary key")?;
            self.rows.remove(&id);
        }
        for entity in &changes.added {
            if self.rows.insert(entity.id, entity.name.clone()).is_some() {
                bail!("row {} already exists", entity.id);
            }
        }
        for modified in &changes.modified {
            let row = self
                .rows
                .get_mut(&modified.entity.id)
                .context("update of a missing row")?;
            *row = modified.entity.name.clone();
        }
        Ok(())
    }
}

struct FailingExecutor;

impl ChangeExecutor<Employee> for FailingExecutor {
    fn execute(&mut self, _changes: &ChangeSet<'_, Employee>) -> anyhow::Result<()> {
        Err(anyhow!("disk full"))
    }
}

fn employee(id: i64, name: &str) -> Employee {
    Employee::new(id, name.to_string(), Vec::new())
}

fn key(id: i64) -> EntityKey {
    EntityKey::from_value(id)
}

fn seeded() -> Vec<Employee> {
    vec![employee(1, "A"), employee(2, "B")]
}

fn ids<'a>(entities: impl IntoIterator<Item = &'a Employee>) -> Vec<i64> {
    entities.into_iter().map(|e| e.id).collect()
}

#[test]
fn save_cycle_scenario() {
    let mut executor = TableExecutor::seeded(&seeded());
    let mut employees = EntityCollection::load(seeded()).unwrap();

    employees
        .update(&key(1), |e| e.name = "A2".to_string())
        .unwrap();
    employees.add(employee(3, "C")).unwrap();
    let removed = employees.remove(&key(2)).unwrap();
    assert_eq!(removed, Some(employee(2, "B")));

    assert_eq!(employees.tracker().added(), vec![&key(3)]);
    assert_eq!(employees.tracker().removed(), vec![&key(2)]);
    assert_eq!(ids(employees.get_modified_entities().unwrap()), vec![1]);

    let summary = employees.save_changes(&mut executor).unwrap();
    assert_eq!(
        summary,
        SaveSummary {
            inserted: 1,
            deleted: 1,
            updated: 1,
        }
    );
    assert_eq!(executor.calls, 1);
    assert_eq!(
        executor.rows,
        BTreeMap::from([(1, "A2".to_string()), (3, "C".to_string())])
    );

    let snapshot_keys: Vec<EntityKey> = employees
        .tracker()
        .all_snapshots()
        .map(|s| s.key().clone())
        .collect();
    assert_eq!(snapshot_keys, vec![key(1), key(3)]);
    assert!(employees.tracker().added().is_empty());
    assert!(employees.tracker().removed().is_empty());
    assert!(!employees.has_changes().unwrap());
}

#[test]
fn adds_and_removes_are_mirrored_into_tracker() {
    let mut employees =
        EntityCollection::load(vec![employee(1, "A"), employee(2, "B"), employee(3, "C")])
            .unwrap();

    employees.add(employee(4, "D")).unwrap();
    employees.add(employee(5, "E")).unwrap();
    employees.remove(&key(2)).unwrap();
    // dropping a pending addition leaves no trace
    employees.remove(&key(5)).unwrap();
    assert_eq!(employees.remove(&key(9)).unwrap(), None);

    assert_eq!(ids(&employees), vec![1, 3, 4]);
    assert_eq!(employees.tracker().added(), vec![&key(4)]);
    assert_eq!(employees.tracker().removed(), vec![&key(2)]);
    assert_eq!(employees.state_of(&key(5)), None);
    assert_eq!(employees.state_of(&key(2)), Some(EntityState::Removed));
}

#[test]
fn duplicate_add_is_rejected() {
    let mut employees = EntityCollection::load(seeded()).unwrap();

    let result = employees.add(employee(1, "again"));
    assert!(matches!(result, Err(TrackError::DuplicateKey { .. })));
    assert_eq!(employees.len(), 2);
    assert!(employees.tracker().added().is_empty());
    assert!(!employees.has_changes().unwrap());
}

#[test]
fn duplicate_load_is_rejected() {
    let result = EntityCollection::load(vec![employee(1, "A"), employee(1, "B")]);
    assert!(matches!(result, Err(TrackError::DuplicateKey { .. })));
}

#[test]
fn readding_a_removed_identity_replaces_the_row() {
    let mut executor = TableExecutor::seeded(&seeded());
    let mut employees = EntityCollection::load(seeded()).unwrap();

    employees.remove(&key(1)).unwrap();
    employees.add(employee(1, "new")).unwrap();
    assert_eq!(employees.state_of(&key(1)), Some(EntityState::Replaced));

    let summary = employees.save_changes(&mut executor).unwrap();
    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(executor.rows.get(&1).map(String::as_str), Some("new"));
    assert_eq!(employees.state_of(&key(1)), Some(EntityState::Persisted));
}

#[test]
fn clear_tracks_every_removal() {
    let mut employees =
        EntityCollection::load(vec![employee(1, "A"), employee(2, "B"), employee(3, "C")])
            .unwrap();
    employees.add(employee(4, "D")).unwrap();

    assert_eq!(employees.clear().unwrap(), 4);

    assert!(employees.is_empty());
    assert_eq!(
        employees.tracker().removed(),
        vec![&key(1), &key(2), &key(3)]
    );
    assert!(employees.tracker().added().is_empty());
    assert_eq!(employees.state_of(&key(4)), None);
}

#[test]
fn remove_range_returns_matched_entities() {
    let mut employees =
        EntityCollection::load(vec![employee(1, "A"), employee(2, "B"), employee(3, "C")])
            .unwrap();

    let removed = employees
        .remove_range(&[key(1), key(7), key(3)])
        .unwrap();

    assert_eq!(ids(&removed), vec![1, 3]);
    assert_eq!(ids(&employees), vec![2]);
    assert_eq!(employees.tracker().removed(), vec![&key(1), &key(3)]);
}

#[test]
fn remove_entity_matches_by_identity() {
    let mut employees = EntityCollection::load(seeded()).unwrap();

    // same key, different field values
    let removed = employees.remove_entity(&employee(2, "stale copy")).unwrap();
    assert_eq!(removed.map(|e| e.name), Some("B".to_string()));
    assert!(!employees.contains_entity(&employee(2, "B")));
    assert!(employees.contains_entity(&employee(1, "anything")));
}

#[test]
fn reject_policy_fails_missed_removal() {
    let config = TrackerConfig::new("employees").removal_policy(RemovalPolicy::Reject);
    let mut employees = EntityCollection::load_with_config(seeded(), config).unwrap();

    let result = employees.remove(&key(9));
    assert!(matches!(result, Err(TrackError::NotTracked { .. })));
    assert_eq!(employees.len(), 2);
}

#[test]
fn update_refuses_key_changes() {
    let mut employees = EntityCollection::load(seeded()).unwrap();

    let result = employees.update(&key(1), |e| {
        e.id = 10;
        e.name = "moved".to_string();
    });

    assert!(matches!(
        result,
        Err(TrackError::KeyMutated { ref before, ref after, .. })
            if *before == EntityKey::from_value(1) && *after == EntityKey::from_value(10)
    ));
    assert_eq!(employees.get(&key(1)), Some(&employee(1, "A")));
    assert!(!employees.contains(&key(10)));
    assert!(!employees.has_changes().unwrap());
}

#[test]
fn update_of_missing_key_is_not_tracked() {
    let mut employees = EntityCollection::load(seeded()).unwrap();

    let result = employees.update(&key(42), |e| e.name.clear());
    assert!(matches!(result, Err(TrackError::NotTracked { .. })));
}

#[test]
fn update_returns_closure_result() {
    let mut employees = EntityCollection::load(seeded()).unwrap();

    let previous = employees
        .update(&key(2), |e| std::mem::replace(&mut e.name, "B2".to_string()))
        .unwrap();

    assert_eq!(previous, "B");
    assert_eq!(ids(employees.get_modified_entities().unwrap()), vec![2]);
}

#[test]
fn untracked_field_update_is_not_a_change() {
    let mut employees = EntityCollection::load(seeded()).unwrap();

    employees
        .update(&key(1), |e| e.notes.push("promoted".to_string()))
        .unwrap();

    assert!(!employees.has_changes().unwrap());
}

#[test]
fn failed_executor_leaves_tracker_untouched() {
    let mut employees = EntityCollection::load(seeded()).unwrap();
    employees
        .update(&key(1), |e| e.name = "A2".to_string())
        .unwrap();
    employees.add(employee(3, "C")).unwrap();
    employees.remove(&key(2)).unwrap();

    let result = employees.save_changes(&mut FailingExecutor);
    match result {
        Err(TrackError::Executor(err)) => assert_eq!(err.to_string(), "disk full"),
        other => panic!("expected executor error, got {other:?}"),
    }

    assert_eq!(employees.tracker().added(), vec![&key(3)]);
    assert_eq!(employees.tracker().removed(), vec![&key(2)]);
    assert_eq!(ids(employees.get_modified_entities().unwrap()), vec![1]);

    let mut executor = TableExecutor::seeded(&seeded());
    let summary = employees.save_changes(&mut executor).unwrap();
    assert_eq!(summary.total(), 3);
    assert!(!employees.has_changes().unwrap());
}

#[test]
fn save_without_changes_skips_executor() {
    let mut executor = TableExecutor::default();
    let mut employees = EntityCollection::load(seeded()).unwrap();

    let summary = employees.save_changes(&mut executor).unwrap();

    assert_eq!(summary.total(), 0);
    assert_eq!(executor.calls, 0);
}

#[test]
fn acknowledge_save_refreshes_after_external_write() {
    let mut employees = EntityCollection::load(seeded()).unwrap();
    employees.add(employee(3, "C")).unwrap();
    employees
        .update(&key(1), |e| e.name = "A2".to_string())
        .unwrap();

    let changes = employees.pending_changes().unwrap();
    assert_eq!(changes.summary().total(), 2);
    assert_eq!(changes.modified[0].changed_fields().collect::<Vec<_>>(), vec!["name"]);

    employees.acknowledge_save().unwrap();
    assert!(!employees.has_changes().unwrap());
    assert_eq!(employees.state_of(&key(3)), Some(EntityState::Persisted));
}

#[test]
fn original_values_rebuild_last_persisted_state() {
    let mut employees = EntityCollection::load(seeded()).unwrap();
    employees
        .update(&key(1), |e| {
            e.name = "A2".to_string();
            e.notes.push("draft".to_string());
        })
        .unwrap();
    employees.add(employee(3, "C")).unwrap();

    let original = employees.original_values(&key(1)).unwrap();
    assert_eq!(original, Some(employee(1, "A")));
    assert_eq!(employees.original_values(&key(3)).unwrap(), None);
    assert_eq!(employees.get(&key(1)).map(|e| e.name.as_str()), Some("A2"));
}

#[test]
fn reject_changes_restores_last_persisted_state() {
    let mut employees = EntityCollection::load(seeded()).unwrap();
    employees
        .update(&key(1), |e| {
            e.name = "A2".to_string();
            e.notes.push("kept".to_string());
        })
        .unwrap();
    employees.add(employee(3, "C")).unwrap();
    employees.remove(&key(2)).unwrap();

    employees.reject_changes().unwrap();

    assert_eq!(employees.len(), 2);
    let first = employees.get(&key(1)).unwrap();
    assert_eq!(first.name, "A");
    assert_eq!(first.notes, vec!["kept".to_string()]);
    assert_eq!(employees.get(&key(2)).map(|e| e.name.as_str()), Some("B"));
    assert!(!employees.contains(&key(3)));
    assert!(!employees.has_changes().unwrap());
}

#[test]
fn empty_collection_starts_without_changes() {
    let mut employees = EntityCollection::<Employee>::empty().unwrap();
    assert!(!employees.has_changes().unwrap());

    employees
        .add_range(vec![employee(1, "A"), employee(2, "B")])
        .unwrap();

    assert_eq!(employees.tracker().added(), vec![&key(1), &key(2)]);
    assert!(employees.has_changes().unwrap());
}

#[test]
fn reject_changes_restores_persisted_order() {
    let mut employees =
        EntityCollection::load(vec![employee(1, "A"), employee(2, "B"), employee(3, "C")])
            .unwrap();
    employees.remove(&key(1)).unwrap();
    employees.remove(&key(3)).unwrap();
    employees.add(employee(4, "D")).unwrap();

    employees.reject_changes().unwrap();

    assert_eq!(ids(&employees), vec![1, 2, 3]);
    let snapshot_keys: Vec<EntityKey> = employees
        .tracker()
        .all_snapshots()
        .map(|s| s.key().clone())
        .collect();
    assert_eq!(snapshot_keys, vec![key(1), key(2), key(3)]);
}

#[test]
fn failed_reject_changes_leaves_collection_and_tracker_intact() {
    let flaky = |id: i64, title: &str| Flaky {
        id,
        title: title.to_string(),
    };
    let mut items = EntityCollection::load(vec![flaky(1, "one"), flaky(2, "two")]).unwrap();
    items.add(flaky(3, "three")).unwrap();
    items
        .update(&key(1), |e| e.title = "edited".to_string())
        .unwrap();

    let result = items.reject_changes();
    assert!(matches!(result, Err(TrackError::Construction { .. })));

    let remaining: Vec<i64> = items.iter().map(|e| e.id).collect();
    assert_eq!(remaining, vec![1, 2, 3]);
    assert_eq!(items.get(&key(1)).map(|e| e.title.as_str()), Some("edited"));
    assert_eq!(items.tracker().added(), vec![&key(3)]);

    let changes = items.pending_changes().unwrap();
    assert_eq!(changes.added.len(), 1);
    assert_eq!(changes.modified.len(), 1);
    assert!(changes.removed.is_empty());
}
