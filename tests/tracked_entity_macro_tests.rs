use chrono::{DateTime, NaiveDate, Utc};
use memorm::{
    ChangeTracker, EntityKey, FieldKind, FieldValue, TrackError, TrackedEntity, tracked_entity,
};
use uuid::Uuid;

tracked_entity! {
    /// A shipment row.
    #[derive(Debug, PartialEq)]
    pub struct Shipment {
        #[track(key)]
        pub id: Uuid,
        /// Destination warehouse code.
        pub warehouse: String,
        pub due: NaiveDate,
        pub dispatched_at: Option<DateTime<Utc>>,
        pub weight_kg: f64,
        #[track(skip)]
        pub scratch: Vec<u8>,
    }
}

tracked_entity! {
    #[derive(Debug)]
    struct OrderLine {
        #[track(key)]
        order_id: i64,
        #[track(key)]
        line: i32,
        quantity: u32,
    }
}

fn shipment() -> Shipment {
    Shipment::new(
        Uuid::from_u128(42),
        "WH-1".to_string(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        None,
        12.5,
        vec![1, 2, 3],
    )
}

#[test]
fn descriptor_lists_tracked_fields_in_order() {
    let descriptor = Shipment::descriptor();

    assert_eq!(descriptor.type_name(), "Shipment");
    let names: Vec<&str> = descriptor.fields().iter().map(|f| f.name).collect();
    assert_eq!(
        names,
        vec!["id", "warehouse", "due", "dispatched_at", "weight_kg"]
    );

    let id = descriptor.field("id").unwrap();
    assert!(id.primary_key);
    assert_eq!(id.kind, FieldKind::Uuid);

    let dispatched = descriptor.field("dispatched_at").unwrap();
    assert!(dispatched.nullable);
    assert_eq!(dispatched.kind, FieldKind::Timestamp);

    assert!(descriptor.field("scratch").is_none());
    assert!(descriptor.validate().is_ok());
}

#[test]
fn composite_key_follows_declaration_order() {
    let descriptor = OrderLine::descriptor();
    let keys: Vec<&str> = descriptor.key_fields().map(|f| f.name).collect();
    assert_eq!(keys, vec!["order_id", "line"]);

    let line = OrderLine::new(7, 2, 10);
    assert_eq!(
        line.entity_key().unwrap(),
        EntityKey::new(vec![FieldValue::Integer(7), FieldValue::Integer(2)])
    );
    assert_eq!(line.entity_key().unwrap().to_string(), "(7, 2)");
}

#[test]
fn read_field_covers_tracked_fields_only() {
    let s = shipment();

    assert_eq!(
        s.read_field("id"),
        Some(FieldValue::Uuid(Uuid::from_u128(42)))
    );
    assert_eq!(s.read_field("warehouse"), Some(FieldValue::from("WH-1")));
    assert_eq!(s.read_field("dispatched_at"), Some(FieldValue::Null));
    assert_eq!(s.read_field("weight_kg"), Some(FieldValue::Float(12.5)));
    assert_eq!(s.read_field("scratch"), None);
    assert_eq!(s.read_field("missing"), None);
}

#[test]
fn write_field_converts_and_checks_kinds() {
    let mut s = shipment();
    let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    s.write_field("dispatched_at", FieldValue::Timestamp(at))
        .unwrap();
    assert_eq!(s.dispatched_at, Some(at));

    s.write_field("dispatched_at", FieldValue::Null).unwrap();
    assert_eq!(s.dispatched_at, None);

    let wrong_kind = s.write_field("warehouse", FieldValue::Integer(3));
    match wrong_kind {
        Err(TrackError::Construction { type_name, reason }) => {
            assert_eq!(type_name, "Shipment");
            assert_eq!(reason, "cannot write INTEGER value into field 'warehouse'");
        }
        other => panic!("expected construction error, got {other:?}"),
    }
    assert_eq!(s.warehouse, "WH-1");

    let null_into_required = s.write_field("due", FieldValue::Null);
    assert!(matches!(
        null_into_required,
        Err(TrackError::Construction { .. })
    ));

    let unknown = s.write_field("scratch", FieldValue::Text("x".into()));
    assert!(matches!(unknown, Err(TrackError::Inconsistent(_))));
}

#[test]
fn write_field_rejects_out_of_range_integers() {
    let mut line = OrderLine::new(1, 1, 1);
    let result = line.write_field("quantity", FieldValue::Integer(-5));
    assert!(matches!(result, Err(TrackError::Construction { .. })));
    assert_eq!(line.quantity, 1);
}

#[test]
fn blank_uses_field_defaults() {
    let blank = Shipment::blank().unwrap();
    assert_eq!(blank.id, Uuid::nil());
    assert!(blank.warehouse.is_empty());
    assert_eq!(blank.dispatched_at, None);
    assert!(blank.scratch.is_empty());
}

#[test]
fn materialized_snapshot_keeps_tracked_values_only() {
    let mut live = vec![shipment()];
    let tracker = ChangeTracker::new(&live).unwrap();

    live[0].warehouse = "WH-2".to_string();
    live[0].weight_kg = 13.0;

    let snapshot = tracker
        .snapshot(&EntityKey::from_value(Uuid::from_u128(42)))
        .unwrap();
    let original: Shipment = snapshot.materialize().unwrap();

    assert_eq!(original.warehouse, "WH-1");
    assert_eq!(original.weight_kg, 12.5);
    assert_eq!(original.due, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
    assert!(original.scratch.is_empty());

    let changed: Vec<String> = tracker.modified_entries(&live).unwrap()[0]
        .changed_fields()
        .map(str::to_string)
        .collect();
    assert_eq!(changed, vec!["warehouse", "weight_kg"]);
}
