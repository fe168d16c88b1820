use gt_core::store::{FileIntentStore, IntentStore, MemoryIntentStore, StoreError};
use gt_core::types::TrackingIntent;

#[test]
fn missing_file_loads_default_intent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileIntentStore::new(dir.path(), "bg_location_prefs");

    let intent = store.load().expect("load");
    assert_eq!(intent, TrackingIntent::default());
    assert!(!store.path().exists(), "load must not create the record");
}

#[test]
fn save_then_load_survives_a_new_store_instance() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileIntentStore::new(dir.path(), "bg_location_prefs");

    let intent = TrackingIntent {
        is_running: true,
        is_manually_stopped: true,
        updated_at: Some(chrono::Utc::now()),
    };
    store.save(&intent).expect("save");

    // Simulate a process restart: a fresh store pointed at the same namespace.
    let reopened = FileIntentStore::new(dir.path(), "bg_location_prefs");
    let loaded = reopened.load().expect("load");
    assert_eq!(loaded, intent);
}

#[test]
fn save_overwrites_whole_record_and_leaves_no_temp_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileIntentStore::new(dir.path(), "bg_location_prefs");

    store
        .save(&TrackingIntent {
            is_running: true,
            is_manually_stopped: false,
            updated_at: None,
        })
        .expect("first save");
    store
        .save(&TrackingIntent {
            is_running: false,
            is_manually_stopped: true,
            updated_at: None,
        })
        .expect("second save");

    let loaded = store.load().expect("load");
    assert!(!loaded.is_running);
    assert!(loaded.is_manually_stopped);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read_dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp file should be renamed away");
}

#[test]
fn save_creates_missing_data_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("a").join("b");
    let store = FileIntentStore::new(&nested, "prefs");

    store.save(&TrackingIntent::default()).expect("save");
    assert!(nested.join("prefs.json").exists());
}

#[test]
fn additive_fields_default_to_false() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileIntentStore::new(dir.path(), "prefs");
    // A record written before `is_manually_stopped` existed.
    std::fs::write(store.path(), r#"{ "is_running": true }"#).expect("write");

    let loaded = store.load().expect("load");
    assert!(loaded.is_running);
    assert!(!loaded.is_manually_stopped);
}

#[test]
fn corrupt_record_is_a_serde_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileIntentStore::new(dir.path(), "prefs");
    std::fs::write(store.path(), "not json").expect("write");

    let err = store.load().expect_err("corrupt record");
    assert!(matches!(err, StoreError::Serde(_)));
}

#[test]
fn memory_store_keeps_last_save() {
    let store = MemoryIntentStore::with_intent(TrackingIntent {
        is_running: true,
        is_manually_stopped: false,
        updated_at: None,
    });
    assert!(store.load().unwrap().is_running);

    store.save(&TrackingIntent::default()).unwrap();
    assert_eq!(store.snapshot(), Some(TrackingIntent::default()));
}
