use std::sync::Arc;

use serde_json::{json, Map, Value};
use tabox_migrate::{
    detect_current_version_from_data, is_data_safe, BackupConfig, BackupEngine, MigrationConfig, MigrationCoordinator,
    MigrationStep, SchemaVersion,
};
use tabox_store::{CollectionStore, KeyValueStore, LibsqlStore, LoadOptions, MemoryStore, SortBy};

fn legacy_payload(with_backups: bool) -> Map<String, Value> {
    let mut data = json!({
        "tabsArray": [
            {
                "uid": "work",
                "name": "Work",
                "color": "#1a73e8",
                "createdOn": 1_000,
                "tabs": [
                    {"uid": "w1", "url": "https://github.com", "title": "GitHub", "groupUid": "g1"},
                    {"uid": "w2", "url": "https://docs.rs", "title": "Docs.rs"}
                ],
                "chromeGroups": [{"uid": "g1", "title": "Code", "color": "#34a853"}]
            },
            {
                "name": "Reading",
                "lastUpdated": 2_000,
                "tabs": [{"url": "https://blog.rust-lang.org", "title": "Rust Blog"}]
            }
        ],
        "viewMode": "list"
    });
    if with_backups {
        data["autoBackups"] = json!([]);
    }
    let Value::Object(map) = data else { unreachable!() };
    map
}

async fn seed(kv: &Arc<dyn KeyValueStore>, data: Map<String, Value>) {
    kv.set(data).await.unwrap();
}

#[tokio::test]
async fn test_version_detection_scenario() {
    let data = legacy_payload(true);
    assert_eq!(
        detect_current_version_from_data(&data),
        SchemaVersion::V3_5ColorMigrationNeeded
    );

    let mut marked = data.clone();
    marked.insert("colorSystemVersion".to_string(), json!("2.0"));
    // Colors are still hex, so the palette check alone keeps it on the color path.
    assert_eq!(
        detect_current_version_from_data(&marked),
        SchemaVersion::V3_5ColorMigrationNeeded
    );

    let mut clean = marked.clone();
    clean["tabsArray"][0]["color"] = json!("blue");
    clean["tabsArray"][0]["chromeGroups"][0]["color"] = json!("green");
    assert_eq!(detect_current_version_from_data(&clean), SchemaVersion::V3_5);
}

#[tokio::test]
async fn test_migrated_data_loads_through_store() {
    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<dyn KeyValueStore> = Arc::new(LibsqlStore::open(&dir.path().join("tabox.db")).await.unwrap());
    seed(&kv, legacy_payload(false)).await;

    let coordinator = MigrationCoordinator::new(kv.clone(), BackupConfig::default(), MigrationConfig::default());
    let outcome = coordinator.execute_migration(false).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.from_version.as_deref(), Some("3.0"));

    let all = kv.get_all().await.unwrap();
    assert!(is_data_safe(&all));
    assert_eq!(all["viewMode"], json!("list"));

    let store = CollectionStore::new(kv.clone());
    let options = LoadOptions {
        sort_by: Some(SortBy::Name),
        ..Default::default()
    };
    let collections = store.load_all_collections(&options).await.unwrap();
    assert_eq!(collections.len(), 2);

    let work = collections.iter().find(|c| c.uid == "work").unwrap();
    assert_eq!(work.color, "blue");
    assert_eq!(work.chrome_groups[0].color, "green");
    assert_eq!(work.tabs[0].group_uid.as_deref(), Some("g1"));
    assert!(work.parent_id.is_none());

    let reading = collections.iter().find(|c| c.name == "Reading").unwrap();
    assert!(!reading.uid.is_empty());
    assert_eq!(reading.created_on, 2_000);
    assert!(!reading.tabs[0].uid.is_empty());

    let backups = coordinator.backups().get_available_backups(Some("pre_migration")).await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].collection_count, 2);
}

#[tokio::test]
async fn test_failed_migration_restores_original_array() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    seed(&kv, legacy_payload(false)).await;
    let original = kv.get_one("tabsArray").await.unwrap().unwrap();

    let coordinator = MigrationCoordinator::new(kv.clone(), BackupConfig::default(), MigrationConfig::default())
        .with_step_override(MigrationStep::TimestampMigration, |data| {
            data.remove("folders_index");
            Err(anyhow::anyhow!("timestamp backfill interrupted"))
        });

    let outcome = coordinator.execute_migration(false).await;
    assert!(!outcome.success);
    assert_eq!(outcome.rollback_success, Some(true));
    assert_eq!(kv.get_one("tabsArray").await.unwrap().unwrap(), original);
    assert!(kv.get_one("tabox_schema_version").await.unwrap().is_none());

    let chain = coordinator
        .backups()
        .load_chain(outcome.chain_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(chain.rolled_back);
    assert!(!chain.completed);

    // The same coordinator can run again once the failure is gone.
    let retry = MigrationCoordinator::new(kv.clone(), BackupConfig::default(), MigrationConfig::default());
    let outcome = retry.execute_migration(false).await;
    assert!(outcome.success, "{:?}", outcome.error);
}

#[tokio::test]
async fn test_backup_restore_on_libsql() {
    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<dyn KeyValueStore> = Arc::new(LibsqlStore::open(&dir.path().join("tabox.db")).await.unwrap());
    seed(&kv, legacy_payload(true)).await;

    let engine = BackupEngine::new(kv.clone(), BackupConfig::default());
    let before = engine.snapshot().await.unwrap();
    let key = engine
        .create_backup("manual", "integration", None)
        .await
        .unwrap()
        .key()
        .unwrap()
        .to_string();

    kv.set_one("tabsArray", json!([])).await.unwrap();
    kv.set_one("stray", json!(true)).await.unwrap();
    assert!(engine.restore_from_backup(&key, true).await.unwrap());
    assert_eq!(engine.snapshot().await.unwrap(), before);

    let emergency = engine.get_available_backups(Some("emergency")).await.unwrap();
    assert_eq!(emergency.len(), 1);
}
