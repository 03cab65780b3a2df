use std::sync::Arc;

use tabox_core::{Collection, Tab};
use tabox_search::{filter_collections, search, MatchField};
use tabox_store::{CollectionStore, KeyValueStore, LibsqlStore, LoadOptions};

#[tokio::test]
async fn test_search_over_stored_collections() {
    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<dyn KeyValueStore> = Arc::new(LibsqlStore::open(&dir.path().join("search.db")).await.unwrap());
    let store = CollectionStore::new(kv);

    let mut async_rust = Collection::new("async", "Async Rust");
    async_rust.tabs = vec![
        Tab::new("a1", "https://tokio.rs/tokio/tutorial", "Tutorial | Tokio"),
        Tab::new("a2", "https://docs.rs/async-trait", "async_trait - Rust"),
    ];
    let mut travel = Collection::new("travel", "Lisbon trip");
    travel.tabs = vec![Tab::new("t1", "https://www.visitlisboa.com", "Visit  Lisboa")];
    store.save_single_collection(&async_rust).await.unwrap();
    store.save_single_collection(&travel).await.unwrap();

    let collections = store.load_all_collections(&LoadOptions::default()).await.unwrap();

    let found = filter_collections("tokio", &collections);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].uid, "async");

    let hits = search("visit lisboa", &collections);
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.collection_uid == "travel"));
    assert!(hits.iter().any(|h| h.field == MatchField::Title && h.text == "Visit  Lisboa"));
}
