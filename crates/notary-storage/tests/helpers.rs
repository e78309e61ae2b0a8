#![allow(dead_code)]

use std::fs;
use std::sync::Arc;

use notary_core::{Chain, ManualClock};
use notary_storage::sled_store::SledStore;
use tempfile::{tempdir, TempDir};

pub const T: u64 = 1_600_000_000;

pub fn create_temp_store() -> (TempDir, SledStore) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    // Initialize the SledStore
    (
        temp_dir,
        SledStore::open(db_path).expect("Failed to open SledStore"),
    )
}

pub fn create_temp_chain() -> (TempDir, Arc<ManualClock>, Chain<SledStore>) {
    let (temp_dir, store) = create_temp_store();
    let clock = Arc::new(ManualClock::new(T));
    let chain = Chain::with_clock(Arc::new(store), clock.clone()).expect("Failed to open chain");
    (temp_dir, clock, chain)
}

pub fn clear_store(store: &SledStore) {
    store.clear().expect("Failed to clear the store");
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    clear_store(&store);
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}
