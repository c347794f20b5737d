use super::*;
use depot_hash::{Digest, DigestAlgorithm};
use tempfile::TempDir;

async fn store() -> (TempDir, ContentStore) {
    let temp = TempDir::new().unwrap();
    let store = ContentStore::new(temp.path());
    store.init().await.unwrap();
    (temp, store)
}

#[tokio::test]
async fn get_returns_exactly_what_put_stored() {
    let (_temp, store) = store().await;
    let data = b"mirror payload";

    let key = store.put(data).await.unwrap();
    let read = store.get(&key).await.unwrap();

    assert_eq!(&read[..], data);
}

#[tokio::test]
async fn key_is_sha256_of_content() {
    let (_temp, store) = store().await;
    let data = b"addressed by digest";

    let key = store.put(data).await.unwrap();

    assert_eq!(
        key.0,
        Digest::compute(DigestAlgorithm::Sha256, data).to_hex()
    );
}

#[tokio::test]
async fn duplicate_put_shares_blob_and_counts_refs() {
    let (_temp, store) = store().await;
    let data = b"shared across repositories";

    let first = store.put(data).await.unwrap();
    let second = store.put(data).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.ref_count(&first), 2);
}

#[tokio::test]
async fn release_deletes_only_at_zero() {
    let (_temp, store) = store().await;
    let data = b"ref counted";

    let key = store.put(data).await.unwrap();
    store.put(data).await.unwrap();

    assert!(!store.release(&key).unwrap());
    assert!(store.contains(&key).await);

    assert!(store.release(&key).unwrap());
    assert!(!store.contains(&key).await);

    let err = store.get(&key).await.unwrap_err();
    assert!(matches!(
        err,
        depot_errors::Error::Storage(depot_errors::StorageError::NotPresent { .. })
    ));
}

#[tokio::test]
async fn release_of_unknown_key_fails() {
    let (_temp, store) = store().await;
    let key = StoreKey(Digest::compute(DigestAlgorithm::Sha256, b"never stored").to_hex());

    assert!(store.release(&key).is_err());
}

#[tokio::test]
async fn staged_write_matches_one_shot_put() {
    let (_temp, store) = store().await;

    let mut staged = store.stage().await.unwrap();
    staged.write(b"chunk one ").await.unwrap();
    staged.write(b"chunk two").await.unwrap();
    let (key, len) = staged.commit().await.unwrap();

    assert_eq!(len, "chunk one chunk two".len() as u64);
    assert_eq!(
        key.0,
        Digest::compute(DigestAlgorithm::Sha256, b"chunk one chunk two").to_hex()
    );
    assert_eq!(&store.get(&key).await.unwrap()[..], b"chunk one chunk two");
}

#[tokio::test]
async fn discard_leaves_no_trace() {
    let (_temp, store) = store().await;

    let mut staged = store.stage().await.unwrap();
    staged.write(b"never verified").await.unwrap();
    staged.discard().await;

    let key = StoreKey(Digest::compute(DigestAlgorithm::Sha256, b"never verified").to_hex());
    assert!(!store.contains(&key).await);

    // No temp files left behind either
    let mut entries = tokio::fs::read_dir(store.objects_path()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        assert!(entry.file_type().await.unwrap().is_dir());
    }
}

#[tokio::test]
async fn blob_path_rejects_non_hex_keys() {
    let (_temp, store) = store().await;
    assert!(store.blob_path(&StoreKey("../../etc/passwd".to_string())).is_err());
    assert!(store.blob_path(&StoreKey("abcd".to_string())).is_err());
}

#[tokio::test]
async fn concurrent_puts_of_same_content_are_safe() {
    let (_temp, store) = store().await;
    let data = b"racy payload";

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.put(data).await }));
    }

    let mut key = None;
    for task in tasks {
        let k = task.await.unwrap().unwrap();
        if let Some(prev) = &key {
            assert_eq!(*prev, k);
        }
        key = Some(k);
    }

    let key = key.unwrap();
    assert_eq!(store.ref_count(&key), 8);
    assert_eq!(&store.get(&key).await.unwrap()[..], data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commit_and_release_never_lose_bytes() {
    let (_temp, store) = store().await;
    let data = b"contended payload";

    // One reference is released while another writer lands the same
    // content; whichever order wins, the surviving reference must still
    // resolve to the bytes.
    for _ in 0..32 {
        let key = store.put(data).await.unwrap();

        let writer = store.clone();
        let landing = tokio::spawn(async move { writer.put(data).await });
        store.release(&key).unwrap();

        let key = landing.await.unwrap().unwrap();
        assert_eq!(store.ref_count(&key), 1);
        assert_eq!(&store.get(&key).await.unwrap()[..], data);
        assert!(store.release(&key).unwrap());
    }
}
